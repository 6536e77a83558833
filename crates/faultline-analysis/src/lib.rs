//! # faultline-analysis
//!
//! The analysis layer over validated fault-tree models: binary decision
//! diagrams for products and exact probability, importance measures,
//! Monte-Carlo uncertainty analysis, time-integrated IEC 61508 SIL figures,
//! and the XML report.
//!
//! The entry point is [`analysis::analyze`]; everything it needs from the
//! model goes through the read-only [`facade::Facade`].

pub mod analysis;
pub mod bdd;
pub mod facade;
pub mod importance;
pub mod probability;
pub mod report;
pub mod settings;
pub mod sil;
pub mod uncertainty;

pub use analysis::{analyze, GateAnalysis};
pub use settings::{Approximation, Settings};
