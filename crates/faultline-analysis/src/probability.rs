//! Top-event probability quantification.
//!
//! Three quantification modes over the same diagram and product set: exact
//! Shannon decomposition, the rare-event sum, and the min-cut upper bound.
//! Probabilities are clamped to [0, 1] here, at the analysis boundary, and
//! nowhere inside the expression layer.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use faultline_mef::event::BasicEvent;

use crate::bdd::Bdd;
use crate::settings::Approximation;

/// One minimal failure combination with its probability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    /// Names of the member events.
    pub events: Vec<String>,
    /// Product of the member probabilities.
    pub probability: f64,
    /// Number of member events.
    pub order: usize,
}

/// The quantified top event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbabilityResult {
    pub value: f64,
    pub approximation: Approximation,
}

/// Computes the products of the diagram with current event means.
pub fn products(cut_sets: &[Vec<Rc<BasicEvent>>]) -> Vec<Product> {
    use faultline_mef::element::Named;
    let mut result: Vec<Product> = cut_sets
        .iter()
        .map(|cut_set| {
            let probability = cut_set.iter().map(|event| event.p()).product();
            Product {
                events: cut_set.iter().map(|event| event.name().to_string()).collect(),
                probability,
                order: cut_set.len(),
            }
        })
        .collect();
    result.sort_by(|a, b| {
        b.probability
            .partial_cmp(&a.probability)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    result
}

/// Quantifies the top event with the selected approximation.
///
/// The clamp applies to the top event only; per-event conditioned values in
/// the importance analysis stay unclamped.
pub fn top_probability(bdd: &Bdd, products: &[Product], approximation: Approximation) -> f64 {
    match approximation {
        Approximation::Exact => bdd.probability_from_means(),
        Approximation::RareEvent => products
            .iter()
            .map(|product| product.probability)
            .sum::<f64>()
            .min(1.0),
        Approximation::Mcub => {
            1.0 - products
                .iter()
                .map(|product| 1.0 - product.probability)
                .product::<f64>()
        }
    }
    .clamp(0.0, 1.0)
}
