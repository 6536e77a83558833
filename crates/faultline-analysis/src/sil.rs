//! IEC 61508 Safety Integrity Level evaluation.
//!
//! The façade evaluates the top probability at sampling points over the
//! mission interval. Averaging the points yields PFDavg for demand-mode
//! functions; the accumulated positive probability increments per hour yield
//! the PFH figure for continuous mode. Each figure maps onto its SIL band
//! through the standard decade tables.

use serde::{Deserialize, Serialize};

use faultline_mef::error::Result;
use faultline_mef::Model;

use crate::bdd::Bdd;
use crate::settings::Settings;

/// The four integrity bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SilLevel {
    Sil1,
    Sil2,
    Sil3,
    Sil4,
}

impl SilLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            SilLevel::Sil1 => "SIL 1",
            SilLevel::Sil2 => "SIL 2",
            SilLevel::Sil3 => "SIL 3",
            SilLevel::Sil4 => "SIL 4",
        }
    }

    /// Band for an average probability of failure on demand. Values above
    /// the SIL 1 ceiling yield no band; values below the SIL 4 floor stay
    /// SIL 4.
    pub fn from_pfd(pfd: f64) -> Option<SilLevel> {
        Some(match pfd {
            p if p >= 1e-1 => return None,
            p if p >= 1e-2 => SilLevel::Sil1,
            p if p >= 1e-3 => SilLevel::Sil2,
            p if p >= 1e-4 => SilLevel::Sil3,
            _ => SilLevel::Sil4,
        })
    }

    /// Band for a dangerous failure frequency per hour.
    pub fn from_pfh(pfh: f64) -> Option<SilLevel> {
        Some(match pfh {
            f if f >= 1e-5 => return None,
            f if f >= 1e-6 => SilLevel::Sil1,
            f if f >= 1e-7 => SilLevel::Sil2,
            f if f >= 1e-8 => SilLevel::Sil3,
            _ => SilLevel::Sil4,
        })
    }
}

/// The time-integrated SIL figures for one top gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SilResult {
    /// Average probability of failure on demand over the mission interval.
    pub pfd_avg: f64,
    /// Average dangerous failure frequency per hour.
    pub pfh: f64,
    /// Demand-mode band.
    pub pfd_band: Option<SilLevel>,
    /// Continuous-mode band.
    pub pfh_band: Option<SilLevel>,
    /// The sampled curve: (time, top probability).
    pub curve: Vec<(f64, f64)>,
}

/// Integrates the top probability over `[0, mission_time]`.
///
/// The mission-time handle is restored to the full mission time afterwards,
/// with a final cache sweep, so later analyses see the configured value.
pub fn evaluate(model: &Model, bdd: &Bdd, settings: &Settings) -> Result<SilResult> {
    let mission_time = settings.mission_time;
    let points = settings.sil_time_points.max(2);

    let mut curve = Vec::with_capacity(points as usize);
    let mut previous = probability_at(model, bdd, 0.0);
    let mut pfd_sum = 0.0;
    let mut increments = 0.0;
    for i in 1..=points {
        let t = mission_time * f64::from(i) / f64::from(points);
        let q = probability_at(model, bdd, t);
        pfd_sum += q;
        increments += (q - previous).max(0.0);
        previous = q;
        curve.push((t, q));
    }

    // Restore the configured mission time.
    model.mission_time().set_value(mission_time);
    model.clear_parameter_caches();

    let pfd_avg = pfd_sum / f64::from(points);
    let pfh = increments / mission_time;
    Ok(SilResult {
        pfd_avg,
        pfh,
        pfd_band: SilLevel::from_pfd(pfd_avg),
        pfh_band: SilLevel::from_pfh(pfh),
        curve,
    })
}

/// Sets the mission time, sweeps the parameter caches, and quantifies the
/// diagram with the refreshed means.
pub fn probability_at(model: &Model, bdd: &Bdd, t: f64) -> f64 {
    model.mission_time().set_value(t);
    model.clear_parameter_caches();
    bdd.probability_from_means().clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use faultline_mef::builtins::{Builtin, PeriodicTest};
    use faultline_mef::element::Element;
    use faultline_mef::event::{BasicEvent, Gate};
    use faultline_mef::expression::Expression;
    use faultline_mef::formula::{Formula, Operator};
    use std::rc::Rc;

    #[test]
    fn band_tables() {
        assert_eq!(SilLevel::from_pfd(0.5), None);
        assert_eq!(SilLevel::from_pfd(5e-2), Some(SilLevel::Sil1));
        assert_eq!(SilLevel::from_pfd(5e-3), Some(SilLevel::Sil2));
        assert_eq!(SilLevel::from_pfd(5e-4), Some(SilLevel::Sil3));
        assert_eq!(SilLevel::from_pfd(5e-5), Some(SilLevel::Sil4));
        assert_eq!(SilLevel::from_pfd(1e-6), Some(SilLevel::Sil4));

        assert_eq!(SilLevel::from_pfh(1e-4), None);
        assert_eq!(SilLevel::from_pfh(5e-6), Some(SilLevel::Sil1));
        assert_eq!(SilLevel::from_pfh(5e-9), Some(SilLevel::Sil4));
    }

    fn periodically_tested_model() -> (Model, Bdd) {
        let mut model = Model::new("sif");
        let event = BasicEvent::new(Element::public("valve"));
        let expression = Expression::builtin(Builtin::PeriodicTest(PeriodicTest::Four {
            lambda: Expression::constant(1e-5),
            tau: Expression::constant(720.0),
            theta: Expression::constant(360.0),
            time: Expression::mission_time(Rc::clone(model.mission_time())),
        }))
        .unwrap();
        event.set_expression(expression).unwrap();
        model.add_basic_event(Rc::clone(&event)).unwrap();

        let gate = Gate::new(Element::public("top"));
        let mut formula = Formula::new(Operator::Null);
        formula.add_basic_event(event).unwrap();
        gate.set_formula(formula).unwrap();
        model.add_gate(Rc::clone(&gate)).unwrap();
        let bdd = Bdd::from_gate(&gate).unwrap();
        (model, bdd)
    }

    #[test]
    fn periodically_tested_component_integrates_to_band() {
        let (model, bdd) = periodically_tested_model();
        let mut settings = Settings::default();
        settings.sil_analysis = true;
        settings.mission_time = 8760.0;
        settings.sil_time_points = 48;

        let result = evaluate(&model, &bdd, &settings).unwrap();
        // The saw-tooth averages near lambda * tau / 2 = 3.6e-3: SIL 2.
        assert!(result.pfd_avg > 1e-3 && result.pfd_avg < 1e-2);
        assert_eq!(result.pfd_band, Some(SilLevel::Sil2));
        assert_eq!(result.curve.len(), 48);
        // Mission time is restored after the sweep.
        assert_eq!(model.mission_time().value(), 8760.0);
    }

    #[test]
    fn probability_tracks_mission_time() {
        let (model, bdd) = periodically_tested_model();
        let q_early = probability_at(&model, &bdd, 100.0);
        let q_late = probability_at(&model, &bdd, 359.0);
        assert!(q_late > q_early);
    }
}
