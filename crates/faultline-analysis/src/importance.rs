//! Importance measures per basic event.
//!
//! All measures derive from three conditioned quantities: the top probability
//! Q, and the top probabilities with the event forced to certain failure and
//! certain success. Conditioned values stay unclamped.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use faultline_mef::element::Named;

use crate::bdd::Bdd;

/// The importance record of one basic event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportanceRecord {
    pub event: String,
    /// The event's own probability.
    pub probability: f64,
    /// Fussell-Vesely: fraction of the top probability lost without the event.
    pub fussell_vesely: f64,
    /// Birnbaum marginal importance: dQ/dq.
    pub birnbaum: f64,
    /// Critical importance: Birnbaum weighted by q/Q.
    pub cif: f64,
    /// Diagnosis importance: P(event failed | top event).
    pub dif: f64,
    /// Risk achievement worth.
    pub raw: f64,
    /// Risk reduction worth.
    pub rrw: f64,
}

/// Computes every measure for every variable of the diagram.
pub fn measures(bdd: &Bdd) -> IndexMap<String, ImportanceRecord> {
    let q_top = bdd.probability_from_means();
    let mut result = IndexMap::new();
    for (var, event) in bdd.variables().iter().enumerate() {
        let q = event.p();
        let with_failure = bdd.probability_conditioned(var, 1.0);
        let without = bdd.probability_conditioned(var, 0.0);

        let birnbaum = with_failure - without;
        let fussell_vesely = if q_top > 0.0 {
            (q_top - without) / q_top
        } else {
            0.0
        };
        let cif = if q_top > 0.0 {
            birnbaum * q / q_top
        } else {
            0.0
        };
        let dif = if q_top > 0.0 {
            q * with_failure / q_top
        } else {
            0.0
        };
        let raw = if q_top > 0.0 {
            with_failure / q_top
        } else {
            1.0
        };
        let rrw = if without > 0.0 {
            q_top / without
        } else {
            f64::INFINITY
        };

        result.insert(
            event.id().to_string(),
            ImportanceRecord {
                event: event.name().to_string(),
                probability: q,
                fussell_vesely,
                birnbaum,
                cif,
                dif,
                raw,
                rrw,
            },
        );
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use faultline_mef::element::Element;
    use faultline_mef::event::{BasicEvent, Gate};
    use faultline_mef::expression::Expression;
    use faultline_mef::formula::{Formula, Operator};
    use std::rc::Rc;

    fn and_gate() -> Bdd {
        let gate = Gate::new(Element::public("top"));
        let mut formula = Formula::new(Operator::And);
        for (name, p) in [("e1", 0.1), ("e2", 0.2)] {
            let event = BasicEvent::new(Element::public(name));
            event.set_expression(Expression::constant(p)).unwrap();
            formula.add_basic_event(Rc::clone(&event)).unwrap();
        }
        gate.set_formula(formula).unwrap();
        Bdd::from_gate(&gate).unwrap()
    }

    #[test]
    fn and_gate_measures() {
        let bdd = and_gate();
        let measures = measures(&bdd);
        let e1 = &measures["e1"];
        // Both events are in the only product: FV = 1.
        assert!((e1.fussell_vesely - 1.0).abs() < 1e-12);
        // dQ/dq1 = q2.
        assert!((e1.birnbaum - 0.2).abs() < 1e-12);
        // Forcing e1 certain raises Q to q2 = 0.2; RAW = 0.2 / 0.02.
        assert!((e1.raw - 10.0).abs() < 1e-9);
        // Without e1 the top is impossible.
        assert!(e1.rrw.is_infinite());
        let e2 = &measures["e2"];
        assert!((e2.birnbaum - 0.1).abs() < 1e-12);
    }

    #[test]
    fn dif_is_conditional_probability() {
        let bdd = and_gate();
        let measures = measures(&bdd);
        // P(e1 | top) = q1 * Q(1) / Q = 0.1 * 0.2 / 0.02 = 1.
        assert!((measures["e1"].dif - 1.0).abs() < 1e-9);
    }
}
