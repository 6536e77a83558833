//! Read-only views over a validated model and the sampling-cycle envelope.
//!
//! Analyses consume the model exclusively through this surface: iteration
//! over top gates and primary events, CCF substitutions, bulk reset, and the
//! seeded sampling cycles that keep Monte-Carlo draws coherent.

use std::rc::Rc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use faultline_mef::element::Named;
use faultline_mef::error::Result;
use faultline_mef::event::{BasicEvent, Gate, HouseEvent};
use faultline_mef::Model;

use crate::bdd::Bdd;
use crate::sil;

/// The analysis façade over one validated model.
pub struct Facade<'m> {
    model: &'m Model,
}

impl<'m> Facade<'m> {
    pub fn new(model: &'m Model) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &'m Model {
        self.model
    }

    /// Top gates per fault tree as `(tree name, gate)` pairs.
    pub fn top_gates(&self) -> Result<Vec<(String, Rc<Gate>)>> {
        let mut result = Vec::new();
        for tree in self.model.fault_trees() {
            for gate in tree.top_gates()? {
                result.push((tree.name().to_string(), gate));
            }
        }
        Ok(result)
    }

    pub fn basic_events(&self) -> impl Iterator<Item = &Rc<BasicEvent>> {
        self.model.basic_events()
    }

    pub fn house_events(&self) -> impl Iterator<Item = &Rc<HouseEvent>> {
        self.model.house_events()
    }

    /// The common-cause substitutions: each member event with its gate.
    pub fn ccf_substitutions(&self) -> Vec<(Rc<BasicEvent>, Rc<Gate>)> {
        self.model
            .basic_events()
            .filter_map(|event| {
                event
                    .ccf_gate()
                    .map(|gate| (Rc::clone(event), gate))
            })
            .collect()
    }

    /// Clears every sample memo in the model.
    pub fn reset_all(&self) {
        self.model.reset_expressions();
    }

    /// Opens a coherent sampling cycle; draws stay memoised until the cycle
    /// ends.
    pub fn begin_sampling_cycle(&self, seed: Option<u64>) -> SamplingCycle<'m> {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(rand::thread_rng())
                .unwrap_or_else(|_| StdRng::seed_from_u64(0)),
        };
        SamplingCycle {
            model: self.model,
            rng,
        }
    }

    /// The top-event probability at mission time `t`: sets the mission-time
    /// handle, sweeps the parameter caches, and quantifies the diagram.
    pub fn probability_at(&self, bdd: &Bdd, t: f64) -> f64 {
        sil::probability_at(self.model, bdd, t)
    }
}

/// One Monte-Carlo iteration's envelope. Ending the cycle resets every
/// sample memo so the next cycle draws fresh values.
pub struct SamplingCycle<'m> {
    model: &'m Model,
    rng: StdRng,
}

impl SamplingCycle<'_> {
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// The event's probability draw for this cycle.
    pub fn sample(&mut self, event: &BasicEvent) -> f64 {
        event.sample_probability(&mut self.rng)
    }

    /// Tears the cycle down.
    pub fn end(self) {
        self.model.reset_expressions();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faultline_mef::deviate::Deviate;
    use faultline_mef::element::Element;
    use faultline_mef::expression::Expression;
    use faultline_mef::formula::{Formula, Operator};
    use faultline_mef::parameter::Parameter;

    fn model_with_shared_parameter() -> (Model, Rc<BasicEvent>, Rc<BasicEvent>) {
        let mut model = Model::new("plant");
        let parameter = Parameter::new(Element::public("q"));
        parameter
            .set_expression(
                Expression::deviate(Deviate::Uniform {
                    min: Expression::constant(0.0),
                    max: Expression::constant(1.0),
                })
                .unwrap(),
            )
            .unwrap();
        model.add_parameter(Rc::clone(&parameter)).unwrap();

        let a = BasicEvent::new(Element::public("a"));
        a.set_expression(Expression::parameter(Rc::clone(&parameter)))
            .unwrap();
        let b = BasicEvent::new(Element::public("b"));
        b.set_expression(Expression::parameter(parameter)).unwrap();
        model.add_basic_event(Rc::clone(&a)).unwrap();
        model.add_basic_event(Rc::clone(&b)).unwrap();

        let gate = Gate::new(Element::public("top"));
        let mut formula = Formula::new(Operator::And);
        formula.add_basic_event(Rc::clone(&a)).unwrap();
        formula.add_basic_event(Rc::clone(&b)).unwrap();
        gate.set_formula(formula).unwrap();
        model.add_gate(gate).unwrap();
        (model, a, b)
    }

    #[test]
    fn shared_parameter_draws_coherently() {
        let (model, a, b) = model_with_shared_parameter();
        let facade = Facade::new(&model);
        let mut cycle = facade.begin_sampling_cycle(Some(17));
        let draw_a = cycle.sample(&a);
        let draw_b = cycle.sample(&b);
        assert_eq!(draw_a, draw_b);
        // Repeated draws within the cycle are memoised.
        assert_eq!(cycle.sample(&a), draw_a);
        cycle.end();

        let mut next = facade.begin_sampling_cycle(Some(18));
        assert_ne!(next.sample(&a), draw_a);
        next.end();
    }

    #[test]
    fn mean_is_deterministic_across_cycles() {
        let (model, a, _) = model_with_shared_parameter();
        let facade = Facade::new(&model);
        let before = a.p();
        let mut cycle = facade.begin_sampling_cycle(Some(17));
        cycle.sample(&a);
        cycle.end();
        assert_eq!(a.p(), before);
    }
}
