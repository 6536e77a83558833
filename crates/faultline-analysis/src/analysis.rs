//! The analysis driver: one pass over every top gate of a validated model.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use faultline_mef::element::Named;
use faultline_mef::error::Result;
use faultline_mef::Model;

use crate::bdd::Bdd;
use crate::facade::Facade;
use crate::importance::{self, ImportanceRecord};
use crate::probability::{self, ProbabilityResult, Product};
use crate::settings::Settings;
use crate::sil::{self, SilResult};
use crate::uncertainty::{self, UncertaintyResult};

/// Everything computed for one top gate.
#[derive(Debug, Serialize, Deserialize)]
pub struct GateAnalysis {
    pub tree: String,
    pub gate: String,
    pub products: Vec<Product>,
    pub probability: Option<ProbabilityResult>,
    pub importance: Option<IndexMap<String, ImportanceRecord>>,
    pub uncertainty: Option<UncertaintyResult>,
    pub sil: Option<SilResult>,
}

/// Runs the configured analyses over every top gate.
///
/// The model must have passed validation; CCF groups must already be
/// applied.
pub fn analyze(model: &Model, settings: &Settings) -> Result<Vec<GateAnalysis>> {
    settings.validate()?;
    model.mission_time().set_value(settings.mission_time);
    model.clear_parameter_caches();

    let facade = Facade::new(model);
    let mut results = Vec::new();
    for (tree, gate) in facade.top_gates()? {
        let bdd = Bdd::from_gate(&gate)?;
        info!(
            tree = %tree,
            gate = %gate.name(),
            nodes = bdd.node_count(),
            "built decision diagram"
        );

        let cut_sets = bdd.minimal_cut_sets();
        let products = probability::products(&cut_sets);

        let probability = settings.probability_analysis.then(|| ProbabilityResult {
            value: probability::top_probability(&bdd, &products, settings.approximation),
            approximation: settings.approximation,
        });
        let importance = settings
            .importance_analysis
            .then(|| importance::measures(&bdd));
        let uncertainty = settings
            .uncertainty_analysis
            .then(|| uncertainty::analyze(model, &bdd, settings));
        let sil = if settings.sil_analysis {
            Some(sil::evaluate(model, &bdd, settings)?)
        } else {
            None
        };

        results.push(GateAnalysis {
            tree,
            gate: gate.name().to_string(),
            products,
            probability,
            importance,
            uncertainty,
            sil,
        });
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use faultline_mef::{parser, validator};

    const MODEL: &str = r#"<opsa-mef name="demo">
  <define-fault-tree name="train">
    <define-gate name="top">
      <and>
        <basic-event name="a"/>
        <basic-event name="b"/>
      </and>
    </define-gate>
    <define-basic-event name="a"><float value="0.1"/></define-basic-event>
    <define-basic-event name="b"><float value="0.2"/></define-basic-event>
  </define-fault-tree>
</opsa-mef>"#;

    #[test]
    fn full_pass_over_a_small_model() {
        let model = parser::parse_model(MODEL, "demo.xml").unwrap();
        validator::validate(&model).unwrap();
        let mut settings = Settings::default();
        settings.importance_analysis = true;
        let results = analyze(&model, &settings).unwrap();
        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert_eq!(result.tree, "train");
        assert_eq!(result.gate, "top");
        assert_eq!(result.products.len(), 1);
        let probability = result.probability.as_ref().unwrap();
        assert!((probability.value - 0.02).abs() < 1e-12);
        let importance = result.importance.as_ref().unwrap();
        assert!((importance["a"].fussell_vesely - 1.0).abs() < 1e-9);
        assert!((importance["a"].birnbaum - 0.2).abs() < 1e-9);
    }
}
