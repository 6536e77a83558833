//! Integration tests over the assembled model layer.

use std::rc::Rc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use faultline_mef::builtins::{Builtin, PeriodicTest};
use faultline_mef::deviate::Deviate;
use faultline_mef::element::{BasePath, Element, Named};
use faultline_mef::error::ErrorKind;
use faultline_mef::event::{BasicEvent, Gate};
use faultline_mef::expression::{ArithOp, Expression, ExpressionRef};
use faultline_mef::formula::{Formula, Operator};
use faultline_mef::parameter::{Parameter, Unit};
use faultline_mef::{parser, validator, Model};

fn constant(v: f64) -> ExpressionRef {
    Expression::constant(v)
}

/// A corpus of well-formed expressions for protocol invariants.
fn expression_corpus() -> Vec<ExpressionRef> {
    vec![
        constant(0.25),
        Expression::arith(ArithOp::Add, vec![constant(0.1), constant(0.2)]).unwrap(),
        Expression::arith(ArithOp::Mul, vec![constant(0.5), constant(0.3)]).unwrap(),
        Expression::deviate(Deviate::Uniform {
            min: constant(0.1),
            max: constant(0.5),
        })
        .unwrap(),
        Expression::deviate(Deviate::Normal {
            mean: constant(10.0),
            sigma: constant(2.0),
        })
        .unwrap(),
        Expression::deviate(Deviate::Beta {
            alpha: constant(2.0),
            beta: constant(5.0),
        })
        .unwrap(),
        Expression::deviate(Deviate::Histogram {
            boundaries: vec![constant(0.0), constant(0.5), constant(1.0)],
            weights: vec![constant(2.0), constant(1.0)],
        })
        .unwrap(),
        Expression::builtin(Builtin::Exponential {
            lambda: constant(1e-3),
            time: constant(100.0),
        })
        .unwrap(),
        Expression::builtin(Builtin::Weibull {
            scale: constant(1000.0),
            shape: constant(1.5),
            shift: constant(0.0),
            time: constant(500.0),
        })
        .unwrap(),
    ]
}

#[test]
fn mean_lies_within_the_support() {
    for expression in expression_corpus() {
        let interval = expression.interval();
        let mean = expression.mean();
        assert!(
            interval.lower() <= mean && mean <= interval.upper(),
            "mean {mean} outside [{}, {}]",
            interval.lower(),
            interval.upper()
        );
    }
}

#[test]
fn mean_is_referentially_transparent() {
    for expression in expression_corpus() {
        assert_eq!(expression.mean(), expression.mean());
    }
}

#[test]
fn samples_stay_within_the_support() {
    let mut rng = StdRng::seed_from_u64(99);
    for expression in expression_corpus() {
        for _ in 0..200 {
            let sample = expression.sample(&mut rng);
            let interval = expression.interval();
            assert!(
                interval.lower() - 1e-9 <= sample && sample <= interval.upper() + 1e-9,
                "sample {sample} outside [{}, {}]",
                interval.lower(),
                interval.upper()
            );
            expression.reset();
        }
    }
}

// The four-argument periodic test at the reference point: the last test
// before 1000 h was at 360 h, so 640 h of accumulation.
#[test]
fn periodic_test_reference_value() {
    let expression = Expression::builtin(Builtin::PeriodicTest(PeriodicTest::Four {
        lambda: constant(1e-3),
        tau: constant(720.0),
        theta: constant(360.0),
        time: constant(1000.0),
    }))
    .unwrap();
    assert!((expression.mean() - 0.4727).abs() < 1e-4);
}

#[test]
fn parameter_cycle_is_rejected_with_both_names() {
    let a = Parameter::new(Element::public("A"));
    let b = Parameter::new(Element::public("B"));
    b.set_expression(Expression::parameter(Rc::clone(&a)))
        .unwrap();
    let err = a
        .set_expression(Expression::parameter(Rc::clone(&b)))
        .unwrap_err();
    match err.kind() {
        ErrorKind::Cycle(cycle) => {
            assert!(cycle.contains(&"A".to_string()));
            assert!(cycle.contains(&"B".to_string()));
        }
        other => panic!("expected cycle error, got {other:?}"),
    }
}

#[test]
fn parameter_cycle_is_caught_by_the_validator_too() {
    // Build the same cycle through the parser so the cycle is only visible
    // to the whole-model check.
    let text = r#"<opsa-mef>
  <define-parameter name="A"><parameter name="B"/></define-parameter>
  <define-parameter name="B"><parameter name="A"/></define-parameter>
</opsa-mef>"#;
    let err = parser::parse_model(text, "cycle.xml").unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Cycle(_)));
}

#[test]
fn duplicate_formula_argument_is_rejected() {
    let event = BasicEvent::new(Element::public("pump"));
    event.set_expression(constant(0.1)).unwrap();
    let mut formula = Formula::new(Operator::Or);
    formula.add_basic_event(Rc::clone(&event)).unwrap();
    let err = formula.add_basic_event(event).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::DuplicateArgument(_)));
}

#[test]
fn sampling_cycle_coherence_through_shared_parameter() {
    let parameter = Parameter::new(Element::public("q"));
    parameter
        .set_expression(
            Expression::deviate(Deviate::Uniform {
                min: constant(0.0),
                max: constant(1.0),
            })
            .unwrap(),
        )
        .unwrap();
    let first_ref = Expression::parameter(Rc::clone(&parameter));
    let second_ref = Expression::parameter(Rc::clone(&parameter));

    let mut rng = StdRng::seed_from_u64(5);
    let first = first_ref.sample(&mut rng);
    let second = second_ref.sample(&mut rng);
    assert_eq!(first, second);

    first_ref.reset();
    second_ref.reset();
    let fresh = first_ref.sample(&mut rng);
    assert_ne!(fresh, first);
}

#[test]
fn orphan_flags_are_recomputed_per_traversal() {
    let mut model = Model::new("plant");
    let used = BasicEvent::new(Element::public("used"));
    used.set_expression(constant(0.1)).unwrap();
    let spare = BasicEvent::new(Element::public("spare"));
    spare.set_expression(constant(0.1)).unwrap();
    model.add_basic_event(Rc::clone(&used)).unwrap();
    model.add_basic_event(Rc::clone(&spare)).unwrap();

    let gate = Gate::new(Element::public("top"));
    let mut formula = Formula::new(Operator::Null);
    formula.add_basic_event(Rc::clone(&used)).unwrap();
    gate.set_formula(formula).unwrap();
    model.add_gate(gate).unwrap();

    validator::validate(&model).unwrap();
    assert!(!used.orphan());
    assert!(spare.orphan());
    // A second run gives the same verdict.
    validator::validate(&model).unwrap();
    assert!(spare.orphan());
}

#[test]
fn ccf_beta_factor_scenario() {
    let text = r#"<opsa-mef name="s6">
  <define-fault-tree name="plant">
    <define-gate name="top">
      <and>
        <basic-event name="m1"/>
        <basic-event name="m2"/>
        <basic-event name="m3"/>
      </and>
    </define-gate>
    <define-basic-event name="m1"/>
    <define-basic-event name="m2"/>
    <define-basic-event name="m3"/>
    <define-CCF-group name="motors" model="beta-factor">
      <members>
        <basic-event name="m1"/>
        <basic-event name="m2"/>
        <basic-event name="m3"/>
      </members>
      <distribution><float value="0.01"/></distribution>
      <factor><float value="0.1"/></factor>
    </define-CCF-group>
  </define-fault-tree>
</opsa-mef>"#;
    let mut model = parser::parse_model(text, "s6.xml").unwrap();
    model.apply_ccf_groups().unwrap();
    validator::validate(&model).unwrap();

    let m1 = model.basic_event("m1", &BasePath::root()).unwrap();
    let gate = m1.ccf_gate().expect("substitution gate");
    let ccf_events = gate
        .with_formula(|f| f.basic_events().cloned().collect::<Vec<_>>())
        .unwrap();
    assert_eq!(ccf_events.len(), 4);

    let total: f64 = ccf_events.iter().map(|e| e.p()).sum();
    assert!((total - 0.01).abs() < 1e-9);

    let singles: Vec<f64> = ccf_events
        .iter()
        .filter(|e| e.ccf_origin().unwrap().member_names.len() == 1)
        .map(|e| e.p())
        .collect();
    assert_eq!(singles.len(), 1);
    assert!((singles[0] - 0.009).abs() < 1e-12);

    let triple: Vec<f64> = ccf_events
        .iter()
        .filter(|e| e.ccf_origin().unwrap().member_names.len() == 3)
        .map(|e| e.p())
        .collect();
    assert_eq!(triple.len(), 1);
    assert!((triple[0] - 0.001).abs() < 1e-12);
}

#[test]
fn mission_time_sweep_reaches_parameters() {
    let mut model = Model::new("plant");
    let exposure = Parameter::new(Element::public("exposure"));
    exposure
        .set_expression(Expression::mission_time(Rc::clone(model.mission_time())))
        .unwrap();
    model.add_parameter(Rc::clone(&exposure)).unwrap();

    model.mission_time().set_value(100.0);
    model.clear_parameter_caches();
    assert_eq!(exposure.mean(), 100.0);

    model.mission_time().set_value(200.0);
    assert_eq!(exposure.mean(), 100.0, "cache still holds the old value");
    model.clear_parameter_caches();
    assert_eq!(exposure.mean(), 200.0);
}

#[test]
fn mixed_units_in_a_sum_are_rejected() {
    let mut model = Model::new("plant");
    let rate = Parameter::new(Element::public("rate"));
    rate.set_unit(Unit::InverseHours);
    rate.set_expression(constant(1e-3)).unwrap();
    let window = Parameter::new(Element::public("window"));
    window.set_unit(Unit::Hours);
    window.set_expression(constant(24.0)).unwrap();

    let sum = Parameter::new(Element::public("sum"));
    sum.set_expression(
        Expression::arith(
            ArithOp::Add,
            vec![
                Expression::parameter(Rc::clone(&rate)),
                Expression::parameter(Rc::clone(&window)),
            ],
        )
        .unwrap(),
    )
    .unwrap();

    model.add_parameter(rate).unwrap();
    model.add_parameter(window).unwrap();
    model.add_parameter(sum).unwrap();

    let err = validator::validate(&model).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Validation(_)));
}

#[test]
fn private_scoping_allows_shared_names() {
    let text = r#"<opsa-mef>
  <define-fault-tree name="unit1">
    <define-gate name="top" role="private">
      <null><basic-event name="pump"/></null>
    </define-gate>
    <define-basic-event name="pump" role="private">
      <float value="0.1"/>
    </define-basic-event>
  </define-fault-tree>
  <define-fault-tree name="unit2">
    <define-gate name="top" role="private">
      <null><basic-event name="pump"/></null>
    </define-gate>
    <define-basic-event name="pump" role="private">
      <float value="0.2"/>
    </define-basic-event>
  </define-fault-tree>
</opsa-mef>"#;
    let model = parser::parse_model(text, "scoped.xml").unwrap();
    validator::validate(&model).unwrap();
    let unit1_pump = model
        .basic_event("pump", &BasePath::parse("unit1"))
        .unwrap();
    let unit2_pump = model
        .basic_event("pump", &BasePath::parse("unit2"))
        .unwrap();
    assert!((unit1_pump.p() - 0.1).abs() < 1e-12);
    assert!((unit2_pump.p() - 0.2).abs() < 1e-12);
    assert_eq!(unit1_pump.name(), unit2_pump.name());
}
