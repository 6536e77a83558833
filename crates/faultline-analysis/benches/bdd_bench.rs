use std::rc::Rc;

use criterion::{criterion_group, criterion_main, Criterion};

use faultline_analysis::bdd::Bdd;
use faultline_mef::element::Element;
use faultline_mef::event::{BasicEvent, Gate};
use faultline_mef::expression::Expression;
use faultline_mef::formula::{Formula, Operator};

/// A k-of-n voting gate over n independent events.
fn voting_gate(n: usize, k: u32) -> Rc<Gate> {
    let gate = Gate::new(Element::public("top"));
    let mut formula = Formula::new(Operator::AtLeast);
    formula.set_vote_number(k).unwrap();
    for i in 0..n {
        let event = BasicEvent::new(Element::public(&format!("e{i}")));
        event.set_expression(Expression::constant(1e-3)).unwrap();
        formula.add_basic_event(event).unwrap();
    }
    gate.set_formula(formula).unwrap();
    gate
}

fn bench_bdd(c: &mut Criterion) {
    let gate = voting_gate(12, 6);
    c.bench_function("build 6-of-12 diagram", |b| {
        b.iter(|| Bdd::from_gate(&gate).unwrap().node_count())
    });

    let bdd = Bdd::from_gate(&gate).unwrap();
    c.bench_function("quantify 6-of-12", |b| {
        b.iter(|| bdd.probability_from_means())
    });

    c.bench_function("cut sets 6-of-12", |b| {
        b.iter(|| bdd.minimal_cut_sets().len())
    });
}

criterion_group!(benches, bench_bdd);
criterion_main!(benches);
