//! Fault-tree containers: a named set of gates with top-gate detection.

use std::collections::HashSet;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::element::{Element, Named};
use crate::error::{Error, ErrorKind, Result};
use crate::event::Gate;

/// A root set of gates plus everything reachable through their formulae.
#[derive(Debug)]
pub struct FaultTree {
    element: Element,
    gates: IndexMap<String, Rc<Gate>>,
}

impl Named for FaultTree {
    fn element(&self) -> &Element {
        &self.element
    }
}

impl FaultTree {
    pub fn new(element: Element) -> Self {
        Self {
            element,
            gates: IndexMap::new(),
        }
    }

    pub fn add_gate(&mut self, gate: Rc<Gate>) -> Result<()> {
        if self.gates.contains_key(gate.id()) {
            return Err(Error::new(ErrorKind::Redefinition(gate.name().to_string())));
        }
        self.gates.insert(gate.id().to_string(), gate);
        Ok(())
    }

    pub fn gates(&self) -> impl Iterator<Item = &Rc<Gate>> {
        self.gates.values()
    }

    pub fn gate_count(&self) -> usize {
        self.gates.len()
    }

    /// Gates that no other gate of this tree references; the analysis roots.
    pub fn top_gates(&self) -> Result<Vec<Rc<Gate>>> {
        let mut referenced: HashSet<String> = HashSet::new();
        for gate in self.gates.values() {
            if !gate.has_formula() {
                continue;
            }
            gate.with_formula(|formula| {
                let mut children = Vec::new();
                formula.gather_gates(&mut children);
                for child in children {
                    referenced.insert(child.id().to_string());
                }
            })?;
        }
        Ok(self
            .gates
            .values()
            .filter(|gate| !referenced.contains(gate.id()))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;
    use crate::event::BasicEvent;
    use crate::formula::{Formula, Operator};

    #[test]
    fn top_gate_detection() {
        let top = Gate::new(Element::public("top"));
        let child = Gate::new(Element::public("child"));

        let mut child_formula = Formula::new(Operator::Or);
        child_formula
            .add_basic_event(BasicEvent::new(Element::public("a")))
            .unwrap();
        child_formula
            .add_basic_event(BasicEvent::new(Element::public("b")))
            .unwrap();
        child.set_formula(child_formula).unwrap();

        let mut top_formula = Formula::new(Operator::And);
        top_formula.add_gate(Rc::clone(&child)).unwrap();
        top_formula
            .add_basic_event(BasicEvent::new(Element::public("c")))
            .unwrap();
        top.set_formula(top_formula).unwrap();

        let mut tree = FaultTree::new(Element::public("plant"));
        tree.add_gate(Rc::clone(&top)).unwrap();
        tree.add_gate(child).unwrap();

        let tops = tree.top_gates().unwrap();
        assert_eq!(tops.len(), 1);
        assert_eq!(tops[0].id(), "top");
    }

    #[test]
    fn duplicate_gate_is_a_redefinition() {
        let mut tree = FaultTree::new(Element::public("plant"));
        tree.add_gate(Gate::new(Element::public("g"))).unwrap();
        let err = tree.add_gate(Gate::new(Element::public("G"))).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Redefinition(_)));
    }
}
