//! Fault-tree events: house events, basic events, CCF events, and gates.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use rand::Rng;

use crate::element::{Element, Named};
use crate::error::{Error, ErrorKind, Result};
use crate::expression::ExpressionRef;
use crate::formula::Formula;

/// A leaf event with a fixed boolean state: on and off map to probability
/// one and zero.
#[derive(Debug)]
pub struct HouseEvent {
    element: Element,
    state: Cell<Option<bool>>,
    orphan: Cell<bool>,
}

impl Named for HouseEvent {
    fn element(&self) -> &Element {
        &self.element
    }
}

impl HouseEvent {
    pub fn new(element: Element) -> Rc<Self> {
        Rc::new(Self {
            element,
            state: Cell::new(None),
            orphan: Cell::new(false),
        })
    }

    pub fn set_state(&self, state: bool) {
        self.state.set(Some(state));
    }

    /// The event state; defaults to off until set.
    pub fn state(&self) -> bool {
        self.state.get().unwrap_or(false)
    }

    pub fn has_expression(&self) -> bool {
        self.state.get().is_some()
    }

    pub fn p(&self) -> f64 {
        if self.state() {
            1.0
        } else {
            0.0
        }
    }

    pub fn orphan(&self) -> bool {
        self.orphan.get()
    }

    pub fn set_orphan(&self, orphan: bool) {
        self.orphan.set(orphan);
    }
}

/// Provenance of a basic event synthesised by a CCF group: the group id and
/// the ordered names of the members this event fails together.
#[derive(Debug, Clone)]
pub struct CcfOrigin {
    pub group: String,
    pub member_names: Vec<String>,
}

/// A leaf event whose failure is governed by an expression.
#[derive(Debug)]
pub struct BasicEvent {
    element: Element,
    expression: RefCell<Option<ExpressionRef>>,
    ccf_gate: RefCell<Option<Rc<Gate>>>,
    ccf_origin: Option<CcfOrigin>,
    orphan: Cell<bool>,
}

impl Named for BasicEvent {
    fn element(&self) -> &Element {
        &self.element
    }
}

impl BasicEvent {
    pub fn new(element: Element) -> Rc<Self> {
        Rc::new(Self {
            element,
            expression: RefCell::new(None),
            ccf_gate: RefCell::new(None),
            ccf_origin: None,
            orphan: Cell::new(false),
        })
    }

    /// A basic event representing the joint failure of CCF group members.
    pub fn new_ccf(element: Element, origin: CcfOrigin) -> Rc<Self> {
        Rc::new(Self {
            element,
            expression: RefCell::new(None),
            ccf_gate: RefCell::new(None),
            ccf_origin: Some(origin),
            orphan: Cell::new(false),
        })
    }

    pub fn has_expression(&self) -> bool {
        self.expression.borrow().is_some()
    }

    /// Assigns the probability expression; assignment is at most once.
    pub fn set_expression(&self, expression: ExpressionRef) -> Result<()> {
        let mut slot = self.expression.borrow_mut();
        if slot.is_some() {
            return Err(Error::new(ErrorKind::Logic(format!(
                "expression of basic event '{}' is already set",
                self.name()
            ))));
        }
        *slot = Some(expression);
        Ok(())
    }

    pub fn expression(&self) -> Option<ExpressionRef> {
        self.expression.borrow().clone()
    }

    /// The mean probability. Callers must check `has_expression` first; the
    /// value is NaN otherwise.
    pub fn p(&self) -> f64 {
        debug_assert!(self.has_expression());
        self.expression
            .borrow()
            .as_ref()
            .map_or(f64::NAN, |e| e.mean())
    }

    /// One probability draw within the current sampling cycle.
    pub fn sample_probability<R: Rng>(&self, rng: &mut R) -> f64 {
        debug_assert!(self.has_expression());
        self.expression
            .borrow()
            .as_ref()
            .map_or(f64::NAN, |e| e.sample(rng))
    }

    pub fn reset(&self) {
        if let Some(expression) = self.expression.borrow().as_ref() {
            expression.reset();
        }
    }

    pub fn is_constant(&self) -> bool {
        self.expression
            .borrow()
            .as_ref()
            .map_or(true, |e| e.is_constant())
    }

    /// Checks that the expression domain stays within [0, 1].
    pub fn validate(&self) -> Result<()> {
        let located = |err: Error| match self.element.location() {
            Some(location) => err.with_location(location.clone()),
            None => err,
        };
        let borrowed = self.expression.borrow();
        let expression = borrowed.as_ref().ok_or_else(|| {
            located(Error::new(ErrorKind::Validation(format!(
                "basic event '{}' has no probability expression",
                self.name()
            ))))
        })?;
        let interval = expression.interval();
        if !interval.is_probability() {
            return Err(located(Error::new(ErrorKind::Validation(format!(
                "probability of basic event '{}' has domain [{}, {}] outside [0, 1]",
                self.name(),
                interval.lower(),
                interval.upper()
            )))));
        }
        Ok(())
    }

    pub fn has_ccf(&self) -> bool {
        self.ccf_gate.borrow().is_some()
    }

    /// The gate that substitutes this event in common-cause analysis.
    pub fn ccf_gate(&self) -> Option<Rc<Gate>> {
        self.ccf_gate.borrow().clone()
    }

    /// Set by CCF group application; at most once.
    pub fn set_ccf_gate(&self, gate: Rc<Gate>) -> Result<()> {
        let mut slot = self.ccf_gate.borrow_mut();
        if slot.is_some() {
            return Err(Error::new(ErrorKind::Logic(format!(
                "CCF gate of basic event '{}' is already set",
                self.name()
            ))));
        }
        *slot = Some(gate);
        Ok(())
    }

    pub fn is_ccf_event(&self) -> bool {
        self.ccf_origin.is_some()
    }

    pub fn ccf_origin(&self) -> Option<&CcfOrigin> {
        self.ccf_origin.as_ref()
    }

    pub fn orphan(&self) -> bool {
        self.orphan.get()
    }

    pub fn set_orphan(&self, orphan: bool) {
        self.orphan.set(orphan);
    }
}

/// An internal node owning exactly one Boolean formula.
#[derive(Debug)]
pub struct Gate {
    element: Element,
    formula: RefCell<Option<Formula>>,
    orphan: Cell<bool>,
}

impl Named for Gate {
    fn element(&self) -> &Element {
        &self.element
    }
}

impl Gate {
    pub fn new(element: Element) -> Rc<Self> {
        Rc::new(Self {
            element,
            formula: RefCell::new(None),
            orphan: Cell::new(false),
        })
    }

    pub fn has_formula(&self) -> bool {
        self.formula.borrow().is_some()
    }

    /// Assigns the gate's formula; assignment is at most once.
    pub fn set_formula(&self, formula: Formula) -> Result<()> {
        let mut slot = self.formula.borrow_mut();
        if slot.is_some() {
            return Err(Error::new(ErrorKind::Logic(format!(
                "formula of gate '{}' is already set",
                self.name()
            ))));
        }
        *slot = Some(formula);
        Ok(())
    }

    /// Runs `f` over the gate's formula.
    ///
    /// The formula is owned exclusively by the gate, so access goes through a
    /// borrow instead of handing out references.
    pub fn with_formula<T>(&self, f: impl FnOnce(&Formula) -> T) -> Result<T> {
        let borrowed = self.formula.borrow();
        let formula = borrowed.as_ref().ok_or_else(|| {
            Error::new(ErrorKind::Validation(format!(
                "gate '{}' has no formula",
                self.name()
            )))
        })?;
        Ok(f(formula))
    }

    /// Checks the gate's formula setup.
    pub fn validate(&self) -> Result<()> {
        self.with_formula(|formula| formula.validate())?
    }

    pub fn orphan(&self) -> bool {
        self.orphan.get()
    }

    pub fn set_orphan(&self, orphan: bool) {
        self.orphan.set(orphan);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::Expression;

    #[test]
    fn house_event_state_maps_to_probability() {
        let h = HouseEvent::new(Element::public("maintenance"));
        assert!(!h.has_expression());
        assert_eq!(h.p(), 0.0);
        h.set_state(true);
        assert!(h.has_expression());
        assert_eq!(h.p(), 1.0);
    }

    #[test]
    fn basic_event_expression_is_set_once() {
        let b = BasicEvent::new(Element::public("pump"));
        b.set_expression(Expression::constant(0.1)).unwrap();
        assert!((b.p() - 0.1).abs() < 1e-12);
        let err = b.set_expression(Expression::constant(0.2)).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Logic(_)));
    }

    #[test]
    fn out_of_range_probability_fails_validation() {
        let b = BasicEvent::new(Element::public("pump"));
        b.set_expression(Expression::constant(1.5)).unwrap();
        let err = b.validate().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Validation(_)));
    }

    #[test]
    fn missing_expression_fails_validation() {
        let b = BasicEvent::new(Element::public("pump"));
        let err = b.validate().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Validation(_)));
    }
}
