//! Named parameters and the mission-time handle.
//!
//! Parameters are the only expressions expected to be shared; they carry a
//! unit tag, cache their mean for cheap repeated reads, and form their own
//! dependency graph that must stay acyclic.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::element::{Element, Named};
use crate::error::{Error, ErrorKind, Result};
use crate::expression::{Expression, ExpressionRef, Interval};

/// Unit tags attachable to parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    Unitless,
    Bool,
    Int,
    Float,
    Hours,
    InverseHours,
    Years,
    InverseYears,
    Fit,
    Demands,
}

impl Unit {
    pub fn parse(text: &str) -> Option<Unit> {
        Some(match text {
            "unitless" => Unit::Unitless,
            "bool" => Unit::Bool,
            "int" => Unit::Int,
            "float" => Unit::Float,
            "hours" => Unit::Hours,
            "hours-1" => Unit::InverseHours,
            "years" => Unit::Years,
            "years-1" => Unit::InverseYears,
            "fit" => Unit::Fit,
            "demands" => Unit::Demands,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Unit::Unitless => "unitless",
            Unit::Bool => "bool",
            Unit::Int => "int",
            Unit::Float => "float",
            Unit::Hours => "hours",
            Unit::InverseHours => "hours-1",
            Unit::Years => "years",
            Unit::InverseYears => "years-1",
            Unit::Fit => "fit",
            Unit::Demands => "demands",
        }
    }
}

/// The process-wide mission-time scalar, shared through an immutable handle.
/// Changing the value requires a parameter-cache sweep by the caller.
#[derive(Debug)]
pub struct MissionTime {
    value: Cell<f64>,
    unit: Unit,
}

impl MissionTime {
    pub fn new(value: f64) -> Rc<Self> {
        Rc::new(Self {
            value: Cell::new(value),
            unit: Unit::Hours,
        })
    }

    pub fn value(&self) -> f64 {
        self.value.get()
    }

    pub fn set_value(&self, value: f64) {
        self.value.set(value);
    }

    pub fn unit(&self) -> Unit {
        self.unit
    }
}

/// A named, typed, reusable expression.
#[derive(Debug)]
pub struct Parameter {
    element: Element,
    unit: Cell<Option<Unit>>,
    expression: RefCell<Option<ExpressionRef>>,
    mean_cache: Cell<Option<f64>>,
}

impl Named for Parameter {
    fn element(&self) -> &Element {
        &self.element
    }
}

impl Parameter {
    pub fn new(element: Element) -> Rc<Self> {
        Rc::new(Self {
            element,
            unit: Cell::new(None),
            expression: RefCell::new(None),
            mean_cache: Cell::new(None),
        })
    }

    pub fn unit(&self) -> Option<Unit> {
        self.unit.get()
    }

    pub fn set_unit(&self, unit: Unit) {
        self.unit.set(Some(unit));
    }

    /// Binds or replaces the parameter's expression. The new dependency edge
    /// is checked for cycles; replacement invalidates the mean cache.
    pub fn set_expression(&self, expression: ExpressionRef) -> Result<()> {
        if let Some(cycle) = find_cycle(self.id(), &expression, &mut vec![self.name().to_string()])
        {
            return Err(Error::new(ErrorKind::Cycle(cycle)));
        }
        *self.expression.borrow_mut() = Some(expression);
        self.mean_cache.set(None);
        Ok(())
    }

    pub fn expression(&self) -> Option<ExpressionRef> {
        self.expression.borrow().clone()
    }

    pub fn has_expression(&self) -> bool {
        self.expression.borrow().is_some()
    }

    /// The cached mean; NaN when the expression is not yet bound (the
    /// validator rejects such models before analysis).
    pub fn mean(&self) -> f64 {
        if let Some(value) = self.mean_cache.get() {
            return value;
        }
        match self.expression.borrow().as_ref() {
            Some(expression) => {
                let value = expression.mean();
                self.mean_cache.set(Some(value));
                value
            }
            None => f64::NAN,
        }
    }

    /// One draw per sampling cycle; shared references observe the same value.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        match self.expression.borrow().as_ref() {
            Some(expression) => expression.sample(rng),
            None => f64::NAN,
        }
    }

    pub fn reset(&self) {
        if let Some(expression) = self.expression.borrow().as_ref() {
            expression.reset();
        }
    }

    /// Drops the cached mean; used by the mission-time sweep.
    pub fn clear_mean_cache(&self) {
        self.mean_cache.set(None);
    }

    pub fn interval(&self) -> Interval {
        match self.expression.borrow().as_ref() {
            Some(expression) => expression.interval(),
            None => Interval::closed(f64::NAN, f64::NAN),
        }
    }

    pub fn is_constant(&self) -> bool {
        self.expression
            .borrow()
            .as_ref()
            .map_or(true, |e| e.is_constant())
    }
}

/// Depth-first search for `target` through the parameter edges of `expr`.
/// Returns the full cycle path on detection.
fn find_cycle(target: &str, expr: &Expression, path: &mut Vec<String>) -> Option<Vec<String>> {
    for parameter in expr.direct_parameters() {
        path.push(parameter.name().to_string());
        if parameter.id() == target {
            return Some(path.clone());
        }
        if let Some(child) = parameter.expression() {
            if let Some(cycle) = find_cycle(target, &child, path) {
                return Some(cycle);
            }
        }
        path.pop();
    }
    None
}
