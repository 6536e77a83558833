//! Boolean formulae: an operator over a heterogeneous argument sequence.
//!
//! Arguments are stored as one ordered sequence of tagged values plus an
//! id-to-position map used only to reject duplicates; the typed accessors are
//! derived views. Nested formulae have no identity and are always unique.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::element::Named;
use crate::error::{Error, ErrorKind, Result};
use crate::event::{BasicEvent, Gate, HouseEvent};

/// Boolean connectives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    And,
    Or,
    Not,
    Nor,
    Nand,
    Xor,
    /// Pass-through of a single argument.
    Null,
    /// k-out-of-n voting; the vote number k lives on the formula.
    AtLeast,
}

impl Operator {
    pub fn parse(text: &str) -> Option<Operator> {
        Some(match text {
            "and" => Operator::And,
            "or" => Operator::Or,
            "not" => Operator::Not,
            "nor" => Operator::Nor,
            "nand" => Operator::Nand,
            "xor" => Operator::Xor,
            "null" => Operator::Null,
            "atleast" => Operator::AtLeast,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::And => "and",
            Operator::Or => "or",
            Operator::Not => "not",
            Operator::Nor => "nor",
            Operator::Nand => "nand",
            Operator::Xor => "xor",
            Operator::Null => "null",
            Operator::AtLeast => "atleast",
        }
    }

    /// True for connectives that take exactly one argument.
    fn is_single(self) -> bool {
        matches!(self, Operator::Not | Operator::Null)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tagged formula argument.
#[derive(Debug)]
pub enum Arg {
    House(Rc<HouseEvent>),
    Basic(Rc<BasicEvent>),
    Gate(Rc<Gate>),
    Formula(Box<Formula>),
}

/// A Boolean operator node with its arguments.
#[derive(Debug)]
pub struct Formula {
    operator: Operator,
    vote_number: Option<u32>,
    args: Vec<Arg>,
    event_positions: IndexMap<String, usize>,
}

impl Formula {
    pub fn new(operator: Operator) -> Self {
        Self {
            operator,
            vote_number: None,
            args: Vec::new(),
            event_positions: IndexMap::new(),
        }
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// The vote number of an atleast formula.
    pub fn vote_number(&self) -> Option<u32> {
        self.vote_number
    }

    /// Sets the vote number; only atleast formulae accept one, and only once.
    pub fn set_vote_number(&mut self, number: u32) -> Result<()> {
        if self.operator != Operator::AtLeast {
            return Err(Error::new(ErrorKind::Logic(format!(
                "vote number on a {} formula",
                self.operator
            ))));
        }
        if self.vote_number.is_some() {
            return Err(Error::new(ErrorKind::Logic(
                "vote number is already set".into(),
            )));
        }
        if number < 2 {
            return Err(Error::new(ErrorKind::InvalidArgument(format!(
                "vote number {number} is less than 2"
            ))));
        }
        self.vote_number = Some(number);
        Ok(())
    }

    fn insert_event(&mut self, id: &str, name: &str) -> Result<()> {
        if self.event_positions.contains_key(id) {
            return Err(Error::new(ErrorKind::DuplicateArgument(name.to_string())));
        }
        self.event_positions.insert(id.to_string(), self.args.len());
        Ok(())
    }

    pub fn add_house_event(&mut self, event: Rc<HouseEvent>) -> Result<()> {
        self.insert_event(event.id(), event.name())?;
        self.args.push(Arg::House(event));
        Ok(())
    }

    pub fn add_basic_event(&mut self, event: Rc<BasicEvent>) -> Result<()> {
        self.insert_event(event.id(), event.name())?;
        self.args.push(Arg::Basic(event));
        Ok(())
    }

    pub fn add_gate(&mut self, gate: Rc<Gate>) -> Result<()> {
        self.insert_event(gate.id(), gate.name())?;
        self.args.push(Arg::Gate(gate));
        Ok(())
    }

    /// Nested formulae carry no id and are always accepted.
    pub fn add_formula(&mut self, formula: Formula) {
        self.args.push(Arg::Formula(Box::new(formula)));
    }

    pub fn args(&self) -> &[Arg] {
        &self.args
    }

    pub fn num_args(&self) -> usize {
        self.args.len()
    }

    pub fn house_events(&self) -> impl Iterator<Item = &Rc<HouseEvent>> {
        self.args.iter().filter_map(|arg| match arg {
            Arg::House(event) => Some(event),
            _ => None,
        })
    }

    pub fn basic_events(&self) -> impl Iterator<Item = &Rc<BasicEvent>> {
        self.args.iter().filter_map(|arg| match arg {
            Arg::Basic(event) => Some(event),
            _ => None,
        })
    }

    /// Gate arguments: the nodes of the gate graph.
    pub fn gates(&self) -> impl Iterator<Item = &Rc<Gate>> {
        self.args.iter().filter_map(|arg| match arg {
            Arg::Gate(gate) => Some(gate),
            _ => None,
        })
    }

    /// Nested formulae: the connectors of the gate graph.
    pub fn connectors(&self) -> impl Iterator<Item = &Formula> {
        self.args.iter().filter_map(|arg| match arg {
            Arg::Formula(formula) => Some(formula.as_ref()),
            _ => None,
        })
    }

    /// Gate arguments of this formula and all nested formulae.
    pub fn gather_gates(&self, out: &mut Vec<Rc<Gate>>) {
        for arg in &self.args {
            match arg {
                Arg::Gate(gate) => out.push(Rc::clone(gate)),
                Arg::Formula(nested) => nested.gather_gates(out),
                _ => {}
            }
        }
    }

    /// Checks the operator arity and the atleast vote-number bounds,
    /// recursing into nested formulae.
    pub fn validate(&self) -> Result<()> {
        let n = self.args.len();
        if self.operator.is_single() {
            if n != 1 {
                return Err(Error::new(ErrorKind::Validation(format!(
                    "{} formula requires exactly one argument, got {n}",
                    self.operator
                ))));
            }
        } else if n < 2 {
            return Err(Error::new(ErrorKind::Validation(format!(
                "{} formula requires two or more arguments, got {n}",
                self.operator
            ))));
        }
        if self.operator == Operator::AtLeast {
            let k = self.vote_number.ok_or_else(|| {
                Error::new(ErrorKind::Validation(
                    "atleast formula is missing its vote number".into(),
                ))
            })?;
            if (k as usize) >= n {
                return Err(Error::new(ErrorKind::Validation(format!(
                    "vote number {k} must be less than the number of arguments {n}"
                ))));
            }
        }
        for nested in self.connectors() {
            nested.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;

    #[test]
    fn duplicate_event_argument_is_rejected() {
        let event = BasicEvent::new(Element::public("pump"));
        let mut formula = Formula::new(Operator::And);
        formula.add_basic_event(Rc::clone(&event)).unwrap();
        let err = formula.add_basic_event(event).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::DuplicateArgument(name) if name == "pump"));
    }

    #[test]
    fn duplicate_detection_spans_argument_types() {
        // A gate and a basic event sharing an id cannot both be arguments.
        let event = BasicEvent::new(Element::public("x"));
        let gate = Gate::new(Element::public("X"));
        let mut formula = Formula::new(Operator::Or);
        formula.add_basic_event(event).unwrap();
        let err = formula.add_gate(gate).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::DuplicateArgument(_)));
    }

    #[test]
    fn null_requires_exactly_one_argument() {
        let mut formula = Formula::new(Operator::Null);
        formula
            .add_basic_event(BasicEvent::new(Element::public("a")))
            .unwrap();
        assert!(formula.validate().is_ok());
        formula
            .add_basic_event(BasicEvent::new(Element::public("b")))
            .unwrap();
        assert!(formula.validate().is_err());
    }

    #[test]
    fn atleast_vote_number_bounds() {
        let mut formula = Formula::new(Operator::AtLeast);
        for name in ["a", "b", "c"] {
            formula
                .add_basic_event(BasicEvent::new(Element::public(name)))
                .unwrap();
        }
        assert!(formula.validate().is_err()); // no vote number yet
        formula.set_vote_number(2).unwrap();
        assert!(formula.validate().is_ok());

        let mut too_high = Formula::new(Operator::AtLeast);
        for name in ["a", "b"] {
            too_high
                .add_basic_event(BasicEvent::new(Element::public(name)))
                .unwrap();
        }
        too_high.set_vote_number(2).unwrap();
        assert!(too_high.validate().is_err()); // k must stay below n
    }

    #[test]
    fn vote_number_is_refused_outside_atleast() {
        let mut formula = Formula::new(Operator::And);
        let err = formula.set_vote_number(2).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Logic(_)));
    }

    #[test]
    fn nested_formulae_are_validated() {
        let mut inner = Formula::new(Operator::Not);
        inner
            .add_basic_event(BasicEvent::new(Element::public("a")))
            .unwrap();
        let mut bad_inner = Formula::new(Operator::And);
        bad_inner
            .add_basic_event(BasicEvent::new(Element::public("b")))
            .unwrap();

        let mut outer = Formula::new(Operator::Or);
        outer
            .add_basic_event(BasicEvent::new(Element::public("c")))
            .unwrap();
        outer.add_formula(inner);
        outer.add_formula(bad_inner);
        assert!(outer.validate().is_err());
    }
}
