//! Common-cause failure groups.
//!
//! A group names a set of member basic events, a CCF model, and the model's
//! distribution and factor expressions. Applying the group synthesises one
//! CCF event per non-empty member subset, with the subset probability given
//! by the model, and substitutes every member with a gate OR-ing the CCF
//! events that contain it.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::element::{Element, Named};
use crate::error::{Error, ErrorKind, Result};
use crate::event::{BasicEvent, CcfOrigin, Gate};
use crate::expression::{ArithOp, Expression, ExpressionRef};
use crate::formula::{Formula, Operator};

/// Tolerance for the phi-factor normalisation check.
const PHI_SUM_TOLERANCE: f64 = 1e-4;

/// The supported parametric CCF models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CcfModelKind {
    BetaFactor,
    Mgl,
    AlphaFactor,
    PhiFactor,
}

impl CcfModelKind {
    pub fn parse(text: &str) -> Option<CcfModelKind> {
        Some(match text {
            "beta-factor" => CcfModelKind::BetaFactor,
            "MGL" => CcfModelKind::Mgl,
            "alpha-factor" => CcfModelKind::AlphaFactor,
            "phi-factor" => CcfModelKind::PhiFactor,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CcfModelKind::BetaFactor => "beta-factor",
            CcfModelKind::Mgl => "MGL",
            CcfModelKind::AlphaFactor => "alpha-factor",
            CcfModelKind::PhiFactor => "phi-factor",
        }
    }

    /// The factor level the model starts counting from.
    fn first_level(self) -> u32 {
        match self {
            CcfModelKind::BetaFactor | CcfModelKind::Mgl => 2,
            CcfModelKind::AlphaFactor | CcfModelKind::PhiFactor => 1,
        }
    }
}

/// The outcome of applying a group to the model.
#[derive(Debug)]
pub struct AppliedCcf {
    /// The synthesised CCF events, one per non-empty member subset.
    pub events: Vec<Rc<BasicEvent>>,
    /// The substitution gates, one per member, in member order.
    pub member_gates: Vec<Rc<Gate>>,
}

/// A named common-cause failure group.
#[derive(Debug)]
pub struct CcfGroup {
    element: Element,
    kind: CcfModelKind,
    members: RefCell<IndexMap<String, Rc<BasicEvent>>>,
    distribution: RefCell<Option<ExpressionRef>>,
    factors: RefCell<Vec<(u32, ExpressionRef)>>,
}

impl Named for CcfGroup {
    fn element(&self) -> &Element {
        &self.element
    }
}

impl CcfGroup {
    pub fn new(element: Element, kind: CcfModelKind) -> Rc<Self> {
        Rc::new(Self {
            element,
            kind,
            members: RefCell::new(IndexMap::new()),
            distribution: RefCell::new(None),
            factors: RefCell::new(Vec::new()),
        })
    }

    pub fn kind(&self) -> CcfModelKind {
        self.kind
    }

    pub fn add_member(&self, member: Rc<BasicEvent>) -> Result<()> {
        let mut members = self.members.borrow_mut();
        if members.contains_key(member.id()) {
            return Err(Error::new(ErrorKind::DuplicateArgument(
                member.name().to_string(),
            )));
        }
        members.insert(member.id().to_string(), member);
        Ok(())
    }

    pub fn members(&self) -> Vec<Rc<BasicEvent>> {
        self.members.borrow().values().cloned().collect()
    }

    /// The total failure probability Q shared by every member.
    pub fn set_distribution(&self, q: ExpressionRef) -> Result<()> {
        let mut slot = self.distribution.borrow_mut();
        if slot.is_some() {
            return Err(Error::new(ErrorKind::Logic(format!(
                "distribution of CCF group '{}' is already set",
                self.name()
            ))));
        }
        *slot = Some(q);
        Ok(())
    }

    /// Adds a factor expression; a missing level is assigned positionally
    /// from the model's first level.
    pub fn add_factor(&self, level: Option<u32>, factor: ExpressionRef) -> Result<()> {
        let mut factors = self.factors.borrow_mut();
        let level =
            level.unwrap_or_else(|| self.kind.first_level() + factors.len() as u32);
        if factors.iter().any(|(l, _)| *l == level) {
            return Err(Error::new(ErrorKind::Validation(format!(
                "CCF group '{}' has a duplicate factor for level {level}",
                self.name()
            ))));
        }
        factors.push((level, factor));
        Ok(())
    }

    /// Checks member count, distribution, and the model's factor shape.
    pub fn validate(&self) -> Result<()> {
        let n = self.members.borrow().len();
        if n < 2 {
            return Err(self.validation_error("requires two or more members"));
        }
        let distribution = self.distribution.borrow();
        let q = distribution
            .as_ref()
            .ok_or_else(|| self.validation_error("has no distribution"))?;
        if !q.interval().is_probability() {
            return Err(self.validation_error("distribution domain is outside [0, 1]"));
        }

        let mut factors = self.factors.borrow_mut();
        factors.sort_by_key(|(level, _)| *level);
        let first = self.kind.first_level();
        let expected: Vec<u32> = match self.kind {
            CcfModelKind::BetaFactor => vec![2],
            _ => (first..=n as u32).collect(),
        };
        let actual: Vec<u32> = factors.iter().map(|(level, _)| *level).collect();
        if actual != expected {
            return Err(self.validation_error(&format!(
                "expects factors for levels {expected:?}, got {actual:?}"
            )));
        }
        for (level, factor) in factors.iter() {
            let value = factor.mean();
            if !(0.0..=1.0).contains(&value) {
                return Err(self.validation_error(&format!(
                    "factor for level {level} is outside [0, 1]"
                )));
            }
        }
        if self.kind == CcfModelKind::PhiFactor {
            let sum: f64 = factors.iter().map(|(_, factor)| factor.mean()).sum();
            if (sum - 1.0).abs() > PHI_SUM_TOLERANCE {
                return Err(
                    self.validation_error(&format!("phi factors sum to {sum}, expected 1"))
                );
            }
        }
        Ok(())
    }

    /// Synthesises the CCF events and the per-member substitution gates.
    ///
    /// Members without their own expression receive the group distribution as
    /// their total failure probability.
    pub fn apply(&self) -> Result<AppliedCcf> {
        self.validate()?;
        let members: Vec<Rc<BasicEvent>> = self.members();
        let n = members.len();
        let q = self
            .distribution
            .borrow()
            .clone()
            .ok_or_else(|| self.validation_error("has no distribution"))?;

        for member in &members {
            if !member.has_expression() {
                member.set_expression(Rc::clone(&q))?;
            }
        }

        // One probability expression per failure multiplicity, shared by all
        // events of that multiplicity.
        let mut level_probability = Vec::with_capacity(n);
        for k in 1..=n {
            level_probability.push(self.multiplicity_probability(k, n, &q)?);
        }

        let mut events: Vec<Rc<BasicEvent>> = Vec::with_capacity((1 << n) - 1);
        let mut masks: Vec<u32> = Vec::with_capacity((1 << n) - 1);
        for mask in 1u32..(1 << n) {
            let member_names: Vec<String> = (0..n)
                .filter(|i| mask & (1 << i) != 0)
                .map(|i| members[i].name().to_string())
                .collect();
            let k = member_names.len();
            let name = format!("[{}]", member_names.join(" "));
            let element = Element::new(
                &name,
                self.element.base_path().clone(),
                self.element.role(),
            );
            let event = BasicEvent::new_ccf(
                element,
                CcfOrigin {
                    group: self.id().to_string(),
                    member_names,
                },
            );
            event.set_expression(Rc::clone(&level_probability[k - 1]))?;
            events.push(event);
            masks.push(mask);
        }

        let mut member_gates = Vec::with_capacity(n);
        for (i, member) in members.iter().enumerate() {
            let mut formula = Formula::new(Operator::Or);
            for (event, mask) in events.iter().zip(&masks) {
                if mask & (1 << i) != 0 {
                    formula.add_basic_event(Rc::clone(event))?;
                }
            }
            let gate = Gate::new(Element::new(
                member.name(),
                self.element.base_path().clone(),
                self.element.role(),
            ));
            gate.set_formula(formula)?;
            member.set_ccf_gate(Rc::clone(&gate))?;
            member_gates.push(gate);
        }

        Ok(AppliedCcf {
            events,
            member_gates,
        })
    }

    /// The probability expression for one specific group of `k` members out
    /// of `n` failing together.
    fn multiplicity_probability(&self, k: usize, n: usize, q: &ExpressionRef) -> Result<ExpressionRef> {
        let factors = self.factors.borrow();
        let factor = |level: u32| -> Option<ExpressionRef> {
            factors
                .iter()
                .find(|(l, _)| *l == level)
                .map(|(_, f)| Rc::clone(f))
        };
        let groups_with_member = Expression::constant(binomial(n - 1, k - 1) as f64);

        match self.kind {
            CcfModelKind::BetaFactor => {
                let beta = factor(2).expect("validated beta factor");
                if k == 1 {
                    // (1 - beta) * Q
                    let independent = Expression::arith(
                        ArithOp::Sub,
                        vec![Expression::constant(1.0), beta],
                    )?;
                    Expression::arith(ArithOp::Mul, vec![independent, Rc::clone(q)])
                } else if k == n {
                    Expression::arith(ArithOp::Mul, vec![beta, Rc::clone(q)])
                } else {
                    Ok(Expression::constant(0.0))
                }
            }
            CcfModelKind::Mgl => {
                // prod(pi_2 .. pi_k) * (1 - pi_{k+1}) * Q / C(n-1, k-1)
                let mut terms: Vec<ExpressionRef> = (2..=k as u32)
                    .map(|level| factor(level).expect("validated MGL factor"))
                    .collect();
                if k < n {
                    let next = factor(k as u32 + 1).expect("validated MGL factor");
                    terms.push(Expression::arith(
                        ArithOp::Sub,
                        vec![Expression::constant(1.0), next],
                    )?);
                }
                terms.push(Rc::clone(q));
                let numerator = Expression::arith(ArithOp::Mul, terms)?;
                Expression::arith(ArithOp::Div, vec![numerator, groups_with_member])
            }
            CcfModelKind::AlphaFactor => {
                // k * alpha_k * Q / (C(n-1, k-1) * sum(i * alpha_i))
                let alpha_k = factor(k as u32).expect("validated alpha factor");
                let weighted: Vec<ExpressionRef> = (1..=n as u32)
                    .map(|level| {
                        Expression::arith(
                            ArithOp::Mul,
                            vec![
                                Expression::constant(level as f64),
                                factor(level).expect("validated alpha factor"),
                            ],
                        )
                    })
                    .collect::<Result<_>>()?;
                let total = Expression::arith(ArithOp::Add, weighted)?;
                let numerator = Expression::arith(
                    ArithOp::Mul,
                    vec![Expression::constant(k as f64), alpha_k, Rc::clone(q)],
                )?;
                let denominator =
                    Expression::arith(ArithOp::Mul, vec![groups_with_member, total])?;
                Expression::arith(ArithOp::Div, vec![numerator, denominator])
            }
            CcfModelKind::PhiFactor => {
                // phi_k * Q / C(n-1, k-1)
                let phi_k = factor(k as u32).expect("validated phi factor");
                let numerator = Expression::arith(ArithOp::Mul, vec![phi_k, Rc::clone(q)])?;
                Expression::arith(ArithOp::Div, vec![numerator, groups_with_member])
            }
        }
    }

    fn validation_error(&self, detail: &str) -> Error {
        let err = Error::new(ErrorKind::Validation(format!(
            "CCF group '{}' ({}) {detail}",
            self.name(),
            self.kind.as_str()
        )));
        match self.element.location() {
            Some(location) => err.with_location(location.clone()),
            None => err,
        }
    }
}

fn binomial(n: usize, k: usize) -> u64 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    let mut result: u64 = 1;
    for i in 0..k {
        result = result * (n - i) as u64 / (i + 1) as u64;
    }
    result
}
