//! The expression tree underlying all probability data.
//!
//! An expression is a tagged variant over constants, the mission-time handle,
//! shared parameters, random deviates, arithmetic and boolean operators, and
//! reliability built-ins. Every node exposes the same protocol:
//!
//! - `mean()` — deterministic point value; random deviates substitute the
//!   mean of each argument instead of sampling.
//! - `sample(rng)` — draws once per sampling cycle and memoises the draw
//!   until `reset()`.
//! - `interval()` — analytic support bounds used for validation.
//! - `is_constant()` — true iff no random deviate is reachable.
//!
//! Operator-specific preconditions (a division whose denominator straddles
//! zero, a non-positive log argument) are rejected at construction.

use std::cell::Cell;
use std::rc::Rc;

use rand::Rng;

use crate::builtins::Builtin;
use crate::deviate::Deviate;
use crate::error::{Error, ErrorKind, Result};
use crate::parameter::{MissionTime, Parameter, Unit};

/// Closed validation-domain interval for expression values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    lower: f64,
    upper: f64,
}

impl Interval {
    pub fn closed(lower: f64, upper: f64) -> Self {
        debug_assert!(!(lower > upper));
        Self { lower, upper }
    }

    pub fn singleton(value: f64) -> Self {
        Self {
            lower: value,
            upper: value,
        }
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }

    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }

    /// True if all values lie within the probability domain [0, 1].
    pub fn is_probability(&self) -> bool {
        self.lower >= 0.0 && self.upper <= 1.0
    }

    pub fn is_non_negative(&self) -> bool {
        self.lower >= 0.0
    }

    pub fn is_positive(&self) -> bool {
        self.lower > 0.0
    }

    /// The smallest interval covering both operands.
    pub fn hull(&self, other: Interval) -> Interval {
        Interval::closed(self.lower.min(other.lower), self.upper.max(other.upper))
    }
}

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Neg,
    Add,
    Sub,
    Mul,
    Div,
    Abs,
    Min,
    Max,
    Mean,
    Pow,
    Exp,
    Log,
    Log10,
    Mod,
}

impl ArithOp {
    /// (min, max) argument counts; `None` max means unbounded.
    fn arity(self) -> (usize, Option<usize>) {
        match self {
            ArithOp::Neg | ArithOp::Abs | ArithOp::Exp | ArithOp::Log | ArithOp::Log10 => {
                (1, Some(1))
            }
            ArithOp::Pow | ArithOp::Mod => (2, Some(2)),
            _ => (2, None),
        }
    }

    fn fold(self, acc: f64, next: f64) -> f64 {
        match self {
            ArithOp::Add => acc + next,
            ArithOp::Sub => acc - next,
            ArithOp::Mul => acc * next,
            ArithOp::Div => acc / next,
            ArithOp::Min => acc.min(next),
            ArithOp::Max => acc.max(next),
            _ => unreachable!("not a fold operator"),
        }
    }
}

/// Boolean operators; the numeric convention is 0 = false, anything else = true.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    Not,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl LogicalOp {
    fn arity(self) -> (usize, Option<usize>) {
        match self {
            LogicalOp::Not => (1, Some(1)),
            LogicalOp::And | LogicalOp::Or => (2, None),
            _ => (2, Some(2)),
        }
    }
}

/// The closed set of expression cases.
#[derive(Debug)]
pub enum ExprKind {
    Constant(f64),
    MissionTime(Rc<MissionTime>),
    Parameter(Rc<Parameter>),
    Deviate(Deviate),
    Arith {
        op: ArithOp,
        args: Vec<ExpressionRef>,
    },
    Logical {
        op: LogicalOp,
        args: Vec<ExpressionRef>,
    },
    Ite {
        condition: ExpressionRef,
        then: ExpressionRef,
        otherwise: ExpressionRef,
    },
    Builtin(Builtin),
}

/// An expression node with its per-cycle sample memo.
#[derive(Debug)]
pub struct Expression {
    kind: ExprKind,
    sampled: Cell<Option<f64>>,
}

/// Expressions are shared through reference-counted handles; only parameters
/// are expected to be referenced from more than one place.
pub type ExpressionRef = Rc<Expression>;

fn truthy(value: f64) -> bool {
    value != 0.0
}

impl Expression {
    fn wrap(kind: ExprKind) -> ExpressionRef {
        Rc::new(Self {
            kind,
            sampled: Cell::new(None),
        })
    }

    pub fn constant(value: f64) -> ExpressionRef {
        Self::wrap(ExprKind::Constant(value))
    }

    /// Boolean constant as 1 or 0.
    pub fn constant_bool(value: bool) -> ExpressionRef {
        Self::constant(if value { 1.0 } else { 0.0 })
    }

    pub fn mission_time(handle: Rc<MissionTime>) -> ExpressionRef {
        Self::wrap(ExprKind::MissionTime(handle))
    }

    pub fn parameter(parameter: Rc<Parameter>) -> ExpressionRef {
        Self::wrap(ExprKind::Parameter(parameter))
    }

    /// Wraps a validated random deviate.
    pub fn deviate(deviate: Deviate) -> Result<ExpressionRef> {
        deviate.validate()?;
        Ok(Self::wrap(ExprKind::Deviate(deviate)))
    }

    /// Wraps a validated reliability built-in.
    pub fn builtin(builtin: Builtin) -> Result<ExpressionRef> {
        builtin.validate()?;
        Ok(Self::wrap(ExprKind::Builtin(builtin)))
    }

    pub fn arith(op: ArithOp, args: Vec<ExpressionRef>) -> Result<ExpressionRef> {
        check_arity("arithmetic expression", op.arity(), args.len())?;
        match op {
            ArithOp::Div | ArithOp::Mod => {
                for arg in &args[1..] {
                    if arg.interval().contains(0.0) {
                        return Err(Error::new(ErrorKind::InvalidArgument(
                            "division by an expression whose domain contains zero".into(),
                        )));
                    }
                }
            }
            ArithOp::Log | ArithOp::Log10 => {
                if !args[0].interval().is_positive() {
                    return Err(Error::new(ErrorKind::InvalidArgument(
                        "logarithm argument domain must be positive".into(),
                    )));
                }
            }
            _ => {}
        }
        Ok(Self::wrap(ExprKind::Arith { op, args }))
    }

    pub fn logical(op: LogicalOp, args: Vec<ExpressionRef>) -> Result<ExpressionRef> {
        check_arity("boolean expression", op.arity(), args.len())?;
        Ok(Self::wrap(ExprKind::Logical { op, args }))
    }

    pub fn ite(
        condition: ExpressionRef,
        then: ExpressionRef,
        otherwise: ExpressionRef,
    ) -> ExpressionRef {
        Self::wrap(ExprKind::Ite {
            condition,
            then,
            otherwise,
        })
    }

    pub fn kind(&self) -> &ExprKind {
        &self.kind
    }

    /// The deterministic point value. Random deviates substitute the mean of
    /// each argument expression rather than sampling.
    pub fn mean(&self) -> f64 {
        self.kind.compute(&mut |arg| arg.mean())
    }

    /// Draws once per sampling cycle; repeated calls within the cycle return
    /// the memoised draw.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        if let Some(value) = self.sampled.get() {
            return value;
        }
        let value = match &self.kind {
            ExprKind::Constant(v) => *v,
            ExprKind::MissionTime(mt) => mt.value(),
            ExprKind::Parameter(p) => p.sample(rng),
            ExprKind::Deviate(d) => d.sample(rng),
            kind => kind.compute(&mut |arg| arg.sample(rng)),
        };
        self.sampled.set(Some(value));
        value
    }

    /// Clears the sample memo, recursively through all arguments.
    pub fn reset(&self) {
        if self.sampled.take().is_none() && !matches!(self.kind, ExprKind::Parameter(_)) {
            // Never sampled since the last reset; arguments were not either.
            return;
        }
        match &self.kind {
            ExprKind::Constant(_) | ExprKind::MissionTime(_) => {}
            ExprKind::Parameter(p) => p.reset(),
            ExprKind::Deviate(d) => d.for_each_arg(&mut |arg| arg.reset()),
            ExprKind::Builtin(b) => b.for_each_arg(&mut |arg| arg.reset()),
            ExprKind::Arith { args, .. } | ExprKind::Logical { args, .. } => {
                for arg in args {
                    arg.reset();
                }
            }
            ExprKind::Ite {
                condition,
                then,
                otherwise,
            } => {
                condition.reset();
                then.reset();
                otherwise.reset();
            }
        }
    }

    /// Analytic support bounds.
    pub fn interval(&self) -> Interval {
        match &self.kind {
            ExprKind::Constant(v) => Interval::singleton(*v),
            ExprKind::MissionTime(mt) => Interval::closed(0.0, mt.value().max(0.0)),
            ExprKind::Parameter(p) => p.interval(),
            ExprKind::Deviate(d) => d.interval(),
            ExprKind::Builtin(b) => b.interval(),
            ExprKind::Arith { op, args } => arith_interval(*op, args),
            ExprKind::Logical { .. } => Interval::closed(0.0, 1.0),
            ExprKind::Ite {
                then, otherwise, ..
            } => then.interval().hull(otherwise.interval()),
        }
    }

    /// True iff no random deviate is reachable from this node.
    pub fn is_constant(&self) -> bool {
        match &self.kind {
            ExprKind::Constant(_) | ExprKind::MissionTime(_) => true,
            ExprKind::Parameter(p) => p.is_constant(),
            ExprKind::Deviate(_) => false,
            ExprKind::Builtin(b) => {
                let mut constant = true;
                b.for_each_arg(&mut |arg| constant &= arg.is_constant());
                constant
            }
            ExprKind::Arith { args, .. } | ExprKind::Logical { args, .. } => {
                args.iter().all(|arg| arg.is_constant())
            }
            ExprKind::Ite {
                condition,
                then,
                otherwise,
            } => condition.is_constant() && then.is_constant() && otherwise.is_constant(),
        }
    }

    /// Re-checks operator preconditions across the whole tree. Construction
    /// already validates, but parameters bound after construction defer
    /// judgment until this pass; the validator runs it once the parameter
    /// graph is known to be acyclic.
    pub fn validate(&self) -> Result<()> {
        match &self.kind {
            ExprKind::Constant(_) | ExprKind::MissionTime(_) => Ok(()),
            ExprKind::Parameter(p) => match p.expression() {
                Some(child) => child.validate(),
                None => Ok(()),
            },
            ExprKind::Deviate(d) => {
                d.validate()?;
                let mut result = Ok(());
                d.for_each_arg(&mut |arg| {
                    if result.is_ok() {
                        result = arg.validate();
                    }
                });
                result
            }
            ExprKind::Builtin(b) => {
                b.validate()?;
                let mut result = Ok(());
                b.for_each_arg(&mut |arg| {
                    if result.is_ok() {
                        result = arg.validate();
                    }
                });
                result
            }
            ExprKind::Arith { op, args } => {
                match op {
                    ArithOp::Div | ArithOp::Mod => {
                        for arg in &args[1..] {
                            if arg.interval().contains(0.0) {
                                return Err(Error::new(ErrorKind::Validation(
                                    "division by an expression whose domain contains zero".into(),
                                )));
                            }
                        }
                    }
                    ArithOp::Log | ArithOp::Log10 => {
                        if !args[0].interval().is_positive() {
                            return Err(Error::new(ErrorKind::Validation(
                                "logarithm argument domain must be positive".into(),
                            )));
                        }
                    }
                    _ => {}
                }
                args.iter().try_for_each(|arg| arg.validate())
            }
            ExprKind::Logical { args, .. } => args.iter().try_for_each(|arg| arg.validate()),
            ExprKind::Ite {
                condition,
                then,
                otherwise,
            } => {
                condition.validate()?;
                then.validate()?;
                otherwise.validate()
            }
        }
    }

    /// The unit this expression carries, if any. Additive operators and
    /// extrema preserve the unit of their arguments and reject mixes;
    /// multiplicative operators, deviates, and built-ins derive no unit.
    /// Untagged arguments act as wildcards.
    pub fn inferred_unit(&self) -> Result<Option<Unit>> {
        match &self.kind {
            ExprKind::Constant(_) => Ok(None),
            ExprKind::MissionTime(mt) => Ok(Some(mt.unit())),
            ExprKind::Parameter(p) => {
                if let Some(declared) = p.unit() {
                    return Ok(Some(declared));
                }
                match p.expression() {
                    Some(child) => child.inferred_unit(),
                    None => Ok(None),
                }
            }
            ExprKind::Arith { op, args } => {
                let children: Vec<Option<Unit>> = args
                    .iter()
                    .map(|arg| arg.inferred_unit())
                    .collect::<Result<_>>()?;
                match op {
                    ArithOp::Add
                    | ArithOp::Sub
                    | ArithOp::Min
                    | ArithOp::Max
                    | ArithOp::Mean
                    | ArithOp::Neg
                    | ArithOp::Abs => {
                        let mut unit = None;
                        for child in children {
                            match (unit, child) {
                                (None, tagged) => unit = tagged,
                                (Some(a), Some(b)) if a != b => {
                                    return Err(Error::new(ErrorKind::Validation(format!(
                                        "unit mismatch: {} combined with {}",
                                        a.as_str(),
                                        b.as_str()
                                    ))));
                                }
                                _ => {}
                            }
                        }
                        Ok(unit)
                    }
                    _ => Ok(None),
                }
            }
            ExprKind::Deviate(d) => {
                let mut result = Ok(());
                d.for_each_arg(&mut |arg| {
                    if result.is_ok() {
                        result = arg.inferred_unit().map(|_| ());
                    }
                });
                result.map(|()| None)
            }
            ExprKind::Builtin(b) => {
                let mut result = Ok(());
                b.for_each_arg(&mut |arg| {
                    if result.is_ok() {
                        result = arg.inferred_unit().map(|_| ());
                    }
                });
                result.map(|()| None)
            }
            ExprKind::Logical { args, .. } => {
                for arg in args {
                    arg.inferred_unit()?;
                }
                Ok(Some(Unit::Bool))
            }
            ExprKind::Ite {
                condition,
                then,
                otherwise,
            } => {
                condition.inferred_unit()?;
                let a = then.inferred_unit()?;
                let b = otherwise.inferred_unit()?;
                match (a, b) {
                    (Some(a), Some(b)) if a != b => Err(Error::new(ErrorKind::Validation(
                        format!(
                            "unit mismatch between branches: {} and {}",
                            a.as_str(),
                            b.as_str()
                        ),
                    ))),
                    (Some(unit), _) | (_, Some(unit)) => Ok(Some(unit)),
                    _ => Ok(None),
                }
            }
        }
    }

    /// Parameters directly referenced by this expression tree, without
    /// descending into the referenced parameters' own expressions. This is
    /// the edge relation of the parameter dependency graph.
    pub fn direct_parameters(&self) -> Vec<Rc<Parameter>> {
        let mut found = Vec::new();
        self.collect_parameters(&mut found);
        found
    }

    fn collect_parameters(&self, found: &mut Vec<Rc<Parameter>>) {
        match &self.kind {
            ExprKind::Constant(_) | ExprKind::MissionTime(_) => {}
            ExprKind::Parameter(p) => found.push(Rc::clone(p)),
            ExprKind::Deviate(d) => d.for_each_arg(&mut |arg| arg.collect_parameters(found)),
            ExprKind::Builtin(b) => b.for_each_arg(&mut |arg| arg.collect_parameters(found)),
            ExprKind::Arith { args, .. } | ExprKind::Logical { args, .. } => {
                for arg in args {
                    arg.collect_parameters(found);
                }
            }
            ExprKind::Ite {
                condition,
                then,
                otherwise,
            } => {
                condition.collect_parameters(found);
                then.collect_parameters(found);
                otherwise.collect_parameters(found);
            }
        }
    }
}

impl ExprKind {
    /// Evaluates this node with an argument-value extractor; the mean path
    /// passes `Expression::mean`, the sampling path passes memoised draws.
    fn compute(&self, eval: &mut dyn FnMut(&Expression) -> f64) -> f64 {
        match self {
            ExprKind::Constant(v) => *v,
            ExprKind::MissionTime(mt) => mt.value(),
            ExprKind::Parameter(p) => p.mean(),
            ExprKind::Deviate(d) => d.mean_with(eval),
            ExprKind::Builtin(b) => b.compute(eval),
            ExprKind::Arith { op, args } => match op {
                ArithOp::Neg => -eval(&args[0]),
                ArithOp::Abs => eval(&args[0]).abs(),
                ArithOp::Exp => eval(&args[0]).exp(),
                ArithOp::Log => eval(&args[0]).ln(),
                ArithOp::Log10 => eval(&args[0]).log10(),
                ArithOp::Pow => eval(&args[0]).powf(eval(&args[1])),
                ArithOp::Mod => eval(&args[0]) % eval(&args[1]),
                ArithOp::Mean => {
                    let sum: f64 = args.iter().map(|arg| eval(arg)).sum();
                    sum / args.len() as f64
                }
                op => {
                    let mut iter = args.iter();
                    let first = eval(iter.next().unwrap());
                    iter.fold(first, |acc, arg| op.fold(acc, eval(arg)))
                }
            },
            ExprKind::Logical { op, args } => {
                let result = match op {
                    LogicalOp::Not => !truthy(eval(&args[0])),
                    LogicalOp::And => args.iter().all(|arg| truthy(eval(arg))),
                    LogicalOp::Or => args.iter().any(|arg| truthy(eval(arg))),
                    LogicalOp::Eq => eval(&args[0]) == eval(&args[1]),
                    LogicalOp::Ne => eval(&args[0]) != eval(&args[1]),
                    LogicalOp::Lt => eval(&args[0]) < eval(&args[1]),
                    LogicalOp::Le => eval(&args[0]) <= eval(&args[1]),
                    LogicalOp::Gt => eval(&args[0]) > eval(&args[1]),
                    LogicalOp::Ge => eval(&args[0]) >= eval(&args[1]),
                };
                if result {
                    1.0
                } else {
                    0.0
                }
            }
            ExprKind::Ite {
                condition,
                then,
                otherwise,
            } => {
                if truthy(eval(condition)) {
                    eval(then)
                } else {
                    eval(otherwise)
                }
            }
        }
    }
}

fn check_arity(what: &str, (min, max): (usize, Option<usize>), actual: usize) -> Result<()> {
    let ok = actual >= min && max.map_or(true, |m| actual <= m);
    if !ok {
        return Err(Error::new(ErrorKind::InvalidArgument(format!(
            "{what} requires {min}{} argument(s), got {actual}",
            match max {
                Some(m) if m == min => String::new(),
                Some(m) => format!("..{m}"),
                None => " or more".into(),
            }
        ))));
    }
    Ok(())
}

/// Composes argument supports. Monotonic operators use endpoint corners; the
/// remaining cases widen conservatively.
fn arith_interval(op: ArithOp, args: &[ExpressionRef]) -> Interval {
    let corners = |op: ArithOp, a: Interval, b: Interval| {
        let candidates = [
            op.fold(a.lower(), b.lower()),
            op.fold(a.lower(), b.upper()),
            op.fold(a.upper(), b.lower()),
            op.fold(a.upper(), b.upper()),
        ];
        let mut lower = candidates[0];
        let mut upper = candidates[0];
        for &c in &candidates[1..] {
            lower = lower.min(c);
            upper = upper.max(c);
        }
        Interval::closed(lower, upper)
    };
    match op {
        ArithOp::Neg => {
            let arg = args[0].interval();
            Interval::closed(-arg.upper(), -arg.lower())
        }
        ArithOp::Abs => {
            let arg = args[0].interval();
            if arg.is_non_negative() {
                arg
            } else if arg.upper() <= 0.0 {
                Interval::closed(-arg.upper(), -arg.lower())
            } else {
                Interval::closed(0.0, arg.upper().max(-arg.lower()))
            }
        }
        ArithOp::Exp => {
            let arg = args[0].interval();
            Interval::closed(arg.lower().exp(), arg.upper().exp())
        }
        ArithOp::Log => {
            let arg = args[0].interval();
            Interval::closed(arg.lower().ln(), arg.upper().ln())
        }
        ArithOp::Log10 => {
            let arg = args[0].interval();
            Interval::closed(arg.lower().log10(), arg.upper().log10())
        }
        ArithOp::Mean => {
            let n = args.len() as f64;
            let lower: f64 = args.iter().map(|arg| arg.interval().lower()).sum();
            let upper: f64 = args.iter().map(|arg| arg.interval().upper()).sum();
            Interval::closed(lower / n, upper / n)
        }
        ArithOp::Pow => {
            let base = args[0].interval();
            let exponent = args[1].interval();
            let mut candidates = vec![
                base.lower().powf(exponent.lower()),
                base.lower().powf(exponent.upper()),
                base.upper().powf(exponent.lower()),
                base.upper().powf(exponent.upper()),
            ];
            if base.contains(0.0) {
                candidates.push(0.0);
            }
            let mut lower = f64::INFINITY;
            let mut upper = f64::NEG_INFINITY;
            for c in candidates {
                if c.is_nan() {
                    continue;
                }
                lower = lower.min(c);
                upper = upper.max(c);
            }
            Interval::closed(lower, upper)
        }
        ArithOp::Mod => {
            let divisor = args[1].interval();
            let magnitude = divisor.lower().abs().max(divisor.upper().abs());
            Interval::closed(-magnitude, magnitude)
        }
        op => {
            let mut iter = args.iter();
            let first = iter.next().unwrap().interval();
            iter.fold(first, |acc, arg| corners(op, acc, arg.interval()))
        }
    }
}
