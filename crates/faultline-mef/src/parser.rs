//! Model Exchange Format input: XML documents into validated-ready models.
//!
//! Parsing runs in two phases. The first pass collects every definition into
//! a lightweight element tree and registers name shells for gates, events,
//! and parameters, so that references may point forward. The second pass
//! builds formulae, expressions, and CCF groups, resolving names against the
//! registered shells. Every element keeps its `(file, line)` for diagnostics.

use std::rc::Rc;

use indexmap::IndexMap;
use quick_xml::events::Event as XmlEvent;
use quick_xml::Reader;
use tracing::debug;

use crate::builtins::{Builtin, PeriodicTest};
use crate::ccf::{CcfGroup, CcfModelKind};
use crate::deviate::Deviate;
use crate::element::{BasePath, Element, Role};
use crate::error::{Error, ErrorKind, Result, SourceLocation};
use crate::event::{BasicEvent, Gate, HouseEvent};
use crate::expression::{ArithOp, Expression, ExpressionRef, LogicalOp};
use crate::fault_tree::FaultTree;
use crate::formula::{Formula, Operator};
use crate::model::{EventRef, Model};
use crate::parameter::{Parameter, Unit};

/// A parsed XML element with its source line.
#[derive(Debug)]
struct XmlNode {
    tag: String,
    attrs: IndexMap<String, String>,
    children: Vec<XmlNode>,
    line: u64,
}

impl XmlNode {
    fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    fn required_attr(&self, key: &str, file: &str) -> Result<&str> {
        self.attr(key).ok_or_else(|| {
            parse_error(
                format!("element <{}> is missing attribute '{key}'", self.tag),
                file,
                self.line,
            )
        })
    }
}

/// Parses one MEF document into a model named after the file.
pub fn parse_model(text: &str, file: &str) -> Result<Model> {
    let root = read_document(text, file)?;
    debug!(file, "parsed XML document, building model");
    let mut model = Model::new(root.attr("name").unwrap_or(file));
    let mut builder = Builder {
        model: &mut model,
        file,
    };
    builder.collect_definitions(&root)?;
    builder.define_all(&root)?;
    Ok(model)
}

fn parse_error(message: String, file: &str, line: u64) -> Error {
    Error::new(ErrorKind::Parse(message)).with_location(SourceLocation {
        file: file.to_string(),
        line,
    })
}

/// Reads the whole document into an element tree.
fn read_document(text: &str, file: &str) -> Result<XmlNode> {
    let newline_offsets: Vec<usize> = text
        .bytes()
        .enumerate()
        .filter(|(_, b)| *b == b'\n')
        .map(|(i, _)| i)
        .collect();
    let line_at = |offset: usize| -> u64 {
        (newline_offsets.partition_point(|&nl| nl < offset) + 1) as u64
    };

    let mut reader = Reader::from_str(text);
    reader.trim_text(true);

    let read_node = |e: &quick_xml::events::BytesStart<'_>, line: u64| -> Result<XmlNode> {
        let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
        let mut attrs = IndexMap::new();
        for attr in e.attributes().flatten() {
            let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
            let value = attr
                .unescape_value()
                .map_err(|err| parse_error(err.to_string(), file, line))?
                .to_string();
            attrs.insert(key, value);
        }
        Ok(XmlNode {
            tag,
            attrs,
            children: Vec::new(),
            line,
        })
    };

    let mut stack: Vec<XmlNode> = Vec::new();
    loop {
        let event = reader.read_event();
        let line = line_at(reader.buffer_position());
        match event {
            Ok(XmlEvent::Start(ref e)) => {
                stack.push(read_node(e, line)?);
            }
            Ok(XmlEvent::Empty(ref e)) => {
                let node = read_node(e, line)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => return Ok(node),
                }
            }
            Ok(XmlEvent::End(_)) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| parse_error("unbalanced closing tag".into(), file, line))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => return Ok(node),
                }
            }
            Ok(XmlEvent::Text(_)) | Ok(XmlEvent::Comment(_)) | Ok(XmlEvent::Decl(_))
            | Ok(XmlEvent::PI(_)) | Ok(XmlEvent::CData(_)) | Ok(XmlEvent::DocType(_)) => {}
            Ok(XmlEvent::Eof) => {
                return Err(parse_error(
                    "input ended before the document was complete".into(),
                    file,
                    line,
                ));
            }
            Err(err) => {
                return Err(parse_error(err.to_string(), file, line));
            }
        }
    }
}

struct Builder<'a> {
    model: &'a mut Model,
    file: &'a str,
}

impl Builder<'_> {
    fn location(&self, node: &XmlNode) -> SourceLocation {
        SourceLocation {
            file: self.file.to_string(),
            line: node.line,
        }
    }

    fn located(&self, err: Error, node: &XmlNode) -> Error {
        err.with_location(self.location(node))
    }

    fn element(&self, node: &XmlNode, base_path: &BasePath) -> Result<Element> {
        let name = node.required_attr("name", self.file)?;
        let role = match node.attr("role") {
            Some("private") => Role::Private,
            Some("public") | None => Role::Public,
            Some(other) => {
                return Err(parse_error(
                    format!("unknown role '{other}'"),
                    self.file,
                    node.line,
                ));
            }
        };
        let mut element = Element::new(name, base_path.clone(), role);
        element.set_location(self.location(node));
        if let Some(label) = node
            .children
            .iter()
            .find(|child| child.tag == "label")
            .and_then(|child| child.attr("text"))
        {
            element.set_label(label);
        }
        Ok(element)
    }

    /// First pass: register name shells so references can point forward.
    fn collect_definitions(&mut self, root: &XmlNode) -> Result<()> {
        self.collect_in(root, &BasePath::root())
    }

    fn collect_in(&mut self, container: &XmlNode, base_path: &BasePath) -> Result<()> {
        for node in &container.children {
            match node.tag.as_str() {
                "define-fault-tree" => {
                    let name = node.required_attr("name", self.file)?;
                    let tree_path = BasePath::parse(name);
                    self.collect_in(node, &tree_path)?;
                }
                "define-gate" => {
                    let element = self.element(node, base_path)?;
                    self.model.add_gate(Gate::new(element))?;
                }
                "define-basic-event" => {
                    let element = self.element(node, base_path)?;
                    self.model.add_basic_event(BasicEvent::new(element))?;
                }
                "define-house-event" => {
                    let element = self.element(node, base_path)?;
                    self.model.add_house_event(HouseEvent::new(element))?;
                }
                "define-parameter" => {
                    let element = self.element(node, base_path)?;
                    let parameter = Parameter::new(element);
                    if let Some(unit) = node.attr("unit") {
                        let unit = Unit::parse(unit).ok_or_else(|| {
                            parse_error(
                                format!("unknown unit '{unit}'"),
                                self.file,
                                node.line,
                            )
                        })?;
                        parameter.set_unit(unit);
                    }
                    self.model.add_parameter(parameter)?;
                }
                "define-CCF-group" => {
                    let element = self.element(node, base_path)?;
                    let kind = node.required_attr("model", self.file)?;
                    let kind = CcfModelKind::parse(kind).ok_or_else(|| {
                        parse_error(
                            format!("unknown CCF model '{kind}'"),
                            self.file,
                            node.line,
                        )
                    })?;
                    self.model.add_ccf_group(CcfGroup::new(element, kind))?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Second pass: fill the shells with formulae, expressions, and groups.
    fn define_all(&mut self, root: &XmlNode) -> Result<()> {
        self.define_in(root, &BasePath::root())
    }

    fn define_in(&mut self, container: &XmlNode, base_path: &BasePath) -> Result<()> {
        for node in &container.children {
            match node.tag.as_str() {
                "define-fault-tree" => {
                    let name = node.required_attr("name", self.file)?;
                    let tree_path = BasePath::parse(name);
                    self.define_in(node, &tree_path)?;
                    let mut element = Element::public(name);
                    element.set_location(self.location(node));
                    let mut tree = FaultTree::new(element);
                    for child in &node.children {
                        if child.tag == "define-gate" {
                            let gate_name = child.required_attr("name", self.file)?;
                            let gate = self
                                .model
                                .gate(gate_name, &tree_path)
                                .map_err(|err| self.located(err, child))?;
                            tree.add_gate(gate)?;
                        }
                    }
                    self.model.add_fault_tree(tree)?;
                }
                "define-gate" => self.define_gate(node, base_path)?,
                "define-basic-event" => self.define_basic_event(node, base_path)?,
                "define-house-event" => self.define_house_event(node, base_path)?,
                "define-parameter" => self.define_parameter(node, base_path)?,
                "define-CCF-group" => self.define_ccf_group(node, base_path)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn payload<'n>(&self, node: &'n XmlNode) -> Result<&'n XmlNode> {
        node.children
            .iter()
            .find(|child| child.tag != "label" && child.tag != "attributes")
            .ok_or_else(|| {
                parse_error(
                    format!("element <{}> has no definition body", node.tag),
                    self.file,
                    node.line,
                )
            })
    }

    fn define_gate(&mut self, node: &XmlNode, base_path: &BasePath) -> Result<()> {
        let name = node.required_attr("name", self.file)?;
        let gate = self.model.gate(name, base_path)?;
        let formula = self.build_formula(self.payload(node)?, base_path)?;
        gate.set_formula(formula)
            .map_err(|err| self.located(err, node))
    }

    fn define_basic_event(&mut self, node: &XmlNode, base_path: &BasePath) -> Result<()> {
        let name = node.required_attr("name", self.file)?;
        let event = self.model.basic_event(name, base_path)?;
        // A basic event without an expression is legal; it is only usable
        // once a CCF group or a later definition supplies one.
        if let Some(body) = node
            .children
            .iter()
            .find(|child| child.tag != "label" && child.tag != "attributes")
        {
            let expression = self.build_expression(body, base_path)?;
            event
                .set_expression(expression)
                .map_err(|err| self.located(err, node))?;
        }
        Ok(())
    }

    fn define_house_event(&mut self, node: &XmlNode, base_path: &BasePath) -> Result<()> {
        let name = node.required_attr("name", self.file)?;
        let event = self.model.house_event(name, base_path)?;
        if let Some(constant) = node
            .children
            .iter()
            .find(|child| child.tag == "constant")
        {
            let value = constant.required_attr("value", self.file)?;
            event.set_state(value == "true");
        }
        Ok(())
    }

    fn define_parameter(&mut self, node: &XmlNode, base_path: &BasePath) -> Result<()> {
        let name = node.required_attr("name", self.file)?;
        let parameter = self.model.parameter(name, base_path)?;
        let expression = self.build_expression(self.payload(node)?, base_path)?;
        parameter
            .set_expression(expression)
            .map_err(|err| self.located(err, node))
    }

    fn define_ccf_group(&mut self, node: &XmlNode, base_path: &BasePath) -> Result<()> {
        let name = node.required_attr("name", self.file)?;
        let group = self
            .model
            .ccf_group(name, base_path)
            .map_err(|err| self.located(err, node))?;
        for child in &node.children {
            match child.tag.as_str() {
                "members" => {
                    for member in &child.children {
                        let member_name = member.required_attr("name", self.file)?;
                        let event = self
                            .model
                            .basic_event(member_name, base_path)
                            .map_err(|err| self.located(err, member))?;
                        group
                            .add_member(event)
                            .map_err(|err| self.located(err, member))?;
                    }
                }
                "distribution" => {
                    let expression =
                        self.build_expression(self.payload(child)?, base_path)?;
                    group
                        .set_distribution(expression)
                        .map_err(|err| self.located(err, child))?;
                }
                "factors" | "factor" => {
                    let factors: Vec<&XmlNode> = if child.tag == "factor" {
                        vec![child]
                    } else {
                        child.children.iter().collect()
                    };
                    for factor in factors {
                        let level = match factor.attr("level") {
                            Some(text) => Some(text.parse::<u32>().map_err(|_| {
                                parse_error(
                                    format!("invalid factor level '{text}'"),
                                    self.file,
                                    factor.line,
                                )
                            })?),
                            None => None,
                        };
                        let expression =
                            self.build_expression(self.payload(factor)?, base_path)?;
                        group
                            .add_factor(level, expression)
                            .map_err(|err| self.located(err, factor))?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Builds a formula from an operator node or a bare event reference.
    fn build_formula(&self, node: &XmlNode, base_path: &BasePath) -> Result<Formula> {
        if let Some(operator) = Operator::parse(&node.tag) {
            let mut formula = Formula::new(operator);
            if operator == Operator::AtLeast {
                let min = node.required_attr("min", self.file)?;
                let min = min.parse::<u32>().map_err(|_| {
                    parse_error(
                        format!("invalid vote number '{min}'"),
                        self.file,
                        node.line,
                    )
                })?;
                formula
                    .set_vote_number(min)
                    .map_err(|err| self.located(err, node))?;
            }
            for child in &node.children {
                self.add_formula_argument(&mut formula, child, base_path)?;
            }
            Ok(formula)
        } else {
            // A bare event reference becomes a pass-through formula.
            let mut formula = Formula::new(Operator::Null);
            self.add_formula_argument(&mut formula, node, base_path)?;
            Ok(formula)
        }
    }

    fn add_formula_argument(
        &self,
        formula: &mut Formula,
        node: &XmlNode,
        base_path: &BasePath,
    ) -> Result<()> {
        let result = match node.tag.as_str() {
            "event" => {
                let name = node.required_attr("name", self.file)?;
                match self
                    .model
                    .any_event(name, base_path)
                    .map_err(|err| self.located(err, node))?
                {
                    EventRef::House(event) => formula.add_house_event(event),
                    EventRef::Basic(event) => formula.add_basic_event(event),
                    EventRef::Gate(gate) => formula.add_gate(gate),
                }
            }
            "gate" => {
                let name = node.required_attr("name", self.file)?;
                let gate = self
                    .model
                    .gate(name, base_path)
                    .map_err(|err| self.located(err, node))?;
                formula.add_gate(gate)
            }
            "basic-event" => {
                let name = node.required_attr("name", self.file)?;
                let event = self
                    .model
                    .basic_event(name, base_path)
                    .map_err(|err| self.located(err, node))?;
                formula.add_basic_event(event)
            }
            "house-event" => {
                let name = node.required_attr("name", self.file)?;
                let event = self
                    .model
                    .house_event(name, base_path)
                    .map_err(|err| self.located(err, node))?;
                formula.add_house_event(event)
            }
            _ => {
                let nested = self.build_formula(node, base_path)?;
                formula.add_formula(nested);
                Ok(())
            }
        };
        result.map_err(|err| self.located(err, node))
    }

    /// Builds one expression node.
    fn build_expression(&self, node: &XmlNode, base_path: &BasePath) -> Result<ExpressionRef> {
        let children = |expected: usize| -> Result<Vec<ExpressionRef>> {
            if node.children.len() != expected {
                return Err(parse_error(
                    format!(
                        "<{}> expects {expected} argument(s), got {}",
                        node.tag,
                        node.children.len()
                    ),
                    self.file,
                    node.line,
                ));
            }
            node.children
                .iter()
                .map(|child| self.build_expression(child, base_path))
                .collect()
        };
        let all_children = || -> Result<Vec<ExpressionRef>> {
            node.children
                .iter()
                .map(|child| self.build_expression(child, base_path))
                .collect()
        };
        let locate = |err: Error| err.with_location(self.location(node));

        match node.tag.as_str() {
            "float" | "int" => {
                let value = node.required_attr("value", self.file)?;
                let value = value.parse::<f64>().map_err(|_| {
                    parse_error(
                        format!("invalid numeric value '{value}'"),
                        self.file,
                        node.line,
                    )
                })?;
                Ok(Expression::constant(value))
            }
            "bool" => {
                let value = node.required_attr("value", self.file)?;
                Ok(Expression::constant_bool(value == "true"))
            }
            "system-mission-time" => {
                Ok(Expression::mission_time(Rc::clone(self.model.mission_time())))
            }
            "parameter" => {
                let name = node.required_attr("name", self.file)?;
                let parameter = self
                    .model
                    .parameter(name, base_path)
                    .map_err(|err| self.located(err, node))?;
                Ok(Expression::parameter(parameter))
            }
            "uniform-deviate" => {
                let mut args = children(2)?;
                let max = args.pop().unwrap_or_else(|| Expression::constant(1.0));
                let min = args.pop().unwrap_or_else(|| Expression::constant(0.0));
                Expression::deviate(Deviate::Uniform { min, max }).map_err(locate)
            }
            "normal-deviate" => {
                let mut args = children(2)?;
                let sigma = args.pop().unwrap_or_else(|| Expression::constant(1.0));
                let mean = args.pop().unwrap_or_else(|| Expression::constant(0.0));
                Expression::deviate(Deviate::Normal { mean, sigma }).map_err(locate)
            }
            "lognormal-deviate" => {
                let mut args = all_children()?;
                match args.len() {
                    2 => {
                        let sigma = args.pop().unwrap_or_else(|| Expression::constant(1.0));
                        let mu = args.pop().unwrap_or_else(|| Expression::constant(0.0));
                        Expression::deviate(Deviate::LogNormal { mu, sigma }).map_err(locate)
                    }
                    3 => {
                        let level = args.pop().unwrap_or_else(|| Expression::constant(0.95));
                        let error_factor =
                            args.pop().unwrap_or_else(|| Expression::constant(2.0));
                        let mean = args.pop().unwrap_or_else(|| Expression::constant(0.0));
                        Expression::deviate(Deviate::LogNormalEf {
                            mean,
                            error_factor,
                            level,
                        })
                        .map_err(locate)
                    }
                    n => Err(parse_error(
                        format!("<lognormal-deviate> expects 2 or 3 arguments, got {n}"),
                        self.file,
                        node.line,
                    )),
                }
            }
            "gamma-deviate" => {
                let mut args = children(2)?;
                let scale = args.pop().unwrap_or_else(|| Expression::constant(1.0));
                let shape = args.pop().unwrap_or_else(|| Expression::constant(1.0));
                Expression::deviate(Deviate::Gamma { shape, scale }).map_err(locate)
            }
            "beta-deviate" => {
                let mut args = children(2)?;
                let beta = args.pop().unwrap_or_else(|| Expression::constant(1.0));
                let alpha = args.pop().unwrap_or_else(|| Expression::constant(1.0));
                Expression::deviate(Deviate::Beta { alpha, beta }).map_err(locate)
            }
            "histogram" => {
                // First child is the initial boundary; each <bin> carries its
                // upper boundary and weight.
                let mut boundaries = Vec::new();
                let mut weights = Vec::new();
                let mut iter = node.children.iter();
                let first = iter.next().ok_or_else(|| {
                    parse_error("<histogram> is empty".into(), self.file, node.line)
                })?;
                boundaries.push(self.build_expression(first, base_path)?);
                for bin in iter {
                    if bin.tag != "bin" || bin.children.len() != 2 {
                        return Err(parse_error(
                            "<histogram> bins need a boundary and a weight".into(),
                            self.file,
                            bin.line,
                        ));
                    }
                    boundaries.push(self.build_expression(&bin.children[0], base_path)?);
                    weights.push(self.build_expression(&bin.children[1], base_path)?);
                }
                Expression::deviate(Deviate::Histogram {
                    boundaries,
                    weights,
                })
                .map_err(locate)
            }
            "exponential" => {
                let mut args = children(2)?;
                let time = args.pop().unwrap_or_else(|| Expression::constant(0.0));
                let lambda = args.pop().unwrap_or_else(|| Expression::constant(0.0));
                Expression::builtin(Builtin::Exponential { lambda, time }).map_err(locate)
            }
            "GLM" => {
                let mut args = children(4)?;
                let time = args.pop().unwrap_or_else(|| Expression::constant(0.0));
                let mu = args.pop().unwrap_or_else(|| Expression::constant(0.0));
                let lambda = args.pop().unwrap_or_else(|| Expression::constant(0.0));
                let gamma = args.pop().unwrap_or_else(|| Expression::constant(0.0));
                Expression::builtin(Builtin::Glm {
                    gamma,
                    lambda,
                    mu,
                    time,
                })
                .map_err(locate)
            }
            "Weibull" => {
                let mut args = children(4)?;
                let time = args.pop().unwrap_or_else(|| Expression::constant(0.0));
                let shift = args.pop().unwrap_or_else(|| Expression::constant(0.0));
                let shape = args.pop().unwrap_or_else(|| Expression::constant(1.0));
                let scale = args.pop().unwrap_or_else(|| Expression::constant(1.0));
                Expression::builtin(Builtin::Weibull {
                    scale,
                    shape,
                    shift,
                    time,
                })
                .map_err(locate)
            }
            "periodic-test" => {
                let args = all_children()?;
                self.build_periodic_test(args, node).map_err(locate)
            }
            "ite" => {
                let mut args = children(3)?;
                let otherwise = args.pop().unwrap_or_else(|| Expression::constant(0.0));
                let then = args.pop().unwrap_or_else(|| Expression::constant(0.0));
                let condition = args.pop().unwrap_or_else(|| Expression::constant(0.0));
                Ok(Expression::ite(condition, then, otherwise))
            }
            tag => {
                if let Some(op) = parse_arith_op(tag) {
                    return Expression::arith(op, all_children()?).map_err(locate);
                }
                if let Some(op) = parse_logical_op(tag) {
                    return Expression::logical(op, all_children()?).map_err(locate);
                }
                Err(parse_error(
                    format!("unknown expression element <{tag}>"),
                    self.file,
                    node.line,
                ))
            }
        }
    }

    fn build_periodic_test(
        &self,
        mut args: Vec<ExpressionRef>,
        node: &XmlNode,
    ) -> Result<ExpressionRef> {
        let arity = args.len();
        let mut pop = || args.remove(0);
        match arity {
            4 => Expression::builtin(Builtin::PeriodicTest(PeriodicTest::Four {
                lambda: pop(),
                tau: pop(),
                theta: pop(),
                time: pop(),
            })),
            5 => Expression::builtin(Builtin::PeriodicTest(PeriodicTest::Five {
                lambda: pop(),
                tau: pop(),
                theta: pop(),
                test_duration: pop(),
                time: pop(),
            })),
            11 => Expression::builtin(Builtin::PeriodicTest(PeriodicTest::Eleven {
                lambda: pop(),
                lambda_test: pop(),
                mu: pop(),
                tau: pop(),
                theta: pop(),
                gamma: pop(),
                test_duration: pop(),
                available_at_test: pop(),
                sigma: pop(),
                omega: pop(),
                time: pop(),
            })),
            n => Err(parse_error(
                format!("<periodic-test> expects 4, 5, or 11 arguments, got {n}"),
                self.file,
                node.line,
            )),
        }
    }
}

fn parse_arith_op(tag: &str) -> Option<ArithOp> {
    Some(match tag {
        "neg" => ArithOp::Neg,
        "add" => ArithOp::Add,
        "sub" => ArithOp::Sub,
        "mul" => ArithOp::Mul,
        "div" => ArithOp::Div,
        "abs" => ArithOp::Abs,
        "min" => ArithOp::Min,
        "max" => ArithOp::Max,
        "mean" => ArithOp::Mean,
        "pow" => ArithOp::Pow,
        "exp" => ArithOp::Exp,
        "log" => ArithOp::Log,
        "log10" => ArithOp::Log10,
        "mod" => ArithOp::Mod,
        _ => return None,
    })
}

fn parse_logical_op(tag: &str) -> Option<LogicalOp> {
    Some(match tag {
        "not" => LogicalOp::Not,
        "and" => LogicalOp::And,
        "or" => LogicalOp::Or,
        "eq" => LogicalOp::Eq,
        "df" | "neq" => LogicalOp::Ne,
        "lt" => LogicalOp::Lt,
        "leq" => LogicalOp::Le,
        "gt" => LogicalOp::Gt,
        "geq" => LogicalOp::Ge,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator;

    const TWO_TRAIN: &str = r#"<?xml version="1.0"?>
<opsa-mef name="two-train">
  <define-fault-tree name="cooling">
    <define-gate name="top">
      <and>
        <basic-event name="pump-a"/>
        <basic-event name="pump-b"/>
      </and>
    </define-gate>
    <define-basic-event name="pump-a">
      <float value="0.1"/>
    </define-basic-event>
    <define-basic-event name="pump-b">
      <float value="0.2"/>
    </define-basic-event>
  </define-fault-tree>
</opsa-mef>
"#;

    #[test]
    fn parses_a_small_fault_tree() {
        let model = parse_model(TWO_TRAIN, "two-train.xml").unwrap();
        validator::validate(&model).unwrap();
        assert_eq!(model.basic_events().count(), 2);
        let tree = model.fault_trees().next().unwrap();
        let tops = tree.top_gates().unwrap();
        assert_eq!(tops.len(), 1);
        let product = tops[0]
            .with_formula(|f| f.basic_events().map(|e| e.p()).product::<f64>())
            .unwrap();
        assert!((product - 0.02).abs() < 1e-12);
    }

    #[test]
    fn undefined_reference_carries_location() {
        let text = r#"<opsa-mef>
  <define-gate name="top">
    <null>
      <basic-event name="ghost"/>
    </null>
  </define-gate>
</opsa-mef>"#;
        let err = parse_model(text, "bad.xml").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UndefinedElement(name) if name == "ghost"));
        let location = err.location().expect("location");
        assert_eq!(location.file, "bad.xml");
        assert_eq!(location.line, 4);
    }

    #[test]
    fn duplicate_definition_is_a_redefinition() {
        let text = r#"<opsa-mef>
  <define-basic-event name="x"><float value="0.1"/></define-basic-event>
  <define-basic-event name="X"><float value="0.2"/></define-basic-event>
</opsa-mef>"#;
        let err = parse_model(text, "dup.xml").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Redefinition(_)));
    }

    #[test]
    fn forward_references_resolve() {
        let text = r#"<opsa-mef>
  <define-gate name="top">
    <or>
      <gate name="later"/>
      <basic-event name="b"/>
    </or>
  </define-gate>
  <define-gate name="later">
    <null><basic-event name="b"/></null>
  </define-gate>
  <define-basic-event name="b">
    <parameter name="q"/>
  </define-basic-event>
  <define-parameter name="q" unit="unitless">
    <float value="0.25"/>
  </define-parameter>
</opsa-mef>"#;
        let model = parse_model(text, "fwd.xml").unwrap();
        validator::validate(&model).unwrap();
        let b = model
            .basic_event("b", &BasePath::root())
            .unwrap();
        assert!((b.p() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn atleast_min_attribute() {
        let text = r#"<opsa-mef>
  <define-gate name="vote">
    <atleast min="2">
      <basic-event name="a"/>
      <basic-event name="b"/>
      <basic-event name="c"/>
    </atleast>
  </define-gate>
  <define-basic-event name="a"><float value="0.1"/></define-basic-event>
  <define-basic-event name="b"><float value="0.1"/></define-basic-event>
  <define-basic-event name="c"><float value="0.1"/></define-basic-event>
</opsa-mef>"#;
        let model = parse_model(text, "vote.xml").unwrap();
        validator::validate(&model).unwrap();
        let gate = model.gate("vote", &BasePath::root()).unwrap();
        let k = gate.with_formula(|f| f.vote_number()).unwrap();
        assert_eq!(k, Some(2));
    }

    #[test]
    fn ccf_group_round_trip() {
        let text = r#"<opsa-mef>
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
      <distribution>
        <float value="0.01"/>
      </distribution>
      <factor>
        <float value="0.1"/>
      </factor>
    </define-CCF-group>
  </define-fault-tree>
</opsa-mef>"#;
        let mut model = parse_model(text, "ccf.xml").unwrap();
        model.apply_ccf_groups().unwrap();
        validator::validate(&model).unwrap();
        let m1 = model.basic_event("m1", &BasePath::root()).unwrap();
        assert!(m1.has_ccf());
        // 3 members + 7 subset events.
        assert_eq!(model.basic_events().count(), 10);
    }

    #[test]
    fn malformed_xml_is_a_parse_error() {
        let err = parse_model("<opsa-mef><unclosed>", "broken.xml").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Parse(_)));
    }
}
