//! Cross-component model validation.
//!
//! Runs a fixed sequence of checks before any analysis: referential
//! completeness, gate-graph and parameter-graph acyclicity, formula arities,
//! probability domains, and CCF-group consistency. Validation is read-only
//! apart from the orphan flags, so running it twice on an unchanged model
//! yields identical results.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::element::Named;
use crate::error::{Error, ErrorKind, Result};
use crate::event::Gate;
use crate::model::Model;

/// Traversal state for the three-colour depth-first search. Marks live in a
/// side table keyed by element id, never on the nodes themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    White,
    Grey,
    Black,
}

/// Validates the whole model; the first violated rule aborts the run.
pub fn validate(model: &Model) -> Result<()> {
    check_definitions(model)?;
    check_gate_cycles(model)?;
    check_parameter_cycles(model)?;
    check_formulas(model)?;
    model.mark_orphans()?;
    check_probabilities(model)?;
    check_ccf_groups(model)?;
    Ok(())
}

/// Every gate needs a formula and every parameter an expression; dangling
/// name references were already rejected at resolution time.
fn check_definitions(model: &Model) -> Result<()> {
    for gate in model.gates() {
        if !gate.has_formula() {
            return Err(located(
                Error::new(ErrorKind::Validation(format!(
                    "gate '{}' has no formula",
                    gate.name()
                ))),
                gate.element(),
            ));
        }
    }
    for parameter in model.parameters() {
        if !parameter.has_expression() {
            return Err(located(
                Error::new(ErrorKind::Validation(format!(
                    "parameter '{}' has no expression",
                    parameter.name()
                ))),
                parameter.element(),
            ));
        }
    }
    Ok(())
}

/// Attaches the element's input location when the parser recorded one.
fn located(err: Error, element: &crate::element::Element) -> Error {
    match element.location() {
        Some(location) => err.with_location(location.clone()),
        None => err,
    }
}

fn check_gate_cycles(model: &Model) -> Result<()> {
    let mut graph: IndexMap<String, (String, Vec<String>)> = IndexMap::new();
    let mut pending: Vec<Rc<Gate>> = model.gates().cloned().collect();
    // CCF substitution gates take part in the traversal even though the
    // model does not register them directly.
    for event in model.basic_events() {
        if let Some(gate) = event.ccf_gate() {
            pending.push(gate);
        }
    }
    while let Some(gate) = pending.pop() {
        if graph.contains_key(gate.id()) {
            continue;
        }
        let mut children = Vec::new();
        if gate.has_formula() {
            gate.with_formula(|formula| formula.gather_gates(&mut children))?;
        }
        let child_ids = children.iter().map(|child| child.id().to_string()).collect();
        graph.insert(
            gate.id().to_string(),
            (gate.name().to_string(), child_ids),
        );
        pending.extend(children);
    }
    detect_cycle(&graph)
}

fn check_parameter_cycles(model: &Model) -> Result<()> {
    let mut graph: IndexMap<String, (String, Vec<String>)> = IndexMap::new();
    for parameter in model.parameters() {
        let children = match parameter.expression() {
            Some(expression) => expression
                .direct_parameters()
                .iter()
                .map(|child| child.id().to_string())
                .collect(),
            None => Vec::new(),
        };
        graph.insert(
            parameter.id().to_string(),
            (parameter.name().to_string(), children),
        );
    }
    detect_cycle(&graph)
}

/// Iterative three-colour depth-first search. Re-entering a grey node stops
/// the walk and reports the full cycle path by name.
fn detect_cycle(graph: &IndexMap<String, (String, Vec<String>)>) -> Result<()> {
    let mut marks: IndexMap<&str, Mark> =
        graph.keys().map(|id| (id.as_str(), Mark::White)).collect();
    for root in graph.keys() {
        if marks.get(root.as_str()) != Some(&Mark::White) {
            continue;
        }
        // Stack frames: (node id, index of the next child to visit).
        let mut stack: Vec<(&str, usize)> = vec![(root.as_str(), 0)];
        marks.insert(root.as_str(), Mark::Grey);
        while let Some(&(node, next)) = stack.last() {
            let children = &graph[node].1;
            if next < children.len() {
                stack.last_mut().expect("non-empty stack").1 += 1;
                let child = children[next].as_str();
                match marks.get(child).copied() {
                    Some(Mark::White) => {
                        marks.insert(child, Mark::Grey);
                        stack.push((child, 0));
                    }
                    Some(Mark::Grey) => {
                        let start = stack
                            .iter()
                            .position(|(id, _)| *id == child)
                            .unwrap_or(0);
                        let mut cycle: Vec<String> = stack[start..]
                            .iter()
                            .map(|(id, _)| graph[*id].0.clone())
                            .collect();
                        cycle.push(graph[child].0.clone());
                        return Err(Error::new(ErrorKind::Cycle(cycle)));
                    }
                    Some(Mark::Black) | None => {}
                }
            } else {
                marks.insert(node, Mark::Black);
                stack.pop();
            }
        }
    }
    Ok(())
}

fn check_formulas(model: &Model) -> Result<()> {
    for gate in model.gates() {
        gate.validate()?;
    }
    for event in model.basic_events() {
        if let Some(gate) = event.ccf_gate() {
            gate.validate()?;
        }
    }
    Ok(())
}

/// Probability-domain checks, including re-validation of deviates and
/// built-ins whose parameters were bound after construction. Values outside
/// [0, 1] are permitted only inside intermediate expressions, never as a
/// basic-event probability.
fn check_probabilities(model: &Model) -> Result<()> {
    for parameter in model.parameters() {
        if let Some(expression) = parameter.expression() {
            expression.validate()?;
            let inferred = expression.inferred_unit()?;
            if let (Some(declared), Some(inferred)) = (parameter.unit(), inferred) {
                if declared != inferred {
                    return Err(Error::new(ErrorKind::Validation(format!(
                        "parameter '{}' is declared in {} but its expression yields {}",
                        parameter.name(),
                        declared.as_str(),
                        inferred.as_str()
                    ))));
                }
            }
        }
    }
    for event in model.basic_events() {
        if event.orphan() && !event.has_expression() {
            continue; // flagged but retained
        }
        if let Some(expression) = event.expression() {
            expression.validate()?;
            expression.inferred_unit()?;
        }
        event.validate()?;
    }
    Ok(())
}

fn check_ccf_groups(model: &Model) -> Result<()> {
    for group in model.ccf_groups() {
        group.validate()?;
    }
    Ok(())
}
