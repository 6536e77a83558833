//! Binary decision diagrams over the validated model.
//!
//! The diagram is reduced and ordered: nodes are hash-consed through a
//! unique table and the apply operations are memoised. Variables are the
//! basic events encountered on a first-visit walk from the top gate, with
//! common-cause substitution applied: a basic event carrying a CCF gate
//! contributes that gate's formula instead of a variable of its own.

use std::rc::Rc;

use indexmap::IndexMap;

use faultline_mef::element::Named;
use faultline_mef::error::{Error, ErrorKind, Result};
use faultline_mef::event::{BasicEvent, Gate};
use faultline_mef::formula::{Arg, Formula, Operator};

const FALSE: usize = 0;
const TRUE: usize = 1;

#[derive(Debug, Clone, Copy)]
struct BddNode {
    var: usize,
    low: usize,
    high: usize,
}

/// A reduced ordered BDD rooted in one top gate.
pub struct Bdd {
    nodes: Vec<Option<BddNode>>,
    root: usize,
    variables: Vec<Rc<BasicEvent>>,
    var_index: IndexMap<String, usize>,
    unique: IndexMap<(usize, usize, usize), usize>,
    computed: IndexMap<(usize, usize, char), usize>,
}

impl Bdd {
    /// Builds the diagram for a top gate.
    pub fn from_gate(top: &Rc<Gate>) -> Result<Bdd> {
        let mut bdd = Bdd {
            nodes: vec![None, None],
            root: FALSE,
            variables: Vec::new(),
            var_index: IndexMap::new(),
            unique: IndexMap::new(),
            computed: IndexMap::new(),
        };
        let mut gate_cache: IndexMap<String, usize> = IndexMap::new();
        bdd.root = bdd.build_gate(top, &mut gate_cache)?;
        Ok(bdd)
    }

    /// The basic events acting as variables, in diagram order.
    pub fn variables(&self) -> &[Rc<BasicEvent>] {
        &self.variables
    }

    fn build_gate(
        &mut self,
        gate: &Rc<Gate>,
        gate_cache: &mut IndexMap<String, usize>,
    ) -> Result<usize> {
        if let Some(&cached) = gate_cache.get(gate.id()) {
            return Ok(cached);
        }
        let result = gate.with_formula(|formula| self.build_formula(formula, gate_cache))??;
        gate_cache.insert(gate.id().to_string(), result);
        Ok(result)
    }

    fn build_formula(
        &mut self,
        formula: &Formula,
        gate_cache: &mut IndexMap<String, usize>,
    ) -> Result<usize> {
        let mut inputs = Vec::with_capacity(formula.num_args());
        for arg in formula.args() {
            let input = match arg {
                Arg::House(event) => {
                    if event.state() {
                        TRUE
                    } else {
                        FALSE
                    }
                }
                Arg::Basic(event) => match event.ccf_gate() {
                    Some(ccf_gate) => self.build_gate(&ccf_gate, gate_cache)?,
                    None => {
                        let var = self.variable_for(event);
                        self.make_node(var, FALSE, TRUE)
                    }
                },
                Arg::Gate(gate) => self.build_gate(gate, gate_cache)?,
                Arg::Formula(nested) => self.build_formula(nested, gate_cache)?,
            };
            inputs.push(input);
        }
        self.combine(formula, inputs)
    }

    fn combine(&mut self, formula: &Formula, inputs: Vec<usize>) -> Result<usize> {
        let logic_error = |what: &str| Error::new(ErrorKind::Logic(what.to_string()));
        match formula.operator() {
            Operator::Null => inputs
                .into_iter()
                .next()
                .ok_or_else(|| logic_error("null formula without argument")),
            Operator::Not => {
                let input = inputs
                    .into_iter()
                    .next()
                    .ok_or_else(|| logic_error("not formula without argument"))?;
                Ok(self.apply_not(input))
            }
            Operator::And => Ok(self.fold(inputs, '&')),
            Operator::Or => Ok(self.fold(inputs, '|')),
            Operator::Nand => {
                let conjunction = self.fold(inputs, '&');
                Ok(self.apply_not(conjunction))
            }
            Operator::Nor => {
                let disjunction = self.fold(inputs, '|');
                Ok(self.apply_not(disjunction))
            }
            Operator::Xor => Ok(self.fold(inputs, '^')),
            Operator::AtLeast => {
                let k = formula
                    .vote_number()
                    .ok_or_else(|| logic_error("atleast formula without vote number"))?;
                Ok(self.build_kofn(k as usize, &inputs))
            }
        }
    }

    fn variable_for(&mut self, event: &Rc<BasicEvent>) -> usize {
        if let Some(&var) = self.var_index.get(event.id()) {
            return var;
        }
        let var = self.variables.len();
        self.variables.push(Rc::clone(event));
        self.var_index.insert(event.id().to_string(), var);
        var
    }

    /// Creates or reuses a node, applying the redundant-test reduction.
    fn make_node(&mut self, var: usize, low: usize, high: usize) -> usize {
        if low == high {
            return low;
        }
        let key = (var, low, high);
        if let Some(&id) = self.unique.get(&key) {
            return id;
        }
        let id = self.nodes.len();
        self.nodes.push(Some(BddNode { var, low, high }));
        self.unique.insert(key, id);
        id
    }

    fn fold(&mut self, inputs: Vec<usize>, op: char) -> usize {
        let mut iter = inputs.into_iter();
        let first = iter.next().unwrap_or(FALSE);
        iter.fold(first, |acc, input| self.apply(acc, input, op))
    }

    fn apply_not(&mut self, f: usize) -> usize {
        if f == FALSE {
            return TRUE;
        }
        if f == TRUE {
            return FALSE;
        }
        let node = self.nodes[f].expect("non-terminal node");
        let low = self.apply_not(node.low);
        let high = self.apply_not(node.high);
        self.make_node(node.var, low, high)
    }

    /// Memoised apply for '&', '|', and '^'.
    fn apply(&mut self, f: usize, g: usize, op: char) -> usize {
        match op {
            '|' => {
                if f == TRUE || g == TRUE {
                    return TRUE;
                }
                if f == FALSE {
                    return g;
                }
                if g == FALSE {
                    return f;
                }
            }
            '&' => {
                if f == FALSE || g == FALSE {
                    return FALSE;
                }
                if f == TRUE {
                    return g;
                }
                if g == TRUE {
                    return f;
                }
            }
            '^' => {
                if f == FALSE {
                    return g;
                }
                if g == FALSE {
                    return f;
                }
                if f == TRUE {
                    return self.apply_not(g);
                }
                if g == TRUE {
                    return self.apply_not(f);
                }
            }
            _ => unreachable!("unknown BDD operation"),
        }

        let key = (f.min(g), f.max(g), op);
        if let Some(&result) = self.computed.get(&key) {
            return result;
        }

        let f_node = self.nodes[f].expect("non-terminal node");
        let g_node = self.nodes[g].expect("non-terminal node");
        use std::cmp::Ordering;
        let (var, f_low, f_high, g_low, g_high) = match f_node.var.cmp(&g_node.var) {
            Ordering::Less => (f_node.var, f_node.low, f_node.high, g, g),
            Ordering::Greater => (g_node.var, f, f, g_node.low, g_node.high),
            Ordering::Equal => (f_node.var, f_node.low, f_node.high, g_node.low, g_node.high),
        };
        let low = self.apply(f_low, g_low, op);
        let high = self.apply(f_high, g_high, op);
        let result = self.make_node(var, low, high);
        self.computed.insert(key, result);
        result
    }

    /// At-least-k-of-n over already built inputs, by Shannon recursion.
    fn build_kofn(&mut self, k: usize, inputs: &[usize]) -> usize {
        let n = inputs.len();
        if k == 0 {
            return TRUE;
        }
        if k > n {
            return FALSE;
        }
        if k == n {
            return self.fold(inputs.to_vec(), '&');
        }
        if k == 1 {
            return self.fold(inputs.to_vec(), '|');
        }
        let first = inputs[0];
        let rest = &inputs[1..];
        let with_first = {
            let rest_kofn = self.build_kofn(k - 1, rest);
            self.apply(first, rest_kofn, '&')
        };
        let without_first = self.build_kofn(k, rest);
        self.apply(with_first, without_first, '|')
    }

    /// Exact top probability with variable probabilities from the event
    /// means at the current mission time.
    pub fn probability_from_means(&self) -> f64 {
        let q: Vec<f64> = self.variables.iter().map(|event| event.p()).collect();
        self.probability_with(&q)
    }

    /// Exact top probability by Shannon decomposition with the given
    /// per-variable probabilities.
    pub fn probability_with(&self, q: &[f64]) -> f64 {
        debug_assert_eq!(q.len(), self.variables.len());
        let mut memo: IndexMap<usize, f64> = IndexMap::new();
        self.node_probability(self.root, q, &mut memo)
    }

    /// Top probability with one variable conditioned to certainty; the
    /// backbone of the importance measures.
    pub fn probability_conditioned(&self, var: usize, value: f64) -> f64 {
        let mut q: Vec<f64> = self.variables.iter().map(|event| event.p()).collect();
        q[var] = value;
        self.probability_with(&q)
    }

    fn node_probability(&self, id: usize, q: &[f64], memo: &mut IndexMap<usize, f64>) -> f64 {
        if id == FALSE {
            return 0.0;
        }
        if id == TRUE {
            return 1.0;
        }
        if let Some(&cached) = memo.get(&id) {
            return cached;
        }
        let node = self.nodes[id].expect("non-terminal node");
        let qv = q[node.var];
        let value = qv * self.node_probability(node.high, q, memo)
            + (1.0 - qv) * self.node_probability(node.low, q, memo);
        memo.insert(id, value);
        value
    }

    /// Minimal cut sets: variable sets along paths to the true terminal,
    /// filtered down to the minimal ones.
    pub fn minimal_cut_sets(&self) -> Vec<Vec<Rc<BasicEvent>>> {
        let mut paths: Vec<Vec<usize>> = Vec::new();
        let mut current: Vec<usize> = Vec::new();
        self.collect_paths(self.root, &mut current, &mut paths);
        minimize(&mut paths);
        paths
            .into_iter()
            .map(|vars| {
                vars.into_iter()
                    .map(|var| Rc::clone(&self.variables[var]))
                    .collect()
            })
            .collect()
    }

    fn collect_paths(&self, id: usize, current: &mut Vec<usize>, paths: &mut Vec<Vec<usize>>) {
        if id == TRUE {
            if !current.is_empty() {
                paths.push(current.clone());
            }
            return;
        }
        if id == FALSE {
            return;
        }
        let node = self.nodes[id].expect("non-terminal node");
        current.push(node.var);
        self.collect_paths(node.high, current, paths);
        current.pop();
        self.collect_paths(node.low, current, paths);
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Removes non-minimal sets: any set with a strict subset already present.
fn minimize(paths: &mut Vec<Vec<usize>>) {
    paths.sort_by_key(Vec::len);
    let mut minimal: Vec<Vec<usize>> = Vec::new();
    for path in paths.drain(..) {
        let is_superset = minimal
            .iter()
            .any(|kept| kept.iter().all(|var| path.contains(var)));
        if !is_superset {
            minimal.push(path);
        }
    }
    *paths = minimal;
}
