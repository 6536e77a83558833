//! The model: owner of all events, gates, parameters, CCF groups, fault
//! trees, and the mission-time handle.
//!
//! After validation the model is effectively immutable except for expression
//! sample memos and the mission-time scalar.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::ccf::CcfGroup;
use crate::element::{BasePath, Element, ElementTable, Named};
use crate::error::{Error, ErrorKind, Result};
use crate::event::{BasicEvent, Gate, HouseEvent};
use crate::fault_tree::FaultTree;
use crate::parameter::{MissionTime, Parameter};

/// Default mission time in hours (one year of continuous operation).
pub const DEFAULT_MISSION_TIME: f64 = 8760.0;

#[derive(Debug)]
pub struct Model {
    element: Element,
    mission_time: Rc<MissionTime>,
    house_events: ElementTable<Rc<HouseEvent>>,
    basic_events: ElementTable<Rc<BasicEvent>>,
    gates: ElementTable<Rc<Gate>>,
    parameters: ElementTable<Rc<Parameter>>,
    ccf_groups: ElementTable<Rc<CcfGroup>>,
    fault_trees: IndexMap<String, FaultTree>,
}

impl Named for Model {
    fn element(&self) -> &Element {
        &self.element
    }
}

impl Model {
    pub fn new(name: &str) -> Self {
        Self {
            element: Element::public(name),
            mission_time: MissionTime::new(DEFAULT_MISSION_TIME),
            house_events: ElementTable::new(),
            basic_events: ElementTable::new(),
            gates: ElementTable::new(),
            parameters: ElementTable::new(),
            ccf_groups: ElementTable::new(),
            fault_trees: IndexMap::new(),
        }
    }

    pub fn mission_time(&self) -> &Rc<MissionTime> {
        &self.mission_time
    }

    pub fn add_house_event(&mut self, event: Rc<HouseEvent>) -> Result<()> {
        self.house_events.insert(event)
    }

    pub fn add_basic_event(&mut self, event: Rc<BasicEvent>) -> Result<()> {
        self.basic_events.insert(event)
    }

    pub fn add_gate(&mut self, gate: Rc<Gate>) -> Result<()> {
        self.gates.insert(gate)
    }

    pub fn add_parameter(&mut self, parameter: Rc<Parameter>) -> Result<()> {
        self.parameters.insert(parameter)
    }

    pub fn add_ccf_group(&mut self, group: Rc<CcfGroup>) -> Result<()> {
        self.ccf_groups.insert(group)
    }

    pub fn add_fault_tree(&mut self, tree: FaultTree) -> Result<()> {
        if self.fault_trees.contains_key(tree.id()) {
            return Err(Error::new(ErrorKind::Redefinition(tree.name().to_string())));
        }
        self.fault_trees.insert(tree.id().to_string(), tree);
        Ok(())
    }

    pub fn house_events(&self) -> impl Iterator<Item = &Rc<HouseEvent>> {
        self.house_events.values()
    }

    pub fn basic_events(&self) -> impl Iterator<Item = &Rc<BasicEvent>> {
        self.basic_events.values()
    }

    pub fn gates(&self) -> impl Iterator<Item = &Rc<Gate>> {
        self.gates.values()
    }

    pub fn parameters(&self) -> impl Iterator<Item = &Rc<Parameter>> {
        self.parameters.values()
    }

    pub fn ccf_groups(&self) -> impl Iterator<Item = &Rc<CcfGroup>> {
        self.ccf_groups.values()
    }

    pub fn fault_trees(&self) -> impl Iterator<Item = &FaultTree> {
        self.fault_trees.values()
    }

    /// Resolves a house-event name from the given scope.
    pub fn house_event(&self, name: &str, origin: &BasePath) -> Result<Rc<HouseEvent>> {
        self.house_events
            .lookup(name, origin)
            .cloned()
            .ok_or_else(|| undefined(name))
    }

    pub fn basic_event(&self, name: &str, origin: &BasePath) -> Result<Rc<BasicEvent>> {
        self.basic_events
            .lookup(name, origin)
            .cloned()
            .ok_or_else(|| undefined(name))
    }

    pub fn gate(&self, name: &str, origin: &BasePath) -> Result<Rc<Gate>> {
        self.gates
            .lookup(name, origin)
            .cloned()
            .ok_or_else(|| undefined(name))
    }

    pub fn parameter(&self, name: &str, origin: &BasePath) -> Result<Rc<Parameter>> {
        self.parameters
            .lookup(name, origin)
            .cloned()
            .ok_or_else(|| undefined(name))
    }

    pub fn ccf_group(&self, name: &str, origin: &BasePath) -> Result<Rc<CcfGroup>> {
        self.ccf_groups
            .lookup(name, origin)
            .cloned()
            .ok_or_else(|| undefined(name))
    }

    /// Resolves an event name of any kind, for untyped formula references.
    pub fn any_event(&self, name: &str, origin: &BasePath) -> Result<EventRef> {
        if let Some(event) = self.basic_events.lookup(name, origin) {
            return Ok(EventRef::Basic(Rc::clone(event)));
        }
        if let Some(event) = self.house_events.lookup(name, origin) {
            return Ok(EventRef::House(Rc::clone(event)));
        }
        if let Some(gate) = self.gates.lookup(name, origin) {
            return Ok(EventRef::Gate(Rc::clone(gate)));
        }
        Err(undefined(name))
    }

    /// Applies every CCF group: synthesises CCF events and substitution
    /// gates, registering the new events with the model.
    pub fn apply_ccf_groups(&mut self) -> Result<()> {
        let groups: Vec<Rc<CcfGroup>> = self.ccf_groups.values().cloned().collect();
        for group in groups {
            let applied = group.apply()?;
            for event in applied.events {
                self.basic_events.insert(event)?;
            }
        }
        Ok(())
    }

    /// Recomputes the orphan flag on every primary event: true iff no
    /// formula reachable from any fault-tree gate references the event.
    pub fn mark_orphans(&self) -> Result<()> {
        for event in self.house_events.values() {
            event.set_orphan(true);
        }
        for event in self.basic_events.values() {
            event.set_orphan(!event.is_ccf_event());
        }
        for gate in self.gates.values() {
            if !gate.has_formula() {
                continue;
            }
            gate.with_formula(|formula| mark_formula(formula))?;
        }
        Ok(())
    }

    /// Clears every parameter mean cache; required after a mission-time
    /// change.
    pub fn clear_parameter_caches(&self) {
        for parameter in self.parameters.values() {
            parameter.clear_mean_cache();
        }
    }

    /// Clears all sample memos throughout the model, ending a sampling cycle.
    pub fn reset_expressions(&self) {
        for event in self.basic_events.values() {
            event.reset();
        }
        for parameter in self.parameters.values() {
            parameter.reset();
        }
    }
}

/// A resolved reference to an event of any concrete kind.
#[derive(Debug, Clone)]
pub enum EventRef {
    House(Rc<HouseEvent>),
    Basic(Rc<BasicEvent>),
    Gate(Rc<Gate>),
}

fn mark_formula(formula: &crate::formula::Formula) {
    for event in formula.house_events() {
        event.set_orphan(false);
    }
    for event in formula.basic_events() {
        event.set_orphan(false);
    }
    for nested in formula.connectors() {
        mark_formula(nested);
    }
}

fn undefined(name: &str) -> Error {
    Error::new(ErrorKind::UndefinedElement(name.to_string()))
}
