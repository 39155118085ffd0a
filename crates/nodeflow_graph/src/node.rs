// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node definitions for the graph framework.

use crate::evaluator::{EvaluationError, NodeContext};
use crate::graph::Graph;
use crate::pin::{PinDirection, PinId, PinSpec};
use crate::property::PropertyId;
use crate::value::{Flow, PinValue, ValueKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Node type category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeCategory {
    /// Flow entry points
    Event,
    /// Constants and sources
    Input,
    /// Math operations
    Math,
    /// Property access
    Variable,
    /// Utility nodes
    Utility,
    /// Custom/user-defined
    Custom,
}

/// Constructor for a node behavior
pub type NodeFactory = fn() -> Box<dyn NodeBehavior>;

/// Node type definition
#[derive(Debug, Clone)]
pub struct NodeType {
    /// Unique type identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Category
    pub category: NodeCategory,
    /// Description
    pub description: String,
    /// Builds a fresh behavior for a node of this type
    pub factory: NodeFactory,
}

/// Pin declarations collected from a behavior
#[derive(Debug, Default)]
pub struct PinLayout {
    pins: Vec<PinSpec>,
}

impl PinLayout {
    /// Declare the flow input pin
    pub fn flow_input(&mut self) -> &mut Self {
        self.input("Exec", Flow)
    }

    /// Declare the flow output pin
    pub fn flow_output(&mut self) -> &mut Self {
        self.output("Exec", Flow)
    }

    /// Declare a typed input pin
    pub fn input<T: ValueKind>(&mut self, name: impl Into<String>, initial: T) -> &mut Self {
        self.push(name.into(), PinDirection::Input, Box::new(initial))
    }

    /// Declare a typed output pin
    pub fn output<T: ValueKind>(&mut self, name: impl Into<String>, initial: T) -> &mut Self {
        self.push(name.into(), PinDirection::Output, Box::new(initial))
    }

    /// Declare an input pin whose type is only known at runtime
    pub fn input_value(&mut self, name: impl Into<String>, value: Box<dyn PinValue>) -> &mut Self {
        self.push(name.into(), PinDirection::Input, value)
    }

    /// Declare an output pin whose type is only known at runtime
    pub fn output_value(&mut self, name: impl Into<String>, value: Box<dyn PinValue>) -> &mut Self {
        self.push(name.into(), PinDirection::Output, value)
    }

    /// Declared pins, in order
    pub fn pins(&self) -> &[PinSpec] {
        &self.pins
    }

    pub(crate) fn into_pins(self) -> Vec<PinSpec> {
        self.pins
    }

    fn push(&mut self, name: String, direction: PinDirection, value: Box<dyn PinValue>) -> &mut Self {
        self.pins.push(PinSpec {
            name,
            direction,
            value,
        });
        self
    }
}

/// Behavior of one kind of node.
///
/// A behavior declares the node's pins and computes its outputs. The
/// evaluator has already copied fresh values into every value input by the
/// time [`evaluate`](Self::evaluate) runs.
pub trait NodeBehavior: fmt::Debug {
    /// Type identifier, matching the registry entry
    fn kind(&self) -> &str;

    /// Whether the node is scheduled by flow order. Pure nodes (no flow
    /// pins) are evaluated on demand by their consumers.
    fn has_flow_pins(&self) -> bool;

    /// Declare the pin set for the current configuration
    fn declare_pins(&self, graph: &Graph, pins: &mut PinLayout);

    /// Compute outputs from inputs
    fn evaluate(&mut self, ctx: &mut NodeContext<'_>) -> Result<(), EvaluationError>;

    /// A link attached to one of this node's pins was removed
    fn on_link_disconnected(&mut self, _pin: PinId) {}

    /// Property this node reads or writes, if any
    fn bound_property(&self) -> Option<PropertyId> {
        None
    }

    /// Bind to a property. Returns `false` if the node has no binding.
    fn bind_property(&mut self, _property: PropertyId) -> bool {
        false
    }

    /// A property was deleted; bound nodes must drop their reference
    fn on_property_deleted(&mut self, _property: PropertyId) {}

    /// Node-specific state for persistence
    fn save_state(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    /// Restore node-specific state
    fn load_state(&mut self, _state: &serde_json::Value) -> Result<(), serde_json::Error> {
        Ok(())
    }
}

/// A node instance in the graph
#[derive(Debug)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) node_type: String,
    pub(crate) name: String,
    pub(crate) inputs: Vec<PinId>,
    pub(crate) outputs: Vec<PinId>,
    pub(crate) flow: bool,
    // Taken out while the node evaluates
    pub(crate) behavior: Option<Box<dyn NodeBehavior>>,
}

impl Node {
    pub(crate) fn new(id: NodeId, name: String, behavior: Box<dyn NodeBehavior>) -> Self {
        Self {
            id,
            node_type: behavior.kind().to_string(),
            name,
            inputs: Vec::new(),
            outputs: Vec::new(),
            flow: behavior.has_flow_pins(),
            behavior: Some(behavior),
        }
    }

    /// Unique instance ID
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Node type ID
    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the node
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Input pins, in declaration order
    pub fn inputs(&self) -> &[PinId] {
        &self.inputs
    }

    /// Output pins, in declaration order
    pub fn outputs(&self) -> &[PinId] {
        &self.outputs
    }

    /// All pins, inputs first
    pub fn pins(&self) -> impl Iterator<Item = PinId> + '_ {
        self.inputs.iter().chain(self.outputs.iter()).copied()
    }

    /// Whether the node is flow-scheduled rather than pure
    pub fn has_flow_pins(&self) -> bool {
        self.flow
    }

    /// The node's behavior; `None` only while it is being evaluated
    pub fn behavior(&self) -> Option<&dyn NodeBehavior> {
        self.behavior.as_deref()
    }

    pub(crate) fn behavior_mut(&mut self) -> Option<&mut (dyn NodeBehavior + 'static)> {
        self.behavior.as_deref_mut()
    }

    pub(crate) fn detach_pin(&mut self, pin: PinId) {
        self.inputs.retain(|p| *p != pin);
        self.outputs.retain(|p| *p != pin);
    }
}
