// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pin definitions for node inputs/outputs.

use crate::link::LinkId;
use crate::node::NodeId;
use crate::value::{PinValue, ValueError, ValueKind, ValueType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PinId(pub u64);

impl fmt::Display for PinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pin#{}", self.0)
    }
}

/// Pin direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PinDirection {
    /// Input pin
    Input,
    /// Output pin
    Output,
}

impl PinDirection {
    /// The other direction
    pub fn opposite(self) -> Self {
        match self {
            Self::Input => Self::Output,
            Self::Output => Self::Input,
        }
    }
}

/// Declaration of a pin before the graph assigns it an id
#[derive(Debug)]
pub struct PinSpec {
    /// Pin name, unique per node and direction
    pub name: String,
    /// Pin direction
    pub direction: PinDirection,
    /// Initial value, which also fixes the pin's type
    pub value: Box<dyn PinValue>,
}

/// A typed connection point owned by a node
#[derive(Debug)]
pub struct Pin {
    pub(crate) id: PinId,
    pub(crate) name: String,
    pub(crate) direction: PinDirection,
    pub(crate) node: NodeId,
    pub(crate) value: Box<dyn PinValue>,
    pub(crate) links: Vec<LinkId>,
}

impl Pin {
    pub(crate) fn new(id: PinId, node: NodeId, spec: PinSpec) -> Self {
        Self {
            id,
            name: spec.name,
            direction: spec.direction,
            node,
            value: spec.value,
            links: Vec::new(),
        }
    }

    /// Unique pin ID
    pub fn id(&self) -> PinId {
        self.id
    }

    /// Pin name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pin direction
    pub fn direction(&self) -> PinDirection {
        self.direction
    }

    /// Owning node
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Current value
    pub fn value(&self) -> &dyn PinValue {
        &*self.value
    }

    /// Current value as a concrete kind
    pub fn get<T: ValueKind>(&self) -> Option<&T> {
        self.value().downcast_ref::<T>()
    }

    /// Declared type signature
    pub fn value_type(&self) -> ValueType {
        self.value.value_type()
    }

    /// Whether this is an execution flow pin
    pub fn is_flow(&self) -> bool {
        self.value.is_flow()
    }

    /// Connected links
    pub fn links(&self) -> &[LinkId] {
        &self.links
    }

    /// Whether any link is attached
    pub fn is_connected(&self) -> bool {
        !self.links.is_empty()
    }

    /// Check if a link to another pin is valid
    pub fn can_connect_to(&self, other: &Pin) -> bool {
        other.id != self.id
            && other.value_type() == self.value_type()
            && other.direction != self.direction
    }

    /// The link feeding this pin, if it is an input with exactly one link
    pub fn source_link(&self) -> Option<LinkId> {
        match (self.direction, self.links.as_slice()) {
            (PinDirection::Input, [link]) => Some(*link),
            _ => None,
        }
    }

    /// Record a new link. The graph deletes any previous link on an input
    /// before calling this.
    pub(crate) fn connect(&mut self, link: LinkId) {
        match self.direction {
            PinDirection::Input => {
                debug_assert!(self.links.is_empty(), "input {} already connected", self.id);
                self.links.clear();
                self.links.push(link);
            }
            PinDirection::Output => self.links.push(link),
        }
    }

    /// Forget a link; returns whether it was attached
    pub(crate) fn disconnect(&mut self, link: LinkId) -> bool {
        let before = self.links.len();
        self.links.retain(|l| *l != link);
        self.links.len() != before
    }

    /// Copy the concrete value of another pin into this one
    pub(crate) fn copy_value_from(&mut self, source: &dyn PinValue) -> Result<(), ValueError> {
        self.value.copy_from(source)
    }
}
