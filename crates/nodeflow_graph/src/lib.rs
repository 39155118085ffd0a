// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed dataflow graph execution engine.
//!
//! Nodes expose typed pins and are wired together with links. An
//! [`Evaluator`] runs a flow pass from an entry node, following flow links in
//! order and pulling values from pure nodes on demand. Named properties carry
//! values into and out of the graph through variable nodes.
//!
//! ## Architecture
//!
//! The [`Graph`] owns every entity in id-keyed maps:
//! - Nodes with pluggable [`NodeBehavior`]s
//! - Typed pins with open [`PinValue`] kinds
//! - Links between one input and one output pin
//! - Properties bound by variable nodes
//!
//! Node types and value kinds come from a [`Registry`] shared by all graphs
//! built from it.

pub mod config;
pub mod document;
pub mod evaluator;
pub mod event;
pub mod graph;
pub mod link;
pub mod node;
pub mod nodes;
pub mod pin;
pub mod property;
pub mod registry;
pub mod value;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{ConfigError, EngineConfig, EvaluatorConfig};
pub use document::{Document, DocumentError, GraphDocument};
pub use evaluator::{ErrorCode, EvaluationError, Evaluator, NodeContext};
pub use event::{GraphEvent, SubscriptionId};
pub use graph::{Graph, GraphError};
pub use link::{Link, LinkId};
pub use node::{Node, NodeBehavior, NodeCategory, NodeId, NodeType, PinLayout};
pub use nodes::builtin_registry;
pub use pin::{Pin, PinDirection, PinId, PinSpec};
pub use property::{Property, PropertyId};
pub use registry::Registry;
pub use value::{Flow, PinValue, TextureHandle, ValueError, ValueKind, ValueType};
