// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph evaluation and execution.
//!
//! A flow pass starts at an entry node and follows flow links one node at a
//! time. Before a node runs, each of its value inputs is refreshed from the
//! pin it is linked to; pure source nodes are evaluated on the spot, flow
//! source nodes are assumed to have run earlier in the pass.

use crate::config::EvaluatorConfig;
use crate::graph::{Graph, GraphError};
use crate::node::NodeId;
use crate::pin::{PinDirection, PinId};
use crate::property::{Property, PropertyId};
use crate::value::{PinValue, ValueKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{trace, warn};

/// Stable code of an evaluation failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// A required input has no value source
    MissingInput,
    /// A node failed to evaluate
    EvaluationError,
    /// The pass did not terminate
    InfiniteLoop,
}

/// Error during evaluation
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    /// A required input has no value source
    #[error("Node {node} is missing input '{input}'")]
    MissingInput {
        /// Node that could not run
        node: NodeId,
        /// Pin name or binding that is missing
        input: String,
    },

    /// Node not found
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// Node-specific failure
    #[error("Evaluation of {node} failed: {message}")]
    Failed {
        /// Failing node
        node: NodeId,
        /// Description
        message: String,
    },

    /// Graph access failed while evaluating a node
    #[error("Evaluation of {node} failed: {source}")]
    Graph {
        /// Failing node
        node: NodeId,
        /// Underlying error
        #[source]
        source: GraphError,
    },

    /// Flow walk hit the step limit, or a pure node depends on itself
    #[error("Infinite loop detected at {node} after {steps} steps")]
    InfiniteLoop {
        /// Node at which the loop was detected
        node: NodeId,
        /// Flow steps taken in the pass
        steps: usize,
    },
}

impl EvaluationError {
    /// Stable error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::MissingInput { .. } => ErrorCode::MissingInput,
            Self::InfiniteLoop { .. } => ErrorCode::InfiniteLoop,
            Self::NodeNotFound(_) | Self::Failed { .. } | Self::Graph { .. } => {
                ErrorCode::EvaluationError
            }
        }
    }

    /// Node-specific failure
    pub fn failed(node: NodeId, message: impl Into<String>) -> Self {
        Self::Failed {
            node,
            message: message.into(),
        }
    }

    /// Missing input on a node
    pub fn missing_input(node: NodeId, input: impl Into<String>) -> Self {
        Self::MissingInput {
            node,
            input: input.into(),
        }
    }
}

/// Drives flow passes over a graph
#[derive(Debug, Default)]
pub struct Evaluator {
    config: EvaluatorConfig,
    evaluated_count: usize,
    pulled_count: usize,
    last_error: Option<EvaluationError>,
    visited: Vec<NodeId>,
    // Pure nodes whose inputs are being resolved right now
    resolving: HashSet<NodeId>,
}

impl Evaluator {
    /// Create an evaluator with default limits
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an evaluator with the given limits
    /// Evaluator with the given limits. `max_flow_steps` is raised to 1 when
    /// it is zero.
    pub fn with_config(mut config: EvaluatorConfig) -> Self {
        config.max_flow_steps = config.max_flow_steps.max(1);
        Self {
            config,
            ..Self::default()
        }
    }

    /// Limits in use
    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Run one flow pass starting at `entry`. Returns `true` on success;
    /// on failure see [`last_error`](Self::last_error).
    pub fn evaluate_flow_pin_chain(&mut self, graph: &mut Graph, entry: NodeId) -> bool {
        self.evaluated_count = 0;
        self.pulled_count = 0;
        self.last_error = None;
        self.visited.clear();
        self.resolving.clear();

        let max_steps = self.config.max_flow_steps;
        let mut current = Some(entry);
        while let Some(node_id) = current {
            if self.evaluated_count >= max_steps {
                break;
            }
            trace!(node = %node_id, step = self.evaluated_count, "Evaluating flow node");
            if let Err(e) = self.evaluate_node(graph, node_id) {
                self.last_error = Some(e);
                break;
            }
            self.visited.push(node_id);
            self.evaluated_count += 1;

            if self.evaluated_count == max_steps {
                self.last_error = Some(EvaluationError::InfiniteLoop {
                    node: node_id,
                    steps: self.evaluated_count,
                });
                break;
            }
            current = graph.next_flow_node(node_id);
        }

        match &self.last_error {
            None => true,
            Some(e) => {
                warn!(entry = %entry, code = ?e.code(), "Flow pass failed: {e}");
                false
            }
        }
    }

    /// Refresh every value input of a node from its linked source,
    /// evaluating pure sources first.
    pub fn evaluate_inputs(&mut self, graph: &mut Graph, node_id: NodeId) -> Result<(), EvaluationError> {
        let inputs = graph
            .node(node_id)
            .ok_or(EvaluationError::NodeNotFound(node_id))?
            .inputs()
            .to_vec();

        for input in inputs {
            let Some(pin) = graph.pin(input) else {
                continue;
            };
            if pin.is_flow() {
                continue;
            }
            let Some(source) = graph.source_pin(input) else {
                return Err(EvaluationError::missing_input(node_id, pin.name()));
            };
            let source_node = graph
                .pin(source)
                .map(|p| p.node())
                .ok_or_else(|| EvaluationError::missing_input(node_id, pin.name()))?;
            let pure = graph
                .node(source_node)
                .is_some_and(|n| !n.has_flow_pins());
            if pure {
                self.pull(graph, source_node)?;
            }
            graph
                .copy_pin_value(source, input)
                .map_err(|e| EvaluationError::Graph { node: node_id, source: e })?;
        }
        Ok(())
    }

    /// Steps taken by the last pass
    pub fn evaluated_count(&self) -> usize {
        self.evaluated_count
    }

    /// Pure-node evaluations performed by the last pass
    pub fn pulled_count(&self) -> usize {
        self.pulled_count
    }

    /// Flow nodes evaluated by the last pass, in order
    pub fn visited(&self) -> &[NodeId] {
        &self.visited
    }

    /// Failure of the last pass
    pub fn last_error(&self) -> Option<&EvaluationError> {
        self.last_error.as_ref()
    }

    /// Code of the last failure
    pub fn error_code(&self) -> Option<ErrorCode> {
        self.last_error.as_ref().map(EvaluationError::code)
    }

    /// Message of the last failure
    pub fn error_message(&self) -> Option<String> {
        self.last_error.as_ref().map(ToString::to_string)
    }

    /// Evaluate a single node outside a flow pass: refresh its inputs, then
    /// run its body. Mostly useful for reading pure nodes.
    pub fn evaluate_node(&mut self, graph: &mut Graph, node_id: NodeId) -> Result<(), EvaluationError> {
        self.evaluate_inputs(graph, node_id)?;
        self.run_body(graph, node_id)
    }

    fn pull(&mut self, graph: &mut Graph, node_id: NodeId) -> Result<(), EvaluationError> {
        if !self.resolving.insert(node_id) {
            return Err(EvaluationError::InfiniteLoop {
                node: node_id,
                steps: self.evaluated_count,
            });
        }
        trace!(node = %node_id, "Pulling pure node");
        let result = self.evaluate_node(graph, node_id);
        self.resolving.remove(&node_id);
        self.pulled_count += 1;
        result
    }

    fn run_body(&mut self, graph: &mut Graph, node_id: NodeId) -> Result<(), EvaluationError> {
        let Some(mut behavior) = graph.take_behavior(node_id) else {
            return Err(match graph.node(node_id) {
                Some(_) => EvaluationError::InfiniteLoop {
                    node: node_id,
                    steps: self.evaluated_count,
                },
                None => EvaluationError::NodeNotFound(node_id),
            });
        };
        let result = behavior.evaluate(&mut NodeContext::new(graph, node_id));
        graph.restore_behavior(node_id, behavior);
        result
    }
}

/// View of the graph handed to a node while it evaluates.
///
/// Input and output indices count value pins only; flow pins are skipped.
pub struct NodeContext<'g> {
    graph: &'g mut Graph,
    node: NodeId,
}

impl<'g> NodeContext<'g> {
    pub(crate) fn new(graph: &'g mut Graph, node: NodeId) -> Self {
        Self { graph, node }
    }

    /// Node being evaluated
    pub fn node_id(&self) -> NodeId {
        self.node
    }

    /// Read-only graph access
    pub fn graph(&self) -> &Graph {
        &*self.graph
    }

    /// Value of the `index`-th value input
    pub fn input_value(&self, index: usize) -> Result<&dyn PinValue, EvaluationError> {
        let pin = self.pin(PinDirection::Input, index)?;
        self.graph
            .pin(pin)
            .map(|p| p.value())
            .ok_or_else(|| EvaluationError::missing_input(self.node, format!("#{index}")))
    }

    /// Value of the `index`-th value input as a concrete kind
    pub fn input<T: ValueKind>(&self, index: usize) -> Result<&T, EvaluationError> {
        let node = self.node;
        let value = self.input_value(index)?;
        let found = value.value_type();
        value.downcast_ref::<T>().ok_or_else(|| {
            EvaluationError::failed(node, format!("input #{index} is {found}, not {}", T::signature()))
        })
    }

    /// Write the `index`-th value output
    pub fn set_output_value(&mut self, index: usize, value: &dyn PinValue) -> Result<(), EvaluationError> {
        let pin = self.pin(PinDirection::Output, index)?;
        let node = self.node;
        self.graph
            .set_pin_value(pin, value)
            .map_err(|source| EvaluationError::Graph { node, source })
    }

    /// Write the `index`-th value output from a concrete value
    pub fn set_output<T: ValueKind>(&mut self, index: usize, value: T) -> Result<(), EvaluationError> {
        self.set_output_value(index, &value)
    }

    /// Look up a property
    pub fn property(&self, id: PropertyId) -> Option<&Property> {
        self.graph.property(id)
    }

    /// Overwrite a property's value
    pub fn set_property_value(&mut self, id: PropertyId, value: &dyn PinValue) -> Result<(), EvaluationError> {
        let node = self.node;
        self.graph
            .set_property_value(id, value)
            .map_err(|source| EvaluationError::Graph { node, source })
    }

    fn pin(&self, direction: PinDirection, index: usize) -> Result<PinId, EvaluationError> {
        self.graph
            .value_pin(self.node, direction, index)
            .ok_or_else(|| match direction {
                PinDirection::Input => EvaluationError::missing_input(self.node, format!("#{index}")),
                PinDirection::Output => {
                    EvaluationError::failed(self.node, format!("no value output #{index}"))
                }
            })
    }
}
