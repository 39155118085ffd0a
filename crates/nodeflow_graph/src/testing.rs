// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared fixtures for unit tests.

use crate::evaluator::{EvaluationError, NodeContext};
use crate::graph::Graph;
use crate::node::{NodeBehavior, NodeId, PinLayout};
use crate::registry::Registry;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

pub(crate) fn test_graph() -> Graph {
    Graph::new("test", Arc::new(Registry::new()))
}

/// Records evaluation order and observed values across nodes
#[derive(Debug, Clone, Default)]
pub(crate) struct Journal {
    entries: Rc<RefCell<Vec<NodeId>>>,
    values: Rc<RefCell<Vec<f32>>>,
}

impl Journal {
    pub(crate) fn entries(&self) -> Vec<NodeId> {
        self.entries.borrow().clone()
    }

    pub(crate) fn values(&self) -> Vec<f32> {
        self.values.borrow().clone()
    }

    fn record(&self, node: NodeId) {
        self.entries.borrow_mut().push(node);
    }

    fn record_value(&self, value: f32) {
        self.values.borrow_mut().push(value);
    }
}

#[derive(Debug)]
enum Shape {
    Step,
    Consumer,
    Constant(f32),
    Offset(f32),
}

#[derive(Debug)]
struct TestNode {
    shape: Shape,
    journal: Option<Journal>,
}

impl NodeBehavior for TestNode {
    fn kind(&self) -> &str {
        match self.shape {
            Shape::Step => "test_step",
            Shape::Consumer => "test_consumer",
            Shape::Constant(_) => "test_constant",
            Shape::Offset(_) => "test_offset",
        }
    }

    fn has_flow_pins(&self) -> bool {
        matches!(self.shape, Shape::Step | Shape::Consumer)
    }

    fn declare_pins(&self, _graph: &Graph, pins: &mut PinLayout) {
        match self.shape {
            Shape::Step => {
                pins.flow_input().flow_output();
            }
            Shape::Consumer => {
                pins.flow_input()
                    .flow_output()
                    .input("Value", 0.0_f32)
                    .output("Value", 0.0_f32);
            }
            Shape::Constant(value) => {
                pins.output("Value", value);
            }
            Shape::Offset(_) => {
                pins.input("In", 0.0_f32).output("Out", 0.0_f32);
            }
        }
    }

    fn evaluate(&mut self, ctx: &mut NodeContext<'_>) -> Result<(), EvaluationError> {
        if let Some(journal) = &self.journal {
            journal.record(ctx.node_id());
        }
        match self.shape {
            Shape::Step => Ok(()),
            Shape::Consumer => {
                let value = *ctx.input::<f32>(0)?;
                if let Some(journal) = &self.journal {
                    journal.record_value(value);
                }
                ctx.set_output(0, value)
            }
            Shape::Constant(value) => ctx.set_output(0, value),
            Shape::Offset(offset) => {
                let value = *ctx.input::<f32>(0)? + offset;
                ctx.set_output(0, value)
            }
        }
    }
}

/// Flow node with no value pins
pub(crate) fn flow_step(journal: &Journal) -> Box<dyn NodeBehavior> {
    Box::new(TestNode {
        shape: Shape::Step,
        journal: Some(journal.clone()),
    })
}

/// Flow node passing a float input through and recording it
pub(crate) fn consumer(journal: &Journal) -> Box<dyn NodeBehavior> {
    Box::new(TestNode {
        shape: Shape::Consumer,
        journal: Some(journal.clone()),
    })
}

/// Pure node emitting a constant
pub(crate) fn constant(journal: &Journal, value: f32) -> Box<dyn NodeBehavior> {
    Box::new(TestNode {
        shape: Shape::Constant(value),
        journal: Some(journal.clone()),
    })
}

/// Pure node adding `offset` to its input
pub(crate) fn float_pure(offset: f32) -> Box<dyn NodeBehavior> {
    Box::new(TestNode {
        shape: Shape::Offset(offset),
        journal: None,
    })
}
