// SPDX-License-Identifier: MIT OR Apache-2.0
//! Flow entry and logging nodes.

use crate::evaluator::{EvaluationError, NodeContext};
use crate::graph::Graph;
use crate::node::{NodeBehavior, PinLayout};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Entry point of a flow pass; only has a flow output
#[derive(Debug, Clone, Copy, Default)]
pub struct EventBegin;

impl EventBegin {
    /// Registry type ID
    pub const KIND: &'static str = "event_begin";
}

impl NodeBehavior for EventBegin {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn has_flow_pins(&self) -> bool {
        true
    }

    fn declare_pins(&self, _graph: &Graph, pins: &mut PinLayout) {
        pins.flow_output();
    }

    fn evaluate(&mut self, _ctx: &mut NodeContext<'_>) -> Result<(), EvaluationError> {
        Ok(())
    }
}

/// Logs its float input and passes it through
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogValue {
    /// Prefix written before the value
    pub label: String,
    #[serde(skip)]
    last: Option<f32>,
}

impl LogValue {
    /// Registry type ID
    pub const KIND: &'static str = "log_value";

    /// Create a logger with a label
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            last: None,
        }
    }

    /// Value logged by the most recent evaluation
    pub fn last(&self) -> Option<f32> {
        self.last
    }
}

impl NodeBehavior for LogValue {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn has_flow_pins(&self) -> bool {
        true
    }

    fn declare_pins(&self, _graph: &Graph, pins: &mut PinLayout) {
        pins.flow_input()
            .flow_output()
            .input("Value", 0.0_f32)
            .output("Value", 0.0_f32);
    }

    fn evaluate(&mut self, ctx: &mut NodeContext<'_>) -> Result<(), EvaluationError> {
        let value = *ctx.input::<f32>(0)?;
        info!(node = %ctx.node_id(), label = %self.label, value, "Log value");
        self.last = Some(value);
        ctx.set_output(0, value)
    }

    fn save_state(&self) -> serde_json::Value {
        serde_json::json!({ "label": self.label })
    }

    fn load_state(&mut self, state: &serde_json::Value) -> Result<(), serde_json::Error> {
        if !state.is_null() {
            *self = Self::deserialize(state)?;
        }
        Ok(())
    }
}
