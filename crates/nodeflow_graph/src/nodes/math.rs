// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pure float math nodes.

use crate::evaluator::{EvaluationError, NodeContext};
use crate::graph::Graph;
use crate::node::{NodeBehavior, PinLayout};
use serde::{Deserialize, Serialize};

/// Outputs a constant float
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FloatConstant {
    /// Constant value
    pub value: f32,
}

impl FloatConstant {
    /// Registry type ID
    pub const KIND: &'static str = "float_constant";

    /// Create a constant node behavior
    pub fn new(value: f32) -> Self {
        Self { value }
    }
}

impl NodeBehavior for FloatConstant {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn has_flow_pins(&self) -> bool {
        false
    }

    fn declare_pins(&self, _graph: &Graph, pins: &mut PinLayout) {
        pins.output("Value", self.value);
    }

    fn evaluate(&mut self, ctx: &mut NodeContext<'_>) -> Result<(), EvaluationError> {
        ctx.set_output(0, self.value)
    }

    fn save_state(&self) -> serde_json::Value {
        serde_json::json!({ "value": self.value })
    }

    fn load_state(&mut self, state: &serde_json::Value) -> Result<(), serde_json::Error> {
        if !state.is_null() {
            *self = Self::deserialize(state)?;
        }
        Ok(())
    }
}

/// Binary float operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MathOp {
    /// A + B
    Add,
    /// A * B
    Multiply,
}

impl MathOp {
    /// Registry type ID for this operation
    pub fn kind(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Multiply => "multiply",
        }
    }

    fn apply(self, a: f32, b: f32) -> f32 {
        match self {
            Self::Add => a + b,
            Self::Multiply => a * b,
        }
    }
}

/// Pure node computing `A op B`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryMath {
    op: MathOp,
}

impl BinaryMath {
    /// Create a math node behavior
    pub fn new(op: MathOp) -> Self {
        Self { op }
    }
}

impl NodeBehavior for BinaryMath {
    fn kind(&self) -> &str {
        self.op.kind()
    }

    fn has_flow_pins(&self) -> bool {
        false
    }

    fn declare_pins(&self, _graph: &Graph, pins: &mut PinLayout) {
        pins.input("A", 0.0_f32)
            .input("B", 0.0_f32)
            .output("Result", 0.0_f32);
    }

    fn evaluate(&mut self, ctx: &mut NodeContext<'_>) -> Result<(), EvaluationError> {
        let a = *ctx.input::<f32>(0)?;
        let b = *ctx.input::<f32>(1)?;
        ctx.set_output(0, self.op.apply(a, b))
    }
}
