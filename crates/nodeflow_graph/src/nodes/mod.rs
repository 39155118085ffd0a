// SPDX-License-Identifier: MIT OR Apache-2.0
//! Built-in node catalog.
//!
//! Supports execution flow and data flow.

pub mod event;
pub mod math;
pub mod variable;

use crate::node::{NodeCategory, NodeType};
use crate::registry::Registry;

pub use event::{EventBegin, LogValue};
pub use math::{BinaryMath, FloatConstant, MathOp};
pub use variable::{GetVariable, SetVariable};

/// Create a registry holding every built-in node type
pub fn builtin_registry() -> Registry {
    let mut registry = Registry::new();

    // Events
    registry.register(NodeType {
        id: EventBegin::KIND.to_string(),
        name: "Event Begin".to_string(),
        category: NodeCategory::Event,
        description: "Entry point of a flow pass".to_string(),
        factory: || Box::new(EventBegin),
    });

    registry.register(NodeType {
        id: LogValue::KIND.to_string(),
        name: "Log Value".to_string(),
        category: NodeCategory::Utility,
        description: "Log a float to the engine log".to_string(),
        factory: || Box::new(LogValue::default()),
    });

    // Math
    registry.register(NodeType {
        id: FloatConstant::KIND.to_string(),
        name: "Float".to_string(),
        category: NodeCategory::Input,
        description: "Constant float value".to_string(),
        factory: || Box::new(FloatConstant::default()),
    });

    registry.register(NodeType {
        id: MathOp::Add.kind().to_string(),
        name: "Add".to_string(),
        category: NodeCategory::Math,
        description: "A + B".to_string(),
        factory: || Box::new(BinaryMath::new(MathOp::Add)),
    });

    registry.register(NodeType {
        id: MathOp::Multiply.kind().to_string(),
        name: "Multiply".to_string(),
        category: NodeCategory::Math,
        description: "A * B".to_string(),
        factory: || Box::new(BinaryMath::new(MathOp::Multiply)),
    });

    // Variables
    registry.register(NodeType {
        id: GetVariable::KIND.to_string(),
        name: "Get Variable".to_string(),
        category: NodeCategory::Variable,
        description: "Read a graph property".to_string(),
        factory: || Box::new(GetVariable::default()),
    });

    registry.register(NodeType {
        id: SetVariable::KIND.to_string(),
        name: "Set Variable".to_string(),
        category: NodeCategory::Variable,
        description: "Write a graph property".to_string(),
        factory: || Box::new(SetVariable::default()),
    });

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Graph;
    use std::sync::Arc;

    #[test]
    fn test_builtin_registry() {
        let registry = builtin_registry();
        assert_eq!(registry.types().count(), 7);
        assert_eq!(registry.types_in_category(NodeCategory::Variable).count(), 2);
        for node_type in registry.types() {
            let behavior = (node_type.factory)();
            assert_eq!(behavior.kind(), node_type.id);
        }
    }

    #[test]
    fn test_create_node_from_registry() {
        let mut graph = Graph::new("test", Arc::new(builtin_registry()));
        let add = graph.create_node("add").unwrap();
        let node = graph.node(add).unwrap();
        assert_eq!(node.name(), "Add");
        assert_eq!(node.node_type(), "add");
        assert_eq!(node.inputs().len(), 2);
        assert_eq!(node.outputs().len(), 1);
        assert!(!node.has_flow_pins());

        assert!(matches!(
            graph.create_node("blend_layers"),
            Err(crate::GraphError::UnknownNodeType(id)) if id == "blend_layers"
        ));
    }
}
