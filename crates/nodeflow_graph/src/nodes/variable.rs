// SPDX-License-Identifier: MIT OR Apache-2.0
//! Variable nodes reading and writing graph properties.
//!
//! The value pins of a variable node take the type of the bound property.
//! When the property is deleted the node keeps its pins but becomes
//! unbound, and evaluating it reports a missing input.

use crate::evaluator::{EvaluationError, NodeContext};
use crate::graph::Graph;
use crate::node::{NodeBehavior, PinLayout};
use crate::property::PropertyId;
use crate::value::PinValue;
use serde::{Deserialize, Serialize};

const BINDING: &str = "property";

fn bound_value(graph: &Graph, property: Option<PropertyId>) -> Option<Box<dyn PinValue>> {
    graph.property(property?).map(|p| p.value().clone_value())
}

fn read_bound(ctx: &NodeContext<'_>, property: Option<PropertyId>) -> Result<Box<dyn PinValue>, EvaluationError> {
    property
        .and_then(|id| ctx.property(id))
        .map(|p| p.value().clone_value())
        .ok_or_else(|| EvaluationError::missing_input(ctx.node_id(), BINDING))
}

/// Pure node mirroring a property's value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GetVariable {
    /// Bound property; `None` once the property is deleted
    pub property: Option<PropertyId>,
}

impl GetVariable {
    /// Registry type ID
    pub const KIND: &'static str = "get_variable";

    /// Create a getter bound to a property
    pub fn new(property: PropertyId) -> Self {
        Self {
            property: Some(property),
        }
    }
}

impl NodeBehavior for GetVariable {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn has_flow_pins(&self) -> bool {
        false
    }

    fn declare_pins(&self, graph: &Graph, pins: &mut PinLayout) {
        if let Some(value) = bound_value(graph, self.property) {
            pins.output_value("Value", value);
        }
    }

    fn evaluate(&mut self, ctx: &mut NodeContext<'_>) -> Result<(), EvaluationError> {
        let value = read_bound(ctx, self.property)?;
        ctx.set_output_value(0, &*value)
    }

    fn bound_property(&self) -> Option<PropertyId> {
        self.property
    }

    fn bind_property(&mut self, property: PropertyId) -> bool {
        self.property = Some(property);
        true
    }

    fn on_property_deleted(&mut self, property: PropertyId) {
        if self.property == Some(property) {
            self.property = None;
        }
    }

    fn save_state(&self) -> serde_json::Value {
        serde_json::json!({ "property": self.property })
    }

    fn load_state(&mut self, state: &serde_json::Value) -> Result<(), serde_json::Error> {
        if !state.is_null() {
            *self = Self::deserialize(state)?;
        }
        Ok(())
    }
}

/// Flow node writing its input into a property, then mirroring the stored
/// value on its output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetVariable {
    /// Bound property; `None` once the property is deleted
    pub property: Option<PropertyId>,
}

impl SetVariable {
    /// Registry type ID
    pub const KIND: &'static str = "set_variable";

    /// Create a setter bound to a property
    pub fn new(property: PropertyId) -> Self {
        Self {
            property: Some(property),
        }
    }
}

impl NodeBehavior for SetVariable {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn has_flow_pins(&self) -> bool {
        true
    }

    fn declare_pins(&self, graph: &Graph, pins: &mut PinLayout) {
        pins.flow_input().flow_output();
        if let Some(value) = bound_value(graph, self.property) {
            pins.input_value("Value", value.clone_value())
                .output_value("Value", value);
        }
    }

    fn evaluate(&mut self, ctx: &mut NodeContext<'_>) -> Result<(), EvaluationError> {
        let Some(property) = self.property.filter(|id| ctx.property(*id).is_some()) else {
            return Err(EvaluationError::missing_input(ctx.node_id(), BINDING));
        };
        let incoming = ctx.input_value(0)?.clone_value();
        ctx.set_property_value(property, &*incoming)?;

        let stored = read_bound(ctx, self.property)?;
        ctx.set_output_value(0, &*stored)
    }

    fn bound_property(&self) -> Option<PropertyId> {
        self.property
    }

    fn bind_property(&mut self, property: PropertyId) -> bool {
        self.property = Some(property);
        true
    }

    fn on_property_deleted(&mut self, property: PropertyId) {
        if self.property == Some(property) {
            self.property = None;
        }
    }

    fn save_state(&self) -> serde_json::Value {
        serde_json::json!({ "property": self.property })
    }

    fn load_state(&mut self, state: &serde_json::Value) -> Result<(), serde_json::Error> {
        if !state.is_null() {
            *self = Self::deserialize(state)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{builtin_registry, EventBegin, FloatConstant};
    use crate::{ErrorCode, Evaluator, GraphEvent, NodeId, PinDirection, PinId};
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;

    struct Scene {
        graph: Graph,
        speed: PropertyId,
        begin: NodeId,
        getter: NodeId,
        setter: NodeId,
        input: NodeId,
    }

    fn value_pin(graph: &Graph, node: NodeId, direction: PinDirection) -> PinId {
        graph.value_pin(node, direction, 0).unwrap()
    }

    fn scene() -> Scene {
        let mut graph = Graph::new("variables", Arc::new(builtin_registry()));
        let speed = graph.create_property("speed", Box::new(1.0_f32), None).unwrap();
        let begin = graph.add_node(Box::new(EventBegin));
        let getter = graph.add_node(Box::new(GetVariable::new(speed)));
        let setter = graph.add_node(Box::new(SetVariable::new(speed)));
        let input = graph.add_node(Box::new(FloatConstant::new(5.0)));

        let flow_out = graph.flow_pin(begin, PinDirection::Output).unwrap();
        let flow_in = graph.flow_pin(setter, PinDirection::Input).unwrap();
        graph.create_link(flow_out, flow_in).unwrap();
        let constant_out = value_pin(&graph, input, PinDirection::Output);
        let setter_in = value_pin(&graph, setter, PinDirection::Input);
        graph.create_link(constant_out, setter_in).unwrap();

        Scene {
            graph,
            speed,
            begin,
            getter,
            setter,
            input,
        }
    }

    fn read_getter(scene: &mut Scene, evaluator: &mut Evaluator) -> Option<f32> {
        evaluator.evaluate_node(&mut scene.graph, scene.getter).ok()?;
        let out = value_pin(&scene.graph, scene.getter, PinDirection::Output);
        scene.graph.pin_value::<f32>(out).copied()
    }

    #[test]
    fn test_get_and_set_variable() {
        let mut scene = scene();
        let mut evaluator = Evaluator::new();
        assert_eq!(read_getter(&mut scene, &mut evaluator), Some(1.0));

        assert!(evaluator.evaluate_flow_pin_chain(&mut scene.graph, scene.begin));
        assert_eq!(evaluator.visited(), &[scene.begin, scene.setter]);
        let speed = scene.graph.property(scene.speed).unwrap();
        assert_eq!(speed.get::<f32>(), Some(&5.0));
        let setter_out = value_pin(&scene.graph, scene.setter, PinDirection::Output);
        assert_eq!(scene.graph.pin_value::<f32>(setter_out), Some(&5.0));

        assert_eq!(read_getter(&mut scene, &mut evaluator), Some(5.0));
    }

    #[test]
    fn test_set_variable_notifies_modification() {
        let mut scene = scene();
        let modified = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&modified);
        scene.graph.subscribe(move |_, event| {
            if let GraphEvent::PropertyModified(id) = *event {
                sink.borrow_mut().push(id);
            }
        });

        let mut evaluator = Evaluator::new();
        assert!(evaluator.evaluate_flow_pin_chain(&mut scene.graph, scene.begin));
        assert_eq!(*modified.borrow(), vec![scene.speed]);
    }

    #[test]
    fn test_deleting_property_unbinds_variables() {
        let mut scene = scene();
        let pins_before = scene.graph.pin_count();
        assert!(scene.graph.delete_property(scene.speed));

        for node in [scene.getter, scene.setter] {
            let behavior = scene.graph.node(node).unwrap().behavior().unwrap();
            assert_eq!(behavior.bound_property(), None);
        }
        // pins and links stay in place
        assert_eq!(scene.graph.pin_count(), pins_before);
        assert_eq!(scene.graph.link_count(), 2);

        let mut evaluator = Evaluator::new();
        assert!(matches!(
            evaluator.evaluate_node(&mut scene.graph, scene.getter),
            Err(EvaluationError::MissingInput { node, .. }) if node == scene.getter
        ));
        assert!(!evaluator.evaluate_flow_pin_chain(&mut scene.graph, scene.begin));
        assert_eq!(evaluator.error_code(), Some(ErrorCode::MissingInput));
        assert_eq!(evaluator.visited(), &[scene.begin]);
    }

    #[test]
    fn test_rebinding_rebuilds_pins() {
        let mut scene = scene();
        let gain = scene.graph.create_property("gain", Box::new(2.0_f32), None).unwrap();
        let count = scene.graph.create_property("count", Box::new(0_i32), None).unwrap();

        scene.graph.bind_property(scene.setter, gain).unwrap();
        let setter = scene.graph.node(scene.setter).unwrap();
        assert_eq!(setter.behavior().unwrap().bound_property(), Some(gain));
        // flow and value links survive a compatible rebind
        assert_eq!(scene.graph.link_count(), 2);
        let setter_in = value_pin(&scene.graph, scene.setter, PinDirection::Input);
        let constant_out = value_pin(&scene.graph, scene.input, PinDirection::Output);
        assert_eq!(scene.graph.source_pin(setter_in), Some(constant_out));

        scene.graph.bind_property(scene.setter, count).unwrap();
        assert_eq!(scene.graph.link_count(), 1);
        let setter_in = value_pin(&scene.graph, scene.setter, PinDirection::Input);
        assert_eq!(scene.graph.pin(setter_in).unwrap().get::<i32>(), Some(&0));
        assert!(!scene.graph.pin(constant_out).unwrap().is_connected());
    }

    #[test]
    fn test_registry_getter_binds_after_creation() {
        let mut scene = scene();
        let getter = scene.graph.create_node(GetVariable::KIND).unwrap();
        assert!(scene.graph.node(getter).unwrap().outputs().is_empty());

        scene.graph.bind_property(getter, scene.speed).unwrap();
        let out = value_pin(&scene.graph, getter, PinDirection::Output);
        assert_eq!(scene.graph.pin(out).unwrap().get::<f32>(), Some(&1.0));
        assert!(scene.graph.bind_property(scene.begin, scene.speed).is_err());
    }
}
