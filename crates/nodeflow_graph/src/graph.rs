// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph data structure owning nodes, pins, links and properties.
//!
//! Every entity is stored in an id-keyed map and every cross reference is an
//! id, so all deletions go through the graph and cascade from here.

use crate::event::{GraphEvent, Subscribers, SubscriptionId};
use crate::link::{Link, LinkId};
use crate::node::{Node, NodeBehavior, NodeId, PinLayout};
use crate::pin::{Pin, PinDirection, PinId};
use crate::property::{Property, PropertyId};
use crate::registry::Registry;
use crate::value::{PinValue, ValueError, ValueKind};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// A node graph
#[derive(Debug)]
pub struct Graph {
    /// Graph name
    pub name: String,
    pub(crate) registry: Arc<Registry>,
    pub(crate) next_id: u64,
    pub(crate) nodes: IndexMap<NodeId, Node>,
    pub(crate) pins: IndexMap<PinId, Pin>,
    pub(crate) links: IndexMap<LinkId, Link>,
    pub(crate) properties: IndexMap<PropertyId, Property>,
    subscribers: Subscribers,
}

/// Far end of a link recorded before a pin rebuild
enum FormerPeer {
    /// Pin on another node
    Pin(PinId),
    /// Pin on the rebuilt node, by name and direction
    Own(String, PinDirection),
}

impl Graph {
    /// Create a new empty graph
    pub fn new(name: impl Into<String>, registry: Arc<Registry>) -> Self {
        Self {
            name: name.into(),
            registry,
            next_id: 1,
            nodes: IndexMap::new(),
            pins: IndexMap::new(),
            links: IndexMap::new(),
            properties: IndexMap::new(),
            subscribers: Subscribers::default(),
        }
    }

    /// Registry this graph creates nodes from
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Allocate a fresh id. Ids are shared by all entity kinds and never
    /// reused.
    ///
    /// The counter starts at 1 and loaded documents resume at most at
    /// [`MAX_DOCUMENT_ID`](crate::document::MAX_DOCUMENT_ID), which leaves
    /// half the id space for allocation.
    pub fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id = id.saturating_add(1);
        id
    }

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    /// Create a node from a registered type
    pub fn create_node(&mut self, type_id: &str) -> Result<NodeId, GraphError> {
        let node_type = self
            .registry
            .get(type_id)
            .ok_or_else(|| GraphError::UnknownNodeType(type_id.to_string()))?;
        let name = node_type.name.clone();
        let behavior = (node_type.factory)();
        let id = self.add_node(behavior);
        if let Some(node) = self.nodes.get_mut(&id) {
            node.name = name;
        }
        Ok(id)
    }

    /// Add a node with a caller-built behavior and allocate its pins
    pub fn add_node(&mut self, behavior: Box<dyn NodeBehavior>) -> NodeId {
        let id = NodeId(self.allocate_id());
        let mut layout = PinLayout::default();
        behavior.declare_pins(self, &mut layout);

        let node = Node::new(id, behavior.kind().to_string(), behavior);
        debug!(node = %id, kind = %node.node_type, "Created node");
        self.nodes.insert(id, node);
        self.attach_pins(id, layout);
        id
    }

    /// Delete a node, its pins and every link attached to them
    pub fn delete_node(&mut self, node_id: NodeId) -> bool {
        let Some(node) = self.nodes.get(&node_id) else {
            return false;
        };
        let pins: Vec<PinId> = node.pins().collect();
        for pin in pins {
            self.delete_pin(pin);
        }

        self.notify(GraphEvent::NodeDeleted(node_id));
        self.nodes.shift_remove(&node_id);
        debug!(node = %node_id, "Deleted node");
        true
    }

    /// Re-declare a node's pins after its configuration changed.
    ///
    /// Former links are restored where a pin with the same name and direction
    /// still exists and the link is still compatible.
    pub fn rebuild_pins(&mut self, node_id: NodeId) -> Result<(), GraphError> {
        let node = self.nodes.get(&node_id).ok_or(GraphError::UnknownNode(node_id))?;
        let behavior = node.behavior().ok_or(GraphError::NodeBusy(node_id))?;

        let mut layout = PinLayout::default();
        behavior.declare_pins(self, &mut layout);
        let flow = behavior.has_flow_pins();

        // Self links are recorded once, from the input side, with the peer
        // kept by name since its id dies with the rebuild
        let mut former = Vec::new();
        for pin in node.pins().filter_map(|id| self.pins.get(&id)) {
            for link in pin.links.iter().filter_map(|id| self.links.get(id)) {
                let Some(peer) = link.other_end(pin.id).and_then(|id| self.pins.get(&id)) else {
                    continue;
                };
                let peer = if peer.node != node_id {
                    FormerPeer::Pin(peer.id)
                } else if pin.direction == PinDirection::Input {
                    FormerPeer::Own(peer.name.clone(), peer.direction)
                } else {
                    continue;
                };
                former.push((pin.name.clone(), pin.direction, peer));
            }
        }

        let old: Vec<PinId> = node.pins().collect();
        for pin in old {
            self.delete_pin(pin);
        }

        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.flow = flow;
        }
        self.attach_pins(node_id, layout);

        for (name, direction, peer) in former {
            let Some(pin) = self.find_pin(node_id, direction, &name) else {
                continue;
            };
            let peer = match peer {
                FormerPeer::Pin(peer) if self.pins.contains_key(&peer) => peer,
                FormerPeer::Pin(_) => continue,
                FormerPeer::Own(peer_name, peer_direction) => {
                    match self.find_pin(node_id, peer_direction, &peer_name) {
                        Some(peer) => peer,
                        None => continue,
                    }
                }
            };
            if let Err(e) = self.create_link(pin, peer) {
                debug!(node = %node_id, pin = %name, "Dropped link on rebuild: {e}");
            }
        }
        Ok(())
    }

    /// Get a node by ID
    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Get a mutable node by ID
    pub fn node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    /// Get all nodes
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    // ------------------------------------------------------------------
    // Pins
    // ------------------------------------------------------------------

    /// Delete a pin and every link attached to it
    pub fn delete_pin(&mut self, pin_id: PinId) -> bool {
        let Some(pin) = self.pins.get(&pin_id) else {
            return false;
        };
        let links = pin.links.clone();
        for link in links {
            self.delete_link(link);
        }

        self.notify(GraphEvent::PinDeleted(pin_id));
        if let Some(pin) = self.pins.get(&pin_id) {
            if let Some(node) = self.nodes.get_mut(&pin.node) {
                node.detach_pin(pin_id);
            }
        }
        self.pins.shift_remove(&pin_id);
        true
    }

    /// Get a pin by ID
    pub fn pin(&self, pin_id: PinId) -> Option<&Pin> {
        self.pins.get(&pin_id)
    }

    /// Get all pins
    pub fn pins(&self) -> impl Iterator<Item = &Pin> {
        self.pins.values()
    }

    /// Get the number of pins
    pub fn pin_count(&self) -> usize {
        self.pins.len()
    }

    /// Find a node's pin by direction and name
    pub fn find_pin(&self, node_id: NodeId, direction: PinDirection, name: &str) -> Option<PinId> {
        let node = self.nodes.get(&node_id)?;
        let list = match direction {
            PinDirection::Input => &node.inputs,
            PinDirection::Output => &node.outputs,
        };
        list.iter()
            .copied()
            .find(|id| self.pins.get(id).is_some_and(|p| p.name == name))
    }

    /// The `index`-th non-flow pin of a node in the given direction
    pub fn value_pin(&self, node_id: NodeId, direction: PinDirection, index: usize) -> Option<PinId> {
        let node = self.nodes.get(&node_id)?;
        let list = match direction {
            PinDirection::Input => &node.inputs,
            PinDirection::Output => &node.outputs,
        };
        list.iter()
            .copied()
            .filter(|id| self.pins.get(id).is_some_and(|p| !p.is_flow()))
            .nth(index)
    }

    /// The node's single flow pin in the given direction
    pub fn flow_pin(&self, node_id: NodeId, direction: PinDirection) -> Option<PinId> {
        let node = self.nodes.get(&node_id)?;
        let list = match direction {
            PinDirection::Input => &node.inputs,
            PinDirection::Output => &node.outputs,
        };
        list.iter()
            .copied()
            .find(|id| self.pins.get(id).is_some_and(Pin::is_flow))
    }

    /// The pin feeding `input`, if it is an input with exactly one link
    pub fn source_pin(&self, input: PinId) -> Option<PinId> {
        let link = self.pins.get(&input)?.source_link()?;
        self.links.get(&link)?.other_end(input)
    }

    /// Read a pin's value as a concrete kind
    pub fn pin_value<T: ValueKind>(&self, pin_id: PinId) -> Option<&T> {
        self.pins.get(&pin_id)?.get::<T>()
    }

    /// Overwrite a pin's value
    pub fn set_pin_value(&mut self, pin_id: PinId, value: &dyn PinValue) -> Result<(), GraphError> {
        let pin = self.pins.get_mut(&pin_id).ok_or(GraphError::UnknownPin(pin_id))?;
        pin.copy_value_from(value)?;
        Ok(())
    }

    /// Copy the value of one pin into another
    pub(crate) fn copy_pin_value(&mut self, source: PinId, target: PinId) -> Result<(), GraphError> {
        let value = self
            .pins
            .get(&source)
            .ok_or(GraphError::UnknownPin(source))?
            .value
            .clone_value();
        self.set_pin_value(target, &*value)
    }

    // ------------------------------------------------------------------
    // Links
    // ------------------------------------------------------------------

    /// Link two pins.
    ///
    /// The input endpoint loses any link it already had.
    pub fn create_link(&mut self, a: PinId, b: PinId) -> Result<LinkId, GraphError> {
        let pin_a = self.pins.get(&a).ok_or(GraphError::UnknownPin(a))?;
        let pin_b = self.pins.get(&b).ok_or(GraphError::UnknownPin(b))?;
        if !pin_a.can_connect_to(pin_b) {
            return Err(GraphError::IncompatiblePins(a, b));
        }

        let input = if pin_a.direction == PinDirection::Input { pin_a } else { pin_b };
        let replaced = input.links.clone();
        for link in replaced {
            self.delete_link(link);
        }

        let id = LinkId(self.allocate_id());
        self.links.insert(id, Link::new(id, a, b));
        for pin in [a, b] {
            if let Some(pin) = self.pins.get_mut(&pin) {
                pin.connect(id);
            }
        }
        debug!(link = %id, start = %a, end = %b, "Created link");
        Ok(id)
    }

    /// Delete a link and detach it from both endpoints
    pub fn delete_link(&mut self, link_id: LinkId) -> bool {
        let Some(link) = self.links.get(&link_id).copied() else {
            return false;
        };

        self.notify(GraphEvent::LinkDeleted(link_id));
        for pin_id in link.endpoints() {
            let Some(pin) = self.pins.get_mut(&pin_id) else {
                continue;
            };
            pin.disconnect(link_id);
            let owner = pin.node;
            if let Some(behavior) = self.nodes.get_mut(&owner).and_then(Node::behavior_mut) {
                behavior.on_link_disconnected(pin_id);
            }
        }
        self.links.shift_remove(&link_id);
        true
    }

    /// Get a link by ID
    pub fn link(&self, link_id: LinkId) -> Option<&Link> {
        self.links.get(&link_id)
    }

    /// Get all links
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    /// Get the number of links
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Get links involving a node
    pub fn links_for_node(&self, node_id: NodeId) -> impl Iterator<Item = &Link> {
        let pins: Vec<PinId> = self
            .nodes
            .get(&node_id)
            .map(|n| n.pins().collect())
            .unwrap_or_default();
        self.links
            .values()
            .filter(move |l| pins.iter().any(|p| l.involves(*p)))
    }

    /// The node reached by following a node's flow output, if linked
    pub fn next_flow_node(&self, node_id: NodeId) -> Option<NodeId> {
        let flow_out = self.flow_pin(node_id, PinDirection::Output)?;
        let pin = self.pins.get(&flow_out)?;
        let link = self.links.get(pin.links.first()?)?;
        let next = link.other_end(flow_out)?;
        self.pins.get(&next).map(|p| p.node)
    }

    // ------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------

    /// Create a property, optionally grouped under a parent
    pub fn create_property(
        &mut self,
        name: impl Into<String>,
        value: Box<dyn PinValue>,
        parent: Option<PropertyId>,
    ) -> Result<PropertyId, GraphError> {
        if let Some(parent) = parent {
            if !self.properties.contains_key(&parent) {
                return Err(GraphError::UnknownProperty(parent));
            }
        }
        let id = PropertyId(self.allocate_id());
        let property = Property::new(id, name.into(), value, parent);
        debug!(property = %id, name = %property.name, ty = %property.value_type(), "Created property");
        self.properties.insert(id, property);
        Ok(id)
    }

    /// Delete a property, its child properties, and unbind every variable
    /// node that referenced them
    pub fn delete_property(&mut self, property_id: PropertyId) -> bool {
        if !self.properties.contains_key(&property_id) {
            return false;
        }

        let mut subtree = vec![property_id];
        let mut seen = HashSet::from([property_id]);
        let mut next = 0;
        while let Some(&parent) = subtree.get(next) {
            next += 1;
            let children: Vec<PropertyId> = self.child_properties(parent).collect();
            for child in children {
                if seen.insert(child) {
                    subtree.push(child);
                }
            }
        }

        // Descendants go before their ancestors
        for id in subtree.into_iter().rev() {
            self.remove_property(id);
        }
        true
    }

    fn remove_property(&mut self, property_id: PropertyId) {
        self.notify(GraphEvent::PropertyDeleted(property_id));
        for node in self.nodes.values_mut() {
            if let Some(behavior) = node.behavior_mut() {
                if behavior.bound_property() == Some(property_id) {
                    behavior.on_property_deleted(property_id);
                }
            }
        }
        self.properties.shift_remove(&property_id);
        debug!(property = %property_id, "Deleted property");
    }

    /// Bind a variable node to a property and rebuild its pins to match
    /// the property's type
    pub fn bind_property(&mut self, node_id: NodeId, property_id: PropertyId) -> Result<(), GraphError> {
        if !self.properties.contains_key(&property_id) {
            return Err(GraphError::UnknownProperty(property_id));
        }
        let behavior = self
            .nodes
            .get_mut(&node_id)
            .ok_or(GraphError::UnknownNode(node_id))?
            .behavior_mut()
            .ok_or(GraphError::NodeBusy(node_id))?;
        if !behavior.bind_property(property_id) {
            return Err(GraphError::NotBindable(node_id));
        }
        debug!(node = %node_id, property = %property_id, "Bound property");
        self.rebuild_pins(node_id)
    }

    /// Overwrite a property's value and notify subscribers
    pub fn set_property_value(
        &mut self,
        property_id: PropertyId,
        value: &dyn PinValue,
    ) -> Result<(), GraphError> {
        let property = self
            .properties
            .get_mut(&property_id)
            .ok_or(GraphError::UnknownProperty(property_id))?;
        property.value.copy_from(value)?;
        self.notify(GraphEvent::PropertyModified(property_id));
        Ok(())
    }

    /// Get a property by ID
    pub fn property(&self, property_id: PropertyId) -> Option<&Property> {
        self.properties.get(&property_id)
    }

    /// Find a property by name
    pub fn find_property(&self, name: &str) -> Option<PropertyId> {
        self.properties.values().find(|p| p.name == name).map(|p| p.id)
    }

    /// Get all properties
    pub fn properties(&self) -> impl Iterator<Item = &Property> {
        self.properties.values()
    }

    /// Properties grouped directly under `parent`
    pub fn child_properties(&self, parent: PropertyId) -> impl Iterator<Item = PropertyId> + '_ {
        self.properties
            .values()
            .filter(move |p| p.parent == Some(parent))
            .map(|p| p.id)
    }

    /// Get the number of properties
    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    // ------------------------------------------------------------------
    // Notifications
    // ------------------------------------------------------------------

    /// Register a callback for graph events. Callbacks run synchronously,
    /// in subscription order, before deletions take effect.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&Graph, &GraphEvent) + 'static,
    {
        self.subscribers.add(Box::new(callback))
    }

    /// Remove a callback
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.remove(id)
    }

    fn notify(&mut self, event: GraphEvent) {
        if self.subscribers.is_empty() {
            return;
        }
        let mut subscribers = std::mem::take(&mut self.subscribers);
        subscribers.dispatch(self, &event);
        self.subscribers = subscribers;
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn attach_pins(&mut self, node_id: NodeId, layout: PinLayout) {
        for spec in layout.into_pins() {
            let pin_id = PinId(self.allocate_id());
            let direction = spec.direction;
            self.pins.insert(pin_id, Pin::new(pin_id, node_id, spec));
            if let Some(node) = self.nodes.get_mut(&node_id) {
                match direction {
                    PinDirection::Input => node.inputs.push(pin_id),
                    PinDirection::Output => node.outputs.push(pin_id),
                }
            }
        }
    }

    pub(crate) fn take_behavior(&mut self, node_id: NodeId) -> Option<Box<dyn NodeBehavior>> {
        self.nodes.get_mut(&node_id)?.behavior.take()
    }

    pub(crate) fn restore_behavior(&mut self, node_id: NodeId, behavior: Box<dyn NodeBehavior>) {
        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.behavior = Some(behavior);
        }
    }
}

/// Error from a structural graph operation
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Node not found
    #[error("Node not found: {0}")]
    UnknownNode(NodeId),

    /// Pin not found
    #[error("Pin not found: {0}")]
    UnknownPin(PinId),

    /// Property not found
    #[error("Property not found: {0}")]
    UnknownProperty(PropertyId),

    /// No node type registered under this ID
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    /// Pins cannot be linked
    #[error("Incompatible pins: {0} and {1}")]
    IncompatiblePins(PinId, PinId),

    /// Node has no property binding
    #[error("Node cannot be bound to a property: {0}")]
    NotBindable(NodeId),

    /// Node is in the middle of evaluating
    #[error("Node is being evaluated: {0}")]
    NodeBusy(NodeId),

    /// Value of the wrong kind
    #[error(transparent)]
    Value(#[from] ValueError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{float_pure, flow_step, test_graph, Journal};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn output(graph: &Graph, node: NodeId) -> PinId {
        graph.value_pin(node, PinDirection::Output, 0).unwrap()
    }

    fn input(graph: &Graph, node: NodeId) -> PinId {
        graph.value_pin(node, PinDirection::Input, 0).unwrap()
    }

    #[test]
    fn test_ids_are_monotonic_and_shared() {
        let mut graph = test_graph();
        let journal = Journal::default();
        let a = graph.add_node(flow_step(&journal));
        let b = graph.add_node(flow_step(&journal));
        let mut seen: Vec<u64> = graph.nodes().map(|n| n.id.0).collect();
        seen.extend(graph.pins().map(|p| p.id.0));
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), graph.node_count() + graph.pin_count());
        assert!(b.0 > a.0);

        graph.delete_node(b);
        let c = graph.add_node(flow_step(&journal));
        assert!(c.0 > b.0);
        assert!(graph.allocate_id() > c.0);
    }

    #[test]
    fn test_new_link_replaces_input_link() {
        let mut graph = test_graph();
        let first = graph.add_node(float_pure(1.0));
        let second = graph.add_node(float_pure(2.0));
        let consumer = graph.add_node(float_pure(0.0));
        let target = input(&graph, consumer);

        let old = graph.create_link(output(&graph, first), target).unwrap();
        let new = graph.create_link(target, output(&graph, second)).unwrap();

        assert_eq!(graph.pin(target).unwrap().links(), &[new]);
        assert!(graph.link(old).is_none());
        assert!(!graph.pin(output(&graph, first)).unwrap().is_connected());
        assert_eq!(graph.source_pin(target), Some(output(&graph, second)));
    }

    #[test]
    fn test_outputs_fan_out() {
        let mut graph = test_graph();
        let source = graph.add_node(float_pure(1.0));
        let a = graph.add_node(float_pure(0.0));
        let b = graph.add_node(float_pure(0.0));
        let out = output(&graph, source);

        graph.create_link(out, input(&graph, a)).unwrap();
        graph.create_link(out, input(&graph, b)).unwrap();
        assert_eq!(graph.pin(out).unwrap().links().len(), 2);
        assert_eq!(graph.link_count(), 2);
    }

    #[test]
    fn test_incompatible_link_is_rejected_without_mutation() {
        let mut graph = test_graph();
        let journal = Journal::default();
        let step = graph.add_node(flow_step(&journal));
        let pure = graph.add_node(float_pure(1.0));
        let flow_out = graph.flow_pin(step, PinDirection::Output).unwrap();

        let err = graph.create_link(flow_out, input(&graph, pure)).unwrap_err();
        assert!(matches!(err, GraphError::IncompatiblePins(..)));
        let err = graph.create_link(output(&graph, pure), output(&graph, pure)).unwrap_err();
        assert!(matches!(err, GraphError::IncompatiblePins(..)));
        assert_eq!(graph.link_count(), 0);
        assert!(matches!(
            graph.create_link(PinId(999), flow_out),
            Err(GraphError::UnknownPin(PinId(999)))
        ));
    }

    #[test]
    fn test_delete_node_cascades() {
        let mut graph = test_graph();
        let source = graph.add_node(float_pure(1.0));
        let middle = graph.add_node(float_pure(0.0));
        let sink = graph.add_node(float_pure(0.0));
        graph.create_link(output(&graph, source), input(&graph, middle)).unwrap();
        graph.create_link(output(&graph, middle), input(&graph, sink)).unwrap();
        let middle_pins: Vec<PinId> = graph.node(middle).unwrap().pins().collect();

        assert!(graph.delete_node(middle));
        assert!(graph.node(middle).is_none());
        assert_eq!(graph.link_count(), 0);
        assert!(middle_pins.iter().all(|p| graph.pin(*p).is_none()));
        assert!(graph.pins().all(|p| p.node() != middle && p.links().is_empty()));

        assert!(!graph.delete_node(middle));
        assert!(!graph.delete_pin(middle_pins[0]));
        assert!(!graph.delete_link(LinkId(12345)));
    }

    #[test]
    fn test_delete_pin_detaches_from_node() {
        let mut graph = test_graph();
        let source = graph.add_node(float_pure(1.0));
        let sink = graph.add_node(float_pure(0.0));
        let target = input(&graph, sink);
        let link = graph.create_link(output(&graph, source), target).unwrap();

        assert!(graph.delete_pin(target));
        assert!(graph.link(link).is_none());
        assert!(!graph.node(sink).unwrap().inputs().contains(&target));
        assert!(!graph.pin(output(&graph, source)).unwrap().is_connected());
    }

    #[test]
    fn test_subscribers_see_entities_before_removal() {
        let mut graph = test_graph();
        let source = graph.add_node(float_pure(1.0));
        let sink = graph.add_node(float_pure(0.0));
        graph.create_link(output(&graph, source), input(&graph, sink)).unwrap();

        let log = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&log);
        let subscription = graph.subscribe(move |graph, event| {
            let still_present = match *event {
                GraphEvent::NodeDeleted(id) => graph.node(id).is_some(),
                GraphEvent::PinDeleted(id) => graph.pin(id).is_some(),
                GraphEvent::LinkDeleted(id) => graph.link(id).is_some(),
                GraphEvent::PropertyDeleted(id) | GraphEvent::PropertyModified(id) => {
                    graph.property(id).is_some()
                }
            };
            seen.borrow_mut().push((*event, still_present));
        });

        graph.delete_node(sink);
        let events = log.borrow().clone();
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0].0, GraphEvent::LinkDeleted(_)));
        assert!(matches!(events[1].0, GraphEvent::PinDeleted(_)));
        assert!(matches!(events[2].0, GraphEvent::PinDeleted(_)));
        assert_eq!(events[3].0, GraphEvent::NodeDeleted(sink));
        assert!(events.iter().all(|(_, present)| *present));

        assert!(graph.unsubscribe(subscription));
        graph.delete_node(source);
        assert_eq!(log.borrow().len(), 4);
    }

    #[test]
    fn test_subscribers_run_in_order() {
        let mut graph = test_graph();
        let order = Rc::new(RefCell::new(Vec::new()));
        for tag in ["first", "second"] {
            let order = Rc::clone(&order);
            graph.subscribe(move |_, _| order.borrow_mut().push(tag));
        }
        let node = graph.add_node(float_pure(0.0));
        let pins = graph.node(node).unwrap().pins().count();
        graph.delete_node(node);
        let expected: Vec<&str> = (0..=pins).flat_map(|_| ["first", "second"]).collect();
        assert_eq!(*order.borrow(), expected);
    }

    #[test]
    fn test_property_cascade_and_modification() {
        let mut graph = test_graph();
        let group = graph.create_property("motion", Box::new(String::new()), None).unwrap();
        let speed = graph.create_property("speed", Box::new(1.0_f32), Some(group)).unwrap();
        assert_eq!(graph.child_properties(group).collect::<Vec<_>>(), vec![speed]);
        assert_eq!(graph.find_property("speed"), Some(speed));
        assert!(matches!(
            graph.create_property("orphan", Box::new(0_i32), Some(PropertyId(999))),
            Err(GraphError::UnknownProperty(_))
        ));

        let modified = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&modified);
        graph.subscribe(move |graph, event| {
            if let GraphEvent::PropertyModified(id) = *event {
                sink.borrow_mut().push(graph.property(id).and_then(|p| p.get::<f32>().copied()));
            }
        });
        graph.set_property_value(speed, &4.0_f32).unwrap();
        assert_eq!(*modified.borrow(), vec![Some(4.0)]);
        assert!(matches!(
            graph.set_property_value(speed, &4_i32),
            Err(GraphError::Value(ValueError::TypeMismatch { .. }))
        ));

        assert!(graph.delete_property(group));
        assert_eq!(graph.property_count(), 0);
        assert!(!graph.delete_property(speed));
    }

    #[test]
    fn test_property_delete_survives_parent_cycle() {
        let mut graph = test_graph();
        let a = graph.create_property("a", Box::new(0_i32), None).unwrap();
        let b = graph.create_property("b", Box::new(0_i32), Some(a)).unwrap();
        let c = graph.create_property("c", Box::new(0_i32), Some(b)).unwrap();
        let other = graph.create_property("other", Box::new(0_i32), None).unwrap();
        graph.properties.get_mut(&a).unwrap().parent = Some(c);

        let deleted = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&deleted);
        graph.subscribe(move |_, event| {
            if let GraphEvent::PropertyDeleted(id) = *event {
                sink.borrow_mut().push(id);
            }
        });

        assert!(graph.delete_property(b));
        assert_eq!(*deleted.borrow(), vec![a, c, b]);
        assert_eq!(graph.properties().map(Property::id).collect::<Vec<_>>(), vec![other]);

        graph.properties.get_mut(&other).unwrap().parent = Some(other);
        assert!(graph.delete_property(other));
        assert_eq!(graph.property_count(), 0);
    }

    #[test]
    fn test_rebuild_keeps_self_link() {
        let mut graph = test_graph();
        let source = graph.add_node(float_pure(1.0));
        let node = graph.add_node(float_pure(2.0));
        let sink = graph.add_node(float_pure(0.0));
        graph.create_link(output(&graph, node), input(&graph, node)).unwrap();
        graph.create_link(output(&graph, node), input(&graph, sink)).unwrap();
        let old_pins: Vec<PinId> = graph.node(node).unwrap().pins().collect();

        graph.rebuild_pins(node).unwrap();
        assert_eq!(graph.link_count(), 2);
        let (out, input_pin) = (output(&graph, node), input(&graph, node));
        assert!(!old_pins.contains(&out) && !old_pins.contains(&input_pin));
        assert_eq!(graph.source_pin(input_pin), Some(out));
        assert_eq!(graph.source_pin(input(&graph, sink)), Some(out));
        assert!(!graph.pin(output(&graph, source)).unwrap().is_connected());
    }
}
