// SPDX-License-Identifier: MIT OR Apache-2.0
//! Registry of node types and value kinds.
//!
//! A registry is built once and shared by every graph created from it, so
//! independent graphs (and tests) never touch global state.

use crate::node::{NodeBehavior, NodeCategory, NodeType};
use crate::value::{default_value, Flow, PinValue, TextureHandle, ValueFactory, ValueKind, ValueType};
use indexmap::IndexMap;

/// Registry of available node types and value kinds
#[derive(Debug, Clone)]
pub struct Registry {
    /// Registered node types by ID
    types: IndexMap<String, NodeType>,
    /// Registered value kinds by signature
    values: IndexMap<ValueType, ValueFactory>,
}

impl Registry {
    /// Create a registry holding the core value kinds and no node types
    pub fn new() -> Self {
        let mut registry = Self {
            types: IndexMap::new(),
            values: IndexMap::new(),
        };
        registry.register_value_kind::<Flow>();
        registry.register_value_kind::<f32>();
        registry.register_value_kind::<[f32; 2]>();
        registry.register_value_kind::<[f32; 3]>();
        registry.register_value_kind::<[f32; 4]>();
        registry.register_value_kind::<i32>();
        registry.register_value_kind::<bool>();
        registry.register_value_kind::<String>();
        registry.register_value_kind::<TextureHandle>();
        registry
    }

    /// Register a node type
    pub fn register(&mut self, node_type: NodeType) {
        self.types.insert(node_type.id.clone(), node_type);
    }

    /// Register a value kind so it can be restored from documents
    pub fn register_value_kind<T: ValueKind>(&mut self) {
        self.values.insert(T::signature(), default_value::<T>);
    }

    /// Get a node type by ID
    pub fn get(&self, id: &str) -> Option<&NodeType> {
        self.types.get(id)
    }

    /// Get all registered types
    pub fn types(&self) -> impl Iterator<Item = &NodeType> {
        self.types.values()
    }

    /// Get types by category
    pub fn types_in_category(&self, category: NodeCategory) -> impl Iterator<Item = &NodeType> {
        self.types.values().filter(move |t| t.category == category)
    }

    /// Build a behavior from a type ID
    pub fn create_behavior(&self, type_id: &str) -> Option<Box<dyn NodeBehavior>> {
        self.get(type_id).map(|t| (t.factory)())
    }

    /// Build a default value from a persisted tag/size pair
    pub fn create_value(&self, tag: &str, size: usize) -> Option<Box<dyn PinValue>> {
        self.values
            .iter()
            .find(|(signature, _)| signature.matches(tag, size))
            .map(|(_, factory)| factory())
    }

    /// Get all registered value kinds
    pub fn value_kinds(&self) -> impl Iterator<Item = ValueType> + '_ {
        self.values.keys().copied()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
