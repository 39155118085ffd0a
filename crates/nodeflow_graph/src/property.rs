// SPDX-License-Identifier: MIT OR Apache-2.0
//! Named values that live outside any single node.

use crate::value::{PinValue, ValueKind, ValueType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertyId(pub u64);

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "property#{}", self.0)
    }
}

/// A named, typed value owned by the graph.
///
/// Properties are read and written from inside the graph through variable
/// nodes. A property may be grouped under a parent property.
#[derive(Debug)]
pub struct Property {
    pub(crate) id: PropertyId,
    pub(crate) name: String,
    pub(crate) value: Box<dyn PinValue>,
    pub(crate) parent: Option<PropertyId>,
}

impl Property {
    pub(crate) fn new(
        id: PropertyId,
        name: String,
        value: Box<dyn PinValue>,
        parent: Option<PropertyId>,
    ) -> Self {
        Self {
            id,
            name,
            value,
            parent,
        }
    }

    /// Unique property ID
    pub fn id(&self) -> PropertyId {
        self.id
    }

    /// Property name
    pub fn name(&self) -> &str {
        &self.name
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

    /// Parent property, for grouping
    pub fn parent(&self) -> Option<PropertyId> {
        self.parent
    }
}
