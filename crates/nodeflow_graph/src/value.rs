// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed values carried by pins and properties.
//!
//! Every pin and property owns a boxed [`PinValue`]. The trait is implemented
//! for any type that implements [`ValueKind`], so adding a new kind of value
//! only requires a `ValueKind` impl and a registration in the
//! [`Registry`](crate::Registry).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;

/// Type signature of a value: concrete type tag plus value size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueType {
    /// Concrete type tag
    pub tag: &'static str,
    /// Number of components (0 for flow)
    pub size: usize,
}

impl ValueType {
    /// Create a new value type signature
    pub const fn new(tag: &'static str, size: usize) -> Self {
        Self { tag, size }
    }

    /// Whether this is the execution flow type
    pub fn is_flow(&self) -> bool {
        self.tag == Flow::TAG
    }

    /// Check whether this signature matches a persisted tag/size pair
    pub fn matches(&self, tag: &str, size: usize) -> bool {
        self.tag == tag && self.size == size
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.size <= 1 {
            write!(f, "{}", self.tag)
        } else {
            write!(f, "{}{}", self.tag, self.size)
        }
    }
}

/// Error raised by value operations
#[derive(Debug, thiserror::Error)]
pub enum ValueError {
    /// The two values have different concrete types
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Type of the destination
        expected: ValueType,
        /// Type of the source
        found: ValueType,
    },

    /// Value could not be converted to or from its document form
    #[error("Invalid {value_type} value: {source}")]
    Codec {
        /// Type being converted
        value_type: ValueType,
        /// Underlying serde error
        #[source]
        source: serde_json::Error,
    },
}

/// A concrete value type that can live in a pin or property.
///
/// Implementing this trait is all that is needed for a type to become a
/// [`PinValue`].
pub trait ValueKind: Clone + fmt::Debug + Default + Serialize + DeserializeOwned + 'static {
    /// Type tag used for compatibility checks and persistence
    const TAG: &'static str;
    /// Number of components
    const SIZE: usize = 1;
    /// Whether values of this kind only sequence execution
    const FLOW: bool = false;

    /// Signature of this kind
    fn signature() -> ValueType {
        ValueType::new(Self::TAG, Self::SIZE)
    }
}

/// Type-erased value capability shared by all value kinds
pub trait PinValue: fmt::Debug + 'static {
    /// Type signature of this value
    fn value_type(&self) -> ValueType;

    /// Whether this value is an execution flow marker
    fn is_flow(&self) -> bool;

    /// Access as `Any` for downcasting
    fn as_any(&self) -> &dyn Any;

    /// Mutable access as `Any` for downcasting
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Clone into a new box
    fn clone_value(&self) -> Box<dyn PinValue>;

    /// Copy the concrete value of `source` into `self`
    fn copy_from(&mut self, source: &dyn PinValue) -> Result<(), ValueError>;

    /// Convert to a document value
    fn to_json(&self) -> Result<serde_json::Value, ValueError>;

    /// Replace this value from a document value
    fn load_json(&mut self, value: &serde_json::Value) -> Result<(), ValueError>;
}

impl<T: ValueKind> PinValue for T {
    fn value_type(&self) -> ValueType {
        T::signature()
    }

    fn is_flow(&self) -> bool {
        T::FLOW
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn clone_value(&self) -> Box<dyn PinValue> {
        Box::new(self.clone())
    }

    fn copy_from(&mut self, source: &dyn PinValue) -> Result<(), ValueError> {
        match source.as_any().downcast_ref::<T>() {
            Some(value) => {
                self.clone_from(value);
                Ok(())
            }
            None => Err(ValueError::TypeMismatch {
                expected: T::signature(),
                found: source.value_type(),
            }),
        }
    }

    fn to_json(&self) -> Result<serde_json::Value, ValueError> {
        serde_json::to_value(self).map_err(|source| ValueError::Codec {
            value_type: T::signature(),
            source,
        })
    }

    fn load_json(&mut self, value: &serde_json::Value) -> Result<(), ValueError> {
        *self = T::deserialize(value).map_err(|source| ValueError::Codec {
            value_type: T::signature(),
            source,
        })?;
        Ok(())
    }
}

impl dyn PinValue {
    /// Downcast to a concrete value kind
    pub fn downcast_ref<T: ValueKind>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Mutably downcast to a concrete value kind
    pub fn downcast_mut<T: ValueKind>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }
}

/// Execution flow marker; carries no data
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flow;

impl ValueKind for Flow {
    const TAG: &'static str = "flow";
    const SIZE: usize = 0;
    const FLOW: bool = true;
}

/// Opaque handle to a texture owned outside the engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextureHandle(pub u64);

impl ValueKind for TextureHandle {
    const TAG: &'static str = "texture";
}

impl ValueKind for f32 {
    const TAG: &'static str = "float";
}

impl ValueKind for [f32; 2] {
    const TAG: &'static str = "float";
    const SIZE: usize = 2;
}

impl ValueKind for [f32; 3] {
    const TAG: &'static str = "float";
    const SIZE: usize = 3;
}

impl ValueKind for [f32; 4] {
    const TAG: &'static str = "float";
    const SIZE: usize = 4;
}

impl ValueKind for i32 {
    const TAG: &'static str = "int";
}

impl ValueKind for bool {
    const TAG: &'static str = "bool";
}

impl ValueKind for String {
    const TAG: &'static str = "string";
}

/// Constructor for a default value of some kind
pub type ValueFactory = fn() -> Box<dyn PinValue>;

/// Build a boxed default value of kind `T`
pub fn default_value<T: ValueKind>() -> Box<dyn PinValue> {
    Box::new(T::default())
}
