//! Component types for tensor values.
//!
//! The component-type registry: every element type a tensor can hold is a
//! variant of [`ComponentType`], and each variant has a row in an operation
//! table (width, load, store) so format-generic code can move values without
//! being generic over the element type.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TensorError};

/// Element type of a tensor or buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentType {
    Bool,
    Int,
    Float,
    Double,
}

/// Largest element width of any component type, in bytes.
pub const MAX_WIDTH: usize = 8;

impl ComponentType {
    /// All supported component types.
    pub const ALL: [ComponentType; 4] = [
        ComponentType::Bool,
        ComponentType::Int,
        ComponentType::Float,
        ComponentType::Double,
    ];

    /// Width of one element in bytes.
    #[inline]
    pub const fn width(self) -> usize {
        match self {
            ComponentType::Bool => std::mem::size_of::<bool>(),
            ComponentType::Int => std::mem::size_of::<i32>(),
            ComponentType::Float => std::mem::size_of::<f32>(),
            ComponentType::Double => std::mem::size_of::<f64>(),
        }
    }

    /// Alignment of one element in bytes.
    #[inline]
    pub const fn align(self) -> usize {
        match self {
            ComponentType::Bool => std::mem::align_of::<bool>(),
            ComponentType::Int => std::mem::align_of::<i32>(),
            ComponentType::Float => std::mem::align_of::<f32>(),
            ComponentType::Double => std::mem::align_of::<f64>(),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            ComponentType::Bool => "bool",
            ComponentType::Int => "int",
            ComponentType::Float => "float",
            ComponentType::Double => "double",
        }
    }

    #[inline]
    pub(crate) fn ops(self) -> &'static ComponentOps {
        &OPS[self as usize]
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An owned, type-tagged scalar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(i32),
    Float(f32),
    Double(f64),
}

impl Value {
    #[inline]
    pub fn component_type(&self) -> ComponentType {
        match self {
            Value::Bool(_) => ComponentType::Bool,
            Value::Int(_) => ComponentType::Int,
            Value::Float(_) => ComponentType::Float,
            Value::Double(_) => ComponentType::Double,
        }
    }

    /// The additive identity of a component type.
    pub fn zero(ty: ComponentType) -> Self {
        Value::from_constant(ty, 0)
    }

    /// Cast an integer constant into the given component type.
    pub fn from_constant(ty: ComponentType, constant: i32) -> Self {
        match ty {
            ComponentType::Bool => Value::Bool(constant != 0),
            ComponentType::Int => Value::Int(constant),
            ComponentType::Float => Value::Float(constant as f32),
            ComponentType::Double => Value::Double(constant as f64),
        }
    }

    pub fn is_zero(&self) -> bool {
        match *self {
            Value::Bool(v) => !v,
            Value::Int(v) => v == 0,
            Value::Float(v) => v == 0.0,
            Value::Double(v) => v == 0.0,
        }
    }

    /// Widen to `f64`; booleans map to 0 and 1.
    pub fn as_f64(&self) -> f64 {
        match *self {
            Value::Bool(v) => f64::from(u8::from(v)),
            Value::Int(v) => f64::from(v),
            Value::Float(v) => f64::from(v),
            Value::Double(v) => v,
        }
    }

    /// Sum two values of the same type. Booleans combine with logical or.
    pub fn checked_add(self, other: Value) -> Result<Value> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(a || b)),
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_add(b))),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
            (Value::Double(a), Value::Double(b)) => Ok(Value::Double(a + b)),
            (a, b) => Err(TensorError::TypeMismatch {
                expected: a.component_type(),
                actual: b.component_type(),
            }),
        }
    }

    /// Compare two values with the native ordering of their shared type.
    ///
    /// Returns `Ok(None)` only for unordered floats (NaN).
    pub fn try_cmp(&self, other: &Value) -> Result<Option<Ordering>> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Ok(a.partial_cmp(b)),
            (Value::Int(a), Value::Int(b)) => Ok(a.partial_cmp(b)),
            (Value::Float(a), Value::Float(b)) => Ok(a.partial_cmp(b)),
            (Value::Double(a), Value::Double(b)) => Ok(a.partial_cmp(b)),
            (a, b) => Err(TensorError::TypeMismatch {
                expected: a.component_type(),
                actual: b.component_type(),
            }),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
        }
    }
}

/// Trait for statically typed tensor components.
///
/// Bridges a Rust scalar type to its [`ComponentType`] tag.
pub trait Component:
    Copy + PartialOrd + fmt::Debug + fmt::Display + Default + Send + Sync + 'static
{
    /// The runtime tag for this type.
    const TYPE: ComponentType;

    fn into_value(self) -> Value;

    /// Returns `None` if `value` holds a different component type.
    fn from_value(value: Value) -> Option<Self>;
}

macro_rules! impl_component {
    ($t:ty, $variant:ident) => {
        impl Component for $t {
            const TYPE: ComponentType = ComponentType::$variant;

            #[inline]
            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            #[inline]
            fn from_value(value: Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }

        impl From<$t> for Value {
            fn from(v: $t) -> Value {
                Value::$variant(v)
            }
        }
    };
}

impl_component!(bool, Bool);
impl_component!(i32, Int);
impl_component!(f32, Float);
impl_component!(f64, Double);

/// Per-type primitive operations over raw element slots.
pub(crate) struct ComponentOps {
    /// Read one element.
    pub(crate) load: unsafe fn(*const u8) -> Value,
    /// Write one element; the value must already have the slot's type.
    pub(crate) store: unsafe fn(*mut u8, Value),
}

unsafe fn load<T: Component>(ptr: *const u8) -> Value {
    unsafe { ptr.cast::<T>().read_unaligned() }.into_value()
}

unsafe fn store<T: Component>(ptr: *mut u8, value: Value) {
    if let Some(v) = T::from_value(value) {
        unsafe { ptr.cast::<T>().write_unaligned(v) }
    }
}

// Indexed by `ComponentType as usize`.
static OPS: [ComponentOps; 4] = [
    ComponentOps {
        load: load::<bool>,
        store: store::<bool>,
    },
    ComponentOps {
        load: load::<i32>,
        store: store::<i32>,
    },
    ComponentOps {
        load: load::<f32>,
        store: store::<f32>,
    },
    ComponentOps {
        load: load::<f64>,
        store: store::<f64>,
    },
];
