//! Runtime value tree exchanged with the codec.
//!
//! The wire format addresses composite fields positionally, so an object
//! crosses the codec boundary as a flat, ordered value list rather than as
//! a concrete typed struct. Typed reconstruction happens one layer up, in
//! [`crate::protocol::messages`], using the same schema to know field
//! order; the codec itself never learns concrete types.

use uuid::Uuid;

/// One node in the flat value tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// An unfilled slot. Appears while decoding, or when the peer's schema
    /// version did not carry a field our schema declares.
    Null,
    /// Unsigned numeric leaf; widths 1/2/4/8 on the wire all map here.
    UInt(u64),
    /// UTF-8 string leaf.
    Str(String),
    /// A container's items, in wire order.
    Seq(Vec<Value>),
    /// A nested composite's flat slot list.
    Fields(Vec<Value>),
}

impl Value {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::Seq(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_fields(&self) -> Option<&[Value]> {
        match self {
            Value::Fields(slots) => Some(slots),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::UInt(u64::from(v))
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::UInt(u64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::UInt(u64::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

/// A root object at the codec boundary: the class uuid plus the flat,
/// ordered value list covering the whole inheritance chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetObject {
    pub class_uuid: Uuid,
    pub values: Vec<Value>,
}

impl NetObject {
    pub fn new(class_uuid: Uuid, values: Vec<Value>) -> Self {
        Self { class_uuid, values }
    }

    /// Slot accessor used by typed message conversion.
    pub fn slot(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }
}
