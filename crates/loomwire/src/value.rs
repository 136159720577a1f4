//! # Dynamic Values
//!
//! The datum type that crosses channel boundaries: worker data, invocation
//! arguments, results, and rejection reasons are all `Value` trees.
//!
//! Every variant except `Port` is plain copyable data. A `Port` is the one
//! transfer-eligible resource; it moves, never copies (see `sendable`).

use std::collections::BTreeMap;

use crate::port::Port;

/// A dynamically typed value.
#[derive(Debug)]
pub enum Value {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// A transferable channel endpoint.
    Port(Port),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Takes the port out of a `Port` value.
    pub fn into_port(self) -> Option<Port> {
        match self {
            Self::Port(port) => Some(port),
            _ => None,
        }
    }

    /// Deep-copies plain data. `None` if the value contains a port;
    /// endpoints move, they are never duplicated.
    pub fn try_clone(&self) -> Option<Value> {
        match self {
            Self::Unit => Some(Self::Unit),
            Self::Bool(b) => Some(Self::Bool(*b)),
            Self::Int(n) => Some(Self::Int(*n)),
            Self::Float(x) => Some(Self::Float(*x)),
            Self::Text(s) => Some(Self::Text(s.clone())),
            Self::Bytes(bytes) => Some(Self::Bytes(bytes.clone())),
            Self::List(items) => items
                .iter()
                .map(Value::try_clone)
                .collect::<Option<Vec<_>>>()
                .map(Self::List),
            Self::Map(entries) => entries
                .iter()
                .map(|(key, entry)| entry.try_clone().map(|copy| (key.clone(), copy)))
                .collect::<Option<BTreeMap<_, _>>>()
                .map(Self::Map),
            Self::Port(_) => None,
        }
    }
}

/// Ports compare by token; everything else compares structurally.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Unit, Self::Unit) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::Port(a), Self::Port(b)) => a.token() == b.token(),
            _ => false,
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Self::Unit
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(entries: BTreeMap<String, Value>) -> Self {
        Self::Map(entries)
    }
}

impl From<Port> for Value {
    fn from(port: Port) -> Self {
        Self::Port(port)
    }
}
