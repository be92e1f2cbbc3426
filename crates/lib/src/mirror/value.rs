//! Value type stored in mirror nodes.
//!
//! `Value` covers everything a mirror slot can hold: leaf values that map
//! one-to-one onto [`yrs::Any`] primitives, and handles to nested
//! [`MapNode`]/[`ListNode`] structures. `Undefined` is representable so that
//! host data carrying it can be rejected explicitly instead of being coerced.

use std::{collections::HashMap, fmt, sync::Arc};

use yrs::Any;

use super::{ListNode, MapNode, MirrorError};

/// A value held by a mirror node.
///
/// Leaf values compare by value; nested nodes compare by identity, so two
/// structurally equal but distinct maps are not equal:
///
/// ```
/// # use ymirror::mirror::{MapNode, Value};
/// let a = Value::from(MapNode::new());
/// let b = Value::from(MapNode::new());
/// assert_ne!(a, b);
/// assert_eq!(a, a.clone());
/// assert_eq!(Value::from("x"), "x");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent value. Never storable.
    Undefined,
    /// Explicit null
    Null,
    /// Boolean value
    Bool(bool),
    /// Floating point number (the default numeric representation)
    Number(f64),
    /// 64-bit integer
    BigInt(i64),
    /// UTF-8 string
    String(Arc<str>),
    /// Binary blob
    Buffer(Arc<[u8]>),
    /// Nested keyed structure
    Map(MapNode),
    /// Nested ordered structure
    List(ListNode),
}

impl Value {
    /// Returns true for `Undefined`
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Returns true for `Null`
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns true if this value is a nested node
    pub fn is_node(&self) -> bool {
        matches!(self, Value::Map(_) | Value::List(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric view of `Number` and `BigInt` values
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::BigInt(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&MapNode> {
        match self {
            Value::Map(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&ListNode> {
        match self {
            Value::List(node) => Some(node),
            _ => None,
        }
    }

    /// Human readable name of the variant, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::BigInt(_) => "bigint",
            Value::String(_) => "string",
            Value::Buffer(_) => "buffer",
            Value::Map(_) => "map",
            Value::List(_) => "list",
        }
    }

    /// Checks that this value, and everything nested inside it, can be
    /// stored in the shared document.
    ///
    /// `path` names the slot the value is about to be written to and is
    /// reported back in the error.
    pub fn ensure_storable(&self, path: &str) -> Result<(), MirrorError> {
        match self {
            Value::Undefined => Err(MirrorError::UndefinedNotAllowed {
                path: path.to_string(),
            }),
            Value::Map(node) => node
                .entries()
                .iter()
                .try_for_each(|(key, value)| value.ensure_storable(&join(path, key))),
            Value::List(node) => node
                .items()
                .iter()
                .enumerate()
                .try_for_each(|(i, value)| value.ensure_storable(&join(path, &i.to_string()))),
            _ => Ok(()),
        }
    }

    /// Converts a leaf value into its document representation.
    ///
    /// Returns `None` for nested nodes, which are written as containers.
    pub(crate) fn leaf_any(&self) -> Option<Any> {
        match self {
            Value::Undefined => Some(Any::Undefined),
            Value::Null => Some(Any::Null),
            Value::Bool(b) => Some(Any::Bool(*b)),
            Value::Number(n) => Some(Any::Number(*n)),
            Value::BigInt(n) => Some(Any::BigInt(*n)),
            Value::String(s) => Some(Any::String(s.clone())),
            Value::Buffer(b) => Some(Any::Buffer(b.clone())),
            Value::Map(_) | Value::List(_) => None,
        }
    }

    /// Deep plain representation of this value.
    pub fn to_any(&self) -> Any {
        match self {
            Value::Map(node) => node.to_any(),
            Value::List(node) => node.to_any(),
            leaf => leaf.leaf_any().unwrap_or(Any::Null),
        }
    }

    /// Deep JSON representation of this value.
    ///
    /// `Undefined` becomes `null`, buffers become arrays of bytes, and
    /// integral numbers are emitted as JSON integers.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Undefined | Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::BigInt(n) => serde_json::Value::from(*n),
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::Buffer(b) => serde_json::Value::from(b.to_vec()),
            Value::Map(node) => node.to_json(),
            Value::List(node) => node.to_json(),
        }
    }

    /// Copies this value into fresh, detached nodes.
    pub fn deep_copy(&self) -> Value {
        match self {
            Value::Map(node) => Value::Map(
                node.entries()
                    .into_iter()
                    .map(|(key, value)| (key, value.deep_copy()))
                    .collect(),
            ),
            Value::List(node) => {
                Value::List(node.items().iter().map(Value::deep_copy).collect())
            }
            leaf => leaf.clone(),
        }
    }

    /// Returns true if `node` is this value or is nested anywhere inside it.
    pub(crate) fn contains_node(&self, node: super::NodeId) -> bool {
        match self {
            Value::Map(map) => {
                map.id() == node || map.entries().iter().any(|(_, v)| v.contains_node(node))
            }
            Value::List(list) => {
                list.id() == node || list.items().iter().any(|v| v.contains_node(node))
            }
            _ => false,
        }
    }
}

fn join(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{path}.{segment}")
    }
}

const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

fn number_to_json(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<Any> for Value {
    fn from(any: Any) -> Self {
        match any {
            Any::Undefined => Value::Undefined,
            Any::Null => Value::Null,
            Any::Bool(b) => Value::Bool(b),
            Any::Number(n) => Value::Number(n),
            Any::BigInt(n) => Value::BigInt(n),
            Any::String(s) => Value::String(s),
            Any::Buffer(b) => Value::Buffer(b),
            Any::Array(items) => {
                Value::List(items.iter().cloned().map(Value::from).collect())
            }
            Any::Map(entries) => Value::Map(
                entries
                    .iter()
                    .map(|(key, value)| (key.as_str(), Value::from(value.clone())))
                    .collect(),
            ),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or_default()),
            serde_json::Value::String(s) => Value::String(s.into()),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(entries) => Value::Map(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<MapNode> for Value {
    fn from(node: MapNode) -> Self {
        Value::Map(node)
    }
}

impl From<ListNode> for Value {
    fn from(node: ListNode) -> Self {
        Value::List(node)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::BigInt(n)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    /// `None` maps to `Null`, never to `Undefined`.
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl PartialEq<&str> for Value {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == Some(*other)
    }
}

impl PartialEq<f64> for Value {
    fn eq(&self, other: &f64) -> bool {
        self.as_f64() == Some(*other)
    }
}

impl PartialEq<bool> for Value {
    fn eq(&self, other: &bool) -> bool {
        self.as_bool() == Some(*other)
    }
}

/// Builds a plain `Any::Map` from mirror entries.
pub(crate) fn any_map<'a>(entries: impl Iterator<Item = (&'a Arc<str>, &'a Value)>) -> Any {
    let map: HashMap<String, Any> = entries
        .map(|(key, value)| (key.to_string(), value.to_any()))
        .collect();
    Any::Map(Arc::new(map))
}
