//! The Value type - a plain-data snapshot tree.
//!
//! Interior nodes are reference counted. Cloning a `Value` is cheap and
//! shares every sub-tree; mutating through `get_mut`/`set`/`as_map_mut`
//! copies only the nodes on the path being written. Two values can be
//! compared by content (`==`) or by identity ([`Value::same`]).

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::{Error, Path};

/// A plain-data value: the only shape a snapshot may take.
///
/// # Design Notes
///
/// - There is deliberately no variant for binary data, dates or sets: every
///   snapshot must serialize to plain JSON.
/// - Uses `BTreeMap` for deterministic ordering (stable serialization).
/// - Records and sequences sit behind `Arc` so that unchanged sub-trees keep
///   their identity across commits.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    /// Ordered sequence of values.
    Array(Arc<Vec<Value>>),
    /// Record with string keys.
    Map(Arc<BTreeMap<String, Value>>),
}

impl Value {
    pub fn null() -> Self {
        Value::Null
    }

    /// Create an empty record.
    pub fn map() -> Self {
        Value::Map(Arc::new(BTreeMap::new()))
    }

    /// Create an empty sequence.
    pub fn array() -> Self {
        Value::Array(Arc::new(Vec::new()))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_map(&self) -> bool {
        matches!(self, Value::Map(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Integer(_) | Value::Float(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Map(_) => "record",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value as a float, for integers and floats alike.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Mutable access to a sequence, copying the node first if it is shared.
    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Array(items) => Some(Arc::make_mut(items)),
            _ => None,
        }
    }

    /// Mutable access to a record, copying the node first if it is shared.
    pub fn as_map_mut(&mut self) -> Option<&mut BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(Arc::make_mut(map)),
            _ => None,
        }
    }

    /// Look up a top-level field of a record.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.as_map()?.get(name)
    }

    /// Whether `self` and `other` are the same snapshot node.
    ///
    /// Records and sequences compare by pointer; scalars have no identity and
    /// compare by content (floats bit-for-bit).
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            _ => false,
        }
    }

    /// Get a reference to a nested value by path.
    ///
    /// Returns `None` if the path doesn't exist or can't be navigated
    /// (e.g., trying to index into a string).
    pub fn get(&self, path: &Path) -> Option<&Value> {
        let mut current = self;
        for component in path.iter() {
            current = match current {
                Value::Map(map) => map.get(component)?,
                Value::Array(items) => {
                    let index: usize = component.parse().ok()?;
                    items.get(index)?
                }
                _ => return None,
            };
        }
        Some(current)
    }

    /// Get a mutable reference to a nested value by path.
    ///
    /// Every node on the way down is made unique, so writes through the
    /// returned reference never leak into other holders of this tree.
    pub fn get_mut(&mut self, path: &Path) -> Option<&mut Value> {
        let mut current = self;
        for component in path.iter() {
            current = match current {
                Value::Map(map) => Arc::make_mut(map).get_mut(component)?,
                Value::Array(items) => {
                    let index: usize = component.parse().ok()?;
                    Arc::make_mut(items).get_mut(index)?
                }
                _ => return None,
            };
        }
        Some(current)
    }

    /// Set a value at a path, creating intermediate records as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the path traverses through a scalar (e.g., trying
    /// to set `name/first` when `name` is a string) or indexes past the end
    /// of a sequence.
    pub fn set(&mut self, path: &Path, value: Value) -> Result<(), Error> {
        let Some((parent, last)) = path.split_last() else {
            *self = value;
            return Ok(());
        };

        let mut current = self;
        for component in parent.iter() {
            current = match current {
                Value::Map(map) => Arc::make_mut(map)
                    .entry(component.clone())
                    .or_insert_with(Value::map),
                Value::Array(items) => {
                    let index = parse_index(component)?;
                    Arc::make_mut(items)
                        .get_mut(index)
                        .ok_or_else(|| Error::InvalidPath {
                            message: format!("array index {} out of bounds", index),
                        })?
                }
                _ => {
                    return Err(Error::InvalidPath {
                        message: format!(
                            "cannot navigate through non-container at '{}'",
                            component
                        ),
                    });
                }
            };
        }

        match current {
            Value::Map(map) => {
                Arc::make_mut(map).insert(last.to_string(), value);
                Ok(())
            }
            Value::Array(items) => {
                let index = parse_index(last)?;
                let items = Arc::make_mut(items);
                if index < items.len() {
                    items[index] = value;
                } else if index == items.len() {
                    items.push(value);
                } else {
                    return Err(Error::InvalidPath {
                        message: format!("array index {} out of bounds", index),
                    });
                }
                Ok(())
            }
            _ => Err(Error::InvalidPath {
                message: format!("cannot set child '{}' on non-container value", last),
            }),
        }
    }
}

fn parse_index(component: &str) -> Result<usize, Error> {
    component.parse().map_err(|_| Error::InvalidPath {
        message: format!("invalid array index: {}", component),
    })
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::Array(items) => serializer.collect_seq(items.iter()),
            Value::Map(map) => serializer.collect_map(map.iter()),
        }
    }
}

// Conversion from common types

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(Arc::new(v.into_iter().map(Into::into).collect()))
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::Map(Arc::new(map))
    }
}

impl FromIterator<Value> for Value {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Value::Array(Arc::new(iter.into_iter().collect()))
    }
}

impl FromIterator<(String, Value)> for Value {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Value::Map(Arc::new(iter.into_iter().collect()))
    }
}
