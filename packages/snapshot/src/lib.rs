//! Snapshot layer for class-state.
//!
//! Everything a store persists is a [`Value`]: a plain-data tree of records,
//! sequences, booleans, numbers, strings and null. This crate provides:
//! - `Value`: the tree, with reference-counted interior nodes
//! - `Path`: validated field paths for nested reads and writes
//! - `Producer`: the copy-on-write primitive commits are built on, with the
//!   default [`StructuralSharing`] implementation
//! - serde conversions between `Value` and typed data
//!
//! # Example
//!
//! ```rust
//! use class_state_snapshot::{path, produce, Value};
//!
//! let base: Value = serde_json::from_str(r#"{"data":{"name":"","age":18}}"#).unwrap();
//! let next = produce(&base, |draft| {
//!     draft.set(&path!("data/name"), Value::from("jack")).unwrap();
//! });
//!
//! assert_eq!(next.get(&path!("data/name")), Some(&Value::from("jack")));
//! assert_eq!(base.get(&path!("data/name")), Some(&Value::from("")));
//! ```

mod convert;
mod error;
mod path;
mod produce;
mod value;

pub use convert::{from_value, json_to_value, value_to_json};
pub use error::Error;
pub use path::{Path, PathError};
pub use produce::{produce, try_produce, Producer, StructuralSharing};
pub use value::Value;
