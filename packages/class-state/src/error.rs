//! Error types for binding, committing and resolving stores.

use crate::key::Key;

/// Boxed error raised by a store method body.
pub type MethodError = Box<dyn std::error::Error + Send + Sync>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A declared field holds a value that cannot live in a snapshot.
    #[error("Unsupported property type {type_name}: {class}.{field}")]
    UnsupportedPropertyType {
        type_name: &'static str,
        class: &'static str,
        field: String,
    },

    /// A snapshot-backed field was written outside of a commit method.
    #[error("Illegal mutation of {class}.{field} outside of a commit method")]
    IllegalMutation { class: &'static str, field: String },

    /// Cross-store resolution was attempted with no context entered.
    #[error("No state context found")]
    NoActiveContext,

    /// The store was disconnected from its context.
    #[error("Store {key} is disconnected from its context")]
    Disconnected { key: Key },

    /// The key is already bound to a store of another class.
    #[error("Key {key} is already bound to {class}")]
    KeyOccupied { key: Key, class: &'static str },

    #[error("{class} has no member named {member}")]
    UnknownMember { class: &'static str, member: String },

    /// A data field or getter was invoked as a method.
    #[error("{class}.{member} is not a method")]
    NotAMethod { class: &'static str, member: String },

    /// A method was called as a getter or data field.
    #[error("{class}.{member} is a method and has no value")]
    NotAValue { class: &'static str, member: String },

    /// A write targeted a name that is not a snapshot field.
    #[error("{class}.{member} is not a snapshot field")]
    NotAField { class: &'static str, member: String },

    #[error("Invalid argument {index}: {message}")]
    Argument { index: usize, message: String },

    /// Hydrated state at a key is not a record and cannot be merged.
    #[error("Hydrated state for {key} is a {found}, expected a record")]
    InvalidHydration { key: Key, found: &'static str },

    #[error(transparent)]
    Snapshot(#[from] class_state_snapshot::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An error raised by a store method body, passed through untouched.
    #[error(transparent)]
    Method(MethodError),
}

impl Error {
    /// Wrap any error raised inside a store method.
    pub fn method(error: impl Into<MethodError>) -> Self {
        Error::Method(error.into())
    }
}
