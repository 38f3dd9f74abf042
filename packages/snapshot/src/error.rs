//! Error types for snapshot operations.

use crate::path::PathError;

/// Errors raised while navigating, editing or converting snapshot trees.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("path error: {0}")]
    Path(#[from] PathError),

    /// A path could not be followed through the tree.
    #[error("invalid path: {message}")]
    InvalidPath { message: String },

    /// A snapshot value could not be converted into the requested type.
    #[error("decode error: {message}")]
    Decode { message: String },
}

impl Error {
    pub fn decode(message: impl Into<String>) -> Self {
        Error::Decode {
            message: message.into(),
        }
    }
}
