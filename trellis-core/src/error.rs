//! Error types.
//!
//! Only contract violations are errors. A write through a read-only wrapper
//! is not: it is logged and reported as a success, the same way a container
//! interface expecting a success flag would see it.

use thiserror::Error;

use crate::value::Shape;

/// Alias for results produced by this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised at the API boundary.
#[derive(Debug, Error)]
pub enum Error {
    /// Only objects can be wrapped.
    #[error("cannot wrap a non-object value of kind `{kind}`")]
    NotAnObject { kind: &'static str },

    /// The operation is not defined for this container shape.
    #[error("operation `{op}` is not supported on a {shape} container")]
    Unsupported { op: &'static str, shape: Shape },

    /// The key cannot address this container shape.
    #[error("key `{key}` is not valid for a {shape} container")]
    InvalidKey { key: String, shape: Shape },

    /// A list length must be a non-negative integer.
    #[error("invalid list length `{value}`")]
    InvalidLength { value: String },

    /// A prototype chain would loop back to the record.
    #[error("cyclic prototype chain")]
    CyclicPrototype,

    /// Typed access to an object of a different shape.
    #[error("expected a {expected} container, found a {found}")]
    ShapeMismatch { expected: Shape, found: Shape },

    /// A configuration document could not be parsed.
    #[error("invalid runtime configuration: {0}")]
    Config(#[from] serde_json::Error),
}
