//! Runtime error type.

use crate::value::{Value, ValueType};
use std::sync::Arc;
use thiserror::Error;

/// Result alias for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors raised while executing script code.
///
/// `Thrown` carries a script-level value; the other variants are the errors
/// the object model raises on its own behalf.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    /// A `throw` statement propagated out of the invocation.
    #[error("uncaught exception: {0}")]
    Thrown(Value),

    /// Operation applied to a value of the wrong kind.
    #[error("TypeError: {0}")]
    Type(String),

    /// Read of a name that exists in no enclosing binding or on the global object.
    #[error("ReferenceError: {0} is not defined")]
    Reference(Arc<str>),

    /// A speculative guard failed while deoptimization is disabled.
    #[error("speculation failed at site {site}: expected {expected}, found {observed}")]
    SpeculationFailed {
        site: u32,
        expected: ValueType,
        observed: ValueType,
    },
}

impl RuntimeError {
    /// Build a type error from anything displayable.
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::Type(message.into())
    }

    /// The script value this error would surface as, if it were caught.
    pub fn into_value(self) -> Value {
        match self {
            Self::Thrown(value) => value,
            other => Value::String(Arc::from(other.to_string())),
        }
    }
}
