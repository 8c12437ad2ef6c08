use thiserror::Error;

use super::DataType;

/// Failure modes of coercing a [`Value`](super::Value) to a requested
/// [`DataType`].
///
/// [`MissingValue`](CoercionError::MissingValue) is kept distinct from
/// [`Invalid`](CoercionError::Invalid) so callers can tell "there was no
/// data here" from "the data was there but shaped wrong" — the rule engine
/// maps the former to an outcome status of `missing` and the latter to
/// `fail`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CoercionError {
    #[error("expected a value of type {expected:?}, but found Null")]
    MissingValue { expected: DataType },

    #[error("cannot coerce {found} to {expected:?}: {reason}")]
    Invalid {
        found: &'static str,
        expected: DataType,
        reason: String,
    },
}

impl CoercionError {
    pub fn invalid(found: &'static str, expected: DataType, reason: impl Into<String>) -> Self {
        Self::Invalid {
            found,
            expected,
            reason: reason.into(),
        }
    }
}
