use std::fmt;

/// Failure categories a [`crate::Datatype`] can raise while validating or
/// importing a value. These map directly onto the `BadValue`/`WrongType`/
/// `RangeError` wire error kinds; the dispatcher crate folds them into its
/// own error enum at the protocol boundary.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// The value's shape does not match the datatype at all (e.g. a string
    /// where a number was expected).
    #[error("wrong type: expected {expected}, got {got}")]
    WrongType {
        /// Human-readable name of the expected shape.
        expected: String,
        /// Human-readable name of what was actually supplied.
        got: String,
    },
    /// The value has the right shape but falls outside the datatype's
    /// declared bounds.
    #[error("{value} is out of range ({bounds})")]
    RangeError {
        /// Rendered form of the offending value.
        value: String,
        /// Rendered form of the violated bound.
        bounds: String,
    },
    /// Any other validation failure (bad enum label, struct missing a
    /// mandatory member, malformed textual form, ...).
    #[error("bad value: {0}")]
    BadValue(String),
}

impl ValidationError {
    /// Category name as used by the dispatcher's wire error-kind table.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::WrongType { .. } => "WrongType",
            ValidationError::RangeError { .. } => "RangeError",
            ValidationError::BadValue(_) => "BadValue",
        }
    }
}

pub(crate) fn wrong_type(expected: impl fmt::Display, got: impl fmt::Display) -> ValidationError {
    ValidationError::WrongType {
        expected: expected.to_string(),
        got: got.to_string(),
    }
}

pub(crate) fn range_error(value: impl fmt::Display, bounds: impl fmt::Display) -> ValidationError {
    ValidationError::RangeError {
        value: value.to_string(),
        bounds: bounds.to_string(),
    }
}

pub(crate) fn bad_value(msg: impl Into<String>) -> ValidationError {
    ValidationError::BadValue(msg.into())
}
