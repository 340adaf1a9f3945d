//! Validation for catalog payloads.
//!
//! Payloads arrive as JSON objects. Every reader here rejects wrong types
//! instead of coercing them, and treats `null` as "not provided".

use serde_json::{Map, Value};
use std::fmt;

/// Validation error types
#[derive(Debug, PartialEq)]
pub enum ValidationError {
    NotAnObject,
    MissingField {
        field: &'static str,
    },
    EmptyField {
        field: &'static str,
    },
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
    NonPositiveValue {
        field: &'static str,
        value: f64,
    },
    NegativeValue {
        field: &'static str,
        value: i64,
    },
    OutOfRange {
        field: &'static str,
    },
    UnknownField {
        field: String,
    },
    ImmutableField {
        field: &'static str,
    },
    EmptyUpdate,
    InvalidFilter {
        key: String,
        value: String,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::NotAnObject => write!(f, "Payload must be a JSON object"),
            ValidationError::MissingField { field } => {
                write!(f, "Field '{}' is required", field)
            }
            ValidationError::EmptyField { field } => {
                write!(f, "Field '{}' is required but was empty", field)
            }
            ValidationError::WrongType { field, expected } => {
                write!(f, "Field '{}' must be {}", field, expected)
            }
            ValidationError::NonPositiveValue { field, value } => {
                write!(f, "Field '{}' must be positive, got {}", field, value)
            }
            ValidationError::NegativeValue { field, value } => {
                write!(f, "Field '{}' must be non-negative, got {}", field, value)
            }
            ValidationError::OutOfRange { field } => {
                write!(f, "Field '{}' is out of range", field)
            }
            ValidationError::UnknownField { field } => {
                write!(f, "Field '{}' is not accepted here", field)
            }
            ValidationError::ImmutableField { field } => {
                write!(f, "Field '{}' cannot be changed", field)
            }
            ValidationError::EmptyUpdate => write!(f, "Update contains no fields"),
            ValidationError::InvalidFilter { key, value } => {
                write!(f, "Invalid value '{}' for filter '{}'", value, key)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Result type for validation operations
pub type ValidationResult<T> = Result<T, ValidationError>;

pub fn as_object(payload: &Value) -> ValidationResult<&Map<String, Value>> {
    payload.as_object().ok_or(ValidationError::NotAnObject)
}

/// Fails on the first key not in `allowed`. Keys in `immutable` get their
/// own error so callers learn the field exists but cannot be patched.
pub fn reject_unknown(
    object: &Map<String, Value>,
    allowed: &[&'static str],
    immutable: &[&'static str],
) -> ValidationResult<()> {
    for key in object.keys() {
        if let Some(field) = immutable.iter().find(|f| **f == key.as_str()) {
            return Err(ValidationError::ImmutableField { field: *field });
        }
        if !allowed.contains(&key.as_str()) {
            return Err(ValidationError::UnknownField { field: key.clone() });
        }
    }
    Ok(())
}

fn present<'a>(object: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    object.get(field).filter(|v| !v.is_null())
}

fn required<T>(
    field: &'static str,
    value: ValidationResult<Option<T>>,
) -> ValidationResult<T> {
    value?.ok_or(ValidationError::MissingField { field })
}

/// A trimmed, non-empty string.
pub fn optional_string(
    object: &Map<String, Value>,
    field: &'static str,
) -> ValidationResult<Option<String>> {
    let Some(value) = present(object, field) else {
        return Ok(None);
    };
    let s = value.as_str().ok_or(ValidationError::WrongType {
        field,
        expected: "a string",
    })?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField { field });
    }
    Ok(Some(trimmed.to_string()))
}

pub fn required_string(object: &Map<String, Value>, field: &'static str) -> ValidationResult<String> {
    required(field, optional_string(object, field))
}

pub fn optional_u32(
    object: &Map<String, Value>,
    field: &'static str,
) -> ValidationResult<Option<u32>> {
    let Some(value) = present(object, field) else {
        return Ok(None);
    };
    let n = value.as_i64().ok_or(ValidationError::WrongType {
        field,
        expected: "an integer",
    })?;
    if n < 0 {
        return Err(ValidationError::NegativeValue { field, value: n });
    }
    u32::try_from(n)
        .map(Some)
        .map_err(|_| ValidationError::OutOfRange { field })
}

pub fn required_u32(object: &Map<String, Value>, field: &'static str) -> ValidationResult<u32> {
    required(field, optional_u32(object, field))
}

pub fn optional_i32(
    object: &Map<String, Value>,
    field: &'static str,
) -> ValidationResult<Option<i32>> {
    let Some(value) = present(object, field) else {
        return Ok(None);
    };
    let n = value.as_i64().ok_or(ValidationError::WrongType {
        field,
        expected: "an integer",
    })?;
    i32::try_from(n)
        .map(Some)
        .map_err(|_| ValidationError::OutOfRange { field })
}

pub fn required_i32(object: &Map<String, Value>, field: &'static str) -> ValidationResult<i32> {
    required(field, optional_i32(object, field))
}

/// A finite number greater than zero.
pub fn optional_positive(
    object: &Map<String, Value>,
    field: &'static str,
) -> ValidationResult<Option<f64>> {
    let Some(value) = present(object, field) else {
        return Ok(None);
    };
    let n = value
        .as_f64()
        .filter(|n| n.is_finite())
        .ok_or(ValidationError::WrongType {
            field,
            expected: "a number",
        })?;
    if n <= 0.0 {
        return Err(ValidationError::NonPositiveValue { field, value: n });
    }
    Ok(Some(n))
}

pub fn required_positive(object: &Map<String, Value>, field: &'static str) -> ValidationResult<f64> {
    required(field, optional_positive(object, field))
}

pub fn optional_bool(
    object: &Map<String, Value>,
    field: &'static str,
) -> ValidationResult<Option<bool>> {
    let Some(value) = present(object, field) else {
        return Ok(None);
    };
    value.as_bool().map(Some).ok_or(ValidationError::WrongType {
        field,
        expected: "a boolean",
    })
}
