//! Errors raised for malformed caller input.
//!
//! Expected absence (unknown session or participant) is never an error; it is
//! returned as `None` or `false` by the session service.

use thiserror::Error;

/// A required field was empty or blank.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required text field was empty after trimming.
    #[error("{field} must not be blank")]
    Blank {
        /// Name of the offending field.
        field: &'static str,
    },
}

/// Trim `value` and reject it when nothing is left.
pub(crate) fn require(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Blank { field });
    }
    Ok(trimmed.to_string())
}
