//! Domain error representation shared across adapters.
//!
//! Keep this module free from transport or framework concerns so the same
//! error shape can be mapped by any adapter (HTTP handlers, background
//! workers, admin tooling).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Stable machine-readable error code.
///
/// The set is closed: every failure a caller can observe maps onto exactly
/// one of these kinds, and handlers translate them to transport codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The row is absent, belongs to another tenant, or is soft-deleted
    /// where a live row was expected.
    NotFound,
    /// A uniqueness rule was violated (duplicate object code) or a
    /// concurrent writer won the version race.
    Conflict,
    /// The request is malformed: missing field, non-object payload,
    /// unknown status, invalid page.
    InvalidArgument,
    /// The operation does not apply to the object's current state
    /// (e.g. restoring a live row).
    InvalidState,
    /// A dependency (store, cache, bus) could not be reached.
    Unavailable,
    /// An unexpected constraint violation; surfaced as an internal fault.
    Integrity,
}

/// Domain error payload consumed by adapters.
///
/// ## Invariants
/// - `message` is non-empty once trimmed of whitespace.
///
/// # Examples
/// ```
/// use kernel_store::domain::{Error, ErrorCode};
///
/// let err = Error::not_found("no such object");
/// assert_eq!(err.code(), ErrorCode::NotFound);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct Error {
    code: ErrorCode,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl Error {
    /// Create a new error.
    ///
    /// # Panics
    /// Panics when the message is blank; error sites always have something
    /// to say, so a blank message is a programming error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        assert!(
            !message.trim().is_empty(),
            "error messages must not be blank"
        );
        Self {
            code,
            message,
            details: None,
        }
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Human-readable message.
    pub fn message(&self) -> &str {
        self.message.as_str()
    }

    /// Supplementary structured details.
    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    /// Attach structured details to the error.
    ///
    /// # Examples
    /// ```
    /// use kernel_store::domain::Error;
    /// use serde_json::json;
    ///
    /// let err = Error::conflict("duplicate code")
    ///     .with_details(json!({ "code": "REQ-1" }));
    /// assert!(err.details().is_some());
    /// ```
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Convenience constructor for [`ErrorCode::NotFound`].
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Convenience constructor for [`ErrorCode::Conflict`].
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    /// Convenience constructor for [`ErrorCode::InvalidArgument`].
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    /// Convenience constructor for [`ErrorCode::InvalidState`].
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidState, message)
    }

    /// Convenience constructor for [`ErrorCode::Unavailable`].
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unavailable, message)
    }

    /// Convenience constructor for [`ErrorCode::Integrity`].
    pub fn integrity(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Integrity, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(Error::not_found("x"), ErrorCode::NotFound)]
    #[case(Error::conflict("x"), ErrorCode::Conflict)]
    #[case(Error::invalid_argument("x"), ErrorCode::InvalidArgument)]
    #[case(Error::invalid_state("x"), ErrorCode::InvalidState)]
    #[case(Error::unavailable("x"), ErrorCode::Unavailable)]
    #[case(Error::integrity("x"), ErrorCode::Integrity)]
    fn constructors_set_expected_code(#[case] err: Error, #[case] code: ErrorCode) {
        assert_eq!(err.code(), code);
    }

    #[test]
    fn details_round_trip() {
        let err = Error::conflict("duplicate").with_details(json!({"code": "C-1"}));
        assert_eq!(err.details(), Some(&json!({"code": "C-1"})));
        assert_eq!(err.to_string(), "duplicate");
    }

    #[test]
    fn serializes_with_snake_case_code() {
        let err = Error::invalid_argument("bad payload");
        let value = serde_json::to_value(&err).expect("serializable");
        assert_eq!(value["code"], "invalid_argument");
        assert_eq!(value["message"], "bad payload");
    }

    #[test]
    #[should_panic(expected = "must not be blank")]
    fn blank_messages_are_rejected() {
        let _ = Error::new(ErrorCode::Integrity, "   ");
    }
}
