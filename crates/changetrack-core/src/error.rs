use std::fmt;

use thiserror::Error;

/// Machine-readable error codes for callers that branch on failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    PropertyNotFound,
    TypeMismatch,
    NotTrackable,
    IndexOutOfBounds,
    DuplicateProperty,
    EmptyShapeName,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::PropertyNotFound => "E1001",
            Self::TypeMismatch => "E1002",
            Self::NotTrackable => "E2001",
            Self::IndexOutOfBounds => "E2002",
            Self::DuplicateProperty => "E3001",
            Self::EmptyShapeName => "E3002",
        }
    }

    /// Short human-facing summary for logs.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::PropertyNotFound => "Property not found",
            Self::TypeMismatch => "Value does not match the property type",
            Self::NotTrackable => "Object is not tracked",
            Self::IndexOutOfBounds => "Collection index out of bounds",
            Self::DuplicateProperty => "Duplicate property in shape",
            Self::EmptyShapeName => "Shape name is empty",
        }
    }

    /// Optional remediation hint.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::PropertyNotFound => Some("Check the property name against the shape definition."),
            Self::TypeMismatch => None,
            Self::NotTrackable => Some(
                "Wrap the object first, or enable the matching make*PropertiesTrackable option.",
            ),
            Self::IndexOutOfBounds => None,
            Self::DuplicateProperty => Some("Give every property of a shape a unique name."),
            Self::EmptyShapeName => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Failure of a single tracking operation.
///
/// Every failure is synchronous and leaves the wrapped graph untouched: a
/// rejected write records no original value and publishes nothing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackError {
    #[error("property '{property}' not found on shape '{shape}'")]
    NotFound { shape: String, property: String },

    #[error("type mismatch on '{shape}.{property}': expected {expected}, got {actual}")]
    TypeMismatch {
        shape: String,
        property: String,
        expected: String,
        actual: String,
    },

    #[error("{what} is not tracked")]
    NotTrackable { what: String },

    #[error("index {index} out of bounds for collection of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("shape '{shape}' declares property '{property}' more than once")]
    DuplicateProperty { shape: String, property: String },

    #[error("shape name must not be empty")]
    EmptyShapeName,
}

impl TrackError {
    /// The stable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::PropertyNotFound,
            Self::TypeMismatch { .. } => ErrorCode::TypeMismatch,
            Self::NotTrackable { .. } => ErrorCode::NotTrackable,
            Self::IndexOutOfBounds { .. } => ErrorCode::IndexOutOfBounds,
            Self::DuplicateProperty { .. } => ErrorCode::DuplicateProperty,
            Self::EmptyShapeName => ErrorCode::EmptyShapeName,
        }
    }

    pub(crate) fn not_found(shape: &str, property: &str) -> Self {
        Self::NotFound {
            shape: shape.to_string(),
            property: property.to_string(),
        }
    }

    pub(crate) fn not_trackable(what: impl Into<String>) -> Self {
        Self::NotTrackable { what: what.into() }
    }
}

/// Result type for tracking operations.
pub type TrackResult<T> = Result<T, TrackError>;

#[cfg(test)]
mod tests {
    use super::{ErrorCode, TrackError};
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::PropertyNotFound,
            ErrorCode::TypeMismatch,
            ErrorCode::NotTrackable,
            ErrorCode::IndexOutOfBounds,
            ErrorCode::DuplicateProperty,
            ErrorCode::EmptyShapeName,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        let code = ErrorCode::TypeMismatch.code();
        assert_eq!(code.len(), 5);
        assert!(code.starts_with('E'));
        assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn errors_map_to_codes() {
        let err = TrackError::not_found("Order", "Nope");
        assert_eq!(err.code(), ErrorCode::PropertyNotFound);
        assert_eq!(err.to_string(), "property 'Nope' not found on shape 'Order'");

        let err = TrackError::not_trackable("property 'Order.Address'");
        assert_eq!(err.code(), ErrorCode::NotTrackable);
        assert!(err.code().hint().is_some());
    }
}
