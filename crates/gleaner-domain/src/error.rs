//! Error types for domain validation

use thiserror::Error;

/// Errors raised while validating domain objects
#[derive(Error, Debug)]
pub enum DomainError {
    /// Extraction type does not name a field group of the owning project
    #[error("extraction type '{extraction_type}' is not a field group of project '{project}'")]
    UnknownFieldGroup {
        /// The offending extraction type
        extraction_type: String,
        /// Name of the owning project
        project: String,
    },

    /// Payload contains a key outside the field group's definitions
    #[error("field '{field}' is not declared in group '{group}'")]
    UndeclaredField {
        /// The offending payload key
        field: String,
        /// The field group being validated against
        group: String,
    },

    /// Confidence must lie in [0, 1]
    #[error("confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),

    /// A value could not be coerced to its declared field type
    #[error("value for field '{field}' is not a valid {expected}: {value}")]
    TypeMismatch {
        /// Field name
        field: String,
        /// Declared semantic type
        expected: String,
        /// Rendering of the rejected value
        value: String,
    },

    /// Enum field received a value outside its declared set
    #[error("value '{value}' is not one of the enum values of field '{field}'")]
    UnknownEnumValue {
        /// Field name
        field: String,
        /// The rejected value
        value: String,
    },

    /// Status string did not match any known variant
    #[error("invalid status: {0}")]
    InvalidStatus(String),
}
