//! Validation errors shared by schema checks and the query engine.

use lookout_core::error::LookoutError;

use crate::schema::FieldType;

/// A query, tool argument, or data value failed validation.
///
/// Raised at request time these are recoverable: the chat layer turns them
/// into tool results so the model can correct itself. Raised while loading
/// data they become fatal `LookoutError::Config` errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("unknown field '{0}'")]
    UnknownField(String),
    #[error("unknown column '{0}'")]
    UnknownColumn(String),
    #[error("column '{0}' requested more than once")]
    DuplicateColumn(String),
    #[error("unknown operator '{0}'")]
    UnknownOperator(String),
    #[error("operator '{op}' is not supported on {field_type} field '{field}'")]
    UnsupportedOperator {
        field: String,
        op: String,
        field_type: FieldType,
    },
    #[error("field '{field}' expects {expected}, got {found}")]
    TypeMismatch {
        field: String,
        expected: String,
        found: String,
    },
    #[error("missing required field '{0}'")]
    MissingRequired(String),
    #[error("field '{field}' is out of range: {detail}")]
    OutOfRange { field: String, detail: String },
    #[error("field '{field}' value {value} is not one of: {allowed}")]
    NotAllowed {
        field: String,
        value: String,
        allowed: String,
    },
    #[error("unexpected field '{0}'")]
    UnexpectedField(String),
    #[error("{0}")]
    Malformed(String),
}

impl ValidationError {
    /// True when the error names a field or column that does not exist.
    pub fn is_unknown_name(&self) -> bool {
        matches!(
            self,
            ValidationError::UnknownField(_) | ValidationError::UnknownColumn(_)
        )
    }
}

impl From<ValidationError> for LookoutError {
    fn from(err: ValidationError) -> Self {
        LookoutError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_type_mismatch() {
        let err = ValidationError::TypeMismatch {
            field: "RES_W".to_string(),
            expected: "number".to_string(),
            found: "boolean".to_string(),
        };
        assert_eq!(err.to_string(), "field 'RES_W' expects number, got boolean");
    }

    #[test]
    fn test_display_unsupported_operator() {
        let err = ValidationError::UnsupportedOperator {
            field: "CIV_OK".to_string(),
            op: "contains".to_string(),
            field_type: FieldType::Boolean,
        };
        assert_eq!(
            err.to_string(),
            "operator 'contains' is not supported on boolean field 'CIV_OK'"
        );
    }

    #[test]
    fn test_is_unknown_name() {
        assert!(ValidationError::UnknownField("x".into()).is_unknown_name());
        assert!(ValidationError::UnknownColumn("x".into()).is_unknown_name());
        assert!(!ValidationError::MissingRequired("x".into()).is_unknown_name());
    }

    #[test]
    fn test_into_config_error() {
        let err: LookoutError = ValidationError::MissingRequired("bitrate".into()).into();
        assert!(matches!(err, LookoutError::Config(_)));
        assert!(err.to_string().contains("bitrate"));
    }
}
