use std::fmt;
use thiserror::Error;

/// Classification of a [`StorageError`].
///
/// Callers discriminate failures by class, never by inspecting the
/// underlying driver error.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ErrorClass {
    /// Lookup matched zero records
    NotFound,
    /// Primary or unique key conflict on create
    AlreadyExists,
    /// Caller supplied a structurally wrong filter, object or configuration
    InvalidInput,
    /// Everything else: connectivity, malformed responses, misconfiguration
    Backend,
}

impl ErrorClass {
    /// Fixed classification string carried by errors of this class.
    ///
    /// `Backend` errors have no fixed classification, their message is the
    /// detail itself.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::NotFound => "not found",
            ErrorClass::AlreadyExists => "already exists",
            ErrorClass::InvalidInput => "invalid input",
            ErrorClass::Backend => "",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::Backend => write!(f, "backend error"),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

/// Unified error type for every repository, backend and manager operation
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Backend(String),
}

impl StorageError {
    /// Create a "not found" error with custom details
    pub fn not_found(details: impl Into<String>) -> Self {
        StorageError::NotFound(details.into())
    }

    /// Create an "already exists" error with custom details
    pub fn already_exists(details: impl Into<String>) -> Self {
        StorageError::AlreadyExists(details.into())
    }

    /// Create an "invalid input" error with custom details
    pub fn invalid_input(details: impl Into<String>) -> Self {
        StorageError::InvalidInput(details.into())
    }

    /// Create a generic backend error; the message is the detail
    pub fn backend(message: impl Into<String>) -> Self {
        StorageError::Backend(message.into())
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            StorageError::NotFound(_) => ErrorClass::NotFound,
            StorageError::AlreadyExists(_) => ErrorClass::AlreadyExists,
            StorageError::InvalidInput(_) => ErrorClass::InvalidInput,
            StorageError::Backend(_) => ErrorClass::Backend,
        }
    }

    /// Free-form details attached when the error was built
    pub fn details(&self) -> &str {
        match self {
            StorageError::NotFound(d)
            | StorageError::AlreadyExists(d)
            | StorageError::InvalidInput(d)
            | StorageError::Backend(d) => d,
        }
    }

    pub fn is(&self, class: ErrorClass) -> bool {
        self.class() == class
    }

    pub fn is_not_found(&self) -> bool {
        self.is(ErrorClass::NotFound)
    }

    pub fn is_already_exists(&self) -> bool {
        self.is(ErrorClass::AlreadyExists)
    }

    pub fn is_invalid_input(&self) -> bool {
        self.is(ErrorClass::InvalidInput)
    }
}

/// Check whether `err` belongs to the given error class
pub fn is_error_of_type(err: &StorageError, class: ErrorClass) -> bool {
    err.is(class)
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::InvalidInput(format!("serialization error: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        let err = StorageError::not_found("record not found");
        assert!(is_error_of_type(&err, ErrorClass::NotFound));
        assert!(!is_error_of_type(&err, ErrorClass::AlreadyExists));
        assert_eq!(err.details(), "record not found");
        assert_eq!(err.to_string(), "not found: record not found");
    }

    #[test]
    fn test_backend_error_message_is_detail() {
        let err = StorageError::backend("connection refused");
        assert_eq!(err.to_string(), "connection refused");
        assert_eq!(err.class(), ErrorClass::Backend);
        assert_eq!(ErrorClass::Backend.as_str(), "");
    }

    #[test]
    fn test_class_helpers() {
        assert!(StorageError::already_exists("dup").is_already_exists());
        assert!(StorageError::invalid_input("bad").is_invalid_input());
        assert!(!StorageError::invalid_input("bad").is_not_found());
    }
}
