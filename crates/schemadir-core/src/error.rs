//! Error types for the schema directory registrar.
//!
//! Every failure that reaches a caller is one of these variants. Query-level
//! errors reported by an engine are not errors here: they are folded into a
//! [`QueryResult`](crate::query::QueryResult) with `succeeded == false`.

use std::time::Duration;
use thiserror::Error;

/// Main error type for registrar, publisher and consumer operations.
#[derive(Debug, Error)]
pub enum RegistrarError {
    // Validation errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Schema '{schema}' was already published to: {directory}")]
    AlreadyPublished { schema: String, directory: String },

    // Directory collaborator errors
    #[error("Directory '{directory}' error: {message}")]
    Directory { directory: String, message: String },

    #[error(transparent)]
    PartialPublish(#[from] PartialPublishError),

    #[error("Failed to close {} registration(s): {}", .errors.len(), join_messages(.errors))]
    CloseFailed { errors: Vec<RegistrarError> },

    // Query engine errors
    #[error("Query execution failed: {message}")]
    QueryExecution { message: String },

    // Not-found errors
    #[error("Service discovery with name '{directory}' is not managed by this schema consumer")]
    DirectoryNotManaged { directory: String },

    #[error("Failed to find published schema '{schema}' in repository: {directory}")]
    SchemaNotFound { schema: String, directory: String },

    #[error("Failed to find schema proxy using filter {filter}")]
    RecordNotFound { filter: String },

    #[error("Record '{name}' is of wrong type '{actual}'. Expected: {expected}")]
    WrongRecordType {
        name: String,
        actual: String,
        expected: String,
    },

    #[error("Record status indicates service '{name}' is: {status}. Expected: UP")]
    RecordNotUp { name: String, status: String },

    #[error("Record '{name}' has no service discovery registration")]
    RecordNotRegistered { name: String },

    // Event channel errors
    #[error("No handlers for address {address}")]
    NoHandlers { address: String },

    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for registrar operations.
pub type Result<T> = std::result::Result<T, RegistrarError>;

impl From<serde_json::Error> for RegistrarError {
    fn from(err: serde_json::Error) -> Self {
        RegistrarError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl RegistrarError {
    /// Create a validation error for a named argument.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        RegistrarError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a directory collaborator error.
    pub fn directory(directory: impl Into<String>, message: impl Into<String>) -> Self {
        RegistrarError::Directory {
            directory: directory.into(),
            message: message.into(),
        }
    }

    /// Check if this error reports something that could not be found.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RegistrarError::DirectoryNotManaged { .. }
                | RegistrarError::SchemaNotFound { .. }
                | RegistrarError::RecordNotFound { .. }
                | RegistrarError::WrongRecordType { .. }
                | RegistrarError::RecordNotUp { .. }
                | RegistrarError::RecordNotRegistered { .. }
        )
    }

    /// Check if this error was raised before any collaborator was called.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            RegistrarError::Validation { .. } | RegistrarError::AlreadyPublished { .. }
        )
    }
}

/// Aggregate of the failures collected while publishing a batch of schemas.
///
/// Only constructed when fewer publications succeeded than were attempted.
/// The errors keep the order in which they were encountered.
#[derive(Debug, Error)]
#[error("Failed to publish all schema definitions. {} errors occurred:{}", .errors.len(), bullet_list(.errors))]
pub struct PartialPublishError {
    errors: Vec<RegistrarError>,
}

impl PartialPublishError {
    pub fn new(errors: Vec<RegistrarError>) -> Self {
        Self { errors }
    }

    /// The underlying publication errors.
    pub fn publication_errors(&self) -> &[RegistrarError] {
        &self.errors
    }

    pub fn into_publication_errors(self) -> Vec<RegistrarError> {
        self.errors
    }
}

fn bullet_list(errors: &[RegistrarError]) -> String {
    errors
        .iter()
        .map(|error| format!("\n - {}", error))
        .collect()
}

fn join_messages(errors: &[RegistrarError]) -> String {
    errors
        .iter()
        .map(|error| error.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RegistrarError::AlreadyPublished {
            schema: "DroidQueries".into(),
            directory: "theDiscovery".into(),
        };
        assert_eq!(
            err.to_string(),
            "Schema 'DroidQueries' was already published to: theDiscovery"
        );
    }

    #[test]
    fn test_partial_publish_message_lists_every_error() {
        let err = PartialPublishError::new(vec![
            RegistrarError::Other("first".into()),
            RegistrarError::Other("second".into()),
        ]);
        assert_eq!(
            err.to_string(),
            "Failed to publish all schema definitions. 2 errors occurred:\n - first\n - second"
        );
        assert_eq!(err.publication_errors().len(), 2);
    }

    #[test]
    fn test_partial_publish_converts_into_registrar_error() {
        let err: RegistrarError =
            PartialPublishError::new(vec![RegistrarError::Other("x".into())]).into();
        assert!(matches!(err, RegistrarError::PartialPublish(_)));
        assert!(err.to_string().contains("1 errors occurred"));
    }

    #[test]
    fn test_error_classification() {
        assert!(RegistrarError::SchemaNotFound {
            schema: "a".into(),
            directory: "b".into()
        }
        .is_not_found());
        assert!(RegistrarError::validation("query", "cannot be empty").is_validation());
        assert!(!RegistrarError::Timeout(Duration::from_secs(1)).is_not_found());
    }
}
