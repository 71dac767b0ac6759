//! Raw engine output and its conversion into a [`QueryResult`].

use super::result::{ErrorLocation, QueryError, QueryResult};
use serde_json::{Map, Value};

/// Classification of an engine error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    InvalidSyntax,
    ValidationError,
    DataFetchingException,
    OperationNotSupported,
    ExecutionAborted,
}

impl ErrorType {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorType::InvalidSyntax => "InvalidSyntax",
            ErrorType::ValidationError => "ValidationError",
            ErrorType::DataFetchingException => "DataFetchingException",
            ErrorType::OperationNotSupported => "OperationNotSupported",
            ErrorType::ExecutionAborted => "ExecutionAborted",
        }
    }
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Line and column in the query source, both 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// A query-level error reported by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineError {
    pub error_type: ErrorType,
    pub message: String,
    pub locations: Vec<SourceLocation>,
}

impl EngineError {
    pub fn new(
        error_type: ErrorType,
        message: impl Into<String>,
        locations: Vec<SourceLocation>,
    ) -> Self {
        Self {
            error_type,
            message: message.into(),
            locations,
        }
    }
}

/// What the engine returns for one execution.
///
/// Either `data` or a non-empty `errors` list is meaningful, never both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionResult {
    pub data: Option<Map<String, Value>>,
    pub errors: Vec<EngineError>,
}

impl ExecutionResult {
    pub fn with_data(data: Map<String, Value>) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
        }
    }

    pub fn with_errors(errors: Vec<EngineError>) -> Self {
        Self { data: None, errors }
    }
}

impl QueryResult {
    /// Convert a raw execution result.
    ///
    /// On failure the data document is empty regardless of what the engine
    /// returned; error and location order is preserved.
    pub fn from_execution(result: &ExecutionResult) -> Self {
        let succeeded = result.errors.is_empty();
        let data = if succeeded {
            result.data.clone().unwrap_or_default()
        } else {
            Map::new()
        };
        let errors = result.errors.iter().map(convert_error).collect();
        QueryResult::new(data, succeeded, errors)
    }
}

fn convert_error(error: &EngineError) -> QueryError {
    QueryError::new(
        error.error_type.name(),
        error.message.clone(),
        error
            .locations
            .iter()
            .map(|location| ErrorLocation::new(location.line, location.column))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_copies_data() {
        let data = json!({"droid": {"name": "R2-D2"}}).as_object().cloned().unwrap();
        let result = QueryResult::from_execution(&ExecutionResult::with_data(data.clone()));

        assert!(result.is_succeeded());
        assert!(result.errors().is_empty());
        assert_eq!(result.data(), &data);
    }

    #[test]
    fn test_failure_drops_partial_data() {
        let raw = ExecutionResult {
            data: json!({"droid": null}).as_object().cloned(),
            errors: vec![
                EngineError::new(
                    ErrorType::ValidationError,
                    "first",
                    vec![SourceLocation::new(1, 2), SourceLocation::new(3, 4)],
                ),
                EngineError::new(ErrorType::DataFetchingException, "second", vec![]),
            ],
        };
        let result = QueryResult::from_execution(&raw);

        assert!(!result.is_succeeded());
        assert!(result.data().is_empty());
        assert_eq!(result.errors().len(), 2);
        assert_eq!(result.errors()[0].error_type(), "ValidationError");
        assert_eq!(result.errors()[0].locations()[1], ErrorLocation::new(3, 4));
        assert_eq!(result.errors()[1].message(), "second");
    }

    #[test]
    fn test_conversion_is_pure() {
        let raw = ExecutionResult::with_errors(vec![EngineError::new(
            ErrorType::InvalidSyntax,
            "Invalid Syntax",
            vec![SourceLocation::new(1, 1)],
        )]);
        assert_eq!(QueryResult::from_execution(&raw), QueryResult::from_execution(&raw));
    }

    #[test]
    fn test_succeeded_iff_no_errors() {
        for raw in [
            ExecutionResult::default(),
            ExecutionResult::with_errors(vec![EngineError::new(
                ErrorType::ExecutionAborted,
                "x",
                vec![],
            )]),
        ] {
            let result = QueryResult::from_execution(&raw);
            assert_eq!(result.is_succeeded(), result.errors().is_empty());
        }
    }
}
