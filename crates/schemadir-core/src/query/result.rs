//! Serializable outcome of a query.
//!
//! Wire shape:
//!
//! ```text
//! { "data": {...}, "succeeded": bool,
//!   "errors": [ {"errorType": string, "message": string,
//!                "locations": [{"line": int, "column": int}, ...]}, ...] }
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

/// Immutable envelope carrying the data, success flag and errors of a query.
///
/// `succeeded` is fixed at construction and never re-derived from `errors`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    #[serde(default, deserialize_with = "null_as_empty")]
    data: Map<String, Value>,
    #[serde(default)]
    succeeded: bool,
    #[serde(default)]
    errors: Vec<QueryError>,
    #[serde(skip)]
    hash: OnceLock<u64>,
}

impl QueryResult {
    pub fn new(data: Map<String, Value>, succeeded: bool, errors: Vec<QueryError>) -> Self {
        Self {
            data,
            succeeded,
            errors,
            hash: OnceLock::new(),
        }
    }

    /// Successful result carrying `data`.
    pub fn success(data: Map<String, Value>) -> Self {
        Self::new(data, true, Vec::new())
    }

    /// Failed result with an empty data document.
    pub fn failure(errors: Vec<QueryError>) -> Self {
        Self::new(Map::new(), false, errors)
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn is_succeeded(&self) -> bool {
        self.succeeded
    }

    pub fn errors(&self) -> &[QueryError] {
        &self.errors
    }

    /// Serialize to a JSON document.
    pub fn to_json(&self) -> Value {
        let errors = self.errors.iter().map(QueryError::to_json).collect();
        let mut json = Map::new();
        json.insert("data".to_string(), Value::Object(self.data.clone()));
        json.insert("succeeded".to_string(), Value::Bool(self.succeeded));
        json.insert("errors".to_string(), Value::Array(errors));
        Value::Object(json)
    }

    /// Parse from a JSON document, defaulting missing fields.
    pub fn from_json(json: &Value) -> crate::Result<Self> {
        Ok(Self::deserialize(json)?)
    }

    /// Content hash, computed on first use and cached.
    pub fn hash_code(&self) -> u64 {
        *self.hash.get_or_init(|| {
            let mut hasher = DefaultHasher::new();
            // serde_json maps are ordered, so the rendering is canonical.
            serde_json::to_string(&self.data)
                .unwrap_or_default()
                .hash(&mut hasher);
            self.succeeded.hash(&mut hasher);
            self.errors.hash(&mut hasher);
            hasher.finish()
        })
    }
}

impl PartialEq for QueryResult {
    fn eq(&self, other: &Self) -> bool {
        self.succeeded == other.succeeded && self.errors == other.errors && self.data == other.data
    }
}

impl Eq for QueryResult {}

impl Hash for QueryResult {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash_code());
    }
}

/// A single query-level error.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryError {
    #[serde(default)]
    error_type: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    locations: Vec<ErrorLocation>,
}

impl QueryError {
    pub fn new(
        error_type: impl Into<String>,
        message: impl Into<String>,
        locations: Vec<ErrorLocation>,
    ) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            locations,
        }
    }

    pub fn error_type(&self) -> &str {
        &self.error_type
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn locations(&self) -> &[ErrorLocation] {
        &self.locations
    }

    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "errorType": self.error_type,
            "message": self.message,
            "locations": self.locations.iter().map(ErrorLocation::to_json).collect::<Vec<_>>(),
        })
    }
}

/// Position of an error in the query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ErrorLocation {
    #[serde(default)]
    line: u32,
    #[serde(default)]
    column: u32,
}

impl ErrorLocation {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn column(&self) -> u32 {
        self.column
    }

    pub fn to_json(&self) -> Value {
        serde_json::json!({ "line": self.line, "column": self.column })
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_data() -> Map<String, Value> {
        match json!({"droid": {"name": "R2-D2"}}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_success_roundtrip() {
        let result = QueryResult::success(sample_data());
        let json = result.to_json();
        let parsed = QueryResult::from_json(&json).unwrap();

        assert_eq!(parsed, result);
        assert_eq!(parsed.to_json(), json);
    }

    #[test]
    fn test_failure_roundtrip() {
        let result = QueryResult::failure(vec![QueryError::new(
            "InvalidSyntax",
            "Invalid Syntax",
            vec![ErrorLocation::new(1, 3), ErrorLocation::new(2, 1)],
        )]);
        let json = result.to_json();
        assert_eq!(json["data"], json!({}));
        assert_eq!(json["errors"][0]["errorType"], "InvalidSyntax");
        assert_eq!(json["errors"][0]["locations"][1]["line"], 2);

        let parsed = QueryResult::from_json(&json).unwrap();
        assert_eq!(parsed, result);
        assert_eq!(parsed.to_json(), json);
    }

    #[test]
    fn test_serde_matches_to_json() {
        let result = QueryResult::failure(vec![QueryError::new("ValidationError", "bad", vec![])]);
        assert_eq!(serde_json::to_value(&result).unwrap(), result.to_json());
    }

    #[test]
    fn test_missing_fields_default() {
        let parsed = QueryResult::from_json(&json!({"data": null})).unwrap();
        assert!(parsed.data().is_empty());
        assert!(!parsed.is_succeeded());
        assert!(parsed.errors().is_empty());

        let location: ErrorLocation = serde_json::from_value(json!({})).unwrap();
        assert_eq!(location, ErrorLocation::new(0, 0));
    }

    #[test]
    fn test_hash_code_is_stable_and_cached() {
        let result = QueryResult::success(sample_data());
        let first = result.hash_code();
        assert_eq!(first, result.hash_code());
        assert_eq!(first, QueryResult::success(sample_data()).hash_code());
        assert_ne!(first, QueryResult::failure(vec![]).hash_code());
    }
}
