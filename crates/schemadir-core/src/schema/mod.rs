//! Schema definitions and the query engine they are bound to.

mod metadata;

pub use metadata::SchemaMetadata;

use crate::config::ServiceConfig;
use crate::error::{RegistrarError, Result};
use crate::query::{ExecutionResult, QueryResult, Queryable};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// A schema together with the engine that executes queries against it.
///
/// Query-level problems belong in [`ExecutionResult::errors`]. Returning
/// `Err` means the engine itself failed.
pub trait QuerySchema: Send + Sync {
    /// Name of the root query type.
    fn query_type_name(&self) -> &str;

    /// Field names of the root query type.
    fn query_fields(&self) -> Vec<String>;

    /// Field names of the root mutation type, if there is one.
    fn mutation_fields(&self) -> Option<Vec<String>> {
        None
    }

    fn execute(&self, query: &str, variables: Option<&Value>) -> anyhow::Result<ExecutionResult>;
}

/// A publishable schema.
#[derive(Clone)]
pub struct SchemaDefinition {
    schema: Arc<dyn QuerySchema>,
    metadata: SchemaMetadata,
}

impl SchemaDefinition {
    pub fn new(schema: Arc<dyn QuerySchema>) -> Self {
        Self::with_metadata(schema, SchemaMetadata::default())
    }

    pub fn with_metadata(schema: Arc<dyn QuerySchema>, metadata: SchemaMetadata) -> Self {
        Self { schema, metadata }
    }

    pub fn schema(&self) -> &Arc<dyn QuerySchema> {
        &self.schema
    }

    pub fn metadata(&self) -> &SchemaMetadata {
        &self.metadata
    }

    pub fn query_type_name(&self) -> &str {
        self.schema.query_type_name()
    }

    /// Name the schema is published under.
    pub fn schema_name(&self) -> String {
        self.metadata
            .schema_name
            .clone()
            .unwrap_or_else(|| self.schema.query_type_name().to_string())
    }

    /// Event channel address that serves queries for this schema.
    pub fn service_address(&self) -> String {
        self.metadata.service_address.clone().unwrap_or_else(|| {
            format!("{}.{}", ServiceConfig::ADDRESS_PREFIX, self.schema_name())
        })
    }

    /// Execute a query on the calling thread.
    pub fn query_blocking(&self, query: &str, variables: Option<&Value>) -> Result<QueryResult> {
        if query.trim().is_empty() {
            return Err(RegistrarError::validation("query", "Query cannot be empty"));
        }
        debug!("Executing query against {}", self.schema_name());
        let raw = self
            .schema
            .execute(query, variables)
            .map_err(|e| RegistrarError::QueryExecution {
                message: format!("{:#}", e),
            })?;
        Ok(QueryResult::from_execution(&raw))
    }
}

impl std::fmt::Debug for SchemaDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaDefinition")
            .field("query_type", &self.schema.query_type_name())
            .field("metadata", &self.metadata)
            .finish()
    }
}

#[async_trait]
impl Queryable for SchemaDefinition {
    async fn query_with_variables(
        &self,
        query: &str,
        variables: Option<Value>,
    ) -> Result<QueryResult> {
        self.query_blocking(query, variables.as_ref())
    }
}
