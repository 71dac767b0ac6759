//! Anything a query can be sent to.

use super::result::QueryResult;
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Target of a query: a local schema definition or a remote proxy.
///
/// Query-level problems (syntax, validation, data fetching) come back as a
/// `QueryResult` with `succeeded == false`. An `Err` means the query could
/// not be executed at all.
#[async_trait]
pub trait Queryable: Send + Sync {
    /// Execute a query without variables.
    async fn query(&self, query: &str) -> Result<QueryResult> {
        self.query_with_variables(query, None).await
    }

    /// Execute a query with optional variables.
    async fn query_with_variables(
        &self,
        query: &str,
        variables: Option<Value>,
    ) -> Result<QueryResult>;
}
