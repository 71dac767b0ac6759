//! Looking up published schemas and querying them.

use crate::config::ServiceConfig;
use crate::directory::Directory;
use crate::error::{RegistrarError, Result};
use crate::query::{QueryResult, Queryable};
use crate::record::{Record, RecordStatus};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// Proxy to the schema service described by `record`.
///
/// The record must be a schema service, UP and registered.
pub fn get_schema_proxy(directory: &dyn Directory, record: &Record) -> Result<Arc<dyn Queryable>> {
    if !record.is_schema_service() {
        return Err(RegistrarError::WrongRecordType {
            name: record.name.clone(),
            actual: record.record_type.clone(),
            expected: ServiceConfig::SERVICE_TYPE.to_string(),
        });
    }
    if record.status != RecordStatus::Up {
        return Err(RegistrarError::RecordNotUp {
            name: record.name.clone(),
            status: record.status.to_string(),
        });
    }
    if record.registration.is_none() {
        return Err(RegistrarError::RecordNotRegistered {
            name: record.name.clone(),
        });
    }

    let reference = directory.get_reference(record)?;
    let proxy = reference.get();
    reference.release();
    Ok(proxy)
}

/// Proxy to the first UP record matching every entry of `filter`.
///
/// Filter keys are matched against the record's own fields first and then
/// against its metadata.
pub async fn get_schema_proxy_matching(
    directory: &dyn Directory,
    filter: &Map<String, Value>,
) -> Result<Arc<dyn Queryable>> {
    let record = directory
        .get_record(&|record: &Record| record_matches(record, filter))
        .await?
        .ok_or_else(|| RegistrarError::RecordNotFound {
            filter: Value::Object(filter.clone()).to_string(),
        })?;
    get_schema_proxy(directory, &record)
}

/// Run a query against the schema service described by `record`.
pub async fn execute_query(
    directory: &dyn Directory,
    record: &Record,
    query: &str,
    variables: Option<Value>,
) -> Result<QueryResult> {
    let proxy = get_schema_proxy(directory, record)?;
    debug!("Querying {} in {}", record.name, directory.name());
    proxy.query_with_variables(query, variables).await
}

/// Whether `record` has every field in `filter`.
pub fn record_matches(record: &Record, filter: &Map<String, Value>) -> bool {
    let Ok(Value::Object(fields)) = serde_json::to_value(record) else {
        return false;
    };
    filter.iter().all(|(key, expected)| {
        fields.get(key) == Some(expected) || record.metadata.get(key) == Some(expected)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::LocalEventBus;
    use crate::config::DirectoryOptions;
    use crate::directory::{DirectoryProvider, LocalDirectoryProvider};
    use serde_json::json;

    fn directory() -> Arc<dyn Directory> {
        LocalDirectoryProvider::new(Arc::new(LocalEventBus::new()))
            .create_directory(&DirectoryOptions::named("D"))
    }

    fn filter(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_rejects_wrong_type() {
        let directory = directory();
        let mut record = Record::schema_service("A", "a");
        record.record_type = "http-endpoint".into();
        record.status = RecordStatus::Up;

        let err = get_schema_proxy(directory.as_ref(), &record).err().unwrap();
        assert_eq!(
            err.to_string(),
            "Record 'A' is of wrong type 'http-endpoint'. Expected: graphql-service"
        );
    }

    #[tokio::test]
    async fn test_rejects_record_not_up() {
        let directory = directory();
        let mut record = Record::schema_service("A", "a");
        record.status = RecordStatus::OutOfService;

        let err = get_schema_proxy(directory.as_ref(), &record).err().unwrap();
        assert!(matches!(err, RegistrarError::RecordNotUp { .. }));
        assert!(err.to_string().contains("OUT_OF_SERVICE"));
    }

    #[tokio::test]
    async fn test_rejects_unregistered_record() {
        let directory = directory();
        let mut record = Record::schema_service("A", "a");
        record.status = RecordStatus::Up;

        let err = get_schema_proxy(directory.as_ref(), &record).err().unwrap();
        assert!(matches!(err, RegistrarError::RecordNotRegistered { .. }));
    }

    #[tokio::test]
    async fn test_matching_filter() {
        let directory = directory();
        let mut record = Record::schema_service("A", "service.graphql.A");
        record.metadata.insert("team".into(), json!("droids"));
        directory.publish(record).await.unwrap();

        assert!(get_schema_proxy_matching(directory.as_ref(), &filter(json!({"name": "A"})))
            .await
            .is_ok());
        assert!(get_schema_proxy_matching(
            directory.as_ref(),
            &filter(json!({"type": "graphql-service", "team": "droids"}))
        )
        .await
        .is_ok());

        let err = get_schema_proxy_matching(directory.as_ref(), &filter(json!({"name": "B"})))
            .await
            .err().unwrap();
        assert_eq!(
            err.to_string(),
            "Failed to find schema proxy using filter {\"name\":\"B\"}"
        );
    }
}
