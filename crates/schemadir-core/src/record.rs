//! Directory records.

use crate::config::ServiceConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Publication status of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
    Up,
    Down,
    OutOfService,
    #[default]
    Unknown,
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordStatus::Up => write!(f, "UP"),
            RecordStatus::Down => write!(f, "DOWN"),
            RecordStatus::OutOfService => write!(f, "OUT_OF_SERVICE"),
            RecordStatus::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// An entry published in a directory.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub record_type: String,
    #[serde(default)]
    pub status: RecordStatus,
    #[serde(default)]
    pub location: Map<String, Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Opaque id assigned by the directory on publication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration: Option<String>,
}

impl Record {
    /// A schema service record for `name`, reachable at `endpoint`.
    pub fn schema_service(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        let mut location = Map::new();
        location.insert(
            ServiceConfig::ENDPOINT_KEY.to_string(),
            Value::String(endpoint.into()),
        );
        Self {
            name: name.into(),
            record_type: ServiceConfig::SERVICE_TYPE.to_string(),
            location,
            ..Default::default()
        }
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.location
            .get(ServiceConfig::ENDPOINT_KEY)
            .and_then(Value::as_str)
    }

    pub fn publisher_id(&self) -> Option<&str> {
        self.metadata
            .get(ServiceConfig::PUBLISHER_ID_KEY)
            .and_then(Value::as_str)
    }

    /// Reply timeout requested by the publisher, if any.
    pub fn send_timeout(&self) -> Option<Duration> {
        self.metadata
            .get(ServiceConfig::SEND_TIMEOUT_KEY)
            .and_then(Value::as_u64)
            .map(Duration::from_millis)
    }

    pub fn is_schema_service(&self) -> bool {
        self.record_type == ServiceConfig::SERVICE_TYPE
    }

    pub fn is_up(&self) -> bool {
        self.status == RecordStatus::Up
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_service_record() {
        let record = Record::schema_service("DroidQueries", "service.graphql.DroidQueries");
        assert!(record.is_schema_service());
        assert_eq!(record.endpoint(), Some("service.graphql.DroidQueries"));
        assert_eq!(record.status, RecordStatus::Unknown);
        assert!(record.publisher_id().is_none());
    }

    #[test]
    fn test_record_json_shape() {
        let mut record = Record::schema_service("A", "service.graphql.A");
        record.status = RecordStatus::OutOfService;
        record.registration = Some("r-1".into());

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "graphql-service");
        assert_eq!(json["status"], "OUT_OF_SERVICE");
        assert_eq!(json["location"]["endpoint"], "service.graphql.A");
        assert_eq!(json["registration"], "r-1");

        let parsed: Record = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(RecordStatus::Up.to_string(), "UP");
        assert_eq!(RecordStatus::OutOfService.to_string(), "OUT_OF_SERVICE");
    }
}
