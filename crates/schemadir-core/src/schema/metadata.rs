//! Publication metadata attached to a schema definition.

use crate::config::ServiceConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Metadata that shapes how a schema is published.
///
/// Everything here, including the extra entries, ends up in the published
/// record's metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaMetadata {
    /// Overrides the root query type name as the record name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
    /// Overrides the derived service address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_address: Option<String>,
    #[serde(default)]
    pub expose_to_gateway: bool,
    /// Reply timeout for queries sent to the published service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_timeout_ms: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SchemaMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema_name(mut self, name: impl Into<String>) -> Self {
        self.schema_name = Some(name.into());
        self
    }

    pub fn with_service_address(mut self, address: impl Into<String>) -> Self {
        self.service_address = Some(address.into());
        self
    }

    pub fn with_expose_to_gateway(mut self, expose: bool) -> Self {
        self.expose_to_gateway = expose;
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    pub fn publisher_id(&self) -> Option<&str> {
        self.get(ServiceConfig::PUBLISHER_ID_KEY).and_then(Value::as_str)
    }

    /// Reply timeout for service calls, falling back to the default.
    pub fn send_timeout(&self) -> Duration {
        self.send_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(ServiceConfig::SEND_TIMEOUT)
    }

    /// Overlay `other` on top of `self`: set fields and extra entries in
    /// `other` win.
    pub fn merged(&self, other: &SchemaMetadata) -> SchemaMetadata {
        let mut merged = self.clone();
        if other.schema_name.is_some() {
            merged.schema_name = other.schema_name.clone();
        }
        if other.service_address.is_some() {
            merged.service_address = other.service_address.clone();
        }
        if other.send_timeout_ms.is_some() {
            merged.send_timeout_ms = other.send_timeout_ms;
        }
        merged.expose_to_gateway |= other.expose_to_gateway;
        merged
            .extra
            .extend(other.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }

    /// Render as record metadata.
    pub fn to_record_metadata(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => self.extra.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_metadata_flattens_extra_entries() {
        let metadata = SchemaMetadata::new()
            .with_expose_to_gateway(true)
            .with_entry("publisherId", "pub-1");

        let map = metadata.to_record_metadata();
        assert_eq!(map["exposeToGateway"], json!(true));
        assert_eq!(map["publisherId"], json!("pub-1"));
        assert!(!map.contains_key("schemaName"));
        assert_eq!(metadata.publisher_id(), Some("pub-1"));
    }

    #[test]
    fn test_merged_prefers_overlay() {
        let base = SchemaMetadata::new()
            .with_schema_name("Base")
            .with_entry("a", 1)
            .with_entry("b", 1);
        let overlay = SchemaMetadata::new().with_entry("b", 2);

        let merged = base.merged(&overlay);
        assert_eq!(merged.schema_name.as_deref(), Some("Base"));
        assert_eq!(merged.get("a"), Some(&json!(1)));
        assert_eq!(merged.get("b"), Some(&json!(2)));
    }

    #[test]
    fn test_send_timeout_default() {
        assert_eq!(SchemaMetadata::new().send_timeout(), ServiceConfig::SEND_TIMEOUT);
        let metadata = SchemaMetadata::new().with_send_timeout(Duration::from_millis(250));
        assert_eq!(metadata.send_timeout(), Duration::from_millis(250));
        assert_eq!(
            metadata.to_record_metadata()[ServiceConfig::SEND_TIMEOUT_KEY],
            json!(250)
        );
    }
}
