//! Discovery events and the handlers that receive them.

mod consumers;

pub use consumers::EventConsumers;
pub(crate) use consumers::service_call_handler;

use crate::record::Record;
use crate::registrar::SchemaRegistration;
use serde::{Deserialize, Serialize};

/// Whether a usage event reports a reference being taken or given back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceStatus {
    Bound,
    Released,
}

/// Payload of a usage event.
///
/// On the wire this is `{"id": ..., "record": {...}, "type": "bind"|"release"}`.
/// Any type other than `"bind"` reads as released.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "UsageWire", into = "UsageWire")]
pub struct SchemaReferenceData {
    id: String,
    record: Record,
    status: ReferenceStatus,
}

impl SchemaReferenceData {
    pub fn new(id: impl Into<String>, record: Record, status: ReferenceStatus) -> Self {
        Self {
            id: id.into(),
            record,
            status,
        }
    }

    pub fn bound(id: impl Into<String>, record: Record) -> Self {
        Self::new(id, record, ReferenceStatus::Bound)
    }

    pub fn released(id: impl Into<String>, record: Record) -> Self {
        Self::new(id, record, ReferenceStatus::Released)
    }

    /// Id of the reference, shared by its bind and release events.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn status(&self) -> ReferenceStatus {
        self.status
    }
}

/// Compares the reference id, status, record name and record type.
impl PartialEq for SchemaReferenceData {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.status == other.status
            && self.record.name == other.record.name
            && self.record.record_type == other.record.record_type
    }
}

impl Eq for SchemaReferenceData {}

#[derive(Serialize, Deserialize)]
struct UsageWire {
    #[serde(default)]
    id: String,
    #[serde(default)]
    record: Record,
    #[serde(rename = "type", default)]
    kind: String,
}

impl From<UsageWire> for SchemaReferenceData {
    fn from(wire: UsageWire) -> Self {
        let status = if wire.kind == "bind" {
            ReferenceStatus::Bound
        } else {
            ReferenceStatus::Released
        };
        Self::new(wire.id, wire.record, status)
    }
}

impl From<SchemaReferenceData> for UsageWire {
    fn from(data: SchemaReferenceData) -> Self {
        let kind = match data.status {
            ReferenceStatus::Bound => "bind",
            ReferenceStatus::Released => "release",
        };
        Self {
            id: data.id,
            record: data.record,
            kind: kind.to_string(),
        }
    }
}

/// Receives announce events for schema service records.
pub trait SchemaAnnounceHandler: Send + Sync {
    fn on_announce(&self, record: &Record);
}

impl<F> SchemaAnnounceHandler for F
where
    F: Fn(&Record) + Send + Sync,
{
    fn on_announce(&self, record: &Record) {
        self(record)
    }
}

/// Receives usage events for schema service records.
pub trait SchemaUsageHandler: Send + Sync {
    fn on_usage(&self, usage: &SchemaReferenceData);
}

impl<F> SchemaUsageHandler for F
where
    F: Fn(&SchemaReferenceData) + Send + Sync,
{
    fn on_usage(&self, usage: &SchemaReferenceData) {
        self(usage)
    }
}

/// Called when a published schema becomes available.
pub trait SchemaPublishedHandler: Send + Sync {
    fn on_published(&self, registration: &SchemaRegistration);
}

impl<F> SchemaPublishedHandler for F
where
    F: Fn(&SchemaRegistration) + Send + Sync,
{
    fn on_published(&self, registration: &SchemaRegistration) {
        self(registration)
    }
}

/// Called when a published schema stops being available.
pub trait SchemaUnpublishedHandler: Send + Sync {
    fn on_unpublished(&self, registration: &SchemaRegistration);
}

impl<F> SchemaUnpublishedHandler for F
where
    F: Fn(&SchemaRegistration) + Send + Sync,
{
    fn on_unpublished(&self, registration: &SchemaRegistration) {
        self(registration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_usage_wire_shape() {
        let record = Record::schema_service("DroidQueries", "service.graphql.DroidQueries");
        let data = SchemaReferenceData::bound("ref-1", record);

        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["id"], "ref-1");
        assert_eq!(json["type"], "bind");
        assert_eq!(json["record"]["name"], "DroidQueries");

        let parsed: SchemaReferenceData = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, data);
    }

    #[test]
    fn test_unknown_type_reads_as_released() {
        let parsed: SchemaReferenceData =
            serde_json::from_value(json!({"id": "x", "record": {"name": "A"}, "type": "unbind"}))
                .unwrap();
        assert_eq!(parsed.status(), ReferenceStatus::Released);

        let missing: SchemaReferenceData = serde_json::from_value(json!({"id": "x"})).unwrap();
        assert_eq!(missing.status(), ReferenceStatus::Released);
    }

    #[test]
    fn test_equality_ignores_location_and_metadata() {
        let a = Record::schema_service("A", "service.graphql.A");
        let mut b = Record::schema_service("A", "somewhere.else");
        b.metadata.insert("queries".into(), json!(["droid"]));

        assert_eq!(
            SchemaReferenceData::bound("1", a.clone()),
            SchemaReferenceData::bound("1", b)
        );
        assert_ne!(
            SchemaReferenceData::bound("1", a.clone()),
            SchemaReferenceData::released("1", a)
        );
    }

    #[test]
    fn test_closures_are_handlers() {
        let seen = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler = move |record: &Record| sink.lock().push(record.name.clone());

        handler.on_announce(&Record::schema_service("A", "a"));
        assert_eq!(*seen.lock(), vec!["A".to_string()]);
    }
}
