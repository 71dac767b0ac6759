//! Publishing a schema as a queryable service in a directory.
//!
//! This works without a registrar. When the metadata names a publisher, the
//! publisher's registrar binds the query-handling subscription instead.

use crate::bus::{EventChannel, Subscription};
use crate::config::ServiceConfig;
use crate::directory::{Directory, ManagedDirectory};
use crate::error::{RegistrarError, Result};
use crate::events::service_call_handler;
use crate::record::Record;
use crate::schema::{SchemaDefinition, SchemaMetadata};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// A schema record published to a directory.
///
/// `subscription` is set only when this module bound the query handler itself.
#[derive(Debug, Clone)]
pub struct PublishedSchema {
    pub directory: ManagedDirectory,
    pub record: Record,
    pub definition: Arc<SchemaDefinition>,
    pub subscription: Option<Subscription>,
}

/// Build the record that describes `definition`.
pub fn build_record(definition: &SchemaDefinition, metadata: &SchemaMetadata) -> Record {
    let mut record = Record::schema_service(definition.schema_name(), definition.service_address());
    record.metadata = metadata.to_record_metadata();

    let schema = definition.schema();
    let queries = schema.query_fields().into_iter().map(Value::String).collect();
    let mutations = schema
        .mutation_fields()
        .unwrap_or_default()
        .into_iter()
        .map(Value::String)
        .collect();
    record
        .metadata
        .insert(ServiceConfig::QUERIES_KEY.to_string(), Value::Array(queries));
    record
        .metadata
        .insert(ServiceConfig::MUTATIONS_KEY.to_string(), Value::Array(mutations));
    record
}

/// Publish `definition` to `directory`.
pub async fn publish(
    bus: &Arc<dyn EventChannel>,
    directory: &ManagedDirectory,
    definition: Arc<SchemaDefinition>,
    metadata: &SchemaMetadata,
) -> Result<PublishedSchema> {
    let record = directory
        .publish(build_record(&definition, metadata))
        .await?;

    let subscription = if record.publisher_id().is_none() {
        let address = definition.service_address();
        Some(bus.subscribe(&address, service_call_handler(definition.clone())))
    } else {
        None
    };

    info!(
        "Published schema {} to {}",
        record.name,
        directory.name()
    );
    Ok(PublishedSchema {
        directory: directory.clone(),
        record,
        definition,
        subscription,
    })
}

/// Remove a published schema and release a binding made by [`publish`].
pub async fn unpublish(bus: &Arc<dyn EventChannel>, published: &PublishedSchema) -> Result<()> {
    let registration = published.record.registration.as_deref().ok_or_else(|| {
        RegistrarError::RecordNotRegistered {
            name: published.record.name.clone(),
        }
    })?;
    published.directory.unpublish(registration).await?;

    if let Some(subscription) = &published.subscription {
        bus.unsubscribe(subscription);
    }
    info!(
        "Unpublished schema {} from {}",
        published.record.name,
        published.directory.name()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::LocalEventBus;
    use crate::config::DirectoryOptions;
    use crate::directory::{DirectoryProvider, LocalDirectoryProvider};
    use crate::query::{ExecutionResult, Queryable, SchemaProxy};
    use crate::schema::QuerySchema;

    struct Greeting;

    impl QuerySchema for Greeting {
        fn query_type_name(&self) -> &str {
            "GreetingQueries"
        }

        fn query_fields(&self) -> Vec<String> {
            vec!["hello".to_string()]
        }

        fn mutation_fields(&self) -> Option<Vec<String>> {
            Some(vec!["setGreeting".to_string()])
        }

        fn execute(
            &self,
            _query: &str,
            _variables: Option<&Value>,
        ) -> anyhow::Result<ExecutionResult> {
            let mut data = serde_json::Map::new();
            data.insert("hello".into(), Value::String("world".into()));
            Ok(ExecutionResult::with_data(data))
        }
    }

    fn setup() -> (Arc<dyn EventChannel>, ManagedDirectory) {
        let bus: Arc<dyn EventChannel> = Arc::new(LocalEventBus::new());
        let provider = LocalDirectoryProvider::new(bus.clone());
        let directory =
            ManagedDirectory::unmanaged(provider.create_directory(&DirectoryOptions::named("D")));
        (bus, directory)
    }

    #[test]
    fn test_record_lists_queries_and_mutations() {
        let definition = SchemaDefinition::new(Arc::new(Greeting));
        let record = build_record(&definition, &SchemaMetadata::new().with_entry("team", "x"));

        assert_eq!(record.name, "GreetingQueries");
        assert_eq!(record.endpoint(), Some("service.graphql.GreetingQueries"));
        assert_eq!(record.metadata["queries"], serde_json::json!(["hello"]));
        assert_eq!(record.metadata["mutations"], serde_json::json!(["setGreeting"]));
        assert_eq!(record.metadata["team"], "x");
    }

    #[tokio::test]
    async fn test_standalone_publish_binds_and_unbinds() {
        let (bus, directory) = setup();
        let definition = Arc::new(SchemaDefinition::new(Arc::new(Greeting)));

        let published = publish(&bus, &directory, definition, &SchemaMetadata::new())
            .await
            .unwrap();
        assert!(published.subscription.is_some());

        let proxy = SchemaProxy::new(bus.clone(), "service.graphql.GreetingQueries");
        let result = proxy.query("{ hello }").await.unwrap();
        assert_eq!(result.data()["hello"], "world");

        unpublish(&bus, &published).await.unwrap();
        assert_eq!(bus.subscriber_count("service.graphql.GreetingQueries"), 0);
    }

    #[tokio::test]
    async fn test_publisher_owned_binding_is_not_made_here() {
        let (bus, directory) = setup();
        let definition = Arc::new(SchemaDefinition::new(Arc::new(Greeting)));
        let metadata = SchemaMetadata::new().with_entry(ServiceConfig::PUBLISHER_ID_KEY, "p-1");

        let published = publish(&bus, &directory, definition, &metadata).await.unwrap();
        assert!(published.subscription.is_none());
        assert_eq!(published.record.publisher_id(), Some("p-1"));
        assert_eq!(bus.subscriber_count("service.graphql.GreetingQueries"), 0);
    }
}
