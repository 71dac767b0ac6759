//! Consumer facade: discover schemas in directories and query them.

use crate::bus::EventChannel;
use crate::client;
use crate::config::DirectoryOptions;
use crate::directory::{Directory, DirectoryProvider, ManagedDirectory};
use crate::error::{RegistrarError, Result};
use crate::events::{SchemaAnnounceHandler, SchemaReferenceData, SchemaUsageHandler};
use crate::query::QueryResult;
use crate::record::Record;
use crate::registrar::{DiscoveryRegistrar, DiscoveryRegistration};
use serde_json::Value;
use std::sync::Arc;

/// Discovers published schemas and routes queries to them.
#[derive(Clone)]
pub struct SchemaConsumer {
    registrar: DiscoveryRegistrar,
    on_announce: Arc<dyn SchemaAnnounceHandler>,
    on_usage: Arc<dyn SchemaUsageHandler>,
}

impl SchemaConsumer {
    pub fn new(bus: Arc<dyn EventChannel>, provider: Arc<dyn DirectoryProvider>) -> Self {
        Self {
            registrar: DiscoveryRegistrar::new(bus, provider),
            on_announce: Arc::new(|_: &Record| {}),
            on_usage: Arc::new(|_: &SchemaReferenceData| {}),
        }
    }

    /// Called for announce events in every directory started afterwards.
    pub fn on_announce(mut self, handler: impl SchemaAnnounceHandler + 'static) -> Self {
        self.on_announce = Arc::new(handler);
        self
    }

    /// Called for usage events in every directory started afterwards.
    pub fn on_usage(mut self, handler: impl SchemaUsageHandler + 'static) -> Self {
        self.on_usage = Arc::new(handler);
        self
    }

    pub fn registrar(&self) -> &DiscoveryRegistrar {
        &self.registrar
    }

    pub fn start_discovery(&self, options: &DirectoryOptions) -> DiscoveryRegistration {
        self.registrar
            .start_listening(options, self.on_announce.clone(), self.on_usage.clone())
    }

    pub fn stop_discovery(&self, options: &DirectoryOptions) -> bool {
        self.registrar.stop_listening(options)
    }

    pub fn close(&self) {
        self.registrar.close();
    }

    /// Query the schema `schema_name` in the discovered directory `directory_name`.
    pub async fn execute_query(
        &self,
        directory_name: &str,
        schema_name: &str,
        query: &str,
        variables: Option<Value>,
    ) -> Result<QueryResult> {
        let directory = self.registrar.get_directory(directory_name).ok_or_else(|| {
            RegistrarError::DirectoryNotManaged {
                directory: directory_name.to_string(),
            }
        })?;

        let record = directory
            .get_record(&|record: &Record| {
                record.name == schema_name && record.is_schema_service()
            })
            .await?
            .ok_or_else(|| RegistrarError::SchemaNotFound {
                schema: schema_name.to_string(),
                directory: directory_name.to_string(),
            })?;

        client::execute_query(&directory, &record, query, variables).await
    }

    pub fn managed_directories(&self) -> Vec<String> {
        self.registrar.directory_names()
    }

    pub fn get_directory(&self, name: &str) -> Option<ManagedDirectory> {
        self.registrar.get_directory(name)
    }
}
