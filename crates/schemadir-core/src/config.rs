//! Centralized configuration for the schema directory registrar.
//!
//! This module provides the well-known addresses, metadata keys and timeouts
//! shared by publishers and consumers, plus the options used to create or
//! look up a directory.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Directory naming and event addresses.
pub struct DiscoveryConfig;

impl DiscoveryConfig {
    /// Directory name used when no name is given and the runtime is not clustered.
    pub const LOCAL_NODE_NAME: &'static str = "localhost";
    pub const DEFAULT_ANNOUNCE_ADDRESS: &'static str = "discovery.announce";
    pub const DEFAULT_USAGE_ADDRESS: &'static str = "discovery.usage";
}

/// Schema service records and service calls.
pub struct ServiceConfig;

impl ServiceConfig {
    /// Record type of every published schema.
    pub const SERVICE_TYPE: &'static str = "graphql-service";
    pub const ADDRESS_PREFIX: &'static str = "service.graphql";
    pub const ENDPOINT_KEY: &'static str = "endpoint";
    pub const PUBLISHER_ID_KEY: &'static str = "publisherId";
    pub const QUERIES_KEY: &'static str = "queries";
    pub const MUTATIONS_KEY: &'static str = "mutations";
    /// Record metadata entry overriding [`SEND_TIMEOUT`](Self::SEND_TIMEOUT), in milliseconds.
    pub const SEND_TIMEOUT_KEY: &'static str = "sendTimeoutMs";
    /// How long a proxy waits for the reply to a service call.
    pub const SEND_TIMEOUT: Duration = Duration::from_secs(30);
}

/// Options used to create (or find) a directory.
///
/// Only `name` takes part in registration identity; the addresses and the
/// backend configuration are incidental.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default = "default_announce_address")]
    pub announce_address: String,
    #[serde(default = "default_usage_address")]
    pub usage_address: String,
    #[serde(default)]
    pub backend_configuration: Map<String, Value>,
}

fn default_announce_address() -> String {
    DiscoveryConfig::DEFAULT_ANNOUNCE_ADDRESS.to_string()
}

fn default_usage_address() -> String {
    DiscoveryConfig::DEFAULT_USAGE_ADDRESS.to_string()
}

impl Default for DirectoryOptions {
    fn default() -> Self {
        Self {
            name: None,
            announce_address: default_announce_address(),
            usage_address: default_usage_address(),
            backend_configuration: Map::new(),
        }
    }
}

impl DirectoryOptions {
    /// Options for a directory with the given name and default addresses.
    pub fn named(name: impl Into<String>) -> Self {
        Self::default().with_name(name)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_announce_address(mut self, address: impl Into<String>) -> Self {
        self.announce_address = address.into();
        self
    }

    pub fn with_usage_address(mut self, address: impl Into<String>) -> Self {
        self.usage_address = address.into();
        self
    }

    pub fn with_backend_configuration(mut self, configuration: Map<String, Value>) -> Self {
        self.backend_configuration = configuration;
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}
