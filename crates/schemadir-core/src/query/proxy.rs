//! Remote query target reached over the event channel.

use super::queryable::Queryable;
use super::result::QueryResult;
use crate::bus::{Envelope, EventChannel, ServiceCall};
use crate::config::ServiceConfig;
use crate::error::{RegistrarError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Sends queries to the service bound at an address and awaits the reply.
#[derive(Clone)]
pub struct SchemaProxy {
    bus: Arc<dyn EventChannel>,
    address: String,
    timeout: Duration,
}

impl SchemaProxy {
    pub fn new(bus: Arc<dyn EventChannel>, address: impl Into<String>) -> Self {
        Self {
            bus,
            address: address.into(),
            timeout: ServiceConfig::SEND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl std::fmt::Debug for SchemaProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaProxy")
            .field("address", &self.address)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[async_trait]
impl Queryable for SchemaProxy {
    async fn query_with_variables(
        &self,
        query: &str,
        variables: Option<Value>,
    ) -> Result<QueryResult> {
        let (call, reply) = ServiceCall::new(query, variables);
        debug!("Dispatching query to {}", self.address);

        let no_handlers = || RegistrarError::NoHandlers {
            address: self.address.clone(),
        };
        if !self.bus.send(&self.address, Envelope::ServiceCall(call)) {
            return Err(no_handlers());
        }

        match tokio::time::timeout(self.timeout, reply).await {
            Ok(Ok(result)) => result,
            // The call was dropped unanswered.
            Ok(Err(_)) => Err(no_handlers()),
            Err(_) => Err(RegistrarError::Timeout(self.timeout)),
        }
    }
}
