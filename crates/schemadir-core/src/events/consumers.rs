//! Address-deduplicated event subscriptions with reference-counted interest.

use super::{SchemaAnnounceHandler, SchemaUsageHandler};
use crate::bus::{Envelope, EnvelopeHandler, EventChannel, Subscription};
use crate::schema::SchemaDefinition;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

struct ConsumerEntry {
    subscription: Subscription,
    interest: usize,
}

/// Owns at most one live subscription per address.
///
/// Each `register_*` call on an address adds one unit of interest; the
/// subscription is torn down when the matching number of
/// [`unregister_consumer`](Self::unregister_consumer) calls has been made.
/// Only the handler of the first registration on an address is wired.
pub struct EventConsumers {
    bus: Arc<dyn EventChannel>,
    consumers: Mutex<HashMap<String, ConsumerEntry>>,
}

impl EventConsumers {
    pub fn new(bus: Arc<dyn EventChannel>) -> Self {
        Self {
            bus,
            consumers: Mutex::new(HashMap::new()),
        }
    }

    /// Listen for announce events of schema service records on `address`.
    pub fn register_announce_consumer(
        &self,
        address: &str,
        handler: Arc<dyn SchemaAnnounceHandler>,
    ) -> Subscription {
        self.register_with(address, move || -> EnvelopeHandler {
            Arc::new(move |envelope: Envelope| match envelope {
                Envelope::Announce(record) if record.is_schema_service() => {
                    handler.on_announce(&record)
                }
                _ => {}
            })
        })
    }

    /// Listen for usage events of schema service records on `address`.
    pub fn register_usage_consumer(
        &self,
        address: &str,
        handler: Arc<dyn SchemaUsageHandler>,
    ) -> Subscription {
        self.register_with(address, move || -> EnvelopeHandler {
            Arc::new(move |envelope: Envelope| match envelope {
                Envelope::Usage(usage) if usage.record().is_schema_service() => {
                    handler.on_usage(&usage)
                }
                _ => {}
            })
        })
    }

    /// Bind `definition` to answer service calls on `address`.
    ///
    /// Returns the existing binding if the address is already bound.
    pub fn register_service_consumer(
        &self,
        address: &str,
        definition: Arc<SchemaDefinition>,
    ) -> Subscription {
        self.register_with(address, move || service_call_handler(definition))
    }

    /// Drop one unit of interest in `address`.
    ///
    /// Returns true if this tore the subscription down.
    pub fn unregister_consumer(&self, address: &str) -> bool {
        let mut consumers = self.consumers.lock();
        let Some(entry) = consumers.get_mut(address) else {
            return false;
        };

        entry.interest = entry.interest.saturating_sub(1);
        if entry.interest > 0 {
            debug!(
                "Released interest in {} ({} remaining)",
                address, entry.interest
            );
            return false;
        }

        if let Some(entry) = consumers.remove(address) {
            self.bus.unsubscribe(&entry.subscription);
            debug!("Removed consumer for {}", address);
        }
        true
    }

    /// Tear down every subscription regardless of interest.
    pub fn close(&self) {
        let drained: Vec<ConsumerEntry> = self.consumers.lock().drain().map(|(_, e)| e).collect();
        for entry in drained {
            self.bus.unsubscribe(&entry.subscription);
        }
    }

    pub fn subscription(&self, address: &str) -> Option<Subscription> {
        self.consumers
            .lock()
            .get(address)
            .map(|entry| entry.subscription.clone())
    }

    pub fn interest(&self, address: &str) -> usize {
        self.consumers.lock().get(address).map_or(0, |e| e.interest)
    }

    /// Addresses with a live subscription, sorted.
    pub fn addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.consumers.lock().keys().cloned().collect();
        addresses.sort();
        addresses
    }

    fn register_with(
        &self,
        address: &str,
        make_handler: impl FnOnce() -> EnvelopeHandler,
    ) -> Subscription {
        let mut consumers = self.consumers.lock();
        if let Some(entry) = consumers.get_mut(address) {
            entry.interest += 1;
            return entry.subscription.clone();
        }

        let subscription = self.bus.subscribe(address, make_handler());
        consumers.insert(
            address.to_string(),
            ConsumerEntry {
                subscription: subscription.clone(),
                interest: 1,
            },
        );
        debug!("Created consumer for {}", address);
        subscription
    }
}

/// Handler that answers service calls with `definition`.
pub(crate) fn service_call_handler(definition: Arc<SchemaDefinition>) -> EnvelopeHandler {
    Arc::new(move |envelope: Envelope| {
        if let Envelope::ServiceCall(call) = envelope {
            let result = definition.query_blocking(call.query(), call.variables());
            if !call.reply(result) {
                warn!(
                    "Caller of {} went away before the reply",
                    definition.service_address()
                );
            }
        }
    })
}
