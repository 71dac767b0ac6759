//! Address-based event channel.
//!
//! Messages are [`Envelope`]s tagged with their kind, so consumers dispatch
//! with a `match` instead of inspecting payload fields.

mod local;

pub use local::LocalEventBus;

use crate::error::Result;
use crate::events::SchemaReferenceData;
use crate::query::QueryResult;
use crate::record::Record;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Callback invoked for every envelope delivered to a subscription.
pub type EnvelopeHandler = Arc<dyn Fn(Envelope) + Send + Sync>;

/// A message on the event channel.
#[derive(Clone)]
pub enum Envelope {
    /// A record's publication state changed.
    Announce(Record),
    /// A reference to a record was bound or released.
    Usage(SchemaReferenceData),
    /// A query for the service bound at the destination address.
    ServiceCall(ServiceCall),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvelopeKind {
    Announce,
    Usage,
    ServiceCall,
}

impl Envelope {
    pub fn kind(&self) -> EnvelopeKind {
        match self {
            Envelope::Announce(_) => EnvelopeKind::Announce,
            Envelope::Usage(_) => EnvelopeKind::Usage,
            Envelope::ServiceCall(_) => EnvelopeKind::ServiceCall,
        }
    }
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Envelope::Announce(record) => f.debug_tuple("Announce").field(record).finish(),
            Envelope::Usage(usage) => f.debug_tuple("Usage").field(usage).finish(),
            Envelope::ServiceCall(call) => f.debug_tuple("ServiceCall").field(call).finish(),
        }
    }
}

/// Request half of a query sent to a bound service.
///
/// The reply slot is single-use: the first `reply` wins and later ones are
/// ignored. Clones share the slot.
#[derive(Clone)]
pub struct ServiceCall {
    query: String,
    variables: Option<Value>,
    reply: Arc<Mutex<Option<oneshot::Sender<Result<QueryResult>>>>>,
}

impl ServiceCall {
    pub fn new(
        query: impl Into<String>,
        variables: Option<Value>,
    ) -> (Self, oneshot::Receiver<Result<QueryResult>>) {
        let (tx, rx) = oneshot::channel();
        let call = Self {
            query: query.into(),
            variables,
            reply: Arc::new(Mutex::new(Some(tx))),
        };
        (call, rx)
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn variables(&self) -> Option<&Value> {
        self.variables.as_ref()
    }

    /// Send the reply. Returns false if already replied or nobody is waiting.
    pub fn reply(&self, result: Result<QueryResult>) -> bool {
        match self.reply.lock().take() {
            Some(tx) => tx.send(result).is_ok(),
            None => false,
        }
    }
}

impl std::fmt::Debug for ServiceCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceCall")
            .field("query", &self.query)
            .field("variables", &self.variables)
            .finish_non_exhaustive()
    }
}

/// Handle to one subscription on one address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    id: Uuid,
    address: String,
}

impl Subscription {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            address: address.into(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

/// Publish/subscribe transport keyed by string address.
///
/// Handlers run asynchronously relative to `publish` and `send`, in FIFO
/// order per subscription.
pub trait EventChannel: Send + Sync {
    /// Register `handler` for messages on `address`.
    fn subscribe(&self, address: &str, handler: EnvelopeHandler) -> Subscription;

    /// Remove a subscription. Messages not yet handled are dropped.
    ///
    /// Returns false if the subscription was not live.
    fn unsubscribe(&self, subscription: &Subscription) -> bool;

    /// Deliver to every subscriber of `address`; returns how many were reached.
    fn publish(&self, address: &str, envelope: Envelope) -> usize;

    /// Deliver to a single subscriber of `address`; returns false if there is none.
    fn send(&self, address: &str, envelope: Envelope) -> bool;

    fn subscriber_count(&self, address: &str) -> usize;

    fn is_subscribed(&self, subscription: &Subscription) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_kind() {
        let (call, _rx) = ServiceCall::new("{ a }", None);
        assert_eq!(Envelope::ServiceCall(call).kind(), EnvelopeKind::ServiceCall);
        assert_eq!(
            Envelope::Announce(Record::default()).kind(),
            EnvelopeKind::Announce
        );
    }

    #[tokio::test]
    async fn test_service_call_replies_once() {
        let (call, rx) = ServiceCall::new("{ a }", None);
        let copy = call.clone();

        assert!(call.reply(Ok(QueryResult::default())));
        assert!(!copy.reply(Ok(QueryResult::default())));
        assert!(rx.await.unwrap().is_ok());
    }

    #[test]
    fn test_reply_without_receiver() {
        let (call, rx) = ServiceCall::new("{ a }", None);
        drop(rx);
        assert!(!call.reply(Ok(QueryResult::default())));
    }

    #[test]
    fn test_subscriptions_are_distinct() {
        let a = Subscription::new("addr");
        let b = Subscription::new("addr");
        assert_ne!(a, b);
        assert_eq!(a.address(), b.address());
    }
}
