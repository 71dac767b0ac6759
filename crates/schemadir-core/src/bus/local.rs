//! In-process event channel backed by tokio tasks.

use super::{Envelope, EnvelopeHandler, EventChannel, Subscription};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

struct Route {
    subscription: Subscription,
    tx: mpsc::UnboundedSender<Envelope>,
    active: Arc<AtomicBool>,
}

/// Event channel for a single process.
///
/// Each subscription owns an unbounded queue drained by a spawned task, so
/// `subscribe` must be called from within a tokio runtime.
#[derive(Default)]
pub struct LocalEventBus {
    routes: Mutex<HashMap<String, Vec<Route>>>,
}

impl LocalEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Addresses with at least one subscriber, sorted.
    pub fn addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.routes.lock().keys().cloned().collect();
        addresses.sort();
        addresses
    }
}

impl EventChannel for LocalEventBus {
    fn subscribe(&self, address: &str, handler: EnvelopeHandler) -> Subscription {
        let subscription = Subscription::new(address);
        let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
        let active = Arc::new(AtomicBool::new(true));

        let task_active = active.clone();
        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                if !task_active.load(Ordering::Acquire) {
                    break;
                }
                handler(envelope);
            }
        });

        self.routes
            .lock()
            .entry(address.to_string())
            .or_default()
            .push(Route {
                subscription: subscription.clone(),
                tx,
                active,
            });
        debug!("Subscribed {} to {}", subscription.id(), address);
        subscription
    }

    fn unsubscribe(&self, subscription: &Subscription) -> bool {
        let mut routes = self.routes.lock();
        let Some(list) = routes.get_mut(subscription.address()) else {
            return false;
        };
        let Some(position) = list.iter().position(|r| &r.subscription == subscription) else {
            return false;
        };

        let route = list.remove(position);
        route.active.store(false, Ordering::Release);
        if list.is_empty() {
            routes.remove(subscription.address());
        }
        debug!(
            "Unsubscribed {} from {}",
            subscription.id(),
            subscription.address()
        );
        true
    }

    fn publish(&self, address: &str, envelope: Envelope) -> usize {
        let routes = self.routes.lock();
        let Some(list) = routes.get(address) else {
            return 0;
        };
        list.iter()
            .filter(|route| route.tx.send(envelope.clone()).is_ok())
            .count()
    }

    fn send(&self, address: &str, envelope: Envelope) -> bool {
        let routes = self.routes.lock();
        let Some(list) = routes.get(address) else {
            return false;
        };
        let mut envelope = Some(envelope);
        for route in list {
            let Some(message) = envelope.take() else {
                break;
            };
            match route.tx.send(message) {
                Ok(()) => return true,
                Err(mpsc::error::SendError(returned)) => envelope = Some(returned),
            }
        }
        false
    }

    fn subscriber_count(&self, address: &str) -> usize {
        self.routes.lock().get(address).map_or(0, Vec::len)
    }

    fn is_subscribed(&self, subscription: &Subscription) -> bool {
        self.routes
            .lock()
            .get(subscription.address())
            .is_some_and(|list| list.iter().any(|r| &r.subscription == subscription))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use std::time::Duration;

    fn forwarding(tx: mpsc::UnboundedSender<String>) -> EnvelopeHandler {
        Arc::new(move |envelope: Envelope| {
            if let Envelope::Announce(record) = envelope {
                let _ = tx.send(record.name);
            }
        })
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<String>) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber_in_order() {
        let bus = LocalEventBus::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        bus.subscribe("addr", forwarding(tx_a));
        bus.subscribe("addr", forwarding(tx_b));

        for name in ["one", "two"] {
            let record = Record {
                name: name.into(),
                ..Default::default()
            };
            assert_eq!(bus.publish("addr", Envelope::Announce(record)), 2);
        }

        assert_eq!(next(&mut rx_a).await.as_deref(), Some("one"));
        assert_eq!(next(&mut rx_a).await.as_deref(), Some("two"));
        assert_eq!(next(&mut rx_b).await.as_deref(), Some("one"));
        assert_eq!(next(&mut rx_b).await.as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn test_send_reaches_one_subscriber() {
        let bus = LocalEventBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.subscribe("addr", forwarding(tx.clone()));
        bus.subscribe("addr", forwarding(tx));

        assert!(bus.send("addr", Envelope::Announce(Record::default())));
        assert!(next(&mut rx).await.is_some());
        assert!(tokio::time::timeout(Duration::from_millis(50), rx.recv())
            .await
            .is_err());
        assert!(!bus.send("nobody", Envelope::Announce(Record::default())));
    }

    #[tokio::test]
    async fn test_unsubscribe_by_handle() {
        let bus = LocalEventBus::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let first = bus.subscribe("addr", forwarding(tx.clone()));
        let second = bus.subscribe("addr", forwarding(tx));

        assert!(bus.unsubscribe(&first));
        assert!(!bus.unsubscribe(&first));
        assert!(!bus.is_subscribed(&first));
        assert!(bus.is_subscribed(&second));
        assert_eq!(bus.subscriber_count("addr"), 1);

        assert!(bus.unsubscribe(&second));
        assert_eq!(bus.subscriber_count("addr"), 0);
        assert!(bus.addresses().is_empty());
    }
}
