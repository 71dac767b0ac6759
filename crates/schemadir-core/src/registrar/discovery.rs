//! Consumer-side registrar: listening to directories without publishing.

use super::{Registered, Registrar, Registration};
use crate::bus::EventChannel;
use crate::config::DirectoryOptions;
use crate::directory::{CloseCallback, DirectoryProvider, ManagedDirectory};
use crate::events::{EventConsumers, SchemaAnnounceHandler, SchemaUsageHandler};
use std::sync::Arc;
use tracing::{debug, info};

/// A directory being listened to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiscoveryRegistration {
    base: Registration,
}

impl DiscoveryRegistration {
    pub fn directory(&self) -> &ManagedDirectory {
        self.base.directory()
    }

    pub fn options(&self) -> DirectoryOptions {
        self.base.options()
    }
}

impl Registered for DiscoveryRegistration {
    fn registration(&self) -> &Registration {
        &self.base
    }
}

struct DiscoveryInner {
    base: Registrar<DiscoveryRegistration>,
    consumers: EventConsumers,
}

/// Tracks the directories a consumer listens to.
///
/// Closing a directory handle obtained here stops listening to it.
#[derive(Clone)]
pub struct DiscoveryRegistrar {
    inner: Arc<DiscoveryInner>,
}

impl DiscoveryRegistrar {
    pub fn new(bus: Arc<dyn EventChannel>, provider: Arc<dyn DirectoryProvider>) -> Self {
        Self {
            inner: Arc::new(DiscoveryInner {
                base: Registrar::new(provider),
                consumers: EventConsumers::new(bus),
            }),
        }
    }

    /// Listen for announce and usage events of the directory in `options`.
    ///
    /// Listening to a directory name already listened to returns the
    /// existing registration and leaves the handlers unchanged.
    pub fn start_listening(
        &self,
        options: &DirectoryOptions,
        announce: Arc<dyn SchemaAnnounceHandler>,
        usage: Arc<dyn SchemaUsageHandler>,
    ) -> DiscoveryRegistration {
        let options = self.inner.base.resolve_options(options);
        let name = options.name().unwrap_or_default().to_string();
        if let Some(existing) = self.find(&name) {
            debug!("Already listening to {}", name);
            return existing;
        }

        let weak = Arc::downgrade(&self.inner);
        let close_options = options.clone();
        let on_close: CloseCallback = Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                DiscoveryRegistrar { inner }.stop_listening(&close_options);
            }
        });
        let directory = self
            .inner
            .base
            .get_or_create_directory(&options, Some(on_close));

        self.inner
            .consumers
            .register_announce_consumer(&options.announce_address, announce);
        self.inner
            .consumers
            .register_usage_consumer(&options.usage_address, usage);

        let registration = DiscoveryRegistration {
            base: Registration::new(directory, &options),
        };
        if !self.inner.base.register(registration.clone()) {
            // Lost a race with a concurrent start on the same name.
            self.inner
                .consumers
                .unregister_consumer(&options.announce_address);
            self.inner
                .consumers
                .unregister_consumer(&options.usage_address);
            if let Some(existing) = self.find(&name) {
                return existing;
            }
        }
        info!("Started listening to {}", name);
        registration
    }

    /// Stop listening to the directory in `options` and close it.
    ///
    /// Returns false if it was not being listened to.
    pub fn stop_listening(&self, options: &DirectoryOptions) -> bool {
        let options = self.inner.base.resolve_options(options);
        let name = options.name().unwrap_or_default();
        let Some(registration) = self.find(name) else {
            return false;
        };
        if !self.inner.base.unregister(&registration) {
            return false;
        }

        let base = registration.registration();
        self.inner
            .consumers
            .unregister_consumer(base.announce_address());
        self.inner.consumers.unregister_consumer(base.usage_address());
        info!("Stopped listening to {}", name);
        true
    }

    /// Stop listening everywhere.
    pub fn close(&self) {
        for registration in self.inner.base.registrations() {
            self.stop_listening(&registration.options());
        }
        self.inner.consumers.close();
        self.inner.base.close();
    }

    pub fn get_directory(&self, name: &str) -> Option<ManagedDirectory> {
        self.inner.base.get_directory(name)
    }

    pub fn directory_names(&self) -> Vec<String> {
        self.inner.base.directory_names()
    }

    pub fn registrations(&self) -> Vec<DiscoveryRegistration> {
        self.inner.base.registrations()
    }

    pub fn consumers(&self) -> &EventConsumers {
        &self.inner.consumers
    }

    fn find(&self, name: &str) -> Option<DiscoveryRegistration> {
        self.inner
            .base
            .find_registration(|r| r.directory_name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::LocalEventBus;
    use crate::directory::{Directory, LocalDirectoryProvider};
    use crate::events::SchemaReferenceData;
    use crate::record::Record;

    struct Fixture {
        bus: Arc<LocalEventBus>,
        provider: Arc<LocalDirectoryProvider>,
        registrar: DiscoveryRegistrar,
    }

    fn fixture() -> Fixture {
        let bus = Arc::new(LocalEventBus::new());
        let provider = Arc::new(LocalDirectoryProvider::new(bus.clone()));
        let registrar = DiscoveryRegistrar::new(bus.clone(), provider.clone());
        Fixture {
            bus,
            provider,
            registrar,
        }
    }

    fn listen(registrar: &DiscoveryRegistrar, name: &str) -> DiscoveryRegistration {
        registrar.start_listening(
            &DirectoryOptions::named(name),
            Arc::new(|_: &Record| {}),
            Arc::new(|_: &SchemaReferenceData| {}),
        )
    }

    #[tokio::test]
    async fn test_start_listening_is_idempotent() {
        let fixture = fixture();
        let first = listen(&fixture.registrar, "D");
        let second = listen(&fixture.registrar, "D");

        assert_eq!(first, second);
        assert_eq!(fixture.registrar.registrations().len(), 1);
        assert_eq!(fixture.provider.open_instances("D"), 1);
        assert_eq!(fixture.bus.subscriber_count("discovery.announce"), 1);
        assert_eq!(fixture.registrar.consumers().interest("discovery.announce"), 1);
    }

    #[tokio::test]
    async fn test_stop_listening_closes_directory() {
        let fixture = fixture();
        listen(&fixture.registrar, "D");
        listen(&fixture.registrar, "E");
        assert_eq!(fixture.registrar.consumers().interest("discovery.usage"), 2);

        assert!(fixture.registrar.stop_listening(&DirectoryOptions::named("D")));
        assert!(!fixture.registrar.stop_listening(&DirectoryOptions::named("D")));
        assert_eq!(fixture.registrar.directory_names(), vec!["E".to_string()]);
        assert_eq!(fixture.provider.open_instances("D"), 0);
        assert_eq!(fixture.bus.subscriber_count("discovery.usage"), 1);
    }

    #[tokio::test]
    async fn test_closing_the_handle_stops_listening() {
        let fixture = fixture();
        let registration = listen(&fixture.registrar, "D");

        registration.directory().close();
        assert!(fixture.registrar.registrations().is_empty());
        assert!(fixture.registrar.get_directory("D").is_none());
        assert_eq!(fixture.provider.open_instances("D"), 0);
        assert_eq!(fixture.bus.subscriber_count("discovery.announce"), 0);
    }

    #[tokio::test]
    async fn test_close_stops_everything() {
        let fixture = fixture();
        listen(&fixture.registrar, "D");
        listen(&fixture.registrar, "E");

        fixture.registrar.close();
        assert!(fixture.registrar.registrations().is_empty());
        assert!(fixture.registrar.directory_names().is_empty());
        assert!(fixture.bus.addresses().is_empty());
    }
}
