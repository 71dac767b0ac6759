//! Publisher-side registrar.

use super::{Registered, Registrar, Registration};
use crate::bus::{EventChannel, Subscription};
use crate::config::DirectoryOptions;
use crate::directory::{CloseCallback, DirectoryProvider, ManagedDirectory};
use crate::error::{RegistrarError, Result};
use crate::events::{EventConsumers, SchemaPublishedHandler, SchemaUnpublishedHandler};
use crate::record::Record;
use crate::schema::SchemaDefinition;
use crate::service::PublishedSchema;
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Published/unpublished handlers of one registration.
///
/// Each transition is reported once, however many announce events repeat it.
struct Notifier {
    on_published: Arc<dyn SchemaPublishedHandler>,
    on_unpublished: Arc<dyn SchemaUnpublishedHandler>,
    last_up: Mutex<Option<bool>>,
}

impl Notifier {
    fn notify(&self, registration: &SchemaRegistration, up: bool) {
        {
            let mut last_up = self.last_up.lock();
            if *last_up == Some(up) {
                return;
            }
            *last_up = Some(up);
        }
        if up {
            self.on_published.on_published(registration);
        } else {
            self.on_unpublished.on_unpublished(registration);
        }
    }
}

/// A schema published into a directory by a [`SchemaRegistrar`].
///
/// Equal to another registration when the base registrations are equal and
/// the record name, the query subscription and the root query type name
/// match.
#[derive(Clone)]
pub struct SchemaRegistration {
    base: Registration,
    record: Record,
    definition: Arc<SchemaDefinition>,
    subscription: Option<Subscription>,
    owns_binding: bool,
    notifier: Arc<Notifier>,
}

impl SchemaRegistration {
    pub fn directory(&self) -> &ManagedDirectory {
        self.base.directory()
    }

    pub fn options(&self) -> DirectoryOptions {
        self.base.options()
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn definition(&self) -> &Arc<SchemaDefinition> {
        &self.definition
    }

    /// Subscription that answers queries for this schema.
    pub fn subscription(&self) -> Option<&Subscription> {
        self.subscription.as_ref()
    }

    pub fn schema_name(&self) -> &str {
        &self.record.name
    }

    pub fn publisher_id(&self) -> Option<&str> {
        self.record.publisher_id()
    }

    fn endpoint(&self) -> String {
        self.record
            .endpoint()
            .map(str::to_string)
            .unwrap_or_else(|| self.definition.service_address())
    }

    /// Whether an announced record is this registration's record.
    fn matches_record(&self, record: &Record) -> bool {
        match (&record.registration, &self.record.registration) {
            (Some(announced), Some(own)) => announced == own,
            _ => record.name == self.record.name,
        }
    }
}

impl Registered for SchemaRegistration {
    fn registration(&self) -> &Registration {
        &self.base
    }
}

impl PartialEq for SchemaRegistration {
    fn eq(&self, other: &Self) -> bool {
        self.base == other.base
            && self.record.name == other.record.name
            && self.subscription == other.subscription
            && self.definition.query_type_name() == other.definition.query_type_name()
    }
}

impl Eq for SchemaRegistration {}

impl Hash for SchemaRegistration {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.base.hash(state);
        self.record.name.hash(state);
        self.subscription.hash(state);
        self.definition.query_type_name().hash(state);
    }
}

impl std::fmt::Debug for SchemaRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaRegistration")
            .field("directory", &self.base.directory_name())
            .field("schema", &self.record.name)
            .field("status", &self.record.status)
            .field("subscription", &self.subscription)
            .finish()
    }
}

/// A schema name held in a directory while its publication is in flight.
///
/// Keeps the directory open and the name taken. Dropping it gives the name
/// back and closes the directory if nothing else uses it, so it must outlive
/// the [`SchemaRegistrar::register`] call that tracks the publication.
pub struct PublishReservation {
    registrar: SchemaRegistrar,
    options: DirectoryOptions,
    schema_name: String,
    directory: ManagedDirectory,
}

impl PublishReservation {
    pub fn directory(&self) -> &ManagedDirectory {
        &self.directory
    }

    /// Options with the directory name resolved.
    pub fn options(&self) -> &DirectoryOptions {
        &self.options
    }

    pub fn schema_name(&self) -> &str {
        &self.schema_name
    }

    fn directory_name(&self) -> &str {
        self.options.name().unwrap_or_default()
    }
}

impl Drop for PublishReservation {
    fn drop(&mut self) {
        let inner = &self.registrar.inner;
        inner
            .reserved
            .lock()
            .remove(&(self.directory_name().to_string(), self.schema_name.clone()));
        if inner.base.release_pending(self.directory_name()) {
            debug!(
                "Released directory {} after failed publication of {}",
                self.directory_name(),
                self.schema_name
            );
        }
    }
}

impl std::fmt::Debug for PublishReservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishReservation")
            .field("directory", &self.directory_name())
            .field("schema", &self.schema_name)
            .finish()
    }
}

struct SchemaRegistrarInner {
    publisher_id: String,
    base: Registrar<SchemaRegistration>,
    /// (directory, schema) pairs with a publication in flight.
    reserved: Mutex<HashSet<(String, String)>>,
    consumers: EventConsumers,
    bus: Arc<dyn EventChannel>,
}

/// Tracks the schemas one publisher has put into directories.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SchemaRegistrar {
    inner: Arc<SchemaRegistrarInner>,
}

impl SchemaRegistrar {
    /// Registrar with a freshly generated publisher id.
    pub fn new(bus: Arc<dyn EventChannel>, provider: Arc<dyn DirectoryProvider>) -> Self {
        Self::with_publisher_id(bus, provider, Uuid::new_v4().to_string())
    }

    pub fn with_publisher_id(
        bus: Arc<dyn EventChannel>,
        provider: Arc<dyn DirectoryProvider>,
        publisher_id: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(SchemaRegistrarInner {
                publisher_id: publisher_id.into(),
                base: Registrar::new(provider),
                reserved: Mutex::new(HashSet::new()),
                consumers: EventConsumers::new(bus.clone()),
                bus,
            }),
        }
    }

    pub fn publisher_id(&self) -> &str {
        &self.inner.publisher_id
    }

    pub fn resolve_options(&self, options: &DirectoryOptions) -> DirectoryOptions {
        self.inner.base.resolve_options(options)
    }

    /// Managed directory for `options`; closing the handle is ignored.
    pub fn get_or_create_directory(&self, options: &DirectoryOptions) -> ManagedDirectory {
        self.inner
            .base
            .get_or_create_directory(options, Some(ignore_close()))
    }

    /// Take `schema_name` in the directory named by `options` before
    /// publishing it there.
    ///
    /// Fails with [`RegistrarError::AlreadyPublished`] if the name is
    /// registered or another publication of it is in flight.
    pub fn reserve(
        &self,
        options: &DirectoryOptions,
        schema_name: &str,
    ) -> Result<PublishReservation> {
        let options = self.resolve_options(options);
        let directory_name = options.name().unwrap_or_default().to_string();
        {
            let mut reserved = self.inner.reserved.lock();
            let key = (directory_name.clone(), schema_name.to_string());
            if reserved.contains(&key)
                || self.find_registration(&directory_name, schema_name).is_some()
            {
                return Err(RegistrarError::AlreadyPublished {
                    schema: schema_name.to_string(),
                    directory: directory_name,
                });
            }
            reserved.insert(key);
        }

        let directory = self.inner.base.acquire_directory(&options, ignore_close());
        Ok(PublishReservation {
            registrar: self.clone(),
            options,
            schema_name: schema_name.to_string(),
            directory,
        })
    }

    /// Track a published schema.
    ///
    /// Listens for announce events on the directory's announce address,
    /// binds the query handler unless the schema was published with its own
    /// binding, and reports the schema as published.
    ///
    /// Fails with [`RegistrarError::AlreadyPublished`] if an equal
    /// registration is already tracked. The bindings taken for it are given
    /// back; the record itself stays in the directory.
    pub fn register(
        &self,
        published: PublishedSchema,
        options: &DirectoryOptions,
        on_published: Arc<dyn SchemaPublishedHandler>,
        on_unpublished: Arc<dyn SchemaUnpublishedHandler>,
    ) -> Result<SchemaRegistration> {
        let options = self.resolve_options(options);
        self.listen_for_announcements(&options.announce_address);

        let PublishedSchema {
            directory,
            record,
            definition,
            subscription,
        } = published;
        let (subscription, owns_binding) = match subscription {
            Some(subscription) => (subscription, false),
            None => {
                let endpoint = record
                    .endpoint()
                    .map(str::to_string)
                    .unwrap_or_else(|| definition.service_address());
                let subscription = self
                    .inner
                    .consumers
                    .register_service_consumer(&endpoint, definition.clone());
                (subscription, true)
            }
        };

        let registration = SchemaRegistration {
            base: Registration::new(directory, &options),
            record,
            definition,
            subscription: Some(subscription),
            owns_binding,
            notifier: Arc::new(Notifier {
                on_published,
                on_unpublished,
                last_up: Mutex::new(None),
            }),
        };
        if !self.inner.base.register(registration.clone()) {
            self.release_bindings(&registration);
            return Err(RegistrarError::AlreadyPublished {
                schema: registration.schema_name().to_string(),
                directory: registration.directory_name().to_string(),
            });
        }
        debug!(
            "Registered schema {} in {}",
            registration.schema_name(),
            registration.directory_name()
        );

        if registration.record.is_up() {
            registration.notifier.notify(&registration, true);
        }
        Ok(registration)
    }

    /// Stop tracking a schema and release its bindings.
    ///
    /// Closes the directory if this was its last registration. Returns false
    /// if the registration was not tracked.
    pub fn unregister(&self, registration: &SchemaRegistration) -> bool {
        if !self.inner.base.unregister(registration) {
            return false;
        }
        self.release_bindings(registration);

        debug!(
            "Unregistered schema {} from {}",
            registration.schema_name(),
            registration.directory_name()
        );
        registration.notifier.notify(registration, false);
        true
    }

    /// The registration of `schema_name` in directory `directory_name`, if any.
    pub fn find_registration(
        &self,
        directory_name: &str,
        schema_name: &str,
    ) -> Option<SchemaRegistration> {
        self.inner.base.find_registration(|r| {
            r.directory_name() == directory_name && r.schema_name() == schema_name
        })
    }

    pub fn registrations(&self) -> Vec<SchemaRegistration> {
        self.inner.base.registrations()
    }

    pub fn directory_names(&self) -> Vec<String> {
        self.inner.base.directory_names()
    }

    pub fn get_directory(&self, name: &str) -> Option<ManagedDirectory> {
        self.inner.base.get_directory(name)
    }

    pub fn reference_count(&self, name: &str) -> usize {
        self.inner.base.reference_count(name)
    }

    /// Publications in flight against the directory `name`.
    pub fn pending_count(&self, name: &str) -> usize {
        self.inner.base.pending_count(name)
    }

    pub fn consumers(&self) -> &EventConsumers {
        &self.inner.consumers
    }

    /// Run `close_action` on every registration, then shut down.
    ///
    /// All actions run concurrently and are awaited before anything is torn
    /// down. Registrations whose action succeeded are unregistered. If every
    /// action succeeded the consumers and directories are closed; otherwise
    /// the failed registrations stay tracked and the errors are returned.
    pub async fn close<F, Fut>(&self, close_action: F) -> Result<()>
    where
        F: Fn(SchemaRegistration) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let registrations = self.registrations();
        let total = registrations.len();
        let outcomes = join_all(registrations.into_iter().map(|registration| {
            let pending = close_action(registration.clone());
            async move { (registration, pending.await) }
        }))
        .await;

        let mut errors = Vec::new();
        for (registration, outcome) in outcomes {
            match outcome {
                Ok(()) => {
                    self.unregister(&registration);
                }
                Err(e) => errors.push(e),
            }
        }

        if !errors.is_empty() {
            warn!(
                "Failed to close {} of {} schema registrations",
                errors.len(),
                total
            );
            return Err(RegistrarError::CloseFailed { errors });
        }

        self.inner.consumers.close();
        self.inner.base.close();
        info!("Closed schema registrar {}", self.inner.publisher_id);
        Ok(())
    }

    fn release_bindings(&self, registration: &SchemaRegistration) {
        if registration.owns_binding {
            self.inner
                .consumers
                .unregister_consumer(&registration.endpoint());
        } else if let Some(subscription) = &registration.subscription {
            self.inner.bus.unsubscribe(subscription);
        }
        self.inner
            .consumers
            .unregister_consumer(registration.base.announce_address());
    }

    fn listen_for_announcements(&self, address: &str) {
        let weak = Arc::downgrade(&self.inner);
        let own_address = address.to_string();
        let handler = move |record: &Record| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let matched = inner.base.find_registration(|r| {
                r.base.announce_address() == own_address && r.matches_record(record)
            });
            if let Some(registration) = matched {
                registration.notifier.notify(&registration, record.is_up());
            }
        };
        self.inner
            .consumers
            .register_announce_consumer(address, Arc::new(handler));
    }
}

fn ignore_close() -> CloseCallback {
    Arc::new(|| {
        debug!("Ignoring close of a publisher-managed directory");
    })
}
