//! Publisher facade: publish schemas into directories and take them down.

use crate::bus::EventChannel;
use crate::config::{DirectoryOptions, ServiceConfig};
use crate::directory::{Directory, DirectoryProvider, ManagedDirectory};
use crate::error::{PartialPublishError, RegistrarError, Result};
use crate::events::{SchemaPublishedHandler, SchemaUnpublishedHandler};
use crate::registrar::{SchemaRegistrar, SchemaRegistration};
use crate::schema::{SchemaDefinition, SchemaMetadata};
use crate::service;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of [`SchemaPublisher::publish_all`].
#[derive(Debug)]
pub struct PublishAllOutcome {
    published: Vec<SchemaRegistration>,
    failure: Option<PartialPublishError>,
}

impl PublishAllOutcome {
    /// Registrations that were published, in completion order.
    pub fn published(&self) -> &[SchemaRegistration] {
        &self.published
    }

    pub fn failure(&self) -> Option<&PartialPublishError> {
        self.failure.as_ref()
    }

    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }

    /// Hand the outcome to a result handler.
    ///
    /// The published registrations are always delivered first. When some
    /// publications failed, a second call delivers the aggregate error.
    /// Nothing is rolled back.
    pub fn deliver(self, mut handler: impl FnMut(Result<Vec<SchemaRegistration>>)) {
        handler(Ok(self.published));
        if let Some(failure) = self.failure {
            handler(Err(failure.into()));
        }
    }

    /// Collapse to a single result, discarding partial successes on failure.
    pub fn into_result(self) -> Result<Vec<SchemaRegistration>> {
        match self.failure {
            Some(failure) => Err(failure.into()),
            None => Ok(self.published),
        }
    }
}

/// Publishes schema definitions and answers their queries.
///
/// Cheap to clone; clones share the registrar.
#[derive(Clone)]
pub struct SchemaPublisher {
    bus: Arc<dyn EventChannel>,
    registrar: SchemaRegistrar,
    on_published: Arc<dyn SchemaPublishedHandler>,
    on_unpublished: Arc<dyn SchemaUnpublishedHandler>,
}

impl SchemaPublisher {
    pub fn new(bus: Arc<dyn EventChannel>, provider: Arc<dyn DirectoryProvider>) -> Self {
        let registrar = SchemaRegistrar::new(bus.clone(), provider);
        Self::with_registrar(bus, registrar)
    }

    pub fn with_publisher_id(
        bus: Arc<dyn EventChannel>,
        provider: Arc<dyn DirectoryProvider>,
        publisher_id: impl Into<String>,
    ) -> Self {
        let registrar = SchemaRegistrar::with_publisher_id(bus.clone(), provider, publisher_id);
        Self::with_registrar(bus, registrar)
    }

    fn with_registrar(bus: Arc<dyn EventChannel>, registrar: SchemaRegistrar) -> Self {
        Self {
            bus,
            registrar,
            on_published: Arc::new(|_: &SchemaRegistration| {}),
            on_unpublished: Arc::new(|_: &SchemaRegistration| {}),
        }
    }

    /// Called whenever one of this publisher's schemas becomes available.
    pub fn on_published(mut self, handler: impl SchemaPublishedHandler + 'static) -> Self {
        self.on_published = Arc::new(handler);
        self
    }

    /// Called whenever one of this publisher's schemas stops being available.
    pub fn on_unpublished(mut self, handler: impl SchemaUnpublishedHandler + 'static) -> Self {
        self.on_unpublished = Arc::new(handler);
        self
    }

    pub fn publisher_id(&self) -> &str {
        self.registrar.publisher_id()
    }

    pub fn registrar(&self) -> &SchemaRegistrar {
        &self.registrar
    }

    /// Publish `definition` to the directory named in `options`.
    pub async fn publish(
        &self,
        options: &DirectoryOptions,
        definition: Arc<SchemaDefinition>,
    ) -> Result<SchemaRegistration> {
        self.publish_with_metadata(options, definition, SchemaMetadata::default())
            .await
    }

    /// Publish with extra metadata layered over the definition's own.
    ///
    /// The merged metadata decides the schema name and service address.
    /// Fails with [`RegistrarError::AlreadyPublished`] if this publisher
    /// already has, or is publishing, a schema of that name in the directory.
    pub async fn publish_with_metadata(
        &self,
        options: &DirectoryOptions,
        definition: Arc<SchemaDefinition>,
        metadata: SchemaMetadata,
    ) -> Result<SchemaRegistration> {
        let definition = Arc::new(SchemaDefinition::with_metadata(
            definition.schema().clone(),
            definition.metadata().merged(&metadata),
        ));
        let schema_name = definition.schema_name();
        if schema_name.is_empty() {
            return Err(RegistrarError::validation(
                "definition",
                "Schema name cannot be empty",
            ));
        }

        let reservation = self.registrar.reserve(options, &schema_name)?;
        let record_metadata = definition
            .metadata()
            .clone()
            .with_entry(ServiceConfig::PUBLISHER_ID_KEY, self.publisher_id());
        let published = service::publish(
            &self.bus,
            reservation.directory(),
            definition,
            &record_metadata,
        )
        .await?;

        self.registrar.register(
            published,
            reservation.options(),
            self.on_published.clone(),
            self.on_unpublished.clone(),
        )
    }

    /// Publish every definition to one directory, concurrently.
    ///
    /// Waits for all publications to settle. Registrations come back in
    /// completion order. Fails outright only when `definitions` is empty.
    pub async fn publish_all(
        &self,
        options: &DirectoryOptions,
        definitions: Vec<Arc<SchemaDefinition>>,
    ) -> Result<PublishAllOutcome> {
        if definitions.is_empty() {
            return Err(RegistrarError::validation(
                "definitions",
                "Nothing to publish. No schema definitions provided",
            ));
        }

        let total = definitions.len();
        let mut pending: FuturesUnordered<_> = definitions
            .into_iter()
            .map(|definition| self.publish(options, definition))
            .collect();

        let mut published = Vec::with_capacity(total);
        let mut errors = Vec::new();
        while let Some(outcome) = pending.next().await {
            match outcome {
                Ok(registration) => published.push(registration),
                Err(e) => errors.push(e),
            }
        }

        let failure = if published.len() < total {
            warn!(
                "Published {} of {} schema definitions",
                published.len(),
                total
            );
            Some(PartialPublishError::new(errors))
        } else {
            info!("Published {} schema definitions", total);
            None
        };
        Ok(PublishAllOutcome { published, failure })
    }

    /// Take a published schema down.
    pub async fn unpublish(&self, registration: &SchemaRegistration) -> Result<()> {
        let id = registration.record().registration.as_deref().ok_or_else(|| {
            RegistrarError::RecordNotRegistered {
                name: registration.schema_name().to_string(),
            }
        })?;
        registration.directory().unpublish(id).await?;
        self.registrar.unregister(registration);
        info!(
            "Unpublished schema {} from {}",
            registration.schema_name(),
            registration.directory().name()
        );
        Ok(())
    }

    pub fn registered_schemas(&self) -> Vec<SchemaRegistration> {
        self.registrar.registrations()
    }

    pub fn managed_directories(&self) -> Vec<String> {
        self.registrar.directory_names()
    }

    pub fn get_directory(&self, name: &str) -> Option<ManagedDirectory> {
        self.registrar.get_directory(name)
    }

    /// Unpublish everything and release all directories.
    pub async fn close(&self) -> Result<()> {
        self.registrar
            .close(|registration| {
                let publisher = self.clone();
                async move { publisher.unpublish(&registration).await }
            })
            .await
    }
}
