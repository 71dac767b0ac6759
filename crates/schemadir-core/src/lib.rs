//! Schemadir Core - publish, discover and query schemas in shared service directories.
//!
//! Publishers put named, queryable schemas into one or more directories;
//! consumers listen to directories and route queries to the schema they name.
//! Registrars own the directory lifecycle: directories are created on demand,
//! shared by name and physically closed when the last registration using them
//! goes away.
//!
//! The directory, the event channel and the query engine are traits. In-process
//! implementations ([`LocalDirectoryProvider`], [`LocalEventBus`]) are included.
//!
//! # Example
//!
//! ```rust,ignore
//! use schemadir_core::{DirectoryOptions, LocalDirectoryProvider, LocalEventBus};
//! use schemadir_core::{SchemaConsumer, SchemaDefinition, SchemaPublisher};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> schemadir_core::Result<()> {
//!     let bus = Arc::new(LocalEventBus::new());
//!     let provider = Arc::new(LocalDirectoryProvider::new(bus.clone()));
//!
//!     let publisher = SchemaPublisher::new(bus.clone(), provider.clone());
//!     let options = DirectoryOptions::named("theDiscovery");
//!     publisher
//!         .publish(&options, Arc::new(SchemaDefinition::new(my_schema())))
//!         .await?;
//!
//!     let consumer = SchemaConsumer::new(bus, provider);
//!     consumer.start_discovery(&options);
//!     let result = consumer
//!         .execute_query("theDiscovery", "DroidQueries", "{ droid(id: \"2001\") { name } }", None)
//!         .await?;
//!     println!("{}", result.to_json());
//!     Ok(())
//! }
//! ```

pub mod bus;
pub mod client;
pub mod config;
pub mod directory;
pub mod error;
pub mod events;
pub mod query;
pub mod record;
pub mod registrar;
pub mod schema;
pub mod service;

mod consumer;
mod publisher;

// Re-export commonly used types
pub use bus::{Envelope, EnvelopeKind, EventChannel, LocalEventBus, ServiceCall, Subscription};
pub use config::{DirectoryOptions, DiscoveryConfig, ServiceConfig};
pub use directory::{
    CloseCallback, Directory, DirectoryProvider, LocalDirectory, LocalDirectoryProvider,
    ManagedDirectory, RecordFilter, ServiceReference,
};
pub use error::{PartialPublishError, RegistrarError, Result};
pub use events::{
    EventConsumers, ReferenceStatus, SchemaAnnounceHandler, SchemaPublishedHandler,
    SchemaReferenceData, SchemaUnpublishedHandler, SchemaUsageHandler,
};
pub use query::{
    EngineError, ErrorLocation, ErrorType, ExecutionResult, QueryError, QueryResult, Queryable,
    SchemaProxy, SourceLocation,
};
pub use record::{Record, RecordStatus};
pub use registrar::{
    same_identity, DiscoveryRegistrar, DiscoveryRegistration, PublishReservation, Registered,
    Registrar, Registration, SchemaRegistrar, SchemaRegistration,
};
pub use schema::{QuerySchema, SchemaDefinition, SchemaMetadata};
pub use service::PublishedSchema;

pub use consumer::SchemaConsumer;
pub use publisher::{PublishAllOutcome, SchemaPublisher};
