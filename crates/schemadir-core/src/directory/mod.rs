//! Service directories and the providers that create them.

mod local;
mod managed;

pub use local::{LocalDirectory, LocalDirectoryProvider};
pub use managed::{CloseCallback, ManagedDirectory};

use crate::config::DirectoryOptions;
use crate::error::Result;
use crate::query::Queryable;
use crate::record::Record;
use async_trait::async_trait;
use std::sync::Arc;

/// Predicate used to look records up.
pub type RecordFilter<'a> = dyn Fn(&Record) -> bool + Send + Sync + 'a;

/// A named registry of published records.
///
/// Lookups only ever return records whose status is UP.
#[async_trait]
pub trait Directory: Send + Sync {
    fn name(&self) -> &str;

    /// Publish a record. The returned copy carries the assigned registration id.
    async fn publish(&self, record: Record) -> Result<Record>;

    /// Remove the record with the given registration id.
    async fn unpublish(&self, registration: &str) -> Result<()>;

    async fn get_record(&self, filter: &RecordFilter<'_>) -> Result<Option<Record>>;

    async fn get_records(&self, filter: &RecordFilter<'_>) -> Result<Vec<Record>>;

    /// Take a reference to the service described by `record`.
    fn get_reference(&self, record: &Record) -> Result<ServiceReference>;

    fn close(&self);
}

/// Creates directory instances.
pub trait DirectoryProvider: Send + Sync {
    fn create_directory(&self, options: &DirectoryOptions) -> Arc<dyn Directory>;

    /// Identity of this node in a cluster, `None` when not clustered.
    fn node_id(&self) -> Option<String> {
        None
    }
}

/// A taken reference to a published service.
///
/// Must be given back with [`release`](Self::release).
pub struct ServiceReference {
    record: Record,
    proxy: Arc<dyn Queryable>,
    on_release: Option<Box<dyn FnOnce() + Send>>,
}

impl ServiceReference {
    pub fn new(
        record: Record,
        proxy: Arc<dyn Queryable>,
        on_release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            record,
            proxy,
            on_release: Some(Box::new(on_release)),
        }
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    /// The query target behind this reference.
    pub fn get(&self) -> Arc<dyn Queryable> {
        self.proxy.clone()
    }

    pub fn release(mut self) {
        if let Some(on_release) = self.on_release.take() {
            on_release();
        }
    }
}

impl std::fmt::Debug for ServiceReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceReference")
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}
