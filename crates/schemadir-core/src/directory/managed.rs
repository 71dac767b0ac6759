//! Directory handle whose close can be intercepted.

use super::{Directory, RecordFilter, ServiceReference};
use crate::error::Result;
use crate::record::Record;
use async_trait::async_trait;
use std::sync::Arc;

/// Invoked instead of physically closing a managed directory.
pub type CloseCallback = Arc<dyn Fn() + Send + Sync>;

/// A directory as handed out by a registrar.
///
/// Closing a `Managed` handle runs its callback and leaves the underlying
/// directory open; the registrar decides when it is really closed.
#[derive(Clone)]
pub enum ManagedDirectory {
    Unmanaged(Arc<dyn Directory>),
    Managed {
        inner: Arc<dyn Directory>,
        on_close: CloseCallback,
    },
}

impl ManagedDirectory {
    pub fn unmanaged(inner: Arc<dyn Directory>) -> Self {
        ManagedDirectory::Unmanaged(inner)
    }

    pub fn managed(inner: Arc<dyn Directory>, on_close: CloseCallback) -> Self {
        ManagedDirectory::Managed { inner, on_close }
    }

    pub fn inner(&self) -> &Arc<dyn Directory> {
        match self {
            ManagedDirectory::Unmanaged(inner) => inner,
            ManagedDirectory::Managed { inner, .. } => inner,
        }
    }

    pub fn is_managed(&self) -> bool {
        matches!(self, ManagedDirectory::Managed { .. })
    }

    /// Physically close the underlying directory.
    pub fn close_unmanaged(&self) {
        self.inner().close();
    }

    /// Whether both handles wrap the same directory instance.
    pub fn same_instance(&self, other: &ManagedDirectory) -> bool {
        self.instance_id() == other.instance_id()
    }

    /// Address of the wrapped instance, stable for its lifetime.
    pub(crate) fn instance_id(&self) -> usize {
        Arc::as_ptr(self.inner()) as *const () as usize
    }
}

impl std::fmt::Debug for ManagedDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.is_managed() { "Managed" } else { "Unmanaged" };
        f.debug_tuple(kind).field(&self.inner().name()).finish()
    }
}

#[async_trait]
impl Directory for ManagedDirectory {
    fn name(&self) -> &str {
        self.inner().name()
    }

    async fn publish(&self, record: Record) -> Result<Record> {
        self.inner().publish(record).await
    }

    async fn unpublish(&self, registration: &str) -> Result<()> {
        self.inner().unpublish(registration).await
    }

    async fn get_record(&self, filter: &RecordFilter<'_>) -> Result<Option<Record>> {
        self.inner().get_record(filter).await
    }

    async fn get_records(&self, filter: &RecordFilter<'_>) -> Result<Vec<Record>> {
        self.inner().get_records(filter).await
    }

    fn get_reference(&self, record: &Record) -> Result<ServiceReference> {
        self.inner().get_reference(record)
    }

    fn close(&self) {
        match self {
            ManagedDirectory::Unmanaged(inner) => inner.close(),
            ManagedDirectory::Managed { on_close, .. } => on_close(),
        }
    }
}
