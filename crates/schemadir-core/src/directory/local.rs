//! In-process directory implementation.

use super::{Directory, DirectoryProvider, RecordFilter, ServiceReference};
use crate::bus::{Envelope, EventChannel};
use crate::config::{DirectoryOptions, DiscoveryConfig, ServiceConfig};
use crate::error::{RegistrarError, Result};
use crate::events::SchemaReferenceData;
use crate::query::SchemaProxy;
use crate::record::{Record, RecordStatus};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Records shared by every instance opened on one directory name.
#[derive(Default)]
struct RecordStore {
    records: Mutex<Vec<Record>>,
    open_instances: AtomicUsize,
}

/// Creates [`LocalDirectory`] instances.
///
/// Instances opened with the same name share their records, so separate
/// registrars naming one directory see each other's publications.
pub struct LocalDirectoryProvider {
    bus: Arc<dyn EventChannel>,
    stores: Mutex<HashMap<String, Arc<RecordStore>>>,
    node_id: Option<String>,
    send_timeout: Duration,
}

impl LocalDirectoryProvider {
    pub fn new(bus: Arc<dyn EventChannel>) -> Self {
        Self {
            bus,
            stores: Mutex::new(HashMap::new()),
            node_id: None,
            send_timeout: ServiceConfig::SEND_TIMEOUT,
        }
    }

    /// Report a cluster node id, used to name directories created without a name.
    pub fn with_node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    /// Reply timeout of the proxies handed out by references, unless the
    /// record asks for its own.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Number of instances on `name` that have not been closed.
    pub fn open_instances(&self, name: &str) -> usize {
        self.stores
            .lock()
            .get(name)
            .map_or(0, |store| store.open_instances.load(Ordering::SeqCst))
    }

    /// Every record currently published under `name`, whatever its status.
    pub fn records(&self, name: &str) -> Vec<Record> {
        self.stores
            .lock()
            .get(name)
            .map(|store| store.records.lock().clone())
            .unwrap_or_default()
    }
}

impl DirectoryProvider for LocalDirectoryProvider {
    fn create_directory(&self, options: &DirectoryOptions) -> Arc<dyn Directory> {
        let name = options
            .name()
            .unwrap_or(DiscoveryConfig::LOCAL_NODE_NAME)
            .to_string();
        let store = self.stores.lock().entry(name.clone()).or_default().clone();
        store.open_instances.fetch_add(1, Ordering::SeqCst);
        debug!("Opened local directory {}", name);

        Arc::new(LocalDirectory {
            name,
            options: options.clone(),
            store,
            bus: self.bus.clone(),
            send_timeout: self.send_timeout,
            closed: AtomicBool::new(false),
        })
    }

    fn node_id(&self) -> Option<String> {
        self.node_id.clone()
    }
}

/// One open instance of an in-process directory.
pub struct LocalDirectory {
    name: String,
    options: DirectoryOptions,
    store: Arc<RecordStore>,
    bus: Arc<dyn EventChannel>,
    send_timeout: Duration,
    closed: AtomicBool,
}

impl LocalDirectory {
    pub fn options(&self) -> &DirectoryOptions {
        &self.options
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(RegistrarError::directory(&self.name, "Directory is closed"));
        }
        Ok(())
    }

    fn announce(&self, record: &Record) {
        self.bus.publish(
            &self.options.announce_address,
            Envelope::Announce(record.clone()),
        );
    }

    fn find_up(&self, filter: &RecordFilter<'_>) -> Vec<Record> {
        self.store
            .records
            .lock()
            .iter()
            .filter(|record| record.is_up() && filter(*record))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Directory for LocalDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, mut record: Record) -> Result<Record> {
        self.ensure_open()?;
        if record.name.is_empty() {
            return Err(RegistrarError::directory(&self.name, "Record has no name"));
        }

        record.registration = Some(Uuid::new_v4().to_string());
        record.status = RecordStatus::Up;
        self.store.records.lock().push(record.clone());
        debug!("Published record {} to {}", record.name, self.name);

        self.announce(&record);
        Ok(record)
    }

    async fn unpublish(&self, registration: &str) -> Result<()> {
        self.ensure_open()?;
        let removed = {
            let mut records = self.store.records.lock();
            let position = records
                .iter()
                .position(|r| r.registration.as_deref() == Some(registration));
            position.map(|index| records.remove(index))
        };

        let Some(mut record) = removed else {
            return Err(RegistrarError::directory(
                &self.name,
                format!("Unknown registration {}", registration),
            ));
        };
        record.status = RecordStatus::Down;
        debug!("Unpublished record {} from {}", record.name, self.name);

        self.announce(&record);
        Ok(())
    }

    async fn get_record(&self, filter: &RecordFilter<'_>) -> Result<Option<Record>> {
        self.ensure_open()?;
        Ok(self.find_up(filter).into_iter().next())
    }

    async fn get_records(&self, filter: &RecordFilter<'_>) -> Result<Vec<Record>> {
        self.ensure_open()?;
        Ok(self.find_up(filter))
    }

    fn get_reference(&self, record: &Record) -> Result<ServiceReference> {
        self.ensure_open()?;
        let endpoint = record.endpoint().ok_or_else(|| {
            RegistrarError::directory(&self.name, format!("Record {} has no endpoint", record.name))
        })?;

        let timeout = record.send_timeout().unwrap_or(self.send_timeout);
        let proxy = SchemaProxy::new(self.bus.clone(), endpoint).with_timeout(timeout);
        let id = Uuid::new_v4().to_string();
        let usage_address = self.options.usage_address.clone();
        self.bus.publish(
            &usage_address,
            Envelope::Usage(SchemaReferenceData::bound(id.clone(), record.clone())),
        );

        let bus = self.bus.clone();
        let released = record.clone();
        Ok(ServiceReference::new(
            record.clone(),
            Arc::new(proxy),
            move || {
                bus.publish(
                    &usage_address,
                    Envelope::Usage(SchemaReferenceData::released(id, released)),
                );
            },
        ))
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.store.open_instances.fetch_sub(1, Ordering::SeqCst);
            debug!("Closed local directory {}", self.name);
        }
    }
}
