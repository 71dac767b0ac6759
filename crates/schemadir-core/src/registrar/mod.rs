//! Registrations and the registrars that track them.
//!
//! A [`Registrar`] caches directories by name and counts the registrations
//! referencing each one. A managed directory is physically closed exactly when
//! its last registration is removed. [`SchemaRegistrar`] and
//! [`DiscoveryRegistrar`] build the publisher and consumer semantics on top.

mod base;
mod discovery;
mod schema;

pub use base::Registrar;
pub use discovery::{DiscoveryRegistrar, DiscoveryRegistration};
pub use schema::{PublishReservation, SchemaRegistrar, SchemaRegistration};

use crate::config::{DirectoryOptions, DiscoveryConfig};
use crate::directory::ManagedDirectory;
use std::hash::{Hash, Hasher};

/// Binding of a directory instance to the options it was obtained with.
#[derive(Clone)]
pub struct Registration {
    directory: ManagedDirectory,
    options: DirectoryOptions,
}

impl Registration {
    /// The options are copied; later changes to the caller's value are not seen.
    pub fn new(directory: ManagedDirectory, options: &DirectoryOptions) -> Self {
        Self {
            directory,
            options: options.clone(),
        }
    }

    pub fn directory(&self) -> &ManagedDirectory {
        &self.directory
    }

    /// A copy of the options snapshot.
    pub fn options(&self) -> DirectoryOptions {
        self.options.clone()
    }

    pub fn directory_name(&self) -> &str {
        self.options
            .name()
            .unwrap_or(DiscoveryConfig::LOCAL_NODE_NAME)
    }

    pub(crate) fn announce_address(&self) -> &str {
        &self.options.announce_address
    }

    pub(crate) fn usage_address(&self) -> &str {
        &self.options.usage_address
    }
}

/// Whether two registrations refer to the same directory instance under the
/// same name.
///
/// Announce and usage addresses and the backend configuration do not count.
pub fn same_identity(a: &Registration, b: &Registration) -> bool {
    a.directory.same_instance(&b.directory) && a.options.name == b.options.name
}

impl PartialEq for Registration {
    fn eq(&self, other: &Self) -> bool {
        same_identity(self, other)
    }
}

impl Eq for Registration {}

impl Hash for Registration {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.directory.instance_id().hash(state);
        self.options.name.hash(state);
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("directory", &self.directory)
            .field("name", &self.options.name)
            .finish()
    }
}

/// A value a [`Registrar`] can track.
pub trait Registered: Clone + Eq + Hash + Send + Sync + 'static {
    fn registration(&self) -> &Registration;

    fn directory_name(&self) -> &str {
        self.registration().directory_name()
    }
}

impl Registered for Registration {
    fn registration(&self) -> &Registration {
        self
    }
}
