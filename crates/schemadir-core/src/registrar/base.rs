//! Generic directory cache and registration bookkeeping.

use super::Registered;
use crate::config::{DirectoryOptions, DiscoveryConfig};
use crate::directory::{CloseCallback, DirectoryProvider, ManagedDirectory};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

struct DirectoryEntry {
    directory: ManagedDirectory,
    references: usize,
    /// Publications still waiting on the directory.
    pending: usize,
}

impl DirectoryEntry {
    fn is_unused(&self) -> bool {
        self.references == 0 && self.pending == 0
    }
}

struct State<T> {
    directories: HashMap<String, DirectoryEntry>,
    registrations: Vec<T>,
}

/// Reference-counted directory cache plus the set of active registrations.
///
/// Every cached directory is managed. Its entry carries the number of
/// registrations naming it and the number of publications still in flight
/// against it. It is closed and evicted once both drop to zero. No lock is
/// held while a directory is closed.
pub struct Registrar<T: Registered> {
    provider: Arc<dyn DirectoryProvider>,
    state: Mutex<State<T>>,
}

impl<T: Registered> Registrar<T> {
    pub fn new(provider: Arc<dyn DirectoryProvider>) -> Self {
        Self {
            provider,
            state: Mutex::new(State {
                directories: HashMap::new(),
                registrations: Vec::new(),
            }),
        }
    }

    /// Copy of `options` with the directory name filled in.
    ///
    /// Unnamed options get the node id, or the local node name when the
    /// provider is not clustered.
    pub fn resolve_options(&self, options: &DirectoryOptions) -> DirectoryOptions {
        let mut resolved = options.clone();
        if resolved.name().map_or(true, str::is_empty) {
            let name = self
                .provider
                .node_id()
                .unwrap_or_else(|| DiscoveryConfig::LOCAL_NODE_NAME.to_string());
            resolved.name = Some(name);
        }
        resolved
    }

    /// Return the cached directory for the options' name, or create one.
    ///
    /// On a cache hit the options are ignored: the first creation wins.
    /// Without `on_close` the new directory is unmanaged and not cached.
    pub fn get_or_create_directory(
        &self,
        options: &DirectoryOptions,
        on_close: Option<CloseCallback>,
    ) -> ManagedDirectory {
        self.open_directory(options, on_close, false)
    }

    /// Like [`get_or_create_directory`](Self::get_or_create_directory), and
    /// holds the directory open for a publication that has not registered
    /// yet.
    ///
    /// Every call must be paired with [`release_pending`](Self::release_pending).
    pub fn acquire_directory(
        &self,
        options: &DirectoryOptions,
        on_close: CloseCallback,
    ) -> ManagedDirectory {
        self.open_directory(options, Some(on_close), true)
    }

    fn open_directory(
        &self,
        options: &DirectoryOptions,
        on_close: Option<CloseCallback>,
        pending: bool,
    ) -> ManagedDirectory {
        let options = self.resolve_options(options);
        let name = options
            .name()
            .unwrap_or(DiscoveryConfig::LOCAL_NODE_NAME)
            .to_string();

        let pending = usize::from(pending);
        let mut state = self.state.lock();
        if let Some(entry) = state.directories.get_mut(&name) {
            entry.pending += pending;
            return entry.directory.clone();
        }

        let inner = self.provider.create_directory(&options);
        match on_close {
            Some(on_close) => {
                let directory = ManagedDirectory::managed(inner, on_close);
                state.directories.insert(
                    name.clone(),
                    DirectoryEntry {
                        directory: directory.clone(),
                        references: 0,
                        pending,
                    },
                );
                debug!("Created managed directory: {}", name);
                directory
            }
            None => {
                debug!("Created unmanaged directory: {}", name);
                ManagedDirectory::unmanaged(inner)
            }
        }
    }

    /// Add a registration.
    ///
    /// Returns false, leaving everything unchanged, if an equal registration
    /// is already present.
    pub fn register(&self, registration: T) -> bool {
        let name = registration.directory_name().to_string();
        let mut state = self.state.lock();

        if state.registrations.contains(&registration) {
            debug!("Registration in {} already present", name);
            return false;
        }

        state.registrations.push(registration);
        if let Some(entry) = state.directories.get_mut(&name) {
            entry.references += 1;
            debug!("Registered in {} ({} references)", name, entry.references);
        }
        true
    }

    /// Remove a registration, closing its directory if nothing else uses it.
    ///
    /// Returns false if the registration was not present.
    pub fn unregister(&self, registration: &T) -> bool {
        let name = registration.directory_name().to_string();
        let closing = {
            let mut state = self.state.lock();
            let Some(position) = state.registrations.iter().position(|r| r == registration) else {
                return false;
            };
            state.registrations.remove(position);

            let unused = state.directories.get_mut(&name).is_some_and(|entry| {
                entry.references = entry.references.saturating_sub(1);
                debug!("Unregistered from {} ({} references)", name, entry.references);
                entry.is_unused()
            });
            if unused {
                state.directories.remove(&name)
            } else {
                None
            }
        };

        if let Some(entry) = closing {
            entry.directory.close_unmanaged();
            debug!("Closed directory {} after last registration", name);
        }
        true
    }

    /// Physically close and evict the cached directory `name`.
    pub fn close_directory(&self, name: &str) -> bool {
        let removed = self.state.lock().directories.remove(name);
        match removed {
            Some(entry) => {
                entry.directory.close_unmanaged();
                debug!("Closed directory {}", name);
                true
            }
            None => {
                warn!("Directory {} is not managed here, ignoring close", name);
                false
            }
        }
    }

    /// End a publication started with
    /// [`acquire_directory`](Self::acquire_directory).
    ///
    /// Closes `name` if no registration references it and no other
    /// publication is waiting on it. Returns true if it was closed.
    pub fn release_pending(&self, name: &str) -> bool {
        let removed = {
            let mut state = self.state.lock();
            let unused = state.directories.get_mut(name).is_some_and(|entry| {
                entry.pending = entry.pending.saturating_sub(1);
                entry.is_unused()
            });
            if unused {
                state.directories.remove(name)
            } else {
                None
            }
        };
        match removed {
            Some(entry) => {
                entry.directory.close_unmanaged();
                debug!("Closed unused directory {}", name);
                true
            }
            None => false,
        }
    }

    pub fn registrations(&self) -> Vec<T> {
        self.state.lock().registrations.clone()
    }

    pub fn find_registration(&self, predicate: impl Fn(&T) -> bool) -> Option<T> {
        self.state
            .lock()
            .registrations
            .iter()
            .find(|r| predicate(*r))
            .cloned()
    }

    pub fn contains(&self, registration: &T) -> bool {
        self.state.lock().registrations.contains(registration)
    }

    /// Names of the cached (managed) directories, sorted.
    pub fn directory_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().directories.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn get_directory(&self, name: &str) -> Option<ManagedDirectory> {
        self.state
            .lock()
            .directories
            .get(name)
            .map(|entry| entry.directory.clone())
    }

    pub fn reference_count(&self, name: &str) -> usize {
        self.state
            .lock()
            .directories
            .get(name)
            .map_or(0, |entry| entry.references)
    }

    /// Publications in flight against `name`.
    pub fn pending_count(&self, name: &str) -> usize {
        self.state
            .lock()
            .directories
            .get(name)
            .map_or(0, |entry| entry.pending)
    }

    /// Close every cached directory and forget all registrations.
    pub fn close(&self) {
        let drained: Vec<(String, DirectoryEntry)> = {
            let mut state = self.state.lock();
            state.registrations.clear();
            state.directories.drain().collect()
        };
        for (name, entry) in drained {
            entry.directory.close_unmanaged();
            debug!("Closed directory {}", name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::LocalEventBus;
    use crate::directory::LocalDirectoryProvider;
    use crate::registrar::Registration;

    fn setup() -> (Arc<LocalDirectoryProvider>, Registrar<Registration>) {
        let provider = Arc::new(LocalDirectoryProvider::new(Arc::new(LocalEventBus::new())));
        let registrar = Registrar::new(provider.clone());
        (provider, registrar)
    }

    fn noop() -> Option<CloseCallback> {
        Some(Arc::new(|| {}))
    }

    fn register(registrar: &Registrar<Registration>, name: &str) -> Registration {
        let options = DirectoryOptions::named(name);
        let directory = registrar.get_or_create_directory(&options, noop());
        let registration = Registration::new(directory, &options);
        assert!(registrar.register(registration.clone()));
        registration
    }

    #[test]
    fn test_resolve_options_defaults_name() {
        let (_provider, registrar) = setup();
        let resolved = registrar.resolve_options(&DirectoryOptions::default());
        assert_eq!(resolved.name(), Some("localhost"));

        let provider = Arc::new(
            LocalDirectoryProvider::new(Arc::new(LocalEventBus::new())).with_node_id("node-7"),
        );
        let clustered: Registrar<Registration> = Registrar::new(provider);
        assert_eq!(
            clustered.resolve_options(&DirectoryOptions::default()).name(),
            Some("node-7")
        );
    }

    #[test]
    fn test_first_creation_wins() {
        let (_provider, registrar) = setup();
        let first = registrar.get_or_create_directory(&DirectoryOptions::named("D"), noop());
        let second = registrar.get_or_create_directory(
            &DirectoryOptions::named("D").with_announce_address("other"),
            None,
        );
        assert!(first.same_instance(&second));
        assert!(second.is_managed());
    }

    #[test]
    fn test_unmanaged_directories_are_not_cached() {
        let (provider, registrar) = setup();
        let directory = registrar.get_or_create_directory(&DirectoryOptions::named("U"), None);
        assert!(!directory.is_managed());
        assert!(registrar.directory_names().is_empty());
        assert!(!registrar.close_directory("U"));
        assert_eq!(provider.open_instances("U"), 1);
    }

    #[test]
    fn test_last_unregister_closes_directory() {
        let (provider, registrar) = setup();
        let options = DirectoryOptions::named("D");
        let directory = registrar.get_or_create_directory(&options, noop());

        let a = Registration::new(directory.clone(), &options);
        assert!(registrar.register(a.clone()));
        let e = register(&registrar, "E");
        assert_eq!(registrar.reference_count("D"), 1);

        // Same identity: rejected, not counted twice.
        assert!(!registrar.register(Registration::new(
            directory,
            &options.clone().with_usage_address("other"),
        )));
        assert_eq!(registrar.reference_count("D"), 1);
        assert_eq!(registrar.registrations().len(), 2);

        assert!(registrar.unregister(&a));
        assert!(!registrar.unregister(&a));
        assert_eq!(registrar.directory_names(), vec!["E".to_string()]);
        assert_eq!(provider.open_instances("D"), 0);

        assert!(registrar.unregister(&e));
        assert!(registrar.directory_names().is_empty());
    }

    #[test]
    fn test_pending_publication_keeps_directory_open() {
        let (provider, registrar) = setup();
        let options = DirectoryOptions::named("D");
        let first = registrar.acquire_directory(&options, Arc::new(|| {}));
        let second = registrar.acquire_directory(&options, Arc::new(|| {}));
        assert!(first.same_instance(&second));
        assert_eq!(registrar.pending_count("D"), 2);

        // One publication fails while the other is still in flight.
        assert!(!registrar.release_pending("D"));
        assert_eq!(registrar.directory_names(), vec!["D".to_string()]);
        assert_eq!(provider.open_instances("D"), 1);

        let registration = Registration::new(second, &options);
        assert!(registrar.register(registration.clone()));
        assert!(!registrar.release_pending("D"));
        assert_eq!(registrar.pending_count("D"), 0);
        assert_eq!(registrar.reference_count("D"), 1);

        assert!(registrar.unregister(&registration));
        assert!(registrar.directory_names().is_empty());
        assert_eq!(provider.open_instances("D"), 0);
    }

    #[test]
    fn test_unregister_waits_for_pending_publications() {
        let (provider, registrar) = setup();
        let a = register(&registrar, "D");
        registrar.acquire_directory(&DirectoryOptions::named("D"), Arc::new(|| {}));

        assert!(registrar.unregister(&a));
        assert_eq!(registrar.directory_names(), vec!["D".to_string()]);
        assert_eq!(provider.open_instances("D"), 1);

        assert!(registrar.release_pending("D"));
        assert!(registrar.directory_names().is_empty());
        assert_eq!(provider.open_instances("D"), 0);
    }

    #[test]
    fn test_close_closes_everything() {
        let (provider, registrar) = setup();
        register(&registrar, "D");
        register(&registrar, "E");

        registrar.close();
        assert!(registrar.registrations().is_empty());
        assert!(registrar.directory_names().is_empty());
        assert_eq!(provider.open_instances("D"), 0);
        assert_eq!(provider.open_instances("E"), 0);
    }
}
