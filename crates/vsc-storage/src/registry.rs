//! Backend construction and lookup by storage name.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::command::CommandRunner;
use crate::definition::StorageDefinition;
use crate::dry_run::DryRunBackend;
use crate::error::{StorageError, StorageResult};
use crate::gpfs::GpfsBackend;
use crate::lustre::LustreBackend;
use crate::traits::StorageBackend;
use crate::types::BackendKind;

/// Build the adapter for a definition.
pub fn build_backend(
    definition: Arc<StorageDefinition>,
    runner: Arc<dyn CommandRunner>,
) -> Arc<dyn StorageBackend> {
    match definition.backend {
        BackendKind::Gpfs => Arc::new(GpfsBackend::new(definition, runner)),
        BackendKind::Lustre => Arc::new(LustreBackend::new(definition, runner)),
    }
}

/// A storage definition together with its adapter.
#[derive(Clone)]
pub struct StorageHandle {
    pub definition: Arc<StorageDefinition>,
    pub backend: Arc<dyn StorageBackend>,
}

impl StorageHandle {
    pub fn new(definition: StorageDefinition, backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            definition: Arc::new(definition),
            backend,
        }
    }

    /// Storage name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.definition.name
    }
}

impl std::fmt::Debug for StorageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageHandle")
            .field("name", &self.definition.name)
            .field("backend", &self.backend.kind())
            .finish()
    }
}

/// Storages configured for this run, by name.
#[derive(Debug, Clone, Default)]
pub struct StorageRegistry {
    storages: BTreeMap<String, StorageHandle>,
}

impl StorageRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build adapters for every definition. With `dry_run` each adapter is
    /// wrapped in a [`DryRunBackend`].
    pub fn from_definitions(
        definitions: impl IntoIterator<Item = StorageDefinition>,
        runner: Arc<dyn CommandRunner>,
        dry_run: bool,
    ) -> StorageResult<Self> {
        let mut registry = Self::new();
        for definition in definitions {
            definition.validate()?;
            let definition = Arc::new(definition);
            let mut backend = build_backend(Arc::clone(&definition), Arc::clone(&runner));
            if dry_run {
                backend = Arc::new(DryRunBackend::new(backend));
            }
            debug!(storage = %definition.name, backend = %definition.backend, dry_run, "Registered storage");
            registry.insert(StorageHandle {
                definition,
                backend,
            });
        }
        Ok(registry)
    }

    /// Add or replace a storage.
    pub fn insert(&mut self, handle: StorageHandle) {
        self.storages.insert(handle.name().to_string(), handle);
    }

    /// Look up a storage by name.
    pub fn get(&self, name: &str) -> StorageResult<&StorageHandle> {
        self.storages
            .get(name)
            .ok_or_else(|| StorageError::UnknownStorage {
                name: name.to_string(),
            })
    }

    /// Whether a storage is configured.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.storages.contains_key(name)
    }

    /// Configured storage names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.storages.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.storages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.storages.is_empty()
    }
}
