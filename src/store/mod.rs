//! Persistent stores
//!
//! Backing for the archive and the offload store. The memory backend is seeded from and
//! written back to the state snapshot; the sled backend keeps both in one database, each
//! in its own tree, with records encoded as JSON.

pub mod persistence;

pub use persistence::SledStore;

use std::sync::Arc;
use tracing::debug;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::StorageError;
use crate::offload::{MemoryOffloadStore, OffloadPolicy, OffloadStore};
use crate::snapshot::StateSnapshot;
use crate::source::{ArchiveStore, MemoryArchive};
use crate::workflow::Workflow;

/// Archive and offload stores of one configured backend
#[derive(Clone)]
pub enum Stores {
    Memory {
        archive: Arc<MemoryArchive>,
        offload: Arc<MemoryOffloadStore>,
    },
    Sled(Arc<SledStore>),
}

impl Stores {
    /// Open the stores named by the storage configuration
    ///
    /// The memory backend takes its archive and offload records from `snapshot`.
    pub fn open(
        config: &StorageConfig,
        policy: OffloadPolicy,
        snapshot: &StateSnapshot,
    ) -> Result<Self, StorageError> {
        match config.backend {
            StorageBackend::Memory => Ok(Stores::Memory {
                archive: Arc::new(snapshot.archive()),
                offload: Arc::new(snapshot.offload_store(policy)),
            }),
            StorageBackend::Sled => Ok(Stores::Sled(Arc::new(SledStore::open(
                &config.path,
                policy,
            )?))),
        }
    }

    pub fn archive(&self) -> Arc<dyn ArchiveStore> {
        match self {
            Stores::Memory { archive, .. } => archive.clone(),
            Stores::Sled(store) => store.clone(),
        }
    }

    pub fn offload(&self) -> Arc<dyn OffloadStore> {
        match self {
            Stores::Memory { offload, .. } => offload.clone(),
            Stores::Sled(store) => store.clone(),
        }
    }

    /// Record a completed workflow in the archive
    pub fn archive_workflow(&self, workflow: Workflow) -> Result<(), StorageError> {
        match self {
            Stores::Memory { archive, .. } => {
                if workflow.uid().is_empty() {
                    return Err(StorageError::Query(format!(
                        "workflow \"{}\" has no uid and cannot be archived",
                        workflow.name()
                    )));
                }
                archive.archive(workflow);
                Ok(())
            }
            Stores::Sled(store) => store.archive_workflow(&workflow),
        }
    }

    /// Fold the store contents into `snapshot` (memory) or flush them to disk (sled)
    pub fn persist(&self, snapshot: StateSnapshot) -> Result<StateSnapshot, StorageError> {
        match self {
            Stores::Memory { archive, offload } => Ok(snapshot.with_stores(archive, offload)),
            Stores::Sled(store) => {
                store.flush()?;
                debug!("Flushed sled store");
                Ok(snapshot)
            }
        }
    }
}
