//! JSON state snapshots
//!
//! The CLI runs the server against in-memory components. A snapshot carries their state
//! between invocations: live workflows, pods and cron workflows of the substrate, plus the
//! archive and offloaded nodes when the memory storage backend is used.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::StorageError;
use crate::offload::{MemoryOffloadStore, OffloadPolicy, OffloadRecord};
use crate::source::memory::PodKey;
use crate::source::{MemoryArchive, MemorySubstrate};
use crate::workflow::{CronWorkflow, Workflow};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StateSnapshot {
    pub workflows: Vec<Workflow>,
    pub archived_workflows: Vec<Workflow>,
    pub offloaded_nodes: Vec<OffloadRecord>,
    pub pods: Vec<PodKey>,
    pub cron_workflows: Vec<CronWorkflow>,
}

impl StateSnapshot {
    /// Read a snapshot; a missing file is an empty state
    pub fn load(path: &Path) -> Result<Self, StorageError> {
        if !path.exists() {
            debug!(path = %path.display(), "No state snapshot, starting empty");
            return Ok(Self::default());
        }
        let bytes = std::fs::read(path)?;
        let snapshot: StateSnapshot = serde_json::from_slice(&bytes)?;
        debug!(
            path = %path.display(),
            workflows = snapshot.workflows.len(),
            archived = snapshot.archived_workflows.len(),
            "Loaded state snapshot"
        );
        Ok(snapshot)
    }

    /// Write the snapshot through a temporary file so a crash never leaves it truncated
    pub fn save(&self, path: &Path) -> Result<(), StorageError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        debug!(path = %path.display(), "Saved state snapshot");
        Ok(())
    }

    /// A substrate seeded with the live part of the snapshot
    pub fn substrate(&self) -> MemorySubstrate {
        let substrate = MemorySubstrate::new();
        for wf in &self.workflows {
            substrate.insert_workflow(wf.clone());
        }
        for pod in &self.pods {
            substrate.add_pod(&pod.namespace, &pod.name);
        }
        for cron in &self.cron_workflows {
            substrate.add_cron_workflow(cron.clone());
        }
        substrate
    }

    pub fn archive(&self) -> MemoryArchive {
        MemoryArchive::from_workflows(self.archived_workflows.clone())
    }

    pub fn offload_store(&self, policy: OffloadPolicy) -> MemoryOffloadStore {
        MemoryOffloadStore::with_records(policy, self.offloaded_nodes.clone())
    }

    /// Capture the substrate; archive and offload parts are left to `with_stores`
    pub fn capture(substrate: &MemorySubstrate) -> Self {
        Self {
            workflows: substrate.workflows(),
            pods: substrate.pods(),
            cron_workflows: substrate.cron_workflows(),
            ..Default::default()
        }
    }

    pub fn with_stores(mut self, archive: &MemoryArchive, offload: &MemoryOffloadStore) -> Self {
        self.archived_workflows = archive.workflows();
        self.offloaded_nodes = offload.records();
        self
    }
}
