//! sled-backed archive and offload store

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use crate::error::StorageError;
use crate::offload::{node_status_version, OffloadPolicy, OffloadRecord, OffloadStore, UidVersion};
use crate::query::ListQuery;
use crate::source::archive::newest;
use crate::source::ArchiveStore;
use crate::workflow::{Nodes, Workflow};

const ARCHIVE_TREE: &str = "archived_workflows";
const OFFLOAD_TREE: &str = "offloaded_nodes";

fn io_error(context: &str, e: impl std::fmt::Display) -> StorageError {
    StorageError::IoError(std::io::Error::new(
        std::io::ErrorKind::Other,
        format!("{}: {}", context, e),
    ))
}

fn decode<T: DeserializeOwned>(value: &[u8], what: &str) -> Result<T, StorageError> {
    serde_json::from_slice(value).map_err(|e| {
        StorageError::IoError(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Failed to deserialize {}: {}", what, e),
        ))
    })
}

fn offload_key(uid: &str, version: &str) -> String {
    format!("{}/{}", uid, version)
}

/// Archive (keyed by uid) and offloaded node mappings (keyed by uid and version)
pub struct SledStore {
    db: sled::Db,
    archive: sled::Tree,
    offload: sled::Tree,
    policy: OffloadPolicy,
}

impl SledStore {
    /// Open or create the database at `path`
    pub fn open<P: AsRef<Path>>(path: P, policy: OffloadPolicy) -> Result<Self, StorageError> {
        let db = sled::open(path).map_err(|e| io_error("Failed to open sled database", e))?;
        let archive = db
            .open_tree(ARCHIVE_TREE)
            .map_err(|e| io_error("Failed to open archive tree", e))?;
        let offload = db
            .open_tree(OFFLOAD_TREE)
            .map_err(|e| io_error("Failed to open offload tree", e))?;
        Ok(Self {
            db,
            archive,
            offload,
            policy,
        })
    }

    /// Store a completed workflow, replacing any earlier record with the same uid
    pub fn archive_workflow(&self, workflow: &Workflow) -> Result<(), StorageError> {
        if workflow.uid().is_empty() {
            return Err(StorageError::Query(format!(
                "cannot archive workflow \"{}\" without a uid",
                workflow.name()
            )));
        }
        let value = serde_json::to_vec(workflow)?;
        self.archive
            .insert(workflow.uid().as_bytes(), value)
            .map_err(|e| io_error("Failed to archive workflow", e))?;
        debug!(uid = %workflow.uid(), workflow = %workflow.name(), "Archived workflow");
        Ok(())
    }

    pub fn archived_workflows(&self) -> Result<Vec<Workflow>, StorageError> {
        let mut workflows = Vec::new();
        for item in self.archive.iter() {
            let (_, value) = item.map_err(|e| io_error("Failed to iterate archive", e))?;
            workflows.push(decode(&value, "archived workflow")?);
        }
        Ok(workflows)
    }

    /// Insert an offload record as-is, keeping its version
    pub fn put_offload_record(&self, record: &OffloadRecord) -> Result<(), StorageError> {
        let value = serde_json::to_vec(record)?;
        self.offload
            .insert(offload_key(&record.uid, &record.version).as_bytes(), value)
            .map_err(|e| io_error("Failed to store offloaded nodes", e))?;
        Ok(())
    }

    pub fn offload_records(&self) -> Result<Vec<OffloadRecord>, StorageError> {
        let mut records = Vec::new();
        for item in self.offload.iter() {
            let (_, value) = item.map_err(|e| io_error("Failed to iterate offload store", e))?;
            records.push(decode(&value, "offload record")?);
        }
        Ok(records)
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db
            .flush()
            .map_err(|e| io_error("Failed to flush database", e))?;
        Ok(())
    }
}

#[async_trait]
impl ArchiveStore for SledStore {
    async fn count_workflows(&self, query: &ListQuery) -> Result<usize, StorageError> {
        let workflows = self.archived_workflows()?;
        Ok(query.count(workflows.iter()))
    }

    async fn list_workflows(&self, query: &ListQuery) -> Result<Vec<Workflow>, StorageError> {
        let workflows = self.archived_workflows()?;
        Ok(query.select(workflows.iter()))
    }

    async fn get_workflow_by_uid(&self, uid: &str) -> Result<Option<Workflow>, StorageError> {
        match self
            .archive
            .get(uid.as_bytes())
            .map_err(|e| io_error("Failed to get archived workflow", e))?
        {
            Some(value) => Ok(Some(decode(&value, "archived workflow")?)),
            None => Ok(None),
        }
    }

    async fn get_workflow(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Workflow>, StorageError> {
        let workflows = self.archived_workflows()?;
        Ok(newest(
            workflows
                .iter()
                .filter(|wf| wf.namespace() == namespace && wf.name() == name),
        ))
    }
}

#[async_trait]
impl OffloadStore for SledStore {
    fn policy(&self) -> OffloadPolicy {
        self.policy
    }

    async fn save(&self, uid: &str, namespace: &str, nodes: &Nodes) -> Result<String, StorageError> {
        if !self.policy.enabled {
            return Err(StorageError::OffloadDisabled);
        }
        let encoded = serde_json::to_vec(nodes)?;
        let version = node_status_version(&encoded);
        self.put_offload_record(&OffloadRecord {
            uid: uid.to_string(),
            namespace: namespace.to_string(),
            version: version.clone(),
            nodes: nodes.clone(),
        })?;
        debug!(uid, namespace, version = %version, "Offloaded node status");
        Ok(version)
    }

    async fn get(&self, uid: &str, version: &str) -> Result<Nodes, StorageError> {
        if !self.policy.enabled {
            return Err(StorageError::OffloadDisabled);
        }
        let value = self
            .offload
            .get(offload_key(uid, version).as_bytes())
            .map_err(|e| io_error("Failed to get offloaded nodes", e))?
            .ok_or_else(|| StorageError::OffloadedNodesNotFound {
                uid: uid.to_string(),
                version: version.to_string(),
            })?;
        let record: OffloadRecord = decode(&value, "offload record")?;
        Ok(record.nodes)
    }

    async fn list(&self, namespace: &str) -> Result<HashMap<UidVersion, Nodes>, StorageError> {
        if !self.policy.enabled {
            return Err(StorageError::OffloadDisabled);
        }
        Ok(self
            .offload_records()?
            .into_iter()
            .filter(|record| namespace.is_empty() || record.namespace == namespace)
            .map(|record| (UidVersion::new(record.uid, record.version), record.nodes))
            .collect())
    }
}
