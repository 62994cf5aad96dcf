//! Offload store
//!
//! Holds node mappings that are too large to live inline in the workflow record. Entries
//! are keyed by workflow uid and a content-derived version string.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::OffloadConfig;
use crate::error::StorageError;
use crate::workflow::Nodes;

/// Key of one offloaded node mapping
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UidVersion {
    pub uid: String,
    pub version: String,
}

impl UidVersion {
    pub fn new(uid: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            version: version.into(),
        }
    }
}

/// When node mappings leave the workflow record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffloadPolicy {
    pub enabled: bool,
    pub max_inline_bytes: usize,
    pub always_offload: bool,
}

impl OffloadPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            max_inline_bytes: crate::config::DEFAULT_MAX_INLINE_BYTES,
            always_offload: false,
        }
    }

    pub fn exceeds_inline_limit(&self, encoded_len: usize) -> bool {
        encoded_len > self.max_inline_bytes
    }

    pub fn should_offload(&self, encoded_len: usize) -> bool {
        self.enabled && (self.always_offload || self.exceeds_inline_limit(encoded_len))
    }
}

impl From<&OffloadConfig> for OffloadPolicy {
    fn from(config: &OffloadConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_inline_bytes: config.max_inline_bytes,
            always_offload: config.always_offload,
        }
    }
}

#[async_trait]
pub trait OffloadStore: Send + Sync {
    fn policy(&self) -> OffloadPolicy;

    fn is_enabled(&self) -> bool {
        self.policy().enabled
    }

    /// Store `nodes` and return the version they were stored under
    async fn save(&self, uid: &str, namespace: &str, nodes: &Nodes) -> Result<String, StorageError>;

    async fn get(&self, uid: &str, version: &str) -> Result<Nodes, StorageError>;

    /// Every offloaded mapping in `namespace` (empty = all namespaces)
    async fn list(&self, namespace: &str) -> Result<HashMap<UidVersion, Nodes>, StorageError>;
}

/// Content-derived version of an encoded node mapping
pub fn node_status_version(encoded: &[u8]) -> String {
    let hash = blake3::hash(encoded);
    format!("blake3:{}", hex::encode(&hash.as_bytes()[..8]))
}

/// One stored mapping, as exported into state snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OffloadRecord {
    pub uid: String,
    pub namespace: String,
    pub version: String,
    pub nodes: Nodes,
}

/// In-memory offload store
pub struct MemoryOffloadStore {
    policy: OffloadPolicy,
    records: RwLock<HashMap<UidVersion, (String, Nodes)>>,
    reads: AtomicUsize,
}

impl MemoryOffloadStore {
    pub fn new(policy: OffloadPolicy) -> Self {
        Self {
            policy,
            records: RwLock::new(HashMap::new()),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn disabled() -> Self {
        Self::new(OffloadPolicy::disabled())
    }

    pub fn with_records(policy: OffloadPolicy, records: Vec<OffloadRecord>) -> Self {
        let store = Self::new(policy);
        {
            let mut map = store.records.write();
            for record in records {
                map.insert(
                    UidVersion::new(record.uid, record.version),
                    (record.namespace, record.nodes),
                );
            }
        }
        store
    }

    /// Number of `get`/`list` calls served so far
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn records(&self) -> Vec<OffloadRecord> {
        let mut records: Vec<OffloadRecord> = self
            .records
            .read()
            .iter()
            .map(|(key, (namespace, nodes))| OffloadRecord {
                uid: key.uid.clone(),
                namespace: namespace.clone(),
                version: key.version.clone(),
                nodes: nodes.clone(),
            })
            .collect();
        records.sort_by(|a, b| (&a.uid, &a.version).cmp(&(&b.uid, &b.version)));
        records
    }
}

#[async_trait]
impl OffloadStore for MemoryOffloadStore {
    fn policy(&self) -> OffloadPolicy {
        self.policy
    }

    async fn save(&self, uid: &str, namespace: &str, nodes: &Nodes) -> Result<String, StorageError> {
        if !self.policy.enabled {
            return Err(StorageError::OffloadDisabled);
        }
        let encoded = serde_json::to_vec(nodes)?;
        let version = node_status_version(&encoded);
        self.records.write().insert(
            UidVersion::new(uid, version.clone()),
            (namespace.to_string(), nodes.clone()),
        );
        Ok(version)
    }

    async fn get(&self, uid: &str, version: &str) -> Result<Nodes, StorageError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if !self.policy.enabled {
            return Err(StorageError::OffloadDisabled);
        }
        self.records
            .read()
            .get(&UidVersion::new(uid, version))
            .map(|(_, nodes)| nodes.clone())
            .ok_or_else(|| StorageError::OffloadedNodesNotFound {
                uid: uid.to_string(),
                version: version.to_string(),
            })
    }

    async fn list(&self, namespace: &str) -> Result<HashMap<UidVersion, Nodes>, StorageError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if !self.policy.enabled {
            return Err(StorageError::OffloadDisabled);
        }
        Ok(self
            .records
            .read()
            .iter()
            .filter(|(_, (ns, _))| namespace.is_empty() || ns == namespace)
            .map(|(key, (_, nodes))| (key.clone(), nodes.clone()))
            .collect())
    }
}
