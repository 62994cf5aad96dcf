//! Status hydration
//!
//! A dehydrated workflow carries an offload version marker instead of its node mapping.
//! `hydrate` restores the mapping from the offload store; `dehydrate` moves it out when
//! the store's policy asks for it. Neither touches phase or spec.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::offload::OffloadStore;
use crate::workflow::Workflow;

pub struct Hydrator {
    offload: Arc<dyn OffloadStore>,
}

impl Hydrator {
    pub fn new(offload: Arc<dyn OffloadStore>) -> Self {
        Self { offload }
    }

    pub fn offload_store(&self) -> &Arc<dyn OffloadStore> {
        &self.offload
    }

    pub fn is_hydrated(wf: &Workflow) -> bool {
        !wf.status.is_offloaded()
    }

    pub async fn hydrate(&self, wf: &mut Workflow) -> Result<(), StorageError> {
        let Some(version) = wf.status.offload_node_status_version.clone() else {
            return Ok(());
        };
        if !self.offload.is_enabled() {
            return Err(StorageError::OffloadDisabled);
        }
        let nodes = self.offload.get(wf.uid(), &version).await?;
        debug!(
            workflow = %wf.name(),
            version = %version,
            nodes = nodes.len(),
            "Hydrated workflow"
        );
        wf.status.nodes = nodes;
        wf.status.offload_node_status_version = None;
        Ok(())
    }

    /// Hydrate every offloaded workflow of a list with one store read
    ///
    /// A workflow whose offloaded mapping is gone keeps its marker and an empty mapping;
    /// the rest of the list is still hydrated.
    pub async fn hydrate_all(
        &self,
        namespace: &str,
        workflows: &mut [Workflow],
    ) -> Result<(), StorageError> {
        if workflows.iter().all(Self::is_hydrated) {
            return Ok(());
        }
        if !self.offload.is_enabled() {
            return Err(StorageError::OffloadDisabled);
        }
        let mut offloaded = self.offload.list(namespace).await?;
        for wf in workflows.iter_mut() {
            let Some(version) = wf.status.offload_node_status_version.clone() else {
                continue;
            };
            let key = crate::offload::UidVersion::new(wf.uid(), version.clone());
            match offloaded.remove(&key) {
                Some(nodes) => {
                    wf.status.nodes = nodes;
                    wf.status.offload_node_status_version = None;
                }
                // the marker stays so callers can tell the mapping is missing, not empty
                None => {
                    warn!(
                        namespace = %wf.namespace(),
                        workflow = %wf.name(),
                        version = %version,
                        "Offloaded node status not found"
                    );
                    wf.status.nodes.clear();
                }
            }
        }
        Ok(())
    }

    pub async fn dehydrate(&self, wf: &mut Workflow) -> Result<(), StorageError> {
        if wf.status.is_offloaded() || wf.status.nodes.is_empty() {
            return Ok(());
        }
        let encoded = serde_json::to_vec(&wf.status.nodes)?;
        let policy = self.offload.policy();
        if policy.should_offload(encoded.len()) {
            let version = self
                .offload
                .save(wf.uid(), wf.namespace(), &wf.status.nodes)
                .await?;
            debug!(
                workflow = %wf.name(),
                version = %version,
                bytes = encoded.len(),
                "Offloaded node status"
            );
            wf.status.nodes.clear();
            wf.status.offload_node_status_version = Some(version);
            return Ok(());
        }
        if !policy.enabled && policy.exceeds_inline_limit(encoded.len()) {
            return Err(StorageError::TooLarge {
                name: wf.name().to_string(),
                size: encoded.len(),
                limit: policy.max_inline_bytes,
            });
        }
        Ok(())
    }
}
