//! Data sources
//!
//! Client traits for the orchestration substrate and the adapters the query layer reads
//! through: a live source (direct substrate listing or a reflector cache) and an archive
//! store for completed workflows.

pub mod archive;
pub mod cache;
pub mod live;
pub mod memory;

pub use archive::{ArchiveStore, MemoryArchive};
pub use cache::{CachedLiveSource, WorkflowReflector};
pub use live::ClientLiveSource;
pub use memory::MemorySubstrate;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;

use crate::error::{ApiError, SubstrateError};
use crate::query::ListQuery;
use crate::workflow::{ClusterEvent, CronWorkflow, WatchEvent, Workflow, WorkflowList};

/// Stream of watch events from the substrate
pub type WatchStream<T> =
    Pin<Box<dyn Stream<Item = Result<WatchEvent<T>, SubstrateError>> + Send>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListOptions {
    pub label_selector: String,
    pub field_selector: String,
    pub resource_version: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Propagation {
    #[default]
    Background,
    Foreground,
    Orphan,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    pub propagation: Propagation,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreateOptions {
    pub dry_run: bool,
}

/// Workflow primitives of the orchestration substrate
#[async_trait]
pub trait WorkflowClient: Send + Sync {
    async fn create(
        &self,
        workflow: Workflow,
        options: CreateOptions,
    ) -> Result<Workflow, SubstrateError>;

    async fn get(&self, namespace: &str, name: &str) -> Result<Workflow, SubstrateError>;

    /// List workflows; an empty namespace lists all namespaces
    async fn list(
        &self,
        namespace: &str,
        options: &ListOptions,
    ) -> Result<WorkflowList, SubstrateError>;

    async fn watch(
        &self,
        namespace: &str,
        options: &ListOptions,
    ) -> Result<WatchStream<Workflow>, SubstrateError>;

    /// Replace the stored workflow; a stale resource version is a conflict
    async fn update(&self, workflow: Workflow) -> Result<Workflow, SubstrateError>;

    /// Apply a JSON merge patch
    async fn patch(
        &self,
        namespace: &str,
        name: &str,
        merge_patch: &serde_json::Value,
    ) -> Result<Workflow, SubstrateError>;

    async fn delete(
        &self,
        namespace: &str,
        name: &str,
        options: DeleteOptions,
    ) -> Result<(), SubstrateError>;
}

/// Execution unit cleanup
#[async_trait]
pub trait PodClient: Send + Sync {
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), SubstrateError>;
}

#[async_trait]
pub trait EventClient: Send + Sync {
    async fn watch_events(
        &self,
        namespace: &str,
        options: &ListOptions,
    ) -> Result<WatchStream<ClusterEvent>, SubstrateError>;
}

#[async_trait]
pub trait TemplateClient: Send + Sync {
    async fn get_cron_workflow(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<CronWorkflow, SubstrateError>;
}

/// List-watch pair the reflector cache is built on
#[async_trait]
pub trait ListWatch: Send + Sync {
    async fn list(&self, options: &ListOptions) -> Result<WorkflowList, SubstrateError>;
    async fn watch(&self, options: &ListOptions) -> Result<WatchStream<Workflow>, SubstrateError>;
}

/// `ListWatch` over one namespace (or all, when empty) of a workflow client
pub struct NamespacedListWatch {
    client: Arc<dyn WorkflowClient>,
    namespace: String,
    label_selector: String,
}

impl NamespacedListWatch {
    pub fn new(client: Arc<dyn WorkflowClient>, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            label_selector: String::new(),
        }
    }

    /// Restrict the cache to workflows matching `label_selector`
    pub fn with_label_selector(mut self, label_selector: impl Into<String>) -> Self {
        self.label_selector = label_selector.into();
        self
    }

    fn scoped(&self, options: &ListOptions) -> ListOptions {
        let mut scoped = options.clone();
        if !self.label_selector.is_empty() {
            scoped.label_selector = if scoped.label_selector.is_empty() {
                self.label_selector.clone()
            } else {
                format!("{},{}", scoped.label_selector, self.label_selector)
            };
        }
        scoped
    }
}

#[async_trait]
impl ListWatch for NamespacedListWatch {
    async fn list(&self, options: &ListOptions) -> Result<WorkflowList, SubstrateError> {
        self.client.list(&self.namespace, &self.scoped(options)).await
    }

    async fn watch(&self, options: &ListOptions) -> Result<WatchStream<Workflow>, SubstrateError> {
        self.client.watch(&self.namespace, &self.scoped(options)).await
    }
}

/// Count/list of workflows still owned by the substrate
#[async_trait]
pub trait LiveSource: Send + Sync {
    async fn count_workflows(&self, query: &ListQuery) -> Result<usize, ApiError>;

    /// The page at `query.offset`/`query.limit`, ordered canonically
    async fn list_workflows(&self, query: &ListQuery) -> Result<WorkflowList, ApiError>;
}
