//! Archive source
//!
//! Completed workflows that were moved out of the substrate. Read-mostly: lifecycle
//! operations never write here.

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::StorageError;
use crate::query::ListQuery;
use crate::workflow::Workflow;

#[async_trait]
pub trait ArchiveStore: Send + Sync {
    async fn count_workflows(&self, query: &ListQuery) -> Result<usize, StorageError>;

    /// The page at `query.offset`/`query.limit` (0 = unlimited)
    async fn list_workflows(&self, query: &ListQuery) -> Result<Vec<Workflow>, StorageError>;

    async fn get_workflow_by_uid(&self, uid: &str) -> Result<Option<Workflow>, StorageError>;

    /// Most recently created archived workflow with this namespace and name
    async fn get_workflow(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Workflow>, StorageError>;
}

/// Pick the newest of several archived runs that share a name
pub(crate) fn newest<'a, I>(candidates: I) -> Option<Workflow>
where
    I: IntoIterator<Item = &'a Workflow>,
{
    candidates
        .into_iter()
        .max_by_key(|wf| wf.metadata.creation_timestamp)
        .cloned()
}

/// In-memory archive
#[derive(Default)]
pub struct MemoryArchive {
    items: RwLock<Vec<Workflow>>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_workflows(items: Vec<Workflow>) -> Self {
        Self {
            items: RwLock::new(items),
        }
    }

    /// Archive a workflow, replacing any earlier record with the same uid
    pub fn archive(&self, workflow: Workflow) {
        let mut items = self.items.write();
        items.retain(|wf| wf.uid() != workflow.uid());
        items.push(workflow);
    }

    pub fn workflows(&self) -> Vec<Workflow> {
        self.items.read().clone()
    }
}

#[async_trait]
impl ArchiveStore for MemoryArchive {
    async fn count_workflows(&self, query: &ListQuery) -> Result<usize, StorageError> {
        Ok(query.count(self.items.read().iter()))
    }

    async fn list_workflows(&self, query: &ListQuery) -> Result<Vec<Workflow>, StorageError> {
        Ok(query.select(self.items.read().iter()))
    }

    async fn get_workflow_by_uid(&self, uid: &str) -> Result<Option<Workflow>, StorageError> {
        Ok(self.items.read().iter().find(|wf| wf.uid() == uid).cloned())
    }

    async fn get_workflow(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Workflow>, StorageError> {
        let items = self.items.read();
        Ok(newest(
            items
                .iter()
                .filter(|wf| wf.namespace() == namespace && wf.name() == name),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn archived(name: &str, uid: &str, created_days_ago: i64) -> Workflow {
        let mut wf = Workflow::new("ns1", name);
        wf.metadata.uid = uid.to_string();
        wf.metadata.creation_timestamp = Some(Utc::now() - Duration::days(created_days_ago));
        wf.status.finished_at = Some(Utc::now() - Duration::days(created_days_ago - 1));
        wf
    }

    #[tokio::test]
    async fn test_get_returns_newest_run() {
        let archive = MemoryArchive::from_workflows(vec![
            archived("nightly", "u-old", 5),
            archived("nightly", "u-new", 2),
            archived("other", "u-other", 3),
        ]);
        let found = archive.get_workflow("ns1", "nightly").await.unwrap().unwrap();
        assert_eq!(found.uid(), "u-new");
        assert!(archive.get_workflow("ns2", "nightly").await.unwrap().is_none());
        assert_eq!(
            archive.get_workflow_by_uid("u-old").await.unwrap().unwrap().uid(),
            "u-old"
        );
    }

    #[tokio::test]
    async fn test_archive_replaces_same_uid() {
        let archive = MemoryArchive::new();
        archive.archive(archived("a", "u1", 3));
        archive.archive(archived("a", "u1", 2));
        assert_eq!(archive.count_workflows(&ListQuery::new("ns1")).await.unwrap(), 1);
    }
}
