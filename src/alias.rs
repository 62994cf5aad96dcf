//! Workflow name resolution
//!
//! Turns a name or the `@latest` alias into a concrete live workflow, falling back to
//! the archive when the live lookup fails.

use std::sync::Arc;
use tracing::{debug, error};

use crate::auth::{PermissionChecker, Verb};
use crate::error::{to_status, ApiError, Code, Status};
use crate::source::{ArchiveStore, ListOptions, WorkflowClient};
use crate::workflow::Workflow;

pub const LATEST_ALIAS: &str = "@latest";

pub struct AliasResolver {
    client: Arc<dyn WorkflowClient>,
    archive: Arc<dyn ArchiveStore>,
    permissions: Arc<dyn PermissionChecker>,
}

impl AliasResolver {
    pub fn new(
        client: Arc<dyn WorkflowClient>,
        archive: Arc<dyn ArchiveStore>,
        permissions: Arc<dyn PermissionChecker>,
    ) -> Self {
        Self {
            client,
            archive,
            permissions,
        }
    }

    pub async fn resolve(&self, namespace: &str, name: &str) -> Result<Workflow, Status> {
        if name == LATEST_ALIAS {
            return self.latest(namespace).await;
        }
        self.get(namespace, name).await
    }

    /// Most recently created live workflow; the first one listed wins ties
    async fn latest(&self, namespace: &str) -> Result<Workflow, Status> {
        let list = self
            .client
            .list(namespace, &ListOptions::default())
            .await
            .map_err(|e| Status::internal(e.to_string()))?;
        let mut latest: Option<Workflow> = None;
        for wf in list.items {
            let newer = match &latest {
                None => true,
                Some(current) => current.metadata.creation_timestamp < wf.metadata.creation_timestamp,
            };
            if newer {
                latest = Some(wf);
            }
        }
        let latest = latest.ok_or_else(|| Status::not_found("no workflows found"))?;
        debug!(namespace, workflow = %latest.name(), alias = LATEST_ALIAS, "Resolved alias");
        Ok(latest)
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<Workflow, Status> {
        let orig_err = match self.client.get(namespace, name).await {
            Ok(wf) => return Ok(wf),
            Err(e) => ApiError::from(e),
        };

        let allowed = match self
            .permissions
            .can_i(Verb::Get, "workflows", namespace, name)
            .await
        {
            Ok(allowed) => allowed,
            Err(e) => {
                error!(
                    namespace,
                    workflow = name,
                    error = %orig_err,
                    permission_error = %e,
                    "Failed to get live workflow and failed to check archive permission"
                );
                return Err(to_status(orig_err, Code::Internal));
            }
        };
        if !allowed {
            error!(
                namespace,
                workflow = name,
                error = %orig_err,
                "Failed to get live workflow and not permitted to read the archive"
            );
            return Err(to_status(orig_err, Code::Internal));
        }

        match self.archive.get_workflow(namespace, name).await {
            Ok(Some(wf)) => {
                debug!(namespace, workflow = name, "Resolved workflow from archive");
                Ok(wf)
            }
            Ok(None) => {
                error!(
                    namespace,
                    workflow = name,
                    error = %orig_err,
                    archive_error = "not found",
                    "Failed to get workflow from live source and archive"
                );
                Err(to_status(orig_err, Code::Internal))
            }
            Err(archive_err) => {
                error!(
                    namespace,
                    workflow = name,
                    error = %orig_err,
                    archive_error = %archive_err,
                    "Failed to get workflow from live source and archive"
                );
                Err(to_status(orig_err, Code::Internal))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AllowAll, DenyList};
    use crate::source::{MemoryArchive, MemorySubstrate};
    use chrono::{Duration, Utc};

    fn resolver(
        substrate: Arc<MemorySubstrate>,
        archive: Arc<MemoryArchive>,
        permissions: Arc<dyn PermissionChecker>,
    ) -> AliasResolver {
        AliasResolver::new(substrate, archive, permissions)
    }

    #[tokio::test]
    async fn test_latest_picks_newest_creation() {
        let substrate = Arc::new(MemorySubstrate::new());
        let now = Utc::now();
        for (name, age) in [("old", 3), ("newest", 1), ("middle", 2)] {
            let mut wf = Workflow::new("ns1", name);
            wf.metadata.creation_timestamp = Some(now - Duration::hours(age));
            substrate.insert_workflow(wf);
        }
        let resolver = resolver(substrate, Arc::new(MemoryArchive::new()), Arc::new(AllowAll));
        let wf = resolver.resolve("ns1", LATEST_ALIAS).await.unwrap();
        assert_eq!(wf.name(), "newest");
    }

    #[tokio::test]
    async fn test_latest_in_empty_namespace() {
        let resolver = resolver(
            Arc::new(MemorySubstrate::new()),
            Arc::new(MemoryArchive::new()),
            Arc::new(AllowAll),
        );
        let err = resolver.resolve("empty", LATEST_ALIAS).await.unwrap_err();
        assert_eq!(err.code(), Code::NotFound);
        assert_eq!(err.message(), "no workflows found");
    }

    #[tokio::test]
    async fn test_archive_fallback() {
        let mut archived = Workflow::new("ns1", "done");
        archived.metadata.uid = "uid-done".to_string();
        let resolver = resolver(
            Arc::new(MemorySubstrate::new()),
            Arc::new(MemoryArchive::from_workflows(vec![archived])),
            Arc::new(AllowAll),
        );
        let wf = resolver.resolve("ns1", "done").await.unwrap();
        assert_eq!(wf.uid(), "uid-done");
    }

    #[tokio::test]
    async fn test_denied_archive_surfaces_live_error() {
        let mut archived = Workflow::new("ns1", "done");
        archived.metadata.uid = "uid-done".to_string();
        let resolver = resolver(
            Arc::new(MemorySubstrate::new()),
            Arc::new(MemoryArchive::from_workflows(vec![archived])),
            Arc::new(DenyList::new().deny(Verb::Get, "workflows")),
        );
        let err = resolver.resolve("ns1", "done").await.unwrap_err();
        assert_eq!(err.code(), Code::NotFound);
        assert_ne!(err.code(), Code::PermissionDenied);
    }

    #[tokio::test]
    async fn test_missing_everywhere_surfaces_live_error() {
        let resolver = resolver(
            Arc::new(MemorySubstrate::new()),
            Arc::new(MemoryArchive::new()),
            Arc::new(AllowAll),
        );
        let err = resolver.resolve("ns1", "ghost").await.unwrap_err();
        assert_eq!(err.code(), Code::NotFound);
        assert!(err.message().contains("ghost"));
    }
}
