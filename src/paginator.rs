//! Hybrid pagination over the live source and the archive
//!
//! The two sources are addressed as one concatenation, live first. A window
//! (`offset`, `limit`) is cut from the live part, then the archive supplies whatever the
//! window still needs. Each page is re-sorted canonically; ordering across pages is only
//! as good as the sources' own ordering.

use std::sync::Arc;
use tracing::debug;

use crate::error::ApiError;
use crate::query::ListQuery;
use crate::source::{ArchiveStore, LiveSource};
use crate::workflow::{sort_workflows, ListMeta, WorkflowList};

pub struct HybridPaginator {
    live: Arc<dyn LiveSource>,
    archive: Arc<dyn ArchiveStore>,
}

impl HybridPaginator {
    pub fn new(live: Arc<dyn LiveSource>, archive: Arc<dyn ArchiveStore>) -> Self {
        Self { live, archive }
    }

    pub async fn list(&self, query: &ListQuery) -> Result<WorkflowList, ApiError> {
        let offset = query.offset;
        let limit = query.limit;

        let live_count = self.live.count_workflows(query).await?;
        let archive_count = self.archive.count_workflows(query).await?;
        let total = live_count.saturating_add(archive_count);

        let mut items = Vec::new();
        let mut resource_version = String::new();
        if live_count > 0 && (limit == 0 || offset < live_count) {
            let page = self.live.list_workflows(query).await?;
            resource_version = page.metadata.resource_version;
            items = page.items;
        }

        if limit == 0 || offset.saturating_add(limit) > live_count {
            let (archive_offset, archive_limit) = if offset >= live_count {
                (offset - live_count, limit)
            } else {
                (0, limit.saturating_sub(items.len()))
            };
            if limit == 0 || archive_limit > 0 {
                let archive_query = query.clone().with_window(archive_offset, archive_limit);
                items.extend(self.archive.list_workflows(&archive_query).await?);
            }
        }

        sort_workflows(&mut items);

        let end = offset.saturating_add(items.len());
        let remaining = total.saturating_sub(end);
        let mut metadata = ListMeta {
            resource_version,
            ..Default::default()
        };
        if remaining > 0 {
            metadata.continue_token = end.to_string();
        }
        if query.show_remaining_item_count {
            metadata.remaining_item_count = Some(remaining as u64);
        }

        debug!(
            namespace = %query.namespace,
            offset,
            limit,
            live_count,
            archive_count,
            returned = items.len(),
            remaining,
            "Listed workflows"
        );

        Ok(WorkflowList { metadata, items })
    }
}
