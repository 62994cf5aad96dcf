//! Read operations: get, list, watch, event watch and pod logs

use futures::StreamExt;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::requests::{
    WatchEventsRequest, WatchWorkflowsRequest, WorkflowGetRequest, WorkflowListRequest,
};
use super::WorkflowServer;
use crate::auth::Verb;
use crate::error::{to_status, Code, Status};
use crate::fields::{Cleaner, WATCH_OBJECT_PREFIX};
use crate::logs::{LogRequest, LogStream};
use crate::query::{parse_continue_token, ListQuery, NameFilter};
use crate::selector::{recover_workflow_name, with_workflow_name, Selector};
use crate::source::ListOptions;
use crate::stream::StreamSink;
use crate::workflow::{ClusterEvent, WatchEvent, Workflow, WorkflowList};

impl WorkflowServer {
    pub async fn get_workflow(&self, req: &WorkflowGetRequest) -> Result<Workflow, Status> {
        let mut wf = self.resolver.resolve(&req.namespace, &req.name).await?;
        let cleaner = Cleaner::parse(&req.fields);
        if !cleaner.will_exclude("status.nodes") {
            self.hydrator
                .hydrate(&mut wf)
                .await
                .map_err(|e| to_status(e, Code::Internal))?;
        }
        cleaner.clean(wf).map_err(|e| to_status(e, Code::Internal))
    }

    pub async fn list_workflows(&self, req: &WorkflowListRequest) -> Result<WorkflowList, Status> {
        let offset = parse_continue_token(&req.continue_token)
            .map_err(|e| to_status(e, Code::InvalidArgument))?;
        let mut label_selector = Selector::parse_labels(&req.label_selector)
            .map_err(|e| to_status(e, Code::InvalidArgument))?;
        self.instance_id.with_selector(&mut label_selector);
        let name_filter =
            NameFilter::from_str(&req.name_filter).map_err(|e| to_status(e, Code::InvalidArgument))?;

        let allowed = self
            .permissions
            .can_i(Verb::List, "workflows", &req.namespace, "")
            .await
            .map_err(|e| to_status(e, Code::Internal))?;
        if !allowed {
            return Err(Status::permission_denied(format!(
                "Permission denied, you are not allowed to list workflows in namespace \"{}\". Maybe you want to specify a namespace with query parameter `.namespace={}`?",
                req.namespace, req.namespace
            )));
        }

        let query = ListQuery {
            namespace: req.namespace.clone(),
            name: req.name.clone(),
            name_filter,
            created_after: req.created_after,
            finished_before: req.finished_before,
            label_selector,
            offset,
            limit: req.limit,
            show_remaining_item_count: req.show_remaining_item_count,
        };
        let mut list = self
            .paginator_for(&req.namespace)
            .list(&query)
            .await
            .map_err(|e| to_status(e, Code::Internal))?;

        let cleaner = Cleaner::parse(&req.fields);
        if self.hydrator.offload_store().is_enabled() && !cleaner.will_exclude("items.status.nodes") {
            self.hydrator
                .hydrate_all(&req.namespace, &mut list.items)
                .await
                .map_err(|e| to_status(e, Code::Internal))?;
        }
        debug!(
            namespace = %req.namespace,
            offset,
            limit = req.limit,
            returned = list.items.len(),
            "Listed workflows"
        );
        cleaner.clean(list).map_err(|e| to_status(e, Code::Internal))
    }

    /// Stream workflow events into `sink` until `cancel` fires or the source fails
    ///
    /// A closed source ends the call with ResourceExhausted; cancellation ends it cleanly.
    pub async fn watch_workflows(
        &self,
        req: &WatchWorkflowsRequest,
        sink: &mut dyn StreamSink<WatchEvent<Workflow>>,
        cancel: CancellationToken,
    ) -> Result<(), Status> {
        let mut options = ListOptions {
            label_selector: req.label_selector.clone(),
            field_selector: req.field_selector.clone(),
            resource_version: req.resource_version.clone(),
        };
        if let Some(name) = recover_workflow_name(&req.field_selector) {
            let wf = self
                .resolver
                .resolve(&req.namespace, &name)
                .await
                .map_err(|e| to_status(e, Code::Internal))?;
            options.field_selector = with_workflow_name(&req.field_selector, wf.name());
        }
        self.instance_id.with(&mut options);

        let mut stream = self
            .client
            .watch(&req.namespace, &options)
            .await
            .map_err(|e| to_status(e, Code::Internal))?;
        let cleaner = Cleaner::parse(&req.fields).without_prefix(WATCH_OBJECT_PREFIX);
        let hydrate = !cleaner.will_exclude("status.nodes");

        sink.send_header()
            .await
            .map_err(|e| to_status(e, Code::Internal))?;
        info!(
            namespace = %req.namespace,
            field_selector = %options.field_selector,
            label_selector = %options.label_selector,
            "Watching workflows"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(namespace = %req.namespace, "Workflow watch cancelled");
                    return Ok(());
                }
                next = stream.next() => {
                    let event = match next {
                        None => {
                            return Err(Status::resource_exhausted("workflow watch stream closed"));
                        }
                        Some(Err(e)) => {
                            warn!(namespace = %req.namespace, error = %e, "Workflow watch failed");
                            return Err(to_status(e, Code::Internal));
                        }
                        Some(Ok(event)) => event,
                    };
                    let mut wf = event.object;
                    if hydrate {
                        self.hydrator
                            .hydrate(&mut wf)
                            .await
                            .map_err(|e| to_status(e, Code::Internal))?;
                    }
                    let wf = cleaner.clean(wf).map_err(|e| to_status(e, Code::Internal))?;
                    debug!(workflow = %wf.name(), event_type = ?event.event_type, "Sending workflow event");
                    sink.send(WatchEvent::new(event.event_type, wf))
                        .await
                        .map_err(|e| to_status(e, Code::Internal))?;
                }
            }
        }
    }

    /// Stream raw cluster events into `sink`; same termination rules as workflow watches
    pub async fn watch_events(
        &self,
        req: &WatchEventsRequest,
        sink: &mut dyn StreamSink<ClusterEvent>,
        cancel: CancellationToken,
    ) -> Result<(), Status> {
        let mut options = ListOptions {
            label_selector: req.label_selector.clone(),
            field_selector: req.field_selector.clone(),
            ..Default::default()
        };
        self.instance_id.with(&mut options);
        let mut stream = self
            .events
            .watch_events(&req.namespace, &options)
            .await
            .map_err(|e| to_status(e, Code::Internal))?;

        sink.send_header()
            .await
            .map_err(|e| to_status(e, Code::Internal))?;
        info!(
            namespace = %req.namespace,
            label_selector = %options.label_selector,
            "Watching events"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(namespace = %req.namespace, "Event watch cancelled");
                    return Ok(());
                }
                next = stream.next() => {
                    let event = match next {
                        None => return Err(Status::resource_exhausted("event watch stream closed")),
                        Some(Err(e)) => return Err(to_status(e, Code::Internal)),
                        Some(Ok(event)) => event.object,
                    };
                    sink.send(event)
                        .await
                        .map_err(|e| to_status(e, Code::Internal))?;
                }
            }
        }
    }

    pub async fn pod_logs(&self, req: &LogRequest) -> Result<LogStream, Status> {
        let wf = self.resolve_managed(&req.namespace, &req.name).await?;
        self.logs
            .workflow_logs(&wf, req)
            .await
            .map_err(|e| to_status(e, Code::Internal))
    }
}
