//! In-memory orchestration substrate
//!
//! Implements every substrate client trait over a single locked state. Mutations bump a
//! global revision and publish watch events while the lock is held, so a watcher that
//! subscribes under the same lock sees a gapless feed. Faults can be injected for pods
//! and creates.

use async_trait::async_trait;
use chrono::Utc;
use futures::{stream, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use tokio::sync::broadcast;
use tracing::debug;

use super::{
    CreateOptions, DeleteOptions, EventClient, ListOptions, PodClient, TemplateClient,
    WatchStream, WorkflowClient,
};
use crate::error::SubstrateError;
use crate::selector::Selector;
use crate::workflow::{
    ClusterEvent, CronWorkflow, EventType, ListMeta, ObjectMeta, WatchEvent, Workflow,
    WorkflowList,
};

const WATCH_BUFFER: usize = 1024;
const HISTORY_LIMIT: usize = 1024;

/// Namespace and name of a pod
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PodKey {
    pub namespace: String,
    pub name: String,
}

impl PodKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

struct SubstrateState {
    revision: u64,
    workflows: BTreeMap<String, Workflow>,
    pods: BTreeSet<PodKey>,
    cron_workflows: BTreeMap<String, CronWorkflow>,
    history: VecDeque<(u64, WatchEvent<Workflow>)>,
    workflow_events: broadcast::Sender<WatchEvent<Workflow>>,
    cluster_events: broadcast::Sender<ClusterEvent>,
    pod_failures: HashMap<PodKey, SubstrateError>,
    create_failure: Option<SubstrateError>,
}

impl SubstrateState {
    fn next_revision(&mut self) -> String {
        self.revision += 1;
        self.revision.to_string()
    }

    fn publish(&mut self, event: WatchEvent<Workflow>) {
        self.history.push_back((self.revision, event.clone()));
        while self.history.len() > HISTORY_LIMIT {
            self.history.pop_front();
        }
        // No receivers is fine
        let _ = self.workflow_events.send(event);
    }
}

pub struct MemorySubstrate {
    state: RwLock<SubstrateState>,
    pod_deletions: Mutex<Vec<PodKey>>,
}

impl Default for MemorySubstrate {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySubstrate {
    pub fn new() -> Self {
        let (workflow_events, _) = broadcast::channel(WATCH_BUFFER);
        let (cluster_events, _) = broadcast::channel(WATCH_BUFFER);
        Self {
            state: RwLock::new(SubstrateState {
                revision: 0,
                workflows: BTreeMap::new(),
                pods: BTreeSet::new(),
                cron_workflows: BTreeMap::new(),
                history: VecDeque::new(),
                workflow_events,
                cluster_events,
                pod_failures: HashMap::new(),
                create_failure: None,
            }),
            pod_deletions: Mutex::new(Vec::new()),
        }
    }

    /// Store a workflow as-is, filling in uid, creation time and resource version when
    /// missing. Publishes an ADDED or MODIFIED event.
    pub fn insert_workflow(&self, mut workflow: Workflow) -> Workflow {
        let mut state = self.state.write();
        if workflow.metadata.uid.is_empty() {
            workflow.metadata.uid = uuid::Uuid::new_v4().to_string();
        }
        if workflow.metadata.creation_timestamp.is_none() {
            workflow.metadata.creation_timestamp = Some(Utc::now());
        }
        workflow.metadata.resource_version = state.next_revision();
        let key = workflow.key();
        let event_type = if state.workflows.contains_key(&key) {
            EventType::Modified
        } else {
            EventType::Added
        };
        state.workflows.insert(key, workflow.clone());
        state.publish(WatchEvent::new(event_type, workflow.clone()));
        workflow
    }

    pub fn workflows(&self) -> Vec<Workflow> {
        self.state.read().workflows.values().cloned().collect()
    }

    pub fn add_pod(&self, namespace: &str, name: &str) {
        self.state.write().pods.insert(PodKey::new(namespace, name));
    }

    pub fn has_pod(&self, namespace: &str, name: &str) -> bool {
        self.state.read().pods.contains(&PodKey::new(namespace, name))
    }

    pub fn pods(&self) -> Vec<PodKey> {
        self.state.read().pods.iter().cloned().collect()
    }

    pub fn add_cron_workflow(&self, cron: CronWorkflow) {
        let key = format!("{}/{}", cron.metadata.namespace, cron.metadata.name);
        self.state.write().cron_workflows.insert(key, cron);
    }

    pub fn cron_workflows(&self) -> Vec<CronWorkflow> {
        self.state.read().cron_workflows.values().cloned().collect()
    }

    /// Make every deletion of this pod fail with `error`
    pub fn fail_pod_deletion(&self, namespace: &str, name: &str, error: SubstrateError) {
        self.state
            .write()
            .pod_failures
            .insert(PodKey::new(namespace, name), error);
    }

    /// Make the next create fail with `error`
    pub fn fail_next_create(&self, error: SubstrateError) {
        self.state.write().create_failure = Some(error);
    }

    /// Every pod deletion attempted so far, including failed ones
    pub fn pod_deletion_attempts(&self) -> Vec<PodKey> {
        self.pod_deletions.lock().clone()
    }

    /// Publish a cluster event to event watchers
    pub fn record_event(&self, event: ClusterEvent) {
        let _ = self.state.read().cluster_events.send(event);
    }

    /// End every open watch stream
    pub fn close_watches(&self) {
        let mut state = self.state.write();
        let (workflow_events, _) = broadcast::channel(WATCH_BUFFER);
        let (cluster_events, _) = broadcast::channel(WATCH_BUFFER);
        state.workflow_events = workflow_events;
        state.cluster_events = cluster_events;
    }

    fn generate_name(prefix: &str) -> String {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("{}{}", prefix, &suffix[..5])
    }
}

/// Namespace, label and field constraints shared by list and watch
struct ObjectFilter {
    namespace: String,
    labels: Selector,
    fields: Selector,
}

impl ObjectFilter {
    fn new(namespace: &str, options: &ListOptions) -> Result<Self, SubstrateError> {
        let labels = Selector::parse_labels(&options.label_selector)
            .map_err(|e| SubstrateError::Request(e.to_string()))?;
        let fields = Selector::parse_fields(&options.field_selector)
            .map_err(|e| SubstrateError::Request(e.to_string()))?;
        Ok(Self {
            namespace: namespace.to_string(),
            labels,
            fields,
        })
    }

    fn matches_meta(&self, meta: &ObjectMeta) -> bool {
        (self.namespace.is_empty() || meta.namespace == self.namespace)
            && self.labels.matches_labels(&meta.labels)
            && self.fields.matches(|key| match key {
                "metadata.name" => Some(meta.name.clone()),
                "metadata.namespace" => Some(meta.namespace.clone()),
                _ => None,
            })
    }

    fn matches_event(&self, event: &ClusterEvent) -> bool {
        (self.namespace.is_empty() || event.metadata.namespace == self.namespace)
            && self.labels.matches_labels(&event.metadata.labels)
            && self.fields.matches(|key| match key {
                "metadata.name" => Some(event.metadata.name.clone()),
                "involvedObject.kind" => Some(event.involved_object.kind.clone()),
                "involvedObject.name" => Some(event.involved_object.name.clone()),
                "involvedObject.uid" => Some(event.involved_object.uid.clone()),
                "reason" => Some(event.reason.clone()),
                "type" => Some(event.event_type.clone()),
                _ => None,
            })
    }
}

fn broadcast_stream<T>(rx: broadcast::Receiver<T>) -> impl futures::Stream<Item = Result<T, SubstrateError>>
where
    T: Clone + Send + 'static,
{
    stream::unfold(rx, |mut rx| async move {
        match rx.recv().await {
            Ok(item) => Some((Ok(item), rx)),
            Err(broadcast::error::RecvError::Lagged(missed)) => Some((
                Err(SubstrateError::Watch(format!(
                    "watch fell behind by {} events",
                    missed
                ))),
                rx,
            )),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    })
}

/// RFC 7386 JSON merge patch
fn merge_patch(target: &mut Value, patch: &Value) {
    match patch {
        Value::Object(patch_map) => {
            if !target.is_object() {
                *target = Value::Object(Map::new());
            }
            if let Value::Object(target_map) = target {
                for (key, value) in patch_map {
                    if value.is_null() {
                        target_map.remove(key);
                    } else {
                        merge_patch(target_map.entry(key.clone()).or_insert(Value::Null), value);
                    }
                }
            }
        }
        _ => *target = patch.clone(),
    }
}

#[async_trait]
impl WorkflowClient for MemorySubstrate {
    async fn create(
        &self,
        mut workflow: Workflow,
        options: CreateOptions,
    ) -> Result<Workflow, SubstrateError> {
        let mut state = self.state.write();
        if let Some(error) = state.create_failure.take() {
            return Err(error);
        }
        if workflow.metadata.name.is_empty() {
            if workflow.metadata.generate_name.is_empty() {
                return Err(SubstrateError::Request(
                    "name or generateName is required".to_string(),
                ));
            }
            workflow.metadata.name = Self::generate_name(&workflow.metadata.generate_name);
        }
        let key = workflow.key();
        if state.workflows.contains_key(&key) {
            return Err(SubstrateError::AlreadyExists {
                kind: "workflows".to_string(),
                name: workflow.metadata.name.clone(),
            });
        }
        workflow.metadata.uid = uuid::Uuid::new_v4().to_string();
        workflow.metadata.creation_timestamp = Some(Utc::now());
        if options.dry_run {
            return Ok(workflow);
        }
        workflow.metadata.resource_version = state.next_revision();
        state.workflows.insert(key, workflow.clone());
        state.publish(WatchEvent::new(EventType::Added, workflow.clone()));
        debug!(namespace = %workflow.namespace(), workflow = %workflow.name(), "Created workflow");
        Ok(workflow)
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<Workflow, SubstrateError> {
        self.state
            .read()
            .workflows
            .get(&format!("{}/{}", namespace, name))
            .cloned()
            .ok_or_else(|| SubstrateError::not_found("workflows", name))
    }

    async fn list(
        &self,
        namespace: &str,
        options: &ListOptions,
    ) -> Result<WorkflowList, SubstrateError> {
        let filter = ObjectFilter::new(namespace, options)?;
        let state = self.state.read();
        Ok(WorkflowList {
            metadata: ListMeta {
                resource_version: state.revision.to_string(),
                ..Default::default()
            },
            items: state
                .workflows
                .values()
                .filter(|wf| filter.matches_meta(&wf.metadata))
                .cloned()
                .collect(),
        })
    }

    async fn watch(
        &self,
        namespace: &str,
        options: &ListOptions,
    ) -> Result<WatchStream<Workflow>, SubstrateError> {
        let filter = ObjectFilter::new(namespace, options)?;
        let since: Option<u64> = options.resource_version.parse().ok();

        let state = self.state.read();
        let rx = state.workflow_events.subscribe();
        let replay: Vec<WatchEvent<Workflow>> = match since {
            Some(since) => state
                .history
                .iter()
                .filter(|(revision, _)| *revision > since)
                .map(|(_, event)| event.clone())
                .collect(),
            None => Vec::new(),
        };
        drop(state);

        let feed = stream::iter(replay.into_iter().map(Ok))
            .chain(broadcast_stream(rx))
            .filter(move |item| {
                let keep = match item {
                    Ok(event) => filter.matches_meta(&event.object.metadata),
                    Err(_) => true,
                };
                futures::future::ready(keep)
            });
        Ok(Box::pin(feed))
    }

    async fn update(&self, mut workflow: Workflow) -> Result<Workflow, SubstrateError> {
        let mut state = self.state.write();
        let key = workflow.key();
        let stored = state
            .workflows
            .get(&key)
            .ok_or_else(|| SubstrateError::not_found("workflows", workflow.name()))?;
        if !workflow.metadata.resource_version.is_empty()
            && workflow.metadata.resource_version != stored.metadata.resource_version
        {
            return Err(SubstrateError::Conflict(format!(
                "the object has been modified; please apply your changes to the latest version of workflow \"{}\"",
                workflow.name()
            )));
        }
        workflow.metadata.uid = stored.metadata.uid.clone();
        workflow.metadata.creation_timestamp = stored.metadata.creation_timestamp;
        workflow.metadata.resource_version = state.next_revision();
        state.workflows.insert(key, workflow.clone());
        state.publish(WatchEvent::new(EventType::Modified, workflow.clone()));
        Ok(workflow)
    }

    async fn patch(
        &self,
        namespace: &str,
        name: &str,
        merge: &Value,
    ) -> Result<Workflow, SubstrateError> {
        let mut state = self.state.write();
        let key = format!("{}/{}", namespace, name);
        let stored = state
            .workflows
            .get(&key)
            .ok_or_else(|| SubstrateError::not_found("workflows", name))?;
        let mut value = serde_json::to_value(stored)
            .map_err(|e| SubstrateError::Request(e.to_string()))?;
        merge_patch(&mut value, merge);
        let mut patched: Workflow = serde_json::from_value(value)
            .map_err(|e| SubstrateError::Request(format!("invalid patch: {}", e)))?;
        patched.metadata.resource_version = state.next_revision();
        state.workflows.insert(key, patched.clone());
        state.publish(WatchEvent::new(EventType::Modified, patched.clone()));
        Ok(patched)
    }

    async fn delete(
        &self,
        namespace: &str,
        name: &str,
        _options: DeleteOptions,
    ) -> Result<(), SubstrateError> {
        let mut state = self.state.write();
        let key = format!("{}/{}", namespace, name);
        let mut removed = state
            .workflows
            .remove(&key)
            .ok_or_else(|| SubstrateError::not_found("workflows", name))?;
        removed.metadata.resource_version = state.next_revision();
        state.publish(WatchEvent::new(EventType::Deleted, removed));
        Ok(())
    }
}

#[async_trait]
impl PodClient for MemorySubstrate {
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), SubstrateError> {
        let key = PodKey::new(namespace, name);
        self.pod_deletions.lock().push(key.clone());
        let mut state = self.state.write();
        if let Some(error) = state.pod_failures.get(&key) {
            return Err(error.clone());
        }
        if state.pods.remove(&key) {
            Ok(())
        } else {
            Err(SubstrateError::not_found("pods", name))
        }
    }
}

#[async_trait]
impl EventClient for MemorySubstrate {
    async fn watch_events(
        &self,
        namespace: &str,
        options: &ListOptions,
    ) -> Result<WatchStream<ClusterEvent>, SubstrateError> {
        let filter = ObjectFilter::new(namespace, options)?;
        let rx = self.state.read().cluster_events.subscribe();
        let feed = broadcast_stream(rx).filter_map(move |item| {
            let mapped = match item {
                Ok(event) if filter.matches_event(&event) => {
                    Some(Ok(WatchEvent::new(EventType::Added, event)))
                }
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            };
            futures::future::ready(mapped)
        });
        Ok(Box::pin(feed))
    }
}

#[async_trait]
impl TemplateClient for MemorySubstrate {
    async fn get_cron_workflow(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<CronWorkflow, SubstrateError> {
        self.state
            .read()
            .cron_workflows
            .get(&format!("{}/{}", namespace, name))
            .cloned()
            .ok_or_else(|| SubstrateError::not_found("cronworkflows", name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_generates_names() {
        let substrate = MemorySubstrate::new();
        let mut wf = Workflow::default();
        wf.metadata.namespace = "ns1".to_string();
        wf.metadata.generate_name = "hello-".to_string();
        let created = substrate.create(wf, CreateOptions::default()).await.unwrap();
        assert!(created.name().starts_with("hello-"));
        assert_eq!(created.name().len(), "hello-".len() + 5);
        assert!(!created.uid().is_empty());

        let missing = substrate
            .create(Workflow::default(), CreateOptions::default())
            .await;
        assert!(matches!(missing, Err(SubstrateError::Request(_))));
    }

    #[tokio::test]
    async fn test_dry_run_create_is_not_stored() {
        let substrate = MemorySubstrate::new();
        let created = substrate
            .create(Workflow::new("ns1", "dry"), CreateOptions { dry_run: true })
            .await
            .unwrap();
        assert_eq!(created.name(), "dry");
        assert!(substrate.get("ns1", "dry").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_update_rejects_stale_version() {
        let substrate = MemorySubstrate::new();
        let stored = substrate.insert_workflow(Workflow::new("ns1", "a"));
        let mut first = stored.clone();
        first.spec.suspend = Some(true);
        substrate.update(first).await.unwrap();

        let stale = stored;
        assert!(matches!(
            substrate.update(stale).await,
            Err(SubstrateError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_merge_patch_removes_finalizers() {
        let substrate = MemorySubstrate::new();
        let mut wf = Workflow::new("ns1", "a");
        wf.metadata.finalizers = vec!["workflows.flowgate.io/artifact-gc".to_string()];
        substrate.insert_workflow(wf);

        let patched = substrate
            .patch("ns1", "a", &json!({"metadata": {"finalizers": null}}))
            .await
            .unwrap();
        assert!(patched.metadata.finalizers.is_empty());
        assert_eq!(patched.name(), "a");
    }

    #[tokio::test]
    async fn test_pod_deletion_faults() {
        let substrate = MemorySubstrate::new();
        substrate.add_pod("ns1", "p1");
        substrate.fail_pod_deletion("ns1", "p2", SubstrateError::Request("denied".to_string()));

        substrate.delete_pod("ns1", "p1").await.unwrap();
        assert!(substrate.delete_pod("ns1", "p1").await.unwrap_err().is_not_found());
        assert!(matches!(
            substrate.delete_pod("ns1", "p2").await,
            Err(SubstrateError::Request(_))
        ));
        assert_eq!(substrate.pod_deletion_attempts().len(), 3);
    }

    #[tokio::test]
    async fn test_watch_replays_from_resource_version() {
        let substrate = MemorySubstrate::new();
        let first = substrate.insert_workflow(Workflow::new("ns1", "a"));
        substrate.insert_workflow(Workflow::new("ns1", "b"));
        substrate.insert_workflow(Workflow::new("ns2", "c"));

        let options = ListOptions {
            resource_version: first.metadata.resource_version.clone(),
            ..Default::default()
        };
        let mut feed = substrate.watch("ns1", &options).await.unwrap();
        let event = feed.next().await.unwrap().unwrap();
        assert_eq!(event.event_type, EventType::Added);
        assert_eq!(event.object.name(), "b");

        substrate.close_watches();
        assert!(feed.next().await.is_none());
    }

    #[tokio::test]
    async fn test_list_applies_selectors() {
        let substrate = MemorySubstrate::new();
        let mut labelled = Workflow::new("ns1", "a");
        labelled.metadata.labels.insert("team".to_string(), "data".to_string());
        substrate.insert_workflow(labelled);
        substrate.insert_workflow(Workflow::new("ns1", "b"));

        let options = ListOptions {
            label_selector: "team=data".to_string(),
            ..Default::default()
        };
        let list = substrate.list("ns1", &options).await.unwrap();
        assert_eq!(list.items.len(), 1);

        let options = ListOptions {
            field_selector: "metadata.name=b".to_string(),
            ..Default::default()
        };
        let list = substrate.list("", &options).await.unwrap();
        assert_eq!(list.items[0].name(), "b");
    }
}
