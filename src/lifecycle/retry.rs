//! Retry reformulation and stale pod cleanup

use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::apply_parameter_overrides;
use crate::error::{ApiError, SubstrateError};
use crate::selector::Selector;
use crate::source::PodClient;
use crate::workflow::{Node, NodeType, Nodes, Phase, Workflow, LABEL_COMPLETED, LABEL_PHASE};

/// Pods to delete before a retried workflow is persisted, ordered and de-duplicated
pub type RetriedPodSet = BTreeSet<String>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryOptions {
    pub restart_successful: bool,
    pub node_selector: Selector,
    /// `name=value` overrides for `spec.arguments.parameters`
    pub parameters: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeFate {
    Keep,
    ResetGroup,
    Remove,
}

fn pod_of(node: &Node) -> Option<String> {
    match &node.pod_name {
        Some(pod) => Some(pod.clone()),
        None if node.node_type == NodeType::Pod => Some(node.id.clone()),
        None => None,
    }
}

fn reset_group(node: &mut Node) {
    node.phase = Some(Phase::Running);
    node.finished_at = None;
    node.message.clear();
}

/// Turn a failed workflow back into a running one
///
/// Returns the reformulated workflow and the pods whose nodes were dropped.
pub fn formulate_retry(
    mut wf: Workflow,
    opts: &RetryOptions,
) -> Result<(Workflow, RetriedPodSet), ApiError> {
    match wf.status.phase {
        Phase::Failed | Phase::Error | Phase::Terminated => {}
        Phase::Succeeded if opts.restart_successful && !opts.node_selector.is_empty() => {}
        phase => {
            return Err(ApiError::Lifecycle(format!(
                "workflow must be Failed/Error/Terminated to retry, but \"{}\" is {}",
                wf.name(),
                phase
            )))
        }
    }

    let mut fates: BTreeMap<String, NodeFate> = BTreeMap::new();
    for (id, node) in &wf.status.nodes {
        let reset = match node.phase {
            Some(Phase::Succeeded) => {
                node.is_exit_handler()
                    || (opts.restart_successful && opts.node_selector.matches_node(node))
            }
            Some(Phase::Failed) | Some(Phase::Error) | Some(Phase::Terminated) => true,
            other => {
                return Err(ApiError::Lifecycle(format!(
                    "workflow cannot be retried with node {} in {} phase",
                    node.name,
                    other.map(|p| p.as_str()).unwrap_or("unstarted")
                )))
            }
        };
        let fate = match (reset, node.node_type.is_group()) {
            (false, _) => NodeFate::Keep,
            (true, true) => NodeFate::ResetGroup,
            (true, false) => NodeFate::Remove,
        };
        fates.insert(id.clone(), fate);
    }

    // Group ancestors of anything reset must run again too
    let mut parents: BTreeMap<&str, &str> = BTreeMap::new();
    for (id, node) in &wf.status.nodes {
        for child in &node.children {
            parents.insert(child.as_str(), id.as_str());
        }
    }
    let mut ancestors: HashSet<String> = HashSet::new();
    for (id, fate) in &fates {
        if *fate == NodeFate::Keep {
            continue;
        }
        let mut current = id.as_str();
        while let Some(&parent) = parents.get(current) {
            if !ancestors.insert(parent.to_string()) {
                break;
            }
            current = parent;
        }
    }
    for id in ancestors {
        let is_group = wf
            .status
            .nodes
            .get(&id)
            .map(|n| n.node_type.is_group())
            .unwrap_or(false);
        if let Some(fate) = fates.get_mut(&id) {
            if *fate == NodeFate::Keep && is_group {
                *fate = NodeFate::ResetGroup;
            }
        }
    }

    let mut pods = RetriedPodSet::new();
    let mut nodes = Nodes::new();
    for (id, mut node) in std::mem::take(&mut wf.status.nodes) {
        match fates.get(&id).copied().unwrap_or(NodeFate::Keep) {
            NodeFate::Keep => {
                nodes.insert(id, node);
            }
            NodeFate::ResetGroup => {
                reset_group(&mut node);
                nodes.insert(id, node);
            }
            NodeFate::Remove => {
                if let Some(pod) = pod_of(&node) {
                    pods.insert(pod);
                }
            }
        }
    }
    let kept: HashSet<String> = nodes.keys().cloned().collect();
    for node in nodes.values_mut() {
        node.children.retain(|child| kept.contains(child));
    }

    apply_parameter_overrides(&mut wf, &opts.parameters)?;
    wf.status.nodes = nodes;
    wf.status.phase = Phase::Running;
    wf.status.message.clear();
    wf.status.finished_at = None;
    wf.spec.shutdown = None;
    wf.metadata.labels.remove(LABEL_COMPLETED);
    if wf.metadata.labels.contains_key(LABEL_PHASE) {
        wf.metadata
            .labels
            .insert(LABEL_PHASE.to_string(), Phase::Running.to_string());
    }

    debug!(
        workflow = %wf.name(),
        retained_nodes = wf.status.nodes.len(),
        pods = pods.len(),
        "Formulated retry"
    );
    Ok((wf, pods))
}

/// Delete the given pods concurrently
///
/// One task per pod; an already missing pod counts as deleted. Waits for every task,
/// then fails with the first error collected. Deletions that went through are not undone.
pub async fn delete_execution_units(
    pods: Arc<dyn PodClient>,
    namespace: &str,
    units: &RetriedPodSet,
) -> Result<(), SubstrateError> {
    if units.is_empty() {
        return Ok(());
    }
    let (err_tx, mut err_rx) = mpsc::channel::<SubstrateError>(units.len());
    let mut handles = Vec::with_capacity(units.len());
    for pod in units {
        let pods = Arc::clone(&pods);
        let err_tx = err_tx.clone();
        let namespace = namespace.to_string();
        let pod = pod.clone();
        handles.push(tokio::spawn(async move {
            match pods.delete_pod(&namespace, &pod).await {
                Ok(()) => debug!(namespace = %namespace, pod = %pod, "Deleted pod"),
                Err(e) if e.is_not_found() => {
                    debug!(namespace = %namespace, pod = %pod, "Pod already gone")
                }
                Err(e) => {
                    warn!(namespace = %namespace, pod = %pod, error = %e, "Failed to delete pod");
                    let _ = err_tx.try_send(e);
                }
            }
        }));
    }
    drop(err_tx);

    for joined in join_all(handles).await {
        if let Err(e) = joined {
            return Err(SubstrateError::Request(format!(
                "pod deletion task failed: {}",
                e
            )));
        }
    }
    if let Ok(e) = err_rx.try_recv() {
        return Err(e);
    }
    info!(namespace, pods = units.len(), "Deleted retried pods");
    Ok(())
}
