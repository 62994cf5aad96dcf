//! Suspend, resume, terminate, stop and set-outcome

use chrono::Utc;
use tracing::info;

use super::SetOperationValues;
use crate::error::ApiError;
use crate::hydrator::Hydrator;
use crate::selector::Selector;
use crate::source::WorkflowClient;
use crate::workflow::{Phase, ShutdownStrategy, Workflow};

pub fn apply_suspend(wf: &mut Workflow) -> Result<(), ApiError> {
    if wf.is_completed() {
        return Err(ApiError::Lifecycle(format!(
            "cannot suspend completed workflow \"{}\"",
            wf.name()
        )));
    }
    wf.spec.suspend = Some(true);
    Ok(())
}

/// Clear the workflow-level suspend (only without a selector) and complete every active
/// suspend node the selector matches
pub fn apply_resume(wf: &mut Workflow, node_selector: &Selector) -> Result<(), ApiError> {
    if node_selector.is_empty() {
        wf.spec.suspend = None;
    }
    let now = Utc::now();
    for node in wf.status.nodes.values_mut() {
        if node.is_active_suspend_node() && node_selector.matches_node(node) {
            node.phase = Some(Phase::Succeeded);
            node.finished_at = Some(now);
        }
    }
    Ok(())
}

/// Returns false when the workflow was already terminated
pub fn apply_terminate(wf: &mut Workflow) -> Result<bool, ApiError> {
    match wf.status.phase {
        Phase::Terminated => return Ok(false),
        phase if phase.is_terminal() => {
            return Err(ApiError::Lifecycle(
                "cannot shutdown a completed workflow".to_string(),
            ))
        }
        _ => {}
    }
    wf.spec.shutdown = Some(ShutdownStrategy::Terminate);
    wf.status.phase = Phase::Terminated;
    wf.status.finished_at = Some(Utc::now());
    wf.status.message = "Stopped with strategy 'Terminate'".to_string();
    Ok(true)
}

pub fn apply_stop(wf: &mut Workflow, node_selector: &Selector, message: &str) -> Result<(), ApiError> {
    if wf.is_completed() {
        return Err(ApiError::Lifecycle(
            "cannot shutdown a completed workflow".to_string(),
        ));
    }
    if !node_selector.is_empty() {
        let now = Utc::now();
        for node in wf.status.nodes.values_mut() {
            if !node.is_fulfilled() && node_selector.matches_node(node) {
                node.phase = Some(Phase::Failed);
                node.finished_at = Some(now);
                if !message.is_empty() {
                    node.message = message.to_string();
                }
            }
        }
    }
    wf.spec.shutdown = Some(ShutdownStrategy::Stop);
    wf.status.message = if message.is_empty() {
        "Stopped with strategy 'Stop'".to_string()
    } else {
        message.to_string()
    };
    Ok(())
}

pub fn apply_set(
    wf: &mut Workflow,
    node_selector: &Selector,
    values: &SetOperationValues,
) -> Result<(), ApiError> {
    let now = Utc::now();
    let mut matched = 0;
    for node in wf.status.nodes.values_mut() {
        if !node.is_active_suspend_node() || !node_selector.matches_node(node) {
            continue;
        }
        matched += 1;
        if let Some(phase) = values.phase {
            node.phase = Some(phase);
            if phase.is_terminal() {
                node.finished_at = Some(now);
            }
        }
        if !values.message.is_empty() {
            node.message = values.message.clone();
        }
        if !values.output_parameters.is_empty() {
            let outputs = node.outputs.get_or_insert_with(Default::default);
            for (name, value) in &values.output_parameters {
                outputs.set(name, value);
            }
        }
    }
    if matched == 0 {
        return Err(ApiError::Lifecycle(format!(
            "currently, set only targets suspend nodes: no suspend nodes matching nodeFieldSelector: {}",
            node_selector
        )));
    }
    Ok(())
}

pub async fn suspend_workflow(
    client: &dyn WorkflowClient,
    namespace: &str,
    name: &str,
) -> Result<Workflow, ApiError> {
    let mut wf = client.get(namespace, name).await?;
    apply_suspend(&mut wf)?;
    let updated = client.update(wf).await?;
    info!(namespace, workflow = name, "Suspended workflow");
    Ok(updated)
}

pub async fn resume_workflow(
    client: &dyn WorkflowClient,
    hydrator: &Hydrator,
    namespace: &str,
    name: &str,
    node_selector: &Selector,
) -> Result<Workflow, ApiError> {
    let mut wf = client.get(namespace, name).await?;
    hydrator.hydrate(&mut wf).await?;
    apply_resume(&mut wf, node_selector)?;
    hydrator.dehydrate(&mut wf).await?;
    let updated = client.update(wf).await?;
    info!(namespace, workflow = name, "Resumed workflow");
    Ok(updated)
}

pub async fn terminate_workflow(
    client: &dyn WorkflowClient,
    namespace: &str,
    name: &str,
) -> Result<Workflow, ApiError> {
    let mut wf = client.get(namespace, name).await?;
    if !apply_terminate(&mut wf)? {
        return Ok(wf);
    }
    let updated = client.update(wf).await?;
    info!(namespace, workflow = name, "Terminated workflow");
    Ok(updated)
}

pub async fn stop_workflow(
    client: &dyn WorkflowClient,
    hydrator: &Hydrator,
    namespace: &str,
    name: &str,
    node_selector: &Selector,
    message: &str,
) -> Result<Workflow, ApiError> {
    let mut wf = client.get(namespace, name).await?;
    hydrator.hydrate(&mut wf).await?;
    apply_stop(&mut wf, node_selector, message)?;
    hydrator.dehydrate(&mut wf).await?;
    let updated = client.update(wf).await?;
    info!(namespace, workflow = name, "Stopped workflow");
    Ok(updated)
}

pub async fn set_workflow(
    client: &dyn WorkflowClient,
    hydrator: &Hydrator,
    namespace: &str,
    name: &str,
    node_selector: &Selector,
    values: &SetOperationValues,
) -> Result<Workflow, ApiError> {
    let mut wf = client.get(namespace, name).await?;
    hydrator.hydrate(&mut wf).await?;
    apply_set(&mut wf, node_selector, values)?;
    hydrator.dehydrate(&mut wf).await?;
    let updated = client.update(wf).await?;
    info!(namespace, workflow = name, "Set workflow node outcome");
    Ok(updated)
}
