//! Resubmission: a fresh workflow built from an existing one

use super::apply_parameter_overrides;
use crate::error::ApiError;
use crate::workflow::{
    ObjectMeta, Phase, Workflow, WorkflowStatus, LABEL_COMPLETED, LABEL_PHASE,
    LABEL_RESUBMITTED_FROM,
};

/// Build the workflow that resubmitting `wf` creates
///
/// In memoized mode the source must have failed; its succeeded pod nodes are carried
/// over so they are not run again.
pub fn formulate_resubmit(
    wf: &Workflow,
    memoized: bool,
    parameters: &[String],
) -> Result<Workflow, ApiError> {
    if memoized && !matches!(wf.status.phase, Phase::Failed | Phase::Error) {
        return Err(ApiError::Lifecycle(format!(
            "workflow must be Failed/Error to resubmit in memoized mode, but \"{}\" is {}",
            wf.name(),
            wf.status.phase
        )));
    }

    let mut labels = wf.metadata.labels.clone();
    labels.remove(LABEL_COMPLETED);
    labels.remove(LABEL_PHASE);
    labels.insert(LABEL_RESUBMITTED_FROM.to_string(), wf.name().to_string());

    let mut resubmitted = Workflow {
        metadata: ObjectMeta {
            generate_name: format!("{}-", wf.name()),
            namespace: wf.namespace().to_string(),
            labels,
            annotations: wf.metadata.annotations.clone(),
            ..Default::default()
        },
        spec: wf.spec.clone(),
        status: WorkflowStatus::default(),
    };
    resubmitted.spec.shutdown = None;
    apply_parameter_overrides(&mut resubmitted, parameters)?;

    if memoized {
        resubmitted.status.nodes = wf
            .status
            .nodes
            .iter()
            .filter(|(_, node)| node.phase == Some(Phase::Succeeded) && !node.node_type.is_group())
            .map(|(id, node)| (id.clone(), node.clone()))
            .collect();
    }
    Ok(resubmitted)
}
