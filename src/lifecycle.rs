//! Lifecycle engine
//!
//! State transitions applied to a live workflow: suspend, resume, terminate, stop,
//! set-outcome, retry and resubmit. The `apply_*` functions mutate a workflow in memory;
//! the async wrappers fetch, hydrate, mutate, dehydrate and persist.

pub mod control;
pub mod resubmit;
pub mod retry;

pub use control::{
    apply_resume, apply_set, apply_stop, apply_suspend, apply_terminate, resume_workflow,
    set_workflow, stop_workflow, suspend_workflow, terminate_workflow,
};
pub use resubmit::formulate_resubmit;
pub use retry::{delete_execution_units, formulate_retry, RetriedPodSet, RetryOptions};

use std::collections::BTreeMap;

use crate::error::{ApiError, Status};
use crate::workflow::{Phase, Workflow};

/// Values applied by the set-outcome operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetOperationValues {
    pub phase: Option<Phase>,
    pub message: String,
    pub output_parameters: BTreeMap<String, String>,
}

/// Phase accepted by set-outcome; the empty string leaves the phase alone
pub fn parse_set_phase(phase: &str) -> Result<Option<Phase>, Status> {
    match phase {
        "" => Ok(None),
        "Succeeded" => Ok(Some(Phase::Succeeded)),
        "Failed" => Ok(Some(Phase::Failed)),
        "Error" => Ok(Some(Phase::Error)),
        other => Err(Status::invalid_argument(format!(
            "{} is an invalid phase to set to",
            other
        ))),
    }
}

/// Output parameters for set-outcome: a JSON object of strings
pub fn parse_output_parameters(raw: &str) -> Result<BTreeMap<String, String>, Status> {
    if raw.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    serde_json::from_str(raw).map_err(|e| {
        Status::invalid_argument(format!("unable to parse output parameter set request: {}", e))
    })
}

/// Split `name=value` parameter overrides
pub fn parse_parameter_overrides(parameters: &[String]) -> Result<Vec<(String, String)>, ApiError> {
    parameters
        .iter()
        .map(|raw| match raw.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => {
                Ok((name.trim().to_string(), value.to_string()))
            }
            _ => Err(ApiError::InvalidArgument(format!(
                "expected parameter of the form: NAME=VALUE. Received: {}",
                raw
            ))),
        })
        .collect()
}

/// Apply `name=value` overrides to the workflow's arguments
pub fn apply_parameter_overrides(wf: &mut Workflow, parameters: &[String]) -> Result<(), ApiError> {
    for (name, value) in parse_parameter_overrides(parameters)? {
        wf.spec.arguments.set(&name, &value);
    }
    Ok(())
}
