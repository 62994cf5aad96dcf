//! Controller instance identity
//!
//! Several control planes can share a substrate. Each one only sees and mutates the
//! workflows labelled with its instance id (or, without an id, the unlabelled ones).

use crate::error::ApiError;
use crate::selector::{Requirement, Selector};
use crate::source::ListOptions;
use crate::workflow::{Workflow, LABEL_CONTROLLER_INSTANCE_ID};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceIdService {
    instance_id: Option<String>,
}

impl InstanceIdService {
    pub fn new(instance_id: Option<String>) -> Self {
        Self {
            instance_id: instance_id.filter(|id| !id.is_empty()),
        }
    }

    pub fn instance_id(&self) -> Option<&str> {
        self.instance_id.as_deref()
    }

    /// Stamp (or clear) the instance label on a workflow about to be created
    pub fn label(&self, wf: &mut Workflow) {
        match &self.instance_id {
            Some(id) => {
                wf.metadata
                    .labels
                    .insert(LABEL_CONTROLLER_INSTANCE_ID.to_string(), id.clone());
            }
            None => {
                wf.metadata.labels.remove(LABEL_CONTROLLER_INSTANCE_ID);
            }
        }
    }

    fn requirement(&self) -> Requirement {
        match &self.instance_id {
            Some(id) => Requirement::equals(LABEL_CONTROLLER_INSTANCE_ID, id.clone()),
            None => Requirement::does_not_exist(LABEL_CONTROLLER_INSTANCE_ID),
        }
    }

    /// Add the instance requirement to substrate list/watch options
    pub fn with(&self, options: &mut ListOptions) {
        let requirement = self.requirement().to_string();
        options.label_selector = if options.label_selector.trim().is_empty() {
            requirement
        } else {
            format!("{},{}", options.label_selector, requirement)
        };
    }

    /// Add the instance requirement to a query selector
    pub fn with_selector(&self, selector: &mut Selector) {
        selector.add(self.requirement());
    }

    pub fn validate(&self, wf: &Workflow) -> Result<(), ApiError> {
        let label = wf.metadata.label(LABEL_CONTROLLER_INSTANCE_ID);
        match (&self.instance_id, label) {
            (None, None) => Ok(()),
            (Some(id), Some(label)) if id == label => Ok(()),
            (None, Some(_)) => Err(ApiError::Validation(format!(
                "'{}' is not managed by the current control plane",
                wf.name()
            ))),
            (Some(id), _) => Err(ApiError::Validation(format!(
                "'{}' is not managed by the current control plane instance '{}'",
                wf.name(),
                id
            ))),
        }
    }
}
