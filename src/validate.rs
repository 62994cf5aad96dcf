//! Workflow validation gate
//!
//! Full spec validation belongs to the workflow compiler and is consumed through
//! `WorkflowValidator`. `StructuralValidator` checks what the control plane itself
//! depends on.

use async_trait::async_trait;
use std::collections::HashSet;

use crate::error::ApiError;
use crate::workflow::Workflow;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidateOpts {
    /// Linting a manifest rather than creating it
    pub lint: bool,
    /// Workflow is about to be submitted and must be runnable as-is
    pub submit: bool,
}

#[async_trait]
pub trait WorkflowValidator: Send + Sync {
    async fn validate(&self, workflow: &Workflow, opts: ValidateOpts) -> Result<(), ApiError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StructuralValidator;

impl StructuralValidator {
    pub fn diagnostics(workflow: &Workflow, opts: ValidateOpts) -> Vec<String> {
        let mut problems = Vec::new();
        let meta = &workflow.metadata;

        if meta.name.is_empty() && meta.generate_name.is_empty() && !opts.lint {
            problems.push("metadata.name or metadata.generateName is required".to_string());
        }
        if workflow.spec.entrypoint.is_empty() && workflow.spec.workflow_template_ref.is_none() {
            problems.push("spec.entrypoint is required".to_string());
        }
        if let Some(template_ref) = &workflow.spec.workflow_template_ref {
            if template_ref.name.is_empty() {
                problems.push("spec.workflowTemplateRef.name is required".to_string());
            }
        }

        let mut seen = HashSet::new();
        for param in &workflow.spec.arguments.parameters {
            if param.name.is_empty() {
                problems.push("spec.arguments.parameters: parameter name is required".to_string());
                continue;
            }
            if !seen.insert(param.name.as_str()) {
                problems.push(format!(
                    "spec.arguments.parameters.{}: duplicate parameter name",
                    param.name
                ));
            }
            if opts.submit && param.value.is_none() {
                problems.push(format!(
                    "spec.arguments.parameters.{}.value is required",
                    param.name
                ));
            }
        }
        problems
    }
}

#[async_trait]
impl WorkflowValidator for StructuralValidator {
    async fn validate(&self, workflow: &Workflow, opts: ValidateOpts) -> Result<(), ApiError> {
        let problems = Self::diagnostics(workflow, opts);
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(problems.join("; ")))
        }
    }
}
