//! Submitting workflows from templates and cron workflows

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::ApiError;
use crate::lifecycle::apply_parameter_overrides;
use crate::workflow::{
    CronWorkflow, ObjectMeta, Workflow, WorkflowSpec, WorkflowTemplateRef,
    LABEL_CLUSTER_WORKFLOW_TEMPLATE, LABEL_CRON_WORKFLOW, LABEL_WORKFLOW_TEMPLATE,
};

/// Kinds a workflow can be submitted from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    CronWorkflow,
    WorkflowTemplate,
    ClusterWorkflowTemplate,
}

impl ResourceKind {
    /// Accepts the kind, its lowercase singular and plural, and its short name
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "CronWorkflow" | "cronworkflow" | "cronworkflows" | "cronwf" | "cwf" => {
                Some(ResourceKind::CronWorkflow)
            }
            "WorkflowTemplate" | "workflowtemplate" | "workflowtemplates" | "wftmpl" => {
                Some(ResourceKind::WorkflowTemplate)
            }
            "ClusterWorkflowTemplate"
            | "clusterworkflowtemplate"
            | "clusterworkflowtemplates"
            | "cwftmpl" => Some(ResourceKind::ClusterWorkflowTemplate),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::CronWorkflow => "CronWorkflow",
            ResourceKind::WorkflowTemplate => "WorkflowTemplate",
            ResourceKind::ClusterWorkflowTemplate => "ClusterWorkflowTemplate",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options applied to a workflow on submit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubmitOpts {
    pub name: String,
    pub generate_name: String,
    pub entrypoint: String,
    /// `name=value` pairs
    pub parameters: Vec<String>,
    /// `k=v,k2=v2`
    pub labels: String,
    /// `k=v,k2=v2`
    pub annotations: String,
    pub service_account: String,
    /// Validate and return the workflow without creating it
    pub dry_run: bool,
    /// Ask the substrate to validate the create without persisting
    pub server_dry_run: bool,
}

/// Parse a `k=v,k2=v2` list
pub fn parse_key_values(raw: &str) -> Result<BTreeMap<String, String>, ApiError> {
    let mut pairs = BTreeMap::new();
    for term in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let (key, value) = term.split_once('=').ok_or_else(|| {
            ApiError::InvalidArgument(format!("expected KEY=VALUE, got \"{}\"", term))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(ApiError::InvalidArgument(format!(
                "expected KEY=VALUE, got \"{}\"",
                term
            )));
        }
        pairs.insert(key.to_string(), value.trim().to_string());
    }
    Ok(pairs)
}

pub fn apply_submit_opts(wf: &mut Workflow, opts: Option<&SubmitOpts>) -> Result<(), ApiError> {
    let Some(opts) = opts else {
        return Ok(());
    };
    if !opts.name.is_empty() {
        wf.metadata.name = opts.name.clone();
    }
    if !opts.generate_name.is_empty() {
        wf.metadata.generate_name = opts.generate_name.clone();
    }
    if !opts.entrypoint.is_empty() {
        wf.spec.entrypoint = opts.entrypoint.clone();
    }
    if !opts.service_account.is_empty() {
        wf.spec.service_account_name = opts.service_account.clone();
    }
    wf.metadata.labels.extend(parse_key_values(&opts.labels)?);
    wf.metadata
        .annotations
        .extend(parse_key_values(&opts.annotations)?);
    apply_parameter_overrides(wf, &opts.parameters)?;
    Ok(())
}

/// A one-off run of a cron workflow's workflow spec
pub fn workflow_from_cron(cron: &CronWorkflow) -> Workflow {
    let mut metadata = cron.spec.workflow_metadata.clone().unwrap_or_default();
    metadata.name = String::new();
    metadata.generate_name = format!("{}-", cron.metadata.name);
    metadata.namespace = cron.metadata.namespace.clone();
    metadata
        .labels
        .insert(LABEL_CRON_WORKFLOW.to_string(), cron.metadata.name.clone());
    Workflow {
        metadata,
        spec: cron.spec.workflow_spec.clone(),
        status: Default::default(),
    }
}

/// A workflow that references a (cluster) workflow template by name
pub fn workflow_from_template(namespace: &str, name: &str, cluster_scope: bool) -> Workflow {
    let label = if cluster_scope {
        LABEL_CLUSTER_WORKFLOW_TEMPLATE
    } else {
        LABEL_WORKFLOW_TEMPLATE
    };
    let mut metadata = ObjectMeta {
        generate_name: format!("{}-", name),
        namespace: namespace.to_string(),
        ..Default::default()
    };
    metadata.labels.insert(label.to_string(), name.to_string());
    Workflow {
        metadata,
        spec: WorkflowSpec {
            workflow_template_ref: Some(WorkflowTemplateRef {
                name: name.to_string(),
                cluster_scope,
            }),
            ..Default::default()
        },
        status: Default::default(),
    }
}
