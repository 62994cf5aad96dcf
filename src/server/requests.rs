//! Request messages of the workflow service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::submit::SubmitOpts;
use crate::workflow::Workflow;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowCreateRequest {
    pub namespace: String,
    pub workflow: Option<Workflow>,
    /// Validate and return without contacting the substrate
    pub dry_run: bool,
    /// Let the substrate validate the create without persisting
    pub server_dry_run: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowGetRequest {
    pub namespace: String,
    pub name: String,
    /// Field projection, e.g. `metadata.name,status.phase` or `-status.nodes`
    pub fields: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowListRequest {
    pub namespace: String,
    pub label_selector: String,
    /// Name pattern matched according to `name_filter`
    pub name: String,
    /// Exact (default), Prefix, Contains or NotEquals
    pub name_filter: String,
    pub created_after: Option<DateTime<Utc>>,
    pub finished_before: Option<DateTime<Utc>>,
    /// Decimal offset returned by the previous page
    #[serde(rename = "continue")]
    pub continue_token: String,
    /// 0 means unlimited
    pub limit: usize,
    pub show_remaining_item_count: bool,
    pub fields: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WatchWorkflowsRequest {
    pub namespace: String,
    pub label_selector: String,
    /// `metadata.name=<name>` (or `@latest`) narrows the watch to one workflow
    pub field_selector: String,
    pub resource_version: String,
    /// Projection over the event envelope, e.g. `result.object.status.phase`
    pub fields: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WatchEventsRequest {
    pub namespace: String,
    pub label_selector: String,
    pub field_selector: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowDeleteRequest {
    pub namespace: String,
    pub name: String,
    /// Strip finalizers before deleting
    pub force: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowRetryRequest {
    pub namespace: String,
    pub name: String,
    pub restart_successful: bool,
    pub node_field_selector: String,
    pub parameters: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowResubmitRequest {
    pub namespace: String,
    pub name: String,
    pub memoized: bool,
    pub parameters: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowResumeRequest {
    pub namespace: String,
    pub name: String,
    pub node_field_selector: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowSuspendRequest {
    pub namespace: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowTerminateRequest {
    pub namespace: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowStopRequest {
    pub namespace: String,
    pub name: String,
    pub node_field_selector: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowSetRequest {
    pub namespace: String,
    pub name: String,
    pub node_field_selector: String,
    pub message: String,
    /// Succeeded, Failed, Error or empty
    pub phase: String,
    /// JSON object of string values
    pub output_parameters: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowLintRequest {
    pub namespace: String,
    pub workflow: Option<Workflow>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowSubmitRequest {
    pub namespace: String,
    /// CronWorkflow, WorkflowTemplate or ClusterWorkflowTemplate (or an alias)
    pub resource_kind: String,
    pub resource_name: String,
    pub submit_options: Option<SubmitOpts>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryArchivedWorkflowRequest {
    pub uid: String,
    pub restart_successful: bool,
    pub node_field_selector: String,
    pub parameters: Vec<String>,
}
