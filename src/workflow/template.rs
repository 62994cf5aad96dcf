use serde::{Deserialize, Serialize};

use super::meta::ObjectMeta;
use super::spec::WorkflowSpec;

/// A scheduled workflow definition; only its workflow template part is used here
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CronWorkflow {
    pub metadata: ObjectMeta,
    pub spec: CronWorkflowSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CronWorkflowSpec {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub schedule: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_metadata: Option<ObjectMeta>,

    pub workflow_spec: WorkflowSpec,
}
