//! Workflow data model
//!
//! Workflows, their execution nodes, list envelopes and watch events. Everything
//! round-trips through serde with camelCase keys so projections and offloading can
//! operate on the JSON form.

pub mod events;
pub mod meta;
pub mod ordering;
pub mod spec;
pub mod status;
pub mod template;

pub use events::{ClusterEvent, EventType, ListMeta, ObjectReference, WatchEvent, WorkflowList};
pub use meta::ObjectMeta;
pub use ordering::{canonical_order, sort_workflows};
pub use spec::{Parameter, ParameterSet, ShutdownStrategy, WorkflowSpec, WorkflowTemplateRef};
pub use status::{Node, NodeType, Nodes, Phase, WorkflowStatus};
pub use template::{CronWorkflow, CronWorkflowSpec};

use serde::{Deserialize, Serialize};

pub const LABEL_CONTROLLER_INSTANCE_ID: &str = "workflows.flowgate.io/controller-instanceid";
pub const LABEL_COMPLETED: &str = "workflows.flowgate.io/completed";
pub const LABEL_PHASE: &str = "workflows.flowgate.io/phase";
pub const LABEL_CRON_WORKFLOW: &str = "workflows.flowgate.io/cron-workflow";
pub const LABEL_WORKFLOW_TEMPLATE: &str = "workflows.flowgate.io/workflow-template";
pub const LABEL_CLUSTER_WORKFLOW_TEMPLATE: &str =
    "workflows.flowgate.io/cluster-workflow-template";
pub const LABEL_RESUBMITTED_FROM: &str = "workflows.flowgate.io/resubmitted-from-workflow";
pub const LABEL_RETRIED_FROM_ARCHIVE: &str = "workflows.flowgate.io/retried-from-archive";

/// A workflow: identity, declarative spec and execution status
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Workflow {
    pub metadata: ObjectMeta,
    pub spec: WorkflowSpec,
    pub status: WorkflowStatus,
}

impl Workflow {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    pub fn uid(&self) -> &str {
        &self.metadata.uid
    }

    pub fn phase(&self) -> Phase {
        self.status.phase
    }

    /// `namespace/name`, the key the substrate and caches index by
    pub fn key(&self) -> String {
        format!("{}/{}", self.metadata.namespace, self.metadata.name)
    }

    pub fn is_completed(&self) -> bool {
        self.status.phase.is_terminal()
    }
}
