use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::spec::ParameterSet;

/// Node id to node
pub type Nodes = BTreeMap<String, Node>;

/// Execution phase shared by workflows and nodes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Error,
    Terminated,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Phase::Succeeded | Phase::Failed | Phase::Error | Phase::Terminated
        )
    }

    /// Failed, Error or Terminated
    pub fn is_unsuccessful(self) -> bool {
        matches!(self, Phase::Failed | Phase::Error | Phase::Terminated)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Pending => "Pending",
            Phase::Running => "Running",
            Phase::Succeeded => "Succeeded",
            Phase::Failed => "Failed",
            Phase::Error => "Error",
            Phase::Terminated => "Terminated",
        }
    }

    pub fn parse(s: &str) -> Option<Phase> {
        match s {
            "Pending" => Some(Phase::Pending),
            "Running" => Some(Phase::Running),
            "Succeeded" => Some(Phase::Succeeded),
            "Failed" => Some(Phase::Failed),
            "Error" => Some(Phase::Error),
            "Terminated" => Some(Phase::Terminated),
            _ => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    #[default]
    Pod,
    Steps,
    #[serde(rename = "DAG")]
    Dag,
    Retry,
    Suspend,
}

impl NodeType {
    /// Group nodes only aggregate their children and own no pod
    pub fn is_group(self) -> bool {
        matches!(self, NodeType::Steps | NodeType::Dag | NodeType::Retry)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::Pod => "Pod",
            NodeType::Steps => "Steps",
            NodeType::Dag => "DAG",
            NodeType::Retry => "Retry",
            NodeType::Suspend => "Suspend",
        }
    }
}

/// One execution node of a workflow
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Node {
    pub id: String,

    pub name: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub display_name: String,

    #[serde(rename = "type")]
    pub node_type: NodeType,

    /// Absent until the node starts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub template_name: String,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub inputs: Option<ParameterSet>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<ParameterSet>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod_name: Option<String>,
}

impl Node {
    pub fn new(id: impl Into<String>, name: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            node_type,
            ..Default::default()
        }
    }

    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn with_pod(mut self, pod_name: impl Into<String>) -> Self {
        self.pod_name = Some(pod_name.into());
        self
    }

    pub fn is_fulfilled(&self) -> bool {
        self.phase.map(Phase::is_terminal).unwrap_or(false)
    }

    pub fn is_active_suspend_node(&self) -> bool {
        self.node_type == NodeType::Suspend && self.phase == Some(Phase::Running)
    }

    pub fn is_exit_handler(&self) -> bool {
        self.name.ends_with(".onExit")
    }

    /// Resolve a node field selector key
    pub fn field(&self, key: &str) -> Option<String> {
        match key {
            "id" => Some(self.id.clone()),
            "name" => Some(self.name.clone()),
            "displayName" => Some(self.display_name.clone()),
            "templateName" => Some(self.template_name.clone()),
            "phase" => Some(self.phase.map(|p| p.as_str()).unwrap_or("").to_string()),
            "type" => Some(self.node_type.as_str().to_string()),
            _ => {
                let param = key
                    .strip_prefix("inputs.parameters.")?
                    .strip_suffix(".value")?;
                self.inputs
                    .as_ref()
                    .and_then(|inputs| inputs.get(param))
                    .map(str::to_string)
            }
        }
    }
}

/// Observed execution state of a workflow
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowStatus {
    pub phase: Phase,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub nodes: Nodes,

    /// Set when the node mapping lives in the offload store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offload_node_status_version: Option<String>,
}

impl WorkflowStatus {
    pub fn is_offloaded(&self) -> bool {
        self.offload_node_status_version.is_some()
    }
}
