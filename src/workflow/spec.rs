use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Declarative workflow spec
///
/// Only the fields the control plane reads or writes are typed; everything else is
/// carried through `extra` untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowSpec {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub entrypoint: String,

    #[serde(skip_serializing_if = "ParameterSet::is_empty")]
    pub arguments: ParameterSet,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub suspend: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub shutdown: Option<ShutdownStrategy>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_template_ref: Option<WorkflowTemplateRef>,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub service_account_name: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WorkflowSpec {
    pub fn is_suspended(&self) -> bool {
        self.suspend.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShutdownStrategy {
    Terminate,
    Stop,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowTemplateRef {
    pub name: String,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub cluster_scope: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Parameter {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }
}

/// `parameters` list used for spec arguments, node inputs and node outputs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParameterSet {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
}

impl ParameterSet {
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .and_then(|p| p.value.as_deref())
    }

    /// Overwrite the named parameter, appending it when absent
    pub fn set(&mut self, name: &str, value: &str) {
        match self.parameters.iter_mut().find(|p| p.name == name) {
            Some(param) => param.value = Some(value.to_string()),
            None => self.parameters.push(Parameter::new(name, value)),
        }
    }
}
