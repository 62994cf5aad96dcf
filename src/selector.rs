//! Label, field and node selectors
//!
//! Selectors are comma-separated requirement lists. Label selectors accept `k=v`,
//! `k==v`, `k!=v`, `k` and `!k`; field and node selectors accept only the equality forms.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::ApiError;
use crate::workflow::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    NotEquals,
    Exists,
    DoesNotExist,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub key: String,
    pub operator: Operator,
    pub value: String,
}

impl Requirement {
    pub fn equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            operator: Operator::Equals,
            value: value.into(),
        }
    }

    pub fn does_not_exist(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            operator: Operator::DoesNotExist,
            value: String::new(),
        }
    }

    fn matches(&self, actual: Option<&str>) -> bool {
        match self.operator {
            Operator::Equals => actual == Some(self.value.as_str()),
            Operator::NotEquals => actual != Some(self.value.as_str()),
            Operator::Exists => actual.is_some(),
            Operator::DoesNotExist => actual.is_none(),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operator {
            Operator::Equals => write!(f, "{}={}", self.key, self.value),
            Operator::NotEquals => write!(f, "{}!={}", self.key, self.value),
            Operator::Exists => write!(f, "{}", self.key),
            Operator::DoesNotExist => write!(f, "!{}", self.key),
        }
    }
}

/// A conjunction of requirements; the empty selector matches everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    requirements: Vec<Requirement>,
}

impl Selector {
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn parse_labels(input: &str) -> Result<Self, ApiError> {
        Self::parse(input, true)
    }

    pub fn parse_fields(input: &str) -> Result<Self, ApiError> {
        Self::parse(input, false)
    }

    fn parse(input: &str, allow_existence: bool) -> Result<Self, ApiError> {
        let mut requirements = Vec::new();
        for term in input.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let requirement = if let Some((key, value)) = term.split_once("!=") {
                Requirement {
                    key: key.trim().to_string(),
                    operator: Operator::NotEquals,
                    value: value.trim().to_string(),
                }
            } else if let Some((key, value)) = term.split_once("==") {
                Requirement::equals(key.trim(), value.trim())
            } else if let Some((key, value)) = term.split_once('=') {
                Requirement::equals(key.trim(), value.trim())
            } else if !allow_existence {
                return Err(ApiError::InvalidSelector(format!(
                    "invalid field selector term \"{}\": expected key=value or key!=value",
                    term
                )));
            } else if let Some(key) = term.strip_prefix('!') {
                Requirement::does_not_exist(key.trim())
            } else {
                Requirement {
                    key: term.to_string(),
                    operator: Operator::Exists,
                    value: String::new(),
                }
            };

            if requirement.key.is_empty() {
                return Err(ApiError::InvalidSelector(format!(
                    "selector term \"{}\" has an empty key",
                    term
                )));
            }
            requirements.push(requirement);
        }
        Ok(Self { requirements })
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn add(&mut self, requirement: Requirement) {
        self.requirements.push(requirement);
    }

    /// First requirement on `key`, if any
    pub fn requirement(&self, key: &str) -> Option<&Requirement> {
        self.requirements.iter().find(|r| r.key == key)
    }

    pub fn matches<F>(&self, lookup: F) -> bool
    where
        F: Fn(&str) -> Option<String>,
    {
        self.requirements
            .iter()
            .all(|r| r.matches(lookup(&r.key).as_deref()))
    }

    pub fn matches_labels(&self, labels: &BTreeMap<String, String>) -> bool {
        self.matches(|key| labels.get(key).cloned())
    }

    pub fn matches_node(&self, node: &Node) -> bool {
        self.matches(|key| node.field(key))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let terms: Vec<String> = self.requirements.iter().map(|r| r.to_string()).collect();
        f.write_str(&terms.join(","))
    }
}

/// Extract the workflow name from a `metadata.name=<x>` field selector term
pub fn recover_workflow_name(field_selector: &str) -> Option<String> {
    field_selector.split(',').find_map(|term| {
        let (key, value) = term.trim().split_once('=')?;
        let key = key.trim();
        let value = value.trim_start_matches('=').trim();
        (key == "metadata.name" && !value.is_empty()).then(|| value.to_string())
    })
}

/// Replace (or add) the `metadata.name` term of a field selector
pub fn with_workflow_name(field_selector: &str, name: &str) -> String {
    let mut terms: Vec<String> = field_selector
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty() && !t.starts_with("metadata.name="))
        .map(str::to_string)
        .collect();
    terms.insert(0, format!("metadata.name={}", name));
    terms.join(",")
}
