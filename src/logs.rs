//! Workflow log streaming

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::pin::Pin;

use crate::error::ApiError;
use crate::workflow::Workflow;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogRequest {
    pub namespace: String,
    pub name: String,
    /// Restrict to one pod; empty means every pod of the workflow
    pub pod_name: String,
    pub container: String,
    pub follow: bool,
    pub grep: String,
    pub tail_lines: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub pod_name: String,
    pub content: String,
}

pub type LogStream = Pin<Box<dyn Stream<Item = Result<LogEntry, ApiError>> + Send>>;

#[async_trait]
pub trait LogFetcher: Send + Sync {
    async fn workflow_logs(
        &self,
        workflow: &Workflow,
        request: &LogRequest,
    ) -> Result<LogStream, ApiError>;
}

/// Serves pre-recorded lines per pod
#[derive(Debug, Default, Clone)]
pub struct StaticLogFetcher {
    lines: BTreeMap<String, Vec<String>>,
}

impl StaticLogFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lines(mut self, pod_name: &str, lines: &[&str]) -> Self {
        self.lines
            .entry(pod_name.to_string())
            .or_default()
            .extend(lines.iter().map(|l| l.to_string()));
        self
    }
}

#[async_trait]
impl LogFetcher for StaticLogFetcher {
    async fn workflow_logs(
        &self,
        workflow: &Workflow,
        request: &LogRequest,
    ) -> Result<LogStream, ApiError> {
        let mut entries = Vec::new();
        let pods = workflow
            .status
            .nodes
            .values()
            .filter_map(|node| node.pod_name.as_deref())
            .filter(|pod| request.pod_name.is_empty() || *pod == request.pod_name);
        for pod in pods {
            let Some(lines) = self.lines.get(pod) else {
                continue;
            };
            let matching: Vec<&String> = lines
                .iter()
                .filter(|line| request.grep.is_empty() || line.contains(&request.grep))
                .collect();
            let skip = request
                .tail_lines
                .map(|tail| matching.len().saturating_sub(tail))
                .unwrap_or(0);
            entries.extend(matching.into_iter().skip(skip).map(|line| {
                Ok(LogEntry {
                    pod_name: pod.to_string(),
                    content: line.clone(),
                })
            }));
        }
        Ok(Box::pin(futures::stream::iter(entries)))
    }
}
