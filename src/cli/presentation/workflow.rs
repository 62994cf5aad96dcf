//! Workflow presentation: list, get and mutation results as text or json.

use chrono::{DateTime, Utc};
use comfy_table::Table;
use serde::Serialize;
use serde_json::json;

use crate::error::ApiError;
use crate::workflow::{Workflow, WorkflowList};

fn to_json<T: Serialize>(value: &T) -> Result<String, ApiError> {
    serde_json::to_string_pretty(value).map_err(ApiError::from)
}

/// Compact age, e.g. "3d", "5h", "42s"
pub fn format_age(since: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(since) = since else {
        return "-".to_string();
    };
    let secs = (now - since).num_seconds().max(0);
    match secs {
        s if s >= 86_400 => format!("{}d", s / 86_400),
        s if s >= 3_600 => format!("{}h", s / 3_600),
        s if s >= 60 => format!("{}m", s / 60),
        s => format!("{}s", s),
    }
}

fn format_duration(wf: &Workflow, now: DateTime<Utc>) -> String {
    match wf.status.started_at {
        Some(started) => format_age(Some(started), wf.status.finished_at.unwrap_or(now)),
        None => "-".to_string(),
    }
}

pub fn format_workflow_list_text(list: &WorkflowList, all_namespaces: bool) -> String {
    if list.items.is_empty() {
        return "No workflows found.".to_string();
    }
    let now = Utc::now();
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    let mut header = vec!["Name", "Status", "Age", "Duration", "Message"];
    if all_namespaces {
        header.insert(0, "Namespace");
    }
    table.set_header(header);
    for wf in &list.items {
        let mut row = vec![
            wf.name().to_string(),
            wf.phase().to_string(),
            format_age(wf.metadata.creation_timestamp, now),
            format_duration(wf, now),
            wf.status.message.clone(),
        ];
        if all_namespaces {
            row.insert(0, wf.namespace().to_string());
        }
        table.add_row(row);
    }

    let mut output = table.to_string();
    if !list.metadata.continue_token.is_empty() {
        output.push_str(&format!(
            "\n\nMore workflows available: --continue {}",
            list.metadata.continue_token
        ));
    }
    if let Some(remaining) = list.metadata.remaining_item_count {
        output.push_str(&format!("\nRemaining: {}", remaining));
    }
    output
}

pub fn format_workflow_list_json(list: &WorkflowList) -> Result<String, ApiError> {
    to_json(list)
}

pub fn format_workflow_text(wf: &Workflow) -> String {
    let now = Utc::now();
    let mut output = format!("Name:        {}\n", wf.name());
    output.push_str(&format!("Namespace:   {}\n", wf.namespace()));
    if !wf.uid().is_empty() {
        output.push_str(&format!("UID:         {}\n", wf.uid()));
    }
    output.push_str(&format!("Status:      {}\n", wf.phase()));
    if !wf.status.message.is_empty() {
        output.push_str(&format!("Message:     {}\n", wf.status.message));
    }
    output.push_str(&format!(
        "Created:     {}\n",
        format_age(wf.metadata.creation_timestamp, now)
    ));
    output.push_str(&format!("Duration:    {}\n", format_duration(wf, now)));
    if wf.status.is_offloaded() {
        output.push_str("Nodes:       offloaded\n");
    }

    if !wf.status.nodes.is_empty() {
        let mut table = Table::new();
        table.load_preset(comfy_table::presets::UTF8_FULL);
        table.set_header(vec!["Node", "Type", "Phase", "Pod", "Message"]);
        for node in wf.status.nodes.values() {
            let name = if node.display_name.is_empty() {
                node.name.as_str()
            } else {
                node.display_name.as_str()
            };
            table.add_row(vec![
                name.to_string(),
                node.node_type.as_str().to_string(),
                node.phase.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
                node.pod_name.clone().unwrap_or_else(|| "-".to_string()),
                node.message.clone(),
            ]);
        }
        output.push('\n');
        output.push_str(&table.to_string());
    }
    output
}

pub fn format_workflow_json(wf: &Workflow) -> Result<String, ApiError> {
    to_json(wf)
}

/// One-line summary for a mutation, or the workflow itself as json
pub fn format_mutation_result(action: &str, wf: &Workflow, json: bool) -> Result<String, ApiError> {
    if json {
        return to_json(wf);
    }
    Ok(format!(
        "workflow {}/{} {} (phase: {})",
        wf.namespace(),
        wf.name(),
        action,
        wf.phase()
    ))
}

pub fn format_deleted(namespace: &str, name: &str, json: bool) -> Result<String, ApiError> {
    if json {
        return to_json(&json!({ "namespace": namespace, "name": name, "deleted": true }));
    }
    Ok(format!("workflow {}/{} deleted", namespace, name))
}

pub fn format_lint_result(wf: &Workflow, json: bool) -> Result<String, ApiError> {
    if json {
        return to_json(&json!({ "name": wf.name(), "errors": [] }));
    }
    let name = if wf.name().is_empty() {
        wf.metadata.generate_name.as_str()
    } else {
        wf.name()
    };
    Ok(format!("{}: no linting errors found!", name))
}

/// Outcome of retrying several archived workflows
#[derive(Debug, Serialize)]
pub struct ArchiveRetryResult {
    pub uid: String,
    pub workflow: Option<String>,
    pub error: Option<String>,
}

pub fn format_archive_retry_results(
    results: &[ArchiveRetryResult],
    json: bool,
) -> Result<String, ApiError> {
    if json {
        return to_json(&results);
    }
    let lines: Vec<String> = results
        .iter()
        .map(|r| match (&r.workflow, &r.error) {
            (_, Some(error)) => format!("{}: {}", r.uid, error),
            (Some(workflow), None) => format!("{}: retried as {}", r.uid, workflow),
            (None, None) => format!("{}: retried", r.uid),
        })
        .collect();
    Ok(lines.join("\n"))
}
