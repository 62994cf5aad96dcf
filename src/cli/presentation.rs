//! CLI presentation: text and json formatters per command family.

mod workflow;

pub use workflow::{
    format_age, format_archive_retry_results, format_deleted, format_lint_result,
    format_mutation_result, format_workflow_json, format_workflow_list_json,
    format_workflow_list_text, format_workflow_text, ArchiveRetryResult,
};
