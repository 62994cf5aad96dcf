//! CLI domain: parse, route, help, output, and presentation only.
//! No domain orchestration; single route table dispatches to the workflow server.

mod help;
mod output;
mod parse;
mod presentation;
mod route;

pub use help::{archive_command_name, command_name, is_mutation};
pub use output::{is_json, map_error};
pub use parse::{ArchiveCommands, Cli, Commands};
pub use presentation::{
    format_age, format_archive_retry_results, format_deleted, format_lint_result,
    format_mutation_result, format_workflow_json, format_workflow_list_json,
    format_workflow_list_text, format_workflow_text, ArchiveRetryResult,
};
pub use route::RunContext;
