//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::ApiError;

/// Map domain/service errors to a string for CLI output.
/// Coded statuses print as "Code: message"; everything else prints its display form.
pub fn map_error(e: &ApiError) -> String {
    match e {
        ApiError::Status(status) => format!("{}: {}", status.code, status.message),
        other => other.to_string(),
    }
}

/// Whether `format` asks for JSON output
pub fn is_json(format: &str) -> bool {
    format.eq_ignore_ascii_case("json")
}
