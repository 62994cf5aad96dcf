//! Integration tests for the Flowgate workflow control plane

pub mod test_utils;

mod archive_retry;
mod cli_binary;
mod create_submit;
mod lifecycle;
mod list_scenarios;
mod watch;
