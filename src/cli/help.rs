//! CLI command-name contract for logging and routing.

use crate::cli::parse::{ArchiveCommands, Commands};

/// Command name string for log spans (e.g. "list", "archive.retry").
pub fn command_name(command: &Commands) -> String {
    match command {
        Commands::List { .. } => "list".to_string(),
        Commands::Get { .. } => "get".to_string(),
        Commands::Create { .. } => "create".to_string(),
        Commands::Lint { .. } => "lint".to_string(),
        Commands::Submit { .. } => "submit".to_string(),
        Commands::Delete { .. } => "delete".to_string(),
        Commands::Retry { .. } => "retry".to_string(),
        Commands::Resubmit { .. } => "resubmit".to_string(),
        Commands::Resume { .. } => "resume".to_string(),
        Commands::Suspend { .. } => "suspend".to_string(),
        Commands::Terminate { .. } => "terminate".to_string(),
        Commands::Stop { .. } => "stop".to_string(),
        Commands::Set { .. } => "set".to_string(),
        Commands::Archive { command } => format!("archive.{}", archive_command_name(command)),
    }
}

pub fn archive_command_name(command: &ArchiveCommands) -> &'static str {
    match command {
        ArchiveCommands::Put { .. } => "put",
        ArchiveCommands::Retry { .. } => "retry",
    }
}

/// Whether the command can change state, so the snapshot must be written back
pub fn is_mutation(command: &Commands) -> bool {
    !matches!(
        command,
        Commands::List { .. } | Commands::Get { .. } | Commands::Lint { .. }
    )
}
