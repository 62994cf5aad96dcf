//! CLI parse: clap types for Flowgate. No behavior; definitions only.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Flowgate CLI - query and control workflows
#[derive(Parser)]
#[command(name = "flowgate")]
#[command(about = "Query and lifecycle control plane for workflow orchestration")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (layered over the user config file)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// State snapshot path (overrides storage.state_file)
    #[arg(long, global = true)]
    pub state: Option<PathBuf>,

    /// Namespace to operate in (default: server.namespace, then "default")
    #[arg(short = 'n', long, global = true)]
    pub namespace: Option<String>,

    /// Output format (text or json)
    #[arg(short = 'o', long, global = true, default_value = "text")]
    pub output: String,

    /// Enable verbose logging (default: off)
    #[arg(long, global = true, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, both)
    #[arg(long, global = true)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List live and archived workflows
    List {
        /// List across every namespace
        #[arg(short = 'A', long)]
        all_namespaces: bool,
        /// Label selector (k=v, k!=v, k, !k)
        #[arg(short = 'l', long, default_value = "")]
        selector: String,
        /// Name to match
        #[arg(long, default_value = "")]
        name: String,
        /// How --name matches: Exact, Prefix, Contains, NotEquals
        #[arg(long, default_value = "")]
        name_filter: String,
        /// Only workflows created after this RFC 3339 time
        #[arg(long)]
        created_after: Option<DateTime<Utc>>,
        /// Only workflows finished before this RFC 3339 time
        #[arg(long)]
        finished_before: Option<DateTime<Utc>>,
        /// Page size (0 = unlimited)
        #[arg(long, default_value = "0")]
        limit: usize,
        /// Continuation token from a previous page
        #[arg(long = "continue", default_value = "")]
        continue_token: String,
        /// Report how many items remain after this page
        #[arg(long)]
        remaining: bool,
        /// Fields to return (e.g. "items.metadata.name" or "-items.status.nodes")
        #[arg(long, default_value = "")]
        fields: String,
    },
    /// Show one workflow ("@latest" for the most recent)
    Get {
        name: String,
        /// Fields to return
        #[arg(long, default_value = "")]
        fields: String,
    },
    /// Create a workflow from a JSON file
    Create {
        file: PathBuf,
        /// Validate only, do not create
        #[arg(long)]
        dry_run: bool,
        /// Ask the substrate for a dry run
        #[arg(long)]
        server_dry_run: bool,
    },
    /// Validate a workflow JSON file
    Lint { file: PathBuf },
    /// Submit a workflow from a cron workflow or template
    Submit {
        /// cronwf, wftmpl or cwftmpl (singular and plural names accepted)
        kind: String,
        name: String,
        /// Name of the new workflow
        #[arg(long)]
        workflow_name: Option<String>,
        #[arg(long)]
        generate_name: Option<String>,
        #[arg(long)]
        entrypoint: Option<String>,
        /// Parameter override (k=v), repeatable
        #[arg(short = 'p', long = "parameter")]
        parameters: Vec<String>,
        /// Labels (k=v,k2=v2)
        #[arg(long)]
        labels: Option<String>,
        /// Annotations (k=v,k2=v2)
        #[arg(long)]
        annotations: Option<String>,
        #[arg(long)]
        service_account: Option<String>,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        server_dry_run: bool,
    },
    /// Delete a workflow
    Delete {
        name: String,
        /// Strip finalizers before deleting
        #[arg(long)]
        force: bool,
    },
    /// Retry a failed workflow
    Retry {
        name: String,
        /// Also restart successful nodes matched by --node-field-selector
        #[arg(long)]
        restart_successful: bool,
        #[arg(long, default_value = "")]
        node_field_selector: String,
        #[arg(short = 'p', long = "parameter")]
        parameters: Vec<String>,
    },
    /// Resubmit a workflow as a new one
    Resubmit {
        name: String,
        /// Reuse results of succeeded nodes
        #[arg(long)]
        memoized: bool,
        #[arg(short = 'p', long = "parameter")]
        parameters: Vec<String>,
    },
    /// Resume a suspended workflow
    Resume {
        name: String,
        #[arg(long, default_value = "")]
        node_field_selector: String,
    },
    /// Suspend a workflow
    Suspend { name: String },
    /// Terminate a workflow, skipping exit handlers
    Terminate { name: String },
    /// Stop a workflow, running exit handlers
    Stop {
        name: String,
        #[arg(long, default_value = "")]
        node_field_selector: String,
        #[arg(long, default_value = "")]
        message: String,
    },
    /// Set the outcome of matching nodes
    Set {
        name: String,
        #[arg(long, default_value = "")]
        node_field_selector: String,
        /// Succeeded, Failed or Error
        #[arg(long, default_value = "")]
        phase: String,
        #[arg(long, default_value = "")]
        message: String,
        /// JSON object of output parameter values
        #[arg(long, default_value = "")]
        output_parameters: String,
    },
    /// Archived workflow operations
    Archive {
        #[command(subcommand)]
        command: ArchiveCommands,
    },
}

#[derive(Subcommand)]
pub enum ArchiveCommands {
    /// Move a completed live workflow into the archive
    Put { name: String },
    /// Retry archived workflows by uid
    Retry {
        /// Archived workflow uids; duplicates are retried once
        #[arg(required = true)]
        uids: Vec<String>,
        #[arg(long)]
        restart_successful: bool,
        #[arg(long, default_value = "")]
        node_field_selector: String,
        #[arg(short = 'p', long = "parameter")]
        parameters: Vec<String>,
    },
}
