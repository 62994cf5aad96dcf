//! CLI route: single route table and run context. Dispatches to the workflow server and
//! presentation.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::cli::parse::{ArchiveCommands, Commands};
use crate::cli::presentation::{
    format_archive_retry_results, format_deleted, format_lint_result, format_mutation_result,
    format_workflow_json, format_workflow_list_json, format_workflow_list_text,
    format_workflow_text, ArchiveRetryResult,
};
use crate::cli::{command_name, is_json, is_mutation, map_error};
use crate::config::{ConfigLoader, FlowgateConfig};
use crate::error::{to_status, ApiError, Code, Status};
use crate::offload::OffloadPolicy;
use crate::server::{
    RetryArchivedWorkflowRequest, WorkflowCreateRequest, WorkflowDeleteRequest,
    WorkflowGetRequest, WorkflowLintRequest, WorkflowListRequest, WorkflowResubmitRequest,
    WorkflowResumeRequest, WorkflowRetryRequest, WorkflowServer, WorkflowSetRequest,
    WorkflowStopRequest, WorkflowSubmitRequest, WorkflowSuspendRequest, WorkflowTerminateRequest,
};
use crate::snapshot::StateSnapshot;
use crate::source::{DeleteOptions, MemorySubstrate, WorkflowClient};
use crate::store::Stores;
use crate::submit::SubmitOpts;
use crate::workflow::Workflow;

const DEFAULT_NAMESPACE: &str = "default";

/// Runtime context for CLI execution: configuration, state snapshot and the workflow
/// server built over it.
pub struct RunContext {
    config: FlowgateConfig,
    state_file: PathBuf,
    namespace: String,
    substrate: Arc<MemorySubstrate>,
    stores: Stores,
    server: WorkflowServer,
}

impl RunContext {
    /// Load configuration, restore the state snapshot and build the server.
    pub fn new(
        config_path: Option<PathBuf>,
        state_path: Option<PathBuf>,
        namespace: Option<String>,
    ) -> Result<Self, ApiError> {
        let config = load_config(config_path.as_deref())?;
        let state_file = state_path.unwrap_or_else(|| config.storage.state_file.clone());
        let snapshot = StateSnapshot::load(&state_file)?;

        let policy = OffloadPolicy::from(&config.offload);
        let stores = Stores::open(&config.storage, policy, &snapshot)?;
        let substrate = Arc::new(snapshot.substrate());

        // The CLI is one-shot; the reflector cache would only add a sync wait.
        let server = WorkflowServer::builder()
            .substrate(substrate.clone())
            .archive(stores.archive())
            .offload(stores.offload())
            .instance_id(config.server.instance_id.clone())
            .delete_propagation(config.server.delete_propagation)
            .build()?;

        let namespace = namespace
            .or_else(|| config.server.namespace.clone())
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        debug!(
            state_file = %state_file.display(),
            namespace = %namespace,
            backend = ?config.storage.backend,
            "CLI context initialized"
        );

        Ok(Self {
            config,
            state_file,
            namespace,
            substrate,
            stores,
            server,
        })
    }

    pub fn config(&self) -> &FlowgateConfig {
        &self.config
    }

    pub fn server(&self) -> &WorkflowServer {
        &self.server
    }

    pub fn state_file(&self) -> &Path {
        &self.state_file
    }

    /// Execute a CLI command via the single route table; mutations write the snapshot back.
    pub async fn execute(&self, command: &Commands, output: &str) -> Result<String, ApiError> {
        let started = Instant::now();
        let name = command_name(command);
        let result = self.execute_inner(command, is_json(output)).await;
        if is_mutation(command) {
            self.persist()?;
        }
        match &result {
            Ok(_) => info!(
                command = %name,
                duration_ms = started.elapsed().as_millis() as u64,
                "Command completed"
            ),
            Err(e) => warn!(command = %name, error = %map_error(e), "Command failed"),
        }
        result
    }

    /// Write the substrate and memory-backed stores to the state snapshot
    pub fn persist(&self) -> Result<(), ApiError> {
        let snapshot = self
            .stores
            .persist(StateSnapshot::capture(&self.substrate))?;
        snapshot.save(&self.state_file)?;
        Ok(())
    }

    async fn execute_inner(&self, command: &Commands, json: bool) -> Result<String, ApiError> {
        let ns = self.namespace.clone();
        match command {
            Commands::List {
                all_namespaces,
                selector,
                name,
                name_filter,
                created_after,
                finished_before,
                limit,
                continue_token,
                remaining,
                fields,
            } => {
                let req = WorkflowListRequest {
                    namespace: if *all_namespaces { String::new() } else { ns },
                    label_selector: selector.clone(),
                    name: name.clone(),
                    name_filter: name_filter.clone(),
                    created_after: *created_after,
                    finished_before: *finished_before,
                    continue_token: continue_token.clone(),
                    limit: *limit,
                    show_remaining_item_count: *remaining,
                    fields: fields.clone(),
                };
                let list = self.server.list_workflows(&req).await?;
                if json {
                    format_workflow_list_json(&list)
                } else {
                    Ok(format_workflow_list_text(&list, *all_namespaces))
                }
            }
            Commands::Get { name, fields } => {
                let wf = self
                    .server
                    .get_workflow(&WorkflowGetRequest {
                        namespace: ns,
                        name: name.clone(),
                        fields: fields.clone(),
                    })
                    .await?;
                if json {
                    format_workflow_json(&wf)
                } else {
                    Ok(format_workflow_text(&wf))
                }
            }
            Commands::Create {
                file,
                dry_run,
                server_dry_run,
            } => {
                let wf = self
                    .server
                    .create_workflow(&WorkflowCreateRequest {
                        namespace: ns,
                        workflow: Some(read_workflow(file)?),
                        dry_run: *dry_run,
                        server_dry_run: *server_dry_run,
                    })
                    .await?;
                format_mutation_result("created", &wf, json)
            }
            Commands::Lint { file } => {
                let wf = self
                    .server
                    .lint_workflow(&WorkflowLintRequest {
                        namespace: ns,
                        workflow: Some(read_workflow(file)?),
                    })
                    .await?;
                format_lint_result(&wf, json)
            }
            Commands::Submit {
                kind,
                name,
                workflow_name,
                generate_name,
                entrypoint,
                parameters,
                labels,
                annotations,
                service_account,
                dry_run,
                server_dry_run,
            } => {
                let submit_options = SubmitOpts {
                    name: workflow_name.clone().unwrap_or_default(),
                    generate_name: generate_name.clone().unwrap_or_default(),
                    entrypoint: entrypoint.clone().unwrap_or_default(),
                    parameters: parameters.clone(),
                    labels: labels.clone().unwrap_or_default(),
                    annotations: annotations.clone().unwrap_or_default(),
                    service_account: service_account.clone().unwrap_or_default(),
                    dry_run: *dry_run,
                    server_dry_run: *server_dry_run,
                };
                let wf = self
                    .server
                    .submit_workflow(&WorkflowSubmitRequest {
                        namespace: ns,
                        resource_kind: kind.clone(),
                        resource_name: name.clone(),
                        submit_options: Some(submit_options),
                    })
                    .await?;
                format_mutation_result("submitted", &wf, json)
            }
            Commands::Delete { name, force } => {
                self.server
                    .delete_workflow(&WorkflowDeleteRequest {
                        namespace: ns.clone(),
                        name: name.clone(),
                        force: *force,
                    })
                    .await?;
                format_deleted(&ns, name, json)
            }
            Commands::Retry {
                name,
                restart_successful,
                node_field_selector,
                parameters,
            } => {
                let wf = self
                    .server
                    .retry_workflow(&WorkflowRetryRequest {
                        namespace: ns,
                        name: name.clone(),
                        restart_successful: *restart_successful,
                        node_field_selector: node_field_selector.clone(),
                        parameters: parameters.clone(),
                    })
                    .await?;
                format_mutation_result("retried", &wf, json)
            }
            Commands::Resubmit {
                name,
                memoized,
                parameters,
            } => {
                let wf = self
                    .server
                    .resubmit_workflow(&WorkflowResubmitRequest {
                        namespace: ns,
                        name: name.clone(),
                        memoized: *memoized,
                        parameters: parameters.clone(),
                    })
                    .await?;
                format_mutation_result("resubmitted", &wf, json)
            }
            Commands::Resume {
                name,
                node_field_selector,
            } => {
                let wf = self
                    .server
                    .resume_workflow(&WorkflowResumeRequest {
                        namespace: ns,
                        name: name.clone(),
                        node_field_selector: node_field_selector.clone(),
                    })
                    .await?;
                format_mutation_result("resumed", &wf, json)
            }
            Commands::Suspend { name } => {
                let wf = self
                    .server
                    .suspend_workflow(&WorkflowSuspendRequest {
                        namespace: ns,
                        name: name.clone(),
                    })
                    .await?;
                format_mutation_result("suspended", &wf, json)
            }
            Commands::Terminate { name } => {
                let wf = self
                    .server
                    .terminate_workflow(&WorkflowTerminateRequest {
                        namespace: ns,
                        name: name.clone(),
                    })
                    .await?;
                format_mutation_result("terminated", &wf, json)
            }
            Commands::Stop {
                name,
                node_field_selector,
                message,
            } => {
                let wf = self
                    .server
                    .stop_workflow(&WorkflowStopRequest {
                        namespace: ns,
                        name: name.clone(),
                        node_field_selector: node_field_selector.clone(),
                        message: message.clone(),
                    })
                    .await?;
                format_mutation_result("stopped", &wf, json)
            }
            Commands::Set {
                name,
                node_field_selector,
                phase,
                message,
                output_parameters,
            } => {
                let wf = self
                    .server
                    .set_workflow(&WorkflowSetRequest {
                        namespace: ns,
                        name: name.clone(),
                        node_field_selector: node_field_selector.clone(),
                        message: message.clone(),
                        phase: phase.clone(),
                        output_parameters: output_parameters.clone(),
                    })
                    .await?;
                format_mutation_result("updated", &wf, json)
            }
            Commands::Archive { command } => self.handle_archive_command(command, &ns, json).await,
        }
    }

    async fn handle_archive_command(
        &self,
        command: &ArchiveCommands,
        ns: &str,
        json: bool,
    ) -> Result<String, ApiError> {
        match command {
            ArchiveCommands::Put { name } => {
                let wf = self.archive_live_workflow(ns, name).await?;
                format_mutation_result("archived", &wf, json)
            }
            ArchiveCommands::Retry {
                uids,
                restart_successful,
                node_field_selector,
                parameters,
            } => {
                let mut seen = BTreeSet::new();
                let mut results = Vec::new();
                for uid in uids.iter().filter(|uid| seen.insert(uid.as_str())) {
                    let req = RetryArchivedWorkflowRequest {
                        uid: uid.clone(),
                        restart_successful: *restart_successful,
                        node_field_selector: node_field_selector.clone(),
                        parameters: parameters.clone(),
                    };
                    let result = match self.server.retry_archived_workflow(&req).await {
                        Ok(wf) => ArchiveRetryResult {
                            uid: uid.clone(),
                            workflow: Some(wf.name().to_string()),
                            error: None,
                        },
                        Err(status) => ArchiveRetryResult {
                            uid: uid.clone(),
                            workflow: None,
                            error: Some(map_error(&ApiError::Status(status))),
                        },
                    };
                    results.push(result);
                }
                let failed = results.iter().filter(|r| r.error.is_some()).count();
                let output = format_archive_retry_results(&results, json)?;
                if failed > 0 {
                    return Err(ApiError::Status(Status::internal(format!(
                        "{} of {} archived workflows failed to retry\n{}",
                        failed,
                        results.len(),
                        output
                    ))));
                }
                Ok(output)
            }
        }
    }

    /// Move a completed workflow from the substrate into the archive, full node status included
    async fn archive_live_workflow(&self, ns: &str, name: &str) -> Result<Workflow, ApiError> {
        let mut wf = self
            .substrate
            .get(ns, name)
            .await
            .map_err(|e| to_status(e, Code::Internal))?;
        if !wf.is_completed() {
            return Err(ApiError::Status(Status::invalid_argument(format!(
                "workflow \"{}\" is {} and cannot be archived until it completes",
                name,
                wf.phase()
            ))));
        }
        self.server.instance_id().validate(&wf)?;
        self.server.hydrator().hydrate(&mut wf).await?;
        self.stores.archive_workflow(wf.clone())?;
        self.substrate
            .delete(ns, name, DeleteOptions::default())
            .await?;
        Ok(wf)
    }
}

fn load_config(config_path: Option<&Path>) -> Result<FlowgateConfig, ApiError> {
    let loader = ConfigLoader::new();
    match config_path {
        Some(path) => loader.with_file(path).load(),
        None => loader.load(),
    }
}

fn read_workflow(path: &Path) -> Result<Workflow, ApiError> {
    let bytes = std::fs::read(path).map_err(|e| {
        ApiError::InvalidArgument(format!("failed to read {}: {}", path.display(), e))
    })?;
    serde_json::from_slice(&bytes).map_err(|e| {
        ApiError::InvalidArgument(format!("failed to parse {}: {}", path.display(), e))
    })
}
