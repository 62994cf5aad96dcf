//! Create, delete, lint and submit

use serde_json::json;
use tracing::{info, warn};

use super::requests::{
    WorkflowCreateRequest, WorkflowDeleteRequest, WorkflowLintRequest, WorkflowSubmitRequest,
};
use super::WorkflowServer;
use crate::error::{to_status, Code, Status};
use crate::source::{CreateOptions, DeleteOptions};
use crate::submit::{apply_submit_opts, workflow_from_cron, workflow_from_template, ResourceKind};
use crate::validate::ValidateOpts;
use crate::workflow::Workflow;

impl WorkflowServer {
    pub async fn create_workflow(&self, req: &WorkflowCreateRequest) -> Result<Workflow, Status> {
        let mut wf = req
            .workflow
            .clone()
            .ok_or_else(|| Status::invalid_argument("workflow body not specified"))?;
        if wf.metadata.namespace.is_empty() {
            wf.metadata.namespace = req.namespace.clone();
        }
        self.instance_id.label(&mut wf);

        self.validator
            .validate(&wf, ValidateOpts::default())
            .await
            .map_err(|e| to_status(e, Code::InvalidArgument))?;

        if req.dry_run {
            return Ok(wf);
        }

        let name = wf.metadata.name.clone();
        let has_generate_name = !wf.metadata.generate_name.is_empty();
        let created = match self
            .client
            .create(
                wf,
                CreateOptions {
                    dry_run: req.server_dry_run,
                },
            )
            .await
        {
            Ok(created) => created,
            Err(e) if e.is_server_timeout() && !name.is_empty() && has_generate_name => {
                warn!(namespace = %req.namespace, workflow = %name, error = %e, "Create timed out");
                return Err(Status::deadline_exceeded(format!(
                    "create request failed due to timeout, but it's possible that workflow \"{}\" already exists. Original error: {}",
                    name, e
                )));
            }
            Err(e) if req.server_dry_run => {
                warn!(namespace = %req.namespace, error = %e, "Server dry run create failed");
                return Err(to_status(e, Code::InvalidArgument));
            }
            Err(e) => {
                warn!(namespace = %req.namespace, error = %e, "Create failed");
                return Err(to_status(e, Code::Internal));
            }
        };
        info!(
            namespace = %created.namespace(),
            workflow = %created.name(),
            dry_run = req.server_dry_run,
            "Created workflow"
        );
        Ok(created)
    }

    pub async fn delete_workflow(&self, req: &WorkflowDeleteRequest) -> Result<(), Status> {
        let wf = self.resolve_managed(&req.namespace, &req.name).await?;
        if req.force {
            self.client
                .patch(
                    wf.namespace(),
                    wf.name(),
                    &json!({"metadata": {"finalizers": null}}),
                )
                .await
                .map_err(|e| to_status(e, Code::Internal))?;
        }
        self.client
            .delete(
                wf.namespace(),
                wf.name(),
                DeleteOptions {
                    propagation: self.delete_propagation,
                },
            )
            .await
            .map_err(|e| to_status(e, Code::Internal))?;
        info!(namespace = %wf.namespace(), workflow = %wf.name(), force = req.force, "Deleted workflow");
        Ok(())
    }

    pub async fn lint_workflow(&self, req: &WorkflowLintRequest) -> Result<Workflow, Status> {
        let mut wf = req
            .workflow
            .clone()
            .ok_or_else(|| Status::invalid_argument("workflow body not specified"))?;
        if wf.metadata.namespace.is_empty() {
            wf.metadata.namespace = req.namespace.clone();
        }
        self.instance_id.label(&mut wf);
        self.validator
            .validate(
                &wf,
                ValidateOpts {
                    lint: true,
                    submit: false,
                },
            )
            .await
            .map_err(|e| to_status(e, Code::InvalidArgument))?;
        Ok(wf)
    }

    pub async fn submit_workflow(&self, req: &WorkflowSubmitRequest) -> Result<Workflow, Status> {
        let kind = ResourceKind::parse(&req.resource_kind).ok_or_else(|| {
            Status::invalid_argument(format!(
                "resourceKind \"{}\" is not supported for submitting",
                req.resource_kind
            ))
        })?;
        let mut wf = match kind {
            ResourceKind::CronWorkflow => {
                let cron = self
                    .templates
                    .get_cron_workflow(&req.namespace, &req.resource_name)
                    .await
                    .map_err(|e| to_status(e, Code::Internal))?;
                workflow_from_cron(&cron)
            }
            ResourceKind::WorkflowTemplate => {
                workflow_from_template(&req.namespace, &req.resource_name, false)
            }
            ResourceKind::ClusterWorkflowTemplate => {
                workflow_from_template(&req.namespace, &req.resource_name, true)
            }
        };

        apply_submit_opts(&mut wf, req.submit_options.as_ref())
            .map_err(|e| to_status(e, Code::Internal))?;
        self.instance_id.label(&mut wf);
        self.validator
            .validate(
                &wf,
                ValidateOpts {
                    lint: false,
                    submit: true,
                },
            )
            .await
            .map_err(|e| to_status(e, Code::InvalidArgument))?;

        let opts = req.submit_options.clone().unwrap_or_default();
        if opts.dry_run {
            return Ok(wf);
        }
        let created = self
            .client
            .create(
                wf,
                CreateOptions {
                    dry_run: opts.server_dry_run,
                },
            )
            .await
            .map_err(|e| to_status(e, Code::InvalidArgument))?;
        info!(
            namespace = %created.namespace(),
            workflow = %created.name(),
            kind = %kind,
            from = %req.resource_name,
            "Submitted workflow"
        );
        Ok(created)
    }
}
