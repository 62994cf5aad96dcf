//! Lifecycle operations: retry, resubmit, resume, suspend, terminate, stop, set and
//! archived retry

use tracing::{info, warn};

use super::requests::{
    RetryArchivedWorkflowRequest, WorkflowResubmitRequest, WorkflowResumeRequest,
    WorkflowRetryRequest, WorkflowSetRequest, WorkflowStopRequest, WorkflowSuspendRequest,
    WorkflowTerminateRequest,
};
use super::{parse_node_selector, WorkflowServer};
use crate::error::{to_status, Code, Status};
use crate::lifecycle::{
    self, delete_execution_units, formulate_resubmit, formulate_retry, parse_output_parameters,
    parse_set_phase, RetryOptions, SetOperationValues,
};
use crate::source::CreateOptions;
use crate::validate::ValidateOpts;
use crate::workflow::{Workflow, LABEL_RETRIED_FROM_ARCHIVE};

impl WorkflowServer {
    pub async fn retry_workflow(&self, req: &WorkflowRetryRequest) -> Result<Workflow, Status> {
        let node_selector = parse_node_selector(&req.node_field_selector)?;
        let mut wf = self.resolve_managed(&req.namespace, &req.name).await?;
        self.hydrator
            .hydrate(&mut wf)
            .await
            .map_err(|e| to_status(e, Code::Internal))?;

        let opts = RetryOptions {
            restart_successful: req.restart_successful,
            node_selector,
            parameters: req.parameters.clone(),
        };
        let (mut wf, pods) = formulate_retry(wf, &opts).map_err(|e| to_status(e, Code::Internal))?;
        delete_execution_units(self.pods.clone(), wf.namespace(), &pods)
            .await
            .map_err(|e| to_status(e, Code::Internal))?;

        self.hydrator
            .dehydrate(&mut wf)
            .await
            .map_err(|e| to_status(e, Code::Internal))?;
        let updated = self
            .client
            .update(wf)
            .await
            .map_err(|e| to_status(e, Code::Internal))?;
        info!(
            namespace = %updated.namespace(),
            workflow = %updated.name(),
            deleted_pods = pods.len(),
            "Retried workflow"
        );
        self.refetch(updated.namespace(), updated.name()).await
    }

    pub async fn resubmit_workflow(
        &self,
        req: &WorkflowResubmitRequest,
    ) -> Result<Workflow, Status> {
        let mut wf = self.resolve_managed(&req.namespace, &req.name).await?;
        self.hydrator
            .hydrate(&mut wf)
            .await
            .map_err(|e| to_status(e, Code::Internal))?;

        let mut resubmitted = formulate_resubmit(&wf, req.memoized, &req.parameters)
            .map_err(|e| to_status(e, Code::Internal))?;
        self.instance_id.label(&mut resubmitted);
        self.validator
            .validate(
                &resubmitted,
                ValidateOpts {
                    lint: false,
                    submit: true,
                },
            )
            .await
            .map_err(|e| to_status(e, Code::InvalidArgument))?;

        let created = self
            .client
            .create(resubmitted, CreateOptions::default())
            .await
            .map_err(|e| to_status(e, Code::Internal))?;
        info!(
            namespace = %created.namespace(),
            workflow = %created.name(),
            from = %wf.name(),
            memoized = req.memoized,
            "Resubmitted workflow"
        );
        Ok(created)
    }

    pub async fn resume_workflow(&self, req: &WorkflowResumeRequest) -> Result<Workflow, Status> {
        let node_selector = parse_node_selector(&req.node_field_selector)?;
        let wf = self.resolve_managed(&req.namespace, &req.name).await?;
        lifecycle::resume_workflow(
            self.client.as_ref(),
            &self.hydrator,
            wf.namespace(),
            wf.name(),
            &node_selector,
        )
        .await
        .map_err(|e| to_status(e, Code::Internal))?;
        self.refetch(wf.namespace(), wf.name()).await
    }

    pub async fn suspend_workflow(
        &self,
        req: &WorkflowSuspendRequest,
    ) -> Result<Workflow, Status> {
        let wf = self.resolve_managed(&req.namespace, &req.name).await?;
        lifecycle::suspend_workflow(self.client.as_ref(), wf.namespace(), wf.name())
            .await
            .map_err(|e| to_status(e, Code::Internal))?;
        self.refetch(wf.namespace(), wf.name()).await
    }

    pub async fn terminate_workflow(
        &self,
        req: &WorkflowTerminateRequest,
    ) -> Result<Workflow, Status> {
        let wf = self.resolve_managed(&req.namespace, &req.name).await?;
        lifecycle::terminate_workflow(self.client.as_ref(), wf.namespace(), wf.name())
            .await
            .map_err(|e| to_status(e, Code::Internal))?;
        self.refetch(wf.namespace(), wf.name()).await
    }

    pub async fn stop_workflow(&self, req: &WorkflowStopRequest) -> Result<Workflow, Status> {
        let node_selector = parse_node_selector(&req.node_field_selector)?;
        let wf = self.resolve_managed(&req.namespace, &req.name).await?;
        lifecycle::stop_workflow(
            self.client.as_ref(),
            &self.hydrator,
            wf.namespace(),
            wf.name(),
            &node_selector,
            &req.message,
        )
        .await
        .map_err(|e| to_status(e, Code::Internal))?;
        self.refetch(wf.namespace(), wf.name()).await
    }

    /// Phase and output parameters are parsed before anything is read or written
    pub async fn set_workflow(&self, req: &WorkflowSetRequest) -> Result<Workflow, Status> {
        let values = SetOperationValues {
            phase: parse_set_phase(&req.phase)?,
            message: req.message.clone(),
            output_parameters: parse_output_parameters(&req.output_parameters)?,
        };
        let node_selector = parse_node_selector(&req.node_field_selector)?;
        let wf = self.resolve_managed(&req.namespace, &req.name).await?;
        lifecycle::set_workflow(
            self.client.as_ref(),
            &self.hydrator,
            wf.namespace(),
            wf.name(),
            &node_selector,
            &values,
        )
        .await
        .map_err(|e| to_status(e, Code::Internal))?;
        self.refetch(wf.namespace(), wf.name()).await
    }

    /// Re-create an archived workflow as a live retry
    ///
    /// Refused with AlreadyExists while a live workflow of the same name exists.
    pub async fn retry_archived_workflow(
        &self,
        req: &RetryArchivedWorkflowRequest,
    ) -> Result<Workflow, Status> {
        let node_selector = parse_node_selector(&req.node_field_selector)?;
        let mut archived = self
            .archive
            .get_workflow_by_uid(&req.uid)
            .await
            .map_err(|e| to_status(e, Code::Internal))?
            .ok_or_else(|| Status::not_found(format!("archived workflow {} not found", req.uid)))?;
        self.instance_id
            .validate(&archived)
            .map_err(|e| to_status(e, Code::InvalidArgument))?;

        match self.client.get(archived.namespace(), archived.name()).await {
            Ok(_) => {
                return Err(Status::already_exists(format!(
                    "workflow \"{}\" already exists in the cluster, resubmit it instead of retrying the archived copy",
                    archived.name()
                )))
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(to_status(e, Code::Internal)),
        }

        self.hydrator
            .hydrate(&mut archived)
            .await
            .map_err(|e| to_status(e, Code::Internal))?;
        let opts = RetryOptions {
            restart_successful: req.restart_successful,
            node_selector,
            parameters: req.parameters.clone(),
        };
        let (mut wf, pods) =
            formulate_retry(archived, &opts).map_err(|e| to_status(e, Code::Internal))?;
        if let Err(e) = delete_execution_units(self.pods.clone(), wf.namespace(), &pods).await {
            warn!(namespace = %wf.namespace(), workflow = %wf.name(), error = %e, "Failed to delete pods of archived workflow");
            return Err(to_status(e, Code::Internal));
        }

        wf.metadata.resource_version.clear();
        wf.metadata.uid.clear();
        wf.metadata
            .labels
            .insert(LABEL_RETRIED_FROM_ARCHIVE.to_string(), req.uid.clone());
        let created = self
            .client
            .create(wf, CreateOptions::default())
            .await
            .map_err(|e| to_status(e, Code::Internal))?;
        info!(
            namespace = %created.namespace(),
            workflow = %created.name(),
            uid = %req.uid,
            "Retried archived workflow"
        );
        Ok(created)
    }
}
