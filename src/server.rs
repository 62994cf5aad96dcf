//! Workflow service
//!
//! The boundary of the control plane. Every operation resolves names, gates on instance
//! identity, reads through the hybrid paginator and hydrator, and answers with a coded
//! `Status` on failure. The optional reflector cache is owned here and follows the
//! server's `start`/`stop`.

mod control;
mod mutation;
mod query;
pub mod requests;

pub use requests::{
    RetryArchivedWorkflowRequest, WatchEventsRequest, WatchWorkflowsRequest, WorkflowCreateRequest,
    WorkflowDeleteRequest, WorkflowGetRequest, WorkflowLintRequest, WorkflowListRequest,
    WorkflowResubmitRequest, WorkflowResumeRequest, WorkflowRetryRequest, WorkflowSetRequest,
    WorkflowStopRequest, WorkflowSubmitRequest, WorkflowSuspendRequest, WorkflowTerminateRequest,
};

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::alias::AliasResolver;
use crate::auth::{AllowAll, PermissionChecker};
use crate::config::ServerConfig;
use crate::error::{to_status, ApiError, Code, Status};
use crate::hydrator::Hydrator;
use crate::instanceid::InstanceIdService;
use crate::logs::{LogFetcher, StaticLogFetcher};
use crate::offload::{MemoryOffloadStore, OffloadStore};
use crate::paginator::HybridPaginator;
use crate::selector::Selector;
use crate::source::cache::DEFAULT_RESYNC_PERIOD;
use crate::source::{
    ArchiveStore, CachedLiveSource, ClientLiveSource, EventClient, ListOptions, MemoryArchive,
    NamespacedListWatch, PodClient, Propagation, TemplateClient, WorkflowClient,
    WorkflowReflector,
};
use crate::validate::{StructuralValidator, WorkflowValidator};
use crate::workflow::Workflow;

pub struct WorkflowServer {
    client: Arc<dyn WorkflowClient>,
    pods: Arc<dyn PodClient>,
    events: Arc<dyn EventClient>,
    templates: Arc<dyn TemplateClient>,
    archive: Arc<dyn ArchiveStore>,
    hydrator: Hydrator,
    validator: Arc<dyn WorkflowValidator>,
    permissions: Arc<dyn PermissionChecker>,
    instance_id: InstanceIdService,
    logs: Arc<dyn LogFetcher>,
    resolver: AliasResolver,
    direct: HybridPaginator,
    cached: Option<(String, Arc<WorkflowReflector>, HybridPaginator)>,
    delete_propagation: Propagation,
    running: Arc<RwLock<bool>>,
}

impl WorkflowServer {
    pub fn builder() -> WorkflowServerBuilder {
        WorkflowServerBuilder::default()
    }

    /// Start background components (the reflector cache, when configured)
    pub fn start(&self) -> Result<(), ApiError> {
        let mut running = self.running.write();
        if *running {
            return Ok(());
        }
        *running = true;
        drop(running);

        if let Some((namespace, reflector, _)) = &self.cached {
            reflector.start()?;
            info!(namespace = %namespace, "Started workflow server with cache");
        } else {
            info!("Started workflow server");
        }
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), ApiError> {
        let mut running = self.running.write();
        if !*running {
            return Ok(());
        }
        *running = false;
        drop(running);

        if let Some((_, reflector, _)) = &self.cached {
            reflector.stop().await?;
        }
        info!("Stopped workflow server");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        *self.running.read()
    }

    /// Wait for the reflector cache's first list; immediate without a cache
    pub async fn wait_for_cache_sync(&self, timeout: Duration) -> Result<(), ApiError> {
        match &self.cached {
            Some((_, reflector, _)) => reflector.wait_for_sync(timeout).await,
            None => Ok(()),
        }
    }

    pub fn hydrator(&self) -> &Hydrator {
        &self.hydrator
    }

    pub fn instance_id(&self) -> &InstanceIdService {
        &self.instance_id
    }

    pub fn reflector(&self) -> Option<&Arc<WorkflowReflector>> {
        self.cached.as_ref().map(|(_, reflector, _)| reflector)
    }

    /// The cached paginator serves namespaces the synced cache covers; everything else
    /// reads the substrate directly
    fn paginator_for(&self, namespace: &str) -> &HybridPaginator {
        match &self.cached {
            Some((cache_namespace, reflector, paginator))
                if reflector.has_synced()
                    && (cache_namespace.is_empty() || cache_namespace == namespace) =>
            {
                paginator
            }
            _ => &self.direct,
        }
    }

    /// Resolve a name or alias and check it belongs to this instance
    async fn resolve_managed(&self, namespace: &str, name: &str) -> Result<Workflow, Status> {
        let wf = self.resolver.resolve(namespace, name).await?;
        self.instance_id
            .validate(&wf)
            .map_err(|e| to_status(e, Code::InvalidArgument))?;
        Ok(wf)
    }

    async fn refetch(&self, namespace: &str, name: &str) -> Result<Workflow, Status> {
        self.client
            .get(namespace, name)
            .await
            .map_err(|e| to_status(e, Code::Internal))
    }
}

fn parse_node_selector(raw: &str) -> Result<Selector, Status> {
    Selector::parse_fields(raw).map_err(|e| to_status(e, Code::InvalidArgument))
}

/// Assembles a `WorkflowServer` from its collaborators
#[derive(Default)]
pub struct WorkflowServerBuilder {
    client: Option<Arc<dyn WorkflowClient>>,
    pods: Option<Arc<dyn PodClient>>,
    events: Option<Arc<dyn EventClient>>,
    templates: Option<Arc<dyn TemplateClient>>,
    archive: Option<Arc<dyn ArchiveStore>>,
    offload: Option<Arc<dyn OffloadStore>>,
    validator: Option<Arc<dyn WorkflowValidator>>,
    permissions: Option<Arc<dyn PermissionChecker>>,
    instance_id: Option<String>,
    logs: Option<Arc<dyn LogFetcher>>,
    cache: Option<(String, Duration)>,
    delete_propagation: Propagation,
}

impl WorkflowServerBuilder {
    /// Use one substrate for every client role
    pub fn substrate<S>(mut self, substrate: Arc<S>) -> Self
    where
        S: WorkflowClient + PodClient + EventClient + TemplateClient + 'static,
    {
        self.client = Some(substrate.clone() as Arc<dyn WorkflowClient>);
        self.pods = Some(substrate.clone() as Arc<dyn PodClient>);
        self.events = Some(substrate.clone() as Arc<dyn EventClient>);
        self.templates = Some(substrate as Arc<dyn TemplateClient>);
        self
    }

    pub fn workflow_client(mut self, client: Arc<dyn WorkflowClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn pod_client(mut self, pods: Arc<dyn PodClient>) -> Self {
        self.pods = Some(pods);
        self
    }

    pub fn event_client(mut self, events: Arc<dyn EventClient>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn template_client(mut self, templates: Arc<dyn TemplateClient>) -> Self {
        self.templates = Some(templates);
        self
    }

    pub fn archive(mut self, archive: Arc<dyn ArchiveStore>) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn offload(mut self, offload: Arc<dyn OffloadStore>) -> Self {
        self.offload = Some(offload);
        self
    }

    pub fn validator(mut self, validator: Arc<dyn WorkflowValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn permissions(mut self, permissions: Arc<dyn PermissionChecker>) -> Self {
        self.permissions = Some(permissions);
        self
    }

    pub fn instance_id(mut self, instance_id: Option<String>) -> Self {
        self.instance_id = instance_id;
        self
    }

    pub fn log_fetcher(mut self, logs: Arc<dyn LogFetcher>) -> Self {
        self.logs = Some(logs);
        self
    }

    /// Serve listings of `namespace` (empty = all) from a reflector cache
    pub fn cache(mut self, namespace: impl Into<String>, resync_period: Duration) -> Self {
        self.cache = Some((namespace.into(), resync_period));
        self
    }

    pub fn delete_propagation(mut self, propagation: Propagation) -> Self {
        self.delete_propagation = propagation;
        self
    }

    /// Apply instance id, delete propagation and cache settings
    pub fn with_config(mut self, config: &ServerConfig) -> Self {
        self.instance_id = config.instance_id.clone();
        self.delete_propagation = config.delete_propagation;
        if let Some(namespace) = &config.namespace {
            self.cache = Some((namespace.clone(), config.resync_period()));
        }
        self
    }

    pub fn build(self) -> Result<WorkflowServer, ApiError> {
        let missing = |role: &str| ApiError::ConfigError(format!("workflow server needs a {}", role));
        let client = self.client.ok_or_else(|| missing("workflow client"))?;
        let pods = self.pods.ok_or_else(|| missing("pod client"))?;
        let events = self.events.ok_or_else(|| missing("event client"))?;
        let templates = self.templates.ok_or_else(|| missing("template client"))?;

        let archive = self
            .archive
            .unwrap_or_else(|| Arc::new(MemoryArchive::new()));
        let offload = self
            .offload
            .unwrap_or_else(|| Arc::new(MemoryOffloadStore::disabled()));
        let permissions = self.permissions.unwrap_or_else(|| Arc::new(AllowAll));
        let instance_id = InstanceIdService::new(self.instance_id);

        let direct = HybridPaginator::new(
            Arc::new(ClientLiveSource::new(client.clone())),
            archive.clone(),
        );
        let cached = self.cache.map(|(namespace, resync_period)| {
            let mut scope = ListOptions::default();
            instance_id.with(&mut scope);
            let list_watch = NamespacedListWatch::new(client.clone(), namespace.clone())
                .with_label_selector(scope.label_selector);
            let resync_period = if resync_period.is_zero() {
                DEFAULT_RESYNC_PERIOD
            } else {
                resync_period
            };
            let reflector = Arc::new(WorkflowReflector::new(Arc::new(list_watch), resync_period));
            let paginator = HybridPaginator::new(
                Arc::new(CachedLiveSource::new(reflector.clone())),
                archive.clone(),
            );
            (namespace, reflector, paginator)
        });

        Ok(WorkflowServer {
            resolver: AliasResolver::new(client.clone(), archive.clone(), permissions.clone()),
            client,
            pods,
            events,
            templates,
            archive,
            hydrator: Hydrator::new(offload),
            validator: self
                .validator
                .unwrap_or_else(|| Arc::new(StructuralValidator)),
            permissions,
            instance_id,
            logs: self
                .logs
                .unwrap_or_else(|| Arc::new(StaticLogFetcher::new())),
            direct,
            cached,
            delete_propagation: self.delete_propagation,
            running: Arc::new(RwLock::new(false)),
        })
    }
}
