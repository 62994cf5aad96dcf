//! Shared test utilities for integration tests
//!
//! A `Fixture` bundles an in-memory substrate, archive and offload store so each test can
//! seed state directly and build a `WorkflowServer` over it.

use chrono::{Duration, Utc};
use flowgate::auth::PermissionChecker;
use flowgate::offload::{MemoryOffloadStore, OffloadPolicy};
use flowgate::server::{WorkflowServer, WorkflowServerBuilder};
use flowgate::source::{MemoryArchive, MemorySubstrate};
use flowgate::workflow::{Node, NodeType, Phase, Workflow};
use std::sync::Arc;

pub struct Fixture {
    pub substrate: Arc<MemorySubstrate>,
    pub archive: Arc<MemoryArchive>,
    pub offload: Arc<MemoryOffloadStore>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_offload(OffloadPolicy::disabled())
    }

    pub fn with_offload(policy: OffloadPolicy) -> Self {
        Self {
            substrate: Arc::new(MemorySubstrate::new()),
            archive: Arc::new(MemoryArchive::new()),
            offload: Arc::new(MemoryOffloadStore::new(policy)),
        }
    }

    pub fn builder(&self) -> WorkflowServerBuilder {
        WorkflowServer::builder()
            .substrate(self.substrate.clone())
            .archive(self.archive.clone())
            .offload(self.offload.clone())
    }

    pub fn server(&self) -> WorkflowServer {
        self.builder().build().unwrap()
    }

    pub fn server_with_permissions(&self, permissions: Arc<dyn PermissionChecker>) -> WorkflowServer {
        self.builder().permissions(permissions).build().unwrap()
    }

    /// Seed a live workflow and return it as stored
    pub fn live(&self, wf: Workflow) -> Workflow {
        self.substrate.insert_workflow(wf)
    }

    pub fn archived(&self, wf: Workflow) {
        self.archive.archive(wf);
    }
}

/// Offloading on for every node mapping
pub fn always_offload() -> OffloadPolicy {
    OffloadPolicy {
        enabled: true,
        max_inline_bytes: 1024 * 1024,
        always_offload: true,
    }
}

/// A workflow created `created_days_ago` and, when given, finished `finished_days_ago`
pub fn workflow(
    namespace: &str,
    name: &str,
    phase: Phase,
    created_days_ago: i64,
    finished_days_ago: Option<i64>,
) -> Workflow {
    let now = Utc::now();
    let mut wf = Workflow::new(namespace, name);
    wf.metadata.uid = format!("uid-{}", name);
    wf.metadata.creation_timestamp = Some(now - Duration::days(created_days_ago));
    wf.spec.entrypoint = "main".to_string();
    wf.status.phase = phase;
    wf.status.started_at = wf.metadata.creation_timestamp;
    wf.status.finished_at = finished_days_ago.map(|days| now - Duration::days(days));
    wf
}

/// A failed workflow with a steps root, one succeeded pod and `failed_pods` failed pods
pub fn failed_with_pods(namespace: &str, name: &str, failed_pods: usize) -> Workflow {
    let mut wf = workflow(namespace, name, Phase::Failed, 1, Some(0));
    let mut root = Node::new(name, name, NodeType::Steps).with_phase(Phase::Failed);

    let ok_id = format!("{}-ok", name);
    root.children.push(ok_id.clone());
    wf.status.nodes.insert(
        ok_id.clone(),
        Node::new(&ok_id, format!("{}.ok", name), NodeType::Pod)
            .with_phase(Phase::Succeeded)
            .with_pod(format!("{}-pod-ok", name)),
    );
    for i in 0..failed_pods {
        let id = format!("{}-fail-{}", name, i);
        root.children.push(id.clone());
        wf.status.nodes.insert(
            id.clone(),
            Node::new(&id, format!("{}.fail-{}", name, i), NodeType::Pod)
                .with_phase(Phase::Failed)
                .with_pod(format!("{}-pod-{}", name, i)),
        );
    }
    wf.status.nodes.insert(name.to_string(), root);
    wf
}

/// A running workflow paused on one suspend node
pub fn suspended(namespace: &str, name: &str) -> Workflow {
    let mut wf = workflow(namespace, name, Phase::Running, 0, None);
    wf.spec.suspend = Some(true);
    let id = format!("{}-approve", name);
    let mut root = Node::new(name, name, NodeType::Steps).with_phase(Phase::Running);
    root.children.push(id.clone());
    let mut gate = Node::new(&id, format!("{}.approve", name), NodeType::Suspend)
        .with_phase(Phase::Running);
    gate.display_name = "approve".to_string();
    wf.status.nodes.insert(name.to_string(), root);
    wf.status.nodes.insert(id, gate);
    wf
}
