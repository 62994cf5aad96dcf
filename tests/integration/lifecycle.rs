//! Lifecycle operations through the server

use crate::integration::test_utils::{always_offload, failed_with_pods, suspended, workflow, Fixture};
use flowgate::error::{Code, SubstrateError};
use flowgate::server::{
    WorkflowDeleteRequest, WorkflowResubmitRequest, WorkflowResumeRequest, WorkflowRetryRequest,
    WorkflowSetRequest, WorkflowStopRequest, WorkflowSuspendRequest, WorkflowTerminateRequest,
};
use flowgate::source::WorkflowClient;
use flowgate::workflow::{Phase, ShutdownStrategy, LABEL_RESUBMITTED_FROM};

fn retry_request(name: &str) -> WorkflowRetryRequest {
    WorkflowRetryRequest {
        namespace: "ns1".to_string(),
        name: name.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_retry_removes_failed_pods() {
    let fixture = Fixture::new();
    fixture.live(failed_with_pods("ns1", "wf", 2));
    for pod in ["wf-pod-ok", "wf-pod-0", "wf-pod-1"] {
        fixture.substrate.add_pod("ns1", pod);
    }
    let server = fixture.server();

    let retried = server.retry_workflow(&retry_request("wf")).await.unwrap();
    assert_eq!(retried.phase(), Phase::Running);
    assert!(retried.status.nodes.contains_key("wf-ok"));
    assert!(!retried.status.nodes.contains_key("wf-fail-0"));
    assert_eq!(
        retried.status.nodes["wf"].phase,
        Some(Phase::Running),
        "steps root runs again"
    );
    assert!(fixture.substrate.has_pod("ns1", "wf-pod-ok"));
    assert!(!fixture.substrate.has_pod("ns1", "wf-pod-0"));
    assert!(!fixture.substrate.has_pod("ns1", "wf-pod-1"));
}

#[tokio::test]
async fn test_retry_reports_one_pod_error_after_all_deletions() {
    let fixture = Fixture::new();
    fixture.live(failed_with_pods("ns1", "wf", 3));
    fixture.substrate.fail_pod_deletion(
        "ns1",
        "wf-pod-1",
        SubstrateError::Request("pod is stuck".to_string()),
    );
    let server = fixture.server();

    let err = server.retry_workflow(&retry_request("wf")).await.unwrap_err();
    assert_eq!(err.code(), Code::Internal);
    assert!(err.message().contains("pod is stuck"));
    assert_eq!(fixture.substrate.pod_deletion_attempts().len(), 3);

    let unchanged = fixture.substrate.get("ns1", "wf").await.unwrap();
    assert_eq!(unchanged.phase(), Phase::Failed);
}

#[tokio::test]
async fn test_retry_running_workflow_fails() {
    let fixture = Fixture::new();
    fixture.live(workflow("ns1", "busy", Phase::Running, 0, None));
    let err = fixture
        .server()
        .retry_workflow(&retry_request("busy"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Internal);
}

#[tokio::test]
async fn test_retry_with_offloaded_nodes() {
    let fixture = Fixture::with_offload(always_offload());
    let server = fixture.server();
    let mut wf = failed_with_pods("ns1", "big", 1);
    server.hydrator().dehydrate(&mut wf).await.unwrap();
    fixture.live(wf);

    let retried = server.retry_workflow(&retry_request("big")).await.unwrap();
    assert!(retried.status.is_offloaded(), "stored form stays dehydrated");
    let mut hydrated = retried.clone();
    server.hydrator().hydrate(&mut hydrated).await.unwrap();
    assert!(hydrated.status.nodes.contains_key("big-ok"));
    assert!(!hydrated.status.nodes.contains_key("big-fail-0"));
}

#[tokio::test]
async fn test_resubmit_creates_new_workflow() {
    let fixture = Fixture::new();
    fixture.live(failed_with_pods("ns1", "nightly", 1));
    let server = fixture.server();

    let created = server
        .resubmit_workflow(&WorkflowResubmitRequest {
            namespace: "ns1".to_string(),
            name: "nightly".to_string(),
            memoized: true,
            parameters: vec!["day=tue".to_string()],
        })
        .await
        .unwrap();
    assert!(created.name().starts_with("nightly-"));
    assert_eq!(
        created.metadata.labels.get(LABEL_RESUBMITTED_FROM).map(String::as_str),
        Some("nightly")
    );
    assert_eq!(created.spec.arguments.get("day"), Some("tue"));
    assert!(created.status.nodes.contains_key("nightly-ok"));
    assert_eq!(created.status.nodes.len(), 1);
}

#[tokio::test]
async fn test_suspend_then_resume() {
    let fixture = Fixture::new();
    fixture.live(workflow("ns1", "wf", Phase::Running, 0, None));
    let server = fixture.server();

    let wf = server
        .suspend_workflow(&WorkflowSuspendRequest {
            namespace: "ns1".to_string(),
            name: "wf".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(wf.spec.suspend, Some(true));

    let wf = server
        .resume_workflow(&WorkflowResumeRequest {
            namespace: "ns1".to_string(),
            name: "wf".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(wf.spec.suspend, None);
}

#[tokio::test]
async fn test_resume_with_selector_completes_matching_suspend_node() {
    let fixture = Fixture::new();
    fixture.live(suspended("ns1", "gate"));
    let server = fixture.server();

    let wf = server
        .resume_workflow(&WorkflowResumeRequest {
            namespace: "ns1".to_string(),
            name: "gate".to_string(),
            node_field_selector: "displayName=approve".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(wf.status.nodes["gate-approve"].phase, Some(Phase::Succeeded));
    assert_eq!(wf.spec.suspend, Some(true), "selector leaves workflow suspend alone");
}

#[tokio::test]
async fn test_terminate_and_stop() {
    let fixture = Fixture::new();
    fixture.live(workflow("ns1", "t", Phase::Running, 0, None));
    fixture.live(workflow("ns1", "s", Phase::Running, 0, None));
    let server = fixture.server();

    let terminated = server
        .terminate_workflow(&WorkflowTerminateRequest {
            namespace: "ns1".to_string(),
            name: "t".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(terminated.phase(), Phase::Terminated);
    assert_eq!(terminated.spec.shutdown, Some(ShutdownStrategy::Terminate));

    let stopped = server
        .stop_workflow(&WorkflowStopRequest {
            namespace: "ns1".to_string(),
            name: "s".to_string(),
            message: "maintenance window".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(stopped.spec.shutdown, Some(ShutdownStrategy::Stop));
    assert_eq!(stopped.status.message, "maintenance window");

    let err = server
        .stop_workflow(&WorkflowStopRequest {
            namespace: "ns1".to_string(),
            name: "t".to_string(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(err.message().contains("cannot shutdown a completed workflow"));
}

#[tokio::test]
async fn test_set_unknown_phase_mutates_nothing() {
    let fixture = Fixture::new();
    let stored = fixture.live(suspended("ns1", "gate"));
    let server = fixture.server();

    let err = server
        .set_workflow(&WorkflowSetRequest {
            namespace: "ns1".to_string(),
            name: "gate".to_string(),
            node_field_selector: "displayName=approve".to_string(),
            phase: "Unknown".to_string(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
    let after = fixture.substrate.get("ns1", "gate").await.unwrap();
    assert_eq!(after.metadata.resource_version, stored.metadata.resource_version);
}

#[tokio::test]
async fn test_set_outputs_on_suspend_node() {
    let fixture = Fixture::new();
    fixture.live(suspended("ns1", "gate"));
    let server = fixture.server();

    let wf = server
        .set_workflow(&WorkflowSetRequest {
            namespace: "ns1".to_string(),
            name: "gate".to_string(),
            node_field_selector: "displayName=approve".to_string(),
            phase: "Succeeded".to_string(),
            message: "approved".to_string(),
            output_parameters: r#"{"approver": "ops"}"#.to_string(),
        })
        .await
        .unwrap();
    let node = &wf.status.nodes["gate-approve"];
    assert_eq!(node.phase, Some(Phase::Succeeded));
    assert_eq!(node.message, "approved");
    assert_eq!(
        node.outputs.as_ref().and_then(|o| o.get("approver")),
        Some("ops")
    );
}

#[tokio::test]
async fn test_force_delete_strips_finalizers() {
    let fixture = Fixture::new();
    let mut wf = workflow("ns1", "pinned", Phase::Succeeded, 1, Some(0));
    wf.metadata.finalizers.push("workflows.flowgate.io/artifact-gc".to_string());
    fixture.live(wf);
    let server = fixture.server();

    server
        .delete_workflow(&WorkflowDeleteRequest {
            namespace: "ns1".to_string(),
            name: "pinned".to_string(),
            force: true,
        })
        .await
        .unwrap();
    let err = fixture.substrate.get("ns1", "pinned").await.unwrap_err();
    assert!(err.is_not_found());
}
