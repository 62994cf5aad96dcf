//! Retrying archived workflows by uid

use crate::integration::test_utils::{failed_with_pods, workflow, Fixture};
use flowgate::error::Code;
use flowgate::server::RetryArchivedWorkflowRequest;
use flowgate::source::WorkflowClient;
use flowgate::workflow::{Phase, LABEL_CONTROLLER_INSTANCE_ID, LABEL_RETRIED_FROM_ARCHIVE};

fn request(uid: &str) -> RetryArchivedWorkflowRequest {
    RetryArchivedWorkflowRequest {
        uid: uid.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_missing_uid_is_not_found() {
    let err = Fixture::new()
        .server()
        .retry_archived_workflow(&request("nope"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::NotFound);
    assert_eq!(err.message(), "archived workflow nope not found");
}

#[tokio::test]
async fn test_live_namesake_is_already_exists() {
    let fixture = Fixture::new();
    fixture.archived(failed_with_pods("ns1", "nightly", 1));
    let mut live = workflow("ns1", "nightly", Phase::Running, 0, None);
    live.metadata.uid = "uid-live".to_string();
    fixture.live(live);

    let err = fixture
        .server()
        .retry_archived_workflow(&request("uid-nightly"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::AlreadyExists);
}

#[tokio::test]
async fn test_retry_recreates_live_workflow() {
    let fixture = Fixture::new();
    fixture.archived(failed_with_pods("ns1", "nightly", 2));
    fixture.substrate.add_pod("ns1", "nightly-pod-0");
    let server = fixture.server();

    let created = server
        .retry_archived_workflow(&RetryArchivedWorkflowRequest {
            uid: "uid-nightly".to_string(),
            parameters: vec!["day=wed".to_string()],
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(created.name(), "nightly");
    assert_eq!(created.phase(), Phase::Running);
    assert_ne!(created.uid(), "uid-nightly", "a fresh uid is assigned");
    assert_eq!(
        created.metadata.labels.get(LABEL_RETRIED_FROM_ARCHIVE).map(String::as_str),
        Some("uid-nightly")
    );
    assert_eq!(created.spec.arguments.get("day"), Some("wed"));
    assert!(!fixture.substrate.has_pod("ns1", "nightly-pod-0"));

    let stored = fixture.substrate.get("ns1", "nightly").await.unwrap();
    assert!(stored.status.nodes.contains_key("nightly-ok"));
    assert!(!stored.status.nodes.contains_key("nightly-fail-1"));
}

#[tokio::test]
async fn test_foreign_instance_is_invalid_argument() {
    let fixture = Fixture::new();
    let mut archived = failed_with_pods("ns1", "theirs", 1);
    archived
        .metadata
        .labels
        .insert(LABEL_CONTROLLER_INSTANCE_ID.to_string(), "other".to_string());
    fixture.archived(archived);

    let server = fixture
        .builder()
        .instance_id(Some("mine".to_string()))
        .build()
        .unwrap();
    let err = server
        .retry_archived_workflow(&request("uid-theirs"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
}
