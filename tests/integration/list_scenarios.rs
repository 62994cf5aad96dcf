//! List and get across live and archived workflows

use crate::integration::test_utils::{always_offload, workflow, Fixture};
use flowgate::auth::{DenyList, Verb};
use flowgate::error::Code;
use flowgate::server::{WorkflowGetRequest, WorkflowListRequest};
use flowgate::workflow::{Node, NodeType, Phase};
use std::sync::Arc;

/// ns1: archived `a` (done 3d ago), live `b` (done 1d ago), live `c` (running)
fn scenario() -> Fixture {
    let fixture = Fixture::new();
    fixture.archived(workflow("ns1", "a", Phase::Succeeded, 4, Some(3)));
    fixture.live(workflow("ns1", "b", Phase::Succeeded, 2, Some(1)));
    fixture.live(workflow("ns1", "c", Phase::Running, 0, None));
    fixture.live(workflow("ns2", "other", Phase::Running, 0, None));
    fixture
}

fn names(items: &[flowgate::workflow::Workflow]) -> Vec<&str> {
    items.iter().map(|wf| wf.name()).collect()
}

fn list_request(namespace: &str, limit: usize, continue_token: &str) -> WorkflowListRequest {
    WorkflowListRequest {
        namespace: namespace.to_string(),
        limit,
        continue_token: continue_token.to_string(),
        show_remaining_item_count: true,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_pages_cross_live_archive_boundary() {
    let server = scenario().server();

    let first = server.list_workflows(&list_request("ns1", 2, "")).await.unwrap();
    assert_eq!(names(&first.items), vec!["c", "b"]);
    assert_eq!(first.metadata.remaining_item_count, Some(1));
    assert_eq!(first.metadata.continue_token, "2");

    let second = server
        .list_workflows(&list_request("ns1", 2, &first.metadata.continue_token))
        .await
        .unwrap();
    assert_eq!(names(&second.items), vec!["a"]);
    assert_eq!(second.metadata.remaining_item_count, Some(0));
    assert!(second.metadata.continue_token.is_empty());
}

#[tokio::test]
async fn test_unlimited_returns_live_and_archive() {
    let server = scenario().server();
    let all = server.list_workflows(&list_request("ns1", 0, "")).await.unwrap();
    assert_eq!(all.items.len(), 3);

    let everywhere = server.list_workflows(&list_request("", 0, "")).await.unwrap();
    assert_eq!(everywhere.items.len(), 4);
}

#[tokio::test]
async fn test_name_prefix_filter() {
    let fixture = scenario();
    fixture.live(workflow("ns1", "build-1", Phase::Running, 0, None));
    fixture.archived(workflow("ns1", "build-0", Phase::Failed, 5, Some(5)));
    let server = fixture.server();

    let req = WorkflowListRequest {
        namespace: "ns1".to_string(),
        name: "build-".to_string(),
        name_filter: "Prefix".to_string(),
        ..Default::default()
    };
    let list = server.list_workflows(&req).await.unwrap();
    assert_eq!(names(&list.items), vec!["build-1", "build-0"]);
}

#[tokio::test]
async fn test_malformed_continue_token_is_invalid_argument() {
    let server = scenario().server();
    let err = server
        .list_workflows(&list_request("ns1", 2, "not-a-number"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn test_list_permission_denied_hint() {
    let fixture = scenario();
    let server =
        fixture.server_with_permissions(Arc::new(DenyList::new().deny(Verb::List, "workflows")));
    let err = server
        .list_workflows(&list_request("ns1", 0, ""))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::PermissionDenied);
    assert!(err.message().contains("namespace \"ns1\""));
    assert!(err.message().contains(".namespace=ns1"));
}

#[tokio::test]
async fn test_list_projects_fields() {
    let server = scenario().server();
    let req = WorkflowListRequest {
        namespace: "ns1".to_string(),
        fields: "items.metadata.name".to_string(),
        ..Default::default()
    };
    let list = server.list_workflows(&req).await.unwrap();
    assert_eq!(list.items.len(), 3);
    assert!(list.items.iter().all(|wf| wf.uid().is_empty()));
    assert!(list.items.iter().all(|wf| !wf.name().is_empty()));
}

#[tokio::test]
async fn test_get_falls_back_to_archive() {
    let server = scenario().server();
    let wf = server
        .get_workflow(&WorkflowGetRequest {
            namespace: "ns1".to_string(),
            name: "a".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(wf.uid(), "uid-a");
}

#[tokio::test]
async fn test_get_keeps_live_error_code_when_archive_forbidden() {
    let fixture = scenario();
    let server =
        fixture.server_with_permissions(Arc::new(DenyList::new().deny(Verb::Get, "workflows")));
    let err = server
        .get_workflow(&WorkflowGetRequest {
            namespace: "ns1".to_string(),
            name: "a".to_string(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::NotFound);
}

#[tokio::test]
async fn test_latest_alias() {
    let server = scenario().server();
    let latest = server
        .get_workflow(&WorkflowGetRequest {
            namespace: "ns1".to_string(),
            name: "@latest".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(latest.name(), "c");

    let err = server
        .get_workflow(&WorkflowGetRequest {
            namespace: "empty".to_string(),
            name: "@latest".to_string(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::NotFound);
    assert_eq!(err.message(), "no workflows found");
}

#[tokio::test]
async fn test_excluding_nodes_skips_offload_store() {
    let fixture = Fixture::with_offload(always_offload());
    let mut wf = workflow("ns1", "big", Phase::Running, 0, None);
    wf.status.nodes.insert(
        "n1".to_string(),
        Node::new("n1", "big.step", NodeType::Pod).with_phase(Phase::Running),
    );
    let server = fixture.server();
    server.hydrator().dehydrate(&mut wf).await.unwrap();
    assert!(wf.status.is_offloaded());
    fixture.live(wf);
    let reads_before = fixture.offload.read_count();

    let req = WorkflowGetRequest {
        namespace: "ns1".to_string(),
        name: "big".to_string(),
        fields: "-status.nodes".to_string(),
    };
    server.get_workflow(&req).await.unwrap();
    assert_eq!(fixture.offload.read_count(), reads_before);

    let hydrated = server
        .get_workflow(&WorkflowGetRequest {
            namespace: "ns1".to_string(),
            name: "big".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(hydrated.status.nodes.len(), 1);
    assert!(fixture.offload.read_count() > reads_before);
}

#[tokio::test]
async fn test_list_survives_missing_offloaded_nodes() {
    let fixture = Fixture::with_offload(always_offload());
    let server = fixture.server();
    let mut big = workflow("ns1", "big", Phase::Running, 0, None);
    big.status.nodes.insert(
        "n1".to_string(),
        Node::new("n1", "big.step", NodeType::Pod).with_phase(Phase::Running),
    );
    server.hydrator().dehydrate(&mut big).await.unwrap();
    fixture.live(big);
    let mut dangling = workflow("ns1", "dangling", Phase::Succeeded, 1, Some(1));
    dangling.status.offload_node_status_version = Some("blake3:ffffffffffffffff".to_string());
    fixture.live(dangling);

    let list = server.list_workflows(&list_request("ns1", 0, "")).await.unwrap();
    assert_eq!(names(&list.items), vec!["big", "dangling"]);
    assert_eq!(list.items[0].status.nodes.len(), 1);
    assert!(list.items[1].status.nodes.is_empty());
    assert!(list.items[1].status.is_offloaded());
}
