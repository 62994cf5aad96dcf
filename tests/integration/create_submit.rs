//! Create, lint and submit

use crate::integration::test_utils::Fixture;
use flowgate::error::{Code, SubstrateError};
use flowgate::server::{WorkflowCreateRequest, WorkflowLintRequest, WorkflowSubmitRequest};
use flowgate::submit::SubmitOpts;
use flowgate::workflow::{
    CronWorkflow, ObjectMeta, Workflow, LABEL_CONTROLLER_INSTANCE_ID, LABEL_CRON_WORKFLOW,
    LABEL_WORKFLOW_TEMPLATE,
};

fn hello() -> Workflow {
    let mut wf = Workflow::new("", "hello");
    wf.spec.entrypoint = "main".to_string();
    wf
}

fn create_request(wf: Workflow) -> WorkflowCreateRequest {
    WorkflowCreateRequest {
        namespace: "ns1".to_string(),
        workflow: Some(wf),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_create_fills_namespace_and_instance_label() {
    let fixture = Fixture::new();
    let server = fixture
        .builder()
        .instance_id(Some("ci".to_string()))
        .build()
        .unwrap();

    let created = server.create_workflow(&create_request(hello())).await.unwrap();
    assert_eq!(created.namespace(), "ns1");
    assert_eq!(
        created.metadata.labels.get(LABEL_CONTROLLER_INSTANCE_ID).map(String::as_str),
        Some("ci")
    );
    assert!(!created.uid().is_empty());
}

#[tokio::test]
async fn test_create_without_body_is_invalid_argument() {
    let err = Fixture::new()
        .server()
        .create_workflow(&WorkflowCreateRequest {
            namespace: "ns1".to_string(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn test_create_invalid_workflow_is_invalid_argument() {
    let mut wf = hello();
    wf.spec.entrypoint.clear();
    let err = Fixture::new()
        .server()
        .create_workflow(&create_request(wf))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
    assert!(err.message().contains("spec.entrypoint is required"));
}

#[tokio::test]
async fn test_client_dry_run_does_not_create() {
    let fixture = Fixture::new();
    let server = fixture.server();
    let wf = server
        .create_workflow(&WorkflowCreateRequest {
            dry_run: true,
            ..create_request(hello())
        })
        .await
        .unwrap();
    assert!(wf.uid().is_empty());
    assert!(fixture.substrate.workflows().is_empty());
}

#[tokio::test]
async fn test_create_timeout_hints_existing_workflow() {
    let fixture = Fixture::new();
    fixture
        .substrate
        .fail_next_create(SubstrateError::ServerTimeout("etcd is slow".to_string()));
    let mut wf = hello();
    wf.metadata.generate_name = "hello-".to_string();

    let err = fixture
        .server()
        .create_workflow(&create_request(wf))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::DeadlineExceeded);
    assert!(err.message().starts_with(
        "create request failed due to timeout, but it's possible that workflow \"hello\" already exists"
    ));
}

#[tokio::test]
async fn test_create_timeout_without_generate_name_is_internal() {
    let fixture = Fixture::new();
    fixture
        .substrate
        .fail_next_create(SubstrateError::ServerTimeout("etcd is slow".to_string()));
    let err = fixture
        .server()
        .create_workflow(&create_request(hello()))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Internal);
}

#[tokio::test]
async fn test_failed_server_dry_run_is_invalid_argument() {
    let fixture = Fixture::new();
    fixture
        .substrate
        .fail_next_create(SubstrateError::Request("admission webhook denied".to_string()));
    let err = fixture
        .server()
        .create_workflow(&WorkflowCreateRequest {
            server_dry_run: true,
            ..create_request(hello())
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
    assert!(err.message().contains("admission webhook denied"));
    assert!(fixture.substrate.workflows().is_empty());
}

#[tokio::test]
async fn test_lint_accepts_nameless_workflow() {
    let mut wf = hello();
    wf.metadata.name.clear();
    let linted = Fixture::new()
        .server()
        .lint_workflow(&WorkflowLintRequest {
            namespace: "ns1".to_string(),
            workflow: Some(wf),
        })
        .await
        .unwrap();
    assert_eq!(linted.namespace(), "ns1");
}

#[tokio::test]
async fn test_submit_from_cron_workflow() {
    let fixture = Fixture::new();
    let mut cron = CronWorkflow {
        metadata: ObjectMeta::new("ns1", "hourly"),
        ..Default::default()
    };
    cron.spec.schedule = "0 * * * *".to_string();
    cron.spec.workflow_spec.entrypoint = "main".to_string();
    fixture.substrate.add_cron_workflow(cron);

    let created = fixture
        .server()
        .submit_workflow(&WorkflowSubmitRequest {
            namespace: "ns1".to_string(),
            resource_kind: "cronwf".to_string(),
            resource_name: "hourly".to_string(),
            submit_options: Some(SubmitOpts {
                labels: "team=data".to_string(),
                parameters: vec!["day=thu".to_string()],
                ..Default::default()
            }),
        })
        .await
        .unwrap();
    assert!(created.name().starts_with("hourly-"));
    assert_eq!(
        created.metadata.labels.get(LABEL_CRON_WORKFLOW).map(String::as_str),
        Some("hourly")
    );
    assert_eq!(created.metadata.labels.get("team").map(String::as_str), Some("data"));
    assert_eq!(created.spec.arguments.get("day"), Some("thu"));
}

#[tokio::test]
async fn test_submit_from_template_dry_run() {
    let fixture = Fixture::new();
    let wf = fixture
        .server()
        .submit_workflow(&WorkflowSubmitRequest {
            namespace: "ns1".to_string(),
            resource_kind: "WorkflowTemplates".to_string(),
            resource_name: "etl".to_string(),
            submit_options: Some(SubmitOpts {
                dry_run: true,
                ..Default::default()
            }),
        })
        .await
        .unwrap();
    assert_eq!(
        wf.metadata.labels.get(LABEL_WORKFLOW_TEMPLATE).map(String::as_str),
        Some("etl")
    );
    assert!(fixture.substrate.workflows().is_empty());
}

#[tokio::test]
async fn test_submit_unknown_kind() {
    let err = Fixture::new()
        .server()
        .submit_workflow(&WorkflowSubmitRequest {
            namespace: "ns1".to_string(),
            resource_kind: "Pod".to_string(),
            resource_name: "x".to_string(),
            submit_options: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
    assert_eq!(err.message(), "resourceKind \"Pod\" is not supported for submitting");
}

#[tokio::test]
async fn test_submit_malformed_labels_is_internal() {
    let err = Fixture::new()
        .server()
        .submit_workflow(&WorkflowSubmitRequest {
            namespace: "ns1".to_string(),
            resource_kind: "wftmpl".to_string(),
            resource_name: "etl".to_string(),
            submit_options: Some(SubmitOpts {
                labels: "novalue".to_string(),
                ..Default::default()
            }),
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Internal);
}
