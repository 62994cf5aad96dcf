//! Workflow and event watches

use crate::integration::test_utils::{workflow, Fixture};
use flowgate::error::Code;
use flowgate::server::{WatchEventsRequest, WatchWorkflowsRequest};
use flowgate::stream::{ChannelSink, StreamFrame};
use flowgate::workflow::{
    ClusterEvent, EventType, ObjectMeta, Phase, WatchEvent, Workflow, LABEL_CONTROLLER_INSTANCE_ID,
};
use tokio_util::sync::CancellationToken;

fn watch_request(fields: &str) -> WatchWorkflowsRequest {
    WatchWorkflowsRequest {
        namespace: "ns1".to_string(),
        fields: fields.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_watch_streams_until_cancelled() {
    let fixture = Fixture::new();
    let server = fixture.server();
    let (mut sink, mut rx) = ChannelSink::<WatchEvent<Workflow>>::new(16);
    let cancel = CancellationToken::new();

    let req = watch_request("");
    let watch = server.watch_workflows(&req, &mut sink, cancel.clone());
    let driver = async {
        assert!(matches!(rx.recv().await, Some(StreamFrame::Header)));
        fixture.live(workflow("ns2", "elsewhere", Phase::Running, 0, None));
        fixture.live(workflow("ns1", "here", Phase::Running, 0, None));
        let frame = rx.recv().await;
        cancel.cancel();
        frame
    };
    let (result, frame) = tokio::join!(watch, driver);

    assert!(result.is_ok(), "cancellation ends the watch cleanly");
    match frame {
        Some(StreamFrame::Item(event)) => {
            assert_eq!(event.event_type, EventType::Added);
            assert_eq!(event.object.name(), "here");
        }
        other => panic!("expected a workflow event, got {:?}", other),
    }
}

#[tokio::test]
async fn test_watch_projects_envelope_fields() {
    let fixture = Fixture::new();
    let server = fixture.server();
    let (mut sink, mut rx) = ChannelSink::<WatchEvent<Workflow>>::new(16);
    let cancel = CancellationToken::new();

    let req = watch_request("result.object.metadata.name");
    let watch = server.watch_workflows(&req, &mut sink, cancel.clone());
    let driver = async {
        rx.recv().await;
        fixture.live(workflow("ns1", "slim", Phase::Running, 0, None));
        let frame = rx.recv().await;
        cancel.cancel();
        frame
    };
    let (result, frame) = tokio::join!(watch, driver);

    result.unwrap();
    let Some(StreamFrame::Item(event)) = frame else {
        panic!("expected a workflow event");
    };
    assert_eq!(event.object.name(), "slim");
    assert!(event.object.uid().is_empty());
    assert!(event.object.namespace().is_empty());
}

#[tokio::test]
async fn test_closed_source_is_resource_exhausted() {
    let fixture = Fixture::new();
    let server = fixture.server();
    let (mut sink, mut rx) = ChannelSink::<WatchEvent<Workflow>>::new(16);

    let req = watch_request("");
    let watch = server.watch_workflows(&req, &mut sink, CancellationToken::new());
    let driver = async {
        rx.recv().await;
        fixture.substrate.close_watches();
    };
    let (result, _) = tokio::join!(watch, driver);

    let err = result.unwrap_err();
    assert_eq!(err.code(), Code::ResourceExhausted);
}

#[tokio::test]
async fn test_event_watch_filters_namespace() {
    let fixture = Fixture::new();
    let server = fixture.server();
    let (mut sink, mut rx) = ChannelSink::<ClusterEvent>::new(16);
    let cancel = CancellationToken::new();

    let event = |namespace: &str, reason: &str| ClusterEvent {
        metadata: ObjectMeta::new(namespace, format!("evt-{}", reason)),
        reason: reason.to_string(),
        ..Default::default()
    };

    let req = WatchEventsRequest {
        namespace: "ns1".to_string(),
        ..Default::default()
    };
    let watch = server.watch_events(&req, &mut sink, cancel.clone());
    let driver = async {
        assert!(matches!(rx.recv().await, Some(StreamFrame::Header)));
        fixture.substrate.record_event(event("ns2", "Ignored"));
        fixture.substrate.record_event(event("ns1", "WorkflowRunning"));
        let frame = rx.recv().await;
        cancel.cancel();
        frame
    };
    let (result, frame) = tokio::join!(watch, driver);

    result.unwrap();
    let Some(StreamFrame::Item(received)) = frame else {
        panic!("expected a cluster event");
    };
    assert_eq!(received.reason, "WorkflowRunning");
}

#[tokio::test]
async fn test_event_watch_scoped_to_instance() {
    let fixture = Fixture::new();
    let server = fixture
        .builder()
        .instance_id(Some("blue".to_string()))
        .build()
        .unwrap();
    let (mut sink, mut rx) = ChannelSink::<ClusterEvent>::new(16);
    let cancel = CancellationToken::new();

    let event = |instance: Option<&str>, reason: &str| {
        let mut metadata = ObjectMeta::new("ns1", format!("evt-{}", reason));
        if let Some(id) = instance {
            metadata
                .labels
                .insert(LABEL_CONTROLLER_INSTANCE_ID.to_string(), id.to_string());
        }
        ClusterEvent {
            metadata,
            reason: reason.to_string(),
            ..Default::default()
        }
    };

    let req = WatchEventsRequest {
        namespace: "ns1".to_string(),
        ..Default::default()
    };
    let watch = server.watch_events(&req, &mut sink, cancel.clone());
    let driver = async {
        assert!(matches!(rx.recv().await, Some(StreamFrame::Header)));
        fixture.substrate.record_event(event(Some("green"), "OtherInstance"));
        fixture.substrate.record_event(event(None, "Unlabelled"));
        fixture.substrate.record_event(event(Some("blue"), "Ours"));
        let frame = rx.recv().await;
        cancel.cancel();
        frame
    };
    let (result, frame) = tokio::join!(watch, driver);

    result.unwrap();
    let Some(StreamFrame::Item(received)) = frame else {
        panic!("expected a cluster event");
    };
    assert_eq!(received.reason, "Ours");
}
