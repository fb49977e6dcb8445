use std::sync::Arc;

use pretty_assertions::assert_eq;
use rdp_client::protocol::BreakpointLocation;
use rdp_client::{DebugSession, ExecutionState, RdpError};
use serde_json::json;

use super::harness::{connect, Debuggee};

async fn attach(session: &DebugSession, debuggee: &mut Debuggee) -> Arc<rdp_client::ThreadAdapter> {
    let (thread, ()) = tokio::join!(session.attach_thread("thread1"), async {
        debuggee.expect("thread1", "attach").await;
        debuggee
            .send(json!({
                "from": "thread1",
                "type": "paused",
                "actor": "pause1",
                "why": { "type": "attached" }
            }))
            .await;
    });
    thread.unwrap()
}

#[tokio::test]
async fn inspect_a_breakpoint_hit_and_step_over() {
    let (connection, handle, mut debuggee) = connect();
    let session = DebugSession::new(connection.clone());
    let thread = attach(&session, &mut debuggee).await;

    let source = {
        let sources = thread.actor().fetch_sources();
        debuggee.expect("thread1", "sources").await;
        debuggee
            .send(json!({ "from": "thread1", "sources": [{ "actor": "source1", "url": "file:///app.js" }] }))
            .await;
        sources.await.unwrap().remove(0)
    };

    let breakpoint = source.set_breakpoint(BreakpointLocation::line(10), None);
    let request = debuggee.expect("source1", "setBreakpoint").await;
    assert_eq!(request["location"], json!({ "line": 10 }));
    debuggee
        .send(json!({
            "from": "source1",
            "actor": "breakpoint1",
            "isPending": false,
            "actualLocation": { "line": 12 }
        }))
        .await;
    let breakpoint = breakpoint.await.unwrap();
    assert_eq!(breakpoint.actual_location.map(|l| l.line), Some(12));

    thread.resume().unwrap();
    debuggee.expect("thread1", "resume").await;
    assert_eq!(thread.actor().state(), ExecutionState::Running);

    debuggee
        .send(json!({
            "from": "thread1",
            "type": "paused",
            "actor": "pause2",
            "why": { "type": "breakpoint", "actors": ["breakpoint1"] }
        }))
        .await;

    let frames = thread.actor().fetch_stack_frames();
    debuggee.expect("thread1", "frames").await;
    debuggee
        .send(json!({
            "from": "thread1",
            "frames": [{
                "actor": "frame1",
                "type": "call",
                "where": { "line": 12, "column": 2 },
                "this": { "type": "object", "actor": "obj1", "class": "Window" }
            }]
        }))
        .await;
    let frames = frames.await.unwrap();
    assert!(thread.actor().is_known_paused());

    let this = frames[0].this.as_ref().and_then(|grip| grip.as_object()).unwrap();
    let scope = thread.create_object_grip_adapter(this, false).unwrap();
    let id = scope.variables_provider_id();

    let provider = session.variables_provider(id).unwrap();
    let (variables, ()) = tokio::join!(provider.get_variables(), async {
        debuggee.expect("obj1", "prototypeAndProperties").await;
        debuggee
            .send(json!({
                "from": "obj1",
                "prototype": { "type": "null" },
                "ownProperties": {
                    "10": { "value": "ten" },
                    "9": { "value": { "type": "undefined" } },
                    "name": { "value": { "type": "longString", "actor": "ls1", "initial": "wind", "length": 9000 } }
                }
            }))
            .await;
    });
    let rendered: Vec<(String, String)> = variables
        .unwrap()
        .iter()
        .map(|v| (v.name().to_string(), v.value().to_string()))
        .collect();
    assert_eq!(
        rendered,
        vec![
            ("9".to_string(), "undefined".to_string()),
            ("10".to_string(), "\"ten\"".to_string()),
            ("name".to_string(), "\"wind…\"".to_string()),
        ]
    );

    thread.step_over().unwrap();
    debuggee.expect("obj1", "release").await;
    let resume = debuggee.expect("thread1", "resume").await;
    assert_eq!(resume["resumeLimit"], json!({ "type": "next" }));
    assert!(session.variables_provider(id).is_none());

    handle.shutdown();
    handle.join().await;
}

#[tokio::test]
async fn wrong_state_on_interrupt_raises_one_event() {
    let (connection, handle, mut debuggee) = connect();
    let session = DebugSession::new(connection.clone());
    let thread = attach(&session, &mut debuggee).await;
    thread.resume().unwrap();
    debuggee.expect("thread1", "resume").await;

    let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel();
    thread.actor().on_wrong_state(move || {
        let _ = events_tx.send(());
    });

    let interrupt = thread.actor().interrupt();
    debuggee.expect("thread1", "interrupt").await;
    debuggee
        .send(json!({ "from": "thread1", "error": "wrongState", "message": "already paused" }))
        .await;

    assert_eq!(interrupt.await.err(), Some(RdpError::WrongState));
    assert_eq!(events_rx.recv().await, Some(()));
    assert!(events_rx.try_recv().is_err());

    handle.shutdown();
    handle.join().await;
}

#[tokio::test]
async fn detach_resolves_and_drops_the_thread() {
    let (connection, handle, mut debuggee) = connect();
    let session = DebugSession::new(connection.clone());
    let thread = attach(&session, &mut debuggee).await;
    let kept = thread
        .create_object_grip_adapter(
            &serde_json::from_value(json!({ "type": "object", "actor": "obj9", "class": "Map" })).unwrap(),
            true,
        )
        .unwrap();
    debuggee.expect("obj9", "threadGrip").await;

    let detach = thread.detach();
    debuggee.expect("thread1", "detach").await;
    debuggee.send(json!({ "from": "thread1", "type": "detached" })).await;

    detach.await.unwrap();
    assert_eq!(thread.actor().state(), ExecutionState::Detached);
    assert!(kept.is_disposed());
    assert!(session.thread("thread1").is_none());

    handle.shutdown();
    handle.join().await;
}
