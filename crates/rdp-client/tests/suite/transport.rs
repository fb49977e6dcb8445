use rdp_client::{RdpError, SourceActorProxy, ThreadActorProxy};
use serde_json::json;

use super::harness::{connect, stopped};

#[tokio::test]
async fn requests_and_replies_cross_the_stream() {
    let (connection, handle, mut debuggee) = connect();

    let attach = tokio::spawn(ThreadActorProxy::create_and_attach(
        "server1.conn0.thread1",
        connection.clone(),
    ));
    debuggee.expect("server1.conn0.thread1", "attach").await;
    debuggee
        .send(json!({
            "from": "server1.conn0.thread1",
            "type": "paused",
            "actor": "server1.conn0.pause1",
            "why": { "type": "attached" }
        }))
        .await;
    let thread = attach.await.unwrap().unwrap();
    assert!(thread.is_known_paused());

    let sources = thread.fetch_sources();
    debuggee.expect("server1.conn0.thread1", "sources").await;
    debuggee
        .send(json!({
            "from": "server1.conn0.thread1",
            "sources": [
                { "actor": "server1.conn0.source1", "url": "file:///a.js", "isBlackBoxed": false },
                { "actor": "server1.conn0.source2", "url": "file:///b.js", "isBlackBoxed": true }
            ]
        }))
        .await;
    let sources = sources.await.unwrap();
    assert_eq!(sources.len(), 2);
    assert!(sources[1].is_blackboxed());
    assert!(connection
        .lookup::<SourceActorProxy>("server1.conn0.source1")
        .is_some());

    handle.shutdown();
    stopped(&handle).await;
    assert!(connection.is_closed());
}

#[tokio::test]
async fn eof_rejects_every_pending_request() {
    let (connection, handle, mut debuggee) = connect();
    let thread = ThreadActorProxy::new("thread1", connection.clone());
    connection.register(thread.clone());

    let frames = thread.fetch_stack_frames();
    let interrupt = thread.interrupt();
    debuggee.expect("thread1", "frames").await;
    debuggee.expect("thread1", "interrupt").await;
    drop(debuggee);

    assert_eq!(frames.await, Err(RdpError::ConnectionClosed));
    assert_eq!(interrupt.await.err(), Some(RdpError::ConnectionClosed));
    stopped(&handle).await;
    assert_eq!(connection.actor_count(), 0);
    assert_eq!(thread.resume(), Err(RdpError::ConnectionClosed));
}

#[tokio::test]
async fn bulk_packets_close_the_connection() {
    let (connection, handle, mut debuggee) = connect();
    let thread = ThreadActorProxy::new("thread1", connection.clone());
    connection.register(thread.clone());

    let frames = thread.fetch_stack_frames();
    debuggee.expect("thread1", "frames").await;
    debuggee.send_raw(b"bulk thread1 frames 4:abcd").await;

    assert_eq!(frames.await, Err(RdpError::ConnectionClosed));
    stopped(&handle).await;
    assert!(connection.is_closed());
}

#[tokio::test]
async fn frames_split_across_writes_are_reassembled() {
    let (connection, handle, mut debuggee) = connect();
    let thread = ThreadActorProxy::new("thread1", connection.clone());
    connection.register(thread.clone());

    let frames = thread.fetch_stack_frames();
    debuggee.expect("thread1", "frames").await;
    let frame = rdp_client::codec::encode_frame(&json!({
        "from": "thread1",
        "frames": [{ "actor": "frame1", "type": "call", "where": { "line": 3, "column": 1 } }]
    }))
    .unwrap();
    let (head, tail) = frame.split_at(frame.len() / 2);
    debuggee.send_raw(head).await;
    tokio::task::yield_now().await;
    debuggee.send_raw(tail).await;

    let frames = frames.await.unwrap();
    assert_eq!(frames[0].location.as_ref().map(|l| l.line), Some(3));

    handle.shutdown();
    handle.join().await;
}
