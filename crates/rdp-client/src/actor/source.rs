use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::actor::BreakpointActorProxy;
use crate::connection::{ActorProxy, Connection};
use crate::error::{RdpError, Result};
use crate::pending::{settle, PendingRequests, RequestOrder};
use crate::protocol::{
    self, BreakpointLocation, Grip, Request, SetBreakpointReply, SourceDescriptor, SourceLocation,
};

/// Outcome of a `setBreakpoint` request.
#[derive(Debug, Clone)]
pub struct SetBreakpointResult {
    pub breakpoint_actor: Arc<BreakpointActorProxy>,
    /// Where the debuggee actually put the breakpoint, when it moved it.
    pub actual_location: Option<SourceLocation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestKind {
    SetBreakpoint,
    FetchSource,
    Blackbox,
}

#[derive(Default)]
struct SourceState {
    pending_breakpoints: PendingRequests<SetBreakpointResult>,
    pending_fetches: PendingRequests<Grip>,
    pending_blackbox: PendingRequests<()>,
    order: RequestOrder<RequestKind>,
}

impl SourceState {
    fn reject_all(&mut self, err: RdpError) {
        self.pending_breakpoints.reject_all(err.clone());
        self.pending_fetches.reject_all(err.clone());
        self.pending_blackbox.reject_all(err);
        self.order.clear();
    }
}

/// Proxy for one source known to the debuggee.
pub struct SourceActorProxy {
    name: String,
    connection: Connection,
    descriptor: Mutex<SourceDescriptor>,
    state: Mutex<SourceState>,
}

impl SourceActorProxy {
    pub fn new(descriptor: SourceDescriptor, connection: Connection) -> Arc<Self> {
        Arc::new(Self {
            name: descriptor.actor.clone(),
            connection,
            descriptor: Mutex::new(descriptor),
            state: Mutex::new(SourceState::default()),
        })
    }

    /// Snapshot of the descriptor, including the locally cached blackbox flag.
    pub fn source(&self) -> SourceDescriptor {
        self.descriptor.lock().clone()
    }

    pub fn url(&self) -> Option<String> {
        self.descriptor.lock().url.clone()
    }

    pub fn is_blackboxed(&self) -> bool {
        self.descriptor.lock().is_black_boxed
    }

    fn request<T>(
        &self,
        kind: RequestKind,
        request: Request,
        queue: impl FnOnce(&mut SourceState) -> &mut PendingRequests<T>,
    ) -> impl Future<Output = Result<T>> + Send + 'static
    where
        T: Send + 'static,
    {
        let sent = {
            let mut state = self.state.lock();
            self.connection.send_request(request).map(|()| {
                state.order.push(kind);
                queue(&mut state).enqueue()
            })
        };
        async move { settle(sent?).await }
    }

    pub fn set_breakpoint(
        &self,
        location: BreakpointLocation,
        condition: Option<&str>,
    ) -> impl Future<Output = Result<SetBreakpointResult>> + Send + 'static {
        tracing::debug!(
            target: "rdp.source",
            url = self.url().as_deref().unwrap_or_default(),
            line = location.line,
            column = ?location.column,
            "setting breakpoint"
        );

        let mut location_value = serde_json::Map::new();
        location_value.insert("line".into(), location.line.into());
        if let Some(column) = location.column {
            location_value.insert("column".into(), column.into());
        }
        let mut request =
            Request::new(self.name(), "setBreakpoint").with("location", Value::Object(location_value));
        if let Some(condition) = condition {
            request = request.with("condition", Value::String(condition.to_string()));
        }

        self.request(RequestKind::SetBreakpoint, request, |state| {
            &mut state.pending_breakpoints
        })
    }

    /// Fetch the source text. The debuggee answers with a grip, usually a
    /// plain string or a long string.
    pub fn fetch_source(&self) -> impl Future<Output = Result<Grip>> + Send + 'static {
        tracing::debug!(target: "rdp.source", actor = %self.name(), "fetching source");
        self.request(
            RequestKind::FetchSource,
            Request::new(self.name(), "source"),
            |state| &mut state.pending_fetches,
        )
    }

    /// Toggle blackboxing. The cached flag changes before the debuggee
    /// acknowledges.
    pub fn set_blackbox(&self, blackbox: bool) -> impl Future<Output = Result<()>> + Send + 'static {
        self.descriptor.lock().is_black_boxed = blackbox;
        let kind = if blackbox { "blackbox" } else { "unblackbox" };
        tracing::debug!(target: "rdp.source", actor = %self.name(), blackbox, "setting blackbox");
        self.request(
            RequestKind::Blackbox,
            Request::new(self.name(), kind),
            |state| &mut state.pending_blackbox,
        )
    }

    /// Stop routing packets to this proxy.
    pub fn dispose(&self) {
        self.connection.unregister(self);
    }

    fn handle_breakpoint_reply(&self, message: &Value) {
        let result = serde_json::from_value::<SetBreakpointReply>(message.clone())
            .map_err(|err| RdpError::Protocol(format!("malformed setBreakpoint reply: {err}")))
            .and_then(|reply| {
                tracing::debug!(
                    target: "rdp.source",
                    actor = %self.name(),
                    breakpoint = %reply.actor,
                    pending = reply.is_pending,
                    "breakpoint set"
                );
                let connection = self.connection.clone();
                let breakpoint_name = reply.actor.clone();
                let breakpoint_actor = self.connection.get_or_create(&reply.actor, move || {
                    BreakpointActorProxy::new(breakpoint_name, connection)
                })?;
                Ok(SetBreakpointResult {
                    breakpoint_actor,
                    actual_location: reply.actual_location,
                })
            });

        let mut state = self.state.lock();
        state.order.remove_first(RequestKind::SetBreakpoint);
        let answered = match result {
            Ok(result) => state.pending_breakpoints.resolve_one(result),
            Err(err) => state.pending_breakpoints.reject_one(err),
        };
        if !answered {
            tracing::warn!(target: "rdp.source", actor = %self.name(), "setBreakpoint reply without a pending request");
        }
    }
}

impl fmt::Debug for SourceActorProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceActorProxy")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl ActorProxy for SourceActorProxy {
    fn name(&self) -> &str {
        &self.name
    }

    fn receive_message(&self, message: &Value) {
        if protocol::has_field(message, "isPending") {
            self.handle_breakpoint_reply(message);
        } else if let Some(source) = message.get("source") {
            tracing::debug!(target: "rdp.source", actor = %self.name(), "source fetched");
            let grip = Grip::from_value(source.clone());
            let mut state = self.state.lock();
            state.order.remove_first(RequestKind::FetchSource);
            if !state.pending_fetches.resolve_one(grip) {
                tracing::warn!(target: "rdp.source", actor = %self.name(), "source reply without a pending request");
            }
        } else if let Some((error, text)) = protocol::message_error(message) {
            let mut state = self.state.lock();
            if error == "noSuchActor" {
                tracing::error!(target: "rdp.source", actor = %self.name(), "no such actor");
                state.reject_all(RdpError::NoSuchActor {
                    actor: self.name().to_string(),
                });
                return;
            }
            match state.order.pop_oldest() {
                Some(RequestKind::SetBreakpoint) => {
                    state.pending_breakpoints.reject_one(RdpError::remote(error, text));
                }
                Some(RequestKind::FetchSource) => {
                    state.pending_fetches.reject_one(RdpError::remote(error, text));
                }
                Some(RequestKind::Blackbox) => {
                    state.pending_blackbox.reject_one(RdpError::remote(error, text));
                }
                None => {
                    tracing::warn!(target: "rdp.source", actor = %self.name(), error, "error without an outstanding request");
                }
            }
        } else {
            let fields = protocol::field_count(message);
            if fields == 1 || (fields == 2 && protocol::has_field(message, "pausedInSource")) {
                tracing::debug!(target: "rdp.source", actor = %self.name(), "blackbox acknowledged");
                let mut state = self.state.lock();
                state.order.remove_first(RequestKind::Blackbox);
                if !state.pending_blackbox.resolve_one(()) {
                    tracing::debug!(target: "rdp.source", actor = %self.name(), "unsolicited acknowledgement");
                }
            } else {
                tracing::warn!(
                    target: "rdp.source",
                    actor = %self.name(),
                    %message,
                    "unknown message from source actor"
                );
            }
        }
    }

    fn connection_closed(&self) {
        self.state.lock().reject_all(RdpError::ConnectionClosed);
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::mock::MockPeer;

    fn source(peer: &MockPeer) -> Arc<SourceActorProxy> {
        let descriptor: SourceDescriptor = serde_json::from_value(json!({
            "actor": "source1",
            "url": "file:///app/main.js",
            "isBlackBoxed": false
        }))
        .unwrap();
        let source = SourceActorProxy::new(descriptor, peer.connection().clone());
        peer.connection().register(source.clone());
        source
    }

    #[tokio::test]
    async fn set_breakpoint_reports_the_adjusted_location() {
        let mut peer = MockPeer::new();
        let source = source(&peer);

        let result = source.set_breakpoint(BreakpointLocation::line(10), Some("x > 1"));
        let request = peer.expect_request("source1", "setBreakpoint");
        assert_eq!(request.arg("location"), Some(&json!({ "line": 10 })));
        assert_eq!(request.arg("condition"), Some(&json!("x > 1")));

        peer.deliver(json!({
            "from": "source1",
            "actor": "breakpoint1",
            "isPending": false,
            "actualLocation": { "line": 12, "column": 4 }
        }));

        let result = result.await.unwrap();
        assert_eq!(result.breakpoint_actor.name(), "breakpoint1");
        let actual = result.actual_location.unwrap();
        assert_eq!((actual.line, actual.column), (12, Some(4)));
    }

    #[tokio::test]
    async fn set_breakpoint_reuses_the_breakpoint_proxy() {
        let mut peer = MockPeer::new();
        let source = source(&peer);

        let first = source.set_breakpoint(BreakpointLocation::line(10), None);
        let second = source.set_breakpoint(BreakpointLocation { line: 11, column: Some(0) }, None);
        assert_eq!(peer.drain_requests().len(), 2);
        for _ in 0..2 {
            peer.deliver(json!({ "from": "source1", "actor": "breakpoint1", "isPending": false }));
        }

        let first = first.await.unwrap();
        let second = second.await.unwrap();
        assert!(Arc::ptr_eq(&first.breakpoint_actor, &second.breakpoint_actor));
        assert!(first.actual_location.is_none());
    }

    #[tokio::test]
    async fn blackbox_flag_changes_before_the_acknowledgement() {
        let mut peer = MockPeer::new();
        let source = source(&peer);

        let ack = source.set_blackbox(true);
        assert!(source.is_blackboxed());
        assert!(source.source().is_black_boxed);
        peer.expect_request("source1", "blackbox");

        peer.deliver(json!({ "from": "source1", "pausedInSource": false }));
        ack.await.unwrap();

        let ack = source.set_blackbox(false);
        peer.expect_request("source1", "unblackbox");
        peer.deliver(json!({ "from": "source1" }));
        ack.await.unwrap();
        assert!(!source.is_blackboxed());
    }

    #[tokio::test]
    async fn fetch_source_resolves_with_the_grip() {
        let mut peer = MockPeer::new();
        let source = source(&peer);

        let text = source.fetch_source();
        peer.expect_request("source1", "source");
        peer.deliver(json!({ "from": "source1", "source": "let x = 1;" }));
        assert_eq!(text.await.unwrap(), Grip::String("let x = 1;".into()));
    }

    #[tokio::test]
    async fn no_such_actor_rejects_everything_pending() {
        let mut peer = MockPeer::new();
        let source = source(&peer);

        let text = source.fetch_source();
        let breakpoint = source.set_breakpoint(BreakpointLocation::line(3), None);
        peer.drain_requests();
        peer.deliver(json!({ "from": "source1", "error": "noSuchActor" }));

        let expected = RdpError::NoSuchActor {
            actor: "source1".into(),
        };
        assert_eq!(text.await.unwrap_err(), expected);
        assert_eq!(breakpoint.await.err(), Some(expected));
    }

    #[tokio::test]
    async fn dispose_unregisters_the_source() {
        let peer = MockPeer::new();
        let source = source(&peer);
        assert_eq!(source.url().as_deref(), Some("file:///app/main.js"));

        source.dispose();
        assert!(!peer.connection().contains("source1"));
    }
}
