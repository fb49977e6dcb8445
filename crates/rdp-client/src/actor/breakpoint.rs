use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::connection::{ActorProxy, Connection};
use crate::error::{RdpError, Result};
use crate::pending::{settle, PendingRequests};
use crate::protocol::{self, Request};

/// Proxy for a breakpoint set through a [`crate::actor::SourceActorProxy`].
pub struct BreakpointActorProxy {
    name: String,
    connection: Connection,
    pending_deletes: Mutex<PendingRequests<()>>,
}

impl BreakpointActorProxy {
    pub fn new(name: impl Into<String>, connection: Connection) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            connection,
            pending_deletes: Mutex::new(PendingRequests::default()),
        })
    }

    /// Remove the breakpoint. The proxy unregisters itself once the debuggee
    /// acknowledges.
    pub fn delete(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        tracing::debug!(target: "rdp.breakpoint", actor = %self.name, "deleting breakpoint");
        let sent = {
            let mut pending = self.pending_deletes.lock();
            self.connection
                .send_request(Request::new(&self.name, "delete"))
                .map(|()| pending.enqueue())
        };
        async move { settle(sent?).await }
    }
}

impl fmt::Debug for BreakpointActorProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreakpointActorProxy")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl ActorProxy for BreakpointActorProxy {
    fn name(&self) -> &str {
        &self.name
    }

    fn receive_message(&self, message: &Value) {
        if let Some((error, text)) = protocol::message_error(message) {
            let mut pending = self.pending_deletes.lock();
            if error == "noSuchActor" {
                tracing::error!(target: "rdp.breakpoint", actor = %self.name, "no such actor");
                pending.reject_all(RdpError::NoSuchActor {
                    actor: self.name.clone(),
                });
            } else if !pending.reject_one(RdpError::remote(error, text)) {
                tracing::warn!(target: "rdp.breakpoint", actor = %self.name, error, "error without an outstanding request");
            }
        } else if protocol::is_bare_reply(message) {
            let answered = self.pending_deletes.lock().resolve_one(());
            if answered {
                tracing::debug!(target: "rdp.breakpoint", actor = %self.name, "breakpoint deleted");
                self.connection.unregister(self);
            }
        } else {
            tracing::warn!(
                target: "rdp.breakpoint",
                actor = %self.name,
                %message,
                "unknown message from breakpoint actor"
            );
        }
    }

    fn connection_closed(&self) {
        self.pending_deletes
            .lock()
            .reject_all(RdpError::ConnectionClosed);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::mock::MockPeer;

    #[tokio::test]
    async fn delete_unregisters_on_acknowledgement() {
        let mut peer = MockPeer::new();
        let breakpoint = BreakpointActorProxy::new("bp1", peer.connection().clone());
        peer.connection().register(breakpoint.clone());

        let deleted = breakpoint.delete();
        peer.expect_request("bp1", "delete");
        assert!(peer.connection().contains("bp1"));

        peer.deliver(json!({ "from": "bp1" }));
        deleted.await.unwrap();
        assert!(!peer.connection().contains("bp1"));
    }

    #[tokio::test]
    async fn no_such_actor_rejects_pending_deletes() {
        let mut peer = MockPeer::new();
        let breakpoint = BreakpointActorProxy::new("bp1", peer.connection().clone());
        peer.connection().register(breakpoint.clone());

        let deleted = breakpoint.delete();
        peer.expect_request("bp1", "delete");
        peer.deliver(json!({ "from": "bp1", "error": "noSuchActor" }));
        assert_eq!(
            deleted.await,
            Err(RdpError::NoSuchActor {
                actor: "bp1".into()
            })
        );
    }
}
