use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::actor::{
    BreakpointActorProxy, ObjectGripActorProxy, PauseActorProxy, SourceActorProxy,
    ThreadActorProxy,
};
use crate::error::{RdpError, Result};
use crate::protocol::{self, Request};

/// Receiving end of the requests a [`Connection`] sends.
pub type OutboundRequests = mpsc::UnboundedReceiver<Request>;

/// Contract shared by every actor proxy: interpret a routed packet against the
/// proxy's own pending requests and state.
pub trait ActorProxy: Send + Sync {
    fn name(&self) -> &str;

    /// Handle one packet whose `from` is this actor. Never fails: packets that
    /// match no known shape are logged.
    fn receive_message(&self, message: &Value);

    /// The connection was torn down; reject everything still pending.
    fn connection_closed(&self);
}

/// Registry entry: one variant per proxy kind.
#[derive(Clone)]
pub enum Actor {
    Thread(Arc<ThreadActorProxy>),
    Pause(Arc<PauseActorProxy>),
    Source(Arc<SourceActorProxy>),
    Breakpoint(Arc<BreakpointActorProxy>),
    ObjectGrip(Arc<ObjectGripActorProxy>),
}

impl Actor {
    pub fn proxy(&self) -> &dyn ActorProxy {
        match self {
            Actor::Thread(p) => p.as_ref(),
            Actor::Pause(p) => p.as_ref(),
            Actor::Source(p) => p.as_ref(),
            Actor::Breakpoint(p) => p.as_ref(),
            Actor::ObjectGrip(p) => p.as_ref(),
        }
    }

    pub fn name(&self) -> &str {
        self.proxy().name()
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Actor::Thread(_) => ThreadActorProxy::KIND,
            Actor::Pause(_) => PauseActorProxy::KIND,
            Actor::Source(_) => SourceActorProxy::KIND,
            Actor::Breakpoint(_) => BreakpointActorProxy::KIND,
            Actor::ObjectGrip(_) => ObjectGripActorProxy::KIND,
        }
    }

    fn same_as<P: ActorKind>(&self, proxy: &P) -> bool {
        P::from_actor(self).is_some_and(|registered| std::ptr::eq(Arc::as_ptr(&registered), proxy))
    }
}

/// Typed access to the [`Actor`] variants.
pub trait ActorKind: ActorProxy + Sized + 'static {
    const KIND: &'static str;

    fn into_actor(self: Arc<Self>) -> Actor;
    fn from_actor(actor: &Actor) -> Option<Arc<Self>>;
}

struct Inner {
    actors: Mutex<HashMap<String, Actor>>,
    outbound: mpsc::UnboundedSender<Request>,
    closed: AtomicBool,
}

/// Routes packets between one duplex channel and the actor proxies sharing it.
///
/// Every registered proxy holds a clone of the connection; [`Connection::close`]
/// drains the registry, which releases those proxies.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    pub fn new() -> (Self, OutboundRequests) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let connection = Self {
            inner: Arc::new(Inner {
                actors: Mutex::new(HashMap::new()),
                outbound,
                closed: AtomicBool::new(false),
            }),
        };
        (connection, rx)
    }

    pub fn register<P: ActorKind>(&self, proxy: Arc<P>) {
        let name = proxy.name().to_string();
        let previous = self.inner.actors.lock().insert(name.clone(), proxy.into_actor());
        if let Some(previous) = previous {
            tracing::warn!(
                target: "rdp.connection",
                actor = %name,
                replaced = previous.kind(),
                "actor registered twice; replacing the previous proxy"
            );
        }
    }

    /// Remove `proxy` from the routing table, unless another proxy has since
    /// been registered under the same name.
    pub fn unregister<P: ActorKind>(&self, proxy: &P) -> bool {
        let mut actors = self.inner.actors.lock();
        match actors.get(proxy.name()) {
            Some(actor) if actor.same_as(proxy) => {
                actors.remove(proxy.name());
                true
            }
            _ => false,
        }
    }

    /// Return the proxy registered under `name`, or build and register one.
    ///
    /// The factory runs under the registry lock and must not call back into
    /// the connection.
    pub fn get_or_create<P: ActorKind>(
        &self,
        name: &str,
        factory: impl FnOnce() -> Arc<P>,
    ) -> Result<Arc<P>> {
        let mut actors = self.inner.actors.lock();
        if let Some(actor) = actors.get(name) {
            return P::from_actor(actor).ok_or_else(|| RdpError::ActorKindMismatch {
                actor: name.to_string(),
                expected: P::KIND,
            });
        }

        let proxy = factory();
        actors.insert(name.to_string(), proxy.clone().into_actor());
        Ok(proxy)
    }

    pub fn lookup<P: ActorKind>(&self, name: &str) -> Option<Arc<P>> {
        self.inner.actors.lock().get(name).and_then(P::from_actor)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.actors.lock().contains_key(name)
    }

    pub fn actor_count(&self) -> usize {
        self.inner.actors.lock().len()
    }

    /// Queue `request` for the transport. Correlating the reply is the sending
    /// actor's job.
    pub fn send_request(&self, request: Request) -> Result<()> {
        if self.is_closed() {
            return Err(RdpError::ConnectionClosed);
        }
        tracing::debug!(
            target: "rdp.connection",
            to = %request.to,
            kind = %request.kind,
            "sending request"
        );
        self.inner
            .outbound
            .send(request)
            .map_err(|_| RdpError::ConnectionClosed)
    }

    /// Route one inbound packet to the proxy named by its `from` field.
    pub fn dispatch(&self, message: Value) {
        let Some(from) = protocol::message_from(&message) else {
            tracing::warn!(
                target: "rdp.connection",
                %message,
                "dropping packet without a source actor"
            );
            return;
        };

        // Clone out of the registry so the proxy may register or unregister
        // actors while it handles the packet.
        let actor = self.inner.actors.lock().get(from).cloned();
        match actor {
            Some(actor) => actor.proxy().receive_message(&message),
            None if protocol::is_bare_reply(&message) => {
                tracing::debug!(
                    target: "rdp.connection",
                    actor = %from,
                    "acknowledgement for an unregistered actor"
                );
            }
            None => {
                tracing::warn!(
                    target: "rdp.connection",
                    actor = %from,
                    %message,
                    "no proxy registered for actor; dropping packet"
                );
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Tear the session down: drop every proxy and reject whatever they still
    /// have pending.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let actors: Vec<Actor> = self.inner.actors.lock().drain().map(|(_, a)| a).collect();
        tracing::debug!(
            target: "rdp.connection",
            actors = actors.len(),
            "connection closed"
        );
        for actor in actors {
            actor.proxy().connection_closed();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use serde_json::json;

    use super::*;
    use crate::actor::PauseActorProxy;

    #[test]
    fn get_or_create_runs_factory_once_per_actor() {
        let (connection, _outbound) = Connection::new();
        let calls = AtomicUsize::new(0);

        let make = || {
            calls.fetch_add(1, Ordering::SeqCst);
            PauseActorProxy::new("pause1")
        };
        let first = connection.get_or_create("pause1", make).unwrap();
        let second = connection
            .get_or_create("pause1", || {
                calls.fetch_add(1, Ordering::SeqCst);
                PauseActorProxy::new("pause1")
            })
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(connection.actor_count(), 1);
    }

    #[test]
    fn get_or_create_rejects_a_different_kind() {
        let (connection, _outbound) = Connection::new();
        connection.register(PauseActorProxy::new("a1"));

        let result =
            connection.get_or_create("a1", || ObjectGripActorProxy::new("a1", connection.clone()));
        assert_eq!(
            result.err(),
            Some(RdpError::ActorKindMismatch {
                actor: "a1".to_string(),
                expected: ObjectGripActorProxy::KIND,
            })
        );
    }

    #[test]
    fn unregister_only_removes_the_same_proxy() {
        let (connection, _outbound) = Connection::new();
        let stale = PauseActorProxy::new("p");
        let fresh = PauseActorProxy::new("p");
        connection.register(fresh.clone());

        assert!(!connection.unregister(stale.as_ref()));
        assert!(connection.contains("p"));
        assert!(connection.unregister(fresh.as_ref()));
        assert!(!connection.contains("p"));
    }

    #[test]
    fn unroutable_packets_are_dropped() {
        let (connection, _outbound) = Connection::new();
        connection.dispatch(json!({ "type": "newGlobal" }));
        connection.dispatch(json!({ "from": "nobody", "type": "paused" }));
        connection.dispatch(json!({ "from": "nobody" }));
        assert_eq!(connection.actor_count(), 0);
    }

    #[tokio::test]
    async fn requests_after_close_fail() {
        let (connection, mut outbound) = Connection::new();
        connection
            .send_request(Request::new("root", "listTabs"))
            .unwrap();
        assert_eq!(outbound.recv().await.unwrap().kind, "listTabs");

        connection.register(PauseActorProxy::new("p"));
        connection.close();
        assert!(connection.is_closed());
        assert_eq!(connection.actor_count(), 0);
        assert_eq!(
            connection.send_request(Request::new("root", "listTabs")),
            Err(RdpError::ConnectionClosed)
        );
    }
}
