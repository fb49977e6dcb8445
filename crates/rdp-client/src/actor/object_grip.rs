use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::connection::{ActorProxy, Connection};
use crate::error::{RdpError, Result};
use crate::pending::{settle, PendingRequests, RequestOrder};
use crate::protocol::{self, PrototypeAndProperties, Request};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestKind {
    PrototypeAndProperties,
    ThreadGrip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifetime {
    Pause,
    Extending,
    Thread,
}

struct GripState {
    ref_count: usize,
    lifetime: Lifetime,
    /// Set once the remote handle was released or invalidated.
    gone: bool,
    pending_properties: PendingRequests<PrototypeAndProperties>,
    pending_thread_grip: PendingRequests<()>,
    order: RequestOrder<RequestKind>,
}

impl GripState {
    fn reject_all(&mut self, err: RdpError) {
        self.pending_properties.reject_all(err.clone());
        self.pending_thread_grip.reject_all(err);
        self.order.clear();
    }
}

/// Reference-counted proxy for one remote object.
///
/// The remote handle is released exactly when the count drops back to zero.
/// After that the proxy is unregistered and every request on it fails with
/// [`RdpError::Released`]; a later grip for the same actor gets a fresh proxy.
pub struct ObjectGripActorProxy {
    name: String,
    connection: Connection,
    state: Mutex<GripState>,
}

impl ObjectGripActorProxy {
    pub fn new(name: impl Into<String>, connection: Connection) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            connection,
            state: Mutex::new(GripState {
                ref_count: 0,
                lifetime: Lifetime::Pause,
                gone: false,
                pending_properties: PendingRequests::default(),
                pending_thread_grip: PendingRequests::default(),
                order: RequestOrder::default(),
            }),
        })
    }

    pub fn ref_count(&self) -> usize {
        self.state.lock().ref_count
    }

    /// Whether the handle was promoted to thread lifetime.
    pub fn is_thread_lifetime(&self) -> bool {
        self.state.lock().lifetime == Lifetime::Thread
    }

    pub fn increase_ref_count(&self) {
        let mut state = self.state.lock();
        if state.gone {
            tracing::warn!(target: "rdp.grip", actor = %self.name, "reference taken on a released grip");
        }
        state.ref_count += 1;
    }

    /// Drop one reference, releasing the remote handle on the last one.
    pub fn decrease_ref_count(&self) {
        {
            let mut state = self.state.lock();
            if state.ref_count == 0 {
                tracing::warn!(target: "rdp.grip", actor = %self.name, "reference count underflow");
                return;
            }
            state.ref_count -= 1;
            if state.ref_count > 0 {
                return;
            }
            state.gone = true;
            state.reject_all(RdpError::Released {
                actor: self.name.clone(),
            });
        }

        tracing::debug!(target: "rdp.grip", actor = %self.name, "releasing object grip");
        if let Err(err) = self
            .connection
            .send_request(Request::new(&self.name, "release"))
        {
            tracing::debug!(target: "rdp.grip", actor = %self.name, %err, "release not sent");
        }
        self.connection.unregister(self);
    }

    /// Forget the remote handle without releasing it, for when the debuggee
    /// has already dropped it (the owning thread exited or detached).
    pub fn invalidate(&self) {
        {
            let mut state = self.state.lock();
            state.ref_count = 0;
            state.gone = true;
            state.reject_all(RdpError::Exited);
        }
        tracing::debug!(target: "rdp.grip", actor = %self.name, "object grip invalidated");
        self.connection.unregister(self);
    }

    pub fn fetch_prototype_and_properties(
        &self,
    ) -> impl Future<Output = Result<PrototypeAndProperties>> + Send + 'static {
        let sent = {
            let mut state = self.state.lock();
            if state.gone {
                Err(RdpError::Released {
                    actor: self.name.clone(),
                })
            } else {
                self.connection
                    .send_request(Request::new(&self.name, "prototypeAndProperties"))
                    .map(|()| {
                        state.order.push(RequestKind::PrototypeAndProperties);
                        state.pending_properties.enqueue()
                    })
            }
        };
        async move { settle(sent?).await }
    }

    /// Promote the handle to thread lifetime so it survives resuming. Only the
    /// first call sends `threadGrip`; later calls share its outcome.
    pub fn extend_lifetime(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        enum Step {
            Done,
            Wait(tokio::sync::oneshot::Receiver<Result<()>>),
            Fail(RdpError),
        }

        let step = {
            let mut state = self.state.lock();
            if state.gone {
                Step::Fail(RdpError::Released {
                    actor: self.name.clone(),
                })
            } else {
                let lifetime = state.lifetime;
                match lifetime {
                    Lifetime::Thread => Step::Done,
                    Lifetime::Extending => Step::Wait(state.pending_thread_grip.enqueue()),
                    Lifetime::Pause => match self
                        .connection
                        .send_request(Request::new(&self.name, "threadGrip"))
                    {
                        Ok(()) => {
                            state.lifetime = Lifetime::Extending;
                            state.order.push(RequestKind::ThreadGrip);
                            Step::Wait(state.pending_thread_grip.enqueue())
                        }
                        Err(err) => Step::Fail(err),
                    },
                }
            }
        };

        async move {
            match step {
                Step::Done => Ok(()),
                Step::Wait(rx) => settle(rx).await,
                Step::Fail(err) => Err(err),
            }
        }
    }

    fn handle_thread_grip_ack(&self) -> bool {
        let mut state = self.state.lock();
        if state.lifetime != Lifetime::Extending {
            return false;
        }
        state.lifetime = Lifetime::Thread;
        state.order.remove_first(RequestKind::ThreadGrip);
        state.pending_thread_grip.resolve_all(());
        true
    }
}

impl fmt::Debug for ObjectGripActorProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectGripActorProxy")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl ActorProxy for ObjectGripActorProxy {
    fn name(&self) -> &str {
        &self.name
    }

    fn receive_message(&self, message: &Value) {
        if protocol::has_field(message, "prototype") {
            let parsed = serde_json::from_value::<PrototypeAndProperties>(message.clone());
            let mut state = self.state.lock();
            state.order.remove_first(RequestKind::PrototypeAndProperties);
            let answered = match parsed {
                Ok(properties) => state.pending_properties.resolve_one(properties),
                Err(err) => state.pending_properties.reject_one(RdpError::Protocol(format!(
                    "malformed prototypeAndProperties reply: {err}"
                ))),
            };
            if !answered {
                tracing::warn!(target: "rdp.grip", actor = %self.name, "prototypeAndProperties reply without a pending request");
            }
        } else if let Some((error, text)) = protocol::message_error(message) {
            let mut state = self.state.lock();
            if error == "noSuchActor" {
                tracing::error!(target: "rdp.grip", actor = %self.name, "no such actor");
                if state.lifetime == Lifetime::Extending {
                    state.lifetime = Lifetime::Pause;
                }
                state.reject_all(RdpError::NoSuchActor {
                    actor: self.name.clone(),
                });
                return;
            }
            match state.order.pop_oldest() {
                Some(RequestKind::PrototypeAndProperties) => {
                    state
                        .pending_properties
                        .reject_one(RdpError::remote(error, text));
                }
                Some(RequestKind::ThreadGrip) => {
                    state.lifetime = Lifetime::Pause;
                    state.pending_thread_grip.reject_all(RdpError::remote(error, text));
                }
                None => {
                    tracing::warn!(target: "rdp.grip", actor = %self.name, error, "error without an outstanding request");
                }
            }
        } else if protocol::is_bare_reply(message) {
            if !self.handle_thread_grip_ack() {
                tracing::debug!(target: "rdp.grip", actor = %self.name, "unsolicited acknowledgement");
            }
        } else {
            tracing::warn!(
                target: "rdp.grip",
                actor = %self.name,
                %message,
                "unknown message from object grip actor"
            );
        }
    }

    fn connection_closed(&self) {
        let mut state = self.state.lock();
        state.gone = true;
        state.reject_all(RdpError::ConnectionClosed);
    }
}
