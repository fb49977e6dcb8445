use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::oneshot;

use crate::actor::{PauseActorProxy, SourceActorProxy};
use crate::connection::{ActorProxy, Connection};
use crate::error::{RdpError, Result};
use crate::events::EventListeners;
use crate::pending::{settle, PendingRequests, RequestOrder};
use crate::protocol::{self, Frame, PauseReason, Request, SourceDescriptor};

/// Last execution state this client observed for the thread.
///
/// This is a local projection of remote state: it only changes on packets this
/// client sees and on its own resume requests, so it can go stale if the
/// debuggee changes state without telling us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Detached,
    Running,
    Paused,
    Exited,
}

/// Step granularity for a resume request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeLimit {
    /// Step over.
    Next,
    /// Step into.
    Step,
    /// Step out.
    Finish,
}

impl ResumeLimit {
    fn as_str(self) -> &'static str {
        match self {
            ResumeLimit::Next => "next",
            ResumeLimit::Step => "step",
            ResumeLimit::Finish => "finish",
        }
    }
}

#[derive(Clone)]
pub enum ThreadEvent {
    Paused { why: Option<PauseReason> },
    Exited,
    WrongState,
    Detached,
    NewSource(Arc<SourceActorProxy>),
}

impl fmt::Debug for ThreadEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadEvent::Paused { why } => f.debug_struct("Paused").field("why", why).finish(),
            ThreadEvent::Exited => f.write_str("Exited"),
            ThreadEvent::WrongState => f.write_str("WrongState"),
            ThreadEvent::Detached => f.write_str("Detached"),
            ThreadEvent::NewSource(source) => {
                f.debug_tuple("NewSource").field(&source.name()).finish()
            }
        }
    }
}

/// Resume callback handed to a `run_on_paused_thread` action.
///
/// Dropping it leaves the thread paused.
pub struct ResumeHandle {
    resume: Option<Box<dyn FnOnce() + Send>>,
}

impl ResumeHandle {
    fn noop() -> Self {
        Self { resume: None }
    }

    fn new(resume: impl FnOnce() + Send + 'static) -> Self {
        Self {
            resume: Some(Box::new(resume)),
        }
    }

    /// Whether calling [`ResumeHandle::resume`] sends anything. `false` when
    /// the thread was already paused before the action ran.
    pub fn will_resume(&self) -> bool {
        self.resume.is_some()
    }

    pub fn resume(mut self) {
        if let Some(resume) = self.resume.take() {
            resume();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestKind {
    Pause,
    Detach,
    Sources,
    Frames,
    Resume,
}

struct ThreadState {
    execution: ExecutionState,
    current_pause: Option<Arc<PauseActorProxy>>,
    pending_pause: PendingRequests<Arc<PauseActorProxy>>,
    pending_detach: PendingRequests<()>,
    pending_sources: PendingRequests<Vec<Arc<SourceActorProxy>>>,
    pending_frames: PendingRequests<Vec<Frame>>,
    order: RequestOrder<RequestKind>,
}

impl ThreadState {
    fn reject_oldest(&mut self, kind: RequestKind, err: RdpError) {
        match kind {
            RequestKind::Pause => {
                self.pending_pause.reject_one(err);
            }
            RequestKind::Detach => {
                self.pending_detach.reject_one(err);
            }
            RequestKind::Sources => {
                self.pending_sources.reject_one(err);
            }
            RequestKind::Frames => {
                self.pending_frames.reject_one(err);
            }
            RequestKind::Resume => {}
        }
    }

    fn reject_everything(&mut self, err: RdpError) {
        self.pending_pause.reject_all(err.clone());
        self.pending_detach.reject_all(err.clone());
        self.pending_sources.reject_all(err.clone());
        self.pending_frames.reject_all(err);
        self.order.clear();
    }
}

/// Proxy for one debuggee thread: execution control plus the queries that go
/// through the thread actor.
///
/// Every request method sends its packet immediately and returns a future for
/// the reply, so send order is call order.
pub struct ThreadActorProxy {
    name: String,
    connection: Connection,
    state: Mutex<ThreadState>,
    events: EventListeners<ThreadEvent>,
}

impl ThreadActorProxy {
    /// Build an unregistered proxy. Use [`ThreadActorProxy::create_and_attach`]
    /// unless the caller registers it itself.
    pub fn new(name: impl Into<String>, connection: Connection) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            connection,
            state: Mutex::new(ThreadState {
                execution: ExecutionState::Detached,
                current_pause: None,
                pending_pause: PendingRequests::default(),
                pending_detach: PendingRequests::default(),
                pending_sources: PendingRequests::default(),
                pending_frames: PendingRequests::default(),
                order: RequestOrder::default(),
            }),
            events: EventListeners::default(),
        })
    }

    /// Register a proxy for `name` and attach to the thread. The debuggee
    /// answers an attach by pausing, so this resolves once the thread is paused.
    pub async fn create_and_attach(name: &str, connection: Connection) -> Result<Arc<Self>> {
        let thread = Self::new(name, connection.clone());
        connection.register(thread.clone());
        thread.attach().await?;
        Ok(thread)
    }

    pub fn state(&self) -> ExecutionState {
        self.state.lock().execution
    }

    pub fn is_known_paused(&self) -> bool {
        self.state() == ExecutionState::Paused
    }

    /// Pause context of the current pause, if the thread is known paused.
    pub fn current_pause(&self) -> Option<Arc<PauseActorProxy>> {
        self.state.lock().current_pause.clone()
    }

    /// Send `request` and enqueue its waiter under the state lock: the reply
    /// cannot be handled before the waiter exists, and a failed send leaves
    /// nothing queued.
    fn request<T>(
        &self,
        kind: RequestKind,
        request: Request,
        queue: impl FnOnce(&mut ThreadState) -> &mut PendingRequests<T>,
    ) -> Result<oneshot::Receiver<Result<T>>> {
        let mut state = self.state.lock();
        self.connection.send_request(request)?;
        state.order.push(kind);
        Ok(queue(&mut state).enqueue())
    }

    pub fn attach(&self) -> impl Future<Output = Result<Arc<PauseActorProxy>>> + Send + 'static {
        tracing::debug!(target: "rdp.thread", actor = %self.name, "attaching");
        let rx = self.request(
            RequestKind::Pause,
            Request::new(&self.name, "attach"),
            |state| &mut state.pending_pause,
        );
        async move { settle(rx?).await }
    }

    /// Pause the thread. Resolves immediately with the current pause context,
    /// without sending anything, if the thread is already known paused.
    pub fn interrupt(
        &self,
    ) -> impl Future<Output = Result<Arc<PauseActorProxy>>> + Send + 'static {
        let current = {
            let state = self.state.lock();
            match state.execution {
                ExecutionState::Paused => state.current_pause.clone(),
                _ => None,
            }
        };

        let rx = match current {
            Some(pause) => Err(pause),
            None => Ok(self.request(
                RequestKind::Pause,
                Request::new(&self.name, "interrupt"),
                |state| &mut state.pending_pause,
            )),
        };

        async move {
            match rx {
                Err(pause) => Ok(pause),
                Ok(rx) => settle(rx?).await,
            }
        }
    }

    pub fn fetch_sources(
        &self,
    ) -> impl Future<Output = Result<Vec<Arc<SourceActorProxy>>>> + Send + 'static {
        let rx = self.request(
            RequestKind::Sources,
            Request::new(&self.name, "sources"),
            |state| &mut state.pending_sources,
        );
        async move { settle(rx?).await }
    }

    pub fn fetch_stack_frames(&self) -> impl Future<Output = Result<Vec<Frame>>> + Send + 'static {
        let rx = self.request(
            RequestKind::Frames,
            Request::new(&self.name, "frames"),
            |state| &mut state.pending_frames,
        );
        async move { settle(rx?).await }
    }

    pub fn resume(&self) -> Result<()> {
        self.resume_with(None)
    }

    pub fn step_over(&self) -> Result<()> {
        self.resume_with(Some(ResumeLimit::Next))
    }

    pub fn step_into(&self) -> Result<()> {
        self.resume_with(Some(ResumeLimit::Step))
    }

    pub fn step_out(&self) -> Result<()> {
        self.resume_with(Some(ResumeLimit::Finish))
    }

    /// Fire-and-forget resume. The thread stops being known paused right away;
    /// if the debuggee refuses, a `wrongState` event follows.
    pub fn resume_with(&self, limit: Option<ResumeLimit>) -> Result<()> {
        let mut request = Request::new(&self.name, "resume");
        if let Some(limit) = limit {
            request = request.with("resumeLimit", json!({ "type": limit.as_str() }));
        }

        let finished_pause = {
            let mut state = self.state.lock();
            self.connection.send_request(request)?;
            if state.execution == ExecutionState::Paused {
                state.execution = ExecutionState::Running;
            }
            state.order.push(RequestKind::Resume);
            state.current_pause.take()
        };
        if let Some(pause) = finished_pause {
            self.connection.unregister(pause.as_ref());
        }
        Ok(())
    }

    /// Detach from the thread. Locally the thread is detached at once and no
    /// longer known paused; the returned future resolves on the debuggee's
    /// `detached` (or `exited`) packet. A pause arriving first rejects it with
    /// [`RdpError::Paused`].
    pub fn detach(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        tracing::debug!(target: "rdp.thread", actor = %self.name, "detaching");
        let sent = {
            let mut state = self.state.lock();
            match self.connection.send_request(Request::new(&self.name, "detach")) {
                Ok(()) => {
                    let rx = state.pending_detach.enqueue();
                    state.order.push(RequestKind::Detach);
                    if state.execution != ExecutionState::Exited {
                        state.execution = ExecutionState::Detached;
                    }
                    Ok((rx, state.current_pause.take()))
                }
                Err(err) => Err(err),
            }
        };
        let rx = sent.map(|(rx, finished_pause)| {
            if let Some(pause) = finished_pause {
                self.connection.unregister(pause.as_ref());
            }
            rx
        });
        async move { settle(rx?).await }
    }

    /// Run `action` while the thread is paused.
    ///
    /// If the thread is already known paused the action runs at once and its
    /// resume handle does nothing. Otherwise one `interrupt` is sent, the action
    /// runs once the thread has paused, and its resume handle resumes the
    /// thread. The action decides whether to resume.
    ///
    /// The resume handle resumes this proxy directly. Session code that tracks
    /// object grips should go through
    /// [`ThreadAdapter::run_on_paused_thread`](crate::adapter::ThreadAdapter::run_on_paused_thread)
    /// so pause-lifetime grips are disposed first.
    pub async fn run_on_paused_thread<T, F, Fut>(self: &Arc<Self>, action: F) -> Result<T>
    where
        F: FnOnce(ResumeHandle) -> Fut,
        Fut: Future<Output = T>,
    {
        let thread = Arc::clone(self);
        self.run_on_paused_thread_with(
            move || {
                if let Err(err) = thread.resume() {
                    tracing::warn!(target: "rdp.thread", actor = %thread.name, %err, "resume failed");
                }
            },
            action,
        )
        .await
    }

    /// Like [`ThreadActorProxy::run_on_paused_thread`] with a caller-supplied
    /// resume callback.
    pub async fn run_on_paused_thread_with<T, F, Fut>(
        &self,
        resume: impl FnOnce() + Send + 'static,
        action: F,
    ) -> Result<T>
    where
        F: FnOnce(ResumeHandle) -> Fut,
        Fut: Future<Output = T>,
    {
        if self.is_known_paused() {
            return Ok(action(ResumeHandle::noop()).await);
        }
        self.interrupt().await?;
        Ok(action(ResumeHandle::new(resume)).await)
    }

    pub fn on_event(&self, listener: impl Fn(&ThreadEvent) + Send + Sync + 'static) {
        self.events.add(listener);
    }

    pub fn on_paused(&self, listener: impl Fn(Option<&PauseReason>) + Send + Sync + 'static) {
        self.events.add(move |event| {
            if let ThreadEvent::Paused { why } = event {
                listener(why.as_ref());
            }
        });
    }

    pub fn on_exited(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.events.add(move |event| {
            if matches!(event, ThreadEvent::Exited) {
                listener();
            }
        });
    }

    pub fn on_wrong_state(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.events.add(move |event| {
            if matches!(event, ThreadEvent::WrongState) {
                listener();
            }
        });
    }

    pub fn on_detached(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.events.add(move |event| {
            if matches!(event, ThreadEvent::Detached) {
                listener();
            }
        });
    }

    pub fn on_new_source(
        &self,
        listener: impl Fn(&Arc<SourceActorProxy>) + Send + Sync + 'static,
    ) {
        self.events.add(move |event| {
            if let ThreadEvent::NewSource(source) = event {
                listener(source);
            }
        });
    }

    fn source_proxy(&self, descriptor: SourceDescriptor) -> Result<Arc<SourceActorProxy>> {
        let name = descriptor.actor.clone();
        let connection = self.connection.clone();
        self.connection
            .get_or_create(&name, move || SourceActorProxy::new(descriptor, connection))
    }

    fn handle_paused(&self, message: &Value) {
        let Some(actor) = message.get("actor").and_then(Value::as_str) else {
            tracing::warn!(target: "rdp.thread", actor = %self.name, %message, "paused packet without a pause actor");
            return;
        };
        let pause = match self
            .connection
            .get_or_create(actor, || PauseActorProxy::new(actor))
        {
            Ok(pause) => pause,
            Err(err) => {
                tracing::warn!(target: "rdp.thread", actor = %self.name, %err, "cannot track pause actor");
                return;
            }
        };
        let why = message
            .get("why")
            .cloned()
            .and_then(|why| serde_json::from_value::<PauseReason>(why).ok());

        tracing::debug!(
            target: "rdp.thread",
            actor = %self.name,
            why = why.as_ref().map(|why| why.kind.as_str()).unwrap_or("unknown"),
            "thread paused"
        );

        {
            let mut state = self.state.lock();
            state.execution = ExecutionState::Paused;
            state.current_pause = Some(pause.clone());
            state.pending_pause.resolve_all(pause);
            state.pending_detach.reject_all(RdpError::Paused);
            state.order.remove_all(RequestKind::Pause);
            state.order.remove_all(RequestKind::Detach);
        }
        self.events.emit(&ThreadEvent::Paused { why });
    }

    /// The remote thread is gone (`exited`/`detached`): detach waiters get
    /// their answer, everything else is rejected with `err`.
    fn handle_gone(&self, execution: ExecutionState, err: RdpError, event: ThreadEvent) {
        let finished_pause = {
            let mut state = self.state.lock();
            state.execution = execution;
            state.pending_pause.reject_all(err.clone());
            state.pending_detach.resolve_all(());
            state.pending_sources.reject_all(err.clone());
            state.pending_frames.reject_all(err);
            state.order.clear();
            state.current_pause.take()
        };
        if let Some(pause) = finished_pause {
            self.connection.unregister(pause.as_ref());
        }
        self.events.emit(&event);
    }

    fn handle_error(&self, error: &str, text: Option<&str>) {
        match error {
            "wrongState" => {
                tracing::debug!(target: "rdp.thread", actor = %self.name, "wrongState");
                {
                    let mut state = self.state.lock();
                    if let Some(oldest) = state.order.pop_oldest() {
                        if matches!(oldest, RequestKind::Sources | RequestKind::Frames) {
                            state.reject_oldest(oldest, RdpError::WrongState);
                        }
                    }
                    state.pending_pause.reject_all(RdpError::WrongState);
                    state.pending_detach.reject_all(RdpError::WrongState);
                    state.order.remove_all(RequestKind::Pause);
                    state.order.remove_all(RequestKind::Detach);
                }
                self.events.emit(&ThreadEvent::WrongState);
            }
            "noSuchActor" => {
                tracing::error!(target: "rdp.thread", actor = %self.name, "no such actor");
                let finished_pause = {
                    let mut state = self.state.lock();
                    state.execution = ExecutionState::Exited;
                    state.reject_everything(RdpError::NoSuchActor {
                        actor: self.name.clone(),
                    });
                    state.current_pause.take()
                };
                if let Some(pause) = finished_pause {
                    self.connection.unregister(pause.as_ref());
                }
                self.events.emit(&ThreadEvent::Exited);
            }
            _ => {
                let mut state = self.state.lock();
                match state.order.pop_oldest() {
                    Some(kind) => {
                        tracing::debug!(target: "rdp.thread", actor = %self.name, error, ?kind, "request failed");
                        state.reject_oldest(kind, RdpError::remote(error, text));
                    }
                    None => {
                        tracing::warn!(target: "rdp.thread", actor = %self.name, error, "error without an outstanding request");
                    }
                }
            }
        }
    }

    fn handle_sources(&self, message: &Value) {
        let descriptors = message
            .get("sources")
            .cloned()
            .map(serde_json::from_value::<Vec<SourceDescriptor>>);
        let sources = match descriptors {
            Some(Ok(descriptors)) => descriptors
                .into_iter()
                .map(|descriptor| self.source_proxy(descriptor))
                .collect::<Result<Vec<_>>>(),
            Some(Err(err)) => Err(RdpError::Protocol(format!("malformed sources reply: {err}"))),
            None => Err(RdpError::Protocol("sources reply without sources".into())),
        };

        let mut state = self.state.lock();
        state.order.remove_first(RequestKind::Sources);
        let answered = match sources {
            Ok(sources) => state.pending_sources.resolve_one(sources),
            Err(err) => state.pending_sources.reject_one(err),
        };
        if !answered {
            tracing::warn!(target: "rdp.thread", actor = %self.name, "sources reply without a pending request");
        }
    }

    fn handle_frames(&self, message: &Value) {
        let frames = message
            .get("frames")
            .cloned()
            .map(serde_json::from_value::<Vec<Frame>>);

        let mut state = self.state.lock();
        state.order.remove_first(RequestKind::Frames);
        let answered = match frames {
            Some(Ok(frames)) => state.pending_frames.resolve_one(frames),
            Some(Err(err)) => state
                .pending_frames
                .reject_one(RdpError::Protocol(format!("malformed frames reply: {err}"))),
            None => state
                .pending_frames
                .reject_one(RdpError::Protocol("frames reply without frames".into())),
        };
        if !answered {
            tracing::warn!(target: "rdp.thread", actor = %self.name, "frames reply without a pending request");
        }
    }
}

impl fmt::Debug for ThreadActorProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadActorProxy")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl ActorProxy for ThreadActorProxy {
    fn name(&self) -> &str {
        &self.name
    }

    fn receive_message(&self, message: &Value) {
        let kind = protocol::message_type(message);

        if kind == Some("paused") {
            self.handle_paused(message);
        } else if kind == Some("exited") {
            tracing::debug!(target: "rdp.thread", actor = %self.name, "thread exited");
            self.handle_gone(ExecutionState::Exited, RdpError::Exited, ThreadEvent::Exited);
        } else if let Some((error, text)) = protocol::message_error(message) {
            self.handle_error(error, text);
        } else if kind == Some("detached") {
            tracing::debug!(target: "rdp.thread", actor = %self.name, "thread detached");
            self.handle_gone(
                ExecutionState::Detached,
                RdpError::Detached,
                ThreadEvent::Detached,
            );
        } else if kind == Some("newSource") {
            let descriptor = message
                .get("source")
                .cloned()
                .map(serde_json::from_value::<SourceDescriptor>);
            match descriptor {
                Some(Ok(descriptor)) => match self.source_proxy(descriptor) {
                    Ok(source) => self.events.emit(&ThreadEvent::NewSource(source)),
                    Err(err) => {
                        tracing::warn!(target: "rdp.thread", actor = %self.name, %err, "cannot track new source")
                    }
                },
                _ => {
                    tracing::warn!(target: "rdp.thread", actor = %self.name, %message, "malformed newSource packet")
                }
            }
        } else if protocol::has_field(message, "sources") {
            self.handle_sources(message);
        } else if protocol::has_field(message, "frames") {
            self.handle_frames(message);
        } else if kind == Some("resumed") {
            self.state.lock().order.remove_first(RequestKind::Resume);
        } else if kind == Some("newGlobal") {
            // Benign; nothing tracks globals.
        } else {
            tracing::warn!(
                target: "rdp.thread",
                actor = %self.name,
                %message,
                "unknown message from thread actor"
            );
        }
    }

    fn connection_closed(&self) {
        let mut state = self.state.lock();
        state.current_pause = None;
        state.reject_everything(RdpError::ConnectionClosed);
    }
}
