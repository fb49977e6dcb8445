use std::future::Future;
use std::mem;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::actor::{ObjectGripActorProxy, ResumeHandle, ResumeLimit, ThreadActorProxy, ThreadEvent};
use crate::adapter::{ObjectGripAdapter, VariablesProviders};
use crate::connection::{ActorProxy, Connection};
use crate::error::Result;
use crate::protocol::ObjectGrip;

#[derive(Default)]
struct GripAdapters {
    pause_lifetime: Vec<Arc<ObjectGripAdapter>>,
    thread_lifetime: Vec<Arc<ObjectGripAdapter>>,
}

/// Session-side companion of a [`ThreadActorProxy`].
///
/// Tracks every object grip adapter created for the thread. Pause-lifetime
/// adapters are disposed before each resume. When the thread exits or
/// detaches, adapters of both lifetimes are invalidated: the debuggee has
/// dropped the objects, so no `release` is sent for them.
pub struct ThreadAdapter {
    actor: Arc<ThreadActorProxy>,
    connection: Connection,
    providers: Arc<VariablesProviders>,
    grips: Mutex<GripAdapters>,
}

impl ThreadAdapter {
    pub fn new(
        actor: Arc<ThreadActorProxy>,
        connection: Connection,
        providers: Arc<VariablesProviders>,
    ) -> Arc<Self> {
        let adapter = Arc::new(Self {
            actor,
            connection,
            providers,
            grips: Mutex::new(GripAdapters::default()),
        });

        let weak = Arc::downgrade(&adapter);
        adapter.actor.on_event(move |event| {
            if matches!(event, ThreadEvent::Exited | ThreadEvent::Detached) {
                if let Some(adapter) = weak.upgrade() {
                    adapter.invalidate_grip_adapters();
                }
            }
        });
        adapter
    }

    pub fn actor(&self) -> &Arc<ThreadActorProxy> {
        &self.actor
    }

    pub fn name(&self) -> &str {
        self.actor.name()
    }

    /// Take a new reference on the object behind `grip`.
    pub fn create_object_grip_adapter(
        self: &Arc<Self>,
        grip: &ObjectGrip,
        thread_lifetime: bool,
    ) -> Result<Arc<ObjectGripAdapter>> {
        let actor = object_grip_actor(&self.connection, grip)?;
        if thread_lifetime {
            // The request goes out now; its acknowledgement needs no waiter.
            drop(actor.extend_lifetime());
        }

        let thread = Arc::downgrade(self);
        let providers = self.providers.clone();
        let adapter = self.providers.register(move |id| {
            ObjectGripAdapter::new(id, actor, thread, providers, thread_lifetime)
        });

        let mut grips = self.grips.lock();
        if thread_lifetime {
            grips.thread_lifetime.push(adapter.clone());
        } else {
            grips.pause_lifetime.push(adapter.clone());
        }
        Ok(adapter)
    }

    /// Stop tracking a disposed adapter.
    pub(crate) fn forget_grip_adapter(&self, adapter: &ObjectGripAdapter) {
        let mut grips = self.grips.lock();
        let list = if adapter.thread_lifetime() {
            &mut grips.thread_lifetime
        } else {
            &mut grips.pause_lifetime
        };
        list.retain(|tracked| !std::ptr::eq(Arc::as_ptr(tracked), adapter));
    }

    pub fn pause_lifetime_adapter_count(&self) -> usize {
        self.grips.lock().pause_lifetime.len()
    }

    pub fn thread_lifetime_adapter_count(&self) -> usize {
        self.grips.lock().thread_lifetime.len()
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

    fn resume_with(&self, limit: Option<ResumeLimit>) -> Result<()> {
        self.dispose_pause_lifetime_adapters();
        self.actor.resume_with(limit)
    }

    pub fn detach(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        self.actor.detach()
    }

    /// [`ThreadActorProxy::run_on_paused_thread`], with the resume handle
    /// going through [`ThreadAdapter::resume`].
    pub async fn run_on_paused_thread<T, F, Fut>(self: &Arc<Self>, action: F) -> Result<T>
    where
        F: FnOnce(ResumeHandle) -> Fut,
        Fut: Future<Output = T>,
    {
        let weak: Weak<Self> = Arc::downgrade(self);
        self.actor
            .run_on_paused_thread_with(
                move || {
                    let Some(adapter) = weak.upgrade() else {
                        return;
                    };
                    if let Err(err) = adapter.resume() {
                        tracing::warn!(target: "rdp.adapter", thread = %adapter.name(), %err, "resume failed");
                    }
                },
                action,
            )
            .await
    }

    fn dispose_pause_lifetime_adapters(&self) {
        let adapters = mem::take(&mut self.grips.lock().pause_lifetime);
        if !adapters.is_empty() {
            tracing::debug!(
                target: "rdp.adapter",
                thread = %self.name(),
                count = adapters.len(),
                "disposing pause-lifetime grips"
            );
        }
        for adapter in adapters {
            adapter.dispose();
        }
    }

    fn invalidate_grip_adapters(&self) {
        let GripAdapters {
            pause_lifetime,
            thread_lifetime,
        } = mem::take(&mut *self.grips.lock());
        tracing::debug!(
            target: "rdp.adapter",
            thread = %self.name(),
            count = pause_lifetime.len() + thread_lifetime.len(),
            "thread gone; invalidating grips"
        );
        for adapter in pause_lifetime.into_iter().chain(thread_lifetime) {
            adapter.invalidate();
        }
    }
}

/// The shared grip proxy for `grip`, created on first sight.
pub(crate) fn object_grip_actor(
    connection: &Connection,
    grip: &ObjectGrip,
) -> Result<Arc<ObjectGripActorProxy>> {
    let owner = connection.clone();
    connection.get_or_create(&grip.actor, || {
        ObjectGripActorProxy::new(grip.actor.clone(), owner)
    })
}
