use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::actor::ObjectGripActorProxy;
use crate::adapter::{sort_variables, ThreadAdapter, VariableAdapter, VariablesProviders};
use crate::connection::ActorProxy;
use crate::error::{RdpError, Result};

/// One consumer's reference to a remote object.
///
/// Creating the adapter takes a reference on the shared grip proxy and
/// registers a variables-provider id; [`ObjectGripAdapter::dispose`] gives both
/// back.
pub struct ObjectGripAdapter {
    variables_provider_id: u32,
    actor: Arc<ObjectGripActorProxy>,
    thread: Weak<ThreadAdapter>,
    providers: Arc<VariablesProviders>,
    thread_lifetime: bool,
    disposed: AtomicBool,
}

impl ObjectGripAdapter {
    pub(crate) fn new(
        variables_provider_id: u32,
        actor: Arc<ObjectGripActorProxy>,
        thread: Weak<ThreadAdapter>,
        providers: Arc<VariablesProviders>,
        thread_lifetime: bool,
    ) -> Arc<Self> {
        actor.increase_ref_count();
        Arc::new(Self {
            variables_provider_id,
            actor,
            thread,
            providers,
            thread_lifetime,
            disposed: AtomicBool::new(false),
        })
    }

    pub fn variables_provider_id(&self) -> u32 {
        self.variables_provider_id
    }

    pub fn actor(&self) -> &Arc<ObjectGripActorProxy> {
        &self.actor
    }

    pub fn thread_lifetime(&self) -> bool {
        self.thread_lifetime
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// The object's properties, symbol properties and prototype, in display
    /// order.
    ///
    /// Runs through the owning thread's pause coordinator and leaves the thread
    /// paused.
    pub async fn get_variables(&self) -> Result<Vec<VariableAdapter>> {
        if self.is_disposed() {
            return Err(RdpError::Released {
                actor: self.actor.name().to_string(),
            });
        }
        let thread = self.thread.upgrade().ok_or(RdpError::Detached)?;

        let actor = self.actor.clone();
        let listing = thread
            .run_on_paused_thread(|_resume| actor.fetch_prototype_and_properties())
            .await??;

        let safe_getter_values = listing.safe_getter_values.unwrap_or_default();
        let mut variables = Vec::with_capacity(listing.own_properties.len() + safe_getter_values.len());
        for (name, descriptor) in &listing.own_properties {
            if safe_getter_values.contains_key(name) {
                continue;
            }
            variables.push(VariableAdapter::from_property_descriptor(
                name,
                descriptor,
                self.thread_lifetime,
                &thread,
            )?);
        }
        for (name, descriptor) in &safe_getter_values {
            variables.push(VariableAdapter::from_safe_getter_value_descriptor(
                name,
                descriptor,
                self.thread_lifetime,
                &thread,
            )?);
        }

        let mut symbols = listing
            .own_symbols
            .unwrap_or_default()
            .iter()
            .map(|symbol| {
                VariableAdapter::from_property_descriptor(
                    &symbol.name,
                    &symbol.descriptor,
                    self.thread_lifetime,
                    &thread,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        sort_variables(&mut variables);
        sort_variables(&mut symbols);
        variables.append(&mut symbols);

        if !listing.prototype.is_null() {
            variables.push(VariableAdapter::from_grip(
                "__proto__",
                &listing.prototype,
                self.thread_lifetime,
                &thread,
            )?);
        }

        Ok(variables)
    }

    /// Drop this consumer's reference. Safe to call more than once.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.actor.decrease_ref_count();
        self.providers.unregister(self.variables_provider_id);
        if let Some(thread) = self.thread.upgrade() {
            thread.forget_grip_adapter(self);
        }
    }

    /// The debuggee already dropped the object; forget it without releasing.
    pub(crate) fn invalidate(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.actor.invalidate();
        self.providers.unregister(self.variables_provider_id);
    }
}
