use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::actor::{ObjectGripActorProxy, ThreadActorProxy, ThreadEvent};
use crate::adapter::thread::object_grip_actor;
use crate::adapter::{ObjectGripAdapter, ThreadAdapter, VariablesProviders};
use crate::connection::Connection;
use crate::error::Result;
use crate::protocol::ObjectGrip;

type Threads = Arc<Mutex<HashMap<String, Arc<ThreadAdapter>>>>;

/// Everything one debugging session shares: the connection, the variables
/// provider ids handed to the host, and the attached threads.
pub struct DebugSession {
    connection: Connection,
    variables_providers: Arc<VariablesProviders>,
    threads: Threads,
}

impl DebugSession {
    pub fn new(connection: Connection) -> Self {
        Self {
            connection,
            variables_providers: Arc::new(VariablesProviders::new()),
            threads: Arc::default(),
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn variables_providers(&self) -> &Arc<VariablesProviders> {
        &self.variables_providers
    }

    pub fn variables_provider(&self, id: u32) -> Option<Arc<ObjectGripAdapter>> {
        self.variables_providers.get(id)
    }

    pub fn get_or_create_object_grip_actor(
        &self,
        grip: &ObjectGrip,
    ) -> Result<Arc<ObjectGripActorProxy>> {
        object_grip_actor(&self.connection, grip)
    }

    /// Attach to the thread actor `name`; resolves once the thread is paused.
    pub async fn attach_thread(&self, name: &str) -> Result<Arc<ThreadAdapter>> {
        let actor = ThreadActorProxy::create_and_attach(name, self.connection.clone()).await?;
        let adapter = ThreadAdapter::new(
            actor.clone(),
            self.connection.clone(),
            self.variables_providers.clone(),
        );

        let threads = Arc::downgrade(&self.threads);
        let thread_name = name.to_string();
        actor.on_event(move |event| {
            if matches!(event, ThreadEvent::Exited | ThreadEvent::Detached) {
                if let Some(threads) = threads.upgrade() {
                    threads.lock().remove(&thread_name);
                }
            }
        });

        tracing::debug!(target: "rdp.adapter", thread = %name, "thread attached");
        self.threads
            .lock()
            .insert(name.to_string(), adapter.clone());
        Ok(adapter)
    }

    pub fn thread(&self, name: &str) -> Option<Arc<ThreadAdapter>> {
        self.threads.lock().get(name).cloned()
    }

    pub fn threads(&self) -> Vec<Arc<ThreadAdapter>> {
        self.threads.lock().values().cloned().collect()
    }

    /// Close the connection; every pending request fails.
    pub fn close(&self) {
        self.threads.lock().clear();
        self.connection.close();
    }
}
