use std::sync::Arc;

use serde_json::Value;

use crate::connection::ActorProxy;
use crate::protocol;

/// The context of one pause episode of a thread.
///
/// Frame and value requests made while paused are scoped to it; it becomes
/// meaningless once the thread resumes.
#[derive(Debug)]
pub struct PauseActorProxy {
    name: String,
}

impl PauseActorProxy {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self { name: name.into() })
    }
}

impl ActorProxy for PauseActorProxy {
    fn name(&self) -> &str {
        &self.name
    }

    fn receive_message(&self, message: &Value) {
        if let Some((error, _)) = protocol::message_error(message) {
            tracing::warn!(target: "rdp.pause", actor = %self.name, error, "error from pause actor");
        } else {
            tracing::warn!(
                target: "rdp.pause",
                actor = %self.name,
                %message,
                "unknown message from pause actor"
            );
        }
    }

    fn connection_closed(&self) {}
}
