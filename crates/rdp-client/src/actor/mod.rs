//! Client-side proxies for the remote actors.
//!
//! Each proxy owns its pending-request queues and decides, from the shape of a
//! packet, whether it answers one of its requests or is an unsolicited event.

mod breakpoint;
mod object_grip;
mod pause;
mod source;
mod thread;

pub use breakpoint::BreakpointActorProxy;
pub use object_grip::ObjectGripActorProxy;
pub use pause::PauseActorProxy;
pub use source::{SetBreakpointResult, SourceActorProxy};
pub use thread::{ExecutionState, ResumeHandle, ResumeLimit, ThreadActorProxy, ThreadEvent};

macro_rules! impl_actor_kind {
    ($proxy:ty, $variant:ident, $kind:literal) => {
        impl $crate::connection::ActorKind for $proxy {
            const KIND: &'static str = $kind;

            fn into_actor(self: ::std::sync::Arc<Self>) -> $crate::connection::Actor {
                $crate::connection::Actor::$variant(self)
            }

            fn from_actor(
                actor: &$crate::connection::Actor,
            ) -> Option<::std::sync::Arc<Self>> {
                match actor {
                    $crate::connection::Actor::$variant(proxy) => Some(proxy.clone()),
                    _ => None,
                }
            }
        }
    };
}

impl_actor_kind!(ThreadActorProxy, Thread, "thread");
impl_actor_kind!(PauseActorProxy, Pause, "pause");
impl_actor_kind!(SourceActorProxy, Source, "source");
impl_actor_kind!(BreakpointActorProxy, Breakpoint, "breakpoint");
impl_actor_kind!(ObjectGripActorProxy, ObjectGrip, "objectGrip");
