//! Client runtime for the remote debugging protocol.
//!
//! A debuggee exposes many independently addressable actors over one duplex
//! stream of length-prefixed JSON packets. [`Connection`] routes each inbound
//! packet to the proxy registered for its `from` actor; each proxy pairs
//! replies with its own outstanding requests by packet shape and raises
//! events for the rest. The [`adapter`] layer keeps object grips referenced
//! while a host displays them and releases them when it stops.

pub mod actor;
pub mod adapter;
pub mod codec;
mod config;
mod connection;
mod error;
mod events;
mod pending;
pub mod protocol;
pub mod transport;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

pub use actor::{
    BreakpointActorProxy, ExecutionState, ObjectGripActorProxy, PauseActorProxy, ResumeHandle,
    ResumeLimit, SetBreakpointResult, SourceActorProxy, ThreadActorProxy, ThreadEvent,
};
pub use adapter::{DebugSession, ObjectGripAdapter, ThreadAdapter, VariableAdapter, VariablesProviders};
pub use config::ConnectionConfig;
pub use connection::{Actor, ActorKind, ActorProxy, Connection, OutboundRequests};
pub use error::{RdpError, Result};
pub use transport::TransportHandle;
