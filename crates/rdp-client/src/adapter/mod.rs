//! Session-level bookkeeping on top of the actor proxies: which object grips
//! each consumer references, and for how long they must stay alive.

mod object_grip;
mod registry;
mod session;
mod thread;
mod variable;

pub use object_grip::ObjectGripAdapter;
pub use registry::VariablesProviders;
pub use session::DebugSession;
pub use thread::ThreadAdapter;
pub use variable::{render_grip, sort_variables, VariableAdapter};
