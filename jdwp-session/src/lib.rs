// JDWP debugger session library
//
// Client side of the Java Debug Wire Protocol, aimed at inspecting and
// steering a remote Java or Android VM:
// - Framed transport over TCP or Unix sockets with a single reader task
// - Typed entities (classes, methods, threads, frames, objects) pooled by id
// - Lazily loaded metadata groups
// - Event hooks delivered to callbacks or queues

pub mod array;
pub mod commands;
pub mod config;
pub mod connection;
pub mod events;
pub mod hook;
pub mod location;
pub mod method;
pub mod object;
pub mod protocol;
pub mod reader;
pub mod reftype;
pub mod session;
pub mod stackframe;
pub mod string;
pub mod thread;
pub mod transport;
pub mod types;
pub mod value;
pub mod vm;
pub mod writer;

mod deferred;
mod eventloop;
mod eventrequest;
mod poison;
mod pool;

pub use array::Array;
pub use config::SessionConfig;
pub use connection::{Connection, ConnectionState};
pub use eventloop::EventPacket;
pub use events::Event;
pub use hook::{Hook, HookOrigin, HookTarget};
pub use location::Location;
pub use method::{Method, Slot};
pub use object::Object;
pub use protocol::{JdwpError, JdwpResult};
pub use reftype::{Class, Field};
pub use session::Session;
pub use stackframe::Frame;
pub use string::StringRef;
pub use thread::Thread;
pub use types::{IdSizes, Modifiers, SuspendPolicy, SuspendStatus, ThreadStatus};
pub use value::Value;
pub use vm::{VmCapabilities, VmVersion};
