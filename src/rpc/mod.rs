//! Device RPC
//!
//! Transport server, per-device sessions and the session registry.
//! Keyword functions reach a device through [`DeviceSession::call_with`].

mod error;
mod registry;
mod server;
mod session;
mod state;

pub use error::{RpcError, ServerError};
pub use registry::{DeviceInfo, SessionRegistry};
pub use server::{ServerHandle, TransportServer, DEFAULT_PORT};
pub use session::{CallOptions, DeviceSession, DEFAULT_CALL_TIMEOUT_SECS};
pub use state::{ConnectionState, ConnectionStateMachine, StateTransitionError};

#[cfg(test)]
pub(crate) use session::testing;
