//! droidkw - keyword-script runner for Android UI tests
//!
//! A host-side interpreter runs line-oriented keyword scripts; keywords
//! reach the device through reflection calls on a TCP/JSON session with the
//! on-device agent.
//!
//! - [`rpc`]: transport server, device sessions, session registry
//! - [`protocol`]: message model and frame codec
//! - [`remote`]: remote object model and tagged call arguments
//! - [`reflection`]: reflection calls and the `reflection` keyword library
//! - [`script`]: tokenizer, interpreter and case runner
//! - [`config`]: runner configuration file

pub mod config;
pub mod protocol;
pub mod reflection;
pub mod remote;
pub mod rpc;
pub mod script;
