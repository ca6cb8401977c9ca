//! Keyword execution context
//!
//! Passed to every keyword invocation. Carries the device the script runs
//! against and a value store shared by all keyword libraries of one run,
//! so a library can stash a handle for a later keyword to pick up.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::error::KeywordError;
use crate::remote::RemoteObject;
use crate::rpc::DeviceSession;

#[derive(Debug, Clone)]
pub struct KeywordContext {
    device_id: String,
    session: Option<Arc<DeviceSession>>,
    shared: Arc<Mutex<HashMap<String, RemoteObject>>>,
}

impl KeywordContext {
    /// Context with no device attached, for scripts that never reach a device.
    pub fn detached(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            session: None,
            shared: Arc::default(),
        }
    }

    pub fn for_session(session: Arc<DeviceSession>) -> Self {
        Self {
            device_id: session.device_id().to_string(),
            session: Some(session),
            shared: Arc::default(),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Device session, or [`KeywordError::NoSession`] when detached.
    pub fn session(&self) -> Result<&Arc<DeviceSession>, KeywordError> {
        self.session
            .as_ref()
            .ok_or_else(|| KeywordError::NoSession(self.device_id.clone()))
    }

    pub fn get_var(&self, name: &str) -> Option<RemoteObject> {
        self.shared.lock().get(name).cloned()
    }

    /// Store a value, returning the previous one.
    pub fn set_var(&self, name: impl Into<String>, value: RemoteObject) -> Option<RemoteObject> {
        self.shared.lock().insert(name.into(), value)
    }

    pub fn clear_vars(&self) {
        self.shared.lock().clear();
    }
}
