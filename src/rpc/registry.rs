//! Session Registry - tracks every registered device session

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Notify;
use tracing::{info, warn};

use super::session::DeviceSession;

/// Snapshot of a connected device
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub device_id: String,
    pub peer_addr: Option<SocketAddr>,
    pub connected_at: DateTime<Utc>,
}

impl DeviceInfo {
    fn from_session(session: &DeviceSession) -> Self {
        Self {
            device_id: session.device_id().to_string(),
            peer_addr: session.peer_addr(),
            connected_at: session.connected_at(),
        }
    }
}

/// Server-wide registry of device sessions, keyed by device id
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<DeviceSession>>,
    registered: Notify,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            registered: Notify::new(),
        }
    }

    /// Register a session. A previous session under the same id is replaced
    /// and returned.
    pub fn register(&self, session: Arc<DeviceSession>) -> Option<Arc<DeviceSession>> {
        let device_id = session.device_id().to_string();
        let peer = session.peer_addr();
        let previous = self.sessions.insert(device_id.clone(), session);
        if previous.is_some() {
            warn!("[session-registry] device {} re-registered, replacing old session", device_id);
        }
        info!("[session-registry] device registered: {} ({:?})", device_id, peer);
        self.registered.notify_waiters();
        previous
    }

    /// Remove a session by device id
    pub fn remove(&self, device_id: &str) -> Option<Arc<DeviceSession>> {
        let removed = self.sessions.remove(device_id).map(|(_, s)| s);
        if removed.is_some() {
            info!("[session-registry] device unregistered: {}", device_id);
        }
        removed
    }

    /// Remove `session` only if it is still the registered one for its id.
    ///
    /// A connection cleaning up after itself must not evict a newer
    /// registration of the same device.
    pub fn remove_session(&self, session: &Arc<DeviceSession>) -> bool {
        let removed = self
            .sessions
            .remove_if(session.device_id(), |_, current| Arc::ptr_eq(current, session))
            .is_some();
        if removed {
            info!("[session-registry] device unregistered: {}", session.device_id());
        }
        removed
    }

    /// Get session by device id
    pub fn get(&self, device_id: &str) -> Option<Arc<DeviceSession>> {
        self.sessions.get(device_id).map(|r| r.value().clone())
    }

    /// Wait until `device_id` is registered, up to `timeout`.
    pub async fn wait_for(&self, device_id: &str, timeout: Duration) -> Option<Arc<DeviceSession>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Subscribe before checking so a registration in between is not missed.
            let notified = self.registered.notified();
            if let Some(session) = self.get(device_id) {
                return Some(session);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.get(device_id);
            }
        }
    }

    /// All connected device ids, sorted
    pub fn device_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    /// List all connected devices, sorted by id
    pub fn list(&self) -> Vec<DeviceInfo> {
        let mut devices: Vec<DeviceInfo> = self
            .sessions
            .iter()
            .map(|r| DeviceInfo::from_session(r.value()))
            .collect();
        devices.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        devices
    }

    /// Get the number of connected devices
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Send a kill signal to every session and clear the registry
    pub async fn close_all(&self) {
        let sessions: Vec<Arc<DeviceSession>> =
            self.sessions.iter().map(|r| r.value().clone()).collect();
        self.sessions.clear();

        for session in sessions {
            info!("[session-registry] closing device: {}", session.device_id());
            if let Err(e) = session.close().await {
                warn!(
                    "[session-registry] failed to close {}: {}",
                    session.device_id(),
                    e
                );
            }
            session.mark_closed();
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::session::testing::loopback;

    #[test]
    fn test_register_and_lookup() {
        let registry = SessionRegistry::new();
        let (b, _db) = loopback("device-b");
        let (a, _da) = loopback("device-a");

        assert!(registry.register(b).is_none());
        assert!(registry.register(a.clone()).is_none());

        assert_eq!(registry.count(), 2);
        assert_eq!(registry.device_ids(), vec!["device-a", "device-b"]);
        assert!(Arc::ptr_eq(&registry.get("device-a").unwrap(), &a));
        assert!(registry.get("device-c").is_none());

        let listed = registry.list();
        assert_eq!(listed[0].device_id, "device-a");
    }

    #[test]
    fn test_stale_cleanup_keeps_newer_session() {
        let registry = SessionRegistry::new();
        let (old, _d1) = loopback("dev");
        let (new, _d2) = loopback("dev");

        registry.register(old.clone());
        let replaced = registry.register(new.clone()).unwrap();
        assert!(Arc::ptr_eq(&replaced, &old));

        // Old connection cleans up late: must not evict the new one.
        assert!(!registry.remove_session(&old));
        assert!(Arc::ptr_eq(&registry.get("dev").unwrap(), &new));

        assert!(registry.remove_session(&new));
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test]
    async fn test_wait_for_registration() {
        let registry = Arc::new(SessionRegistry::new());

        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.wait_for("late", Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        let (session, _device) = loopback("late");
        registry.register(session);

        let found = waiter.await.unwrap();
        assert_eq!(found.unwrap().device_id(), "late");
    }

    #[tokio::test]
    async fn test_wait_for_times_out() {
        let registry = SessionRegistry::new();
        let found = registry.wait_for("nobody", Duration::from_millis(50)).await;
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_close_all_sends_kill() {
        let registry = SessionRegistry::new();
        let (session, mut device) = loopback("dev");
        registry.register(session.clone());

        registry.close_all().await;
        assert_eq!(registry.count(), 0);
        assert!(session.is_closed());
        assert!(device.next_call().await.is_kill_signal());
    }
}
