//! Per-session resource registry.
//!
//! Scratch spaces and callback bridges are created lazily on first need,
//! exclusively owned by their session, and released together during
//! session cleanup. The registry is owned by the orchestrator instance and
//! passed by reference to the executors that need it — no process-wide
//! state.

use std::io;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use drover_remote::RemoteStore;

use crate::bridge::CallbackBridge;
use crate::config::RuntimeConfig;
use crate::errors::RuntimeError;
use crate::scratch::ScratchSpace;

/// Lazily-created per-session resources.
pub struct SessionResources {
    config: Arc<RuntimeConfig>,
    remote: Arc<dyn RemoteStore>,
    scratch: DashMap<String, Arc<ScratchSpace>>,
    bridges: DashMap<String, Arc<CallbackBridge>>,
}

impl SessionResources {
    /// Create an empty registry.
    pub fn new(config: Arc<RuntimeConfig>, remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            config,
            remote,
            scratch: DashMap::new(),
            bridges: DashMap::new(),
        }
    }

    /// The runtime configuration.
    pub fn config(&self) -> &Arc<RuntimeConfig> {
        &self.config
    }

    /// The remote store handle.
    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.remote
    }

    /// The session's scratch space, created on first use.
    pub fn scratch_for(&self, session_id: &str) -> io::Result<Arc<ScratchSpace>> {
        match self.scratch.entry(session_id.to_string()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let scratch = Arc::new(ScratchSpace::new(session_id)?);
                let _ = entry.insert(Arc::clone(&scratch));
                Ok(scratch)
            }
        }
    }

    /// The session's callback bridge, created and started on first use.
    ///
    /// No lock is held across the bind await; a concurrent first use is
    /// resolved by keeping whichever bridge landed in the map.
    pub async fn bridge_for(&self, session_id: &str) -> Result<Arc<CallbackBridge>, RuntimeError> {
        if let Some(bridge) = self.bridges.get(session_id) {
            return Ok(Arc::clone(bridge.value()));
        }
        let bridge = Arc::new(CallbackBridge::new(session_id, Arc::clone(&self.remote)));
        bridge.start().await?;
        match self.bridges.entry(session_id.to_string()) {
            Entry::Occupied(entry) => {
                bridge.stop();
                Ok(Arc::clone(entry.get()))
            }
            Entry::Vacant(entry) => {
                let _ = entry.insert(Arc::clone(&bridge));
                Ok(bridge)
            }
        }
    }

    /// Whether a bridge exists for the session (it may not, if the session
    /// never ran an interactive-agent command).
    pub fn has_bridge(&self, session_id: &str) -> bool {
        self.bridges.contains_key(session_id)
    }

    /// Release everything the session owns. Safe to call when some (or
    /// all) resources were never created, and safe to call twice.
    pub fn cleanup(&self, session_id: &str) {
        if let Some((_, bridge)) = self.bridges.remove(session_id) {
            bridge.stop();
        }
        if self.scratch.remove(session_id).is_some() {
            debug!(session_id, "scratch space released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drover_remote::testutil::RecordingStore;

    fn resources() -> SessionResources {
        let config = Arc::new(RuntimeConfig::new("http://localhost:4000", "tok"));
        let remote: Arc<dyn RemoteStore> = Arc::new(RecordingStore::new());
        SessionResources::new(config, remote)
    }

    #[test]
    fn scratch_is_created_once_per_session() {
        let resources = resources();
        let a = resources.scratch_for("s1").unwrap();
        let b = resources.scratch_for("s1").unwrap();
        assert_eq!(a.path(), b.path());
        let other = resources.scratch_for("s2").unwrap();
        assert_ne!(a.path(), other.path());
    }

    #[tokio::test]
    async fn bridge_is_created_once_and_started() {
        let resources = resources();
        let a = resources.bridge_for("s1").await.unwrap();
        let b = resources.bridge_for("s1").await.unwrap();
        assert_eq!(
            a.callback_url("i1").unwrap(),
            b.callback_url("i1").unwrap()
        );
        assert!(resources.has_bridge("s1"));
    }

    #[tokio::test]
    async fn cleanup_is_safe_without_resources() {
        let resources = resources();
        resources.cleanup("never-seen");
        resources.cleanup("never-seen");
    }

    #[tokio::test]
    async fn cleanup_stops_bridge_and_drops_scratch() {
        let resources = resources();
        let bridge = resources.bridge_for("s1").await.unwrap();
        let scratch = resources.scratch_for("s1").unwrap();
        let path = scratch.path().to_path_buf();
        drop(scratch);

        resources.cleanup("s1");
        assert!(!resources.has_bridge("s1"));
        assert!(!path.exists());
        // A stopped bridge refuses URL construction.
        assert!(bridge.callback_url("i1").is_err());
    }
}
