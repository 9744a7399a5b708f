//! Per-session callback bridge.
//!
//! The interactive agent's hook mechanism can only reach the local
//! machine. The bridge binds an ephemeral loopback listener, correlates
//! inbound hook deliveries to waiting interactions by id, forwards a
//! normalized [`HookEnvelope`] to the remote event sink, and signals local
//! completion through a one-shot channel.
//!
//! No authentication: the loopback binding plus high-entropy, short-lived
//! interaction ids are the accepted trade-off.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use metrics::counter;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use drover_core::events::HookEnvelope;
use drover_remote::RemoteStore;

use crate::errors::RuntimeError;

/// Event-type label used for forwarded hook deliveries.
const HOOK_EVENT_TYPE: &str = "hook";

struct BridgeInner {
    session_id: String,
    remote: Arc<dyn RemoteStore>,
    /// One-shot completion senders keyed by interaction id. A sender is
    /// removed on the first delivery for its id.
    registrations: Mutex<HashMap<String, oneshot::Sender<()>>>,
}

struct ServeHandle {
    port: u16,
    task: tokio::task::JoinHandle<()>,
}

/// One ephemeral loopback listener for one session.
pub struct CallbackBridge {
    inner: Arc<BridgeInner>,
    serve: Mutex<Option<ServeHandle>>,
}

impl CallbackBridge {
    /// Create a bridge for a session. The listener is not bound until
    /// [`CallbackBridge::start`].
    pub fn new(session_id: impl Into<String>, remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                session_id: session_id.into(),
                remote,
                registrations: Mutex::new(HashMap::new()),
            }),
            serve: Mutex::new(None),
        }
    }

    /// Bind the loopback listener on an OS-assigned port and start serving.
    ///
    /// Calling `start` on an already-started bridge is a usage error.
    pub async fn start(&self) -> Result<(), RuntimeError> {
        if self.serve.lock().is_some() {
            return Err(RuntimeError::BridgeAlreadyStarted);
        }
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(RuntimeError::BridgeBind)?;
        let port = listener
            .local_addr()
            .map_err(RuntimeError::BridgeBind)?
            .port();

        let app = Router::new()
            .route("/hooks/{interaction_id}", post(deliver))
            .with_state(Arc::clone(&self.inner));
        let session_id = self.inner.session_id.clone();
        let task = tokio::spawn(async move {
            if let Err(error) = axum::serve(listener, app).await {
                warn!(session_id, %error, "callback bridge listener stopped");
            }
        });

        debug!(session_id = %self.inner.session_id, port, "callback bridge started");
        *self.serve.lock() = Some(ServeHandle { port, task });
        Ok(())
    }

    /// The callback URL for an interaction, with the id as a path segment.
    pub fn callback_url(&self, interaction_id: &str) -> Result<String, RuntimeError> {
        let serve = self.serve.lock();
        let handle = serve.as_ref().ok_or(RuntimeError::BridgeNotStarted)?;
        Ok(format!(
            "http://127.0.0.1:{}/hooks/{interaction_id}",
            handle.port
        ))
    }

    /// Register a one-time completion signal for an interaction.
    ///
    /// A second registration for the same id before the first fires is a
    /// usage error.
    pub fn on_command_complete(
        &self,
        interaction_id: &str,
    ) -> Result<oneshot::Receiver<()>, RuntimeError> {
        let mut registrations = self.inner.registrations.lock();
        if registrations.contains_key(interaction_id) {
            return Err(RuntimeError::DuplicateRegistration {
                interaction_id: interaction_id.to_string(),
            });
        }
        let (tx, rx) = oneshot::channel();
        let _ = registrations.insert(interaction_id.to_string(), tx);
        Ok(rx)
    }

    /// Remove a registration that will never fire (the execution failed
    /// before or while waiting on it). The interaction id becomes free for
    /// re-registration; a delivery arriving afterwards takes the unmatched
    /// path. No-op for an unknown or already-fired id.
    pub fn cancel(&self, interaction_id: &str) {
        if self
            .inner
            .registrations
            .lock()
            .remove(interaction_id)
            .is_some()
        {
            debug!(
                session_id = %self.inner.session_id,
                interaction_id,
                "registration cancelled"
            );
        }
    }

    /// Number of registrations that have not fired.
    pub fn pending_registrations(&self) -> usize {
        self.inner.registrations.lock().len()
    }

    /// Close the listener and discard all pending registrations.
    ///
    /// Safe to call on a bridge that was never started.
    pub fn stop(&self) {
        if let Some(handle) = self.serve.lock().take() {
            handle.task.abort();
            debug!(session_id = %self.inner.session_id, "callback bridge stopped");
        }
        self.inner.registrations.lock().clear();
    }
}

impl Drop for CallbackBridge {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Inbound hook delivery for one interaction id.
///
/// First delivery for a registered id: forward the wrapped payload to the
/// remote sink (best-effort), fire and remove the handler, acknowledge.
/// Anything else is a race or a stale/duplicate delivery and gets a
/// "not found" acknowledgement.
async fn deliver(
    State(inner): State<Arc<BridgeInner>>,
    Path(interaction_id): Path<String>,
    Json(payload): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let sender = inner.registrations.lock().remove(&interaction_id);
    let Some(sender) = sender else {
        counter!("hook_deliveries_unmatched_total").increment(1);
        warn!(
            session_id = %inner.session_id,
            interaction_id,
            "hook delivery with no registered handler (race or duplicate)"
        );
        return (StatusCode::NOT_FOUND, Json(json!({"status": "not found"})));
    };

    let envelope = HookEnvelope::wrap(
        inner.session_id.clone(),
        interaction_id.clone(),
        HOOK_EVENT_TYPE,
        payload,
    );
    if let Err(error) = inner.remote.post_event(envelope).await {
        warn!(
            session_id = %inner.session_id,
            interaction_id,
            %error,
            "failed to forward hook delivery to remote sink"
        );
    }

    // The receiving end may already be gone (timeout fallback resolved the
    // execute call); the late delivery was still forwarded above.
    let _ = sender.send(());
    counter!("hook_deliveries_total").increment(1);
    debug!(session_id = %inner.session_id, interaction_id, "hook delivery dispatched");
    (StatusCode::OK, Json(json!({"status": "ok"})))
}
