//! Shared in-memory `RemoteStore` double for workspace tests.
//!
//! Scripted snapshots per session: each `get_next_command` consumes the
//! next queued snapshot, and the final one repeats once the queue is down
//! to a single entry. Submissions and forwarded events are recorded for
//! assertions; both can be toggled to fail to exercise the
//! log-and-continue paths.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use drover_core::events::HookEnvelope;
use drover_core::types::Session;

use crate::client::{RemoteStore, SubmitResult};
use crate::errors::RemoteError;

/// Recording in-memory remote store.
pub struct RecordingStore {
    snapshots: Mutex<HashMap<String, VecDeque<Session>>>,
    next_calls: Mutex<Vec<String>>,
    submissions: Mutex<Vec<(String, String, SubmitResult)>>,
    events: Mutex<Vec<HookEnvelope>>,
    fail_submit: AtomicBool,
    fail_post: AtomicBool,
}

impl RecordingStore {
    /// Empty store; `get_next_command` fails with a 404 status until a
    /// snapshot is queued.
    pub fn new() -> Self {
        Self {
            snapshots: Mutex::new(HashMap::new()),
            next_calls: Mutex::new(Vec::new()),
            submissions: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
            fail_submit: AtomicBool::new(false),
            fail_post: AtomicBool::new(false),
        }
    }

    /// Builder: queue a session snapshot (keyed by its id).
    pub fn with_snapshot(self, session: Session) -> Self {
        self.push_snapshot(session);
        self
    }

    /// Queue a session snapshot after construction.
    pub fn push_snapshot(&self, session: Session) {
        let mut snapshots = self.snapshots.lock();
        snapshots
            .entry(session.id.clone())
            .or_default()
            .push_back(session);
    }

    /// Make `submit_result` return an error status.
    pub fn fail_submissions(&self, fail: bool) {
        self.fail_submit.store(fail, Ordering::SeqCst);
    }

    /// Make `post_event` return an error status.
    pub fn fail_events(&self, fail: bool) {
        self.fail_post.store(fail, Ordering::SeqCst);
    }

    /// Number of `get_next_command` calls for a session.
    pub fn next_command_count(&self, session_id: &str) -> usize {
        self.next_calls
            .lock()
            .iter()
            .filter(|s| s.as_str() == session_id)
            .count()
    }

    /// Recorded submissions as (session id, interaction id, submission).
    pub fn submissions(&self) -> Vec<(String, String, SubmitResult)> {
        self.submissions.lock().clone()
    }

    /// Recorded forwarded events.
    pub fn events(&self) -> Vec<HookEnvelope> {
        self.events.lock().clone()
    }
}

impl Default for RecordingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for RecordingStore {
    async fn get_next_command(&self, session_id: &str) -> Result<Session, RemoteError> {
        self.next_calls.lock().push(session_id.to_string());
        let mut snapshots = self.snapshots.lock();
        let queue = snapshots
            .get_mut(session_id)
            .ok_or(RemoteError::Status { code: 404 })?;
        match queue.len() {
            0 => Err(RemoteError::Status { code: 404 }),
            1 => Ok(queue[0].clone()),
            _ => Ok(queue.pop_front().expect("len checked above")),
        }
    }

    async fn submit_result(
        &self,
        session_id: &str,
        interaction_id: &str,
        submission: SubmitResult,
    ) -> Result<(), RemoteError> {
        self.submissions.lock().push((
            session_id.to_string(),
            interaction_id.to_string(),
            submission,
        ));
        if self.fail_submit.load(Ordering::SeqCst) {
            return Err(RemoteError::Status { code: 500 });
        }
        Ok(())
    }

    async fn post_event(&self, envelope: HookEnvelope) -> Result<(), RemoteError> {
        self.events.lock().push(envelope);
        if self.fail_post.load(Ordering::SeqCst) {
            return Err(RemoteError::Status { code: 500 });
        }
        Ok(())
    }
}
