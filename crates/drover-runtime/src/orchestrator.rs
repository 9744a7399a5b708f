//! Session orchestrator.
//!
//! Serializes execution per session, keeps the cached snapshot fresh from
//! server notifications, and owns the auto-play loop. One invariant runs
//! through everything here: at most one interaction executes per session,
//! and the `is_executing` latch is released only by the remote store's
//! completion notification (or a local error, which would otherwise strand
//! the session).
//!
//! | Operation             | Triggered by                               |
//! |-----------------------|--------------------------------------------|
//! | `execute_next`        | user action, auto-play, parent fan-out     |
//! | `handle_notification` | remote push channel                        |
//! | `set_auto_play`       | user toggling continuous execution         |
//! | `cleanup_session`     | terminal status, shutdown                  |

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use futures::future::join_all;
use metrics::{counter, gauge};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use drover_core::events::{RunnerEvent, ServerNotification};
use drover_core::types::{CommandResult, Interaction, Session, SessionStatus};
use drover_remote::{RemoteStore, SubmitResult};

use crate::agent::AgentClient;
use crate::config::RuntimeConfig;
use crate::emitter::RunnerEventEmitter;
use crate::errors::RuntimeError;
use crate::executor::{
    select_strategy, BackgroundAgent, BackgroundShell, Executor, InteractiveAgent,
    InteractiveShell, Strategy,
};
use crate::resources::SessionResources;

/// Per-session orchestration state. Lives from first contact with a
/// session until its cleanup.
#[derive(Default)]
struct SessionState {
    /// Last snapshot received from the remote store.
    session: Option<Session>,
    /// Whether completion notifications chain into the next execution.
    auto_play: bool,
    /// Execution latch; see the module docs.
    is_executing: bool,
}

/// Coordinates executors, the remote store, and per-session resources.
pub struct Orchestrator {
    resources: Arc<SessionResources>,
    emitter: RunnerEventEmitter,
    sessions: DashMap<String, SessionState>,
    interactive_shell: InteractiveShell,
    interactive_agent: InteractiveAgent,
    background_shell: BackgroundShell,
    background_agent: BackgroundAgent,
}

impl Orchestrator {
    /// Build an orchestrator with all four strategies wired to a shared
    /// resource registry.
    pub fn new(
        config: Arc<RuntimeConfig>,
        remote: Arc<dyn RemoteStore>,
        agent: Arc<dyn AgentClient>,
    ) -> Self {
        let resources = Arc::new(SessionResources::new(Arc::clone(&config), remote));
        Self {
            interactive_shell: InteractiveShell::new(Arc::clone(&resources)),
            interactive_agent: InteractiveAgent::new(Arc::clone(&resources)),
            background_shell: BackgroundShell::new(Arc::clone(&resources)),
            background_agent: BackgroundAgent::new(Arc::clone(&resources), agent),
            resources,
            emitter: RunnerEventEmitter::new(),
            sessions: DashMap::new(),
        }
    }

    /// Subscribe to local lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<RunnerEvent> {
        self.emitter.subscribe()
    }

    /// Whether an execution is in flight for the session.
    pub fn is_executing(&self, session_id: &str) -> bool {
        self.sessions
            .get(session_id)
            .map(|state| state.is_executing)
            .unwrap_or(false)
    }

    /// Whether auto-play is enabled for the session.
    pub fn auto_play(&self, session_id: &str) -> bool {
        self.sessions
            .get(session_id)
            .map(|state| state.auto_play)
            .unwrap_or(false)
    }

    /// The cached session snapshot, if one has been fetched.
    pub fn cached_session(&self, session_id: &str) -> Option<Session> {
        self.sessions
            .get(session_id)
            .and_then(|state| state.session.clone())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Execution
    // ─────────────────────────────────────────────────────────────────────

    /// Fetch and execute the session's next pending interaction.
    ///
    /// A no-op while another execution is in flight for the same session.
    /// On success the execution latch stays held until the remote store's
    /// completion notification arrives; on error it is released so the
    /// session can retry.
    pub async fn execute_next(&self, session_id: &str) -> Result<(), RuntimeError> {
        if !self.try_begin(session_id) {
            debug!(session_id, "execution already in flight, skipping");
            return Ok(());
        }
        match self.run_pending(session_id).await {
            Ok(submitted) => {
                if !submitted {
                    self.clear_executing(session_id);
                }
                Ok(())
            }
            Err(error) => {
                self.clear_executing(session_id);
                Err(error)
            }
        }
    }

    async fn run_pending(&self, session_id: &str) -> Result<bool, RuntimeError> {
        let snapshot = self
            .resources
            .remote()
            .get_next_command(session_id)
            .await?;
        self.cache_snapshot(&snapshot);

        if snapshot.status.is_terminal() {
            info!(session_id, status = ?snapshot.status, "session is terminal");
            self.cleanup_session(session_id);
            return Ok(false);
        }
        let Some(pending) = snapshot.next_pending() else {
            debug!(session_id, "no pending interaction");
            return Ok(false);
        };

        let result = if let Some(children) = pending.command.child_session_ids() {
            self.run_children(session_id, &pending.id, &children).await
        } else {
            self.dispatch(session_id, pending, &snapshot).await?
        };

        let submission = SubmitResult::from_result(result);
        if let Err(error) = self
            .resources
            .remote()
            .submit_result(session_id, &pending.id, submission)
            .await
        {
            // The remote store reconciles via its own signals; a lost
            // submission is logged, not fatal.
            warn!(session_id, interaction_id = %pending.id, %error, "result submission failed");
        }
        Ok(true)
    }

    async fn dispatch(
        &self,
        session_id: &str,
        interaction: &Interaction,
        session: &Session,
    ) -> Result<CommandResult, RuntimeError> {
        let kind = interaction
            .command
            .kind(&self.resources.config().agent_binary);
        let strategy = select_strategy(session.mode, kind);
        debug!(session_id, interaction_id = %interaction.id, strategy = ?strategy, "dispatching");

        let _ = self.emitter.emit(RunnerEvent::ExecutionStarted {
            session_id: session_id.to_string(),
            interaction_id: interaction.id.clone(),
        });
        gauge!("executions_inflight").increment(1.0);

        let executor: &dyn Executor = match strategy {
            Strategy::InteractiveShell => &self.interactive_shell,
            Strategy::InteractiveAgent => &self.interactive_agent,
            Strategy::BackgroundShell => &self.background_shell,
            Strategy::BackgroundAgent => &self.background_agent,
        };
        let outcome = executor.execute(session_id, interaction, session).await;

        gauge!("executions_inflight").decrement(1.0);
        if let Ok(result) = &outcome {
            counter!("executions_total", "strategy" => strategy_label(strategy)).increment(1);
            let _ = self.emitter.emit(RunnerEvent::ExecutionFinished {
                session_id: session_id.to_string(),
                interaction_id: interaction.id.clone(),
                exit_code: result.exit_code,
            });
        }
        outcome
    }

    // ─────────────────────────────────────────────────────────────────────
    // Parallel child sessions
    // ─────────────────────────────────────────────────────────────────────

    /// Fan out to child sessions, drive each to completion in parallel,
    /// and fold the outcomes into one result for the parent interaction.
    /// A child id listed more than once is driven once.
    async fn run_children(
        &self,
        session_id: &str,
        interaction_id: &str,
        children: &[String],
    ) -> CommandResult {
        let start = Instant::now();
        let mut targets: Vec<&str> = Vec::new();
        for child in children {
            if targets.contains(&child.as_str()) {
                debug!(session_id, interaction_id, child = %child, "duplicate child session id ignored");
            } else {
                targets.push(child);
            }
        }
        info!(
            session_id,
            interaction_id,
            count = targets.len(),
            "fanning out to child sessions"
        );

        let outcomes = join_all(targets.iter().map(|child| self.drive_child(child))).await;
        let succeeded = outcomes.iter().filter(|ok| **ok).count();
        let failed = outcomes.len() - succeeded;
        let summary = format!(
            "{} children: {succeeded} succeeded, {failed} failed",
            outcomes.len()
        );
        info!(session_id, interaction_id, %summary, "fan-out complete");

        let failed_ids: Vec<&str> = targets
            .iter()
            .zip(&outcomes)
            .filter(|(_, ok)| !**ok)
            .map(|(id, _)| *id)
            .collect();
        CommandResult {
            stdout: summary,
            stderr: if failed == 0 {
                String::new()
            } else {
                format!("failed child sessions: {}", failed_ids.join(", "))
            },
            exit_code: i32::from(failed > 0),
            duration_ms: elapsed_ms(start),
        }
    }

    /// Drive one child session until it reaches a terminal status. A child
    /// fails on a nonzero result, a failed status, or a stalled snapshot
    /// (the same interaction pending across two fetches).
    ///
    /// Each step goes through the same execution latch as `execute_next`,
    /// so a child interaction never runs twice concurrently; its resources
    /// are released on every way out except losing the latch (that
    /// execution still owns them).
    async fn drive_child(&self, child_id: &str) -> bool {
        let mut last_pending: Option<String> = None;
        loop {
            let snapshot = match self.resources.remote().get_next_command(child_id).await {
                Ok(snapshot) => snapshot,
                Err(error) => {
                    warn!(child_id, %error, "child session fetch failed");
                    self.cleanup_session(child_id);
                    return false;
                }
            };
            if snapshot.status.is_terminal() {
                let completed = snapshot.status == SessionStatus::Complete;
                self.cleanup_session(child_id);
                return completed;
            }
            let Some(pending) = snapshot.next_pending() else {
                // Active with nothing pending: the store has the results
                // and will flip the status itself.
                self.cleanup_session(child_id);
                return true;
            };
            if last_pending.as_deref() == Some(pending.id.as_str()) {
                warn!(child_id, interaction_id = %pending.id, "child session stalled");
                self.cleanup_session(child_id);
                return false;
            }
            last_pending = Some(pending.id.clone());

            if !self.try_begin(child_id) {
                warn!(child_id, interaction_id = %pending.id, "child session already executing");
                return false;
            }
            let dispatched = self.dispatch(child_id, pending, &snapshot).await;
            self.clear_executing(child_id);

            let result = match dispatched {
                Ok(result) => result,
                Err(error) => {
                    warn!(child_id, interaction_id = %pending.id, %error, "child execution failed");
                    self.cleanup_session(child_id);
                    return false;
                }
            };
            let child_failed = !result.is_ok();
            if let Err(error) = self
                .resources
                .remote()
                .submit_result(child_id, &pending.id, SubmitResult::from_result(result))
                .await
            {
                warn!(child_id, interaction_id = %pending.id, %error, "child result submission failed");
            }
            if child_failed {
                self.cleanup_session(child_id);
                return false;
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Notifications and lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Apply one server notification. Safe under duplicated or reordered
    /// delivery: a completion for a session that is not executing (or is
    /// unknown) is ignored.
    pub async fn handle_notification(&self, notification: ServerNotification) {
        match notification {
            ServerNotification::InteractionCompleted {
                session_id,
                interaction_id,
                status,
            } => {
                let Some((was_executing, auto_play)) = ({
                    self.sessions.get_mut(&session_id).map(|mut state| {
                        let was = std::mem::replace(&mut state.is_executing, false);
                        (was, state.auto_play)
                    })
                }) else {
                    debug!(session_id, interaction_id, "completion for unknown session");
                    return;
                };
                if !was_executing {
                    debug!(session_id, interaction_id, "duplicate completion ignored");
                    return;
                }
                info!(session_id, interaction_id, status = ?status, "interaction completed");
                counter!("interactions_completed_total").increment(1);
                if auto_play {
                    if let Err(error) = self.execute_next(&session_id).await {
                        warn!(session_id, %error, "auto-play continuation failed");
                    }
                }
            }
            ServerNotification::SessionUpdated { session } => {
                let session_id = session.id.clone();
                let terminal = session.status.is_terminal();
                if let Some(mut state) = self.sessions.get_mut(&session_id) {
                    state.session = Some(session);
                    if terminal {
                        state.auto_play = false;
                    }
                }
                if terminal {
                    self.cleanup_session(&session_id);
                }
            }
        }
    }

    /// Toggle auto-play. Enabling while the session is idle starts the
    /// next execution immediately; disabling never preempts one in flight.
    pub async fn set_auto_play(&self, session_id: &str, enabled: bool) -> Result<(), RuntimeError> {
        let kick = {
            let mut state = self.sessions.entry(session_id.to_string()).or_default();
            state.auto_play = enabled;
            enabled && !state.is_executing
        };
        info!(session_id, enabled, "auto-play toggled");
        if kick {
            self.execute_next(session_id).await
        } else {
            Ok(())
        }
    }

    /// Release the session's resources and forget its state. Idempotent.
    pub fn cleanup_session(&self, session_id: &str) {
        self.resources.cleanup(session_id);
        if self.sessions.remove(session_id).is_some() {
            let _ = self.emitter.emit(RunnerEvent::SessionClosed {
                session_id: session_id.to_string(),
            });
            info!(session_id, "session closed");
        }
        gauge!("sessions_active").set(self.sessions.len() as f64);
    }

    /// Clean up every known session.
    pub fn shutdown(&self) {
        let ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.cleanup_session(&id);
        }
        info!("orchestrator shut down");
    }

    // ─────────────────────────────────────────────────────────────────────
    // State helpers
    // ─────────────────────────────────────────────────────────────────────

    fn try_begin(&self, session_id: &str) -> bool {
        let mut state = self.sessions.entry(session_id.to_string()).or_default();
        if state.is_executing {
            false
        } else {
            state.is_executing = true;
            true
        }
    }

    fn clear_executing(&self, session_id: &str) {
        if let Some(mut state) = self.sessions.get_mut(session_id) {
            state.is_executing = false;
        }
    }

    fn cache_snapshot(&self, snapshot: &Session) {
        if let Some(mut state) = self.sessions.get_mut(&snapshot.id) {
            state.session = Some(snapshot.clone());
        }
    }
}

fn strategy_label(strategy: Strategy) -> &'static str {
    match strategy {
        Strategy::InteractiveShell => "interactive_shell",
        Strategy::InteractiveAgent => "interactive_agent",
        Strategy::BackgroundShell => "background_shell",
        Strategy::BackgroundAgent => "background_agent",
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
