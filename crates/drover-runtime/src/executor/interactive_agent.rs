//! Interactive agent strategy: external CLI plus hook bridge.
//!
//! Completion needs two independent signals — the CLI process exiting and
//! the agent's stop hook reaching the callback bridge. The handler is
//! registered before the process starts so a hook that fires before exit
//! is never lost; the hook wait after exit is bounded (§ race resolver).

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, warn};

use drover_core::types::{CommandKind, CommandResult, Interaction, Session};

use crate::errors::RuntimeError;
use crate::executor::background_shell::elapsed_ms;
use crate::executor::{resolve_cwd, validate_kind, Executor};
use crate::race::{join_process_and_hook, WaitOutcome};
use crate::resources::SessionResources;

/// Foreground agent CLI execution synchronized with hook delivery.
pub struct InteractiveAgent {
    resources: Arc<SessionResources>,
}

impl InteractiveAgent {
    /// Strategy backed by the shared session resources.
    pub fn new(resources: Arc<SessionResources>) -> Self {
        Self { resources }
    }
}

#[async_trait]
impl Executor for InteractiveAgent {
    async fn execute(
        &self,
        session_id: &str,
        interaction: &Interaction,
        _session: &Session,
    ) -> Result<CommandResult, RuntimeError> {
        if interaction.command.is_blank() {
            return Ok(CommandResult::empty());
        }
        let config = Arc::clone(self.resources.config());
        validate_kind(CommandKind::Agent, interaction, &config)?;

        let start = Instant::now();
        // Bind errors abort; they mean no hook can ever arrive.
        let bridge = self.resources.bridge_for(session_id).await?;
        let hook_rx = bridge.on_command_complete(&interaction.id)?;
        let callback_url = bridge.callback_url(&interaction.id)?;

        let env = match self.resources.scratch_for(session_id) {
            Ok(scratch) => scratch.spawn_env(&config, &interaction.command, Some(&callback_url)),
            Err(error) => {
                bridge.cancel(&interaction.id);
                return Ok(CommandResult::failure(
                    format!("failed to prepare scratch space: {error}"),
                    elapsed_ms(start),
                ));
            }
        };
        let cwd = resolve_cwd(&config, interaction);

        let mut cmd = tokio::process::Command::new("bash");
        let _ = cmd
            .arg("-c")
            .arg(&interaction.command.text)
            .current_dir(&cwd)
            .stdin(std::process::Stdio::inherit())
            .stdout(std::process::Stdio::inherit())
            .stderr(std::process::Stdio::inherit());
        for (key, value) in env {
            let _ = cmd.env(key, value);
        }

        debug!(
            session_id,
            interaction_id = %interaction.id,
            "spawning interactive agent command"
        );
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(error) => {
                // The registration would otherwise block a retry of this
                // interaction with a duplicate-registration error.
                bridge.cancel(&interaction.id);
                return Ok(CommandResult::failure(
                    format!("failed to spawn process: {error}"),
                    elapsed_ms(start),
                ));
            }
        };

        let process = async move { child.wait().await };
        let (status, outcome) =
            join_process_and_hook(process, hook_rx, config.hook_timeout()).await;

        if outcome == WaitOutcome::TimedOut {
            warn!(
                session_id,
                interaction_id = %interaction.id,
                timeout_secs = config.hook_timeout_secs,
                "hook delivery did not arrive in time; proceeding with process result"
            );
        }

        let exit_code = match status {
            Ok(status) => status.code().unwrap_or(0),
            Err(error) => {
                bridge.cancel(&interaction.id);
                return Ok(CommandResult::failure(
                    format!("process wait failed: {error}"),
                    elapsed_ms(start),
                ));
            }
        };

        debug!(
            session_id,
            interaction_id = %interaction.id,
            exit_code,
            outcome = ?outcome,
            "interactive agent command completed"
        );

        // The hook's only role was synchronization; the process result is
        // what gets submitted.
        Ok(CommandResult {
            stdout: String::new(),
            stderr: String::new(),
            exit_code,
            duration_ms: elapsed_ms(start),
        })
    }
}
