//! Interactive shell strategy: foreground process, user-visible output.
//!
//! Output goes to the user's terminal, not into the result; the result
//! carries the exit code and duration only. Window placement is the
//! embedding editor's concern, outside this core.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::debug;

use drover_core::types::{CommandKind, CommandResult, Interaction, Session};

use crate::errors::RuntimeError;
use crate::executor::background_shell::elapsed_ms;
use crate::executor::{resolve_cwd, validate_kind, Executor};
use crate::resources::SessionResources;

/// Foreground shell execution with inherited stdio.
pub struct InteractiveShell {
    resources: Arc<SessionResources>,
}

impl InteractiveShell {
    /// Strategy backed by the shared session resources.
    pub fn new(resources: Arc<SessionResources>) -> Self {
        Self { resources }
    }
}

#[async_trait]
impl Executor for InteractiveShell {
    async fn execute(
        &self,
        session_id: &str,
        interaction: &Interaction,
        _session: &Session,
    ) -> Result<CommandResult, RuntimeError> {
        if interaction.command.is_blank() {
            return Ok(CommandResult::empty());
        }
        let config = self.resources.config();
        validate_kind(CommandKind::Shell, interaction, config)?;

        let start = Instant::now();
        let cwd = resolve_cwd(config, interaction);
        let env = match self.resources.scratch_for(session_id) {
            Ok(scratch) => scratch.spawn_env(config, &interaction.command, None),
            Err(error) => {
                return Ok(CommandResult::failure(
                    format!("failed to prepare scratch space: {error}"),
                    elapsed_ms(start),
                ));
            }
        };

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
            "spawning interactive shell command"
        );

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(error) => {
                return Ok(CommandResult::failure(
                    format!("failed to spawn process: {error}"),
                    elapsed_ms(start),
                ));
            }
        };
        let status = match child.wait().await {
            Ok(status) => status,
            Err(error) => {
                return Ok(CommandResult::failure(
                    format!("process wait failed: {error}"),
                    elapsed_ms(start),
                ));
            }
        };

        Ok(CommandResult {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: status.code().unwrap_or(0),
            duration_ms: elapsed_ms(start),
        })
    }
}
