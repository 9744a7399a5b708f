//! Background shell strategy: subprocess with captured output.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tracing::debug;

use drover_core::types::{CommandKind, CommandResult, Interaction, Session};

use crate::errors::RuntimeError;
use crate::executor::{resolve_cwd, validate_kind, Executor};
use crate::resources::SessionResources;

/// Spawns the command as a piped subprocess and accumulates stdout/stderr
/// while it runs. `None` exit code (killed by signal) is treated as
/// success; spawn failure becomes a failed result, never an error.
pub struct BackgroundShell {
    resources: Arc<SessionResources>,
}

impl BackgroundShell {
    /// Strategy backed by the shared session resources.
    pub fn new(resources: Arc<SessionResources>) -> Self {
        Self { resources }
    }
}

#[async_trait]
impl Executor for BackgroundShell {
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
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());
        for (key, value) in env {
            let _ = cmd.env(key, value);
        }

        debug!(
            session_id,
            interaction_id = %interaction.id,
            cwd = %cwd.display(),
            "spawning background shell command"
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

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let stdout_handle = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(mut pipe) = stdout_pipe {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            buf
        });
        let stderr_handle = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(mut pipe) = stderr_pipe {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            buf
        });

        let status = match child.wait().await {
            Ok(status) => status,
            Err(error) => {
                stdout_handle.abort();
                stderr_handle.abort();
                return Ok(CommandResult::failure(
                    format!("process wait failed: {error}"),
                    elapsed_ms(start),
                ));
            }
        };
        let stdout_bytes = stdout_handle.await.unwrap_or_default();
        let stderr_bytes = stderr_handle.await.unwrap_or_default();

        // Exit by signal carries no code; the remote store treats the
        // interaction as done either way.
        let exit_code = status.code().unwrap_or(0);
        let duration_ms = elapsed_ms(start);
        debug!(
            session_id,
            interaction_id = %interaction.id,
            exit_code,
            duration_ms,
            "background shell command completed"
        );

        Ok(CommandResult {
            stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
            stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
            exit_code,
            duration_ms,
        })
    }
}

pub(super) fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::executor::testsupport::{agent_interaction, interaction, session};
    use assert_matches::assert_matches;
    use drover_core::types::ExecutionMode;
    use drover_remote::testutil::RecordingStore;
    use drover_remote::RemoteStore;
    use serde_json::json;

    fn executor() -> BackgroundShell {
        let config = Arc::new(RuntimeConfig::new("http://localhost:4000", "tok"));
        let remote: Arc<dyn RemoteStore> = Arc::new(RecordingStore::new());
        BackgroundShell::new(Arc::new(SessionResources::new(config, remote)))
    }

    fn empty_session() -> Session {
        session("s1", ExecutionMode::Agentic, vec![])
    }

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let result = executor()
            .execute("s1", &interaction("i1", "echo hello"), &empty_session())
            .await
            .unwrap();
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn captures_stderr_and_nonzero_exit() {
        let result = executor()
            .execute("s1", &interaction("i1", "echo oops >&2; exit 3"), &empty_session())
            .await
            .unwrap();
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn blank_command_is_a_no_op() {
        let result = executor()
            .execute("s1", &interaction("i1", "   "), &empty_session())
            .await
            .unwrap();
        assert_eq!(result, CommandResult::empty());
    }

    #[tokio::test]
    async fn session_env_is_injected() {
        let result = executor()
            .execute("s1", &interaction("i1", "echo $DROVER_SESSION_ID"), &empty_session())
            .await
            .unwrap();
        assert_eq!(result.stdout.trim(), "s1");
    }

    #[tokio::test]
    async fn cwd_metadata_is_honored() {
        let dir = tempfile::tempdir().unwrap();
        let mut work = interaction("i1", "pwd");
        let _ = work
            .command
            .metadata
            .insert("cwd".into(), json!(dir.path().to_string_lossy()));
        let result = executor()
            .execute("s1", &work, &empty_session())
            .await
            .unwrap();
        assert_eq!(
            std::fs::canonicalize(result.stdout.trim()).unwrap(),
            std::fs::canonicalize(dir.path()).unwrap()
        );
    }

    #[tokio::test]
    async fn agent_command_is_a_contract_violation() {
        let err = executor()
            .execute("s1", &agent_interaction("i1", "do things"), &empty_session())
            .await
            .unwrap_err();
        assert_matches!(err, RuntimeError::WrongCommandKind { .. });
    }
}
