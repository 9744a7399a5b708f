//! Executor strategies.
//!
//! Four interchangeable implementations of one contract, selected by a
//! pure function of (execution mode × command kind):
//!
//! | Mode    | Kind  | Strategy           | Waits on                       |
//! |---------|-------|--------------------|--------------------------------|
//! | manual  | shell | `InteractiveShell` | process exit                   |
//! | manual  | agent | `InteractiveAgent` | process exit AND hook delivery |
//! | agentic | shell | `BackgroundShell`  | process exit                   |
//! | agentic | agent | `BackgroundAgent`  | embedded stream completion     |
//!
//! A strategy never lets an internal failure escape its boundary: spawn
//! and stream failures come back as `{exit_code: 1, stderr: <message>}`.
//! The exceptions are validation (wrong command kind) and listener-bind
//! errors, which abort the call.

pub mod background_agent;
pub mod background_shell;
pub mod interactive_agent;
pub mod interactive_shell;

use std::path::PathBuf;

use async_trait::async_trait;

use drover_core::types::{
    CommandKind, CommandResult, ExecutionMode, Interaction, Session,
};

use crate::config::RuntimeConfig;
use crate::errors::RuntimeError;

pub use background_agent::BackgroundAgent;
pub use background_shell::BackgroundShell;
pub use interactive_agent::InteractiveAgent;
pub use interactive_shell::InteractiveShell;

/// One execution strategy.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Execute one interaction for a session snapshot.
    ///
    /// An empty/whitespace command is a defined no-op returning
    /// [`CommandResult::empty`]. Only validation and listener-bind errors
    /// may surface as `Err`.
    async fn execute(
        &self,
        session_id: &str,
        interaction: &Interaction,
        session: &Session,
    ) -> Result<CommandResult, RuntimeError>;
}

/// The closed set of strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// Foreground shell command, user-visible.
    InteractiveShell,
    /// Foreground external agent CLI with hook bridge.
    InteractiveAgent,
    /// Background subprocess with captured output.
    BackgroundShell,
    /// Embedded streaming agent call.
    BackgroundAgent,
}

/// Strategy selection: a pure function of the matrix above.
pub fn select_strategy(mode: ExecutionMode, kind: CommandKind) -> Strategy {
    match (mode, kind) {
        (ExecutionMode::Manual, CommandKind::Shell) => Strategy::InteractiveShell,
        (ExecutionMode::Manual, CommandKind::Agent) => Strategy::InteractiveAgent,
        (ExecutionMode::Agentic, CommandKind::Shell) => Strategy::BackgroundShell,
        (ExecutionMode::Agentic, CommandKind::Agent) => Strategy::BackgroundAgent,
    }
}

/// Contract check: the strategy received the kind it supports.
fn validate_kind(
    expected: CommandKind,
    interaction: &Interaction,
    config: &RuntimeConfig,
) -> Result<(), RuntimeError> {
    let got = interaction.command.kind(&config.agent_binary);
    if got == expected {
        Ok(())
    } else {
        Err(RuntimeError::WrongCommandKind { expected, got })
    }
}

/// Working directory resolution: command metadata, then the configured
/// workspace root, then the process's own directory.
fn resolve_cwd(config: &RuntimeConfig, interaction: &Interaction) -> PathBuf {
    if let Some(cwd) = interaction.command.cwd() {
        return PathBuf::from(cwd);
    }
    if let Some(root) = &config.workspace_root {
        return root.clone();
    }
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

#[cfg(test)]
pub(crate) mod testsupport {
    use drover_core::types::{Command, CommandResult, ExecutionMode, Interaction, Session, SessionStatus};
    use serde_json::json;

    pub fn interaction(id: &str, text: &str) -> Interaction {
        Interaction {
            id: id.into(),
            command: Command::new(text),
            result: None,
        }
    }

    pub fn agent_interaction(id: &str, prompt: &str) -> Interaction {
        let mut command = Command::new("run the agent");
        let _ = command.metadata.insert("prompt".into(), json!(prompt));
        Interaction {
            id: id.into(),
            command,
            result: None,
        }
    }

    pub fn session(id: &str, mode: ExecutionMode, interactions: Vec<Interaction>) -> Session {
        Session {
            id: id.into(),
            mode,
            interactions,
            conversation_id: None,
            status: SessionStatus::Active,
        }
    }

    pub fn completed(mut interaction: Interaction) -> Interaction {
        interaction.result = Some(CommandResult::empty());
        interaction
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_matrix_is_deterministic() {
        assert_eq!(
            select_strategy(ExecutionMode::Manual, CommandKind::Shell),
            Strategy::InteractiveShell
        );
        assert_eq!(
            select_strategy(ExecutionMode::Manual, CommandKind::Agent),
            Strategy::InteractiveAgent
        );
        assert_eq!(
            select_strategy(ExecutionMode::Agentic, CommandKind::Shell),
            Strategy::BackgroundShell
        );
        assert_eq!(
            select_strategy(ExecutionMode::Agentic, CommandKind::Agent),
            Strategy::BackgroundAgent
        );
    }

    #[test]
    fn cwd_falls_back_from_metadata_to_workspace_root() {
        let mut config = RuntimeConfig::new("http://x", "t");
        config.workspace_root = Some(PathBuf::from("/workspaces/demo"));

        let mut interaction = testsupport::interaction("i1", "ls");
        assert_eq!(
            resolve_cwd(&config, &interaction),
            PathBuf::from("/workspaces/demo")
        );

        let _ = interaction
            .command
            .metadata
            .insert("cwd".into(), serde_json::json!("/elsewhere"));
        assert_eq!(resolve_cwd(&config, &interaction), PathBuf::from("/elsewhere"));
    }

    #[test]
    fn cwd_defaults_to_process_dir() {
        let config = RuntimeConfig::new("http://x", "t");
        let interaction = testsupport::interaction("i1", "ls");
        assert_eq!(
            resolve_cwd(&config, &interaction),
            std::env::current_dir().unwrap()
        );
    }
}
