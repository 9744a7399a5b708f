//! Protocol types shared across the executor, bridge, and orchestrator
//! boundaries.
//!
//! The remote store owns [`Session`] and [`Interaction`]; the runtime holds
//! cached, eventually-consistent copies. [`Command`] is immutable once
//! issued; [`CommandResult`] is produced by exactly one executor invocation
//! per interaction.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metadata key carrying the agent prompt (marks the command as agent-kind).
pub const META_PROMPT: &str = "prompt";
/// Metadata key for the working directory override.
pub const META_CWD: &str = "cwd";
/// Metadata key for user-supplied environment pairs.
pub const META_ENV: &str = "env";
/// Metadata key listing child session ids for parallel fan-out.
pub const META_CHILD_SESSIONS: &str = "childSessionIds";

/// How a session's interactions are executed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// User-visible execution (foreground processes).
    Manual,
    /// Background execution with no user-facing surface.
    Agentic,
}

/// Remote-owned session lifecycle status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Session has pending or in-flight work.
    Active,
    /// All interactions processed successfully.
    Complete,
    /// Remote store marked the session failed.
    Failed,
}

impl SessionStatus {
    /// Whether this status ends the session loop.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

/// Derived classification of a command. Not stored on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandKind {
    /// Plain shell command.
    Shell,
    /// External-agent invocation (prompt in metadata, or the command names
    /// the agent binary).
    Agent,
}

/// A textual instruction plus its metadata map. Immutable once issued.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    /// Shell text or agent binary invocation.
    pub text: String,
    /// Open metadata map; recognized keys are the `META_*` constants.
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
}

impl Command {
    /// Create a command with no metadata.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Whether the command text is empty or whitespace-only (a defined
    /// no-op for every strategy).
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Agent prompt from metadata, if present.
    pub fn prompt(&self) -> Option<&str> {
        self.metadata.get(META_PROMPT).and_then(Value::as_str)
    }

    /// Working-directory override from metadata, if present.
    pub fn cwd(&self) -> Option<&str> {
        self.metadata.get(META_CWD).and_then(Value::as_str)
    }

    /// User-supplied environment pairs from metadata. Non-string values
    /// are skipped.
    pub fn user_env(&self) -> Vec<(String, String)> {
        self.metadata
            .get(META_ENV)
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Child session ids for parallel fan-out, if present.
    pub fn child_session_ids(&self) -> Option<Vec<String>> {
        let list = self.metadata.get(META_CHILD_SESSIONS)?.as_array()?;
        Some(
            list.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
        )
    }

    /// Classify this command. `agent_binary` is the configured name of the
    /// external agent CLI; a command whose first token matches it is
    /// agent-kind even without a prompt in metadata.
    pub fn kind(&self, agent_binary: &str) -> CommandKind {
        if self.prompt().is_some() {
            return CommandKind::Agent;
        }
        match self.text.split_whitespace().next() {
            Some(first) if first == agent_binary => CommandKind::Agent,
            _ => CommandKind::Shell,
        }
    }
}

/// Output of one executor invocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    /// Captured standard output (empty for user-visible strategies).
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Process or stream exit code.
    pub exit_code: i32,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl CommandResult {
    /// The defined result of a blank (empty/whitespace) command.
    pub fn empty() -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: 0,
            duration_ms: 0,
        }
    }

    /// Normalize an internal failure into a failed result. Never used for
    /// validation errors, which surface to the caller instead.
    pub fn failure(message: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            stdout: String::new(),
            stderr: message.into(),
            exit_code: 1,
            duration_ms,
        }
    }

    /// Whether the exit code indicates success.
    pub fn is_ok(&self) -> bool {
        self.exit_code == 0
    }
}

/// Submission status mapped from a result's exit code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    /// Exit code 0.
    Ok,
    /// Nonzero exit code.
    Error,
}

impl From<&CommandResult> for ResultStatus {
    fn from(result: &CommandResult) -> Self {
        if result.is_ok() { Self::Ok } else { Self::Error }
    }
}

/// One unit of work within a session. The id is unique within the session
/// and doubles as the idempotency key across the whole pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interaction {
    /// High-entropy, short-lived identifier.
    pub id: String,
    /// The instruction to execute.
    pub command: Command,
    /// Attached exactly once logically; racing signals may write it twice
    /// physically on the remote side.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<CommandResult>,
}

/// Remote-owned session snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Session identifier.
    pub id: String,
    /// Execution mode for every interaction in this session.
    pub mode: ExecutionMode,
    /// Ordered interactions.
    #[serde(default)]
    pub interactions: Vec<Interaction>,
    /// External-agent conversation handle, once one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Lifecycle status.
    pub status: SessionStatus,
}

impl Session {
    /// The next interaction without a result, if any.
    pub fn next_pending(&self) -> Option<&Interaction> {
        self.interactions.iter().find(|i| i.result.is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn agent_command(prompt: &str) -> Command {
        let mut cmd = Command::new("run the agent");
        let _ = cmd.metadata.insert(META_PROMPT.into(), json!(prompt));
        cmd
    }

    #[test]
    fn blank_detection() {
        assert!(Command::new("").is_blank());
        assert!(Command::new("   \t\n").is_blank());
        assert!(!Command::new("ls").is_blank());
    }

    #[test]
    fn kind_from_prompt_metadata() {
        assert_eq!(agent_command("fix the bug").kind("claude"), CommandKind::Agent);
    }

    #[test]
    fn kind_from_binary_name() {
        assert_eq!(Command::new("claude --resume abc").kind("claude"), CommandKind::Agent);
        assert_eq!(Command::new("cargo test").kind("claude"), CommandKind::Shell);
    }

    #[test]
    fn user_env_skips_non_strings() {
        let mut cmd = Command::new("ls");
        let _ = cmd
            .metadata
            .insert(META_ENV.into(), json!({"FOO": "bar", "N": 3}));
        let env = cmd.user_env();
        assert_eq!(env, vec![("FOO".to_string(), "bar".to_string())]);
    }

    #[test]
    fn child_session_ids_parsed() {
        let mut cmd = Command::new("fan out");
        let _ = cmd
            .metadata
            .insert(META_CHILD_SESSIONS.into(), json!(["a", "b", "c"]));
        assert_eq!(cmd.child_session_ids().unwrap(), vec!["a", "b", "c"]);
        assert!(Command::new("ls").child_session_ids().is_none());
    }

    #[test]
    fn next_pending_skips_completed() {
        let session = Session {
            id: "s1".into(),
            mode: ExecutionMode::Agentic,
            interactions: vec![
                Interaction {
                    id: "i1".into(),
                    command: Command::new("echo done"),
                    result: Some(CommandResult::empty()),
                },
                Interaction {
                    id: "i2".into(),
                    command: Command::new("echo next"),
                    result: None,
                },
            ],
            conversation_id: None,
            status: SessionStatus::Active,
        };
        assert_eq!(session.next_pending().unwrap().id, "i2");
    }

    #[test]
    fn result_status_mapping() {
        assert_eq!(ResultStatus::from(&CommandResult::empty()), ResultStatus::Ok);
        assert_eq!(
            ResultStatus::from(&CommandResult::failure("boom", 10)),
            ResultStatus::Error
        );
    }

    #[test]
    fn terminal_statuses() {
        assert!(!SessionStatus::Active.is_terminal());
        assert!(SessionStatus::Complete.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
    }

    #[test]
    fn session_round_trips_camel_case() {
        let json = json!({
            "id": "s1",
            "mode": "manual",
            "interactions": [],
            "conversationId": "conv-9",
            "status": "active"
        });
        let session: Session = serde_json::from_value(json).unwrap();
        assert_eq!(session.conversation_id.as_deref(), Some("conv-9"));
        assert_eq!(session.mode, ExecutionMode::Manual);
    }
}
