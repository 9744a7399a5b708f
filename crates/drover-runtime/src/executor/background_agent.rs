//! Background agent strategy: embedded streaming call.
//!
//! Consumes the agent event stream by concept: assistant text accumulates
//! into stdout, the terminal result determines the exit code, and every
//! event is forwarded best-effort to the remote event sink.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, warn};

use drover_core::events::{AgentEvent, HookEnvelope};
use drover_core::types::{CommandKind, CommandResult, Interaction, Session};

use crate::agent::{AgentClient, AgentRunOptions};
use crate::errors::RuntimeError;
use crate::executor::background_shell::elapsed_ms;
use crate::executor::{resolve_cwd, validate_kind, Executor};
use crate::resources::SessionResources;

/// Embedded agent execution with event forwarding.
pub struct BackgroundAgent {
    resources: Arc<SessionResources>,
    agent: Arc<dyn AgentClient>,
}

impl BackgroundAgent {
    /// Strategy backed by the shared session resources and an agent client.
    pub fn new(resources: Arc<SessionResources>, agent: Arc<dyn AgentClient>) -> Self {
        Self { resources, agent }
    }

    async fn forward(&self, session_id: &str, interaction_id: &str, event: &AgentEvent) {
        let payload = match serde_json::to_value(event) {
            Ok(v) => v,
            Err(error) => {
                warn!(session_id, interaction_id, %error, "failed to serialize agent event");
                return;
            }
        };
        let envelope =
            HookEnvelope::wrap(session_id, interaction_id, event.event_type(), payload);
        if let Err(error) = self.resources.remote().post_event(envelope).await {
            warn!(
                session_id,
                interaction_id,
                %error,
                "failed to forward agent event to remote sink"
            );
        }
    }
}

#[async_trait]
impl Executor for BackgroundAgent {
    async fn execute(
        &self,
        session_id: &str,
        interaction: &Interaction,
        session: &Session,
    ) -> Result<CommandResult, RuntimeError> {
        if interaction.command.is_blank() {
            return Ok(CommandResult::empty());
        }
        let config = self.resources.config();
        validate_kind(CommandKind::Agent, interaction, config)?;

        let start = Instant::now();
        let prompt = interaction
            .command
            .prompt()
            .unwrap_or(&interaction.command.text)
            .to_string();
        let opts = AgentRunOptions {
            prompt,
            cwd: Some(resolve_cwd(config, interaction)),
            resume: session.conversation_id.clone(),
        };

        debug!(session_id, interaction_id = %interaction.id, "starting background agent run");
        let mut stream = match self.agent.run(opts).await {
            Ok(stream) => stream,
            Err(error) => {
                return Ok(CommandResult::failure(
                    format!("failed to start agent: {error}"),
                    elapsed_ms(start),
                ));
            }
        };

        let mut stdout = String::new();
        let mut terminal: Option<(bool, Option<String>, Option<String>)> = None;
        while let Some(event) = stream.next().await {
            self.forward(session_id, &interaction.id, &event).await;
            match event {
                AgentEvent::AssistantText { text } => {
                    stdout.push_str(&text);
                    stdout.push('\n');
                }
                AgentEvent::TerminalResult {
                    is_error,
                    subtype,
                    result,
                } => {
                    terminal = Some((is_error, subtype, result));
                }
                AgentEvent::ToolInvocation { .. }
                | AgentEvent::ToolResult { .. }
                | AgentEvent::ConversationHandle { .. } => {}
            }
        }

        let duration_ms = elapsed_ms(start);
        let Some((is_error, subtype, result)) = terminal else {
            return Ok(CommandResult::failure(
                "agent stream ended without a terminal result",
                duration_ms,
            ));
        };

        if stdout.is_empty() {
            if let Some(text) = &result {
                stdout.push_str(text);
            }
        }
        let stderr = if is_error {
            subtype.unwrap_or_else(|| "agent run failed".to_string())
        } else {
            String::new()
        };

        debug!(
            session_id,
            interaction_id = %interaction.id,
            is_error,
            duration_ms,
            "background agent run completed"
        );

        Ok(CommandResult {
            stdout,
            stderr,
            exit_code: i32::from(is_error),
            duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::MockAgentClient;
    use crate::config::RuntimeConfig;
    use crate::executor::testsupport::{agent_interaction, interaction, session};
    use assert_matches::assert_matches;
    use drover_core::types::ExecutionMode;
    use drover_remote::testutil::RecordingStore;
    use drover_remote::RemoteStore;
    use futures::stream;

    fn harness(events: Vec<AgentEvent>) -> (BackgroundAgent, Arc<RecordingStore>) {
        let store = Arc::new(RecordingStore::new());
        let config = Arc::new(RuntimeConfig::new("http://localhost:4000", "tok"));
        let resources = Arc::new(SessionResources::new(
            config,
            Arc::clone(&store) as Arc<dyn RemoteStore>,
        ));
        let mut agent = MockAgentClient::new();
        let _ = agent
            .expect_run()
            .returning(move |_| Ok(stream::iter(events.clone()).boxed()));
        (
            BackgroundAgent::new(resources, Arc::new(agent)),
            store,
        )
    }

    fn agentic_session() -> Session {
        session("s1", ExecutionMode::Agentic, vec![])
    }

    #[tokio::test]
    async fn assistant_text_accumulates_into_stdout() {
        let (executor, store) = harness(vec![
            AgentEvent::AssistantText { text: "step one".into() },
            AgentEvent::AssistantText { text: "step two".into() },
            AgentEvent::TerminalResult {
                is_error: false,
                subtype: Some("success".into()),
                result: None,
            },
        ]);
        let result = executor
            .execute("s1", &agent_interaction("i1", "do it"), &agentic_session())
            .await
            .unwrap();
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "step one\nstep two\n");
        // Every event was forwarded to the remote sink.
        assert_eq!(store.events().len(), 3);
        assert_eq!(store.events()[0].event_type, "assistant_text");
        assert_eq!(store.events()[2].event_type, "terminal_result");
    }

    #[tokio::test]
    async fn error_terminal_result_sets_exit_code() {
        let (executor, _) = harness(vec![AgentEvent::TerminalResult {
            is_error: true,
            subtype: Some("error_max_turns".into()),
            result: None,
        }]);
        let result = executor
            .execute("s1", &agent_interaction("i1", "do it"), &agentic_session())
            .await
            .unwrap();
        assert_eq!(result.exit_code, 1);
        assert_eq!(result.stderr, "error_max_turns");
    }

    #[tokio::test]
    async fn forwarding_failure_does_not_abort_the_stream() {
        let (executor, store) = harness(vec![
            AgentEvent::AssistantText { text: "hello".into() },
            AgentEvent::TerminalResult {
                is_error: false,
                subtype: None,
                result: None,
            },
        ]);
        store.fail_events(true);
        let result = executor
            .execute("s1", &agent_interaction("i1", "do it"), &agentic_session())
            .await
            .unwrap();
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "hello\n");
    }

    #[tokio::test]
    async fn terminal_result_text_used_when_no_assistant_text() {
        let (executor, _) = harness(vec![AgentEvent::TerminalResult {
            is_error: false,
            subtype: Some("success".into()),
            result: Some("final answer".into()),
        }]);
        let result = executor
            .execute("s1", &agent_interaction("i1", "do it"), &agentic_session())
            .await
            .unwrap();
        assert_eq!(result.stdout, "final answer");
    }

    #[tokio::test]
    async fn missing_terminal_result_is_a_failure() {
        let (executor, _) = harness(vec![AgentEvent::AssistantText { text: "…".into() }]);
        let result = executor
            .execute("s1", &agent_interaction("i1", "do it"), &agentic_session())
            .await
            .unwrap();
        assert_eq!(result.exit_code, 1);
        assert!(result.stderr.contains("terminal result"));
    }

    #[tokio::test]
    async fn spawn_failure_is_normalized() {
        let store = Arc::new(RecordingStore::new());
        let config = Arc::new(RuntimeConfig::new("http://localhost:4000", "tok"));
        let resources = Arc::new(SessionResources::new(
            config,
            store as Arc<dyn RemoteStore>,
        ));
        let mut agent = MockAgentClient::new();
        let _ = agent
            .expect_run()
            .returning(|_| Err(std::io::Error::other("no such binary")));
        let executor = BackgroundAgent::new(resources, Arc::new(agent));

        let result = executor
            .execute("s1", &agent_interaction("i1", "do it"), &agentic_session())
            .await
            .unwrap();
        assert_eq!(result.exit_code, 1);
        assert!(result.stderr.contains("no such binary"));
    }

    #[tokio::test]
    async fn shell_command_is_a_contract_violation() {
        let (executor, _) = harness(vec![]);
        let err = executor
            .execute("s1", &interaction("i1", "echo hi"), &agentic_session())
            .await
            .unwrap_err();
        assert_matches!(err, RuntimeError::WrongCommandKind { .. });
    }
}
