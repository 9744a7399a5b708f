//! Event types crossing the runner's boundaries.
//!
//! Three event families:
//!
//! - **[`AgentEvent`]**: decoded embedded-agent stream events (assistant
//!   text, tool activity, terminal result, conversation handle). Decoded
//!   into a tagged union at the boundary rather than carried as open JSON.
//! - **[`ServerNotification`]**: the remote store's push-channel messages.
//!   Both variants must be treated as safely re-deliverable.
//! - **[`RunnerEvent`]**: local lifecycle broadcast for an embedding UI;
//!   transient, never persisted.
//!
//! [`HookEnvelope`] is the normalized wrapper the callback bridge puts
//! around a raw hook payload before forwarding it to the remote event sink.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{ResultStatus, Session};

// ─────────────────────────────────────────────────────────────────────────────
// AgentEvent — embedded agent stream events
// ─────────────────────────────────────────────────────────────────────────────

/// Events decoded from an embedded agent's output stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AgentEvent {
    /// Assistant-authored text; appended to the result's stdout.
    #[serde(rename = "assistant_text")]
    AssistantText {
        /// Text fragment.
        text: String,
    },

    /// The agent invoked a tool.
    #[serde(rename = "tool_invocation")]
    ToolInvocation {
        /// Tool name.
        #[serde(rename = "toolName")]
        tool_name: String,
        /// Tool input, carried opaquely.
        #[serde(rename = "toolInput")]
        tool_input: Value,
    },

    /// A tool finished.
    #[serde(rename = "tool_result")]
    ToolResult {
        /// Tool name.
        #[serde(rename = "toolName")]
        tool_name: String,
        /// Tool output, carried opaquely.
        output: Value,
        /// Whether the tool reported an error.
        #[serde(rename = "isError", default)]
        is_error: bool,
    },

    /// Terminal event closing the stream; determines the exit code.
    #[serde(rename = "terminal_result")]
    TerminalResult {
        /// Whether the run failed.
        #[serde(rename = "isError")]
        is_error: bool,
        /// Failure subtype (e.g. `error_max_turns`), when failed.
        #[serde(skip_serializing_if = "Option::is_none")]
        subtype: Option<String>,
        /// Final result text, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<String>,
    },

    /// The agent reported its conversation handle.
    #[serde(rename = "conversation_handle")]
    ConversationHandle {
        /// External conversation id for later resumption.
        #[serde(rename = "conversationId")]
        conversation_id: String,
    },
}

impl AgentEvent {
    /// Stable event-type string, used as the `eventType` field when the
    /// event is forwarded to the remote sink.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::AssistantText { .. } => "assistant_text",
            Self::ToolInvocation { .. } => "tool_invocation",
            Self::ToolResult { .. } => "tool_result",
            Self::TerminalResult { .. } => "terminal_result",
            Self::ConversationHandle { .. } => "conversation_handle",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HookEnvelope — normalized hook forwarding
// ─────────────────────────────────────────────────────────────────────────────

/// Wrapper the callback bridge puts around a raw hook payload before
/// forwarding it to the remote event sink. The payload itself stays opaque.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookEnvelope {
    /// Session the delivery belongs to.
    pub session_id: String,
    /// Interaction the delivery was correlated to.
    pub interaction_id: String,
    /// Event-type label.
    pub event_type: String,
    /// Raw hook payload, forwarded unmodified.
    pub event_data: Value,
    /// ISO 8601 receipt timestamp.
    pub timestamp: String,
}

impl HookEnvelope {
    /// Wrap a raw hook payload with correlation metadata and the current
    /// UTC timestamp.
    pub fn wrap(
        session_id: impl Into<String>,
        interaction_id: impl Into<String>,
        event_type: impl Into<String>,
        event_data: Value,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            interaction_id: interaction_id.into(),
            event_type: event_type.into(),
            event_data,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ServerNotification — remote push channel
// ─────────────────────────────────────────────────────────────────────────────

/// Notifications produced by the remote store's push channel.
///
/// Delivery may be duplicated or reordered; handlers must be idempotent on
/// (session id, interaction id).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerNotification {
    /// Session snapshot changed (status, conversation handle, interactions).
    #[serde(rename = "session_updated")]
    SessionUpdated {
        /// Fresh snapshot.
        session: Session,
    },

    /// The remote store finished processing an interaction. Authoritative
    /// "globally done" signal.
    #[serde(rename = "interaction_completed")]
    InteractionCompleted {
        /// Session id.
        #[serde(rename = "sessionId")]
        session_id: String,
        /// Interaction id.
        #[serde(rename = "interactionId")]
        interaction_id: String,
        /// Final status the store recorded.
        status: ResultStatus,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// RunnerEvent — local lifecycle broadcast
// ─────────────────────────────────────────────────────────────────────────────

/// Local lifecycle events broadcast by the orchestrator for embedding UIs.
/// Transient; lagging subscribers are dropped rather than blocking the
/// runner.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunnerEvent {
    /// An executor call started.
    ExecutionStarted {
        /// Session id.
        #[serde(rename = "sessionId")]
        session_id: String,
        /// Interaction id.
        #[serde(rename = "interactionId")]
        interaction_id: String,
    },
    /// An executor call returned.
    ExecutionFinished {
        /// Session id.
        #[serde(rename = "sessionId")]
        session_id: String,
        /// Interaction id.
        #[serde(rename = "interactionId")]
        interaction_id: String,
        /// Exit code of the produced result.
        #[serde(rename = "exitCode")]
        exit_code: i32,
    },
    /// Session resources were released.
    SessionClosed {
        /// Session id.
        #[serde(rename = "sessionId")]
        session_id: String,
    },
}

impl RunnerEvent {
    /// Session the event belongs to.
    pub fn session_id(&self) -> &str {
        match self {
            Self::ExecutionStarted { session_id, .. }
            | Self::ExecutionFinished { session_id, .. }
            | Self::SessionClosed { session_id } => session_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn agent_event_decodes_terminal_result() {
        let event: AgentEvent = serde_json::from_value(json!({
            "type": "terminal_result",
            "isError": true,
            "subtype": "error_max_turns"
        }))
        .unwrap();
        match event {
            AgentEvent::TerminalResult { is_error, subtype, result } => {
                assert!(is_error);
                assert_eq!(subtype.as_deref(), Some("error_max_turns"));
                assert!(result.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn agent_event_type_labels() {
        let event = AgentEvent::AssistantText { text: "hi".into() };
        assert_eq!(event.event_type(), "assistant_text");
        let event = AgentEvent::ConversationHandle {
            conversation_id: "c1".into(),
        };
        assert_eq!(event.event_type(), "conversation_handle");
    }

    #[test]
    fn hook_envelope_preserves_payload() {
        let payload = json!({"hookEvent": "Stop", "custom": [1, 2]});
        let envelope = HookEnvelope::wrap("s1", "i1", "hook", payload.clone());
        assert_eq!(envelope.event_data, payload);
        assert_eq!(envelope.session_id, "s1");
        assert!(!envelope.timestamp.is_empty());
    }

    #[test]
    fn notification_decodes_interaction_completed() {
        let notification: ServerNotification = serde_json::from_value(json!({
            "type": "interaction_completed",
            "sessionId": "s1",
            "interactionId": "i1",
            "status": "ok"
        }))
        .unwrap();
        match notification {
            ServerNotification::InteractionCompleted {
                session_id,
                interaction_id,
                status,
            } => {
                assert_eq!(session_id, "s1");
                assert_eq!(interaction_id, "i1");
                assert_eq!(status, ResultStatus::Ok);
            }
            other => panic!("unexpected notification: {other:?}"),
        }
    }

    #[test]
    fn runner_event_session_id_accessor() {
        let event = RunnerEvent::ExecutionFinished {
            session_id: "s9".into(),
            interaction_id: "i3".into(),
            exit_code: 0,
        };
        assert_eq!(event.session_id(), "s9");
    }
}
