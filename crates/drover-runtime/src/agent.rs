//! Embedded agent client.
//!
//! [`AgentClient`] is the seam the background-agent strategy drives: hand
//! it a prompt, get back a stream of decoded [`AgentEvent`]s. The
//! production implementation shells out to the agent CLI in streaming-JSON
//! mode and decodes its NDJSON output at the boundary; tests substitute a
//! scripted stream.

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use drover_core::events::AgentEvent;

/// Options for one embedded agent run.
#[derive(Clone, Debug, Default)]
pub struct AgentRunOptions {
    /// The prompt to execute.
    pub prompt: String,
    /// Working directory for the run.
    pub cwd: Option<PathBuf>,
    /// Conversation handle to resume, if the session has one.
    pub resume: Option<String>,
}

/// Streaming embedded-agent invocation.
///
/// Tool use is auto-approved by policy: the background strategy has no
/// user to ask.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AgentClient: Send + Sync {
    /// Start a run and return its event stream. A start failure is an
    /// `io::Error`; the caller normalizes it into a failed result.
    async fn run(&self, opts: AgentRunOptions) -> io::Result<BoxStream<'static, AgentEvent>>;
}

/// Production client shelling out to the agent CLI with
/// `--output-format stream-json`.
pub struct CliAgentClient {
    binary: String,
}

impl CliAgentClient {
    /// Client for the given agent binary name.
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl AgentClient for CliAgentClient {
    async fn run(&self, opts: AgentRunOptions) -> io::Result<BoxStream<'static, AgentEvent>> {
        let mut cmd = tokio::process::Command::new(&self.binary);
        let _ = cmd
            .arg("-p")
            .arg(&opts.prompt)
            .arg("--output-format")
            .arg("stream-json")
            .arg("--verbose")
            .arg("--dangerously-skip-permissions")
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null());
        if let Some(handle) = &opts.resume {
            let _ = cmd.arg("--resume").arg(handle);
        }
        if let Some(cwd) = &opts.cwd {
            let _ = cmd.current_dir(cwd);
        }

        debug!(binary = %self.binary, "starting embedded agent run");
        let mut child = cmd.spawn()?;
        let stdout = child.stdout.take().ok_or_else(|| {
            io::Error::other("agent process has no stdout pipe")
        })?;

        let stream = async_stream::stream! {
            let mut lines = BufReader::new(stdout).lines();
            let mut saw_terminal = false;
            while let Ok(Some(line)) = lines.next_line().await {
                for event in decode_line(&line) {
                    if matches!(event, AgentEvent::TerminalResult { .. }) {
                        saw_terminal = true;
                    }
                    yield event;
                }
            }
            let status = child.wait().await;
            if !saw_terminal {
                let failed = !status.map(|s| s.success()).unwrap_or(false);
                yield AgentEvent::TerminalResult {
                    is_error: failed,
                    subtype: failed.then(|| "abnormal_exit".to_string()),
                    result: None,
                };
            }
        };
        Ok(stream.boxed())
    }
}

/// Decode one NDJSON line of agent output into protocol events.
///
/// Unknown line shapes are skipped with a warning; the stream keeps going.
fn decode_line(line: &str) -> Vec<AgentEvent> {
    if line.trim().is_empty() {
        return Vec::new();
    }
    let value: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(error) => {
            warn!(%error, "skipping undecodable agent output line");
            return Vec::new();
        }
    };
    match value.get("type").and_then(Value::as_str) {
        Some("assistant") => decode_assistant(&value),
        Some("result") => vec![decode_result(&value)],
        Some("system") => decode_system(&value),
        _ => Vec::new(),
    }
}

fn decode_assistant(value: &Value) -> Vec<AgentEvent> {
    let mut events = Vec::new();
    let blocks = value
        .pointer("/message/content")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for block in blocks {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => {
                if let Some(text) = block.get("text").and_then(Value::as_str) {
                    events.push(AgentEvent::AssistantText {
                        text: text.to_string(),
                    });
                }
            }
            Some("tool_use") => {
                events.push(AgentEvent::ToolInvocation {
                    tool_name: block
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    tool_input: block.get("input").cloned().unwrap_or(Value::Null),
                });
            }
            _ => {}
        }
    }
    events
}

fn decode_result(value: &Value) -> AgentEvent {
    let subtype = value
        .get("subtype")
        .and_then(Value::as_str)
        .map(str::to_string);
    let is_error = value
        .get("is_error")
        .and_then(Value::as_bool)
        .unwrap_or_else(|| {
            subtype
                .as_deref()
                .is_some_and(|s| s.starts_with("error"))
        });
    AgentEvent::TerminalResult {
        is_error,
        subtype,
        result: value
            .get("result")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

fn decode_system(value: &Value) -> Vec<AgentEvent> {
    if value.get("subtype").and_then(Value::as_str) == Some("init") {
        if let Some(id) = value.get("session_id").and_then(Value::as_str) {
            return vec![AgentEvent::ConversationHandle {
                conversation_id: id.to_string(),
            }];
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_assistant_text_and_tool_use() {
        let line = json!({
            "type": "assistant",
            "message": { "content": [
                { "type": "text", "text": "working on it" },
                { "type": "tool_use", "name": "Bash", "input": {"command": "ls"} }
            ]}
        })
        .to_string();
        let events = decode_line(&line);
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            AgentEvent::AssistantText {
                text: "working on it".into()
            }
        );
        assert_eq!(
            events[1],
            AgentEvent::ToolInvocation {
                tool_name: "Bash".into(),
                tool_input: json!({"command": "ls"}),
            }
        );
    }

    #[test]
    fn decodes_success_result() {
        let line = json!({
            "type": "result",
            "subtype": "success",
            "is_error": false,
            "result": "all done"
        })
        .to_string();
        assert_eq!(
            decode_line(&line),
            vec![AgentEvent::TerminalResult {
                is_error: false,
                subtype: Some("success".into()),
                result: Some("all done".into()),
            }]
        );
    }

    #[test]
    fn error_subtype_implies_error_without_flag() {
        let line = json!({"type": "result", "subtype": "error_max_turns"}).to_string();
        match &decode_line(&line)[0] {
            AgentEvent::TerminalResult { is_error, subtype, .. } => {
                assert!(is_error);
                assert_eq!(subtype.as_deref(), Some("error_max_turns"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn decodes_conversation_handle_from_init() {
        let line = json!({
            "type": "system",
            "subtype": "init",
            "session_id": "conv-42"
        })
        .to_string();
        assert_eq!(
            decode_line(&line),
            vec![AgentEvent::ConversationHandle {
                conversation_id: "conv-42".into()
            }]
        );
    }

    #[test]
    fn skips_noise_lines() {
        assert!(decode_line("").is_empty());
        assert!(decode_line("not json").is_empty());
        assert!(decode_line(r#"{"type": "user", "message": {}}"#).is_empty());
    }
}
