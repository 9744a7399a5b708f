//! `RemoteStore` trait and the HTTP implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use drover_core::events::HookEnvelope;
use drover_core::types::{CommandResult, ResultStatus, Session};

use crate::errors::RemoteError;

/// Result submission body: status plus the produced result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResult {
    /// `ok` for exit code 0, `error` otherwise.
    pub status: ResultStatus,
    /// The executor's output.
    pub result: CommandResult,
    /// Generated message for error submissions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SubmitResult {
    /// Map a command result to its submission, generating an error message
    /// for nonzero exit codes.
    pub fn from_result(result: CommandResult) -> Self {
        let status = ResultStatus::from(&result);
        let message = match status {
            ResultStatus::Ok => None,
            ResultStatus::Error => Some(format!(
                "command exited with code {}",
                result.exit_code
            )),
        };
        Self {
            status,
            result,
            message,
        }
    }
}

/// The remote store surface the runtime consumes.
///
/// Implementations must be safe to share across sessions (`Send + Sync`);
/// the orchestrator holds one behind an `Arc`.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch the session snapshot, including its next pending interaction.
    async fn get_next_command(&self, session_id: &str) -> Result<Session, RemoteError>;

    /// Submit an interaction result. Fire-and-forget from the
    /// orchestrator's perspective; callers log failures and continue.
    async fn submit_result(
        &self,
        session_id: &str,
        interaction_id: &str,
        submission: SubmitResult,
    ) -> Result<(), RemoteError>;

    /// Forward a raw signal (agent stream event or hook delivery) to the
    /// remote event sink.
    async fn post_event(&self, envelope: HookEnvelope) -> Result<(), RemoteError>;
}

/// Production client backed by `reqwest`.
pub struct HttpRemoteStore {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpRemoteStore {
    /// Create a client against the given base URL with a bearer token.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn get_next_command(&self, session_id: &str) -> Result<Session, RemoteError> {
        let url = self.url(&format!("/sessions/{session_id}/next"));
        debug!(session_id, %url, "fetching next command");
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(RemoteError::Status {
                code: response.status().as_u16(),
            });
        }
        Ok(response.json::<Session>().await?)
    }

    async fn submit_result(
        &self,
        session_id: &str,
        interaction_id: &str,
        submission: SubmitResult,
    ) -> Result<(), RemoteError> {
        let url = self.url(&format!(
            "/sessions/{session_id}/interactions/{interaction_id}/result"
        ));
        debug!(session_id, interaction_id, status = ?submission.status, "submitting result");
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&submission)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(RemoteError::Status {
                code: response.status().as_u16(),
            });
        }
        Ok(())
    }

    async fn post_event(&self, envelope: HookEnvelope) -> Result<(), RemoteError> {
        let url = self.url(&format!(
            "/sessions/{}/interactions/{}/events",
            envelope.session_id, envelope.interaction_id
        ));
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&envelope)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(RemoteError::Status {
                code: response.status().as_u16(),
            });
        }
        Ok(())
    }
}
