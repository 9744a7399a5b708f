//! Remote-client error types.

use thiserror::Error;

/// Failures talking to the remote store.
///
/// Callers decide severity: `get_next_command` failures surface, while
/// `submit_result` / `post_event` failures are logged and execution
/// continues.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Connection / request-level failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success HTTP status.
    #[error("remote store returned status {code}")]
    Status {
        /// HTTP status code.
        code: u16,
    },

    /// Response body did not decode into the expected shape.
    #[error("failed to decode remote response: {0}")]
    Decode(#[from] serde_json::Error),
}
