//! Runtime configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default bounded wait for a hook delivery after process exit.
pub const DEFAULT_HOOK_TIMEOUT_SECS: u64 = 30;

fn default_agent_binary() -> String {
    "claude".to_string()
}

fn default_hook_timeout_secs() -> u64 {
    DEFAULT_HOOK_TIMEOUT_SECS
}

/// Configuration for one runner instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    /// Remote store base URL.
    pub api_base_url: String,
    /// Bearer token handed to spawned processes so hook scripts can call
    /// the remote store directly.
    pub api_token: String,
    /// Fallback working directory for spawned commands.
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,
    /// Name of the external agent CLI.
    #[serde(default = "default_agent_binary")]
    pub agent_binary: String,
    /// Bounded wait for a hook delivery, in seconds.
    #[serde(default = "default_hook_timeout_secs")]
    pub hook_timeout_secs: u64,
}

impl RuntimeConfig {
    /// Configuration with defaults for everything but the remote endpoint.
    pub fn new(api_base_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            api_token: api_token.into(),
            workspace_root: None,
            agent_binary: default_agent_binary(),
            hook_timeout_secs: default_hook_timeout_secs(),
        }
    }

    /// Read configuration from `DROVER_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::new(
            std::env::var("DROVER_API_URL").unwrap_or_default(),
            std::env::var("DROVER_API_TOKEN").unwrap_or_default(),
        );
        if let Ok(root) = std::env::var("DROVER_WORKSPACE_ROOT") {
            config.workspace_root = Some(PathBuf::from(root));
        }
        if let Ok(binary) = std::env::var("DROVER_AGENT_BINARY") {
            config.agent_binary = binary;
        }
        if let Some(secs) = std::env::var("DROVER_HOOK_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.hook_timeout_secs = secs;
        }
        config
    }

    /// Hook-delivery wait window.
    pub fn hook_timeout(&self) -> Duration {
        Duration::from_secs(self.hook_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_applied_on_deserialize() {
        let config: RuntimeConfig = serde_json::from_str(
            r#"{"apiBaseUrl": "http://localhost:4000", "apiToken": "tok"}"#,
        )
        .unwrap();
        assert_eq!(config.agent_binary, "claude");
        assert_eq!(config.hook_timeout(), Duration::from_secs(30));
        assert!(config.workspace_root.is_none());
    }

    #[test]
    fn new_fills_defaults() {
        let config = RuntimeConfig::new("http://x", "t");
        assert_eq!(config.hook_timeout_secs, DEFAULT_HOOK_TIMEOUT_SECS);
    }
}
