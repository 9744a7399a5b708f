//! Per-session temporary resource manager.
//!
//! Owns a scratch directory for files a session needs on disk (prompt
//! files, hook scripts) and composes the environment handed to spawned
//! processes. Exclusively owned by one session; dropped during session
//! cleanup, which removes the directory.

use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tempfile::TempDir;
use tracing::debug;

use drover_core::types::Command;

use crate::config::RuntimeConfig;

/// Environment variable carrying the session id.
pub const ENV_SESSION_ID: &str = "DROVER_SESSION_ID";
/// Environment variable carrying the remote API base URL.
pub const ENV_API_URL: &str = "DROVER_API_URL";
/// Environment variable carrying the remote API token.
pub const ENV_API_TOKEN: &str = "DROVER_API_TOKEN";
/// Environment variable carrying the callback URL (interactive agent only).
pub const ENV_CALLBACK_URL: &str = "DROVER_CALLBACK_URL";

const RESERVED: [&str; 4] = [ENV_SESSION_ID, ENV_API_URL, ENV_API_TOKEN, ENV_CALLBACK_URL];

/// Scratch files and spawn-environment composition for one session.
pub struct ScratchSpace {
    session_id: String,
    dir: TempDir,
    files: Mutex<Vec<PathBuf>>,
}

impl ScratchSpace {
    /// Create the session's scratch directory.
    pub fn new(session_id: impl Into<String>) -> io::Result<Self> {
        let session_id = session_id.into();
        let dir = tempfile::Builder::new()
            .prefix(&format!("drover-{session_id}-"))
            .tempdir()?;
        debug!(session_id, path = %dir.path().display(), "scratch directory created");
        Ok(Self {
            session_id,
            dir,
            files: Mutex::new(Vec::new()),
        })
    }

    /// The scratch directory path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a tracked scratch file and return its path.
    pub fn create_file(&self, name: &str, contents: &str) -> io::Result<PathBuf> {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents)?;
        self.files.lock().push(path.clone());
        Ok(path)
    }

    /// Paths of files created so far.
    pub fn tracked_files(&self) -> Vec<PathBuf> {
        self.files.lock().clone()
    }

    /// Compose the environment for a spawned process: reserved `DROVER_*`
    /// names first, then user-supplied pairs from command metadata. User
    /// pairs never override the reserved names.
    pub fn spawn_env(
        &self,
        config: &RuntimeConfig,
        command: &Command,
        callback_url: Option<&str>,
    ) -> Vec<(String, String)> {
        let mut env = vec![
            (ENV_SESSION_ID.to_string(), self.session_id.clone()),
            (ENV_API_URL.to_string(), config.api_base_url.clone()),
            (ENV_API_TOKEN.to_string(), config.api_token.clone()),
        ];
        if let Some(url) = callback_url {
            env.push((ENV_CALLBACK_URL.to_string(), url.to_string()));
        }
        for (key, value) in command.user_env() {
            if RESERVED.contains(&key.as_str()) {
                continue;
            }
            env.push((key, value));
        }
        env
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> RuntimeConfig {
        RuntimeConfig::new("http://localhost:4000", "secret")
    }

    #[test]
    fn creates_and_tracks_files() {
        let scratch = ScratchSpace::new("s1").unwrap();
        let path = scratch.create_file("prompt.md", "do the thing").unwrap();
        assert!(path.exists());
        assert_eq!(scratch.tracked_files(), vec![path]);
    }

    #[test]
    fn directory_removed_on_drop() {
        let scratch = ScratchSpace::new("s1").unwrap();
        let path = scratch.path().to_path_buf();
        assert!(path.exists());
        drop(scratch);
        assert!(!path.exists());
    }

    #[test]
    fn spawn_env_includes_reserved_names() {
        let scratch = ScratchSpace::new("s1").unwrap();
        let env = scratch.spawn_env(&config(), &Command::new("ls"), Some("http://127.0.0.1:9/hooks/i1"));
        let lookup = |k: &str| env.iter().find(|(key, _)| key == k).map(|(_, v)| v.as_str());
        assert_eq!(lookup(ENV_SESSION_ID), Some("s1"));
        assert_eq!(lookup(ENV_API_TOKEN), Some("secret"));
        assert_eq!(lookup(ENV_CALLBACK_URL), Some("http://127.0.0.1:9/hooks/i1"));
    }

    #[test]
    fn callback_url_omitted_when_absent() {
        let scratch = ScratchSpace::new("s1").unwrap();
        let env = scratch.spawn_env(&config(), &Command::new("ls"), None);
        assert!(env.iter().all(|(k, _)| k != ENV_CALLBACK_URL));
    }

    #[test]
    fn user_env_cannot_override_reserved() {
        let scratch = ScratchSpace::new("s1").unwrap();
        let mut command = Command::new("ls");
        let _ = command.metadata.insert(
            "env".into(),
            json!({"DROVER_API_TOKEN": "stolen", "EXTRA": "1"}),
        );
        let env = scratch.spawn_env(&config(), &command, None);
        let tokens: Vec<_> = env
            .iter()
            .filter(|(k, _)| k == ENV_API_TOKEN)
            .map(|(_, v)| v.as_str())
            .collect();
        assert_eq!(tokens, vec!["secret"]);
        assert!(env.contains(&("EXTRA".to_string(), "1".to_string())));
    }
}
