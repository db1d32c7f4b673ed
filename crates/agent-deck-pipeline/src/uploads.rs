//! Registry of files uploaded to remote hosts per session.
//!
//! Drag-and-dropped files are copied to the remote host so the tool in the
//! pane can read them. They are tracked here and deleted, best effort, when
//! the session's pipeline is torn down.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::{debug, warn};

use agent_deck_mux::{quote::compose_remote_command, SshBridge};

/// A file that was uploaded for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Host the file was uploaded to
    pub host_id: String,
    /// Absolute path on that host
    pub remote_path: String,
}

/// Process-wide registry of uploaded files, keyed by session id.
#[derive(Default)]
pub struct UploadedFileRegistry {
    files: Mutex<HashMap<String, Vec<UploadedFile>>>,
}

impl UploadedFileRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an uploaded file for a session.
    pub fn register(&self, session_id: &str, host_id: &str, remote_path: &str) {
        self.files
            .lock()
            .unwrap()
            .entry(session_id.to_string())
            .or_default()
            .push(UploadedFile {
                host_id: host_id.to_string(),
                remote_path: remote_path.to_string(),
            });
    }

    /// Files currently tracked for a session.
    pub fn files_for(&self, session_id: &str) -> Vec<UploadedFile> {
        self.files
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Remove and return a session's files.
    pub fn take(&self, session_id: &str) -> Vec<UploadedFile> {
        self.files
            .lock()
            .unwrap()
            .remove(session_id)
            .unwrap_or_default()
    }

    /// Delete a session's uploaded files on their hosts, best effort, and
    /// clear the session's entry either way.
    pub async fn cleanup_session(&self, bridge: Option<&dyn SshBridge>, session_id: &str) {
        let files = self.take(session_id);
        if files.is_empty() {
            return;
        }
        let Some(bridge) = bridge else {
            debug!(session_id, "no bridge, dropping upload records");
            return;
        };

        for file in files {
            let command = match compose_remote_command(
                "rm",
                &["-f".to_string(), file.remote_path.clone()],
            ) {
                Ok(command) => command,
                Err(e) => {
                    warn!(path = %file.remote_path, "skipping unsafe cleanup path: {e}");
                    continue;
                }
            };
            if let Err(e) = bridge.run_command(&file.host_id, &command).await {
                debug!(host = %file.host_id, path = %file.remote_path, "upload cleanup failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_deck_mux::bridge::testing::ScriptedBridge;

    #[test]
    fn test_register_and_take() {
        let registry = UploadedFileRegistry::new();
        registry.register("s1", "devbox", "/tmp/upload-1.png");
        registry.register("s1", "devbox", "/tmp/upload-2.png");
        registry.register("s2", "other", "/tmp/upload-3.png");

        assert_eq!(registry.files_for("s1").len(), 2);
        assert_eq!(registry.take("s1").len(), 2);
        assert!(registry.files_for("s1").is_empty());
        assert_eq!(registry.files_for("s2").len(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_issues_remote_deletes() {
        let registry = UploadedFileRegistry::new();
        registry.register("s1", "devbox", "/tmp/upload-1.png");

        let bridge = ScriptedBridge::new();
        registry.cleanup_session(Some(&bridge), "s1").await;

        let recorded = bridge.recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].0, "devbox");
        assert_eq!(recorded[0].1, "rm -f /tmp/upload-1.png");
        assert!(registry.files_for("s1").is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_skips_unsafe_paths() {
        let registry = UploadedFileRegistry::new();
        registry.register("s1", "devbox", "/tmp/x; rm -rf /");

        let bridge = ScriptedBridge::new();
        registry.cleanup_session(Some(&bridge), "s1").await;
        assert!(bridge.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_without_bridge_clears_records() {
        let registry = UploadedFileRegistry::new();
        registry.register("s1", "devbox", "/tmp/a");
        registry.cleanup_session(None, "s1").await;
        assert!(registry.files_for("s1").is_empty());
    }
}
