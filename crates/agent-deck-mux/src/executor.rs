//! Command execution seam: local subprocess vs remote shell string.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use agent_deck_core::{Error, Result};

use crate::bridge::SshBridge;
use crate::quote::compose_remote_command;

/// Directories probed for the multiplexer binary when PATH lookup fails.
/// Homebrew on Apple Silicon installs outside the default GUI-app PATH.
const FALLBACK_DIRS: &[&str] = &["/opt/homebrew/bin", "/usr/local/bin", "/usr/bin"];

/// Locate the tmux binary: PATH entries first, then the fallback
/// directories, then the bare name.
pub fn locate_tmux() -> PathBuf {
    if let Ok(path_var) = std::env::var("PATH") {
        for dir in std::env::split_paths(&path_var) {
            let candidate = dir.join("tmux");
            if candidate.is_file() {
                return candidate;
            }
        }
    }
    for dir in FALLBACK_DIRS {
        let candidate = PathBuf::from(dir).join("tmux");
        if candidate.is_file() {
            return candidate;
        }
    }
    warn!("tmux binary not found in PATH or fallback dirs, using bare name");
    PathBuf::from("tmux")
}

/// Executes multiplexer commands either as local subprocesses or as shell
/// strings routed through the SSH bridge.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run tmux with `args`, returning stdout. Non-zero exit is an error.
    async fn run(&self, args: &[String]) -> Result<String>;

    /// Run tmux with `args`, returning only whether it succeeded.
    async fn run_ok(&self, args: &[String]) -> bool;

    /// Whether commands cross a host boundary.
    fn is_remote(&self) -> bool;
}

/// Local executor: spawns the tmux binary directly.
pub struct LocalExecutor {
    tmux_bin: PathBuf,
}

impl LocalExecutor {
    /// Create an executor, locating the tmux binary once.
    pub fn new() -> Self {
        let tmux_bin = locate_tmux();
        debug!(tmux = %tmux_bin.display(), "located multiplexer binary");
        Self { tmux_bin }
    }

    /// Create an executor with an explicit binary path.
    pub fn with_binary(tmux_bin: PathBuf) -> Self {
        Self { tmux_bin }
    }

    /// Path to the located binary.
    pub fn binary(&self) -> &PathBuf {
        &self.tmux_bin
    }
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandExecutor for LocalExecutor {
    async fn run(&self, args: &[String]) -> Result<String> {
        let output = tokio::process::Command::new(&self.tmux_bin)
            .args(args)
            .output()
            .await
            .map_err(|e| Error::MultiplexerUnavailable(format!("{}: {e}", self.tmux_bin.display())))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(Error::CaptureFailed(format!(
                "tmux {} failed: {stderr}",
                args.first().map(String::as_str).unwrap_or("")
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn run_ok(&self, args: &[String]) -> bool {
        tokio::process::Command::new(&self.tmux_bin)
            .args(args)
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn is_remote(&self) -> bool {
        false
    }
}

/// Remote executor: composes a validated shell string per command and runs
/// it through the SSH bridge.
pub struct RemoteExecutor {
    bridge: Arc<dyn SshBridge>,
    host: String,
}

impl RemoteExecutor {
    /// Create an executor for `host` over `bridge`.
    pub fn new(bridge: Arc<dyn SshBridge>, host: impl Into<String>) -> Self {
        Self {
            bridge,
            host: host.into(),
        }
    }

    /// The host commands run on.
    pub fn host(&self) -> &str {
        &self.host
    }
}

#[async_trait]
impl CommandExecutor for RemoteExecutor {
    async fn run(&self, args: &[String]) -> Result<String> {
        let command = compose_remote_command("tmux", args)?;
        debug!(host = %self.host, %command, "remote multiplexer command");
        self.bridge.run_command(&self.host, &command).await
    }

    async fn run_ok(&self, args: &[String]) -> bool {
        match compose_remote_command("tmux", args) {
            Ok(command) => self.bridge.run_command(&self.host, &command).await.is_ok(),
            Err(_) => false,
        }
    }

    fn is_remote(&self) -> bool {
        true
    }
}

/// Test doubles for the executor seam.
pub mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// A scripted executor that records every call and pops canned replies.
    #[derive(Default)]
    pub struct ScriptedExecutor {
        /// Argument vectors seen, in order
        pub calls: Mutex<Vec<Vec<String>>>,
        /// Replies for `run`, popped in order; empty means `Ok("")`
        pub replies: Mutex<VecDeque<Result<String>>>,
        /// Replies for `run_ok`, popped in order; empty means `true`
        pub ok_replies: Mutex<VecDeque<bool>>,
        /// Reported remoteness
        pub remote: bool,
    }

    impl ScriptedExecutor {
        /// Create a local-flavored scripted executor.
        pub fn new() -> Self {
            Self::default()
        }

        /// Create a remote-flavored scripted executor.
        pub fn remote() -> Self {
            Self {
                remote: true,
                ..Self::default()
            }
        }

        /// Queue a reply for the next `run` call.
        pub fn push_reply(&self, reply: Result<String>) {
            self.replies.lock().unwrap().push_back(reply);
        }

        /// Queue a reply for the next `run_ok` call.
        pub fn push_ok(&self, ok: bool) {
            self.ok_replies.lock().unwrap().push_back(ok);
        }

        /// Calls recorded so far.
        pub fn recorded(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandExecutor for ScriptedExecutor {
        async fn run(&self, args: &[String]) -> Result<String> {
            self.calls.lock().unwrap().push(args.to_vec());
            match self.replies.lock().unwrap().pop_front() {
                Some(reply) => reply,
                None => Ok(String::new()),
            }
        }

        async fn run_ok(&self, args: &[String]) -> bool {
            self.calls.lock().unwrap().push(args.to_vec());
            self.ok_replies.lock().unwrap().pop_front().unwrap_or(true)
        }

        fn is_remote(&self) -> bool {
            self.remote
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::testing::ScriptedBridge;

    fn args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_locate_tmux_returns_something() {
        let path = locate_tmux();
        assert!(path.to_string_lossy().contains("tmux"));
    }

    #[tokio::test]
    async fn test_remote_executor_composes_shell_string() {
        let bridge = Arc::new(ScriptedBridge::new());
        let exec = RemoteExecutor::new(bridge.clone(), "devbox");

        exec.run(&args(&["has-session", "-t", "agentdeck_1"]))
            .await
            .unwrap();

        let recorded = bridge.recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].0, "devbox");
        assert_eq!(recorded[0].1, "tmux has-session -t agentdeck_1");
    }

    #[tokio::test]
    async fn test_remote_executor_rejects_unsafe_args() {
        let bridge = Arc::new(ScriptedBridge::new());
        let exec = RemoteExecutor::new(bridge.clone(), "devbox");

        let err = exec
            .run(&args(&["kill-session", "-t", "x; rm -rf /"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsafeArgument(_)));
        assert!(bridge.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_remote_run_ok_maps_errors_to_false() {
        let bridge = Arc::new(ScriptedBridge::new());
        bridge.push_reply(Err(Error::SessionAbsent("gone".into())));
        let exec = RemoteExecutor::new(bridge, "devbox");

        assert!(!exec.run_ok(&args(&["has-session", "-t", "gone"])).await);
    }

    #[test]
    fn test_is_remote_flags() {
        let local = LocalExecutor::with_binary(PathBuf::from("tmux"));
        assert!(!local.is_remote());

        let remote = RemoteExecutor::new(Arc::new(ScriptedBridge::new()), "devbox");
        assert!(remote.is_remote());
    }
}
