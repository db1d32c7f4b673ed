//! The multiplexer's command-line surface.
//!
//! One adapter per execution context (local, or one per remote host). All
//! operations go through the [`CommandExecutor`] seam so local and remote
//! sessions share a single code path.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use agent_deck_core::{Error, Result};

use crate::executor::CommandExecutor;
use crate::keys::{split_input, InputChunk};

/// Options for a pane capture.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaptureOptions {
    /// Include escape sequences (`-e`)
    pub include_escape: bool,
    /// First line, negative values index into history
    pub start_line: Option<i64>,
    /// Last line, negative values index into history
    pub end_line: Option<i64>,
    /// Capture the entire history (`-S - -E -`)
    pub full_history: bool,
}

impl CaptureOptions {
    /// Capture the visible viewport only, with escape sequences.
    pub fn viewport() -> Self {
        Self {
            include_escape: true,
            ..Self::default()
        }
    }

    /// Capture the full history, with escape sequences.
    pub fn history() -> Self {
        Self {
            include_escape: true,
            full_history: true,
            ..Self::default()
        }
    }

    /// Capture an explicit line range, with escape sequences.
    pub fn range(start_line: i64, end_line: i64) -> Self {
        Self {
            include_escape: true,
            start_line: Some(start_line),
            end_line: Some(end_line),
            full_history: false,
        }
    }
}

/// Adapter over the multiplexer's documented commands.
pub struct MuxAdapter {
    exec: Arc<dyn CommandExecutor>,
}

impl MuxAdapter {
    /// Create an adapter over an executor.
    pub fn new(exec: Arc<dyn CommandExecutor>) -> Self {
        Self { exec }
    }

    /// Whether this adapter crosses a host boundary.
    pub fn is_remote(&self) -> bool {
        self.exec.is_remote()
    }

    fn args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    /// Start the multiplexer server. Idempotent; failure is logged and
    /// swallowed because the server may already be running.
    pub async fn start_server(&self) {
        if let Err(e) = self.exec.run(&Self::args(&["start-server"])).await {
            debug!("start-server: {e}");
        }
    }

    /// Names of all live sessions. Empty set on any error.
    pub async fn list_sessions(&self) -> HashSet<String> {
        match self
            .exec
            .run(&Self::args(&["list-sessions", "-F", "#{session_name}"]))
            .await
        {
            Ok(out) => out
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect(),
            Err(e) => {
                debug!("list-sessions: {e}");
                HashSet::new()
            }
        }
    }

    /// Whether `name` is a live session.
    pub async fn has_session(&self, name: &str) -> bool {
        self.exec
            .run_ok(&Self::args(&["has-session", "-t", name]))
            .await
    }

    /// Capture pane content for `name`.
    pub async fn capture_pane(&self, name: &str, opts: CaptureOptions) -> Result<String> {
        let mut args = Self::args(&["capture-pane", "-p", "-t", name]);
        if opts.include_escape {
            args.push("-e".to_string());
        }
        if opts.full_history {
            args.extend(Self::args(&["-S", "-", "-E", "-"]));
        } else {
            if let Some(start) = opts.start_line {
                args.push("-S".to_string());
                args.push(start.to_string());
            }
            if let Some(end) = opts.end_line {
                args.push("-E".to_string());
                args.push(end.to_string());
            }
        }
        self.exec.run(&args).await
    }

    /// `(history_size, in_alt_screen)` for `name` in one round trip.
    pub async fn history_size_and_alt_screen(&self, name: &str) -> Result<(usize, bool)> {
        let out = self
            .exec
            .run(&Self::args(&[
                "display-message",
                "-p",
                "-t",
                name,
                "#{history_size} #{alternate_on}",
            ]))
            .await?;

        let mut parts = out.split_whitespace();
        let history: usize = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| Error::CaptureFailed(format!("bad display-message reply: {out:?}")))?;
        let alt = parts.next() == Some("1");
        Ok((history, alt))
    }

    /// Resize the session's window.
    pub async fn resize_window(&self, name: &str, cols: u16, rows: u16) -> Result<()> {
        self.exec
            .run(&Self::args(&[
                "resize-window",
                "-t",
                name,
                "-x",
                &cols.to_string(),
                "-y",
                &rows.to_string(),
            ]))
            .await?;
        Ok(())
    }

    /// Send literal text. Free text destined for a remote shell string must
    /// not contain line breaks; callers route those through
    /// [`send_special_keys`](Self::send_special_keys).
    pub async fn send_keys(&self, name: &str, text: &str) -> Result<()> {
        if self.exec.is_remote() && (text.contains('\n') || text.contains('\r')) {
            return Err(Error::UnsafeArgument(text.to_string()));
        }
        self.exec
            .run(&Self::args(&["send-keys", "-t", name, "-l", text]))
            .await?;
        Ok(())
    }

    /// Send a named key (`Enter`, `Up`, `C-c`, ...). `send-keys -l` cannot
    /// express these.
    pub async fn send_special_keys(&self, name: &str, key: &str) -> Result<()> {
        self.exec
            .run(&Self::args(&["send-keys", "-t", name, key]))
            .await?;
        Ok(())
    }

    /// Route raw emulator input: literal runs via `send_keys`, control codes
    /// and CSI sequences via named keys, in order.
    pub async fn send_input(&self, name: &str, data: &str) -> Result<()> {
        for chunk in split_input(data) {
            match chunk {
                InputChunk::Literal(text) => self.send_keys(name, &text).await?,
                InputChunk::Named(key) => self.send_special_keys(name, key).await?,
            }
        }
        Ok(())
    }

    /// Create a detached session named `name` in `cwd`.
    pub async fn new_session_detached(&self, name: &str, cwd: &str) -> Result<()> {
        self.exec
            .run(&Self::args(&[
                "new-session", "-d", "-s", name, "-c", cwd,
            ]))
            .await?;
        Ok(())
    }

    /// Kill session `name`.
    pub async fn kill_session(&self, name: &str) -> Result<()> {
        self.exec
            .run(&Self::args(&["kill-session", "-t", name]))
            .await?;
        Ok(())
    }

    /// Attach or detach a pane logger.
    pub async fn pipe_pane(&self, name: &str, log_path: Option<&str>) -> Result<()> {
        match log_path {
            Some(path) => {
                self.exec
                    .run(&Self::args(&[
                        "pipe-pane",
                        "-t",
                        name,
                        "-o",
                        &format!("cat >> {path}"),
                    ]))
                    .await?;
            }
            None => {
                self.exec
                    .run(&Self::args(&["pipe-pane", "-t", name]))
                    .await?;
            }
        }
        Ok(())
    }

    /// Whether the multiplexer server answers at all. Used by reconnection
    /// to distinguish a dead transport from a dead session.
    pub async fn probe(&self) -> bool {
        self.exec
            .run(&Self::args(&["list-sessions", "-F", "#{session_name}"]))
            .await
            .is_ok()
    }

    /// Verify the session exists, mapping absence to [`Error::SessionAbsent`].
    pub async fn require_session(&self, name: &str) -> Result<()> {
        if self.has_session(name).await {
            Ok(())
        } else {
            warn!(session = name, "session absent from live listing");
            Err(Error::SessionAbsent(name.to_string()))
        }
    }
}
