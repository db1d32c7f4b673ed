//! Parallel status classification.
//!
//! Each poll cycle takes the persisted instances plus the multiplexer's
//! live session listing and produces per-session status updates. Pane
//! captures fan out as subprocesses, so they run under a bounded pool.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use agent_deck_core::{Instance, InstanceStatus, Tool};
use agent_deck_mux::{CaptureOptions, MuxAdapter};

use crate::files::check_file_activity;
use crate::patterns::{extract_context_percent, has_error, is_busy, SCAN_LINES};
use crate::prompt::is_waiting_prompt;

/// Upper bound on concurrent pane captures.
pub const MAX_CONCURRENT_CHECKS: usize = 8;

/// Detector settings.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Allow the file-mtime fast path
    pub file_detection_enabled: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            file_detection_enabled: true,
        }
    }
}

/// Outcome of classifying one session.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    /// Instance id
    pub id: String,
    /// Newly observed status
    pub status: InstanceStatus,
    /// Set `waiting_since` to this value
    pub waiting_since: Option<DateTime<Utc>>,
    /// Clear `waiting_since`
    pub clear_waiting_since: bool,
    /// Claude context-bar usage, when visible
    pub context_percent: Option<u8>,
    /// Session id discovered by the fast path, when the store lacked one
    pub discovered_session_id: Option<String>,
    /// Whether status or `waiting_since` differ from the stored instance
    pub changed: bool,
}

/// Classify lowercased pane content for a tool.
///
/// Priority: busy, then waiting, then error, then idle.
pub fn classify_pane(tool: &Tool, content: &str) -> InstanceStatus {
    let owned: Vec<String> = content
        .lines()
        .rev()
        .take(SCAN_LINES)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .map(|line| line.to_lowercase())
        .collect();
    let lines: Vec<&str> = owned.iter().map(String::as_str).collect();

    if is_busy(&lines) {
        InstanceStatus::Running
    } else if is_waiting_prompt(tool, &lines) {
        InstanceStatus::Waiting
    } else if has_error(&lines) {
        InstanceStatus::Error
    } else {
        InstanceStatus::Idle
    }
}

/// Apply the `waiting_since` rules for a transition to `new_status`.
///
/// Waiting and idle start the clock when it is not already running; a
/// return to running clears it. Idle never clears it - the GUI keeps
/// showing elapsed waiting time.
fn waiting_since_change(
    inst: &Instance,
    new_status: InstanceStatus,
    now: DateTime<Utc>,
) -> (Option<DateTime<Utc>>, bool) {
    match new_status {
        InstanceStatus::Waiting | InstanceStatus::Idle if inst.waiting_since.is_none() => {
            (Some(now), false)
        }
        InstanceStatus::Running if inst.waiting_since.is_some() => (None, true),
        _ => (None, false),
    }
}

fn build_update(
    inst: &Instance,
    status: InstanceStatus,
    context_percent: Option<u8>,
    discovered_session_id: Option<String>,
    now: DateTime<Utc>,
) -> StatusUpdate {
    let (waiting_since, clear_waiting_since) = waiting_since_change(inst, status, now);
    let changed = status != inst.status || waiting_since.is_some() || clear_waiting_since;
    StatusUpdate {
        id: inst.id.clone(),
        status,
        waiting_since,
        clear_waiting_since,
        context_percent,
        discovered_session_id,
        changed,
    }
}

/// Status detector over one local multiplexer adapter.
pub struct StatusDetector {
    adapter: Arc<MuxAdapter>,
    config: DetectorConfig,
    pool: Arc<Semaphore>,
}

impl StatusDetector {
    /// Create a detector with the given settings.
    pub fn new(adapter: Arc<MuxAdapter>, config: DetectorConfig) -> Self {
        Self {
            adapter,
            config,
            pool: Arc::new(Semaphore::new(MAX_CONCURRENT_CHECKS)),
        }
    }

    /// Classify every instance against the live session listing.
    ///
    /// Remote instances keep their stored status; local instances missing
    /// from the listing are `exited`; the rest are detected in parallel.
    pub async fn detect_all(
        &self,
        instances: &[Instance],
        live_sessions: &HashSet<String>,
    ) -> Vec<StatusUpdate> {
        let now = Utc::now();
        let mut updates = Vec::new();
        let mut tasks: JoinSet<Option<StatusUpdate>> = JoinSet::new();

        for inst in instances {
            if inst.is_remote() {
                // No remote pane capture in the hot path
                continue;
            }

            if !live_sessions.contains(&inst.tmux_session) {
                let update = build_update(inst, InstanceStatus::Exited, None, None, now);
                if update.changed {
                    updates.push(update);
                }
                continue;
            }

            let inst = inst.clone();
            let adapter = Arc::clone(&self.adapter);
            let pool = Arc::clone(&self.pool);
            let file_detection = self.config.file_detection_enabled;

            tasks.spawn(async move {
                let _permit = pool.acquire_owned().await.ok()?;
                Some(detect_one(&adapter, &inst, file_detection, now).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(update)) => updates.push(update),
                Ok(None) => {}
                Err(e) => warn!("status check task failed: {e}"),
            }
        }

        updates
    }
}

async fn detect_one(
    adapter: &MuxAdapter,
    inst: &Instance,
    file_detection: bool,
    now: DateTime<Utc>,
) -> StatusUpdate {
    // Fast path: a fresh session file proves activity without a capture
    let mut discovered_session_id = None;
    if file_detection && inst.tool.has_session_files() {
        let known = match inst.tool {
            Tool::Claude => inst.claude_session_id.as_deref(),
            Tool::Gemini => inst.gemini_session_id.as_deref(),
            _ => None,
        };
        if let Some(activity) = check_file_activity(&inst.tool, &inst.project_path, known) {
            if known.is_none() {
                discovered_session_id = Some(activity.session_id.clone());
            }
            if activity.fresh {
                return build_update(
                    inst,
                    InstanceStatus::Running,
                    None,
                    discovered_session_id,
                    now,
                );
            }
        }
    }

    // Visual path: classify the tail of the pane
    let capture = adapter
        .capture_pane(
            &inst.tmux_session,
            CaptureOptions {
                include_escape: false,
                start_line: Some(-(SCAN_LINES as i64)),
                end_line: None,
                full_history: false,
            },
        )
        .await;

    let content = match capture {
        Ok(content) => content,
        Err(e) => {
            debug!(session = %inst.tmux_session, "status capture failed: {e}");
            return build_update(inst, inst.status, None, discovered_session_id, now);
        }
    };

    let status = classify_pane(&inst.tool, &content);
    let context_percent = if matches!(inst.tool, Tool::Claude) {
        extract_context_percent(&content)
    } else {
        None
    };

    build_update(inst, status, context_percent, discovered_session_id, now)
}
