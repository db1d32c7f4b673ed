//! File-mtime activity fast path.
//!
//! Claude and Gemini append to an on-disk session file while they work, so
//! a fresh mtime proves activity without capturing the pane. The session id
//! may be known from the store or discovered lazily from the tool's
//! directory layout.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use sha2::{Digest, Sha256};
use tracing::debug;

use agent_deck_core::Tool;

/// A session file is "fresh" when modified within this window.
pub const FRESHNESS_WINDOW: Duration = Duration::from_secs(90);

/// Result of the fast path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileActivity {
    /// Session id backing the file, possibly just discovered
    pub session_id: String,
    /// Whether the file was modified within the freshness window
    pub fresh: bool,
}

/// Claude stores each project's sessions under a directory named after the
/// project path with separators flattened to dashes.
pub fn claude_project_dir(home: &Path, project_path: &str) -> PathBuf {
    let flattened: String = project_path
        .chars()
        .map(|c| if c == '/' || c == '.' { '-' } else { c })
        .collect();
    home.join(".claude").join("projects").join(flattened)
}

/// Gemini keys its temp tree by the SHA-256 of the project path.
pub fn gemini_project_dir(tmp: &Path, project_path: &str) -> PathBuf {
    let hash = Sha256::digest(project_path.as_bytes());
    tmp.join("gemini").join(format!("{hash:x}"))
}

fn most_recent_file(dir: &Path, extension: Option<&str>) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut best: Option<(SystemTime, PathBuf)> = None;

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(ext) = extension {
            if path.extension().and_then(|e| e.to_str()) != Some(ext) {
                continue;
            }
        }
        let Some(mtime) = entry.metadata().ok().and_then(|m| m.modified().ok()) else {
            continue;
        };
        if best.as_ref().map(|(t, _)| mtime > *t).unwrap_or(true) {
            best = Some((mtime, path));
        }
    }

    best.map(|(_, path)| path)
}

fn is_fresh(path: &Path, now: SystemTime) -> bool {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(|mtime| {
            now.duration_since(mtime)
                .map(|age| age < FRESHNESS_WINDOW)
                .unwrap_or(true)
        })
        .unwrap_or(false)
}

/// Run the fast path against explicit root directories.
///
/// Returns `None` when the tool keeps no session files or none can be
/// found for this project.
pub fn check_file_activity_in(
    home: &Path,
    tmp: &Path,
    tool: &Tool,
    project_path: &str,
    known_session_id: Option<&str>,
    now: SystemTime,
) -> Option<FileActivity> {
    match tool {
        Tool::Claude => {
            let dir = claude_project_dir(home, project_path);
            let file = match known_session_id {
                Some(id) => {
                    let candidate = dir.join(format!("{id}.jsonl"));
                    candidate.is_file().then_some(candidate)?
                }
                None => most_recent_file(&dir, Some("jsonl"))?,
            };
            let session_id = file.file_stem()?.to_string_lossy().into_owned();
            let fresh = is_fresh(&file, now);
            debug!(%session_id, fresh, "claude session file checked");
            Some(FileActivity { session_id, fresh })
        }
        Tool::Gemini => {
            let dir = gemini_project_dir(tmp, project_path);
            let file = most_recent_file(&dir, None)?;
            let session_id = file.file_stem()?.to_string_lossy().into_owned();
            let fresh = is_fresh(&file, now);
            debug!(%session_id, fresh, "gemini session file checked");
            Some(FileActivity { session_id, fresh })
        }
        _ => None,
    }
}

/// Run the fast path against the real home directory and temp tree.
pub fn check_file_activity(
    tool: &Tool,
    project_path: &str,
    known_session_id: Option<&str>,
) -> Option<FileActivity> {
    let home = dirs::home_dir()?;
    check_file_activity_in(
        &home,
        &std::env::temp_dir(),
        tool,
        project_path,
        known_session_id,
        SystemTime::now(),
    )
}
