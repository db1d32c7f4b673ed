//! # agent-deck-detector
//!
//! Session status inference for agent-deck.
//!
//! Combines two evidence sources into one status per session:
//!
//! - a file-mtime fast path (agent session files prove recent activity)
//! - a visual path over captured pane content (busy hints, spinner glyphs,
//!   tool prompts, error signatures)
//!
//! Classification runs in parallel under a bounded pool so subprocess
//! fan-out stays capped however many sessions are open.

pub mod detector;
pub mod files;
pub mod patterns;
pub mod prompt;

pub use detector::{
    classify_pane, DetectorConfig, StatusDetector, StatusUpdate, MAX_CONCURRENT_CHECKS,
};
pub use files::{check_file_activity, FileActivity, FRESHNESS_WINDOW};
pub use patterns::extract_context_percent;
pub use prompt::is_waiting_prompt;
