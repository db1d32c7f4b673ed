//! # agent-deck-core
//!
//! Core types for agent-deck, the desktop host for long-lived tmux sessions.
//!
//! This crate contains all fundamental types with **no internal dependencies**
//! on other agent-deck crates. It provides:
//!
//! - The persisted session instance model (ids, status, tools, grouping)
//! - User configuration (`config.toml` with clamping and fallbacks)
//! - The shared on-disk path layout under `~/.agent-deck`
//! - Byte-stream sanitizers for the display pipeline
//! - The per-window tab layout tree
//! - Error types
//!
//! ## Architecture
//!
//! This is Layer 0 in the architecture - all other crates depend on this one,
//! but this crate has no dependencies on other agent-deck crates.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod instance;
pub mod layout;
pub mod paths;
pub mod sanitize;

pub use config::{DeckConfig, DesktopSettings, SoftNewline, TerminalSettings, Theme};
pub use error::{Error, Result};
pub use instance::{
    derive_group_path, generate_instance_id, generate_tmux_name, is_valid_instance_id, Instance,
    InstanceStatus, Tool, FALLBACK_GROUP,
};
pub use layout::{LayoutNode, SplitDirection};
pub use sanitize::{
    find_last_valid_utf8_boundary, normalize_crlf, sanitize_history_for_scrollback,
    strip_seam_sequences, strip_tts_markers, SEAM_WINDOW_BYTES,
};
