//! On-disk layout under the user's home directory.
//!
//! All cooperating processes key their shared state on the same
//! `~/.agent-deck` tree. When no home directory resolves, state falls back
//! to `/tmp/.agent-deck` so the host still functions in stripped-down
//! environments.

use std::path::PathBuf;

/// Root of the shared state tree.
pub fn base_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".agent-deck")
}

/// Shared session store, peer-writable.
pub fn sessions_path() -> PathBuf {
    base_dir().join("profiles").join("default").join("sessions.json")
}

/// Cross-process window registry.
pub fn window_state_path() -> PathBuf {
    base_dir().join("window-state.json")
}

/// Per-window tab layout state.
pub fn open_tabs_path() -> PathBuf {
    base_dir().join("desktop").join("open_tabs.json")
}

/// User configuration file.
pub fn config_path() -> PathBuf {
    base_dir().join("config.toml")
}
