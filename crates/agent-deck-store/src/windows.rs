//! Cross-process window-number allocation.
//!
//! Every desktop window registers itself in `window-state.json` under a
//! small integer. Number 1 is the primary window; secondaries fill gaps
//! starting at 2 so numbers stay compact as windows come and go. Entries
//! whose pid has died are pruned on every operation.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use agent_deck_core::{paths, Result};

use crate::lock::{acquire_exclusive, write_atomic};

/// Environment variable carrying a pre-assigned window number.
pub const WINDOW_NUM_ENV: &str = "REVDEN_WINDOW_NUM";

/// A registered window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowEntry {
    /// Owning process id
    pub pid: u32,
    /// Registration time, epoch seconds
    pub started_at: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct WindowState {
    #[serde(default)]
    active_windows: BTreeMap<String, WindowEntry>,
}

/// Registry of live window numbers, shared across peer processes.
pub struct WindowRegistry {
    path: PathBuf,
}

impl WindowRegistry {
    /// Registry at the default shared location.
    pub fn new() -> Self {
        Self::at_path(paths::window_state_path())
    }

    /// Registry at an explicit path.
    pub fn at_path(path: PathBuf) -> Self {
        Self { path }
    }

    fn load_state(&self) -> WindowState {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(path = %self.path.display(), "corrupt window state, resetting: {e}");
                WindowState::default()
            }),
            Err(_) => WindowState::default(),
        }
    }

    fn save_state(&self, state: &WindowState) -> Result<()> {
        let payload = serde_json::to_vec_pretty(state)?;
        write_atomic(&self.path, &payload)
    }

    fn prune_dead(state: &mut WindowState) {
        state.active_windows.retain(|n, entry| {
            let alive = pid_alive(entry.pid);
            if !alive {
                debug!(window = %n, pid = entry.pid, "pruning dead window entry");
            }
            alive
        });
    }

    /// Register this process's window: the number from [`WINDOW_NUM_ENV`]
    /// when it parses to a positive integer, 1 otherwise.
    pub fn register_window(&self) -> Result<u32> {
        let n = std::env::var(WINDOW_NUM_ENV)
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(1);

        let _lock = acquire_exclusive(&self.path)?;
        let mut state = self.load_state();
        Self::prune_dead(&mut state);
        state.active_windows.insert(
            n.to_string(),
            WindowEntry {
                pid: std::process::id(),
                started_at: chrono::Utc::now().timestamp(),
            },
        );
        self.save_state(&state)?;
        Ok(n)
    }

    /// Allocate the lowest free number from 2 upward, reserving it under
    /// this pid so a concurrent allocation cannot hand it out again before
    /// the child process registers.
    pub fn allocate_next(&self) -> Result<u32> {
        let _lock = acquire_exclusive(&self.path)?;
        let mut state = self.load_state();
        Self::prune_dead(&mut state);

        let mut n = 2u32;
        while state.active_windows.contains_key(&n.to_string()) {
            n += 1;
        }
        state.active_windows.insert(
            n.to_string(),
            WindowEntry {
                pid: std::process::id(),
                started_at: chrono::Utc::now().timestamp(),
            },
        );
        self.save_state(&state)?;
        Ok(n)
    }

    /// Remove a window's entry.
    pub fn unregister_window(&self, n: u32) -> Result<()> {
        let _lock = acquire_exclusive(&self.path)?;
        let mut state = self.load_state();
        Self::prune_dead(&mut state);
        state.active_windows.remove(&n.to_string());
        self.save_state(&state)
    }

    /// Currently registered window numbers.
    pub fn active_numbers(&self) -> Result<Vec<u32>> {
        let _lock = acquire_exclusive(&self.path)?;
        let mut state = self.load_state();
        Self::prune_dead(&mut state);
        Ok(state
            .active_windows
            .keys()
            .filter_map(|k| k.parse().ok())
            .collect())
    }
}

impl Default for WindowRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a pid refers to a live process.
#[cfg(unix)]
fn pid_alive(pid: u32) -> bool {
    // Signal 0 probes without delivering; EPERM still means the pid exists.
    let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn pid_alive(_pid: u32) -> bool {
    true
}
