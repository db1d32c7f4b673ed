//! User configuration loaded from `~/.agent-deck/config.toml`.
//!
//! Loading never fails on bad values: out-of-range numerics are clamped,
//! unknown enum values fall back to defaults, and a missing or unreadable
//! file yields the default configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{Error, Result};

/// Environment variable that force-enables the experimental streaming path.
pub const PTY_STREAMING_ENV: &str = "REVDEN_PTY_STREAMING";

/// UI theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Dark theme
    Dark,
    /// Light theme
    Light,
    /// Follow the OS
    #[default]
    Auto,
}

impl<'de> Deserialize<'de> for Theme {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "dark" => Theme::Dark,
            "light" => Theme::Light,
            "auto" => Theme::Auto,
            _ => Theme::default(),
        })
    }
}

/// Which modifier inserts a newline without submitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SoftNewline {
    /// Shift+Enter only
    #[default]
    ShiftEnter,
    /// Alt+Enter only
    AltEnter,
    /// Either modifier
    Both,
    /// No soft newline
    Disabled,
}

impl<'de> Deserialize<'de> for SoftNewline {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "shift_enter" => SoftNewline::ShiftEnter,
            "alt_enter" => SoftNewline::AltEnter,
            "both" => SoftNewline::Both,
            "disabled" => SoftNewline::Disabled,
            _ => SoftNewline::default(),
        })
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct DeckConfig {
    /// Desktop shell settings
    pub desktop: DesktopSettings,
    /// Project discovery settings
    pub project_discovery: ProjectDiscoverySettings,
}

/// `[desktop]` section.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct DesktopSettings {
    /// UI theme
    pub theme: Theme,
    /// Terminal widget settings
    pub terminal: TerminalSettings,
}

/// `[desktop.terminal]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TerminalSettings {
    /// Soft-newline binding
    pub soft_newline: SoftNewline,
    /// Font size in points (8-32)
    pub font_size: u32,
    /// Scroll speed percentage (50-250)
    pub scroll_speed: u32,
    /// Emulator scrollback lines (1000-100000)
    pub scrollback: u32,
    /// Click moves the cursor in line-editing prompts
    pub click_to_cursor: bool,
    /// Copy selection to clipboard automatically
    pub auto_copy_on_select: bool,
    /// Show the per-session activity ribbon
    pub show_activity_ribbon: bool,
    /// Allow the file-mtime status fast path
    pub file_based_activity_detection: bool,
    /// Experimental direct pty streaming display path
    pub pty_streaming: bool,
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            soft_newline: SoftNewline::default(),
            font_size: 14,
            scroll_speed: 100,
            scrollback: 50_000,
            click_to_cursor: false,
            auto_copy_on_select: false,
            show_activity_ribbon: true,
            file_based_activity_detection: true,
            pty_streaming: false,
        }
    }
}

/// `[project_discovery]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProjectDiscoverySettings {
    /// Directories scanned for projects
    pub scan_paths: Vec<String>,
    /// Scan depth below each scan path
    pub max_depth: u32,
    /// Glob patterns excluded from scanning
    pub ignore_patterns: Vec<String>,
}

impl Default for ProjectDiscoverySettings {
    fn default() -> Self {
        Self {
            scan_paths: Vec::new(),
            max_depth: 2,
            ignore_patterns: Vec::new(),
        }
    }
}

impl DeckConfig {
    /// Load configuration from a TOML file, falling back to defaults when
    /// the file is missing. Parse errors are real errors; value errors are
    /// normalized away.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default().normalized());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: DeckConfig =
            toml::from_str(raw).map_err(|e| Error::Config(e.to_string()))?;
        Ok(config.normalized())
    }

    /// Clamp numeric fields into their documented ranges and apply the
    /// streaming env override.
    pub fn normalized(mut self) -> Self {
        let t = &mut self.desktop.terminal;
        t.font_size = t.font_size.clamp(8, 32);
        t.scroll_speed = t.scroll_speed.clamp(50, 250);
        t.scrollback = t.scrollback.clamp(1_000, 100_000);

        let streaming_env = std::env::var(PTY_STREAMING_ENV)
            .map(|v| v == "1" || v == "true")
            .unwrap_or(false);
        if streaming_env {
            t.pty_streaming = true;
        }

        self.project_discovery.max_depth = self.project_discovery.max_depth.max(1);
        self
    }
}
