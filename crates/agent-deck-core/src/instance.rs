//! Persisted session instance model.
//!
//! Instances live in the shared `sessions.json` store and are concurrently
//! written by peer processes, so unknown keys are preserved across rewrites
//! and every field that peers may leave blank is normalized on load.

use std::fmt;

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref INSTANCE_ID_RE: Regex = Regex::new(r"^[0-9a-f]{8}-\d+$").unwrap();
}

/// Group path used when no usable path can be derived from the project.
pub const FALLBACK_GROUP: &str = "my-sessions";

/// Status of a persisted session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    /// The agent in the pane is actively working
    Running,
    /// The agent is blocked on a prompt
    Waiting,
    /// Nothing is happening in the pane
    Idle,
    /// An error signature is visible at the bottom of the pane
    Error,
    /// The session was explicitly paused
    Paused,
    /// The local multiplexer no longer knows the session
    Exited,
}

impl InstanceStatus {
    /// Parse a status string, rejecting values outside the enum.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "waiting" => Some(Self::Waiting),
            "idle" => Some(Self::Idle),
            "error" => Some(Self::Error),
            "paused" => Some(Self::Paused),
            "exited" => Some(Self::Exited),
            _ => None,
        }
    }

    /// Lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Waiting => "waiting",
            Self::Idle => "idle",
            Self::Error => "error",
            Self::Paused => "paused",
            Self::Exited => "exited",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The tool running inside a session's pane.
///
/// Known tools get dedicated variants; anything else round-trips as a
/// free-form string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tool {
    /// Claude Code
    Claude,
    /// Gemini CLI
    Gemini,
    /// opencode
    Opencode,
    /// A plain shell
    Shell,
    /// Any other command
    Other(String),
}

impl Tool {
    /// Wire name of the tool.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Claude => "claude",
            Self::Gemini => "gemini",
            Self::Opencode => "opencode",
            Self::Shell => "shell",
            Self::Other(s) => s,
        }
    }

    /// Whether the file-based activity fast path knows this tool.
    pub fn has_session_files(&self) -> bool {
        matches!(self, Self::Claude | Self::Gemini)
    }
}

impl From<&str> for Tool {
    fn from(s: &str) -> Self {
        match s {
            "claude" => Self::Claude,
            "gemini" => Self::Gemini,
            "opencode" => Self::Opencode,
            "shell" => Self::Shell,
            other => Self::Other(other.to_string()),
        }
    }
}

impl Serialize for Tool {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Tool {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Tool::from(s.as_str()))
    }
}

/// A persisted session instance.
///
/// `id` and `tmux_session` are immutable once created. `remote_tmux_name`
/// is present iff the instance is remote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    /// Stable identifier: 8 hex chars, a dash, integer epoch seconds
    pub id: String,

    /// Display title
    #[serde(default)]
    pub title: String,

    /// User-assigned label (may be empty)
    #[serde(default)]
    pub custom_label: String,

    /// Absolute path of the project the session runs in
    #[serde(default)]
    pub project_path: String,

    /// Hierarchical grouping path, `/`-separated, never empty after load
    #[serde(default)]
    pub group_path: String,

    /// Tool running in the pane
    #[serde(default = "default_tool")]
    pub tool: Tool,

    /// Last observed status
    #[serde(default = "default_status")]
    pub status: InstanceStatus,

    /// The multiplexer's own session name (typically `agentdeck_{nanos}`)
    pub tmux_session: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last user interaction timestamp
    pub last_accessed_at: DateTime<Utc>,

    /// When the session entered waiting/idle, if it has not run since
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waiting_since: Option<DateTime<Utc>>,

    /// SSH host for remote sessions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_host: Option<String>,

    /// Multiplexer session name on the remote host; present iff remote
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_tmux_name: Option<String>,

    /// Discovered Claude Code session id, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claude_session_id: Option<String>,

    /// Discovered Gemini session id, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gemini_session_id: Option<String>,

    /// Launch config the session was started from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_config_name: Option<String>,

    /// MCP servers loaded at launch
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub loaded_mcp_names: Vec<String>,

    /// Whether the tool was launched with permission checks disabled
    #[serde(default)]
    pub dangerous_mode: bool,

    /// Keys written by peer processes that we do not model; preserved on rewrite
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_tool() -> Tool {
    Tool::Shell
}

fn default_status() -> InstanceStatus {
    InstanceStatus::Idle
}

impl Instance {
    /// Create a new local instance for a project path.
    pub fn new(title: impl Into<String>, project_path: impl Into<String>, tool: Tool) -> Self {
        let project_path = project_path.into();
        let now = Utc::now();
        Self {
            id: generate_instance_id(),
            title: title.into(),
            custom_label: String::new(),
            group_path: derive_group_path(&project_path),
            project_path,
            tool,
            status: InstanceStatus::Idle,
            tmux_session: generate_tmux_name(),
            created_at: now,
            last_accessed_at: now,
            waiting_since: None,
            remote_host: None,
            remote_tmux_name: None,
            claude_session_id: None,
            gemini_session_id: None,
            launch_config_name: None,
            loaded_mcp_names: Vec::new(),
            dangerous_mode: false,
            extra: serde_json::Map::new(),
        }
    }

    /// Whether this instance lives on a remote host.
    pub fn is_remote(&self) -> bool {
        self.remote_host.is_some()
    }

    /// The multiplexer session name to target: the remote name for remote
    /// instances, `tmux_session` otherwise.
    pub fn mux_target(&self) -> &str {
        self.remote_tmux_name
            .as_deref()
            .unwrap_or(&self.tmux_session)
    }

    /// Record a user interaction now.
    pub fn touch(&mut self) {
        self.last_accessed_at = Utc::now();
    }

    /// Normalize fields that peers may have left inconsistent.
    ///
    /// An empty `group_path` is re-derived from `project_path`; a
    /// `remote_tmux_name` on a local instance is dropped.
    pub fn normalize(&mut self) {
        if self.group_path.is_empty() {
            self.group_path = derive_group_path(&self.project_path);
        }
        if self.remote_host.is_none() {
            self.remote_tmux_name = None;
        }
    }
}

/// Check an instance id against the `^[0-9a-f]{8}-\d+$` format.
pub fn is_valid_instance_id(id: &str) -> bool {
    INSTANCE_ID_RE.is_match(id)
}

/// Generate a fresh instance id: 8 random hex chars + epoch seconds.
pub fn generate_instance_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", &hex[..8], Utc::now().timestamp())
}

/// Generate a multiplexer session name unique across peers.
pub fn generate_tmux_name() -> String {
    format!("agentdeck_{}", Utc::now().timestamp_nanos_opt().unwrap_or(0))
}

/// Derive a grouping path from a project path.
///
/// Uses the parent directory of the project, skipping the root, `Users`,
/// `home`, and dotted components. Falls back to [`FALLBACK_GROUP`].
pub fn derive_group_path(project_path: &str) -> String {
    let parent = match std::path::Path::new(project_path).parent() {
        Some(p) => p,
        None => return FALLBACK_GROUP.to_string(),
    };

    let parts: Vec<&str> = parent
        .components()
        .filter_map(|c| match c {
            std::path::Component::Normal(os) => os.to_str(),
            _ => None,
        })
        .filter(|s| *s != "Users" && *s != "home" && !s.starts_with('.'))
        .collect();

    if parts.is_empty() {
        FALLBACK_GROUP.to_string()
    } else {
        parts.join("/")
    }
}
