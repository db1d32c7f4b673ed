//! Per-window tab layout persistence.
//!
//! `open_tabs.json` maps stringified window numbers to that window's tab
//! set. Windows only ever rewrite their own entry; everything else in the
//! file is carried through untouched. A corrupt file or a structurally
//! invalid layout never errors - the window just starts fresh.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use agent_deck_core::{paths, LayoutNode, Result};

use crate::lock::{acquire_exclusive, acquire_shared, write_atomic};

/// One tab in a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabRecord {
    /// Tab identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Pane layout tree
    pub layout: LayoutNode,
    /// Focused pane id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_pane_id: Option<String>,
    /// When the tab was opened
    pub opened_at: DateTime<Utc>,
}

/// A window's persisted tab set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowTabs {
    /// Focused tab id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_tab_id: Option<String>,
    /// Open tabs, in display order
    pub tabs: Vec<TabRecord>,
    /// Last save time; refreshed on every save
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TabsFile {
    #[serde(default)]
    windows: BTreeMap<String, serde_json::Value>,
}

/// Store for per-window tab layouts.
pub struct TabStateStore {
    path: PathBuf,
}

impl TabStateStore {
    /// Store at the default shared location.
    pub fn new() -> Self {
        Self::at_path(paths::open_tabs_path())
    }

    /// Store at an explicit path.
    pub fn at_path(path: PathBuf) -> Self {
        Self { path }
    }

    fn load_file(&self) -> TabsFile {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(path = %self.path.display(), "corrupt tab state, using defaults: {e}");
                TabsFile::default()
            }),
            Err(_) => TabsFile::default(),
        }
    }

    /// Load one window's tabs under a shared lock.
    ///
    /// Returns `None` when the window has no stored state, when its entry
    /// fails to parse, or when any layout tree is structurally invalid.
    pub fn load_window(&self, window: u32) -> Result<Option<WindowTabs>> {
        let _lock = acquire_shared(&self.path)?;
        let file = self.load_file();

        let Some(raw) = file.windows.get(&window.to_string()) else {
            return Ok(None);
        };

        let parsed: WindowTabs = match serde_json::from_value(raw.clone()) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(window, "invalid tab state, treating as absent: {e}");
                return Ok(None);
            }
        };

        if parsed.tabs.iter().any(|tab| !tab.layout.is_valid()) {
            warn!(window, "invalid layout tree, treating tab state as absent");
            return Ok(None);
        }

        Ok(Some(parsed))
    }

    /// Save one window's tabs under an exclusive lock, refreshing
    /// `saved_at` and preserving every other window's entry.
    pub fn save_window(&self, window: u32, mut state: WindowTabs) -> Result<()> {
        state.saved_at = Utc::now();

        let _lock = acquire_exclusive(&self.path)?;
        let mut file = self.load_file();
        file.windows
            .insert(window.to_string(), serde_json::to_value(&state)?);

        let payload = serde_json::to_vec_pretty(&file)?;
        write_atomic(&self.path, &payload)
    }

    /// Remove one window's entry.
    pub fn clear_window(&self, window: u32) -> Result<()> {
        let _lock = acquire_exclusive(&self.path)?;
        let mut file = self.load_file();
        file.windows.remove(&window.to_string());

        let payload = serde_json::to_vec_pretty(&file)?;
        write_atomic(&self.path, &payload)
    }
}

impl Default for TabStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_deck_core::SplitDirection;
    use tempfile::tempdir;

    fn store_in(dir: &tempfile::TempDir) -> TabStateStore {
        TabStateStore::at_path(dir.path().join("open_tabs.json"))
    }

    fn sample_tabs() -> WindowTabs {
        WindowTabs {
            active_tab_id: Some("t1".to_string()),
            tabs: vec![TabRecord {
                id: "t1".to_string(),
                name: "work".to_string(),
                layout: LayoutNode::Split {
                    direction: SplitDirection::Horizontal,
                    ratio: 0.5,
                    children: vec![
                        LayoutNode::Pane {
                            id: "p1".to_string(),
                            binding: Some("deadbeef-1700000000".to_string()),
                        },
                        LayoutNode::Pane {
                            id: "p2".to_string(),
                            binding: None,
                        },
                    ],
                },
                active_pane_id: Some("p1".to_string()),
                opened_at: Utc::now(),
            }],
            saved_at: Utc::now(),
        }
    }

    #[test]
    fn test_missing_window_is_none() {
        let dir = tempdir().unwrap();
        assert!(store_in(&dir).load_window(1).unwrap().is_none());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        let tabs = sample_tabs();
        store.save_window(1, tabs.clone()).unwrap();

        let loaded = store.load_window(1).unwrap().unwrap();
        assert_eq!(loaded.active_tab_id, tabs.active_tab_id);
        assert_eq!(loaded.tabs, tabs.tabs);
    }

    #[test]
    fn test_save_refreshes_saved_at() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        let mut tabs = sample_tabs();
        tabs.saved_at = DateTime::from_timestamp(0, 0).unwrap();
        store.save_window(1, tabs).unwrap();

        let loaded = store.load_window(1).unwrap().unwrap();
        assert!(loaded.saved_at.timestamp() > 0);
    }

    #[test]
    fn test_other_windows_preserved() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        store.save_window(1, sample_tabs()).unwrap();
        store.save_window(2, sample_tabs()).unwrap();
        store.save_window(1, sample_tabs()).unwrap();

        assert!(store.load_window(2).unwrap().is_some());
    }

    #[test]
    fn test_corrupt_file_is_absent_state() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("open_tabs.json");
        std::fs::write(&path, "][").unwrap();

        let store = TabStateStore::at_path(path);
        assert!(store.load_window(1).unwrap().is_none());
    }

    #[test]
    fn test_unknown_node_type_treated_as_absent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("open_tabs.json");
        std::fs::write(
            &path,
            r#"{"windows": {"1": {
                "active_tab_id": "t1",
                "tabs": [{"id": "t1", "name": "w",
                          "layout": {"type": "carousel", "children": []},
                          "opened_at": "2026-01-01T00:00:00Z"}],
                "saved_at": "2026-01-01T00:00:00Z"
            }}}"#,
        )
        .unwrap();

        let store = TabStateStore::at_path(path);
        assert!(store.load_window(1).unwrap().is_none());
    }

    #[test]
    fn test_invalid_ratio_treated_as_absent() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        let mut tabs = sample_tabs();
        if let LayoutNode::Split { ratio, .. } = &mut tabs.tabs[0].layout {
            *ratio = 1.5;
        }
        store.save_window(1, tabs).unwrap();

        assert!(store.load_window(1).unwrap().is_none());
    }

    #[test]
    fn test_clear_window() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        store.save_window(1, sample_tabs()).unwrap();
        store.clear_window(1).unwrap();
        assert!(store.load_window(1).unwrap().is_none());
    }
}
