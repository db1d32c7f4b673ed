//! The shared session store.
//!
//! `sessions.json` is written by every cooperating process, so reads take a
//! shared advisory lock, writes take an exclusive one, and all writes are
//! atomic renames. Our own bursty updates are coalesced through the
//! debounce scheduler; peers see at most one write per window.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use agent_deck_core::{paths, Error, Instance, InstanceStatus, Result};

use crate::debounce::{DebounceScheduler, FieldUpdate};
use crate::lock::{acquire_exclusive, acquire_shared, write_atomic};

/// Contents of `sessions.json`. Groups and any unknown top-level keys are
/// round-tripped untouched; peers own them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageData {
    /// Persisted session instances
    #[serde(default)]
    pub instances: Vec<Instance>,

    /// Grouping metadata owned by peers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<serde_json::Value>,

    /// Schema version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,

    /// Unknown top-level keys, preserved on rewrite
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Process-safe session store over a JSON file.
pub struct SessionStore {
    path: PathBuf,
    scheduler: DebounceScheduler,
}

impl SessionStore {
    /// Store at the default shared location.
    pub fn new() -> Self {
        Self::at_path(paths::sessions_path())
    }

    /// Store at an explicit path (tests, alternate profiles).
    pub fn at_path(path: PathBuf) -> Self {
        Self {
            path,
            scheduler: DebounceScheduler::new(),
        }
    }

    /// Load the store under a shared lock.
    ///
    /// A missing file is an empty store. Corrupt JSON is logged and treated
    /// as empty; the damage is bounded to that file's contents.
    pub fn load(&self) -> Result<StorageData> {
        let _lock = acquire_shared(&self.path)?;
        self.load_locked()
    }

    fn load_locked(&self) -> Result<StorageData> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(StorageData::default())
            }
            Err(e) => return Err(Error::StoreIo(e.to_string())),
        };

        let mut data: StorageData = match serde_json::from_str(&raw) {
            Ok(data) => data,
            Err(e) => {
                warn!(path = %self.path.display(), "corrupt session store, using defaults: {e}");
                return Ok(StorageData::default());
            }
        };

        for inst in &mut data.instances {
            inst.normalize();
        }
        Ok(data)
    }

    /// Save the store under an exclusive lock, atomically.
    pub fn save(&self, data: &StorageData) -> Result<()> {
        let _lock = acquire_exclusive(&self.path)?;
        self.save_locked(data)
    }

    fn save_locked(&self, data: &StorageData) -> Result<()> {
        let payload = serde_json::to_vec_pretty(data)?;
        write_atomic(&self.path, &payload)
    }

    /// Append a new instance and save immediately.
    ///
    /// Any update already queued for this id is applied first so a stale
    /// debounced write cannot overwrite the appended record.
    pub fn append_instance(&self, mut inst: Instance) -> Result<()> {
        if let Some(update) = self.scheduler.take(&inst.id) {
            update.apply(&mut inst);
        }
        let _lock = acquire_exclusive(&self.path)?;
        let mut data = self.load_locked()?;
        data.instances.push(inst);
        self.save_locked(&data)
    }

    /// Queue a debounced field update for `id`.
    pub fn schedule_update(&self, id: &str, update: FieldUpdate) {
        self.scheduler.enqueue(id, update);
    }

    /// Queue a status change, rejecting values outside the enum.
    pub fn update_status(&self, id: &str, status: &str) -> Result<()> {
        let status = InstanceStatus::parse(status)
            .ok_or_else(|| Error::InvalidInput(format!("unknown status: {status:?}")))?;
        self.schedule_update(id, FieldUpdate::status(status));
        Ok(())
    }

    /// Drain the scheduler synchronously, applying everything queued in one
    /// load-mutate-save.
    pub fn flush_pending(&self) -> Result<()> {
        let pending = self.scheduler.drain();
        self.apply_updates(pending)
    }

    /// Apply the pending set once its window has elapsed. Intended for the
    /// background flusher; returns whether anything was written.
    pub fn flush_due(&self) -> Result<bool> {
        match self.scheduler.drain_if_due() {
            Some(pending) if !pending.is_empty() => {
                self.apply_updates(pending)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn apply_updates(
        &self,
        pending: std::collections::HashMap<String, FieldUpdate>,
    ) -> Result<()> {
        if pending.is_empty() {
            return Ok(());
        }
        debug!(count = pending.len(), "flushing session updates");

        let _lock = acquire_exclusive(&self.path)?;
        let mut data = self.load_locked()?;
        for inst in &mut data.instances {
            if let Some(update) = pending.get(&inst.id) {
                update.apply(inst);
            }
        }
        self.save_locked(&data)
    }

    /// Flush pending updates, then delete `id` and save immediately.
    pub fn delete_instance(&self, id: &str) -> Result<()> {
        self.flush_pending()?;
        let _lock = acquire_exclusive(&self.path)?;
        let mut data = self.load_locked()?;
        data.instances.retain(|inst| inst.id != id);
        self.save_locked(&data)
    }

    /// Fetch one instance by id.
    pub fn get_instance(&self, id: &str) -> Result<Option<Instance>> {
        Ok(self.load()?.instances.into_iter().find(|i| i.id == id))
    }

    /// Spawn the background flusher: polls the debounce window and writes
    /// when it elapses. Returns the task handle.
    pub fn spawn_flusher(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let store = self;
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_millis(100));
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                if let Err(e) = store.flush_due() {
                    warn!("debounced flush failed: {e}");
                }
            }
        })
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_deck_core::Tool;
    use chrono::Utc;
    use tempfile::tempdir;

    fn store_in(dir: &tempfile::TempDir) -> SessionStore {
        SessionStore::at_path(dir.path().join("sessions.json"))
    }

    fn sample(title: &str) -> Instance {
        Instance::new(title, "/home/u/dev/proj", Tool::Claude)
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let data = store_in(&dir).load().unwrap();
        assert!(data.instances.is_empty());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        let inst = sample("one");
        let id = inst.id.clone();
        store
            .save(&StorageData {
                instances: vec![inst],
                ..StorageData::default()
            })
            .unwrap();

        let data = store.load().unwrap();
        assert_eq!(data.instances.len(), 1);
        assert_eq!(data.instances[0].id, id);
    }

    #[test]
    fn test_load_normalizes_empty_group_path() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        let mut inst = sample("one");
        inst.group_path.clear();
        store
            .save(&StorageData {
                instances: vec![inst],
                ..StorageData::default()
            })
            .unwrap();

        let data = store.load().unwrap();
        assert_eq!(data.instances[0].group_path, "u/dev");
    }

    #[test]
    fn test_corrupt_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        std::fs::write(&path, "{ not json").unwrap();

        let data = SessionStore::at_path(path).load().unwrap();
        assert!(data.instances.is_empty());
    }

    #[test]
    fn test_append_instance_immediate() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        store.append_instance(sample("one")).unwrap();
        store.append_instance(sample("two")).unwrap();

        assert_eq!(store.load().unwrap().instances.len(), 2);
    }

    #[test]
    fn test_append_applies_stale_queued_update() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        let inst = sample("one");
        let id = inst.id.clone();
        store.schedule_update(&id, FieldUpdate::status(InstanceStatus::Running));
        store.append_instance(inst).unwrap();

        let data = store.load().unwrap();
        assert_eq!(data.instances[0].status, InstanceStatus::Running);
        // The queued update was consumed, not left to overwrite later
        store.flush_pending().unwrap();
        assert_eq!(
            store.load().unwrap().instances[0].status,
            InstanceStatus::Running
        );
    }

    #[test]
    fn test_scheduled_updates_last_writer_wins() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        let inst = sample("one");
        let id = inst.id.clone();
        store.append_instance(inst).unwrap();

        store.update_status(&id, "waiting").unwrap();
        store.schedule_update(
            &id,
            FieldUpdate {
                waiting_since: Some(Utc::now()),
                ..FieldUpdate::default()
            },
        );
        store.update_status(&id, "running").unwrap();
        store.schedule_update(
            &id,
            FieldUpdate {
                clear_waiting_since: true,
                ..FieldUpdate::default()
            },
        );
        store.flush_pending().unwrap();

        let got = store.get_instance(&id).unwrap().unwrap();
        assert_eq!(got.status, InstanceStatus::Running);
        assert!(got.waiting_since.is_none());
    }

    #[test]
    fn test_update_status_rejects_unknown() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        let err = store.update_status("x", "zombie").unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_delete_instance() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        let keep = sample("keep");
        let drop_ = sample("drop");
        let keep_id = keep.id.clone();
        let drop_id = drop_.id.clone();
        store.append_instance(keep).unwrap();
        store.append_instance(drop_).unwrap();

        store.delete_instance(&drop_id).unwrap();

        let data = store.load().unwrap();
        assert_eq!(data.instances.len(), 1);
        assert_eq!(data.instances[0].id, keep_id);
    }

    #[test]
    fn test_unknown_top_level_keys_preserved() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        std::fs::write(
            &path,
            r#"{"instances": [], "peer_state": {"cursor": 7}, "version": 3}"#,
        )
        .unwrap();

        let store = SessionStore::at_path(path.clone());
        let data = store.load().unwrap();
        store.save(&data).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["peer_state"]["cursor"], 7);
        assert_eq!(raw["version"], 3);
    }

    #[test]
    fn test_flush_pending_on_empty_store_is_ok() {
        let dir = tempdir().unwrap();
        store_in(&dir).flush_pending().unwrap();
    }
}
