//! Debounced field updates for the session store.
//!
//! Status detection produces a burst of per-session updates every poll
//! cycle; writing each one through the exclusive file lock would thrash
//! peers. Updates are coalesced per instance id inside a 500 ms window and
//! applied in one load-mutate-save. The scheduler is never fire-and-forget:
//! shutdown drains it synchronously.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use agent_deck_core::InstanceStatus;

/// Coalescing window for session-store writes.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// A partial update to one persisted instance. Unset fields are untouched;
/// `clear_waiting_since` clears rather than sets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldUpdate {
    /// New status
    pub status: Option<InstanceStatus>,
    /// Set `waiting_since`
    pub waiting_since: Option<DateTime<Utc>>,
    /// Clear `waiting_since`; wins over a previously queued set
    pub clear_waiting_since: bool,
    /// Set `last_accessed_at`
    pub last_accessed_at: Option<DateTime<Utc>>,
    /// Set `custom_label`
    pub custom_label: Option<String>,
    /// Set `title`
    pub title: Option<String>,
    /// Record a lazily discovered Claude session id
    pub claude_session_id: Option<String>,
    /// Record a lazily discovered Gemini session id
    pub gemini_session_id: Option<String>,
}

impl FieldUpdate {
    /// An update that only changes status.
    pub fn status(status: InstanceStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Whether the update carries no changes.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Merge a newer update into this one, field-level latest-wins.
    pub fn merge(&mut self, newer: FieldUpdate) {
        if newer.status.is_some() {
            self.status = newer.status;
        }
        if newer.clear_waiting_since {
            self.waiting_since = None;
            self.clear_waiting_since = true;
        } else if newer.waiting_since.is_some() {
            self.waiting_since = newer.waiting_since;
            self.clear_waiting_since = false;
        }
        if newer.last_accessed_at.is_some() {
            self.last_accessed_at = newer.last_accessed_at;
        }
        if newer.custom_label.is_some() {
            self.custom_label = newer.custom_label;
        }
        if newer.title.is_some() {
            self.title = newer.title;
        }
        if newer.claude_session_id.is_some() {
            self.claude_session_id = newer.claude_session_id;
        }
        if newer.gemini_session_id.is_some() {
            self.gemini_session_id = newer.gemini_session_id;
        }
    }

    /// Apply this update to an instance.
    pub fn apply(&self, inst: &mut agent_deck_core::Instance) {
        if let Some(status) = self.status {
            inst.status = status;
        }
        if self.clear_waiting_since {
            inst.waiting_since = None;
        } else if let Some(ts) = self.waiting_since {
            inst.waiting_since = Some(ts);
        }
        if let Some(ts) = self.last_accessed_at {
            inst.last_accessed_at = ts;
        }
        if let Some(label) = &self.custom_label {
            inst.custom_label = label.clone();
        }
        if let Some(title) = &self.title {
            inst.title = title.clone();
        }
        if let Some(id) = &self.claude_session_id {
            inst.claude_session_id = Some(id.clone());
        }
        if let Some(id) = &self.gemini_session_id {
            inst.gemini_session_id = Some(id.clone());
        }
    }
}

/// Pending updates keyed by instance id, plus the window deadline.
#[derive(Default)]
pub struct DebounceScheduler {
    state: Mutex<SchedulerState>,
}

#[derive(Default)]
struct SchedulerState {
    pending: HashMap<String, FieldUpdate>,
    deadline: Option<Instant>,
}

impl DebounceScheduler {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an update for `id`, coalescing with anything already queued.
    /// Starts the window if it is not running.
    pub fn enqueue(&self, id: &str, update: FieldUpdate) {
        if update.is_empty() {
            return;
        }
        let mut state = self.state.lock().unwrap();
        state
            .pending
            .entry(id.to_string())
            .or_default()
            .merge(update);
        if state.deadline.is_none() {
            state.deadline = Some(Instant::now() + DEBOUNCE_WINDOW);
        }
    }

    /// Remove and return the pending update for one id, if any.
    pub fn take(&self, id: &str) -> Option<FieldUpdate> {
        self.state.lock().unwrap().pending.remove(id)
    }

    /// Drain everything queued, resetting the window.
    pub fn drain(&self) -> HashMap<String, FieldUpdate> {
        let mut state = self.state.lock().unwrap();
        state.deadline = None;
        std::mem::take(&mut state.pending)
    }

    /// Drain only if the window has elapsed.
    pub fn drain_if_due(&self) -> Option<HashMap<String, FieldUpdate>> {
        let mut state = self.state.lock().unwrap();
        match state.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                state.deadline = None;
                Some(std::mem::take(&mut state.pending))
            }
            _ => None,
        }
    }

    /// Whether anything is queued.
    pub fn is_empty(&self) -> bool {
        self.state.lock().unwrap().pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_deck_core::{Instance, Tool};

    #[test]
    fn test_merge_latest_wins_per_field() {
        let mut base = FieldUpdate::status(InstanceStatus::Idle);
        base.merge(FieldUpdate::status(InstanceStatus::Running));
        assert_eq!(base.status, Some(InstanceStatus::Running));
    }

    #[test]
    fn test_merge_preserves_untouched_fields() {
        let mut base = FieldUpdate {
            custom_label: Some("build".to_string()),
            ..FieldUpdate::default()
        };
        base.merge(FieldUpdate::status(InstanceStatus::Waiting));
        assert_eq!(base.custom_label.as_deref(), Some("build"));
        assert_eq!(base.status, Some(InstanceStatus::Waiting));
    }

    #[test]
    fn test_clear_waiting_since_wins_over_earlier_set() {
        let mut base = FieldUpdate {
            waiting_since: Some(Utc::now()),
            ..FieldUpdate::default()
        };
        base.merge(FieldUpdate {
            clear_waiting_since: true,
            ..FieldUpdate::default()
        });
        assert!(base.waiting_since.is_none());
        assert!(base.clear_waiting_since);
    }

    #[test]
    fn test_set_after_clear_replaces_clear() {
        let mut base = FieldUpdate {
            clear_waiting_since: true,
            ..FieldUpdate::default()
        };
        let ts = Utc::now();
        base.merge(FieldUpdate {
            waiting_since: Some(ts),
            ..FieldUpdate::default()
        });
        assert_eq!(base.waiting_since, Some(ts));
        assert!(!base.clear_waiting_since);
    }

    #[test]
    fn test_apply_updates_instance() {
        let mut inst = Instance::new("t", "/home/u/dev/p", Tool::Claude);
        inst.waiting_since = Some(Utc::now());

        let update = FieldUpdate {
            status: Some(InstanceStatus::Running),
            clear_waiting_since: true,
            title: Some("renamed".to_string()),
            ..FieldUpdate::default()
        };
        update.apply(&mut inst);

        assert_eq!(inst.status, InstanceStatus::Running);
        assert!(inst.waiting_since.is_none());
        assert_eq!(inst.title, "renamed");
    }

    #[test]
    fn test_enqueue_coalesces_per_id() {
        let scheduler = DebounceScheduler::new();
        scheduler.enqueue("a", FieldUpdate::status(InstanceStatus::Idle));
        scheduler.enqueue("a", FieldUpdate::status(InstanceStatus::Running));
        scheduler.enqueue("b", FieldUpdate::status(InstanceStatus::Waiting));

        let drained = scheduler.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained["a"].status, Some(InstanceStatus::Running));
        assert_eq!(drained["b"].status, Some(InstanceStatus::Waiting));
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_empty_updates_not_queued() {
        let scheduler = DebounceScheduler::new();
        scheduler.enqueue("a", FieldUpdate::default());
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_drain_if_due_respects_window() {
        let scheduler = DebounceScheduler::new();
        scheduler.enqueue("a", FieldUpdate::status(InstanceStatus::Idle));
        assert!(scheduler.drain_if_due().is_none());
    }

    #[test]
    fn test_take_single_id() {
        let scheduler = DebounceScheduler::new();
        scheduler.enqueue("a", FieldUpdate::status(InstanceStatus::Idle));
        scheduler.enqueue("b", FieldUpdate::status(InstanceStatus::Error));

        let taken = scheduler.take("a").unwrap();
        assert_eq!(taken.status, Some(InstanceStatus::Idle));
        assert!(scheduler.take("a").is_none());
        assert!(!scheduler.is_empty());
    }
}
