//! # agent-deck-store
//!
//! Shared on-disk state for agent-deck.
//!
//! Three stores live under `~/.agent-deck` and are written concurrently by
//! peer desktop processes:
//!
//! - the session store (`profiles/default/sessions.json`)
//! - the window registry (`window-state.json`)
//! - per-window tab layouts (`desktop/open_tabs.json`)
//!
//! All of them follow the same discipline: advisory file locks around every
//! load-mutate-save, atomic temp-and-rename writes, and corrupt-tolerant
//! reads. The session store additionally coalesces this process's own
//! bursty updates through a flushable debounce scheduler.

pub mod debounce;
pub mod lock;
pub mod store;
pub mod tabs;
pub mod windows;

pub use debounce::{DebounceScheduler, FieldUpdate, DEBOUNCE_WINDOW};
pub use store::{SessionStore, StorageData};
pub use tabs::{TabRecord, TabStateStore, WindowTabs};
pub use windows::{WindowEntry, WindowRegistry, WINDOW_NUM_ENV};
