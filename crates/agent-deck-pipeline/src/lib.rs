//! # agent-deck-pipeline
//!
//! The terminal display pipeline for agent-deck.
//!
//! Each attached session gets one [`DisplayPipeline`]: it seeds the
//! emulator with sanitized scrollback, then polls the multiplexer for pane
//! state, fetching history gaps and emitting minimal viewport diffs. Remote
//! pipelines additionally track an error budget and run bounded-backoff
//! reconnection. The [`TerminalManager`] owns all pipelines and routes
//! their events onto one shared channel to the GUI.

pub mod events;
pub mod history;
pub mod manager;
pub mod pipeline;
pub mod uploads;

pub use events::{event_channel, EventReceiver, EventSender, TermEvent, TermEventKind};
pub use history::{fetch_history_gap, HistoryTracker};
pub use manager::TerminalManager;
pub use pipeline::{
    ConnectionState, DisplayPipeline, PipelineConfig, PipelineConnection, ERROR_BUDGET,
    LOCAL_POLL_INTERVAL, MAX_RECONNECT_ATTEMPTS, REMOTE_POLL_INTERVAL,
};
pub use uploads::{UploadedFile, UploadedFileRegistry};
