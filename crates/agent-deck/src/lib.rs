//! # agent-deck
//!
//! Desktop terminal host for long-lived tmux sessions.
//!
//! ## Overview
//!
//! agent-deck attaches to multiplexer sessions - local or reached over SSH -
//! and drives a web-based terminal emulator in a native webview. The
//! multiplexer owns session persistence; this process owns the display
//! pipeline, status inference, and the shared on-disk state cooperating
//! windows coordinate through.
//!
//! ## Architecture
//!
//! This is the host binary that ties together:
//! - agent-deck-core: core types, config, sanitizers
//! - agent-deck-mux: multiplexer adapter and pty supervisor
//! - agent-deck-store: session store, window registry, tab state
//! - agent-deck-detector: session status inference
//! - agent-deck-pipeline: display pipelines and the terminal manager

pub mod host;

pub use host::DeckHost;
