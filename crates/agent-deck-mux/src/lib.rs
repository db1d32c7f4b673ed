//! # agent-deck-mux
//!
//! Multiplexer adapter and PTY supervisor for agent-deck.
//!
//! This crate wraps the multiplexer's command-line surface behind one
//! adapter that is polymorphic over local subprocess execution and remote
//! execution through the SSH bridge, and supervises the input/resize pty a
//! pipeline attaches to a live session.

pub mod adapter;
pub mod bridge;
pub mod executor;
pub mod keys;
pub mod pty;
pub mod quote;

pub use adapter::{CaptureOptions, MuxAdapter};
pub use bridge::SshBridge;
pub use executor::{locate_tmux, CommandExecutor, LocalExecutor, RemoteExecutor};
pub use keys::{split_input, InputChunk};
pub use pty::{LocalPty, Pty};
pub use quote::{compose_remote_command, shell_quote, validate_remote_arg};
