//! SSH bridge seam.
//!
//! The transport itself lives outside this workspace; the host only needs a
//! way to run a command on a host and to open an interactive channel
//! attached to a remote multiplexer session. Both are modeled as one trait
//! so remote executors and remote ptys can share a single bridge object.

use async_trait::async_trait;

use agent_deck_core::Result;

use crate::pty::Pty;

/// The capability the SSH transport exposes to this workspace.
#[async_trait]
pub trait SshBridge: Send + Sync {
    /// Run a shell command on `host`, returning its stdout.
    async fn run_command(&self, host: &str, command: &str) -> Result<String>;

    /// Open an interactive channel attached to `session` on `host`.
    async fn open_interactive_channel(&self, host: &str, session: &str) -> Result<Box<dyn Pty>>;
}

/// Test doubles for the bridge seam.
pub mod testing {
    use super::*;
    use agent_deck_core::Error;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// A scripted bridge that records every command and pops canned replies.
    #[derive(Default)]
    pub struct ScriptedBridge {
        /// Commands seen, in order
        pub commands: Mutex<Vec<(String, String)>>,
        /// Replies returned in order; empty means `Ok("")` forever
        pub replies: Mutex<VecDeque<Result<String>>>,
    }

    impl ScriptedBridge {
        /// Create a bridge with no scripted replies.
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a reply for the next command.
        pub fn push_reply(&self, reply: Result<String>) {
            self.replies.lock().unwrap().push_back(reply);
        }

        /// Commands recorded so far.
        pub fn recorded(&self) -> Vec<(String, String)> {
            self.commands.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SshBridge for ScriptedBridge {
        async fn run_command(&self, host: &str, command: &str) -> Result<String> {
            self.commands
                .lock()
                .unwrap()
                .push((host.to_string(), command.to_string()));
            match self.replies.lock().unwrap().pop_front() {
                Some(reply) => reply,
                None => Ok(String::new()),
            }
        }

        async fn open_interactive_channel(
            &self,
            _host: &str,
            _session: &str,
        ) -> Result<Box<dyn Pty>> {
            Err(Error::PtyFailure("scripted bridge has no channels".into()))
        }
    }
}
