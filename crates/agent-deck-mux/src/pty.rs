//! PTY supervision with portable-pty.
//!
//! The display path polls the multiplexer; the pty here exists for input
//! and resize proxying, so its output is read and discarded by the owning
//! pipeline. Local ptys wrap the native pty system; remote ptys come from
//! the SSH bridge's interactive channel and implement the same trait.

use std::io::{Read, Write};
use std::path::Path;

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tracing::{debug, error, info};

use agent_deck_core::{Error, Result};

/// The capability set a pipeline needs from a terminal handle.
pub trait Pty: Send {
    /// Read available bytes without blocking. `Ok(0)` means no data.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write bytes to the terminal.
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Propagate a new size to the terminal.
    fn resize(&mut self, cols: u16, rows: u16) -> Result<()>;

    /// Terminate the underlying process or channel.
    fn close(&mut self) -> Result<()>;
}

/// A local pty running a spawned process.
pub struct LocalPty {
    master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
    reader: Box<dyn Read + Send>,
    writer: Box<dyn Write + Send>,
}

impl std::fmt::Debug for LocalPty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalPty").finish_non_exhaustive()
    }
}

impl LocalPty {
    /// Spawn `command args...` in a fresh pty of the given size.
    pub fn spawn(command: &str, args: &[String], cols: u16, rows: u16) -> Result<Self> {
        info!(command, ?args, cols, rows, "spawning pty");

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| Error::PtyFailure(format!("openpty: {e}")))?;

        let mut cmd = CommandBuilder::new(command);
        for arg in args {
            cmd.arg(arg);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| Error::PtyFailure(format!("spawn {command}: {e}")))?;

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| Error::PtyFailure(format!("take writer: {e}")))?;
        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| Error::PtyFailure(format!("clone reader: {e}")))?;

        // Non-blocking reads are required: the owning pipeline drains this
        // pty on a timer tick and must never stall the loop.
        #[cfg(unix)]
        if let Some(master_fd) = pair.master.as_raw_fd() {
            unsafe {
                let flags = libc::fcntl(master_fd, libc::F_GETFL, 0);
                if flags == -1
                    || libc::fcntl(master_fd, libc::F_SETFL, flags | libc::O_NONBLOCK) == -1
                {
                    error!("failed to set pty master fd non-blocking");
                }
            }
        }

        Ok(Self {
            master: pair.master,
            child,
            reader,
            writer,
        })
    }

    /// Attach to a live multiplexer session for input/resize proxying.
    pub fn attach_multiplexer(tmux_bin: &Path, session: &str, cols: u16, rows: u16) -> Result<Self> {
        debug!(session, "attaching pty to multiplexer session");
        Self::spawn(
            &tmux_bin.to_string_lossy(),
            &[
                "attach-session".to_string(),
                "-t".to_string(),
                session.to_string(),
            ],
            cols,
            rows,
        )
    }

    /// Whether the child process is still running.
    pub fn is_alive(&mut self) -> bool {
        self.child.try_wait().ok().flatten().is_none()
    }
}

impl Pty for LocalPty {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.reader.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(Error::PtyFailure(format!("read: {e}"))),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.writer
            .write_all(data)
            .and_then(|_| self.writer.flush())
            .map_err(|e| Error::PtyFailure(format!("write: {e}")))
    }

    fn resize(&mut self, cols: u16, rows: u16) -> Result<()> {
        self.master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| Error::PtyFailure(format!("resize: {e}")))
    }

    fn close(&mut self) -> Result<()> {
        debug!("closing pty");
        self.child
            .kill()
            .map_err(|e| Error::PtyFailure(format!("kill: {e}")))
    }
}
