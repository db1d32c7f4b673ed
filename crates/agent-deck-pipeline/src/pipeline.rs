//! The per-session display pipeline.
//!
//! One pipeline drives one emulator widget from one multiplexer session.
//! The display path is polling, not pty streaming: the pty attached here
//! exists so the multiplexer has a sized client for input and resize, and
//! its output bytes are drained and discarded. Polling keeps the emulator's
//! scrollback intact because we only ever emit sanitized history appends
//! and row-targeted viewport diffs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use agent_deck_core::{
    normalize_crlf, sanitize_history_for_scrollback, strip_tts_markers, Error, Result,
};
use agent_deck_mux::{locate_tmux, CaptureOptions, LocalPty, MuxAdapter, Pty, SshBridge};

use crate::events::{EventSender, TermEvent, TermEventKind};
use crate::history::{fetch_history_gap, HistoryTracker};

/// Poll cadence for local sessions.
pub const LOCAL_POLL_INTERVAL: Duration = Duration::from_millis(80);

/// Poll cadence for remote sessions.
pub const REMOTE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Settle delay between attach phases.
const ATTACH_SETTLE: Duration = Duration::from_millis(50);

/// Consecutive capture errors before a remote pipeline counts as lost.
pub const ERROR_BUDGET: u32 = 3;

/// Reconnect attempts before giving up.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

const RECONNECT_BASE_DELAY: Duration = Duration::from_millis(500);
const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Connection lifecycle of a remote pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Polling normally
    Connected,
    /// Error budget exhausted, reconnection pending
    Disconnected,
    /// Reconnection attempts in progress
    Reconnecting,
    /// Reconnection gave up; terminal state
    Failed,
}

/// Error-tracking state for a remote pipeline.
#[derive(Debug)]
pub struct PipelineConnection {
    /// Current lifecycle state
    pub state: ConnectionState,
    /// Failed captures since the last success
    pub consecutive_errors: u32,
    /// Reconnect attempts made in the current outage
    pub reconnect_attempts: u32,
    /// Polling is suppressed while true
    pub reconnecting: bool,
}

impl Default for PipelineConnection {
    fn default() -> Self {
        Self {
            state: ConnectionState::Connected,
            consecutive_errors: 0,
            reconnect_attempts: 0,
            reconnecting: false,
        }
    }
}

/// Static configuration of one pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Instance id events are tagged with
    pub session_id: String,
    /// Multiplexer session to mirror
    pub tmux_session: String,
    /// SSH host for remote sessions
    pub remote_host: Option<String>,
    /// Initial viewport width
    pub cols: u16,
    /// Initial viewport height
    pub rows: u16,
}

impl PipelineConfig {
    /// Whether the session lives on a remote host.
    pub fn is_remote(&self) -> bool {
        self.remote_host.is_some()
    }
}

/// The per-session machine driving one emulator widget.
pub struct DisplayPipeline {
    config: PipelineConfig,
    adapter: Arc<MuxAdapter>,
    bridge: Option<Arc<dyn SshBridge>>,
    events: EventSender,
    tracker: Arc<Mutex<HistoryTracker>>,
    connection: Arc<Mutex<PipelineConnection>>,
    dims: Mutex<(u16, u16)>,
    closed: Arc<AtomicBool>,
    pty: Arc<Mutex<Option<Box<dyn Pty>>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl DisplayPipeline {
    /// Create an unattached pipeline.
    pub fn new(
        config: PipelineConfig,
        adapter: Arc<MuxAdapter>,
        bridge: Option<Arc<dyn SshBridge>>,
        events: EventSender,
    ) -> Self {
        let rows = config.rows;
        let dims = (config.cols, config.rows);
        Self {
            config,
            adapter,
            bridge,
            events,
            tracker: Arc::new(Mutex::new(HistoryTracker::new(rows as usize))),
            connection: Arc::new(Mutex::new(PipelineConnection::default())),
            dims: Mutex::new(dims),
            closed: Arc::new(AtomicBool::new(false)),
            pty: Arc::new(Mutex::new(None)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// The instance id this pipeline is keyed by.
    pub fn session_id(&self) -> &str {
        &self.config.session_id
    }

    /// Whether close has been requested.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Current connection state (always `Connected` for local pipelines).
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.lock().unwrap().state
    }

    fn emit(&self, kind: TermEventKind) {
        let _ = self.events.send(TermEvent {
            session_id: self.config.session_id.clone(),
            kind,
        });
    }

    fn emit_data(&self, bytes: String) {
        self.emit(TermEventKind::Data(strip_tts_markers(&bytes)));
    }

    /// Attach to the multiplexer session and start polling.
    ///
    /// History is emitted before the first viewport diff, and the pty is
    /// attached for input/resize only. A session that cannot be resolved is
    /// an error; failed history emission is not.
    pub async fn attach(self: Arc<Self>) -> Result<()> {
        let name = self.config.tmux_session.clone();
        info!(session = %name, remote = self.config.is_remote(), "attaching pipeline");

        self.adapter.require_session(&name).await?;

        let (cols, rows) = *self.dims.lock().unwrap();
        if let Err(e) = self.adapter.resize_window(&name, cols, rows).await {
            debug!(session = %name, "attach resize failed: {e}");
        }
        tokio::time::sleep(ATTACH_SETTLE).await;

        // Scrollback first, so the emulator has history before any diff
        if let Err(e) = self.emit_history().await {
            warn!(session = %name, "history emission failed: {e}");
        }
        tokio::time::sleep(ATTACH_SETTLE).await;

        self.attach_pty(&name, cols, rows).await?;
        Self::spawn_drain_task(&self);
        Self::spawn_poll_task(&self);
        Ok(())
    }

    /// Capture, sanitize, and emit the full scrollback.
    pub async fn emit_history(&self) -> Result<()> {
        let captured = self
            .adapter
            .capture_pane(&self.config.tmux_session, CaptureOptions::history())
            .await?;
        let history = normalize_crlf(&sanitize_history_for_scrollback(&captured));
        self.emit(TermEventKind::History(strip_tts_markers(&history)));
        Ok(())
    }

    async fn attach_pty(&self, name: &str, cols: u16, rows: u16) -> Result<()> {
        match (&self.config.remote_host, &self.bridge) {
            (Some(host), Some(bridge)) => {
                match bridge.open_interactive_channel(host, name).await {
                    Ok(pty) => *self.pty.lock().unwrap() = Some(pty),
                    Err(e) => {
                        // Read-only degradation: polling still works
                        warn!(session = %name, "remote pty attach failed, read-only: {e}");
                    }
                }
                Ok(())
            }
            (Some(_), None) => {
                warn!(session = %name, "no bridge configured, read-only");
                Ok(())
            }
            (None, _) => {
                let pty = LocalPty::attach_multiplexer(&locate_tmux(), name, cols, rows)?;
                *self.pty.lock().unwrap() = Some(Box::new(pty));
                Ok(())
            }
        }
    }

    // The pty's output is not the display path; drain it so the kernel
    // buffer never fills and stalls the multiplexer client.
    fn spawn_drain_task(this: &Arc<Self>) {
        let pipeline = Arc::clone(this);
        let handle = tokio::spawn(async move {
            let mut buf = [0u8; 4096];
            loop {
                if pipeline.is_closed() {
                    break;
                }
                let result = {
                    let mut pty = pipeline.pty.lock().unwrap();
                    match pty.as_mut() {
                        Some(pty) => pty.read(&mut buf),
                        None => break,
                    }
                };
                if result.is_err() {
                    debug!(session = %pipeline.config.tmux_session, "pty drain ended");
                    break;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        });
        this.tasks.lock().unwrap().push(handle);
    }

    fn spawn_poll_task(this: &Arc<Self>) {
        let pipeline = Arc::clone(this);
        let period = if this.config.is_remote() {
            REMOTE_POLL_INTERVAL
        } else {
            LOCAL_POLL_INTERVAL
        };

        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                if pipeline.is_closed() {
                    break;
                }
                {
                    let conn = pipeline.connection.lock().unwrap();
                    if conn.reconnecting || conn.state == ConnectionState::Failed {
                        continue;
                    }
                }
                if !Self::poll_once(&pipeline).await {
                    break;
                }
            }
            debug!(session = %pipeline.config.tmux_session, "poll loop ended");
        });
        this.tasks.lock().unwrap().push(handle);
    }

    /// One polling tick. Returns false when the pipeline should stop.
    async fn poll_once(this: &Arc<Self>) -> bool {
        let name = &this.config.tmux_session;

        let (history_size, alt) = match this.adapter.history_size_and_alt_screen(name).await {
            Ok(pair) => pair,
            Err(e) => return Self::on_poll_error(this, e).await,
        };
        this.on_poll_success();

        {
            let mut tracker = this.tracker.lock().unwrap();
            if tracker.in_alt_screen() != alt {
                tracker.set_alt_screen(alt);
            }
        }

        // History gap first, then the viewport diff for the same tick
        if !alt {
            match fetch_history_gap(&this.tracker, &this.adapter, name, history_size).await {
                Ok(gap) if !gap.is_empty() => this.emit_data(gap),
                Ok(_) => {}
                Err(e) => return Self::on_poll_error(this, e).await,
            }
        }

        match this.adapter.capture_pane(name, CaptureOptions::viewport()).await {
            Ok(snapshot) => {
                let diff = this.tracker.lock().unwrap().diff_viewport(&snapshot);
                // A bare hide-cursor means nothing changed
                if diff != "\x1b[?25l" {
                    this.emit_data(diff);
                }
                true
            }
            Err(e) => Self::on_poll_error(this, e).await,
        }
    }

    /// Handle a failed capture. Returns false when polling should stop.
    async fn on_poll_error(this: &Arc<Self>, error: Error) -> bool {
        let name = &this.config.tmux_session;

        if !this.config.is_remote() {
            // Local errors are either transient or the session is simply gone
            if !this.adapter.has_session(name).await {
                info!(session = %name, "local session gone, emitting exit");
                this.emit(TermEventKind::Exit("session ended".to_string()));
                this.closed.store(true, Ordering::SeqCst);
                return false;
            }
            debug!(session = %name, "transient local poll error: {error}");
            return true;
        }

        let lost = {
            let mut conn = this.connection.lock().unwrap();
            conn.consecutive_errors += 1;
            debug!(
                session = %name,
                errors = conn.consecutive_errors,
                "remote poll error: {error}"
            );
            if conn.consecutive_errors >= ERROR_BUDGET
                && conn.state == ConnectionState::Connected
            {
                conn.state = ConnectionState::Disconnected;
                conn.reconnecting = true;
                true
            } else {
                false
            }
        };

        if lost {
            this.emit(TermEventKind::ConnectionLost);
            Self::spawn_reconnect_task(this);
        }
        true
    }

    fn on_poll_success(&self) {
        let restored = {
            let mut conn = self.connection.lock().unwrap();
            let had_errors =
                conn.consecutive_errors > 0 && conn.state == ConnectionState::Connected;
            conn.consecutive_errors = 0;
            had_errors
        };
        if restored {
            self.emit(TermEventKind::ConnectionRestored);
        }
    }

    fn spawn_reconnect_task(this: &Arc<Self>) {
        let pipeline = Arc::clone(this);
        let handle = tokio::spawn(async move {
            pipeline.connection.lock().unwrap().state = ConnectionState::Reconnecting;
            let name = pipeline.config.tmux_session.clone();

            for attempt in 1..=MAX_RECONNECT_ATTEMPTS {
                let delay = RECONNECT_BASE_DELAY
                    .saturating_mul(1 << (attempt - 1))
                    .min(RECONNECT_MAX_DELAY);
                tokio::time::sleep(delay).await;
                if pipeline.is_closed() {
                    return;
                }

                pipeline.emit(TermEventKind::Reconnecting { attempt });
                pipeline.connection.lock().unwrap().reconnect_attempts = attempt;

                if !pipeline.adapter.probe().await {
                    continue;
                }

                // Transport is back; the session itself may not be
                if pipeline.adapter.has_session(&name).await {
                    {
                        let mut conn = pipeline.connection.lock().unwrap();
                        conn.state = ConnectionState::Connected;
                        conn.consecutive_errors = 0;
                        conn.reconnect_attempts = 0;
                        conn.reconnecting = false;
                    }
                    info!(session = %name, attempt, "reconnected");
                    pipeline.emit(TermEventKind::ConnectionRestored);
                } else {
                    info!(session = %name, "connection recovered but session is gone");
                    pipeline.emit(TermEventKind::Exit(
                        "remote session no longer exists".to_string(),
                    ));
                    pipeline.closed.store(true, Ordering::SeqCst);
                }
                return;
            }

            {
                let mut conn = pipeline.connection.lock().unwrap();
                conn.state = ConnectionState::Failed;
                conn.reconnecting = false;
            }
            warn!(session = %name, "reconnection attempts exhausted");
            pipeline.emit(TermEventKind::ConnectionFailed);
        });
        this.tasks.lock().unwrap().push(handle);
    }

    /// Route user input to the multiplexer.
    pub async fn send_input(&self, data: &str) -> Result<()> {
        self.adapter
            .send_input(&self.config.tmux_session, data)
            .await
    }

    /// Propagate a resize: pty first, then the multiplexer window, then
    /// invalidate the diff baseline (content reflows).
    pub async fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        *self.dims.lock().unwrap() = (cols, rows);

        if let Some(pty) = self.pty.lock().unwrap().as_mut() {
            if let Err(e) = pty.resize(cols, rows) {
                debug!("pty resize failed: {e}");
            }
        }
        self.adapter
            .resize_window(&self.config.tmux_session, cols, rows)
            .await?;

        let mut tracker = self.tracker.lock().unwrap();
        tracker.reset();
        tracker.set_viewport_rows(rows as usize);
        Ok(())
    }

    /// Re-emit the full sanitized scrollback on request.
    pub async fn refresh_scrollback(&self) -> Result<()> {
        self.emit_history().await
    }

    /// Stop polling, close the pty, and cancel background tasks.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(session = %self.config.tmux_session, "closing pipeline");

        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
        if let Some(mut pty) = self.pty.lock().unwrap().take() {
            if let Err(e) = pty.close() {
                debug!("pty close failed: {e}");
            }
        }
    }
}

impl Drop for DisplayPipeline {
    fn drop(&mut self) {
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
    }
}
