//! The command surface the GUI shell drives.
//!
//! One [`DeckHost`] per window process. It owns the terminal manager, the
//! shared stores, and the status detector, and exposes the synchronous
//! ok-or-message commands the emulator widget calls.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{info, warn};

use agent_deck_core::{DeckConfig, Error, Instance, Result, Tool};
use agent_deck_detector::{DetectorConfig, StatusDetector, StatusUpdate};
use agent_deck_mux::{LocalExecutor, MuxAdapter, RemoteExecutor, SshBridge};
use agent_deck_pipeline::{EventSender, PipelineConfig, TerminalManager};
use agent_deck_store::{FieldUpdate, SessionStore, TabStateStore, WindowRegistry};

/// Cadence of the background status sweep.
const STATUS_SWEEP_INTERVAL: Duration = Duration::from_secs(2);

/// The per-process host tying pipelines, stores, and detection together.
pub struct DeckHost {
    config: DeckConfig,
    store: Arc<SessionStore>,
    manager: Arc<TerminalManager>,
    windows: WindowRegistry,
    tabs: TabStateStore,
    local_adapter: Arc<MuxAdapter>,
    bridge: Option<Arc<dyn SshBridge>>,
    detector: StatusDetector,
    window_number: Mutex<Option<u32>>,
    tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl DeckHost {
    /// Build a host over the default stores and a fresh local adapter.
    pub fn new(
        config: DeckConfig,
        events: EventSender,
        bridge: Option<Arc<dyn SshBridge>>,
    ) -> Self {
        let local_adapter = Arc::new(MuxAdapter::new(Arc::new(LocalExecutor::new())));
        Self::with_parts(
            config,
            events,
            bridge,
            local_adapter,
            Arc::new(SessionStore::new()),
            WindowRegistry::new(),
            TabStateStore::new(),
        )
    }

    /// Build a host from explicit parts (tests, alternate profiles).
    pub fn with_parts(
        config: DeckConfig,
        events: EventSender,
        bridge: Option<Arc<dyn SshBridge>>,
        local_adapter: Arc<MuxAdapter>,
        store: Arc<SessionStore>,
        windows: WindowRegistry,
        tabs: TabStateStore,
    ) -> Self {
        let detector = StatusDetector::new(
            Arc::clone(&local_adapter),
            DetectorConfig {
                file_detection_enabled: config
                    .desktop
                    .terminal
                    .file_based_activity_detection,
            },
        );
        Self {
            config,
            store,
            manager: Arc::new(TerminalManager::new(events, bridge.clone())),
            windows,
            tabs,
            local_adapter,
            bridge,
            detector,
            window_number: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Effective configuration.
    pub fn config(&self) -> &DeckConfig {
        &self.config
    }

    /// The terminal manager.
    pub fn manager(&self) -> &Arc<TerminalManager> {
        &self.manager
    }

    /// The session store.
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// The per-window tab state store.
    pub fn tabs(&self) -> &TabStateStore {
        &self.tabs
    }

    /// Start shared services: the multiplexer server, window registration,
    /// the debounce flusher, and the status sweep.
    pub async fn startup(this: &Arc<Self>) -> Result<()> {
        this.local_adapter.start_server().await;

        let n = this.windows.register_window()?;
        *this.window_number.lock().unwrap() = Some(n);
        info!(window = n, "window registered");

        this.tasks
            .lock()
            .unwrap()
            .push(Arc::clone(&this.store).spawn_flusher());

        let host = Arc::clone(this);
        let sweep = tokio::spawn(async move {
            let mut tick = tokio::time::interval(STATUS_SWEEP_INTERVAL);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                if let Err(e) = host.sweep_statuses().await {
                    warn!("status sweep failed: {e}");
                }
            }
        });
        this.tasks.lock().unwrap().push(sweep);
        Ok(())
    }

    /// Orderly shutdown: pipelines, pending writes, window slot.
    pub async fn shutdown(&self) {
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
        if let Err(e) = self.manager.close_all().await {
            warn!("close_all: {e}");
        }
        if let Err(e) = self.store.flush_pending() {
            warn!("flush_pending: {e}");
        }
        let n = self.window_number.lock().unwrap().take();
        if let Some(n) = n {
            if let Err(e) = self.windows.unregister_window(n) {
                warn!("unregister_window({n}): {e}");
            }
        }
        info!("host shut down");
    }

    fn adapter_for(&self, inst: &Instance) -> Result<Arc<MuxAdapter>> {
        match &inst.remote_host {
            None => Ok(Arc::clone(&self.local_adapter)),
            Some(host) => {
                let bridge = self
                    .bridge
                    .clone()
                    .ok_or_else(|| Error::Config("remote session but no SSH bridge".into()))?;
                Ok(Arc::new(MuxAdapter::new(Arc::new(RemoteExecutor::new(
                    bridge,
                    host.clone(),
                )))))
            }
        }
    }

    /// Create a new local session: detached multiplexer session plus a
    /// persisted instance.
    pub async fn create_session(
        &self,
        title: &str,
        project_path: &str,
        tool: Tool,
    ) -> Result<Instance> {
        let inst = Instance::new(title, project_path, tool);
        self.local_adapter
            .new_session_detached(&inst.tmux_session, project_path)
            .await?;
        self.store.append_instance(inst.clone())?;
        info!(id = %inst.id, session = %inst.tmux_session, "session created");
        Ok(inst)
    }

    /// Attach the display pipeline for a stored session.
    pub async fn start_session(&self, session_id: &str, cols: u16, rows: u16) -> Result<()> {
        let inst = self
            .store
            .get_instance(session_id)?
            .ok_or_else(|| Error::SessionAbsent(session_id.to_string()))?;

        let config = PipelineConfig {
            session_id: inst.id.clone(),
            tmux_session: inst.mux_target().to_string(),
            remote_host: inst.remote_host.clone(),
            cols,
            rows,
        };
        let adapter = self.adapter_for(&inst)?;
        self.manager.get_or_create(config, adapter).await?;

        self.store.schedule_update(
            session_id,
            FieldUpdate {
                last_accessed_at: Some(chrono::Utc::now()),
                ..FieldUpdate::default()
            },
        );
        Ok(())
    }

    /// Route emulator input to a session.
    pub async fn send_input(&self, session_id: &str, data: &str) -> Result<()> {
        self.manager
            .get(session_id)
            .ok_or_else(|| Error::SessionAbsent(session_id.to_string()))?
            .send_input(data)
            .await
    }

    /// Resize a session's viewport.
    pub async fn resize(&self, session_id: &str, cols: u16, rows: u16) -> Result<()> {
        self.manager
            .get(session_id)
            .ok_or_else(|| Error::SessionAbsent(session_id.to_string()))?
            .resize(cols, rows)
            .await
    }

    /// Tear down a session's pipeline. The multiplexer session survives.
    pub async fn close(&self, session_id: &str) -> Result<()> {
        self.manager.close(session_id).await
    }

    /// Re-emit a session's full scrollback.
    pub async fn refresh_scrollback(&self, session_id: &str) -> Result<()> {
        self.manager
            .get(session_id)
            .ok_or_else(|| Error::SessionAbsent(session_id.to_string()))?
            .refresh_scrollback()
            .await
    }

    /// Kill a session's multiplexer session and delete its record.
    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        if self.manager.get(session_id).is_some() {
            self.manager.close(session_id).await?;
        }
        if let Some(inst) = self.store.get_instance(session_id)? {
            if !inst.is_remote() {
                if let Err(e) = self.local_adapter.kill_session(&inst.tmux_session).await {
                    warn!(session = %inst.tmux_session, "kill-session failed: {e}");
                }
            }
        }
        self.store.delete_instance(session_id)
    }

    /// One detection pass: classify every stored session and persist the
    /// changes. Returns all updates so the GUI can refresh ribbons.
    pub async fn sweep_statuses(&self) -> Result<Vec<StatusUpdate>> {
        let data = self.store.load()?;
        let live = self.local_adapter.list_sessions().await;
        let updates = self.detector.detect_all(&data.instances, &live).await;

        for update in &updates {
            if let Some(discovered) = &update.discovered_session_id {
                let inst = data.instances.iter().find(|i| i.id == update.id);
                let field = match inst.map(|i| &i.tool) {
                    Some(Tool::Claude) => FieldUpdate {
                        claude_session_id: Some(discovered.clone()),
                        ..FieldUpdate::default()
                    },
                    Some(Tool::Gemini) => FieldUpdate {
                        gemini_session_id: Some(discovered.clone()),
                        ..FieldUpdate::default()
                    },
                    _ => FieldUpdate::default(),
                };
                self.store.schedule_update(&update.id, field);
            }
            if update.changed {
                self.store.schedule_update(
                    &update.id,
                    FieldUpdate {
                        status: Some(update.status),
                        waiting_since: update.waiting_since,
                        clear_waiting_since: update.clear_waiting_since,
                        ..FieldUpdate::default()
                    },
                );
            }
        }
        Ok(updates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_deck_core::InstanceStatus;
    use agent_deck_mux::executor::testing::ScriptedExecutor;
    use agent_deck_pipeline::event_channel;
    use tempfile::tempdir;

    fn host_in(
        dir: &tempfile::TempDir,
        exec: Arc<ScriptedExecutor>,
    ) -> (Arc<DeckHost>, agent_deck_pipeline::EventReceiver) {
        let (tx, rx) = event_channel();
        let host = DeckHost::with_parts(
            DeckConfig::default().normalized(),
            tx,
            None,
            Arc::new(MuxAdapter::new(exec)),
            Arc::new(SessionStore::at_path(dir.path().join("sessions.json"))),
            WindowRegistry::at_path(dir.path().join("window-state.json")),
            TabStateStore::at_path(dir.path().join("open_tabs.json")),
        );
        (Arc::new(host), rx)
    }

    #[tokio::test]
    async fn test_create_session_persists_instance() {
        let dir = tempdir().unwrap();
        let exec = Arc::new(ScriptedExecutor::new());
        let (host, _rx) = host_in(&dir, exec.clone());

        let inst = host
            .create_session("demo", "/home/u/dev/p", Tool::Claude)
            .await
            .unwrap();

        assert!(inst.tmux_session.starts_with("agentdeck_"));
        let stored = host.store().get_instance(&inst.id).unwrap().unwrap();
        assert_eq!(stored.title, "demo");

        let calls = exec.recorded();
        assert_eq!(calls[0][0], "new-session");
    }

    #[tokio::test]
    async fn test_start_session_unknown_id_errors() {
        let dir = tempdir().unwrap();
        let exec = Arc::new(ScriptedExecutor::new());
        let (host, _rx) = host_in(&dir, exec);

        let result = host.start_session("deadbeef-1700000000", 80, 24).await;
        assert!(matches!(result, Err(Error::SessionAbsent(_))));
    }

    #[tokio::test]
    async fn test_send_input_requires_pipeline() {
        let dir = tempdir().unwrap();
        let exec = Arc::new(ScriptedExecutor::new());
        let (host, _rx) = host_in(&dir, exec);

        let result = host.send_input("nope", "hello").await;
        assert!(matches!(result, Err(Error::SessionAbsent(_))));
    }

    #[tokio::test]
    async fn test_sweep_marks_dead_sessions_exited() {
        let dir = tempdir().unwrap();
        let exec = Arc::new(ScriptedExecutor::new());
        let (host, _rx) = host_in(&dir, exec.clone());

        let inst = host
            .create_session("demo", "/home/u/dev/p", Tool::Shell)
            .await
            .unwrap();

        // list-sessions comes back without our session
        exec.push_reply(Ok(String::new()));
        let updates = host.sweep_statuses().await.unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].status, InstanceStatus::Exited);

        host.store().flush_pending().unwrap();
        let stored = host.store().get_instance(&inst.id).unwrap().unwrap();
        assert_eq!(stored.status, InstanceStatus::Exited);
    }

    #[tokio::test]
    async fn test_delete_session_kills_and_removes() {
        let dir = tempdir().unwrap();
        let exec = Arc::new(ScriptedExecutor::new());
        let (host, _rx) = host_in(&dir, exec.clone());

        let inst = host
            .create_session("demo", "/home/u/dev/p", Tool::Shell)
            .await
            .unwrap();

        host.delete_session(&inst.id).await.unwrap();
        assert!(host.store().get_instance(&inst.id).unwrap().is_none());
        assert!(exec
            .recorded()
            .iter()
            .any(|call| call[0] == "kill-session"));
    }
}
