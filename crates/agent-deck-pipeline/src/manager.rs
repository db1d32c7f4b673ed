//! Terminal manager: one pipeline per session id.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use agent_deck_core::{Error, Result};
use agent_deck_mux::{MuxAdapter, SshBridge};

use crate::events::EventSender;
use crate::pipeline::{DisplayPipeline, PipelineConfig};
use crate::uploads::UploadedFileRegistry;

/// Owns every live display pipeline, keyed by session id.
///
/// The shared event sender and SSH bridge are handed to each pipeline at
/// construction; both outlive any pipeline.
pub struct TerminalManager {
    pipelines: RwLock<HashMap<String, Arc<DisplayPipeline>>>,
    events: EventSender,
    bridge: Option<Arc<dyn SshBridge>>,
    uploads: UploadedFileRegistry,
}

impl TerminalManager {
    /// Create a manager emitting on `events`.
    pub fn new(events: EventSender, bridge: Option<Arc<dyn SshBridge>>) -> Self {
        Self {
            pipelines: RwLock::new(HashMap::new()),
            events,
            bridge,
            uploads: UploadedFileRegistry::new(),
        }
    }

    /// The upload registry shared with the GUI's file-drop path.
    pub fn uploads(&self) -> &UploadedFileRegistry {
        &self.uploads
    }

    /// Get the existing pipeline for `config.session_id`, or create and
    /// attach a new one.
    pub async fn get_or_create(
        &self,
        config: PipelineConfig,
        adapter: Arc<MuxAdapter>,
    ) -> Result<Arc<DisplayPipeline>> {
        if let Some(existing) = self.get(&config.session_id) {
            return Ok(existing);
        }

        let session_id = config.session_id.clone();
        let pipeline = Arc::new(DisplayPipeline::new(
            config,
            adapter,
            self.bridge.clone(),
            self.events.clone(),
        ));
        Arc::clone(&pipeline).attach().await?;

        let mut pipelines = self.pipelines.write().unwrap();
        // A racing create may have won; prefer the one already attached
        if let Some(existing) = pipelines.get(&session_id) {
            pipeline.close();
            return Ok(Arc::clone(existing));
        }
        pipelines.insert(session_id, Arc::clone(&pipeline));
        Ok(pipeline)
    }

    /// Look up a pipeline by session id.
    pub fn get(&self, session_id: &str) -> Option<Arc<DisplayPipeline>> {
        self.pipelines.read().unwrap().get(session_id).cloned()
    }

    /// Close and remove one pipeline, cleaning up its uploads.
    pub async fn close(&self, session_id: &str) -> Result<()> {
        let pipeline = self
            .pipelines
            .write()
            .unwrap()
            .remove(session_id)
            .ok_or_else(|| Error::SessionAbsent(session_id.to_string()))?;
        pipeline.close();
        self.uploads
            .cleanup_session(self.bridge.as_deref(), session_id)
            .await;
        info!(session_id, "pipeline closed");
        Ok(())
    }

    /// Close every pipeline, aggregating any failures into one error.
    pub async fn close_all(&self) -> Result<()> {
        let ids: Vec<String> = self.pipelines.read().unwrap().keys().cloned().collect();

        let mut failures = Vec::new();
        for id in ids {
            if let Err(e) = self.close(&id).await {
                warn!(session_id = %id, "close failed: {e}");
                failures.push(format!("{id}: {e}"));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Other(format!(
                "failed to close {} pipeline(s): {}",
                failures.len(),
                failures.join("; ")
            )))
        }
    }

    /// Number of live pipelines.
    pub fn count(&self) -> usize {
        self.pipelines.read().unwrap().len()
    }

    /// Session ids with live pipelines.
    pub fn list(&self) -> Vec<String> {
        self.pipelines.read().unwrap().keys().cloned().collect()
    }
}
