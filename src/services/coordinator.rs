use crate::config::PipelineConfig;
use crate::error::{AppError, Result};
use crate::models::entry::{ClassificationResult, Entry};
use crate::models::stats_types::Stats;
use crate::services::artifact_store::ArtifactStore;
use crate::services::capture::{CaptureDevice, CaptureSession, DirectoryCaptureDevice};
use crate::services::classifier::Classifier;
use crate::services::db::EntryStore;
use crate::services::stats;
use chrono::Utc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PipelineState {
    Idle = 0,
    Capturing = 1,
    Classifying = 2,
    AwaitingConfirm = 3,
}

impl PipelineState {
    fn from_u8(value: u8) -> PipelineState {
        match value {
            1 => PipelineState::Capturing,
            2 => PipelineState::Classifying,
            3 => PipelineState::AwaitingConfirm,
            _ => PipelineState::Idle,
        }
    }
}

/// Notifications pushed to the presentation layer.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    ResultReady(ClassificationResult),
    EntriesChanged(Vec<Entry>),
    StatsChanged(Stats),
    Error { kind: &'static str, message: String },
}

/// Sequences Capture Session -> Classifier -> (on confirmation)
/// Artifact Store + Entry Store.
///
/// Single-flight: at most one capture/classify cycle is active per
/// coordinator, enforced by atomic compare-and-transition on the state
/// machine rather than a guard flag. A second `request_capture` while a
/// cycle is in flight is rejected synchronously with `Busy`.
pub struct Coordinator<D: CaptureDevice> {
    session: CaptureSession<D>,
    classifier: Classifier,
    entries: EntryStore,
    artifacts: ArtifactStore,
    state: AtomicU8,
    pending: Mutex<Option<ClassificationResult>>,
    event_tx: broadcast::Sender<PipelineEvent>,
    kg_co2_per_item: f64,
}

impl<D: CaptureDevice> Coordinator<D> {
    pub fn new(
        session: CaptureSession<D>,
        classifier: Classifier,
        entries: EntryStore,
        artifacts: ArtifactStore,
        kg_co2_per_item: f64,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            session,
            classifier,
            entries,
            artifacts,
            state: AtomicU8::new(PipelineState::Idle as u8),
            pending: Mutex::new(None),
            event_tx,
            kg_co2_per_item,
        }
    }

    /// Build the whole pipeline from configuration: store instances are
    /// constructed here and injected, never global.
    pub fn from_config(config: &PipelineConfig, device: D) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir).map_err(|e| {
            AppError::Config(format!(
                "cannot create {}: {}",
                config.data_dir.display(),
                e
            ))
        })?;
        let entries = EntryStore::new(config.db_path())?;
        let artifacts = ArtifactStore::new(config.artifacts_dir())?;
        let classifier = Classifier::new(config.model_path.clone(), config.crop_size);
        let session = CaptureSession::new(device);
        Ok(Self::new(
            session,
            classifier,
            entries,
            artifacts,
            config.kg_co2_per_item,
        ))
    }

    pub fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn capture_session(&self) -> &CaptureSession<D> {
        &self.session
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.event_tx.subscribe()
    }

    fn transition(&self, from: PipelineState, to: PipelineState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn set_state(&self, to: PipelineState) {
        self.state.store(to as u8, Ordering::Release);
    }

    fn emit(&self, event: PipelineEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }

    fn emit_error(&self, error: &AppError) {
        self.emit(PipelineEvent::Error {
            kind: error.kind(),
            message: error.to_string(),
        });
    }

    fn emit_data_changed(&self) {
        let all = match self.entries.fetch_all() {
            Ok(all) => all,
            Err(e) => {
                tracing::warn!(error = %e, "cannot refresh entries for change event");
                return;
            }
        };
        self.emit(PipelineEvent::StatsChanged(stats::snapshot(
            &all,
            self.kg_co2_per_item,
            Utc::now(),
        )));
        self.emit(PipelineEvent::EntriesChanged(all));
    }

    /// Request camera access and begin the device stream.
    pub async fn start_session(&self) -> Result<()> {
        self.session.request_permission().await?;
        self.session.start()
    }

    /// Run one capture/classify cycle and park the result for
    /// confirmation. Rejected with `Busy` unless the pipeline is idle.
    pub async fn request_capture(&self) -> Result<ClassificationResult> {
        if !self.transition(PipelineState::Idle, PipelineState::Capturing) {
            return Err(AppError::Busy);
        }

        let frame = match self.session.capture().await {
            Ok(frame) => frame,
            Err(e) => {
                self.set_state(PipelineState::Idle);
                self.emit_error(&e);
                return Err(e);
            }
        };

        self.set_state(PipelineState::Classifying);
        // Total: classification failures resolve to the fallback result.
        let result = self.classifier.classify(frame).await;

        *self.pending.lock().await = Some(result.clone());
        self.set_state(PipelineState::AwaitingConfirm);
        self.emit(PipelineEvent::ResultReady(result.clone()));

        Ok(result)
    }

    /// Persist the pending result: artifact save is best-effort, entry
    /// creation is not. Valid only in `AwaitingConfirm`.
    pub async fn confirm(&self) -> Result<Entry> {
        // The pending lock is held across the transition: once the CAS
        // releases the machine to Idle, a new cycle may start, but it
        // blocks on this lock before it can replace the pending result.
        let result = {
            let mut pending = self.pending.lock().await;
            if !self.transition(PipelineState::AwaitingConfirm, PipelineState::Idle) {
                return Err(AppError::InvalidState("no result awaiting confirmation"));
            }
            pending
                .take()
                .ok_or(AppError::InvalidState("no result awaiting confirmation"))?
        };

        // Artifact save failure does not abort entry creation; the
        // entry simply carries no image reference.
        let artifact = if result.image.is_empty() {
            None
        } else {
            match self.artifacts.save(&result.image) {
                Ok(reference) => Some(reference),
                Err(e) => {
                    tracing::warn!(error = %e, "artifact save failed, storing entry without image");
                    self.emit_error(&e);
                    None
                }
            }
        };

        let entry = Entry::new(result.category, result.confidence, Utc::now(), artifact);
        let stored = match self.entries.create(entry) {
            Ok(stored) => stored,
            Err(e) => {
                // Already back in Idle with no partial entry state.
                self.emit_error(&e);
                return Err(e);
            }
        };

        self.emit_data_changed();
        Ok(stored)
    }

    /// Discard the pending result without persisting anything. Valid
    /// only in `AwaitingConfirm`.
    pub async fn cancel(&self) -> Result<()> {
        let mut pending = self.pending.lock().await;
        if !self.transition(PipelineState::AwaitingConfirm, PipelineState::Idle) {
            return Err(AppError::InvalidState("no result awaiting confirmation"));
        }
        pending.take();
        Ok(())
    }

    /// Delete one entry, then its artifact best-effort.
    pub async fn delete_entry(&self, id: Uuid) -> Result<()> {
        let existing = self.entries.get(id)?;
        self.entries.delete(id)?;
        if let Some(reference) = existing.and_then(|e| e.artifact) {
            self.artifacts.delete(&reference);
        }
        self.emit_data_changed();
        Ok(())
    }

    /// Delete every entry, then sweep the artifact directory so
    /// orphaned files do not accumulate.
    pub async fn clear_all(&self) -> Result<()> {
        self.entries.clear_all()?;
        let swept = self.artifacts.sweep();
        tracing::info!(swept, "cleared history");
        self.emit_data_changed();
        Ok(())
    }

    pub fn entries(&self) -> Result<Vec<Entry>> {
        self.entries.fetch_all()
    }

    pub fn stats(&self) -> Result<Stats> {
        let all = self.entries.fetch_all()?;
        Ok(stats::snapshot(&all, self.kg_co2_per_item, Utc::now()))
    }

    /// Load an entry's stored image.
    pub fn load_artifact(&self, entry: &Entry) -> Result<Vec<u8>> {
        let reference = entry
            .artifact
            .as_ref()
            .ok_or_else(|| AppError::NotFound("entry has no artifact".into()))?;
        self.artifacts.load(reference)
    }
}

impl Coordinator<DirectoryCaptureDevice> {
    /// Build a pipeline whose camera is the configured source folder.
    pub fn with_directory_device(config: &PipelineConfig) -> Result<Self> {
        let dir = config
            .capture_dir
            .clone()
            .ok_or_else(|| AppError::Config("capture_dir not configured".into()))?;
        Self::from_config(config, DirectoryCaptureDevice::new(dir))
    }
}
