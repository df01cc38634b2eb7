use crate::error::{AppError, Result};
use crate::services::classifier::inference;
use ndarray::Array4;
use ort::session::Session;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

/// Loads the ONNX session once and caches it for the lifetime of the
/// classifier. A failed load is cached too, so a broken model file does
/// not pay the load cost on every frame.
#[derive(Clone)]
pub struct ModelStore {
    path: Option<PathBuf>,
    session: Arc<std::sync::Mutex<Option<Session>>>,
    load_state: Arc<AsyncMutex<LoadState>>,
}

enum LoadState {
    NotLoaded,
    Ready,
    Failed(String),
}

impl ModelStore {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            session: Arc::new(std::sync::Mutex::new(None)),
            load_state: Arc::new(AsyncMutex::new(LoadState::NotLoaded)),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.session.lock().unwrap().is_some()
    }

    /// Load the session if it has not been attempted yet. Holding the
    /// async lock across the load keeps concurrent callers from racing
    /// a second load.
    pub async fn ensure_loaded(&self) -> Result<()> {
        let mut state = self.load_state.lock().await;
        match &*state {
            LoadState::Ready => return Ok(()),
            LoadState::Failed(msg) => return Err(AppError::ModelUnavailable(msg.clone())),
            LoadState::NotLoaded => {}
        }

        let Some(path) = self.path.clone() else {
            let msg = "no model path configured".to_string();
            *state = LoadState::Failed(msg.clone());
            return Err(AppError::ModelUnavailable(msg));
        };

        let loaded = tokio::task::spawn_blocking(move || load_session(&path))
            .await
            .map_err(|e| AppError::ModelUnavailable(format!("model load task failed: {}", e)))?;

        match loaded {
            Ok(session) => {
                *self.session.lock().unwrap() = Some(session);
                *state = LoadState::Ready;
                tracing::info!("classification model loaded");
                Ok(())
            }
            Err(e) => {
                let msg = e.to_string();
                *state = LoadState::Failed(msg.clone());
                Err(AppError::ModelUnavailable(msg))
            }
        }
    }

    /// Run one inference pass and return softmax probabilities.
    pub fn run(&self, input: Array4<f32>) -> Result<Vec<f32>> {
        let mut guard = self.session.lock().unwrap();
        let session = guard
            .as_mut()
            .ok_or_else(|| AppError::ModelUnavailable("model not loaded".into()))?;
        inference::run_inference(session, input)
    }
}

fn load_session(path: &std::path::Path) -> Result<Session> {
    let _ = ort::init().with_name("waste-lens").commit();

    Session::builder()
        .map_err(|e| AppError::ModelUnavailable(format!("failed to create session builder: {}", e)))?
        .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)
        .map_err(|e| AppError::ModelUnavailable(format!("failed to set optimization level: {}", e)))?
        .with_intra_threads(4)
        .map_err(|e| AppError::ModelUnavailable(format!("failed to set intra threads: {}", e)))?
        .with_execution_providers([
            ort::execution_providers::CPUExecutionProvider::default().build(),
        ])
        .map_err(|e| AppError::ModelUnavailable(format!("failed to register execution provider: {}", e)))?
        .commit_from_file(path)
        .map_err(|e| AppError::ModelUnavailable(format!("failed to load ONNX model: {}", e)))
}
