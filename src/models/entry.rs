use crate::models::category::Category;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reference to a stored image blob: the artifact's file name inside
/// the content directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactRef(String);

impl ArtifactRef {
    pub fn new(name: impl Into<String>) -> Self {
        ArtifactRef(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transient classifier output. Lives from classification until the
/// user confirms or cancels; never persisted as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: Category,
    pub confidence: f32,
    /// Raw captured image bytes. Not part of the wire representation.
    #[serde(skip)]
    pub image: Vec<u8>,
}

/// A confirmed classification, immutable after creation except for
/// deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub id: Uuid,
    pub category: Category,
    pub confidence: f32,
    pub timestamp: DateTime<Utc>,
    pub artifact: Option<ArtifactRef>,
}

impl Entry {
    pub fn new(
        category: Category,
        confidence: f32,
        timestamp: DateTime<Utc>,
        artifact: Option<ArtifactRef>,
    ) -> Self {
        Entry {
            id: Uuid::new_v4(),
            category,
            confidence,
            timestamp,
            artifact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entries_get_distinct_ids() {
        let a = Entry::new(Category::Plastic, 0.9, Utc::now(), None);
        let b = Entry::new(Category::Plastic, 0.9, Utc::now(), None);
        assert_ne!(a.id, b.id);
        assert!(!a.id.is_nil());
    }

    #[test]
    fn result_serialization_omits_image_bytes() {
        let result = ClassificationResult {
            category: Category::Metal,
            confidence: 0.42,
            image: vec![1, 2, 3],
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["category"], "Metal");
        assert!(json.get("image").is_none());
    }
}
