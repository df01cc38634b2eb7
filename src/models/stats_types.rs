use crate::models::category::Category;
use chrono::NaiveDate;
use serde::Serialize;

/// One day's bucket in a daily histogram.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayBucket {
    pub date: NaiveDate,
    /// Short weekday label ("Mon", "Tue", ...).
    pub label: &'static str,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryCount {
    pub category: Category,
    pub count: usize,
}

/// Aggregate snapshot derived from the entry history. Sentinel values
/// ("None", "N/A") stand in for aggregates that are undefined on an
/// empty history.
#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub total: usize,
    pub last_7_days: usize,
    pub mode_category: String,
    pub average_confidence: f32,
    pub most_active_weekday: String,
    /// Exactly 7 trailing-day buckets, oldest first, zero-filled.
    pub weekly: Vec<DayBucket>,
    /// Per-category counts in label order, zero counts included.
    pub distribution: Vec<CategoryCount>,
    pub co2_saved_kg: f64,
}
