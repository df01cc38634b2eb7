//! Pure aggregation functions over the entry history.
//!
//! Every function is total, side-effect free and parameterized on `now`
//! so results are deterministic under test. Aggregates that are
//! undefined on an empty history use the sentinels "None" / "N/A".

use crate::models::category::Category;
use crate::models::entry::Entry;
use crate::models::stats_types::{CategoryCount, DayBucket, Stats};
use chrono::{DateTime, Datelike, Duration, Utc, Weekday};
use std::collections::HashMap;

pub fn total_count(entries: &[Entry]) -> usize {
    entries.len()
}

/// Entries whose timestamp falls within the trailing window ending at
/// `now`.
pub fn count_since(entries: &[Entry], window: Duration, now: DateTime<Utc>) -> usize {
    let start = now - window;
    entries
        .iter()
        .filter(|e| e.timestamp >= start && e.timestamp <= now)
        .count()
}

/// Most frequent category. Ties break toward the category encountered
/// first in the input sequence; empty input has no mode.
pub fn mode_category(entries: &[Entry]) -> Option<Category> {
    let mut counts: HashMap<Category, (usize, usize)> = HashMap::new();
    for (i, entry) in entries.iter().enumerate() {
        let slot = counts.entry(entry.category).or_insert((0, i));
        slot.0 += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1 .0.cmp(&b.1 .0).then(b.1 .1.cmp(&a.1 .1)))
        .map(|(category, _)| category)
}

/// Arithmetic mean of confidences; 0 for an empty history.
pub fn average_confidence(entries: &[Entry]) -> f32 {
    if entries.is_empty() {
        return 0.0;
    }
    let sum: f32 = entries.iter().map(|e| e.confidence).sum();
    sum / entries.len() as f32
}

/// Mode of the day-of-week of timestamps, ties toward the weekday
/// encountered first.
pub fn most_active_weekday(entries: &[Entry]) -> Option<Weekday> {
    let mut counts: HashMap<Weekday, (usize, usize)> = HashMap::new();
    for (i, entry) in entries.iter().enumerate() {
        let slot = counts
            .entry(entry.timestamp.weekday())
            .or_insert((0, i));
        slot.0 += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1 .0.cmp(&b.1 .0).then(b.1 .1.cmp(&a.1 .1)))
        .map(|(weekday, _)| weekday)
}

pub fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

fn weekday_short(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Mon",
        Weekday::Tue => "Tue",
        Weekday::Wed => "Wed",
        Weekday::Thu => "Thu",
        Weekday::Fri => "Fri",
        Weekday::Sat => "Sat",
        Weekday::Sun => "Sun",
    }
}

/// Trailing `days` one-day buckets ending today, oldest first,
/// zero-filled for days with no entries.
pub fn daily_histogram(entries: &[Entry], days: usize, now: DateTime<Utc>) -> Vec<DayBucket> {
    let today = now.date_naive();
    let mut per_day: HashMap<chrono::NaiveDate, usize> = HashMap::new();
    for entry in entries {
        *per_day.entry(entry.timestamp.date_naive()).or_default() += 1;
    }

    (0..days)
        .rev()
        .map(|offset| {
            let date = today - Duration::days(offset as i64);
            DayBucket {
                date,
                label: weekday_short(date.weekday()),
                count: per_day.get(&date).copied().unwrap_or(0),
            }
        })
        .collect()
}

/// Exactly 7 trailing-day buckets including today, oldest first.
pub fn weekly_bar_data(entries: &[Entry], now: DateTime<Utc>) -> Vec<DayBucket> {
    daily_histogram(entries, 7, now)
}

/// Per-category counts in label order, zero counts included.
pub fn category_distribution(entries: &[Entry]) -> Vec<CategoryCount> {
    Category::ALL
        .iter()
        .map(|&category| CategoryCount {
            category,
            count: entries.iter().filter(|e| e.category == category).count(),
        })
        .collect()
}

/// `count x fixed per-item constant`, in kg of CO2.
pub fn estimated_impact(count: usize, kg_per_item: f64) -> f64 {
    count as f64 * kg_per_item
}

/// Full aggregate snapshot as consumed by the presentation layer.
pub fn snapshot(entries: &[Entry], kg_per_item: f64, now: DateTime<Utc>) -> Stats {
    Stats {
        total: total_count(entries),
        last_7_days: count_since(entries, Duration::days(7), now),
        mode_category: mode_category(entries)
            .map(|c| c.label().to_string())
            .unwrap_or_else(|| "None".to_string()),
        average_confidence: average_confidence(entries),
        most_active_weekday: most_active_weekday(entries)
            .map(|w| weekday_name(w).to_string())
            .unwrap_or_else(|| "N/A".to_string()),
        weekly: weekly_bar_data(entries, now),
        distribution: category_distribution(entries),
        co2_saved_kg: estimated_impact(total_count(entries), kg_per_item),
    }
}
