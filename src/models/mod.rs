pub mod category;
pub mod entry;
pub mod stats_types;
