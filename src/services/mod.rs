pub mod artifact_store;
pub mod capture;
pub mod classifier;
pub mod coordinator;
pub mod db;
pub mod stats;
