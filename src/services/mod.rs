//! Business logic services

pub mod column_classifier;
pub mod discovery;
pub mod export;
pub mod header_locator;
pub mod ingestion;
pub mod job_controller;
pub mod phone_extractor;
pub mod record_unifier;
pub mod run_log;
pub mod zone_resolver;
