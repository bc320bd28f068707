//! Attachment Archiver Core Library
//!
//! This library keeps an authenticated gateway connection open, reacts to
//! messages posted in monitored channels by downloading their image and video
//! attachments, and discards content that has already been archived.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`gateway`] - Gateway protocol client (heartbeat, identify, reconnect)
//! - [`download`] - Classification, destination paths, and the download pipeline
//! - [`dedup`] - Content digests, the in-memory duplicate cache, and the durable store
//! - [`db`] - Database connection and schema management
//! - [`health`] - `GET /health` status endpoint
//! - [`cli`] / [`config`] - Command-line arguments and validated runtime configuration

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod db;
pub mod dedup;
pub mod download;
pub mod gateway;
pub mod health;
mod user_agent;

// Re-export commonly used types
pub use config::{Config, ConfigError};
pub use db::Database;
pub use dedup::{Deduplicator, DuplicateCache, HashStore, open_hash_store};
pub use download::{
    AttachmentDescriptor, AttachmentHandler, DownloadPipeline, HttpClient, PipelineOutcome,
    SizeClassifier,
};
pub use gateway::{GatewayClient, GatewayConfig, GatewayStatus};
