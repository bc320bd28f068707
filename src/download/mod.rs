//! Attachment download pipeline.
//!
//! This module turns [`AttachmentDescriptor`]s into files on disk:
//!
//! - [`SizeClassifier`] decides whether an attachment is an image or video and
//!   whether its declared size fits the class bounds
//! - [`HttpClient`] streams the body to a date-partitioned destination
//! - [`DownloadPipeline`] runs the whole sequence, including duplicate
//!   detection when a [`crate::dedup::Deduplicator`] is supplied
//!
//! # Example
//!
//! ```no_run
//! use archiver_core::download::{DownloadPipeline, HttpClient, SizeClassifier};
//!
//! let pipeline = DownloadPipeline::new(
//!     HttpClient::new(),
//!     SizeClassifier::default(),
//!     "./archive",
//!     None,
//! );
//! assert!(!pipeline.dedup_enabled());
//! ```

mod attachment;
mod classify;
mod client;
mod constants;
mod error;
mod filename;
mod pipeline;

pub use attachment::{AttachmentDescriptor, AttachmentHandler};
pub use classify::{
    DEFAULT_MAX_IMAGE_SIZE, DEFAULT_MAX_VIDEO_SIZE, MediaKind, Rejection, SizeBounds,
    SizeClassifier,
};
pub use client::HttpClient;
pub use error::DownloadError;
pub use filename::{build_filename, date_directory, destination_path};
pub use pipeline::{DownloadPipeline, PipelineOutcome, PipelineStats};

// Note: no module-local Result alias. Use `Result<T, DownloadError>` explicitly.
