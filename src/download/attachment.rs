//! Attachment descriptors handed from the gateway to the download pipeline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::pipeline::{DownloadPipeline, PipelineOutcome};

/// One attachment from a dispatched message, ready to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentDescriptor {
    /// CDN URL of the attachment body.
    pub remote_url: String,
    /// Original filename as uploaded.
    pub filename: String,
    /// Content type declared by the service, if any.
    pub declared_content_type: Option<String>,
    /// Size declared by the service.
    pub declared_size_bytes: u64,
    /// Username of the message author.
    pub author_name: String,
    /// Time the message was created.
    pub event_timestamp: DateTime<Utc>,
}

/// Consumer of attachments dispatched by the gateway.
///
/// Implementations must be cheap to call concurrently: the gateway spawns one
/// task per attachment and never awaits it.
#[async_trait]
pub trait AttachmentHandler: Send + Sync {
    /// Processes a single attachment to completion.
    async fn handle(&self, attachment: AttachmentDescriptor);
}

#[async_trait]
impl AttachmentHandler for DownloadPipeline {
    async fn handle(&self, attachment: AttachmentDescriptor) {
        // `process` logs and counts every outcome.
        let _: PipelineOutcome = self.process(&attachment).await;
    }
}
