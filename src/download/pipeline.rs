//! Per-attachment download pipeline.
//!
//! [`DownloadPipeline::process`] runs the fixed sequence for one attachment:
//!
//! 1. classify and size-check against the declared size
//! 2. compute the date-based destination path
//! 3. skip if that path already exists
//! 4. stream the body to disk (single attempt); a file published at the same
//!    path by a concurrent task wins and this one reports `AlreadyPresent`
//! 5. when duplicate detection is active, hash the file and discard it if the
//!    digest is already known
//!
//! The pipeline holds no per-attachment state, so one instance is shared by
//! every concurrent download task.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, info, instrument, warn};

use super::attachment::AttachmentDescriptor;
use super::classify::{Rejection, SizeClassifier};
use super::client::HttpClient;
use super::error::DownloadError;
use super::filename::{build_filename, date_directory, filename_from_url};
use crate::dedup::{Deduplicator, digest_file};

/// Final result of processing one attachment.
#[derive(Debug)]
pub enum PipelineOutcome {
    /// Not an eligible image/video, or outside the class size bounds.
    Rejected(Rejection),
    /// A file already exists at the destination; nothing was downloaded.
    AlreadyPresent(PathBuf),
    /// The file was written and kept.
    Saved {
        /// Where the file was written.
        path: PathBuf,
        /// Bytes written.
        bytes: u64,
    },
    /// The file was written, found to be a duplicate, and deleted.
    DuplicateDiscarded {
        /// Where the file had been written.
        path: PathBuf,
        /// Digest of the discarded content.
        digest: String,
    },
    /// The transfer failed; any partial file was removed.
    Failed(DownloadError),
}

/// Counters for pipeline outcomes.
///
/// Uses atomic counters for thread-safe updates from concurrent download
/// tasks.
#[derive(Debug, Default)]
pub struct PipelineStats {
    saved: AtomicUsize,
    duplicates: AtomicUsize,
    already_present: AtomicUsize,
    rejected: AtomicUsize,
    failed: AtomicUsize,
}

impl PipelineStats {
    /// Files written and kept.
    #[must_use]
    pub fn saved(&self) -> usize {
        self.saved.load(Ordering::SeqCst)
    }

    /// Files written then discarded as duplicates.
    #[must_use]
    pub fn duplicates(&self) -> usize {
        self.duplicates.load(Ordering::SeqCst)
    }

    /// Attachments skipped because the destination already existed.
    #[must_use]
    pub fn already_present(&self) -> usize {
        self.already_present.load(Ordering::SeqCst)
    }

    /// Attachments rejected by the classifier.
    #[must_use]
    pub fn rejected(&self) -> usize {
        self.rejected.load(Ordering::SeqCst)
    }

    /// Transfers that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Total attachments processed.
    #[must_use]
    pub fn total(&self) -> usize {
        self.saved() + self.duplicates() + self.already_present() + self.rejected() + self.failed()
    }

    fn record(&self, outcome: &PipelineOutcome) {
        let counter = match outcome {
            PipelineOutcome::Rejected(_) => &self.rejected,
            PipelineOutcome::AlreadyPresent(_) => &self.already_present,
            PipelineOutcome::Saved { .. } => &self.saved,
            PipelineOutcome::DuplicateDiscarded { .. } => &self.duplicates,
            PipelineOutcome::Failed(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// Downloads attachments into a date-partitioned archive.
#[derive(Debug)]
pub struct DownloadPipeline {
    client: HttpClient,
    classifier: SizeClassifier,
    save_root: PathBuf,
    dedup: Option<Deduplicator>,
    stats: PipelineStats,
}

impl DownloadPipeline {
    /// Creates a pipeline. Pass `None` for `dedup` to keep every download.
    #[must_use]
    pub fn new(
        client: HttpClient,
        classifier: SizeClassifier,
        save_root: impl Into<PathBuf>,
        dedup: Option<Deduplicator>,
    ) -> Self {
        Self {
            client,
            classifier,
            save_root: save_root.into(),
            dedup,
            stats: PipelineStats::default(),
        }
    }

    /// Root directory of the archive.
    #[must_use]
    pub fn save_root(&self) -> &Path {
        &self.save_root
    }

    /// Outcome counters since startup.
    #[must_use]
    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Whether duplicate detection is active.
    #[must_use]
    pub fn dedup_enabled(&self) -> bool {
        self.dedup.is_some()
    }

    /// Runs the full pipeline for one attachment.
    #[instrument(
        skip(self, attachment),
        fields(file = %attachment.filename, author = %attachment.author_name)
    )]
    pub async fn process(&self, attachment: &AttachmentDescriptor) -> PipelineOutcome {
        let outcome = self.run(attachment).await;
        self.stats.record(&outcome);
        match &outcome {
            PipelineOutcome::Rejected(reason) => {
                debug!(%reason, "attachment skipped");
            }
            PipelineOutcome::AlreadyPresent(path) => {
                debug!(path = %path.display(), "already downloaded");
            }
            PipelineOutcome::Saved { path, bytes } => {
                info!(path = %path.display(), bytes, "saved attachment");
            }
            PipelineOutcome::DuplicateDiscarded { path, digest } => {
                info!(path = %path.display(), %digest, "duplicate discarded");
            }
            PipelineOutcome::Failed(error) => {
                warn!(%error, "download failed");
            }
        }
        outcome
    }

    async fn run(&self, attachment: &AttachmentDescriptor) -> PipelineOutcome {
        let filename = effective_filename(attachment);
        let content_type = attachment.declared_content_type.as_deref();
        let kind = match self.classifier.check(
            &filename,
            content_type,
            attachment.declared_size_bytes,
        ) {
            Ok(kind) => kind,
            Err(reason) => return PipelineOutcome::Rejected(reason),
        };

        let saved_name = build_filename(
            &attachment.event_timestamp,
            &attachment.author_name,
            &filename,
            content_type,
        );
        let destination =
            date_directory(&self.save_root, &attachment.event_timestamp).join(&saved_name);

        if tokio::fs::try_exists(&destination).await.unwrap_or(false) {
            return PipelineOutcome::AlreadyPresent(destination);
        }

        let limit = self.classifier.bounds(kind).max;
        let bytes = match self
            .client
            .download_to_path(&attachment.remote_url, &destination, Some(limit))
            .await
        {
            Ok(bytes) => bytes,
            Err(DownloadError::AlreadyExists { path }) => {
                return PipelineOutcome::AlreadyPresent(path);
            }
            Err(error) => return PipelineOutcome::Failed(error),
        };

        let Some(dedup) = &self.dedup else {
            return PipelineOutcome::Saved {
                path: destination,
                bytes,
            };
        };

        let digest = match digest_file(&destination).await {
            Ok(digest) => digest,
            Err(error) => {
                warn!(%error, path = %destination.display(), "hashing failed, keeping file");
                return PipelineOutcome::Saved {
                    path: destination,
                    bytes,
                };
            }
        };

        let verdict = dedup.check_and_record(&saved_name, &digest, bytes).await;

        if verdict.is_duplicate() {
            debug!(?verdict, %digest, "digest already known");
            if let Err(error) = tokio::fs::remove_file(&destination).await {
                warn!(%error, path = %destination.display(), "failed to delete duplicate");
            }
            return PipelineOutcome::DuplicateDiscarded {
                path: destination,
                digest,
            };
        }

        PipelineOutcome::Saved {
            path: destination,
            bytes,
        }
    }
}

/// The declared filename, or the last URL segment when none was declared.
fn effective_filename(attachment: &AttachmentDescriptor) -> Cow<'_, str> {
    if attachment.filename.trim().is_empty() {
        filename_from_url(&attachment.remote_url)
            .map(Cow::Owned)
            .unwrap_or(Cow::Borrowed(""))
    } else {
        Cow::Borrowed(&attachment.filename)
    }
}
