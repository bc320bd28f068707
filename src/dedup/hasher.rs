//! Streaming content digest for saved files.

use std::path::Path;

use md5::{Digest, Md5};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::instrument;

/// Read buffer size used while hashing (64 KiB).
const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Length of a hex-encoded digest.
pub const DIGEST_HEX_LEN: usize = 32;

/// Incremental MD5 hasher producing lowercase hex digests.
#[derive(Default, Clone)]
pub struct ContentHasher {
    hasher: Md5,
}

impl std::fmt::Debug for ContentHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentHasher").finish_non_exhaustive()
    }
}

impl ContentHasher {
    /// Creates a new hasher with empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds more bytes into the digest.
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Consumes the hasher and returns the 32-character hex digest.
    #[must_use]
    pub fn finalize_hex(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

/// Computes the hex digest of the file at `path` without loading it into memory.
///
/// # Errors
///
/// Returns the underlying IO error if the file cannot be opened or read.
#[instrument(level = "debug", skip(path), fields(path = %path.display()))]
pub async fn digest_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path).await?;
    let mut hasher = ContentHasher::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize_hex())
}
