//! Media classification and per-class size bounds.

use std::fmt;
use std::path::Path;

use thiserror::Error;

/// Default maximum image size (50 MiB).
pub const DEFAULT_MAX_IMAGE_SIZE: u64 = 50 * 1024 * 1024;

/// Default maximum video size (500 MiB).
pub const DEFAULT_MAX_VIDEO_SIZE: u64 = 500 * 1024 * 1024;

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "bmp", "tif", "tiff", "heic", "heif", "avif", "svg",
];

const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "webm", "mkv", "avi", "m4v", "wmv", "flv", "mpg", "mpeg", "3gp",
];

/// Kind of media an attachment was classified as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// Still or animated image.
    Image,
    /// Video clip.
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => f.write_str("image"),
            Self::Video => f.write_str("video"),
        }
    }
}

/// Inclusive byte-size range accepted for one media class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeBounds {
    /// Smallest accepted size.
    pub min: u64,
    /// Largest accepted size.
    pub max: u64,
}

impl SizeBounds {
    /// Creates a range; callers validate `min <= max`.
    #[must_use]
    pub const fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    /// True if `size` lies within the range.
    #[must_use]
    pub fn contains(&self, size: u64) -> bool {
        (self.min..=self.max).contains(&size)
    }
}

/// Why an attachment was not downloaded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// Neither the extension nor the content type looks like an image or video.
    #[error("not an image or video")]
    NotMedia,

    /// Declared size is below the class minimum.
    #[error("{kind} of {size} bytes is below the minimum of {min} bytes")]
    TooSmall {
        /// Detected media class.
        kind: MediaKind,
        /// Declared size.
        size: u64,
        /// Configured minimum.
        min: u64,
    },

    /// Declared size is above the class maximum.
    #[error("{kind} of {size} bytes exceeds the maximum of {max} bytes")]
    TooLarge {
        /// Detected media class.
        kind: MediaKind,
        /// Declared size.
        size: u64,
        /// Configured maximum.
        max: u64,
    },
}

/// Stateless gate deciding which attachments are worth downloading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeClassifier {
    image: SizeBounds,
    video: SizeBounds,
}

impl Default for SizeClassifier {
    fn default() -> Self {
        Self {
            image: SizeBounds::new(0, DEFAULT_MAX_IMAGE_SIZE),
            video: SizeBounds::new(0, DEFAULT_MAX_VIDEO_SIZE),
        }
    }
}

impl SizeClassifier {
    /// Creates a classifier with explicit per-class bounds.
    #[must_use]
    pub const fn new(image: SizeBounds, video: SizeBounds) -> Self {
        Self { image, video }
    }

    /// Bounds for a media class.
    #[must_use]
    pub fn bounds(&self, kind: MediaKind) -> SizeBounds {
        match kind {
            MediaKind::Image => self.image,
            MediaKind::Video => self.video,
        }
    }

    /// Classifies by extension first, then by content-type prefix.
    ///
    /// Video wins when either signal says video, so `clip.gif` served as
    /// `video/mp4` is treated as a video.
    #[must_use]
    pub fn media_kind(filename: &str, content_type: Option<&str>) -> Option<MediaKind> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let mime = content_type
            .map(|ct| ct.trim().to_ascii_lowercase())
            .unwrap_or_default();

        let ext_is = |set: &[&str]| extension.as_deref().is_some_and(|e| set.contains(&e));

        if ext_is(VIDEO_EXTENSIONS) || mime.starts_with("video/") {
            Some(MediaKind::Video)
        } else if ext_is(IMAGE_EXTENSIONS) || mime.starts_with("image/") {
            Some(MediaKind::Image)
        } else {
            None
        }
    }

    /// Classifies the attachment and validates its declared size.
    ///
    /// # Errors
    ///
    /// Returns the [`Rejection`] explaining why the attachment is ineligible.
    pub fn check(
        &self,
        filename: &str,
        content_type: Option<&str>,
        size: u64,
    ) -> Result<MediaKind, Rejection> {
        let kind = Self::media_kind(filename, content_type).ok_or(Rejection::NotMedia)?;
        let bounds = self.bounds(kind);

        if size < bounds.min {
            return Err(Rejection::TooSmall {
                kind,
                size,
                min: bounds.min,
            });
        }
        if size > bounds.max {
            return Err(Rejection::TooLarge {
                kind,
                size,
                max: bounds.max,
            });
        }
        Ok(kind)
    }
}
