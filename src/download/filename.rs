//! Filename sanitization and date-based destination paths.
//!
//! Saved files land at `<root>/<YYYY>/<MM>/<DD>/<timestamp>_<author>_<basename><ext>`.
//! Every generated component passes through an ASCII allow-list, so the result
//! can never contain path separators or dot segments.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Utc};
use url::Url;

/// Timestamp prefix format (ISO-8601 with `-` instead of `:`).
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";

/// Longest basename kept before the extension.
const MAX_BASENAME_CHARS: usize = 100;

/// Longest author component kept.
const MAX_AUTHOR_CHARS: usize = 32;

/// Replaces every character outside `[A-Za-z0-9._-]` with `_`, collapsing runs
/// of `_` and trimming them from both ends.
pub(crate) fn sanitize_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_sep = false;
    for ch in value.chars() {
        let mapped = if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '.') {
            ch
        } else {
            '_'
        };
        if mapped == '_' {
            if !prev_sep {
                out.push('_');
                prev_sep = true;
            }
        } else {
            out.push(mapped);
            prev_sep = false;
        }
    }
    out.trim_matches('_').to_string()
}

/// Splits `filename` into a sanitized basename and a lowercase `.ext`.
///
/// The extension is empty when the name has none or it is implausibly long.
pub(crate) fn split_basename(filename: &str) -> (String, String) {
    let path = Path::new(filename);
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(sanitize_component)
        .filter(|e| !e.is_empty() && e.len() <= 12)
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default();
    let stem = if extension.is_empty() {
        filename
    } else {
        path.file_stem().and_then(|s| s.to_str()).unwrap_or(filename)
    };
    let basename: String = sanitize_component(stem)
        .chars()
        .take(MAX_BASENAME_CHARS)
        .collect();
    (basename, extension)
}

/// Guess file extension from Content-Type header.
pub(crate) fn extension_from_content_type(content_type: &str) -> Option<&'static str> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();

    let ext = match mime.as_str() {
        "image/jpeg" => ".jpg",
        "image/png" => ".png",
        "image/gif" => ".gif",
        "image/webp" => ".webp",
        "image/bmp" => ".bmp",
        "image/avif" => ".avif",
        "image/heic" => ".heic",
        "image/svg+xml" => ".svg",
        "video/mp4" => ".mp4",
        "video/webm" => ".webm",
        "video/quicktime" => ".mov",
        "video/x-matroska" => ".mkv",
        _ => return None,
    };
    Some(ext)
}

/// Last path segment of an attachment URL, percent-decoded.
pub(crate) fn filename_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    if last.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(last).map_or_else(|_| last.to_string(), |d| d.into_owned());
    Some(decoded)
}

/// Builds `<timestamp>_<author>_<basename><ext>`.
///
/// Falls back to the content type for a missing extension, and to
/// `unknown` / `attachment` for components that sanitize to nothing.
#[must_use]
pub fn build_filename(
    timestamp: &DateTime<Utc>,
    author: &str,
    filename: &str,
    content_type: Option<&str>,
) -> String {
    let (basename, mut extension) = split_basename(filename);
    if extension.is_empty()
        && let Some(ext) = content_type.and_then(extension_from_content_type)
    {
        extension = ext.to_string();
    }
    let basename = if basename.is_empty() {
        "attachment".to_string()
    } else {
        basename
    };

    let author: String = sanitize_component(author)
        .chars()
        .take(MAX_AUTHOR_CHARS)
        .collect();
    let author = if author.is_empty() {
        "unknown".to_string()
    } else {
        author
    };

    format!(
        "{}_{author}_{basename}{extension}",
        timestamp.format(TIMESTAMP_FORMAT)
    )
}

/// Directory for a given event day: `<root>/<YYYY>/<MM>/<DD>`.
#[must_use]
pub fn date_directory(root: &Path, timestamp: &DateTime<Utc>) -> PathBuf {
    root.join(format!("{:04}", timestamp.year()))
        .join(format!("{:02}", timestamp.month()))
        .join(format!("{:02}", timestamp.day()))
}

/// Full destination path for an attachment.
#[must_use]
pub fn destination_path(
    root: &Path,
    timestamp: &DateTime<Utc>,
    author: &str,
    filename: &str,
    content_type: Option<&str>,
) -> PathBuf {
    date_directory(root, timestamp).join(build_filename(
        timestamp,
        author,
        filename,
        content_type,
    ))
}
