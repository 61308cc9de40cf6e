//! Remote relative paths and their mapping to transfer/local paths
//!
//! A `RelPath` is a list of segments, never a raw string, so prefix checks
//! and local joins work on whole components.

use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

/// Characters rejected by the most restrictive target filesystem (NTFS/FAT)
pub const ILLEGAL_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Substitute for anything in `ILLEGAL_CHARS`
pub const PLACEHOLDER: char = '_';

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("empty relative path")]
    Empty,
    #[error("parent-directory segment in {0:?}")]
    Traversal(String),
}

/// Validated path relative to the mirror root
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelPath {
    segments: Vec<String>,
}

impl RelPath {
    /// Parse a `/`-separated path. Leading separators, empty segments and `.`
    /// are dropped; `..` is rejected so nothing can escape the local root.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let mut segments = Vec::new();
        for seg in raw.split('/') {
            match seg {
                "" | "." => continue,
                ".." => return Err(PathError::Traversal(raw.to_string())),
                s => segments.push(s.to_string()),
            }
        }
        if segments.is_empty() {
            return Err(PathError::Empty);
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// True when `self` equals `prefix` or lies underneath it
    pub fn starts_with(&self, prefix: &RelPath) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }

    /// Strip `root` (segment-wise) from an absolute remote path
    pub fn from_remote(absolute: &str, root: &str) -> Result<Option<Self>, PathError> {
        let root_segs: Vec<&str> = root.split('/').filter(|s| !s.is_empty()).collect();
        let mut abs_segs = absolute.split('/').filter(|s| !s.is_empty());
        for want in &root_segs {
            match abs_segs.next() {
                Some(got) if got == *want => {}
                _ => return Ok(None),
            }
        }
        let rest: Vec<&str> = abs_segs.collect();
        Self::parse(&rest.join("/")).map(Some)
    }
}

impl fmt::Display for RelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

/// Remote path used for the SFTP request, NFC-normalized as a whole
pub fn to_remote_transfer_path(rel: &RelPath, remote_root: &str) -> String {
    let root = remote_root.trim_end_matches('/');
    let joined = format!("{}/{}", root, rel);
    joined.nfc().collect()
}

/// Local destination; each segment sanitized, joined natively under `local_root`
pub fn to_local_path(rel: &RelPath, local_root: &Path) -> PathBuf {
    let mut out = local_root.to_path_buf();
    for seg in rel.segments() {
        out.push(&*sanitize_segment(seg));
    }
    out
}

/// Replace characters that cannot appear in a file name on the target
pub fn sanitize_segment(segment: &str) -> Cow<'_, str> {
    let bad = |c: char| ILLEGAL_CHARS.contains(&c) || c.is_ascii_control();
    if !segment.chars().any(bad) {
        return Cow::Borrowed(segment);
    }
    Cow::Owned(
        segment
            .chars()
            .map(|c| if bad(c) { PLACEHOLDER } else { c })
            .collect(),
    )
}
