//! Remote metadata listing parser
//!
//! Each line is `<size> <YYYY-MM-DD> <HH:MM:SS[.frac]> <absolute-path>`; the
//! path is everything after the third space and may itself contain spaces.

use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::clock;
use crate::path_map::RelPath;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("line {line}: unparseable timestamp {value:?}: {source}")]
    Timestamp {
        line: usize,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    #[error("failed to read snapshot {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read snapshot line {line}: {source}")]
    Read {
        line: usize,
        #[source]
        source: std::io::Error,
    },
}

/// One line of the remote listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub size: u64,
    pub modified_at: NaiveDateTime,
    pub absolute_path: String,
}

/// Counters describing what the parser kept and dropped
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParseStats {
    pub lines: usize,
    pub malformed: usize,
    pub ignored: usize,
    /// Outside the remote root, equal to it, or containing `..`
    pub rejected: usize,
    pub duplicates: usize,
    /// Subset of `malformed`: lines that were not valid UTF-8
    pub non_utf8: usize,
}

/// Relative path prefixes excluded from mirroring
#[derive(Debug, Default, Clone)]
pub struct IgnoreSet {
    prefixes: Vec<RelPath>,
}

impl IgnoreSet {
    /// Prefixes are normalized like listing paths: an absolute prefix under
    /// `remote_root` has the root stripped, a relative one is taken as is.
    pub fn new<I, S>(remote_root: &str, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        // Empty, traversal or out-of-root entries can't name anything in the snapshot
        let prefixes = prefixes
            .into_iter()
            .filter_map(|p| {
                let p = p.as_ref().trim();
                if p.starts_with('/') {
                    RelPath::from_remote(p, remote_root).ok().flatten()
                } else {
                    RelPath::parse(p).ok()
                }
            })
            .collect();
        Self { prefixes }
    }

    /// Split a `,` or `;` separated list, e.g. from `IGNORE_PATHS`
    pub fn from_delimited(remote_root: &str, list: &str) -> Self {
        Self::new(remote_root, list.split([',', ';']))
    }

    pub fn is_ignored(&self, rel: &RelPath) -> bool {
        self.prefixes.iter().any(|p| rel.starts_with(p))
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}

/// Insertion-ordered map from relative path to remote entry
#[derive(Debug, Default, Clone)]
pub struct Snapshot {
    entries: Vec<(RelPath, RemoteEntry)>,
    index: HashMap<RelPath, usize>,
}

impl Snapshot {
    /// Insert or replace. A replaced key keeps its original position.
    /// Returns true when an earlier entry was overwritten.
    pub fn insert(&mut self, rel: RelPath, entry: RemoteEntry) -> bool {
        if let Some(&i) = self.index.get(&rel) {
            self.entries[i].1 = entry;
            return true;
        }
        self.index.insert(rel.clone(), self.entries.len());
        self.entries.push((rel, entry));
        false
    }

    pub fn get(&self, rel: &RelPath) -> Option<&RemoteEntry> {
        self.index.get(rel).map(|&i| &self.entries[i].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RelPath, &RemoteEntry)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|(_, e)| e.size).sum()
    }
}

/// Parse a listing stream into a snapshot
pub fn parse_snapshot<R: BufRead>(
    mut reader: R,
    remote_root: &str,
    ignore: &IgnoreSet,
) -> Result<(Snapshot, ParseStats), SnapshotError> {
    let mut snapshot = Snapshot::default();
    let mut stats = ParseStats::default();

    let mut buf = Vec::new();
    let mut line_no = 0;
    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .map_err(|source| SnapshotError::Read {
                line: line_no + 1,
                source,
            })?;
        if n == 0 {
            break;
        }
        line_no += 1;
        stats.lines += 1;

        // a name the remote encodes in something other than UTF-8 can't be
        // mapped to a local path; skip that line only
        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line.trim_end_matches(['\r', '\n']),
            Err(_) => {
                stats.non_utf8 += 1;
                stats.malformed += 1;
                continue;
            }
        };
        let fields: Vec<&str> = line.splitn(4, ' ').collect();
        if fields.len() < 4 || fields[3].is_empty() {
            stats.malformed += 1;
            continue;
        }
        let size: u64 = match fields[0].parse() {
            Ok(s) => s,
            Err(_) => {
                stats.malformed += 1;
                continue;
            }
        };
        let modified_at = clock::parse_listing(fields[1], fields[2]).map_err(|source| {
            SnapshotError::Timestamp {
                line: line_no,
                value: format!("{} {}", fields[1], fields[2]),
                source,
            }
        })?;
        let absolute_path = fields[3];

        let rel = match RelPath::from_remote(absolute_path, remote_root) {
            Ok(Some(rel)) => rel,
            Ok(None) | Err(_) => {
                stats.rejected += 1;
                continue;
            }
        };
        if ignore.is_ignored(&rel) {
            stats.ignored += 1;
            continue;
        }

        let entry = RemoteEntry {
            size,
            modified_at,
            absolute_path: absolute_path.to_string(),
        };
        if snapshot.insert(rel, entry) {
            stats.duplicates += 1;
        }
    }

    Ok((snapshot, stats))
}

/// Parse an already-decompressed listing file
pub fn parse_snapshot_file(
    path: &Path,
    remote_root: &str,
    ignore: &IgnoreSet,
) -> Result<(Snapshot, ParseStats), SnapshotError> {
    let file = File::open(path).map_err(|source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_snapshot(BufReader::new(file), remote_root, ignore)
}
