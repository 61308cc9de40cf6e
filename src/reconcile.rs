//! Decide which snapshot entries need fetching
//!
//! Pure read-and-decide: the local tree is only stat'ed, never touched, so
//! running this any number of times has no side effects.

use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::clock;
use crate::path_map::{self, RelPath};
use crate::snapshot::{RemoteEntry, Snapshot};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("cannot stat local file {path:?}: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("local path {0:?} exists but is not a regular file")]
    NotAFile(PathBuf),
}

/// What the local filesystem holds for one relative path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalState {
    Missing,
    Present {
        size: u64,
        modified_at: NaiveDateTime,
    },
}

impl LocalState {
    /// Stat `path` directly. Only NotFound counts as missing.
    pub fn stat(path: &Path) -> Result<Self, ReconcileError> {
        match fs::metadata(path) {
            Ok(meta) => {
                if !meta.is_file() {
                    return Err(ReconcileError::NotAFile(path.to_path_buf()));
                }
                let modified = meta.modified().map_err(|source| ReconcileError::Stat {
                    path: path.to_path_buf(),
                    source,
                })?;
                Ok(LocalState::Present {
                    size: meta.len(),
                    modified_at: clock::to_naive_local(modified),
                })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(LocalState::Missing),
            Err(source) => Err(ReconcileError::Stat {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeReason {
    Missing,
    SizeMismatch,
    Older,
    /// Sanitizing maps this entry onto the local file of an earlier entry
    Collision(RelPath),
}

/// One pending fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    pub rel_path: RelPath,
    pub remote_size: u64,
    pub remote_modified_at: Option<NaiveDateTime>,
    /// Set only when a stale local copy exists
    pub local_modified_at: Option<NaiveDateTime>,
    pub reason: ChangeReason,
}

/// Compare one entry against what is on disk
pub fn needs_fetch(entry: &RemoteEntry, local: &LocalState) -> Option<ChangeReason> {
    match local {
        LocalState::Missing => Some(ChangeReason::Missing),
        LocalState::Present { size, .. } if *size != entry.size => Some(ChangeReason::SizeMismatch),
        // strictly older; newer-or-equal with the right size is left alone
        LocalState::Present { modified_at, .. } if *modified_at < entry.modified_at => {
            Some(ChangeReason::Older)
        }
        LocalState::Present { .. } => None,
    }
}

/// Walk the snapshot in insertion order and emit a record per stale entry.
///
/// The first entry to map onto a local path owns it; any later entry landing
/// on the same path is reported as a `Collision` whatever the disk holds.
pub fn reconcile(snapshot: &Snapshot, local_root: &Path) -> Result<Vec<ChangeRecord>, ReconcileError> {
    let mut changes = Vec::new();
    let mut claimed: HashMap<PathBuf, &RelPath> = HashMap::new();
    for (rel, entry) in snapshot.iter() {
        let local_path = path_map::to_local_path(rel, local_root);
        if let Some(owner) = claimed.get(&local_path) {
            changes.push(ChangeRecord {
                rel_path: rel.clone(),
                remote_size: entry.size,
                remote_modified_at: Some(entry.modified_at),
                local_modified_at: None,
                reason: ChangeReason::Collision((*owner).clone()),
            });
            continue;
        }
        let local = LocalState::stat(&local_path)?;
        claimed.insert(local_path, rel);
        if let Some(reason) = needs_fetch(entry, &local) {
            let local_modified_at = match local {
                LocalState::Present { modified_at, .. } => Some(modified_at),
                LocalState::Missing => None,
            };
            changes.push(ChangeRecord {
                rel_path: rel.clone(),
                remote_size: entry.size,
                remote_modified_at: Some(entry.modified_at),
                local_modified_at,
                reason,
            });
        }
    }
    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::parse_listing;

    fn entry(size: u64, date: &str) -> RemoteEntry {
        RemoteEntry {
            size,
            modified_at: parse_listing(date, "10:00:00").unwrap(),
            absolute_path: String::new(),
        }
    }

    fn present(size: u64, date: &str) -> LocalState {
        LocalState::Present {
            size,
            modified_at: parse_listing(date, "10:00:00").unwrap(),
        }
    }

    #[test]
    fn decision_table() {
        let remote = entry(1024, "2024-03-01");
        assert_eq!(needs_fetch(&remote, &LocalState::Missing), Some(ChangeReason::Missing));
        assert_eq!(needs_fetch(&remote, &present(1024, "2024-03-01")), None);
        assert_eq!(needs_fetch(&remote, &present(1024, "2024-03-02")), None);
        assert_eq!(
            needs_fetch(&remote, &present(1024, "2024-02-28")),
            Some(ChangeReason::Older)
        );
        // newer but wrong size still gets fetched
        assert_eq!(
            needs_fetch(&remote, &present(10, "2024-03-05")),
            Some(ChangeReason::SizeMismatch)
        );
    }

    #[test]
    fn missing_local_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            LocalState::stat(&dir.path().join("nope")).unwrap(),
            LocalState::Missing
        );
    }

    #[test]
    fn directory_in_place_of_file_is_surfaced() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("q1.csv")).unwrap();
        let err = LocalState::stat(&dir.path().join("q1.csv")).unwrap_err();
        assert!(matches!(err, ReconcileError::NotAFile(_)));
    }

    #[cfg(unix)]
    #[test]
    fn stat_failure_under_a_file_is_surfaced() {
        // a regular file used as a directory yields ENOTDIR, not NotFound
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("reports"), b"x").unwrap();
        let err = LocalState::stat(&dir.path().join("reports/q1.csv")).unwrap_err();
        assert!(matches!(err, ReconcileError::Stat { .. }));
    }

    #[test]
    fn sanitized_name_clash_is_reported_against_the_first_owner() {
        let dir = tempfile::tempdir().unwrap();
        let mut snap = Snapshot::default();
        let first = RelPath::parse("a:b").unwrap();
        let second = RelPath::parse("a?b").unwrap();
        snap.insert(first.clone(), entry(1, "2024-03-01"));
        snap.insert(second.clone(), entry(2, "2024-03-01"));

        let changes = reconcile(&snap, dir.path()).unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].rel_path, first);
        assert_eq!(changes[0].reason, ChangeReason::Missing);
        assert_eq!(changes[1].rel_path, second);
        assert_eq!(changes[1].reason, ChangeReason::Collision(first));
    }
}
