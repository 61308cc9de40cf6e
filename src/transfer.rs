//! Apply a change list through a transport
//!
//! Files are fetched one at a time in change-list order. A failure is
//! recorded against its path and the batch carries on.

use anyhow::{Context, Result};
use filetime::FileTime;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::clock;
use crate::logger::Logger;
use crate::path_map::{self, RelPath};
use crate::reconcile::{ChangeReason, ChangeRecord};

/// Extensions the remote side stores gzip-compressed
pub const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "log", "csv", "json", "xml", "html", "js", "css", "py", "md", "php", "vue", "java",
    "c", "cpp", "h", "sql", "yaml", "yml",
];

/// Remote file access used by the executor
pub trait Transport {
    /// Copy the remote file to `local` verbatim; returns bytes written
    fn fetch(&mut self, remote: &str, local: &Path) -> Result<u64>;

    /// Copy a gzip-compressed remote file and write its decompressed bytes to
    /// `local`, leaving no temporary artifact behind; returns bytes written
    fn fetch_and_decompress(&mut self, remote: &str, local: &Path) -> Result<u64>;

    fn remove(&mut self, remote: &str) -> Result<()>;
}

/// Case-insensitive extension check against `TEXT_EXTENSIONS`
pub fn is_text_classified(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rsplit_once('.') {
        Some((_, ext)) => TEXT_EXTENSIONS.iter().any(|t| t.eq_ignore_ascii_case(ext)),
        None => false,
    }
}

#[derive(Debug, Clone)]
pub enum TransferOutcome {
    Fetched {
        rel_path: RelPath,
        local_path: PathBuf,
        bytes: u64,
        decompressed: bool,
    },
    Failed {
        rel_path: RelPath,
        cause: String,
    },
    /// Dry run: what would have been fetched
    Planned {
        rel_path: RelPath,
        remote_path: String,
        local_path: PathBuf,
    },
}

impl TransferOutcome {
    pub fn rel_path(&self) -> &RelPath {
        match self {
            TransferOutcome::Fetched { rel_path, .. }
            | TransferOutcome::Failed { rel_path, .. }
            | TransferOutcome::Planned { rel_path, .. } => rel_path,
        }
    }
}

/// Per-path outcomes of one apply pass
#[derive(Debug, Default, Clone)]
pub struct TransferReport {
    pub outcomes: Vec<TransferOutcome>,
    pub elapsed_secs: f64,
}

impl TransferReport {
    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, TransferOutcome::Fetched { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.failures().count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&RelPath, &str)> {
        self.outcomes.iter().filter_map(|o| match o {
            TransferOutcome::Failed { rel_path, cause } => Some((rel_path, cause.as_str())),
            _ => None,
        })
    }

    pub fn bytes(&self) -> u64 {
        self.outcomes
            .iter()
            .map(|o| match o {
                TransferOutcome::Fetched { bytes, .. } => *bytes,
                _ => 0,
            })
            .sum()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyOptions {
    pub dry_run: bool,
}

/// Fetch every change in order and stamp the remote mtime on success
pub fn apply(
    changes: &[ChangeRecord],
    remote_root: &str,
    local_root: &Path,
    transport: &mut dyn Transport,
    logger: &dyn Logger,
    opts: ApplyOptions,
) -> TransferReport {
    let start = Instant::now();
    logger.run_start(remote_root, local_root, changes.len());

    let mut report = TransferReport::default();
    for change in changes {
        let remote = path_map::to_remote_transfer_path(&change.rel_path, remote_root);
        let local = path_map::to_local_path(&change.rel_path, local_root);

        if let ChangeReason::Collision(owner) = &change.reason {
            let cause = format!("local path {} already claimed by {}", local.display(), owner);
            logger.error("collision", &change.rel_path, &cause);
            report.outcomes.push(TransferOutcome::Failed {
                rel_path: change.rel_path.clone(),
                cause,
            });
            continue;
        }

        if opts.dry_run {
            report.outcomes.push(TransferOutcome::Planned {
                rel_path: change.rel_path.clone(),
                remote_path: remote,
                local_path: local,
            });
            continue;
        }

        logger.fetch_start(&change.rel_path, &remote);
        let decompress = is_text_classified(&remote);
        match fetch_one(change, &remote, &local, decompress, transport) {
            Ok(bytes) => {
                logger.fetch_done(&change.rel_path, &local, bytes);
                report.outcomes.push(TransferOutcome::Fetched {
                    rel_path: change.rel_path.clone(),
                    local_path: local,
                    bytes,
                    decompressed: decompress,
                });
            }
            Err(e) => {
                let cause = format!("{:#}", e);
                logger.error("fetch", &change.rel_path, &cause);
                report.outcomes.push(TransferOutcome::Failed {
                    rel_path: change.rel_path.clone(),
                    cause,
                });
            }
        }
    }

    report.elapsed_secs = start.elapsed().as_secs_f64();
    logger.done(
        report.attempted() as u64,
        report.failed() as u64,
        report.bytes(),
        report.elapsed_secs,
    );
    report
}

fn fetch_one(
    change: &ChangeRecord,
    remote: &str,
    local: &Path,
    decompress: bool,
    transport: &mut dyn Transport,
) -> Result<u64> {
    if let Some(parent) = local.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let bytes = if decompress {
        transport.fetch_and_decompress(remote, local)?
    } else {
        transport.fetch(remote, local)?
    };

    if let Some(modified) = change.remote_modified_at {
        let ft: FileTime = clock::to_file_time(modified);
        filetime::set_file_times(local, ft, ft)
            .with_context(|| format!("Failed to set times on {}", local.display()))?;
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_classification_by_extension() {
        assert!(is_text_classified("/srv/data/reports/q1.csv"));
        assert!(is_text_classified("/srv/data/README.MD"));
        assert!(is_text_classified("x/y.Yml"));
        assert!(!is_text_classified("/srv/data/image.png"));
        assert!(!is_text_classified("/srv/data/archive.tar.gz"));
        assert!(!is_text_classified("/srv/data/noext"));
        assert!(is_text_classified("/srv/data/.txt"));
        assert!(!is_text_classified("/srv/data.txt/blob"));
    }

    #[test]
    fn report_counts() {
        let a = RelPath::parse("a").unwrap();
        let b = RelPath::parse("b").unwrap();
        let report = TransferReport {
            outcomes: vec![
                TransferOutcome::Fetched {
                    rel_path: a,
                    local_path: PathBuf::from("/m/a"),
                    bytes: 10,
                    decompressed: false,
                },
                TransferOutcome::Failed {
                    rel_path: b.clone(),
                    cause: "boom".into(),
                },
            ],
            elapsed_secs: 0.0,
        };
        assert_eq!(report.attempted(), 2);
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.bytes(), 10);
        assert!(!report.is_success());
        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures, vec![(&b, "boom")]);
    }
}
