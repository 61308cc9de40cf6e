use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::transfer::{TransferOutcome, TransferReport};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Fetched,
    Failed,
    Planned,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct JournalEntry {
    pub timestamp: String,
    pub run_id: String,
    pub rel_path: String,
    pub local_path: Option<PathBuf>,
    pub status: TransferStatus,
    pub bytes: u64,
    pub error: Option<String>,
}

impl JournalEntry {
    fn from_outcome(run_id: &str, outcome: &TransferOutcome) -> Self {
        let (local_path, status, bytes, error) = match outcome {
            TransferOutcome::Fetched {
                local_path, bytes, ..
            } => (Some(local_path.clone()), TransferStatus::Fetched, *bytes, None),
            TransferOutcome::Failed { cause, .. } => {
                (None, TransferStatus::Failed, 0, Some(cause.clone()))
            }
            TransferOutcome::Planned { local_path, .. } => {
                (Some(local_path.clone()), TransferStatus::Planned, 0, None)
            }
        };
        JournalEntry {
            timestamp: Utc::now().to_rfc3339(),
            run_id: run_id.to_string(),
            rel_path: outcome.rel_path().to_string(),
            local_path,
            status,
            bytes,
            error,
        }
    }
}

/// Append-only JSONL record of per-file outcomes across runs
pub struct RunJournal {
    log_file_path: PathBuf,
}

impl RunJournal {
    pub fn new(path: &Path) -> Self {
        RunJournal {
            log_file_path: path.to_path_buf(),
        }
    }

    pub fn record_report(&self, run_id: &str, report: &TransferReport) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file_path)
            .context("Failed to open run journal")?;
        let mut writer = BufWriter::new(file);
        for outcome in &report.outcomes {
            serde_json::to_writer(&mut writer, &JournalEntry::from_outcome(run_id, outcome))?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }
}

pub fn new_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
