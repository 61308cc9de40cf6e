//! Listing -> snapshot -> change list, shared by the compare and sync phases

use anyhow::{Context, Result};

use crate::config::PathSettings;
use crate::reconcile::{self, ChangeReason, ChangeRecord};
use crate::snapshot::{self, ParseStats, Snapshot};

pub struct Plan {
    pub snapshot: Snapshot,
    pub stats: ParseStats,
    pub changes: Vec<ChangeRecord>,
}

/// Parse the local copy of the listing and reconcile it against the mirror
pub fn plan(paths: &PathSettings) -> Result<Plan> {
    let (snapshot, stats) =
        snapshot::parse_snapshot_file(&paths.local_metadata, &paths.remote_dir, &paths.ignore)
            .context("Failed to load remote listing")?;
    let changes = reconcile::reconcile(&snapshot, &paths.local_dir)
        .context("Failed to compare against local tree")?;
    Ok(Plan {
        snapshot,
        stats,
        changes,
    })
}

/// One line per change for the compare phase
pub fn describe(change: &ChangeRecord) -> String {
    let why = match &change.reason {
        ChangeReason::Missing => "new".to_string(),
        ChangeReason::SizeMismatch => "size".to_string(),
        ChangeReason::Older => match (change.local_modified_at, change.remote_modified_at) {
            (Some(local), Some(remote)) => format!("older {} < {}", local, remote),
            _ => "older".to_string(),
        },
        ChangeReason::Collision(owner) => format!("same local name as {}", owner),
    };
    format!("{} ({})", change.rel_path, why)
}
