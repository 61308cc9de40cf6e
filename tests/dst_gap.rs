//! Listing timestamps inside a local DST gap. Lives in its own test binary
//! because it pins the process time zone.

use anyhow::{anyhow, Result};
use snapsync::clock;
use snapsync::logger::NoopLogger;
use snapsync::reconcile::reconcile;
use snapsync::snapshot::{parse_snapshot, IgnoreSet};
use snapsync::transfer::{apply, ApplyOptions, Transport};
use std::fs;
use std::path::{Path, PathBuf};

const REMOTE_ROOT: &str = "/srv/data";

struct DirTransport {
    root: PathBuf,
}

impl Transport for DirTransport {
    fn fetch(&mut self, remote: &str, local: &Path) -> Result<u64> {
        let rel = remote
            .strip_prefix(REMOTE_ROOT)
            .ok_or_else(|| anyhow!("outside remote root: {}", remote))?;
        Ok(fs::copy(self.root.join(rel.trim_start_matches('/')), local)?)
    }

    fn fetch_and_decompress(&mut self, remote: &str, _local: &Path) -> Result<u64> {
        Err(anyhow!("unexpected text fetch of {}", remote))
    }

    fn remove(&mut self, remote: &str) -> Result<()> {
        Err(anyhow!("unexpected remove of {}", remote))
    }
}

#[test]
fn mtime_in_spring_forward_gap_does_not_refetch() -> Result<()> {
    // 02:00-03:00 on 2024-03-10 does not exist in this zone
    std::env::set_var("TZ", "America/New_York");

    let server = tempfile::tempdir()?;
    let local = tempfile::tempdir()?;
    fs::write(server.path().join("gap.bin"), b"abc")?;

    let listing = "3 2024-03-10 02:30:00 /srv/data/gap.bin\n";
    let (snap, _) = parse_snapshot(listing.as_bytes(), REMOTE_ROOT, &IgnoreSet::default())?;
    let changes = reconcile(&snap, local.path())?;
    assert_eq!(changes.len(), 1);

    let mut transport = DirTransport {
        root: server.path().to_path_buf(),
    };
    let report = apply(
        &changes,
        REMOTE_ROOT,
        local.path(),
        &mut transport,
        &NoopLogger,
        ApplyOptions::default(),
    );
    assert!(report.is_success());

    let stamped = clock::to_naive_local(fs::metadata(local.path().join("gap.bin"))?.modified()?);
    let remote = clock::parse_listing("2024-03-10", "02:30:00")?;
    assert!(stamped >= remote, "stamped {} is older than {}", stamped, remote);
    assert!(reconcile(&snap, local.path())?.is_empty());
    Ok(())
}

#[test]
fn ordinary_times_are_stamped_exactly() -> Result<()> {
    std::env::set_var("TZ", "America/New_York");
    let naive = clock::parse_listing("2024-03-10", "01:59:00")?;
    let ft = clock::to_file_time(naive);
    let sys = std::time::SystemTime::UNIX_EPOCH
        + std::time::Duration::new(ft.unix_seconds() as u64, ft.nanoseconds());
    assert_eq!(clock::to_naive_local(sys), naive);
    Ok(())
}
