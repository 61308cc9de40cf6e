//! snapsync - one-way mirror of a remote SFTP tree
//!
//! Pipeline:
//! - generate the remote listing (`find | gzip`) on the server
//! - fetch and decompress it
//! - diff it against the local tree
//! - fetch what is new or stale, stamping remote mtimes

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::Path;
use std::time::Instant;

use snapsync::cli::{Args, Phase};
use snapsync::config::{Config, PathSettings};
use snapsync::log::{new_run_id, RunJournal};
use snapsync::logger::{Logger, MultiLogger, NoopLogger, TextLogger};
use snapsync::metadata;
use snapsync::progress::ProgressLogger;
use snapsync::sftp::SftpTransport;
use snapsync::sync;
use snapsync::transfer::{self, ApplyOptions, Transport};
use snapsync::url::parse_remote_url;

fn main() -> Result<()> {
    // Set up Ctrl-C handler
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted by user. Re-run to resume; finished files are kept.");
        // Exit immediately with 130 (128 + SIGINT)
        std::process::exit(130);
    })
    .expect("Error setting Ctrl-C handler");

    let args = Args::parse();

    let mut cfg = Config::load(args.config.as_deref())?;
    if let Some(ref remote) = args.remote {
        let url = parse_remote_url(remote)
            .ok_or_else(|| anyhow!("Not an sftp:// URL: {}", remote))?;
        cfg.apply_remote_url(url);
    }
    if let Some(ref local) = args.local {
        cfg.local_dir = Some(local.clone());
    }
    cfg.ignore_paths.extend(args.ignore.iter().cloned());
    let paths = cfg.paths()?;

    let logger = build_logger(&args);

    // Session is dropped (and disconnected) before we pick an exit code
    let clean = run(&args, &cfg, &paths, &*logger)?;
    if !clean {
        std::process::exit(1);
    }
    Ok(())
}

fn build_logger(args: &Args) -> Box<dyn Logger> {
    let mut sinks: Vec<Box<dyn Logger>> = Vec::new();
    if let Some(ref p) = args.log_file {
        match TextLogger::new(p) {
            Ok(l) => sinks.push(Box::new(l)),
            Err(e) => eprintln!("Warning: cannot open log file {}: {}", p.display(), e),
        }
    }
    if args.progress && !args.dry_run {
        sinks.push(Box::new(ProgressLogger::new(args.verbose)));
    }
    match sinks.len() {
        0 => Box::new(NoopLogger),
        _ => Box::new(MultiLogger(sinks)),
    }
}

fn open_session<'a>(slot: &'a mut Option<SftpTransport>, cfg: &Config, verbose: bool) -> Result<&'a mut SftpTransport> {
    if slot.is_none() {
        let conn = cfg.connection()?;
        let session = SftpTransport::connect(&conn)?;
        if verbose {
            println!("Connected to {}", session.label());
        }
        *slot = Some(session);
    }
    slot.as_mut().ok_or_else(|| anyhow!("SFTP session unavailable"))
}

/// Run the selected phases. Returns false when any file failed to transfer.
fn run(args: &Args, cfg: &Config, paths: &PathSettings, logger: &dyn Logger) -> Result<bool> {
    let phase = args.phase;
    let mut session: Option<SftpTransport> = None;

    if args.verbose {
        println!("snapsync {} - phase {:?}", env!("CARGO_PKG_VERSION"), phase);
        println!("Remote: {}", paths.remote_dir);
        println!("Local: {}", paths.local_dir.display());
    }

    if phase.generates() {
        println!("[generate] Building remote listing...");
        let s = open_session(&mut session, cfg, args.verbose)?;
        metadata::generate_remote(s, &paths.remote_dir, &paths.remote_metadata)?;
        println!("Listing written to {}", paths.remote_metadata);
    }

    if phase.fetches_metadata() {
        println!("[fetch-metadata] Downloading listing...");
        let s = open_session(&mut session, cfg, args.verbose)?;
        let bytes = metadata::fetch_listing(s, &paths.remote_metadata, &paths.local_metadata)?;
        println!(
            "Listing saved to {} ({} bytes)",
            paths.local_metadata.display(),
            bytes
        );
        if args.cleanup_remote {
            s.remove(&paths.remote_metadata)?;
        }
    }

    if !phase.compares() {
        return Ok(true);
    }

    println!("[compare] Comparing against {}...", paths.local_dir.display());
    let plan = sync::plan(paths)?;
    if args.verbose {
        println!(
            "Listing: {} lines, {} files ({:.2} GB), {} ignored, {} malformed ({} not UTF-8), {} rejected, {} duplicates",
            plan.stats.lines,
            plan.snapshot.len(),
            plan.snapshot.total_bytes() as f64 / 1_073_741_824.0,
            plan.stats.ignored,
            plan.stats.malformed,
            plan.stats.non_utf8,
            plan.stats.rejected,
            plan.stats.duplicates
        );
    }
    println!("Changed files: {}", plan.changes.len());
    if phase == Phase::Compare || args.verbose {
        for change in &plan.changes {
            println!("  - {}", sync::describe(change));
        }
    }

    if !phase.transfers() || plan.changes.is_empty() {
        return Ok(true);
    }

    let start = Instant::now();
    let opts = ApplyOptions {
        dry_run: args.dry_run,
    };
    let report = if args.dry_run {
        let mut offline = DryRunTransport;
        transfer::apply(&plan.changes, &paths.remote_dir, &paths.local_dir, &mut offline, logger, opts)
    } else {
        let s = open_session(&mut session, cfg, args.verbose)?;
        transfer::apply(&plan.changes, &paths.remote_dir, &paths.local_dir, s, logger, opts)
    };

    if let Some(ref journal) = args.journal {
        RunJournal::new(journal)
            .record_report(&new_run_id(), &report)
            .with_context(|| format!("Failed to write journal {}", journal.display()))?;
    }

    if args.dry_run {
        println!("\n=== DRY RUN - Files that would be fetched ===");
        for outcome in &report.outcomes {
            if let transfer::TransferOutcome::Planned {
                remote_path,
                local_path,
                ..
            } = outcome
            {
                println!("  {} -> {}", remote_path, local_path.display());
            }
        }
        return Ok(true);
    }

    let elapsed = start.elapsed();
    println!();
    println!("=== Sync Complete ===");
    println!("Attempted: {}", report.attempted());
    println!("Fetched: {}", report.succeeded());
    println!("Failed: {}", report.failed());
    println!(
        "Total size: {:.2} MB",
        report.bytes() as f64 / 1_048_576.0
    );
    println!("Time: {:.2}s", elapsed.as_secs_f64());

    if !report.is_success() {
        eprintln!("\nErrors encountered: {}", report.failed());
        for (rel, cause) in report.failures() {
            eprintln!("  - {}: {}", rel, cause);
        }
    }
    Ok(report.is_success())
}

/// Stand-in used for dry runs; `apply` never calls it in that mode
struct DryRunTransport;

impl Transport for DryRunTransport {
    fn fetch(&mut self, remote: &str, _local: &Path) -> Result<u64> {
        Err(anyhow!("dry run: refusing to fetch {}", remote))
    }
    fn fetch_and_decompress(&mut self, remote: &str, _local: &Path) -> Result<u64> {
        Err(anyhow!("dry run: refusing to fetch {}", remote))
    }
    fn remove(&mut self, remote: &str) -> Result<()> {
        Err(anyhow!("dry run: refusing to remove {}", remote))
    }
}
