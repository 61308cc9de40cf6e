use anyhow::Result;
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use crate::path_map::RelPath;

pub trait Logger: Send + Sync {
    fn run_start(&self, _remote_root: &str, _local_root: &Path, _pending: usize) {}
    fn fetch_start(&self, _rel: &RelPath, _remote: &str) {}
    fn fetch_done(&self, _rel: &RelPath, _local: &Path, _bytes: u64) {}
    fn error(&self, _context: &str, _rel: &RelPath, _msg: &str) {}
    fn done(&self, _attempted: u64, _failed: u64, _bytes: u64, _seconds: f64) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

pub struct TextLogger {
    file: Mutex<File>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }

    fn line(&self, s: &str) {
        if let Ok(mut f) = self.file.lock() {
            let _ = writeln!(f, "[{}] {}", Utc::now().to_rfc3339(), s);
        }
    }
}

impl Logger for TextLogger {
    fn run_start(&self, remote_root: &str, local_root: &Path, pending: usize) {
        self.line(&format!(
            "START remote={} local={} pending={}",
            remote_root,
            local_root.display(),
            pending
        ));
    }
    fn fetch_start(&self, rel: &RelPath, remote: &str) {
        self.line(&format!("FETCH rel={} remote={}", rel, remote));
    }
    fn fetch_done(&self, rel: &RelPath, local: &Path, bytes: u64) {
        self.line(&format!(
            "DONE rel={} local={} bytes={}",
            rel,
            local.display(),
            bytes
        ));
    }
    fn error(&self, context: &str, rel: &RelPath, msg: &str) {
        self.line(&format!("ERROR ctx={} rel={} msg={}", context, rel, msg));
    }
    fn done(&self, attempted: u64, failed: u64, bytes: u64, seconds: f64) {
        self.line(&format!(
            "END attempted={attempted} failed={failed} bytes={bytes} seconds={seconds:.3}"
        ));
    }
}

/// Fan events out to several sinks
pub struct MultiLogger(pub Vec<Box<dyn Logger>>);

impl Logger for MultiLogger {
    fn run_start(&self, remote_root: &str, local_root: &Path, pending: usize) {
        self.0.iter().for_each(|l| l.run_start(remote_root, local_root, pending));
    }
    fn fetch_start(&self, rel: &RelPath, remote: &str) {
        self.0.iter().for_each(|l| l.fetch_start(rel, remote));
    }
    fn fetch_done(&self, rel: &RelPath, local: &Path, bytes: u64) {
        self.0.iter().for_each(|l| l.fetch_done(rel, local, bytes));
    }
    fn error(&self, context: &str, rel: &RelPath, msg: &str) {
        self.0.iter().for_each(|l| l.error(context, rel, msg));
    }
    fn done(&self, attempted: u64, failed: u64, bytes: u64, seconds: f64) {
        self.0.iter().for_each(|l| l.done(attempted, failed, bytes, seconds));
    }
}
