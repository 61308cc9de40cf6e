//! Progress bar sink for the transfer loop

use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

use crate::logger::Logger;
use crate::path_map::RelPath;

pub struct ProgressLogger {
    bar: ProgressBar,
    show_files: bool,
}

impl ProgressLogger {
    pub fn new(show_files: bool) -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        Self { bar, show_files }
    }
}

impl Logger for ProgressLogger {
    fn run_start(&self, _remote_root: &str, _local_root: &Path, pending: usize) {
        self.bar.set_length(pending as u64);
        self.bar.set_position(0);
    }
    fn fetch_start(&self, rel: &RelPath, _remote: &str) {
        self.bar.set_message(rel.to_string());
    }
    fn fetch_done(&self, rel: &RelPath, _local: &Path, bytes: u64) {
        if self.show_files {
            self.bar.println(format!("  fetched {} ({} bytes)", rel, bytes));
        }
        self.bar.inc(1);
    }
    fn error(&self, _context: &str, rel: &RelPath, msg: &str) {
        self.bar.println(format!("  failed  {}: {}", rel, msg));
        self.bar.inc(1);
    }
    fn done(&self, _attempted: u64, _failed: u64, _bytes: u64, _seconds: f64) {
        self.bar.finish_and_clear();
    }
}
