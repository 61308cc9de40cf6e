//! gzip helpers for the snapshot and text payloads

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// `<path>.gz`, the temporary name used while a compressed copy is in flight
pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".gz");
    PathBuf::from(name)
}

/// Decompress `src` into `dst`, then remove `src`. `src` is removed on
/// failure too so no compressed artifact outlives the call.
pub fn decompress_file(src: &Path, dst: &Path) -> Result<u64> {
    let result = (|| -> Result<u64> {
        let input = File::open(src).with_context(|| format!("Failed to open {}", src.display()))?;
        let mut decoder = GzDecoder::new(BufReader::new(input));
        let output =
            File::create(dst).with_context(|| format!("Failed to create {}", dst.display()))?;
        let mut writer = BufWriter::new(output);
        let bytes = io::copy(&mut decoder, &mut writer)
            .with_context(|| format!("Failed to gunzip {}", src.display()))?;
        writer.flush()?;
        Ok(bytes)
    })();
    let _ = fs::remove_file(src);
    result
}
