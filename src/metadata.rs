//! Remote listing generation and retrieval
//!
//! The listing is produced on the server by `find -printf`, gzip'd there, and
//! pulled down as a single compressed object.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

use crate::sftp::SftpTransport;
use crate::transfer::Transport;

/// `find` output format matching what `snapshot::parse_snapshot` reads
pub const FIND_PRINTF: &str = "%s %TY-%Tm-%Td %TH:%TM:%TS %p\\n";

/// Single-quote `s` for a POSIX shell
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Exit status of the listing command when `remote_dir` can't be listed
pub const UNREADABLE_DIR_STATUS: i32 = 2;

/// Command that writes the gzip'd listing of `remote_dir` to `remote_metadata`.
///
/// A pipeline exits with gzip's status, so the directory is checked up front;
/// otherwise a missing root would yield an empty listing and a clean exit.
pub fn listing_command(remote_dir: &str, remote_metadata: &str) -> String {
    let dir = shell_quote(remote_dir);
    format!(
        "{{ [ -d {dir} ] && [ -r {dir} ]; }} || {{ echo {msg} >&2; exit {code}; }}; \
         find {dir} -type f -printf '{fmt}' | gzip -c > {meta}",
        dir = dir,
        msg = shell_quote(&format!("{}: not a readable directory", remote_dir)),
        code = UNREADABLE_DIR_STATUS,
        fmt = FIND_PRINTF,
        meta = shell_quote(remote_metadata)
    )
}

/// Run the listing command and wait for it. A non-zero exit is an error.
pub fn generate_remote(session: &mut SftpTransport, remote_dir: &str, remote_metadata: &str) -> Result<()> {
    let command = listing_command(remote_dir, remote_metadata);
    let out = session.exec(&command)?;
    if out.status != 0 {
        bail!(
            "Remote listing command exited with {}: {}",
            out.status,
            out.output.trim()
        );
    }
    Ok(())
}

/// Pull the compressed listing and leave its decompressed text at `local_metadata`
pub fn fetch_listing(
    transport: &mut dyn Transport,
    remote_metadata: &str,
    local_metadata: &Path,
) -> Result<u64> {
    if let Some(parent) = local_metadata.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    transport
        .fetch_and_decompress(remote_metadata, local_metadata)
        .with_context(|| format!("Failed to fetch remote listing {}", remote_metadata))
}
