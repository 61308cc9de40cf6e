//! SFTP transport over libssh2
//!
//! One session per run. The SFTP channel and the SSH session are released in
//! `Drop`, so every exit path (success, per-file failure, fatal error) closes
//! the connection.

use anyhow::{anyhow, bail, Context, Result};
use ssh2::{Session, Sftp};
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use crate::config::{Auth, ConnectionConfig};
use crate::gz;
use crate::transfer::Transport;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
/// Per-operation libssh2 timeout for handshake and transfers; lifted for `exec`
const SESSION_TIMEOUT_MS: u32 = 60_000;
const COPY_BUFFER: usize = 256 * 1024;

/// Output of a remote command, stdout and stderr interleaved
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub status: i32,
    pub output: String,
}

/// Disables the libssh2 timeout until dropped, then restores the old value
struct TimeoutLifted {
    session: Session,
    saved: u32,
}

impl TimeoutLifted {
    fn new(session: Session) -> Self {
        let saved = session.timeout();
        session.set_timeout(0);
        Self { session, saved }
    }
}

impl Drop for TimeoutLifted {
    fn drop(&mut self) {
        self.session.set_timeout(self.saved);
    }
}

pub struct SftpTransport {
    session: Session,
    sftp: Option<Sftp>,
    label: String,
}

impl SftpTransport {
    /// Connect, handshake and authenticate. Any failure here is fatal for the run.
    pub fn connect(cfg: &ConnectionConfig) -> Result<Self> {
        let label = format!("{}@{}:{}", cfg.user, cfg.host, cfg.port);
        let addr = (cfg.host.as_str(), cfg.port)
            .to_socket_addrs()
            .with_context(|| format!("Failed to resolve {}", cfg.host))?
            .next()
            .ok_or_else(|| anyhow!("No address for {}", cfg.host))?;
        let tcp = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)
            .with_context(|| format!("TCP connect to {} failed", addr))?;

        let mut session = Session::new().context("Failed to create SSH session")?;
        session.set_tcp_stream(tcp);
        session.set_timeout(SESSION_TIMEOUT_MS);
        session
            .handshake()
            .with_context(|| format!("SSH handshake failed: {}", label))?;

        let auth = match &cfg.auth {
            Auth::Password(pass) => session.userauth_password(&cfg.user, pass),
            Auth::KeyFile(key) => session.userauth_pubkey_file(&cfg.user, None, key, None),
            Auth::Agent => session.userauth_agent(&cfg.user),
        };
        auth.with_context(|| format!("Authentication failed for {}", label))?;
        if !session.authenticated() {
            bail!("Authentication failed for {}", label);
        }

        let sftp = session
            .sftp()
            .with_context(|| format!("Failed to open SFTP subsystem on {}", label))?;
        Ok(Self {
            session,
            sftp: Some(sftp),
            label,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    fn sftp(&self) -> Result<&Sftp> {
        self.sftp
            .as_ref()
            .ok_or_else(|| anyhow!("SFTP channel already closed"))
    }

    /// Run a shell command on the remote host and wait for it to exit.
    ///
    /// A listing of a large tree can stay silent for minutes, so the session
    /// timeout is suspended while the command runs.
    pub fn exec(&mut self, command: &str) -> Result<ExecOutput> {
        let _lifted = TimeoutLifted::new(self.session.clone());
        self.exec_blocking(command)
    }

    fn exec_blocking(&mut self, command: &str) -> Result<ExecOutput> {
        let mut channel = self
            .session
            .channel_session()
            .context("Failed to open exec channel")?;
        // one stream, so a chatty stderr can't stall the window while stdout is drained
        channel
            .handle_extended_data(ssh2::ExtendedData::Merge)
            .context("Failed to merge remote stderr")?;
        channel
            .exec(command)
            .with_context(|| format!("Failed to run remote command: {}", command))?;
        let mut raw = Vec::new();
        channel
            .read_to_end(&mut raw)
            .context("Failed to read remote command output")?;
        channel.wait_close()?;
        Ok(ExecOutput {
            status: channel.exit_status()?,
            output: String::from_utf8_lossy(&raw).into_owned(),
        })
    }

    fn download(&self, remote: &str, local: &Path) -> Result<u64> {
        let mut src = self
            .sftp()?
            .open(Path::new(remote))
            .with_context(|| format!("Failed to open remote {}", remote))?;
        let file =
            File::create(local).with_context(|| format!("Failed to create {}", local.display()))?;
        let mut writer = BufWriter::with_capacity(COPY_BUFFER, file);
        let bytes = io::copy(&mut src, &mut writer)
            .with_context(|| format!("Failed to download {}", remote))?;
        writer.flush()?;
        Ok(bytes)
    }
}

impl Transport for SftpTransport {
    fn fetch(&mut self, remote: &str, local: &Path) -> Result<u64> {
        self.download(remote, local).inspect_err(|_| {
            let _ = fs::remove_file(local);
        })
    }

    fn fetch_and_decompress(&mut self, remote: &str, local: &Path) -> Result<u64> {
        let tmp = gz::temp_path_for(local);
        if let Err(e) = self.download(remote, &tmp) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        gz::decompress_file(&tmp, local)
    }

    fn remove(&mut self, remote: &str) -> Result<()> {
        self.sftp()?
            .unlink(Path::new(remote))
            .with_context(|| format!("Failed to remove remote {}", remote))
    }
}

impl Drop for SftpTransport {
    fn drop(&mut self) {
        // channel before session
        drop(self.sftp.take());
        let _ = self.session.disconnect(None, "snapsync done", None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_timeout_is_lifted_then_restored() {
        let session = Session::new().unwrap();
        session.set_timeout(SESSION_TIMEOUT_MS);
        {
            let _lifted = TimeoutLifted::new(session.clone());
            assert_eq!(session.timeout(), 0);
        }
        assert_eq!(session.timeout(), SESSION_TIMEOUT_MS);
    }
}
