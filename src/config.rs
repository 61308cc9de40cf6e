//! Settings resolution: optional TOML file, then environment overrides
//!
//! Environment keys follow the deployment convention (`SSH_HOST`,
//! `REMOTE_DIR`, ...) so an existing env file keeps working.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::snapshot::IgnoreSet;
use crate::url::{RemoteUrl, DEFAULT_PORT};

pub const DEFAULT_REMOTE_METADATA: &str = "/tmp/filelist.txt.gz";
pub const DEFAULT_LOCAL_METADATA: &str = "filelist.txt";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0} (set it in the config file or the environment)")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub key_file: Option<PathBuf>,

    pub remote_dir: Option<String>,
    pub local_dir: Option<PathBuf>,
    pub ignore_paths: Vec<String>,

    pub remote_metadata: Option<String>,
    pub local_metadata: Option<PathBuf>,
}

/// How to authenticate the SSH session
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    Password(String),
    KeyFile(PathBuf),
    Agent,
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::Password(_) => f.write_str("Password(<redacted>)"),
            Auth::KeyFile(p) => f.debug_tuple("KeyFile").field(p).finish(),
            Auth::Agent => f.write_str("Agent"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub auth: Auth,
}

/// Everything the reconciliation engine needs, already resolved
#[derive(Clone, Debug)]
pub struct PathSettings {
    pub remote_dir: String,
    pub local_dir: PathBuf,
    pub ignore: IgnoreSet,
    pub remote_metadata: String,
    pub local_metadata: PathBuf,
}

impl Config {
    /// Read a TOML config file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Optional file, then the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut cfg = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        cfg.apply_env(|k| std::env::var(k).ok())?;
        Ok(cfg)
    }

    /// Override fields from `lookup` (normally `std::env::var`)
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("SSH_HOST") {
            self.host = Some(v);
        }
        if let Some(v) = get("SFTP_PORT") {
            let port = v.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "SFTP_PORT",
                value: v.clone(),
            })?;
            self.port = Some(port);
        }
        if let Some(v) = get("SSH_USER") {
            self.user = Some(v);
        }
        if let Some(v) = get("SSH_PASS") {
            self.password = Some(v);
        }
        if let Some(v) = get("SSH_KEY") {
            self.key_file = Some(PathBuf::from(v));
        }
        if let Some(v) = get("REMOTE_DIR") {
            self.remote_dir = Some(v);
        }
        if let Some(v) = get("LOCAL_DIR") {
            self.local_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = get("IGNORE_PATHS") {
            self.ignore_paths = v
                .split([',', ';'])
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = get("REMOTE_METADATA") {
            self.remote_metadata = Some(v);
        }
        if let Some(v) = get("LOCAL_METADATA") {
            self.local_metadata = Some(PathBuf::from(v));
        }
        Ok(())
    }

    /// Fold an `sftp://` URL over the connection and remote root
    pub fn apply_remote_url(&mut self, url: RemoteUrl) {
        self.host = Some(url.host);
        self.port = Some(url.port);
        if let Some(user) = url.user {
            self.user = Some(user);
        }
        self.remote_dir = Some(url.path);
    }

    pub fn connection(&self) -> Result<ConnectionConfig, ConfigError> {
        let host = self.host.clone().ok_or(ConfigError::Missing("SSH_HOST"))?;
        let user = self.user.clone().ok_or(ConfigError::Missing("SSH_USER"))?;
        let auth = match (&self.password, &self.key_file) {
            (Some(p), _) => Auth::Password(p.clone()),
            (None, Some(k)) => Auth::KeyFile(k.clone()),
            (None, None) => Auth::Agent,
        };
        Ok(ConnectionConfig {
            host,
            port: self.port.unwrap_or(DEFAULT_PORT),
            user,
            auth,
        })
    }

    pub fn paths(&self) -> Result<PathSettings, ConfigError> {
        let remote_dir = self
            .remote_dir
            .clone()
            .ok_or(ConfigError::Missing("REMOTE_DIR"))?;
        if !remote_dir.starts_with('/') {
            return Err(ConfigError::Invalid {
                key: "REMOTE_DIR",
                value: remote_dir,
            });
        }
        let local_dir = self
            .local_dir
            .clone()
            .ok_or(ConfigError::Missing("LOCAL_DIR"))?;
        Ok(PathSettings {
            ignore: IgnoreSet::new(&remote_dir, &self.ignore_paths),
            remote_dir,
            local_dir,
            remote_metadata: self
                .remote_metadata
                .clone()
                .unwrap_or_else(|| DEFAULT_REMOTE_METADATA.to_string()),
            local_metadata: self
                .local_metadata
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOCAL_METADATA)),
        })
    }
}
