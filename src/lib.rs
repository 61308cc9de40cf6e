//! snapsync library
//!
//! One-way snapshot-and-diff mirroring of a remote SFTP tree

pub mod cli;
pub mod clock;
pub mod config;
pub mod gz;
pub mod log;
pub mod logger;
pub mod metadata;
pub mod path_map;
pub mod progress;
pub mod reconcile;
pub mod sftp;
pub mod snapshot;
pub mod sync;
pub mod transfer;
pub mod url;

pub use cli::{Args, Phase};
pub use path_map::RelPath;
pub use reconcile::{reconcile, ChangeRecord};
pub use snapshot::{parse_snapshot, IgnoreSet, Snapshot};
pub use transfer::{apply, Transport, TransferReport};
