//! Typed errors for the conditions callers have to tell apart.
//!
//! Library code returns `Result<T, Error>`; the pipeline and the binary wrap
//! these in `anyhow` with context. `SnapshotExists` is the only variant that
//! call sites routinely swallow.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// `VERSION n` with n outside 1..=3.
    #[error("unsupported APT helper configuration protocol version ({0})")]
    UnsupportedVersion(i64),

    #[error("malformed protocol version line '{0}'")]
    MalformedVersion(String),

    #[error("malformed v{version} hook record, expected {expected} fields: '{line}'")]
    MalformedRecord {
        version: u32,
        expected: usize,
        line: String,
    },

    #[error("snapshot '{0}' already exists")]
    SnapshotExists(String),

    #[error("creating snapshot '{name}': {detail}")]
    SnapshotCreation { name: String, detail: String },

    #[error("destroying snapshot '{name}': {detail}")]
    SnapshotDestroy { name: String, detail: String },

    /// `zfs list` failed. Expected while probing paths that do not exist yet.
    #[error("listing datasets for '{target}': {detail}")]
    VolumeList { target: String, detail: String },

    #[error("reading properties of '{volume}': {detail}")]
    PropertyRead { volume: String, detail: String },

    /// A name carrying our prefix whose timestamp matches no known format.
    #[error("snapshot '{name}' has an unparseable timestamp '{timestamp}'")]
    TimestampParse { name: String, timestamp: String },

    #[error("no mounted filesystem owns {}", .0.display())]
    UnresolvablePath(PathBuf),

    #[error("reading package data for '{package}': {detail}")]
    Package { package: String, detail: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Benign on re-runs within the same second.
    pub fn is_snapshot_exists(&self) -> bool {
        matches!(self, Error::SnapshotExists(_))
    }
}
