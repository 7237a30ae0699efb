//! Storage engine access.
//!
//! - cli.rs — the `zfs` command line tool (all operations)
//! - lzc.rs — libzfs_core loaded at runtime (snapshot create/destroy only)
//!
//! `ProbedEngine::probe()` checks once at startup which backend each
//! operation can use and routes calls accordingly. Callers only see the
//! `ZfsEngine` trait.

use std::collections::BTreeMap;
use std::fmt;

use log::{debug, info};

use crate::config::HookConfig;
use crate::error::{Error, Result};

mod cli;
mod lzc;

pub use cli::ZfsCli;
pub use lzc::LibZfsCore;

/// A dataset property value. Only boolean spellings are coerced; numbers,
/// sizes and lists stay text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Bool(bool),
    Text(String),
}

impl PropertyValue {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "on" | "true" => PropertyValue::Bool(true),
            "off" | "false" => PropertyValue::Bool(false),
            _ => PropertyValue::Text(raw.to_string()),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            PropertyValue::Text(_) => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(true) => write!(f, "on"),
            PropertyValue::Bool(false) => write!(f, "off"),
            PropertyValue::Text(s) => write!(f, "{s}"),
        }
    }
}

pub type Properties = BTreeMap<String, PropertyValue>;

/// The four storage operations the pipeline needs.
pub trait ZfsEngine {
    /// Create `<dataset>@<snap>`. Must report an existing snapshot as
    /// `Error::SnapshotExists`.
    fn create_snapshot(&self, name: &str) -> Result<()>;

    /// Full snapshot names, of one dataset or of every pool when `None`.
    fn list_snapshots(&self, volume: Option<&str>) -> Result<Vec<String>>;

    fn get_properties(&self, volume: &str) -> Result<Properties>;

    fn destroy_snapshots(&self, names: &[String]) -> Result<()>;
}

/// Refuse anything that is not `<dataset>@<snap>` before a destroy.
pub(crate) fn ensure_snapshot_names(names: &[String]) -> Result<()> {
    match names.iter().find(|n| !n.contains('@')) {
        Some(name) => Err(Error::SnapshotDestroy {
            name: name.clone(),
            detail: "not a snapshot name".to_string(),
        }),
        None => Ok(()),
    }
}

/// Engine with the backend per operation chosen at startup.
pub struct ProbedEngine {
    cli: ZfsCli,
    native: Option<LibZfsCore>,
}

impl ProbedEngine {
    pub fn probe(cfg: &HookConfig) -> Self {
        let cli = ZfsCli::new(cfg.zfs_bin.clone());
        let native = match LibZfsCore::load() {
            Ok(lib) => {
                info!("Using libzfs_core for snapshot creation and destruction");
                Some(lib)
            }
            Err(e) => {
                debug!("libzfs_core unavailable ({e:#}), using `{}`", cfg.zfs_bin);
                None
            }
        };
        Self { cli, native }
    }

    /// Command-line backend, also used by the `zfs list` path resolver.
    pub fn cli(&self) -> &ZfsCli {
        &self.cli
    }
}

impl ZfsEngine for ProbedEngine {
    fn create_snapshot(&self, name: &str) -> Result<()> {
        match &self.native {
            Some(lib) => lib.create_snapshot(name),
            None => self.cli.create_snapshot(name),
        }
    }

    fn list_snapshots(&self, volume: Option<&str>) -> Result<Vec<String>> {
        self.cli.list_snapshots(volume)
    }

    fn get_properties(&self, volume: &str) -> Result<Properties> {
        self.cli.get_properties(volume)
    }

    fn destroy_snapshots(&self, names: &[String]) -> Result<()> {
        ensure_snapshot_names(names)?;
        match &self.native {
            Some(lib) => lib.destroy_snapshots(names),
            None => self.cli.destroy_snapshots(names),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_boolean_spellings_are_coerced() {
        assert_eq!(PropertyValue::parse("on"), PropertyValue::Bool(true));
        assert_eq!(PropertyValue::parse("FALSE"), PropertyValue::Bool(false));
        assert_eq!(PropertyValue::parse("Off"), PropertyValue::Bool(false));
        assert_eq!(PropertyValue::parse("0"), PropertyValue::Text("0".into()));
        assert_eq!(PropertyValue::parse("lz4"), PropertyValue::Text("lz4".into()));
        assert_eq!(PropertyValue::parse("-").as_bool(), None);
    }

    #[test]
    fn destroy_checks_every_name_before_any_backend_runs() {
        let engine = ProbedEngine {
            cli: ZfsCli::new("/nonexistent/zfs"),
            native: None,
        };
        let names = vec!["tank/usr@zfs-apt-snap_2024".to_string(), "tank/usr".to_string()];
        match engine.destroy_snapshots(&names) {
            Err(Error::SnapshotDestroy { name, detail }) => {
                assert_eq!(name, "tank/usr");
                assert_eq!(detail, "not a snapshot name");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(ensure_snapshot_names(&names[..1]).is_ok());
    }
}
