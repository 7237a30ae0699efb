#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use zfs_apt_snapshot::error::{Error, Result};
use zfs_apt_snapshot::{MountEntry, MountTable, MountTableResolver, PackageSource, Properties, PropertyValue, ZfsEngine};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("zfsapt-{prefix}-{pid}-{t}-{id}"))
}

/// Archives and installed packages held in memory.
#[derive(Default)]
pub struct FakePackages {
    pub archives: HashMap<PathBuf, Vec<String>>,
    pub installed: HashMap<String, Vec<String>>,
    pub opened: RefCell<Vec<PathBuf>>,
}

impl FakePackages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn archive(mut self, path: &str, files: &[&str]) -> Self {
        self.archives
            .insert(PathBuf::from(path), files.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn installed(mut self, name: &str, files: &[&str]) -> Self {
        self.installed
            .insert(name.to_string(), files.iter().map(|s| s.to_string()).collect());
        self
    }
}

impl PackageSource for FakePackages {
    fn lookup_installed(&self, name: &str) -> Result<Option<Vec<String>>> {
        Ok(self.installed.get(name).cloned())
    }

    fn is_installed(&self, name: &str) -> Result<bool> {
        Ok(self.installed.contains_key(name))
    }

    fn open_archive(&self, path: &Path) -> Result<Vec<String>> {
        self.opened.borrow_mut().push(path.to_path_buf());
        self.archives.get(path).cloned().ok_or_else(|| Error::Package {
            package: path.display().to_string(),
            detail: "no such archive".to_string(),
        })
    }
}

/// Storage engine that records every call.
#[derive(Default)]
pub struct FakeEngine {
    pub props: HashMap<String, Properties>,
    pub snapshots: RefCell<Vec<String>>,
    pub create_calls: RefCell<Vec<String>>,
    pub destroyed: RefCell<Vec<String>>,
    /// Volumes whose snapshot creation fails.
    pub broken: HashSet<String>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_property(mut self, volume: &str, name: &str, raw: &str) -> Self {
        self.props
            .entry(volume.to_string())
            .or_default()
            .insert(name.to_string(), PropertyValue::parse(raw));
        self
    }

    pub fn with_snapshot(self, name: &str) -> Self {
        self.snapshots.borrow_mut().push(name.to_string());
        self
    }

    pub fn with_broken(mut self, volume: &str) -> Self {
        self.broken.insert(volume.to_string());
        self
    }
}

impl ZfsEngine for FakeEngine {
    fn create_snapshot(&self, name: &str) -> Result<()> {
        self.create_calls.borrow_mut().push(name.to_string());
        let volume = name.split('@').next().unwrap_or_default();
        if self.broken.contains(volume) {
            return Err(Error::SnapshotCreation {
                name: name.to_string(),
                detail: "out of space".to_string(),
            });
        }
        let mut snaps = self.snapshots.borrow_mut();
        if snaps.iter().any(|s| s == name) {
            return Err(Error::SnapshotExists(name.to_string()));
        }
        snaps.push(name.to_string());
        Ok(())
    }

    fn list_snapshots(&self, volume: Option<&str>) -> Result<Vec<String>> {
        Ok(self
            .snapshots
            .borrow()
            .iter()
            .filter(|s| volume.map_or(true, |v| s.split('@').next() == Some(v)))
            .cloned()
            .collect())
    }

    fn get_properties(&self, volume: &str) -> Result<Properties> {
        Ok(self.props.get(volume).cloned().unwrap_or_default())
    }

    fn destroy_snapshots(&self, names: &[String]) -> Result<()> {
        self.snapshots.borrow_mut().retain(|s| !names.contains(s));
        self.destroyed.borrow_mut().extend(names.iter().cloned());
        Ok(())
    }
}

/// `/` on rpool/ROOT and `/usr` on tank/usr, matched textually.
pub fn two_pool_resolver() -> MountTableResolver {
    let mounts = MountTable::new(vec![
        MountEntry::new("rpool/ROOT/debian", "/", "zfs"),
        MountEntry::new("tank/usr", "/usr", "zfs"),
        MountEntry::new("tmpfs", "/run", "tmpfs"),
    ]);
    MountTableResolver::new(mounts, Default::default()).with_follow_symlinks(false)
}
