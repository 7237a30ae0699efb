use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use walkdir::WalkDir;

use crate::error::Result;

/// udev's tree of zvol links: `/dev/zvol/<pool>/<path>` -> `../../zdN`.
pub const ZVOL_ROOT: &str = "/dev/zvol";

/// Device path -> zvol name. One volume usually has two keys: the link
/// under `/dev/zvol` and the `/dev/zdN` node it points to.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    map: HashMap<PathBuf, String>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scan() -> Result<Self> {
        Self::scan_dir(Path::new(ZVOL_ROOT))
    }

    /// Walk `root` and record every symlink found. A missing root (no zvols
    /// on this host) yields an empty table.
    pub fn scan_dir(root: &Path) -> Result<Self> {
        let mut table = Self::new();
        if !root.is_dir() {
            debug!("{} not present, no zvol aliases", root.display());
            return Ok(table);
        }
        for entry in WalkDir::new(root).follow_links(false).min_depth(1) {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_symlink() {
                continue;
            }
            let link = entry.path();
            let rel = match link.strip_prefix(root) {
                Ok(r) => r,
                Err(_) => continue,
            };
            let volume = match volume_name(rel) {
                Some(v) => v,
                None => continue,
            };
            // Dangling links still count under their own name.
            if let Ok(target) = fs::canonicalize(link) {
                table.insert(target, volume.clone());
            }
            table.insert(link.to_path_buf(), volume);
        }
        debug!("Found {} zvol device alias(es) under {}", table.len(), root.display());
        Ok(table)
    }

    pub fn insert<P: Into<PathBuf>, S: Into<String>>(&mut self, device: P, volume: S) {
        self.map.insert(device.into(), volume.into());
    }

    /// Look `device` up as given, then through its canonical path.
    pub fn volume_for(&self, device: &Path) -> Option<&str> {
        if let Some(v) = self.map.get(device) {
            return Some(v.as_str());
        }
        let canonical = fs::canonicalize(device).ok()?;
        self.map.get(&canonical).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// `tank/vols/db-part2` -> `tank/vols/db`. Snapshot device links
/// (`tank/vol@snap`) are not volumes and give None.
fn volume_name(rel: &Path) -> Option<String> {
    let parts: Vec<&str> = rel
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    if parts.is_empty() {
        return None;
    }
    let joined = parts.join("/");
    if joined.contains('@') {
        return None;
    }
    Some(strip_partition_suffix(&joined).to_string())
}

fn strip_partition_suffix(name: &str) -> &str {
    if let Some(idx) = name.rfind("-part") {
        let digits = &name[idx + "-part".len()..];
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            return &name[..idx];
        }
    }
    name
}
