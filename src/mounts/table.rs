use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

pub const PROC_MOUNTS: &str = "/proc/self/mounts";

/// fstype tag of a mount whose source is a dataset name.
pub const ZFS_FSTYPE: &str = "zfs";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    /// Device path, dataset name or pseudo source ("proc", "tmpfs", ...).
    pub source: String,
    pub mountpoint: PathBuf,
    pub fstype: String,
    pub options: Vec<String>,
}

impl MountEntry {
    pub fn new<S, P, T>(source: S, mountpoint: P, fstype: T) -> Self
    where
        S: Into<String>,
        P: Into<PathBuf>,
        T: Into<String>,
    {
        Self {
            source: source.into(),
            mountpoint: mountpoint.into(),
            fstype: fstype.into(),
            options: Vec::new(),
        }
    }

    pub fn is_zfs(&self) -> bool {
        self.fstype == ZFS_FSTYPE
    }

    /// Number of path components in the mountpoint; `/` counts as one.
    fn depth(&self) -> usize {
        self.mountpoint.components().count()
    }
}

/// Snapshot of the mount table at read time.
#[derive(Debug, Clone, Default)]
pub struct MountTable {
    entries: Vec<MountEntry>,
}

impl MountTable {
    pub fn new(entries: Vec<MountEntry>) -> Self {
        Self { entries }
    }

    /// Read the live table of this process's mount namespace.
    pub fn read() -> Result<Self> {
        Self::read_from(Path::new(PROC_MOUNTS))
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }

    /// Parse fstab-format lines (`source mountpoint fstype options freq pass`).
    /// Lines with fewer than four fields are skipped.
    pub fn parse(text: &str) -> Self {
        let mut entries = Vec::new();
        for line in text.lines() {
            let mut fields = line.split_whitespace();
            let (source, mountpoint, fstype, options) =
                match (fields.next(), fields.next(), fields.next(), fields.next()) {
                    (Some(s), Some(m), Some(t), Some(o)) => (s, m, t, o),
                    _ => continue,
                };
            entries.push(MountEntry {
                source: unescape(source),
                mountpoint: PathBuf::from(unescape(mountpoint)),
                fstype: fstype.to_string(),
                options: options.split(',').map(str::to_string).collect(),
            });
        }
        Self { entries }
    }

    pub fn entries(&self) -> &[MountEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The mount owning `path`: the entry with the deepest mountpoint that is
    /// a component-prefix of `path`. On equal depth the later entry wins,
    /// since it was mounted over the earlier one.
    pub fn owner_of(&self, path: &Path) -> Option<&MountEntry> {
        let mut best: Option<&MountEntry> = None;
        for e in &self.entries {
            if !path.starts_with(&e.mountpoint) {
                continue;
            }
            match best {
                Some(b) if b.depth() > e.depth() => {}
                _ => best = Some(e),
            }
        }
        best
    }
}

/// Decode the kernel's octal escapes (`\040` space, `\011` tab, `\012`
/// newline, `\134` backslash). Anything else passes through unchanged.
fn unescape(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() && is_octal_triplet(&bytes[i + 1..i + 4]) {
            let v = (bytes[i + 1] - b'0') * 64 + (bytes[i + 2] - b'0') * 8 + (bytes[i + 3] - b'0');
            out.push(v);
            i += 4;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn is_octal_triplet(b: &[u8]) -> bool {
    b.len() == 3 && b[0] <= b'3' && b.iter().all(|c| (b'0'..=b'7').contains(c))
}
