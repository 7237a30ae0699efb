//! Path -> owning ZFS volume.
//!
//! Two interchangeable strategies behind `VolumeResolver`:
//! - `MountTableResolver` — longest mountpoint match in `/proc/self/mounts`,
//!   zvol-backed mounts mapped through the `/dev/zvol` alias table. Needs
//!   no external command and copes with paths that do not exist yet.
//! - `ZfsListResolver` — asks `zfs list` about the path itself and walks up
//!   to the parent while that fails. Used when the mount table is not
//!   readable.
//!
//! `probe()` picks one at startup.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::mounts::{AliasTable, MountTable};
use crate::paths::DirectorySet;
use crate::zfs::ZfsCli;

/// Distinct volumes needing a snapshot.
pub type VolumeSet = BTreeSet<String>;

pub trait VolumeResolver {
    /// Owning volume of `path`, `None` when it is not on a managed volume.
    fn resolve(&self, path: &Path) -> Result<Option<String>>;

    fn describe(&self) -> &'static str;
}

/// Resolve every directory and deduplicate the volumes.
pub fn resolve_all(resolver: &dyn VolumeResolver, dirs: &DirectorySet) -> Result<VolumeSet> {
    let mut volumes = VolumeSet::new();
    for dir in dirs {
        if let Some(v) = resolver.resolve(dir)? {
            debug!("{} -> {}", dir.display(), v);
            volumes.insert(v);
        }
    }
    info!(
        "Resolved {} path(s) to {} volume(s): {}",
        dirs.len(),
        volumes.len(),
        volumes.iter().cloned().collect::<Vec<_>>().join(", ")
    );
    Ok(volumes)
}

/// `path` with its deepest existing ancestor canonicalised (symlinks
/// followed) and the not-yet-existing remainder re-appended.
pub fn canonical_form(path: &Path) -> PathBuf {
    let mut existing = path;
    let mut missing = Vec::new();
    loop {
        if let Ok(real) = fs::canonicalize(existing) {
            let mut out = real;
            for seg in missing.iter().rev() {
                out.push(seg);
            }
            return out;
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return path.to_path_buf(),
        }
    }
}

pub struct MountTableResolver {
    mounts: MountTable,
    aliases: AliasTable,
    follow_symlinks: bool,
}

impl MountTableResolver {
    pub fn new(mounts: MountTable, aliases: AliasTable) -> Self {
        Self {
            mounts,
            aliases,
            follow_symlinks: true,
        }
    }

    /// Live tables of this host.
    pub fn from_system() -> Result<Self> {
        let mounts = MountTable::read()?;
        let aliases = AliasTable::scan()?;
        debug!("{} mount(s), {} zvol alias(es)", mounts.len(), aliases.len());
        Ok(Self::new(mounts, aliases))
    }

    /// Match paths textually against the table, without touching the
    /// filesystem. For synthetic tables.
    pub fn with_follow_symlinks(mut self, on: bool) -> Self {
        self.follow_symlinks = on;
        self
    }
}

impl VolumeResolver for MountTableResolver {
    fn resolve(&self, path: &Path) -> Result<Option<String>> {
        let path = if self.follow_symlinks {
            canonical_form(path)
        } else {
            path.to_path_buf()
        };
        let mount = self
            .mounts
            .owner_of(&path)
            .ok_or_else(|| Error::UnresolvablePath(path.clone()))?;

        if mount.is_zfs() {
            return Ok(Some(mount.source.clone()));
        }
        match self.aliases.volume_for(Path::new(&mount.source)) {
            Some(volume) => Ok(Some(volume.to_string())),
            None => {
                warn!(
                    "{} is on {} ({} at {}), not a ZFS volume; skipping",
                    path.display(),
                    mount.source,
                    mount.fstype,
                    mount.mountpoint.display()
                );
                Ok(None)
            }
        }
    }

    fn describe(&self) -> &'static str {
        "mount table"
    }
}

pub struct ZfsListResolver {
    zfs: ZfsCli,
}

impl ZfsListResolver {
    pub fn new(zfs: ZfsCli) -> Self {
        Self { zfs }
    }
}

impl VolumeResolver for ZfsListResolver {
    fn resolve(&self, path: &Path) -> Result<Option<String>> {
        let mut current = path.to_path_buf();
        loop {
            match self.zfs.filesystems_for(&current.to_string_lossy()) {
                Ok(found) => return Ok(found.into_iter().next()),
                Err(e @ Error::VolumeList { .. }) => match current.parent() {
                    Some(parent) => {
                        debug!("{e}; retrying with {}", parent.display());
                        current = parent.to_path_buf();
                    }
                    None => return Err(e),
                },
                Err(e) => return Err(e),
            }
        }
    }

    fn describe(&self) -> &'static str {
        "zfs list"
    }
}

/// Mount table when readable, else `zfs list`.
pub fn probe(zfs: &ZfsCli) -> Box<dyn VolumeResolver> {
    let resolver: Box<dyn VolumeResolver> = match MountTableResolver::from_system() {
        Ok(r) => Box::new(r),
        Err(e) => {
            warn!("Mount table unavailable ({e}); resolving paths with `zfs list`");
            Box::new(ZfsListResolver::new(zfs.clone()))
        }
    };
    debug!("Volume resolution via {}", resolver.describe());
    resolver
}
