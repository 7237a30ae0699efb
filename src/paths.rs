//! Leaf-directory reduction of package file lists.
//!
//! A package lists every directory it owns alongside its files
//! (`/.`, `/usr`, `/usr/bin`, `/usr/bin/foo`, ...). Only the deepest entries
//! matter for volume resolution: a parent directory lives on the same or a
//! shallower mount than its children.

use std::collections::btree_set;
use std::collections::BTreeSet;
use std::ops::Bound;
use std::path::{Component, Path, PathBuf};

/// Archive-root spellings; none of them names a real path.
const ROOT_MARKERS: [&str; 5] = [".", "./", "/.", "/", ""];

pub fn is_root_marker(entry: &str) -> bool {
    ROOT_MARKERS.contains(&entry)
}

/// Set of absolute paths where no member is an ancestor of another.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectorySet {
    dirs: BTreeSet<PathBuf>,
}

impl DirectorySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert keeping only leaves.
    ///
    /// Returns false when the set already holds `path` or a descendant of it.
    /// Otherwise every ancestor of `path` is evicted first.
    pub fn insert(&mut self, path: PathBuf) -> bool {
        if self.covers(&path) {
            return false;
        }
        for ancestor in path.ancestors().skip(1) {
            self.dirs.remove(ancestor);
        }
        self.dirs.insert(path)
    }

    /// True if `path` or one of its descendants is a member.
    ///
    /// `PathBuf` orders component-wise, so descendants of `path` sort
    /// directly after it.
    pub fn covers(&self, path: &Path) -> bool {
        if self.dirs.contains(path) {
            return true;
        }
        self.dirs
            .range::<Path, _>((Bound::Excluded(path), Bound::Unbounded))
            .next()
            .map_or(false, |next| next.starts_with(path))
    }

    /// Leaf-preserving union.
    pub fn merge(&mut self, other: DirectorySet) {
        for p in other.dirs {
            self.insert(p);
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.dirs.contains(path)
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    pub fn iter(&self) -> btree_set::Iter<'_, PathBuf> {
        self.dirs.iter()
    }
}

impl IntoIterator for DirectorySet {
    type Item = PathBuf;
    type IntoIter = btree_set::IntoIter<PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.dirs.into_iter()
    }
}

impl<'a> IntoIterator for &'a DirectorySet {
    type Item = &'a PathBuf;
    type IntoIter = btree_set::Iter<'a, PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.dirs.iter()
    }
}

impl FromIterator<PathBuf> for DirectorySet {
    fn from_iter<I: IntoIterator<Item = PathBuf>>(iter: I) -> Self {
        let mut set = DirectorySet::new();
        for p in iter {
            set.insert(p);
        }
        set
    }
}

/// Absolute, `.`-free form of a list entry. Relative entries (`./usr/bin/`,
/// `usr/bin`) are rooted at `/`.
fn qualify(entry: &str) -> PathBuf {
    let mut out = PathBuf::from("/");
    for comp in Path::new(entry).components() {
        match comp {
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
            Component::ParentDir => out.push(".."),
            Component::Normal(seg) => out.push(seg),
        }
    }
    out
}

/// Reduce one package's file list to its leaf directories.
pub fn reduce_paths<I, S>(entries: I) -> DirectorySet
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut set = DirectorySet::new();
    for entry in entries {
        let entry = entry.as_ref();
        if is_root_marker(entry) {
            continue;
        }
        let path = qualify(entry);
        if path.parent().is_none() {
            // "//" and friends collapse to the root as well
            continue;
        }
        set.insert(path);
    }
    set
}
