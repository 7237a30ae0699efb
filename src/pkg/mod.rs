//! Package manager collaborator.
//!
//! - dpkg.rs — installed state and file lists from the dpkg database
//! - deb.rs  — file list of a `.deb` via `dpkg-deb --contents`

use std::path::Path;

use crate::error::Result;

mod deb;
mod dpkg;

pub use deb::parse_contents;
pub use dpkg::{DpkgDatabase, StatusEntry};

/// What the hook parser needs from the package manager.
pub trait PackageSource {
    /// File list of the installed package `name` (optionally `name:arch`),
    /// `None` when dpkg has no record of its files.
    fn lookup_installed(&self, name: &str) -> Result<Option<Vec<String>>>;

    /// Whether the package currently has an installed version.
    fn is_installed(&self, name: &str) -> Result<bool>;

    /// File list inside a package archive that has not been unpacked yet.
    fn open_archive(&self, path: &Path) -> Result<Vec<String>>;
}
