//! dpkg database reader.
//!
//! Layout under the admin dir (default /var/lib/dpkg):
//! - status              — RFC822-style stanzas, one per package+arch
//! - info/<pkg>.list     — installed file list (absolute paths, first is "/.")
//! - info/<pkg>:<arch>.list for Multi-Arch: same packages

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use super::{deb, PackageSource};
use crate::error::{Error, Result};
use crate::exec::{self, spawn_failure_detail};

/// One stanza of the status file, reduced to what install state needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub package: String,
    pub architecture: Option<String>,
    /// Third word of `Status:` ("installed", "config-files", ...).
    pub state: String,
}

impl StatusEntry {
    /// True when the package has a current version on disk. Removed
    /// packages that left conffiles behind do not count.
    pub fn has_current_version(&self) -> bool {
        !matches!(self.state.as_str(), "not-installed" | "config-files")
    }
}

pub struct DpkgDatabase {
    admindir: PathBuf,
    dpkg_deb: String,
    status: HashMap<String, Vec<StatusEntry>>,
}

/// Parse the status file into entries keyed by package name.
pub(crate) fn parse_status(text: &str) -> HashMap<String, Vec<StatusEntry>> {
    let mut out: HashMap<String, Vec<StatusEntry>> = HashMap::new();
    for stanza in text.split("\n\n") {
        let mut package = None;
        let mut architecture = None;
        let mut state = None;
        for line in stanza.lines() {
            // continuation lines (descriptions, conffiles) start with a space
            if line.starts_with(' ') || line.starts_with('\t') {
                continue;
            }
            let (key, value) = match line.split_once(':') {
                Some(kv) => kv,
                None => continue,
            };
            let value = value.trim();
            match key {
                "Package" => package = Some(value.to_string()),
                "Architecture" => architecture = Some(value.to_string()),
                "Status" => state = value.split_whitespace().nth(2).map(str::to_string),
                _ => {}
            }
        }
        if let (Some(package), Some(state)) = (package, state) {
            out.entry(package.clone()).or_default().push(StatusEntry {
                package,
                architecture,
                state,
            });
        }
    }
    out
}

impl DpkgDatabase {
    /// Read the status file under `admindir`.
    pub fn open<P: Into<PathBuf>, S: Into<String>>(admindir: P, dpkg_deb: S) -> Result<Self> {
        let admindir = admindir.into();
        let status_path = admindir.join("status");
        let text = fs::read_to_string(&status_path).map_err(|e| Error::Package {
            package: status_path.display().to_string(),
            detail: e.to_string(),
        })?;
        let status = parse_status(&text);
        debug!("dpkg status: {} package name(s)", status.len());
        Ok(Self {
            admindir,
            dpkg_deb: dpkg_deb.into(),
            status,
        })
    }

    fn info_dir(&self) -> PathBuf {
        self.admindir.join("info")
    }

    pub fn status_of(&self, name: &str) -> Option<&[StatusEntry]> {
        self.status.get(name).map(Vec::as_slice)
    }

    /// `.list` files that may belong to `name`, most specific first.
    fn list_candidates(&self, name: &str) -> Vec<PathBuf> {
        let info = self.info_dir();
        let mut out = vec![info.join(format!("{name}.list"))];
        match name.split_once(':') {
            Some((base, _arch)) => out.push(info.join(format!("{base}.list"))),
            None => {
                let prefix = format!("{name}:");
                if let Ok(rd) = fs::read_dir(&info) {
                    let mut arch_lists: Vec<PathBuf> = rd
                        .filter_map(|e| e.ok())
                        .map(|e| e.path())
                        .filter(|p| {
                            p.file_name()
                                .and_then(|f| f.to_str())
                                .map_or(false, |f| f.starts_with(&prefix) && f.ends_with(".list"))
                        })
                        .collect();
                    arch_lists.sort();
                    out.extend(arch_lists);
                }
            }
        }
        out
    }
}

fn read_list(path: &Path) -> std::io::Result<Vec<String>> {
    Ok(fs::read_to_string(path)?
        .lines()
        .map(str::to_string)
        .collect())
}

impl PackageSource for DpkgDatabase {
    fn lookup_installed(&self, name: &str) -> Result<Option<Vec<String>>> {
        for candidate in self.list_candidates(name) {
            if !candidate.is_file() {
                continue;
            }
            info!("Getting paths from installed package '{}'", name);
            let files = read_list(&candidate).map_err(|e| Error::Package {
                package: name.to_string(),
                detail: format!("read {}: {}", candidate.display(), e),
            })?;
            return Ok(Some(files));
        }
        debug!("No file list recorded for '{}'", name);
        Ok(None)
    }

    fn is_installed(&self, name: &str) -> Result<bool> {
        let (base, arch) = match name.split_once(':') {
            Some((b, a)) => (b, Some(a)),
            None => (name, None),
        };
        let entries = match self.status.get(base) {
            Some(e) => e,
            None => return Ok(false),
        };
        Ok(entries.iter().any(|e| {
            let arch_ok = match (arch, e.architecture.as_deref()) {
                (Some(want), Some(have)) => want == have || have == "all",
                _ => true,
            };
            arch_ok && e.has_current_version()
        }))
    }

    fn open_archive(&self, path: &Path) -> Result<Vec<String>> {
        let path_str = path.to_string_lossy();
        info!("Getting paths from .deb package '{}'", path_str);
        let args = ["--contents", &*path_str];
        let err = |detail| Error::Package {
            package: path_str.to_string(),
            detail,
        };
        let out = exec::run(&self.dpkg_deb, &args)
            .map_err(|e| err(spawn_failure_detail(&self.dpkg_deb, &args, &e)))?;
        if !out.success() {
            return Err(err(out.failure_detail()));
        }
        Ok(deb::parse_contents(&out.stdout))
    }
}
