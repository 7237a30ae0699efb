//! Centralized configuration for the hook.
//!
//! Sources, lowest priority first:
//! - `HookConfig::default()`
//! - environment (`HookConfig::from_env()`)
//! - command line flags (applied by `cli` through the `with_*` setters)
//!
//! Env:
//! - ZFS_APT_SNAPSHOT_RETENTION_DAYS      (default 30)
//! - ZFS_APT_SNAPSHOT_IGNORE_AUTO_SNAPSHOT (0|1|true|false|on|off|yes|no)
//! - ZFS_APT_SNAPSHOT_ZFS_BIN             (default "zfs")
//! - ZFS_APT_SNAPSHOT_DPKG_DEB_BIN        (default "dpkg-deb")
//! - ZFS_APT_SNAPSHOT_DPKG_ADMINDIR       (default "/var/lib/dpkg")
//! - APT_HOOK_INFO_FD                     (set by APT; default 0 = stdin)

use std::fmt;
use std::path::PathBuf;

/// Dataset property holding the per-volume opt-out.
pub const AUTO_SNAPSHOT_PROPERTY: &str = "com.sun:auto-snapshot";

pub const DEFAULT_RETENTION_DAYS: u32 = 30;

#[derive(Clone, Debug)]
pub struct HookConfig {
    /// Skip datasets whose auto-snapshot property is false-like.
    pub respect_auto_snapshot: bool,

    pub verbose: bool,

    /// Print stale own snapshots to stdout.
    pub list_stale: bool,

    /// Destroy stale own snapshots.
    pub purge_stale: bool,

    /// Snapshots older than this many days are stale.
    pub retention_days: u32,

    /// Resolve and log everything, create/destroy nothing.
    pub dry_run: bool,

    pub zfs_bin: String,
    pub dpkg_deb_bin: String,
    pub dpkg_admindir: PathBuf,

    /// Descriptor APT writes the hook protocol to.
    pub info_fd: i32,

    /// Optional file to read the protocol from instead of `info_fd`.
    pub input: Option<PathBuf>,

    pub auto_snapshot_property: String,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            respect_auto_snapshot: true,
            verbose: false,
            list_stale: false,
            purge_stale: false,
            retention_days: DEFAULT_RETENTION_DAYS,
            dry_run: false,
            zfs_bin: "zfs".to_string(),
            dpkg_deb_bin: "dpkg-deb".to_string(),
            dpkg_admindir: PathBuf::from("/var/lib/dpkg"),
            info_fd: 0,
            input: None,
            auto_snapshot_property: AUTO_SNAPSHOT_PROPERTY.to_string(),
        }
    }
}

fn env_flag(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl HookConfig {
    /// Defaults overridden by whatever the environment sets. Unparseable
    /// values are ignored.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(v) = env_string("ZFS_APT_SNAPSHOT_RETENTION_DAYS") {
            if let Ok(n) = v.parse::<u32>() {
                cfg.retention_days = n;
            }
        }

        if let Some(v) = env_string("ZFS_APT_SNAPSHOT_IGNORE_AUTO_SNAPSHOT") {
            if let Some(ignore) = env_flag(&v) {
                cfg.respect_auto_snapshot = !ignore;
            }
        }

        if let Some(v) = env_string("ZFS_APT_SNAPSHOT_ZFS_BIN") {
            cfg.zfs_bin = v;
        }
        if let Some(v) = env_string("ZFS_APT_SNAPSHOT_DPKG_DEB_BIN") {
            cfg.dpkg_deb_bin = v;
        }
        if let Some(v) = env_string("ZFS_APT_SNAPSHOT_DPKG_ADMINDIR") {
            cfg.dpkg_admindir = PathBuf::from(v);
        }

        if let Some(v) = env_string("APT_HOOK_INFO_FD") {
            if let Ok(fd) = v.parse::<i32>() {
                cfg.info_fd = fd;
            }
        }

        cfg
    }

    /// Retention window as a duration.
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }

    /// Whether the run ends with the list/prune stage.
    pub fn wants_stale_scan(&self) -> bool {
        self.list_stale || self.purge_stale
    }

    // Fluent setters (builder-style)

    pub fn with_respect_auto_snapshot(mut self, on: bool) -> Self {
        self.respect_auto_snapshot = on;
        self
    }

    pub fn with_verbose(mut self, on: bool) -> Self {
        self.verbose = on;
        self
    }

    pub fn with_list_stale(mut self, on: bool) -> Self {
        self.list_stale = on;
        self
    }

    pub fn with_purge_stale(mut self, on: bool) -> Self {
        self.purge_stale = on;
        self
    }

    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }

    pub fn with_dry_run(mut self, on: bool) -> Self {
        self.dry_run = on;
        self
    }

    pub fn with_zfs_bin<S: Into<String>>(mut self, bin: S) -> Self {
        self.zfs_bin = bin.into();
        self
    }

    pub fn with_dpkg_admindir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.dpkg_admindir = dir.into();
        self
    }

    pub fn with_input<P: Into<PathBuf>>(mut self, input: Option<P>) -> Self {
        self.input = input.map(Into::into);
        self
    }
}

impl fmt::Display for HookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HookConfig {{ \
             respect_auto_snapshot: {}, \
             list_stale: {}, \
             purge_stale: {}, \
             retention_days: {}, \
             dry_run: {}, \
             zfs_bin: {}, \
             dpkg_admindir: {}, \
             input: {} \
             }}",
            self.respect_auto_snapshot,
            self.list_stale,
            self.purge_stale,
            self.retention_days,
            self.dry_run,
            self.zfs_bin,
            self.dpkg_admindir.display(),
            self.input
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| format!("fd {}", self.info_fd)),
        )
    }
}
