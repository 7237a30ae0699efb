use log::debug;

use super::{ensure_snapshot_names, Properties, PropertyValue, ZfsEngine};
use crate::error::{Error, Result};
use crate::exec::{self, spawn_failure_detail, CommandOutput};

/// `zfs` stderr fragment for an existing snapshot.
const EXISTS_MARKER: &str = "dataset already exists";

/// The `zfs` command line tool.
#[derive(Debug, Clone)]
pub struct ZfsCli {
    bin: String,
}

impl ZfsCli {
    pub fn new<S: Into<String>>(bin: S) -> Self {
        Self { bin: bin.into() }
    }

    fn run(&self, args: &[&str]) -> std::result::Result<CommandOutput, String> {
        exec::run(&self.bin, args).map_err(|e| spawn_failure_detail(&self.bin, args, &e))
    }

    /// `zfs list -H -t <kind> -o name <targets...>`.
    fn list(&self, kind: &str, extra: &[&str], targets: &[&str]) -> std::result::Result<Vec<String>, String> {
        let mut args = vec!["list", "-H", "-t", kind, "-o", "name"];
        args.extend_from_slice(extra);
        args.extend_from_slice(targets);
        let out = self.run(&args)?;
        if !out.success() {
            return Err(out.failure_detail());
        }
        Ok(out.stdout_lines().map(str::to_string).collect())
    }

    /// Filesystem datasets containing `path`. Fails for paths that do not
    /// exist yet or are not on ZFS.
    pub fn filesystems_for(&self, path: &str) -> Result<Vec<String>> {
        self.list("filesystem", &[], &[path])
            .map_err(|detail| Error::VolumeList {
                target: path.to_string(),
                detail,
            })
    }
}

/// `zfs get -H -p -o property,value all` output -> property map.
pub(crate) fn parse_properties(stdout: &str) -> Properties {
    let mut props = Properties::new();
    for line in stdout.lines() {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            continue;
        }
        let (name, value) = match line.split_once('\t') {
            Some(kv) => kv,
            None => (line, ""),
        };
        props.insert(name.trim().to_string(), PropertyValue::parse(value.trim()));
    }
    props
}

impl ZfsEngine for ZfsCli {
    fn create_snapshot(&self, name: &str) -> Result<()> {
        let out = self
            .run(&["snapshot", name])
            .map_err(|detail| Error::SnapshotCreation {
                name: name.to_string(),
                detail,
            })?;
        if out.success() {
            return Ok(());
        }
        if out.stderr.contains(EXISTS_MARKER) || out.stdout.contains(EXISTS_MARKER) {
            return Err(Error::SnapshotExists(name.to_string()));
        }
        Err(Error::SnapshotCreation {
            name: name.to_string(),
            detail: out.failure_detail(),
        })
    }

    fn list_snapshots(&self, volume: Option<&str>) -> Result<Vec<String>> {
        let names = match volume {
            Some(v) => self.list("snapshot", &["-d", "1"], &[v]),
            None => self.list("snapshot", &[], &[]),
        };
        names.map_err(|detail| Error::VolumeList {
            target: volume.unwrap_or("(all pools)").to_string(),
            detail,
        })
    }

    fn get_properties(&self, volume: &str) -> Result<Properties> {
        let args = ["get", "-o", "property,value", "-p", "-H", "all", volume];
        let err = |detail| Error::PropertyRead {
            volume: volume.to_string(),
            detail,
        };
        let out = self.run(&args).map_err(err)?;
        if !out.success() {
            return Err(err(out.failure_detail()));
        }
        let props = parse_properties(&out.stdout);
        debug!("{} propert(ies) read for {}", props.len(), volume);
        Ok(props)
    }

    fn destroy_snapshots(&self, names: &[String]) -> Result<()> {
        ensure_snapshot_names(names)?;
        for name in names {
            let out = self
                .run(&["destroy", name])
                .map_err(|detail| Error::SnapshotDestroy {
                    name: name.clone(),
                    detail,
                })?;
            if !out.success() {
                return Err(Error::SnapshotDestroy {
                    name: name.clone(),
                    detail: out.failure_detail(),
                });
            }
        }
        Ok(())
    }
}
