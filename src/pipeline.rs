//! Orchestrator: hook protocol -> directories -> volumes -> policy filter ->
//! snapshots -> (optional) stale scan and prune.
//!
//! Stages run strictly in order. A stage failure aborts the run; snapshots
//! created before the failure stay in place. Collaborators come in as trait
//! objects so tests can drive the whole run in memory.

use std::io::BufRead;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;

use crate::config::HookConfig;
use crate::hook::HookReader;
use crate::paths::DirectorySet;
use crate::pkg::PackageSource;
use crate::resolve::{resolve_all, VolumeResolver, VolumeSet};
use crate::snapname::{self, OwnSnapshot};
use crate::zfs::{PropertyValue, ZfsEngine};

/// What a run did, stage by stage.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub timestamp: Option<DateTime<Utc>>,
    pub dry_run: bool,
    pub directories: Vec<PathBuf>,
    pub volumes: Vec<String>,
    /// Opted out through the auto-snapshot property.
    pub excluded: Vec<String>,
    pub created: Vec<String>,
    /// Dry run only: snapshots that would have been created.
    pub planned: Vec<String>,
    /// Already present (re-run within the same second).
    pub existing: Vec<String>,
    pub failed: Vec<String>,
    pub stale: Vec<OwnSnapshot>,
    pub destroyed: Vec<String>,
}

pub struct Pipeline<'a> {
    cfg: &'a HookConfig,
    packages: &'a dyn PackageSource,
    resolver: &'a dyn VolumeResolver,
    engine: &'a dyn ZfsEngine,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        cfg: &'a HookConfig,
        packages: &'a dyn PackageSource,
        resolver: &'a dyn VolumeResolver,
        engine: &'a dyn ZfsEngine,
    ) -> Self {
        Self {
            cfg,
            packages,
            resolver,
            engine,
        }
    }

    /// Full run. Every snapshot created shares the timestamp `now`.
    pub fn run<R: BufRead>(&self, input: R, now: DateTime<Utc>) -> Result<RunReport> {
        let now = snapname::truncate_to_format(now);
        let mut report = RunReport {
            timestamp: Some(now),
            dry_run: self.cfg.dry_run,
            ..RunReport::default()
        };

        let dirs = self.collect_directories(input)?;
        report.directories = dirs.iter().cloned().collect();

        let volumes = self.resolve_volumes(&dirs)?;
        report.volumes = volumes.iter().cloned().collect();

        let (included, excluded) = self.filter_by_policy(&volumes)?;
        report.excluded = excluded;

        self.create_snapshots(&included, now, &mut report)?;

        if self.cfg.wants_stale_scan() {
            report.stale = self.find_stale(now)?;
            if self.cfg.purge_stale {
                report.destroyed = self.prune(&report.stale)?;
            }
        }
        Ok(report)
    }

    /// Parse the protocol stream and merge every record's directories.
    pub fn collect_directories<R: BufRead>(&self, input: R) -> Result<DirectorySet> {
        let reader = HookReader::new(input, self.packages).context("reading APT hook protocol")?;
        let mut dirs = DirectorySet::new();
        for (i, record) in reader.enumerate() {
            let record = record.with_context(|| format!("hook record #{}", i + 1))?;
            debug!("record #{}: {} director(ies)", i + 1, record.len());
            dirs.merge(record);
        }
        info!("{} leaf director(ies) affected", dirs.len());
        Ok(dirs)
    }

    pub fn resolve_volumes(&self, dirs: &DirectorySet) -> Result<VolumeSet> {
        resolve_all(self.resolver, dirs).context("resolving directories to ZFS volumes")
    }

    /// Split into (to snapshot, opted out).
    pub fn filter_by_policy(&self, volumes: &VolumeSet) -> Result<(Vec<String>, Vec<String>)> {
        if !self.cfg.respect_auto_snapshot {
            debug!("Ignoring {}", self.cfg.auto_snapshot_property);
            return Ok((volumes.iter().cloned().collect(), Vec::new()));
        }
        let mut included = Vec::new();
        let mut excluded = Vec::new();
        for volume in volumes {
            let props = self
                .engine
                .get_properties(volume)
                .with_context(|| format!("policy check for {}", volume))?;
            match props.get(&self.cfg.auto_snapshot_property) {
                Some(PropertyValue::Bool(false)) => {
                    info!(
                        "Skipping {}: {} is false",
                        volume, self.cfg.auto_snapshot_property
                    );
                    excluded.push(volume.clone());
                }
                _ => included.push(volume.clone()),
            }
        }
        Ok((included, excluded))
    }

    /// Attempt every volume; fail afterwards if any attempt failed.
    pub fn create_snapshots(
        &self,
        volumes: &[String],
        now: DateTime<Utc>,
        report: &mut RunReport,
    ) -> Result<()> {
        if volumes.is_empty() {
            info!("Nothing to snapshot");
            return Ok(());
        }
        for volume in volumes {
            let name = snapname::name_for(volume, now);
            if self.cfg.dry_run {
                info!("Would create snapshot {}", name);
                report.planned.push(name);
                continue;
            }
            info!("Creating snapshot {}", name);
            match self.engine.create_snapshot(&name) {
                Ok(()) => report.created.push(name),
                Err(e) if e.is_snapshot_exists() => {
                    warn!("Snapshot {} already exists", name);
                    report.existing.push(name);
                }
                Err(e) => {
                    error!("{}", e);
                    report.failed.push(name);
                }
            }
        }
        if !report.failed.is_empty() {
            return Err(anyhow!(
                "failed to create {} of {} snapshot(s): {}",
                report.failed.len(),
                volumes.len(),
                report.failed.join(", ")
            ));
        }
        Ok(())
    }

    /// Own snapshots across all pools older than the retention window.
    pub fn find_stale(&self, now: DateTime<Utc>) -> Result<Vec<OwnSnapshot>> {
        let retention = self.cfg.retention();
        let mut stale = Vec::new();
        for name in self.engine.list_snapshots(None).context("listing snapshots")? {
            let own = match OwnSnapshot::recognise(&name)? {
                Some(own) => own,
                None => continue,
            };
            if snapname::is_stale(own.created, now, retention) {
                debug!("{} is stale (created {})", own.name, own.created);
                stale.push(own);
            }
        }
        info!(
            "{} snapshot(s) older than {} day(s)",
            stale.len(),
            self.cfg.retention_days
        );
        Ok(stale)
    }

    /// Destroy the given snapshots, returning the names destroyed.
    pub fn prune(&self, stale: &[OwnSnapshot]) -> Result<Vec<String>> {
        let names: Vec<String> = stale.iter().map(|s| s.name.clone()).collect();
        if names.is_empty() {
            return Ok(names);
        }
        if self.cfg.dry_run {
            for n in &names {
                info!("Would destroy snapshot {}", n);
            }
            return Ok(Vec::new());
        }
        for n in &names {
            info!("Destroying snapshot {}", n);
        }
        self.engine
            .destroy_snapshots(&names)
            .context("pruning stale snapshots")?;
        Ok(names)
    }
}
