use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::os::unix::io::FromRawFd;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use log::{debug, info};

use crate::config::HookConfig;
use crate::pipeline::Pipeline;
use crate::pkg::DpkgDatabase;
use crate::resolve;
use crate::zfs::ProbedEngine;

#[derive(Parser, Debug)]
#[command(
    name = "zfs-apt-snapshot",
    version,
    about = "Snapshot the ZFS datasets an APT run is about to modify"
)]
pub struct Cli {
    /// Snapshot datasets even when com.sun:auto-snapshot=false
    #[arg(long)]
    pub ignore_auto_snapshot: bool,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Print own snapshots older than the retention window
    #[arg(long)]
    pub list_stale: bool,

    /// Destroy own snapshots older than the retention window
    #[arg(long)]
    pub purge_stale: bool,

    /// Retention window in days [default: 30, or ZFS_APT_SNAPSHOT_RETENTION_DAYS]
    #[arg(long, value_name = "DAYS")]
    pub retention_days: Option<u32>,

    /// Read the hook protocol from FILE instead of APT_HOOK_INFO_FD/stdin
    #[arg(long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Resolve everything, create and destroy nothing
    #[arg(long)]
    pub dry_run: bool,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// Environment first, flags on top. Flags only override when given.
    pub fn config(&self) -> HookConfig {
        let mut cfg = HookConfig::from_env()
            .with_verbose(self.verbose)
            .with_list_stale(self.list_stale)
            .with_purge_stale(self.purge_stale)
            .with_dry_run(self.dry_run)
            .with_input(self.input.clone());
        if self.ignore_auto_snapshot {
            cfg = cfg.with_respect_auto_snapshot(false);
        }
        if let Some(days) = self.retention_days {
            cfg = cfg.with_retention_days(days);
        }
        cfg
    }
}

fn open_input(cfg: &HookConfig) -> Result<Box<dyn BufRead>> {
    if let Some(path) = &cfg.input {
        let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
        return Ok(Box::new(BufReader::new(f)));
    }
    if cfg.info_fd == 0 {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    if cfg.info_fd < 0 {
        bail!("invalid APT_HOOK_INFO_FD {}", cfg.info_fd);
    }
    debug!("Reading hook protocol from fd {}", cfg.info_fd);
    // APT hands the descriptor over for the lifetime of the hook process
    let f = unsafe { File::from_raw_fd(cfg.info_fd) };
    Ok(Box::new(BufReader::new(f)))
}

pub fn run(cli: Cli) -> Result<()> {
    let cfg = cli.config();
    debug!("{}", cfg);

    let engine = ProbedEngine::probe(&cfg);
    let resolver = resolve::probe(engine.cli());
    let packages = DpkgDatabase::open(&cfg.dpkg_admindir, cfg.dpkg_deb_bin.clone())
        .with_context(|| format!("open dpkg database {}", cfg.dpkg_admindir.display()))?;

    let input = open_input(&cfg)?;
    let report = Pipeline::new(&cfg, &packages, resolver.as_ref(), &engine).run(input, Utc::now())?;

    if cfg.list_stale {
        for snap in &report.stale {
            println!("{}", snap.name);
        }
    }
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    info!(
        "Done: {} created, {} planned, {} already present, {} excluded, {} destroyed",
        report.created.len(),
        report.planned.len(),
        report.existing.len(),
        report.excluded.len(),
        report.destroyed.len()
    );
    Ok(())
}
