mod common;

use std::path::PathBuf;

use anyhow::Result;
use chrono::{Duration, TimeZone, Utc};

use common::{two_pool_resolver, FakeEngine, FakePackages};
use zfs_apt_snapshot::config::AUTO_SNAPSHOT_PROPERTY;
use zfs_apt_snapshot::snapname::name_for;
use zfs_apt_snapshot::{HookConfig, Pipeline};

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 30, 15).unwrap()
}

fn two_archives() -> FakePackages {
    FakePackages::new()
        .archive("/tmp/pkg-a.deb", &["/usr/bin/foo", "/usr/bin/"])
        .archive("/tmp/pkg-b.deb", &["/usr/bin/bar"])
}

const TWO_ARCHIVES: &str = "VERSION 1\n/tmp/pkg-a.deb\n/tmp/pkg-b.deb\n\n";

#[test]
fn two_packages_on_one_volume_give_one_snapshot() -> Result<()> {
    let cfg = HookConfig::default();
    let pkgs = two_archives();
    let resolver = two_pool_resolver();
    let engine = FakeEngine::new();

    let report = Pipeline::new(&cfg, &pkgs, &resolver, &engine).run(TWO_ARCHIVES.as_bytes(), now())?;

    assert_eq!(report.volumes, vec!["tank/usr".to_string()]);
    assert_eq!(
        *engine.create_calls.borrow(),
        vec!["tank/usr@zfs-apt-snap_2024-06-01-123015".to_string()]
    );
    assert_eq!(report.created, *engine.create_calls.borrow());
    assert_eq!(
        report.directories,
        vec![PathBuf::from("/usr/bin/bar"), PathBuf::from("/usr/bin/foo")]
    );
    Ok(())
}

#[test]
fn shared_directory_appears_once_after_merge() -> Result<()> {
    let cfg = HookConfig::default();
    let pkgs = FakePackages::new()
        .archive("/tmp/a.deb", &["./", "./usr/", "./usr/bin/"])
        .archive("/tmp/b.deb", &["./", "./usr/", "./usr/bin/"]);
    let resolver = two_pool_resolver();
    let engine = FakeEngine::new();
    let p = Pipeline::new(&cfg, &pkgs, &resolver, &engine);

    let dirs = p.collect_directories("/tmp/a.deb\n/tmp/b.deb\n".as_bytes())?;
    assert_eq!(dirs.iter().collect::<Vec<_>>(), vec![&PathBuf::from("/usr/bin")]);
    Ok(())
}

#[test]
fn auto_snapshot_false_is_respected_unless_ignored() -> Result<()> {
    let input = "VERSION 1\n/tmp/mix.deb\n\n";
    let pkgs = FakePackages::new().archive("/tmp/mix.deb", &["/usr/lib/x.so", "/etc/x.conf"]);
    let resolver = two_pool_resolver();

    let engine = FakeEngine::new().with_property("tank/usr", AUTO_SNAPSHOT_PROPERTY, "false");
    let cfg = HookConfig::default();
    let report = Pipeline::new(&cfg, &pkgs, &resolver, &engine).run(input.as_bytes(), now())?;
    assert_eq!(report.excluded, vec!["tank/usr".to_string()]);
    assert_eq!(
        *engine.create_calls.borrow(),
        vec![name_for("rpool/ROOT/debian", now())]
    );

    let engine = FakeEngine::new().with_property("tank/usr", AUTO_SNAPSHOT_PROPERTY, "false");
    let cfg = HookConfig::default().with_respect_auto_snapshot(false);
    let report = Pipeline::new(&cfg, &pkgs, &resolver, &engine).run(input.as_bytes(), now())?;
    assert!(report.excluded.is_empty());
    assert_eq!(engine.create_calls.borrow().len(), 2);
    Ok(())
}

#[test]
fn non_boolean_property_value_does_not_exclude() -> Result<()> {
    let pkgs = FakePackages::new().archive("/tmp/a.deb", &["/usr/bin/a"]);
    let resolver = two_pool_resolver();
    let engine = FakeEngine::new().with_property("tank/usr", AUTO_SNAPSHOT_PROPERTY, "0");
    let cfg = HookConfig::default();
    let report = Pipeline::new(&cfg, &pkgs, &resolver, &engine).run("/tmp/a.deb\n".as_bytes(), now())?;
    assert_eq!(report.created.len(), 1);
    Ok(())
}

#[test]
fn stale_listing_and_pruning_use_the_retention_window() -> Result<()> {
    let old = name_for("tank/usr", now() - Duration::days(40));
    let mid = name_for("tank/usr", now() - Duration::days(20));
    let new = name_for("rpool/ROOT/debian", now() - Duration::days(5));
    let engine = FakeEngine::new()
        .with_snapshot(&old)
        .with_snapshot(&mid)
        .with_snapshot(&new)
        .with_snapshot("tank/usr@manual-2020");
    let pkgs = FakePackages::new();
    let resolver = two_pool_resolver();

    let cfg = HookConfig::default().with_list_stale(true);
    let report = Pipeline::new(&cfg, &pkgs, &resolver, &engine).run("VERSION 2\n\n\n".as_bytes(), now())?;
    let stale: Vec<&str> = report.stale.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(stale, vec![old.as_str()]);
    assert!(engine.destroyed.borrow().is_empty());

    let cfg = HookConfig::default().with_purge_stale(true);
    let report = Pipeline::new(&cfg, &pkgs, &resolver, &engine).run("VERSION 2\n\n\n".as_bytes(), now())?;
    assert_eq!(report.destroyed, vec![old.clone()]);
    assert_eq!(*engine.destroyed.borrow(), vec![old]);
    assert_eq!(engine.snapshots.borrow().len(), 3);
    Ok(())
}

#[test]
fn own_snapshot_with_bad_timestamp_aborts_the_prune() -> Result<()> {
    let engine = FakeEngine::new()
        .with_snapshot("tank/usr@zfs-apt-snap_someday")
        .with_snapshot(&name_for("tank/usr", now() - Duration::days(90)));
    let pkgs = FakePackages::new();
    let resolver = two_pool_resolver();
    let cfg = HookConfig::default().with_purge_stale(true);

    let res = Pipeline::new(&cfg, &pkgs, &resolver, &engine).run("VERSION 2\n\n\n".as_bytes(), now());
    assert!(res.is_err());
    assert!(engine.destroyed.borrow().is_empty());
    Ok(())
}

#[test]
fn existing_snapshot_is_not_fatal() -> Result<()> {
    let engine = FakeEngine::new().with_snapshot(&name_for("tank/usr", now()));
    let pkgs = two_archives();
    let resolver = two_pool_resolver();
    let cfg = HookConfig::default();

    let report = Pipeline::new(&cfg, &pkgs, &resolver, &engine).run(TWO_ARCHIVES.as_bytes(), now())?;
    assert!(report.created.is_empty());
    assert_eq!(report.existing, vec![name_for("tank/usr", now())]);
    Ok(())
}

#[test]
fn creation_failure_still_attempts_remaining_volumes() -> Result<()> {
    let pkgs = FakePackages::new().archive("/tmp/a.deb", &["/etc/a", "/usr/share/a"]);
    let resolver = two_pool_resolver();
    let engine = FakeEngine::new().with_broken("rpool/ROOT/debian");
    let cfg = HookConfig::default().with_purge_stale(true);

    let res = Pipeline::new(&cfg, &pkgs, &resolver, &engine).run("/tmp/a.deb\n".as_bytes(), now());
    let err = res.expect_err("broken volume must fail the run");
    assert!(format!("{err:#}").contains("rpool/ROOT/debian@"));
    assert_eq!(engine.create_calls.borrow().len(), 2);
    // the healthy volume keeps its snapshot
    assert_eq!(*engine.snapshots.borrow(), vec![name_for("tank/usr", now())]);
    Ok(())
}

#[test]
fn dry_run_touches_nothing() -> Result<()> {
    let old = name_for("tank/usr", now() - Duration::days(400));
    let engine = FakeEngine::new().with_snapshot(&old);
    let pkgs = two_archives();
    let resolver = two_pool_resolver();
    let cfg = HookConfig::default().with_dry_run(true).with_purge_stale(true);

    let report = Pipeline::new(&cfg, &pkgs, &resolver, &engine).run(TWO_ARCHIVES.as_bytes(), now())?;
    assert!(engine.create_calls.borrow().is_empty());
    assert!(engine.destroyed.borrow().is_empty());
    assert!(report.created.is_empty());
    assert_eq!(report.planned, vec![name_for("tank/usr", now())]);
    assert_eq!(report.stale.len(), 1);
    assert!(report.destroyed.is_empty());
    Ok(())
}

#[test]
fn report_serialises_to_json() -> Result<()> {
    let pkgs = two_archives();
    let resolver = two_pool_resolver();
    let engine = FakeEngine::new();
    let cfg = HookConfig::default();
    let report = Pipeline::new(&cfg, &pkgs, &resolver, &engine).run(TWO_ARCHIVES.as_bytes(), now())?;

    let v: serde_json::Value = serde_json::to_value(&report)?;
    assert_eq!(v["volumes"][0], "tank/usr");
    assert_eq!(v["dry_run"], false);
    assert_eq!(v["planned"].as_array().map(Vec::len), Some(0));
    assert!(v["created"][0].as_str().unwrap_or_default().starts_with("tank/usr@zfs-apt-snap_"));
    Ok(())
}

#[test]
fn unsupported_protocol_version_fails() {
    let pkgs = FakePackages::new();
    let resolver = two_pool_resolver();
    let engine = FakeEngine::new();
    let cfg = HookConfig::default();
    let err = Pipeline::new(&cfg, &pkgs, &resolver, &engine)
        .run("VERSION 7\n\n".as_bytes(), now())
        .unwrap_err();
    assert!(format!("{err:#}").contains("(7)"));
    assert!(engine.create_calls.borrow().is_empty());
}
