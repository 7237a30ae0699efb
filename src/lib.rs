//! zfs-apt-snapshot: snapshot the ZFS datasets an APT run is about to modify.
//!
//! Pipeline: hook protocol -> package file lists -> leaf directories ->
//! owning volumes -> auto-snapshot policy -> `zfs snapshot` -> optional prune.

// Ambient layers
pub mod error;
pub mod config;
pub mod exec;

// Path handling and volume resolution
pub mod paths;   // leaf-directory reduction
pub mod mounts;  // src/mounts/{mod,table,alias}.rs
pub mod resolve; // mount-table and `zfs list` resolvers

// Collaborators
pub mod pkg;     // src/pkg/{mod,dpkg,deb}.rs
pub mod zfs;     // src/zfs/{mod,cli,lzc}.rs

// Protocol, naming, orchestration
pub mod hook;    // src/hook/{mod,record,reader}.rs
pub mod snapname;
pub mod pipeline;
pub mod cli;

// Convenience re-exports
pub use config::HookConfig;
pub use error::{Error, Result};
pub use hook::{HookReader, PackageRecord, ProtocolVersion};
pub use mounts::{AliasTable, MountEntry, MountTable};
pub use paths::{reduce_paths, DirectorySet};
pub use pipeline::{Pipeline, RunReport};
pub use pkg::PackageSource;
pub use resolve::{MountTableResolver, VolumeResolver, VolumeSet, ZfsListResolver};
pub use zfs::{Properties, PropertyValue, ZfsEngine};
