//! System state readers used by the mount-table resolver:
//! - table.rs — `/proc/self/mounts` parsing and longest-mountpoint lookup
//! - alias.rs — `/dev/zvol` walk mapping device nodes to zvol names
//!
//! Both are point-in-time reads; mounts changing mid-run are not guarded.

mod alias;
mod table;

pub use alias::{AliasTable, ZVOL_ROOT};
pub use table::{MountEntry, MountTable, PROC_MOUNTS, ZFS_FSTYPE};
