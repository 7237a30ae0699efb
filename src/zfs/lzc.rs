//! libzfs_core through `dlopen`.
//!
//! Only snapshot create and destroy are taken from the library; listing and
//! property reads have no stable lzc entry point and always go through the
//! command line. The nvlist helpers come from libnvpair.

use std::collections::BTreeMap;
use std::ffi::{c_char, c_int, c_uint, c_void, CString};
use std::io;
use std::ptr;

use anyhow::{anyhow, Context};
use libloading::Library;
use log::debug;

use super::ensure_snapshot_names;
use crate::error::{Error, Result};

const NVPAIR_CANDIDATES: &[&str] = &["libnvpair.so.3", "libnvpair.so.1", "libnvpair.so"];
const LZC_CANDIDATES: &[&str] = &["libzfs_core.so.3", "libzfs_core.so.1", "libzfs_core.so"];

/// nvlist_alloc flag: names are unique within the list.
const NV_UNIQUE_NAME: c_uint = 0x1;
/// boolean_t B_FALSE
const B_FALSE: c_int = 0;

type NvList = *mut c_void;

type NvlistAllocFn = unsafe extern "C" fn(*mut NvList, c_uint, c_int) -> c_int;
type NvlistAddBooleanFn = unsafe extern "C" fn(NvList, *const c_char) -> c_int;
type NvlistFreeFn = unsafe extern "C" fn(NvList);
type LzcInitFn = unsafe extern "C" fn() -> c_int;
type LzcSnapshotFn = unsafe extern "C" fn(NvList, NvList, *mut NvList) -> c_int;
type LzcDestroySnapsFn = unsafe extern "C" fn(NvList, c_int, *mut NvList) -> c_int;

pub struct LibZfsCore {
    // Keep both libraries mapped for as long as the fn pointers live.
    _nvpair: Library,
    _lzc: Library,
    nvlist_alloc: NvlistAllocFn,
    nvlist_add_boolean: NvlistAddBooleanFn,
    nvlist_free: NvlistFreeFn,
    lzc_snapshot: LzcSnapshotFn,
    lzc_destroy_snaps: LzcDestroySnapsFn,
}

fn open_first(candidates: &[&str]) -> anyhow::Result<Library> {
    let mut last = None;
    for name in candidates {
        // SAFETY: these are plain C libraries without load-time side effects
        // beyond their own initialisers.
        match unsafe { Library::new(name) } {
            Ok(lib) => {
                debug!("Loaded {name}");
                return Ok(lib);
            }
            Err(e) => last = Some(e),
        }
    }
    match last {
        Some(e) => Err(anyhow!(e)).with_context(|| format!("dlopen {}", candidates.join(" | "))),
        None => Err(anyhow!("no library candidates")),
    }
}

impl LibZfsCore {
    /// Load both libraries, resolve symbols and run `libzfs_core_init()`
    /// (which opens /dev/zfs).
    pub fn load() -> anyhow::Result<Self> {
        let nvpair = open_first(NVPAIR_CANDIDATES)?;
        let lzc = open_first(LZC_CANDIDATES)?;

        // SAFETY: signatures match the OpenZFS headers (libnvpair.h,
        // libzfs_core.h); the fn pointers are copied out while `nvpair` and
        // `lzc` are moved into the returned struct, which keeps them loaded.
        unsafe {
            let nvlist_alloc = *nvpair
                .get::<NvlistAllocFn>(b"nvlist_alloc\0")
                .context("resolve nvlist_alloc")?;
            let nvlist_add_boolean = *nvpair
                .get::<NvlistAddBooleanFn>(b"nvlist_add_boolean\0")
                .context("resolve nvlist_add_boolean")?;
            let nvlist_free = *nvpair
                .get::<NvlistFreeFn>(b"nvlist_free\0")
                .context("resolve nvlist_free")?;
            let init = *lzc
                .get::<LzcInitFn>(b"libzfs_core_init\0")
                .context("resolve libzfs_core_init")?;
            let lzc_snapshot = *lzc
                .get::<LzcSnapshotFn>(b"lzc_snapshot\0")
                .context("resolve lzc_snapshot")?;
            let lzc_destroy_snaps = *lzc
                .get::<LzcDestroySnapsFn>(b"lzc_destroy_snaps\0")
                .context("resolve lzc_destroy_snaps")?;

            let rc = init();
            if rc != 0 {
                return Err(anyhow!(io::Error::from_raw_os_error(rc)))
                    .context("libzfs_core_init");
            }

            Ok(Self {
                _nvpair: nvpair,
                _lzc: lzc,
                nvlist_alloc,
                nvlist_add_boolean,
                nvlist_free,
                lzc_snapshot,
                lzc_destroy_snaps,
            })
        }
    }

    /// Boolean-valued nvlist keyed by `names`, as the lzc calls expect.
    fn name_list(&self, names: &[&str]) -> std::result::Result<OwnedNvList<'_>, String> {
        let mut raw: NvList = ptr::null_mut();
        // SAFETY: out-pointer to a local; freed by OwnedNvList on drop.
        let rc = unsafe { (self.nvlist_alloc)(&mut raw, NV_UNIQUE_NAME, 0) };
        if rc != 0 || raw.is_null() {
            return Err(format!("nvlist_alloc: {}", io::Error::from_raw_os_error(rc)));
        }
        let list = OwnedNvList { raw, lib: self };
        for name in names {
            let c = CString::new(*name).map_err(|_| format!("'{name}' contains a NUL byte"))?;
            // SAFETY: `list.raw` is a live nvlist, `c` outlives the call.
            let rc = unsafe { (self.nvlist_add_boolean)(list.raw, c.as_ptr()) };
            if rc != 0 {
                return Err(format!("nvlist_add_boolean: {}", io::Error::from_raw_os_error(rc)));
            }
        }
        Ok(list)
    }

    fn free_errlist(&self, errlist: NvList) {
        if !errlist.is_null() {
            // SAFETY: allocated by libzfs_core for the caller to free.
            unsafe { (self.nvlist_free)(errlist) };
        }
    }

    pub fn create_snapshot(&self, name: &str) -> Result<()> {
        let snaps = self.name_list(&[name]).map_err(|detail| Error::SnapshotCreation {
            name: name.to_string(),
            detail,
        })?;
        let mut errlist: NvList = ptr::null_mut();
        debug!("lzc_snapshot({name})");
        // SAFETY: `snaps` is a valid nvlist; props may be NULL.
        let rc = unsafe { (self.lzc_snapshot)(snaps.raw, ptr::null_mut(), &mut errlist) };
        self.free_errlist(errlist);
        match rc {
            0 => Ok(()),
            rc => {
                let err = io::Error::from_raw_os_error(rc);
                if err.kind() == io::ErrorKind::AlreadyExists {
                    Err(Error::SnapshotExists(name.to_string()))
                } else {
                    Err(Error::SnapshotCreation {
                        name: name.to_string(),
                        detail: format!("lzc_snapshot({name}): {err}"),
                    })
                }
            }
        }
    }

    /// lzc_destroy_snaps takes one pool per call, so names are grouped.
    pub fn destroy_snapshots(&self, names: &[String]) -> Result<()> {
        ensure_snapshot_names(names)?;
        let mut by_pool: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for n in names {
            let pool = n.split(['/', '@']).next().unwrap_or(n.as_str());
            by_pool.entry(pool).or_default().push(n.as_str());
        }
        for (pool, snaps) in by_pool {
            let joined = snaps.join(",");
            let list = self.name_list(&snaps).map_err(|detail| Error::SnapshotDestroy {
                name: joined.clone(),
                detail,
            })?;
            let mut errlist: NvList = ptr::null_mut();
            debug!("lzc_destroy_snaps({pool}: {joined})");
            // SAFETY: `list` is a valid nvlist of snapshot names.
            let rc = unsafe { (self.lzc_destroy_snaps)(list.raw, B_FALSE, &mut errlist) };
            self.free_errlist(errlist);
            if rc != 0 {
                return Err(Error::SnapshotDestroy {
                    name: joined,
                    detail: format!("lzc_destroy_snaps: {}", io::Error::from_raw_os_error(rc)),
                });
            }
        }
        Ok(())
    }
}

struct OwnedNvList<'a> {
    raw: NvList,
    lib: &'a LibZfsCore,
}

impl Drop for OwnedNvList<'_> {
    fn drop(&mut self) {
        // SAFETY: allocated by nvlist_alloc and not freed elsewhere.
        unsafe { (self.lib.nvlist_free)(self.raw) };
    }
}
