//! APT pre-install hook protocol (`DPkg::Pre-Install-Pkgs`).
//!
//! - record.rs — one v2/v3 record line and its action
//! - reader.rs — version negotiation and the per-record directory stream

use std::fmt;

use crate::error::{Error, Result};

mod reader;
mod record;

pub use reader::HookReader;
pub use record::{Action, PackageRecord, CONFIGURE_TOKEN, NO_VERSION, REMOVE_TOKEN};

/// Marker on the first line of v2/v3 streams.
pub const VERSION_MARKER: &str = "VERSION";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProtocolVersion {
    V1,
    V2,
    V3,
}

impl ProtocolVersion {
    pub fn from_number(n: i64) -> Result<Self> {
        match n {
            1 => Ok(ProtocolVersion::V1),
            2 => Ok(ProtocolVersion::V2),
            3 => Ok(ProtocolVersion::V3),
            other => Err(Error::UnsupportedVersion(other)),
        }
    }

    pub fn number(self) -> u32 {
        match self {
            ProtocolVersion::V1 => 1,
            ProtocolVersion::V2 => 2,
            ProtocolVersion::V3 => 3,
        }
    }

    /// Fields per record line; v1 lines are bare archive paths.
    pub fn field_count(self) -> Option<usize> {
        match self {
            ProtocolVersion::V1 => None,
            ProtocolVersion::V2 => Some(5),
            ProtocolVersion::V3 => Some(9),
        }
    }

    /// Version announced by `line`, or `None` if it is not a version line.
    pub fn detect(line: &str) -> Result<Option<Self>> {
        let rest = match line.trim().strip_prefix(VERSION_MARKER) {
            Some(rest) => rest,
            None => return Ok(None),
        };
        // "VERSIONS..." or similar is not a marker
        if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
            return Ok(None);
        }
        let n: i64 = rest
            .trim()
            .parse()
            .map_err(|_| Error::MalformedVersion(line.trim().to_string()))?;
        Self::from_number(n).map(Some)
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.number())
    }
}
