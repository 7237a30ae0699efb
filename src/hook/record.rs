use std::path::PathBuf;

use super::ProtocolVersion;
use crate::error::{Error, Result};

pub const REMOVE_TOKEN: &str = "**REMOVE**";
pub const CONFIGURE_TOKEN: &str = "**CONFIGURE**";
/// Placeholder for an absent version or architecture.
pub const NO_VERSION: &str = "-";

/// Last field of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Remove,
    Configure,
    /// Archive about to be unpacked.
    Install(PathBuf),
}

impl Action {
    fn parse(token: &str) -> Self {
        match token {
            REMOVE_TOKEN => Action::Remove,
            CONFIGURE_TOKEN => Action::Configure,
            path => Action::Install(PathBuf::from(path)),
        }
    }
}

/// One v2/v3 record:
///
/// ```text
/// v2: name old-ver direction new-ver action
/// v3: name old-ver old-arch old-multiarch direction new-ver new-arch new-multiarch action
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRecord {
    pub name: String,
    pub old_version: String,
    pub old_arch: Option<String>,
    pub new_version: String,
    pub action: Action,
}

impl PackageRecord {
    /// Split from the right so a name containing spaces stays in one field.
    /// A v1 line becomes a bare `Install` with no name or versions.
    pub fn parse(line: &str, version: ProtocolVersion) -> Result<Self> {
        let expected = match version.field_count() {
            Some(n) => n,
            None => {
                return Ok(Self {
                    name: String::new(),
                    old_version: NO_VERSION.to_string(),
                    old_arch: None,
                    new_version: NO_VERSION.to_string(),
                    action: Action::Install(PathBuf::from(line)),
                })
            }
        };
        let mut fields: Vec<&str> = line.rsplitn(expected, ' ').collect();
        if fields.len() < expected {
            return Err(Error::MalformedRecord {
                version: version.number(),
                expected,
                line: line.to_string(),
            });
        }
        fields.reverse();

        let (old_arch, new_version) = match version {
            ProtocolVersion::V3 => (Some(fields[2].to_string()), fields[5]),
            _ => (None, fields[3]),
        };
        Ok(Self {
            name: fields[0].to_string(),
            old_version: fields[1].to_string(),
            old_arch,
            new_version: new_version.to_string(),
            action: Action::parse(fields[expected - 1]),
        })
    }

    /// An older version is installed and is being replaced.
    pub fn is_upgrade(&self) -> bool {
        self.old_version != NO_VERSION
    }

    /// Name for the installed-package index, arch-qualified when known.
    pub fn lookup_name(&self) -> String {
        match self.old_arch.as_deref() {
            Some(arch) if arch != NO_VERSION && arch != "none" => format!("{}:{}", self.name, arch),
            _ => self.name.clone(),
        }
    }
}
