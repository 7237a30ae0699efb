use std::io::BufRead;

use log::{debug, info, warn};

use super::record::{Action, PackageRecord};
use super::ProtocolVersion;
use crate::error::{Error, Result};
use crate::paths::{reduce_paths, DirectorySet};
use crate::pkg::PackageSource;

/// Streams the hook input one record at a time, yielding the leaf
/// directories each record touches. File lists are reduced as soon as they
/// are read and never held for the whole stream.
pub struct HookReader<'p, R: BufRead, P: PackageSource + ?Sized> {
    input: R,
    packages: &'p P,
    version: ProtocolVersion,
    /// v1 streams without a marker: the first line is already a record.
    pending: Option<String>,
    done: bool,
}

impl<'p, R: BufRead, P: PackageSource + ?Sized> HookReader<'p, R, P> {
    /// Negotiate the version and, for v2/v3, skip the configuration block.
    pub fn new(mut input: R, packages: &'p P) -> Result<Self> {
        let first = match read_line(&mut input)? {
            Some(line) => line,
            None => {
                return Ok(Self {
                    input,
                    packages,
                    version: ProtocolVersion::V1,
                    pending: None,
                    done: true,
                })
            }
        };
        debug!("Hook protocol line: '{}'", first);

        let (version, pending) = match ProtocolVersion::detect(&first)? {
            Some(v) => (v, None),
            None => (ProtocolVersion::V1, Some(first)),
        };
        info!("APT hook protocol {}", version);

        let mut reader = Self {
            input,
            packages,
            version,
            pending,
            done: false,
        };
        if version > ProtocolVersion::V1 {
            reader.skip_config_block()?;
        }
        Ok(reader)
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    fn skip_config_block(&mut self) -> Result<()> {
        let mut skipped = 0usize;
        while let Some(line) = read_line(&mut self.input)? {
            if line.is_empty() {
                debug!("Skipped {} configuration line(s)", skipped);
                return Ok(());
            }
            skipped += 1;
        }
        // EOF inside the config block: nothing to do
        self.done = true;
        Ok(())
    }

    fn next_line(&mut self) -> Result<Option<String>> {
        if let Some(line) = self.pending.take() {
            return Ok(Some(line));
        }
        let line = read_line(&mut self.input)?;
        if let Some(l) = &line {
            debug!("Hook protocol line: '{}'", l);
        }
        Ok(line)
    }

    fn directories_for(&self, line: &str) -> Result<DirectorySet> {
        let record = PackageRecord::parse(line, self.version)?;
        let mut dirs = DirectorySet::new();
        match &record.action {
            Action::Remove | Action::Configure => {
                let name = record.lookup_name();
                if self.packages.is_installed(&name)? {
                    if let Some(files) = self.packages.lookup_installed(&name)? {
                        dirs.merge(reduce_paths(files));
                    }
                } else {
                    debug!("'{}' is not installed; no files to protect", name);
                }
            }
            Action::Install(archive) => {
                dirs.merge(reduce_paths(self.packages.open_archive(archive)?));
                if record.is_upgrade() {
                    let name = record.lookup_name();
                    match self.packages.lookup_installed(&name)? {
                        Some(files) => dirs.merge(reduce_paths(files)),
                        None => warn!(
                            "Upgrade of '{}' from {} but no installed file list was found",
                            name, record.old_version
                        ),
                    }
                }
            }
        }
        Ok(dirs)
    }
}

impl<'p, R: BufRead, P: PackageSource + ?Sized> Iterator for HookReader<'p, R, P> {
    type Item = Result<DirectorySet>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let line = match self.next_line() {
            Ok(Some(line)) if !line.is_empty() => line,
            Ok(_) => {
                self.done = true;
                return None;
            }
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };
        let out = self.directories_for(&line);
        if out.is_err() {
            self.done = true;
        }
        Some(out)
    }
}

/// One line with the terminator and surrounding whitespace removed.
fn read_line<R: BufRead>(input: &mut R) -> Result<Option<String>> {
    let mut buf = String::new();
    if input.read_line(&mut buf).map_err(Error::Io)? == 0 {
        return Ok(None);
    }
    Ok(Some(buf.trim().to_string()))
}
