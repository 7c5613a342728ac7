//! Crash dump inventory.
//!
//! The capture service saves each crash under `<crash dir>/<YYYYMMDDhhmm>/`
//! as `dump.<name>` plus `dmesg.<name>`. We only ever enumerate and delete
//! those directories. Entries that don't look like a finished kdump are
//! skipped silently.
//!
//! Dumps are ordered newest first. Index `i >= 0` addresses the `i`-th
//! newest dump and `i < 0` addresses `N + i`, so `-1` is the oldest. An index
//! is only meaningful against the listing taken by the same call.

use crate::error::{KdumpError, Result};
use kdump_common::status::timestamp_from_name;
use kdump_common::{CrashDmesg, CrashDumpEntry};
use std::collections::BTreeSet;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Prefix file(1) prints for makedumpfile output
const FILE_KDUMP_PREFIX: &str = "Kdump compressed dump";

/// Header signature of a kdump-compressed file
const KDUMP_SIGNATURE: &[u8; 8] = b"KDUMP   ";

/// Decides whether a file is a compressed kernel dump
pub trait DumpSniffer: Send + Sync {
    fn is_kdump(&self, path: &Path) -> bool;
}

/// Sniffer asking file(1)
#[derive(Debug, Clone)]
pub struct FileCommand {
    program: PathBuf,
}

impl FileCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl DumpSniffer for FileCommand {
    fn is_kdump(&self, path: &Path) -> bool {
        match Command::new(&self.program).arg("--brief").arg(path).output() {
            Ok(out) if out.status.success() => out.stdout.starts_with(FILE_KDUMP_PREFIX.as_bytes()),
            Ok(out) => {
                debug!("{} {} exited with {}", self.program.display(), path.display(), out.status);
                false
            }
            Err(e) => {
                debug!("Cannot run {}: {}", self.program.display(), e);
                false
            }
        }
    }
}

/// Sniffer reading the kdump header directly
#[derive(Debug, Clone, Default)]
pub struct KdumpSignature;

impl DumpSniffer for KdumpSignature {
    fn is_kdump(&self, path: &Path) -> bool {
        let mut header = [0u8; 8];
        fs::File::open(path)
            .and_then(|mut f| f.read_exact(&mut header))
            .map(|_| &header == KDUMP_SIGNATURE)
            .unwrap_or(false)
    }
}

/// One crash dump found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashDump {
    /// Boot timestamp `YYYYMMDDhhmm`
    pub name: String,
    pub size: u64,
    /// Dump directory
    pub path: PathBuf,
}

impl CrashDump {
    pub fn dmesg_file(&self) -> PathBuf {
        self.path.join(format!("dmesg.{}", self.name))
    }
}

/// Whether `name` is a plausible `YYYYMMDDhhmm` boot timestamp
pub fn is_dump_name(name: &str) -> bool {
    if name.len() != 12 || !name.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let field = |range: std::ops::Range<usize>| name[range].parse::<u32>().unwrap_or(u32::MAX);
    field(0..4) >= 1970 && field(4..6) <= 12 && field(6..8) <= 31
}

/// Map a caller index onto a position in a listing of `count` dumps
pub fn resolve_index(index: i32, count: usize) -> Result<usize> {
    let n = count as i64;
    let i = index as i64;
    if i >= n || i < -n {
        return Err(KdumpError::Range {
            index,
            min: -n,
            max: n - 1,
        });
    }
    Ok(if i < 0 { (n + i) as usize } else { i as usize })
}

/// Crash dumps under one directory
#[derive(Clone)]
pub struct Inventory {
    crash_dir: PathBuf,
    sniffer: Arc<dyn DumpSniffer>,
}

impl Inventory {
    pub fn new(crash_dir: impl Into<PathBuf>, sniffer: Arc<dyn DumpSniffer>) -> Self {
        Self {
            crash_dir: crash_dir.into(),
            sniffer,
        }
    }

    fn dump_file(&self, name: &str) -> PathBuf {
        self.crash_dir.join(name).join(format!("dump.{}", name))
    }

    /// Size of a dump's core file
    pub fn size(&self, name: &str) -> Result<u64> {
        let path = self.dump_file(name);
        let meta = match fs::metadata(&path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(KdumpError::NotFound(path))
            }
            Err(e) => return Err(KdumpError::io(format!("stat {}", path.display()), e)),
        };
        if !meta.is_file() {
            return Err(KdumpError::NotRegular(path));
        }
        if meta.len() == 0 {
            return Err(KdumpError::Empty(path));
        }
        Ok(meta.len())
    }

    fn candidate(&self, entry: &fs::DirEntry) -> Option<CrashDump> {
        if !entry.file_type().ok()?.is_dir() {
            return None;
        }
        let name = entry.file_name().into_string().ok()?;
        if !is_dump_name(&name) {
            return None;
        }
        let size = match self.size(&name) {
            Ok(size) => size,
            Err(e) => {
                debug!("Skipping {}: {}", name, e);
                return None;
            }
        };
        if !self.sniffer.is_kdump(&self.dump_file(&name)) {
            debug!("Skipping {}: not a kdump compressed dump", name);
            return None;
        }
        Some(CrashDump {
            path: self.crash_dir.join(&name),
            name,
            size,
        })
    }

    /// Valid dumps, newest first. A missing crash directory is an empty list.
    pub fn list(&self) -> Vec<CrashDump> {
        let entries = match fs::read_dir(&self.crash_dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Cannot read {}: {}", self.crash_dir.display(), e);
                return Vec::new();
            }
        };
        let mut dumps: Vec<CrashDump> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| self.candidate(&entry))
            .collect();
        // sort_by is stable
        dumps.sort_by(|a, b| b.name.cmp(&a.name));
        dumps
    }

    /// Status entries for the current listing
    pub fn entries(&self) -> Vec<CrashDumpEntry> {
        self.list()
            .into_iter()
            .enumerate()
            .map(|(i, dump)| CrashDumpEntry {
                index: i as u32,
                timestamp: timestamp_from_name(&dump.name),
                path: dump.path.display().to_string(),
                size: dump.size,
            })
            .collect()
    }

    /// Captured kernel log, empty when missing or unreadable
    pub fn dmesg(&self, dump: &CrashDump) -> String {
        fs::read(dump.dmesg_file())
            .map(|raw| String::from_utf8_lossy(&raw).into_owned())
            .unwrap_or_default()
    }

    /// Kernel logs by index; empty `indices` means every dump.
    ///
    /// Indices that don't resolve come back with an empty filename.
    pub fn dmesg_by_index(&self, indices: &[i32]) -> Vec<CrashDmesg> {
        let dumps = self.list();
        let requested: Vec<i32> = if indices.is_empty() {
            (0..dumps.len() as i32).collect()
        } else {
            indices.to_vec()
        };
        requested
            .into_iter()
            .map(|index| match resolve_index(index, dumps.len()) {
                Ok(pos) => CrashDmesg {
                    index,
                    filename: dumps[pos].path.display().to_string(),
                    dmesg: self.dmesg(&dumps[pos]),
                },
                Err(_) => CrashDmesg {
                    index,
                    ..Default::default()
                },
            })
            .collect()
    }

    /// Delete dumps by index; empty `indices` deletes every dump.
    ///
    /// All indices are checked against one fresh listing before anything is
    /// removed, so a single bad index deletes nothing. Returns how many dump
    /// directories were removed.
    pub fn delete(&self, indices: &[i32]) -> Result<usize> {
        let dumps = self.list();

        let selected: BTreeSet<usize> = if indices.is_empty() {
            (0..dumps.len()).collect()
        } else {
            let mut bad = Vec::new();
            let mut selected = BTreeSet::new();
            for &index in indices {
                match resolve_index(index, dumps.len()) {
                    Ok(pos) => {
                        selected.insert(pos);
                    }
                    Err(e) => {
                        warn!("Delete crash dumps: {}", e);
                        bad.push((index, e));
                    }
                }
            }
            match bad.len() {
                0 => selected,
                1 => return Err(bad.remove(0).1),
                _ => return Err(KdumpError::BadIndices(bad.into_iter().map(|(i, _)| i).collect())),
            }
        };

        let mut errors = Vec::new();
        let mut removed = 0;
        for pos in selected {
            let dump = &dumps[pos];
            match fs::remove_dir_all(&dump.path) {
                Ok(()) => {
                    info!("Deleted crash dump {}", dump.path.display());
                    removed += 1;
                }
                Err(e) => {
                    warn!("Cannot delete {}: {}", dump.path.display(), e);
                    errors.push(KdumpError::io(format!("remove {}", dump.path.display()), e));
                }
            }
        }
        KdumpError::combine(errors)?;
        Ok(removed)
    }
}
