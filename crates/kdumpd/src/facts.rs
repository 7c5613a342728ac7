//! Kernel facts that only change across a reboot.
//!
//! Reads the crash kernel reservation the running kernel got, the
//! `crashkernel=` parameter it booted with, whether a capture kernel is
//! loaded, and the marker the capture service leaves after a crash reboot.

use crate::error::{KdumpError, Result};
use crate::settings::PathSettings;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::PathBuf;
use tracing::{error, warn};

/// Marker written by the dump service after a crash reboot
pub const LAST_BOOT_MARKER: &str = "kdump-last-boot-crashed";

static CRASHKERNEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\s)crashkernel=(\S+)").expect("static regex"));

/// Outcome of the capture attempt recorded in the last-boot marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    /// Dump saved
    Success,
    /// Retention limit reached, dump not saved
    Skipped,
    /// Dump file could not be created
    NoFile,
    Error,
}

impl CaptureStatus {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(CaptureStatus::Success),
            "skipped" => Some(CaptureStatus::Skipped),
            "nofile" => Some(CaptureStatus::NoFile),
            "error" => Some(CaptureStatus::Error),
            _ => None,
        }
    }
}

/// Parsed last-boot marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastBootCrash {
    pub timestamp: String,
    pub boot_id: String,
    pub status: CaptureStatus,
}

/// Contents of a well-formed last-boot marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    Crash(LastBootCrash),
    /// Well formed, but with a status we don't know
    UnknownStatus(String),
}

/// Parse `timestamp=<t> bootid=<b> status=<s>`; `None` when malformed
pub fn parse_marker(content: &str) -> Option<Marker> {
    let mut fields = content.split_whitespace();
    let timestamp = fields.next()?.strip_prefix("timestamp=")?;
    let boot_id = fields.next()?.strip_prefix("bootid=")?;
    let raw_status = fields.next()?.strip_prefix("status=")?;
    Some(match CaptureStatus::parse(raw_status) {
        Some(status) => Marker::Crash(LastBootCrash {
            timestamp: timestamp.to_string(),
            boot_id: boot_id.to_string(),
            status,
        }),
        None => Marker::UnknownStatus(raw_status.to_string()),
    })
}

/// Snapshot of boot-time kernel state.
///
/// Built once at startup and handed to the engine; `FactReader::boot_facts`
/// builds a fresh one if the process ever needs to observe a change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootFacts {
    /// Bytes reserved for the crash kernel, 0 when unknown
    pub reserved_memory: u64,
    /// Value of `crashkernel=` on the running kernel's command line
    pub crash_kernel_param: String,
    pub last_boot_crash: Option<LastBootCrash>,
}

/// Reads kernel facts from procfs and sysfs
#[derive(Debug, Clone)]
pub struct FactReader {
    kexec_crash_size: PathBuf,
    kexec_crash_loaded: PathBuf,
    cmdline: PathBuf,
    crash_dir: PathBuf,
    run_dir: PathBuf,
}

impl FactReader {
    pub fn new(paths: &PathSettings) -> Self {
        Self {
            kexec_crash_size: paths.kexec_crash_size.clone(),
            kexec_crash_loaded: paths.kexec_crash_loaded.clone(),
            cmdline: paths.cmdline.clone(),
            crash_dir: paths.crash_dir.clone(),
            run_dir: paths.run_dir.clone(),
        }
    }

    /// Crash kernel memory reserved by the running kernel, in bytes
    pub fn reserved_memory(&self) -> Result<u64> {
        let raw = fs::read_to_string(&self.kexec_crash_size).map_err(|e| {
            KdumpError::io(format!("read {}", self.kexec_crash_size.display()), e)
        })?;
        raw.trim().parse::<u64>().map_err(|e| {
            KdumpError::io(
                format!("parse {}", self.kexec_crash_size.display()),
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            )
        })
    }

    /// `crashkernel=` value of the running kernel, empty when absent
    pub fn crash_kernel_param(&self) -> Result<String> {
        let cmdline = fs::read_to_string(&self.cmdline)
            .map_err(|e| KdumpError::io(format!("read {}", self.cmdline.display()), e))?;
        Ok(CRASHKERNEL_RE
            .captures(&cmdline)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default())
    }

    /// Whether a capture kernel is loaded. Read failures count as not loaded.
    pub fn is_capture_loaded(&self) -> bool {
        let raw = match fs::read_to_string(&self.kexec_crash_loaded) {
            Ok(raw) => raw,
            Err(e) => {
                error!("Cannot read {}: {}", self.kexec_crash_loaded.display(), e);
                return false;
            }
        };
        match raw.trim().parse::<i64>() {
            Ok(v) => v == 1,
            Err(e) => {
                error!(
                    "Invalid state {:?} from {}: {}",
                    raw.trim(),
                    self.kexec_crash_loaded.display(),
                    e
                );
                false
            }
        }
    }

    /// Marker left by the dump service, crash dir first, then the runtime dir
    pub fn last_boot_crash(&self) -> Option<LastBootCrash> {
        for dir in [&self.crash_dir, &self.run_dir] {
            let path = dir.join(LAST_BOOT_MARKER);
            let content = match fs::read_to_string(&path) {
                Ok(c) => c,
                Err(_) => continue,
            };
            match parse_marker(&content) {
                None => continue,
                Some(Marker::Crash(crash)) => return Some(crash),
                Some(Marker::UnknownStatus(status)) => {
                    warn!("Ignoring unknown crash capture status \"{}\"", status);
                    return None;
                }
            }
        }
        None
    }

    /// Read every boot fact, absorbing failures into safe defaults
    pub fn boot_facts(&self) -> BootFacts {
        let reserved_memory = self.reserved_memory().unwrap_or_else(|e| {
            warn!("Crash kernel memory unknown: {}", e);
            0
        });
        let crash_kernel_param = self.crash_kernel_param().unwrap_or_else(|e| {
            warn!("Cannot read crashkernel parameter: {}", e);
            String::new()
        });
        let last_boot_crash = self.last_boot_crash();
        if let Some(crash) = &last_boot_crash {
            self.log_last_boot_crash(crash);
        }
        BootFacts {
            reserved_memory,
            crash_kernel_param,
            last_boot_crash,
        }
    }

    fn log_last_boot_crash(&self, crash: &LastBootCrash) {
        const MSG: &str = "System rebooted due to a system crash.";
        match crash.status {
            CaptureStatus::Success => error!(
                "{} Kernel crash dump file is at {}/{}/.",
                MSG,
                self.crash_dir.display(),
                crash.timestamp
            ),
            CaptureStatus::Skipped => error!(
                "{} Kernel crash dump not saved, 'files-to-save' limit reached.",
                MSG
            ),
            CaptureStatus::NoFile => error!("{} Failed to create Kernel Crash dump file.", MSG),
            CaptureStatus::Error => error!("{} Error while capturing kernel crash dump.", MSG),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn reader_in(root: &std::path::Path) -> FactReader {
        let paths = PathSettings {
            crash_dir: root.join("crash"),
            run_dir: root.join("run"),
            cmdline: root.join("cmdline"),
            kexec_crash_size: root.join("kexec_crash_size"),
            kexec_crash_loaded: root.join("kexec_crash_loaded"),
            ..PathSettings::default()
        };
        fs::create_dir_all(&paths.crash_dir).unwrap();
        fs::create_dir_all(&paths.run_dir).unwrap();
        FactReader::new(&paths)
    }

    #[test]
    fn test_crash_kernel_param() {
        let dir = tempdir().unwrap();
        let reader = reader_in(dir.path());

        fs::write(
            dir.path().join("cmdline"),
            "BOOT_IMAGE=/boot/vmlinuz root=/dev/sda1 crashkernel=2560M-:512M quiet\n",
        )
        .unwrap();
        assert_eq!(reader.crash_kernel_param().unwrap(), "2560M-:512M");

        fs::write(dir.path().join("cmdline"), "root=/dev/sda1 quiet\n").unwrap();
        assert_eq!(reader.crash_kernel_param().unwrap(), "");
    }

    #[test]
    fn test_crash_kernel_param_unreadable() {
        let dir = tempdir().unwrap();
        let reader = reader_in(dir.path());
        assert!(reader.crash_kernel_param().is_err());
    }

    #[test]
    fn test_reserved_memory() {
        let dir = tempdir().unwrap();
        let reader = reader_in(dir.path());
        assert!(reader.reserved_memory().is_err());

        fs::write(dir.path().join("kexec_crash_size"), "536870912\n").unwrap();
        assert_eq!(reader.reserved_memory().unwrap(), 536870912);

        fs::write(dir.path().join("kexec_crash_size"), "garbage\n").unwrap();
        assert!(reader.reserved_memory().is_err());
    }

    #[test]
    fn test_is_capture_loaded() {
        let dir = tempdir().unwrap();
        let reader = reader_in(dir.path());
        assert!(!reader.is_capture_loaded());

        fs::write(dir.path().join("kexec_crash_loaded"), "1\n").unwrap();
        assert!(reader.is_capture_loaded());

        fs::write(dir.path().join("kexec_crash_loaded"), "0\n").unwrap();
        assert!(!reader.is_capture_loaded());

        fs::write(dir.path().join("kexec_crash_loaded"), "yes\n").unwrap();
        assert!(!reader.is_capture_loaded());
    }

    #[test]
    fn test_parse_marker() {
        let crash = match parse_marker("timestamp=202401031542 bootid=abc status=success\n") {
            Some(Marker::Crash(crash)) => crash,
            other => panic!("expected a crash, got {:?}", other),
        };
        assert_eq!(crash.timestamp, "202401031542");
        assert_eq!(crash.boot_id, "abc");
        assert_eq!(crash.status, CaptureStatus::Success);

        assert!(matches!(
            parse_marker("timestamp=1 bootid=2 status=nofile"),
            Some(Marker::Crash(LastBootCrash {
                status: CaptureStatus::NoFile,
                ..
            }))
        ));
        assert_eq!(
            parse_marker("timestamp=1 bootid=2 status=weird"),
            Some(Marker::UnknownStatus("weird".to_string()))
        );
        assert_eq!(parse_marker("timestamp=1 bootid=2"), None);
        assert_eq!(parse_marker("bootid=2 timestamp=1 status=error"), None);
        assert_eq!(parse_marker("garbage"), None);
        assert_eq!(parse_marker(""), None);
    }

    #[test]
    fn test_unknown_status_stops_lookup() {
        let dir = tempdir().unwrap();
        let reader = reader_in(dir.path());
        fs::write(
            dir.path().join("run").join(LAST_BOOT_MARKER),
            "timestamp=2 bootid=b status=error",
        )
        .unwrap();
        fs::write(
            dir.path().join("crash").join(LAST_BOOT_MARKER),
            "timestamp=1 bootid=a status=rebooting",
        )
        .unwrap();
        assert!(reader.last_boot_crash().is_none());
    }

    #[test]
    fn test_last_boot_crash_lookup_order() {
        let dir = tempdir().unwrap();
        let reader = reader_in(dir.path());
        assert!(reader.last_boot_crash().is_none());

        fs::write(
            dir.path().join("run").join(LAST_BOOT_MARKER),
            "timestamp=2 bootid=b status=error",
        )
        .unwrap();
        assert_eq!(reader.last_boot_crash().unwrap().status, CaptureStatus::Error);

        // Crash dir wins over the runtime dir
        fs::write(
            dir.path().join("crash").join(LAST_BOOT_MARKER),
            "timestamp=1 bootid=a status=skipped",
        )
        .unwrap();
        assert_eq!(reader.last_boot_crash().unwrap().status, CaptureStatus::Skipped);

        // Unparsable content in the crash dir falls through
        fs::write(dir.path().join("crash").join(LAST_BOOT_MARKER), "junk").unwrap();
        assert_eq!(reader.last_boot_crash().unwrap().status, CaptureStatus::Error);
    }

    #[test]
    fn test_boot_facts_defaults_on_missing_files() {
        let dir = tempdir().unwrap();
        let reader = reader_in(dir.path());
        assert_eq!(reader.boot_facts(), BootFacts::default());
    }
}
