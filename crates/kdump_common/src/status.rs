//! Observable crash dump state.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

const KB: u64 = 1024;
const MB: u64 = 1024 * KB;
const GB: u64 = 1024 * MB;

/// Capture service state, derived on every query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    /// Capture kernel is loaded
    Running,
    /// Capture should be loaded but is not
    Error,
    /// Capture is off, or waiting for a reboot
    Disabled,
}

impl ServiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceState::Running => "running",
            ServiceState::Error => "error",
            ServiceState::Disabled => "disabled",
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct KdumpStatus {
    pub service_state: ServiceState,
    /// Crash kernel memory reserved by the running kernel, in bytes
    pub reserved_memory: u64,
    /// Next-boot reservation differs from what the running kernel booted with
    pub need_reboot: bool,
    pub rebooted_after_system_crash: bool,
    /// Newest first
    #[serde(default)]
    pub crash_dumps: Vec<CrashDumpEntry>,
}

impl KdumpStatus {
    pub fn crash_count(&self) -> usize {
        self.crash_dumps.len()
    }
}

/// One captured crash dump as reported to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrashDumpEntry {
    /// Position in the current ordering, 0 is the newest
    pub index: u32,
    pub timestamp: String,
    pub path: String,
    pub size: u64,
}

/// Captured kernel log of one crash dump
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CrashDmesg {
    /// Index as requested by the caller
    pub index: i32,
    /// Dump directory; empty when the index did not resolve
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub dmesg: String,
}

impl CrashDmesg {
    pub fn is_resolved(&self) -> bool {
        !self.filename.is_empty()
    }
}

/// Render a `YYYYMMDDhhmm` dump name as an RFC 3339 UTC timestamp.
///
/// Names that chrono rejects (day 31 in a short month, say) are still
/// rendered field by field so the caller sees what is on disk.
pub fn timestamp_from_name(name: &str) -> String {
    if name.len() != 12 || !name.bytes().all(|b| b.is_ascii_digit()) {
        return String::new();
    }
    match NaiveDateTime::parse_from_str(name, "%Y%m%d%H%M") {
        Ok(ts) => ts.format("%Y-%m-%dT%H:%M:00Z").to_string(),
        Err(_) => format!(
            "{}-{}-{}T{}:{}:00Z",
            &name[..4],
            &name[4..6],
            &name[6..8],
            &name[8..10],
            &name[10..]
        ),
    }
}

/// Format a byte count in the largest unit that divides it exactly
pub fn format_memory(bytes: u64) -> String {
    if bytes == 0 {
        return "0 bytes".to_string();
    }
    let (value, unit) = if bytes % GB == 0 {
        (bytes / GB, "GB")
    } else if bytes % MB == 0 {
        (bytes / MB, "MB")
    } else if bytes % KB == 0 {
        (bytes / KB, "KB")
    } else {
        (bytes, "bytes")
    };
    format!("{} {}", value, unit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_from_name() {
        assert_eq!(timestamp_from_name("202401031542"), "2024-01-03T15:42:00Z");
        assert_eq!(timestamp_from_name("202402310000"), "2024-02-31T00:00:00Z");
        assert_eq!(timestamp_from_name("2024"), "");
        assert_eq!(timestamp_from_name("2024010315ab"), "");
    }

    #[test]
    fn test_format_memory() {
        assert_eq!(format_memory(0), "0 bytes");
        assert_eq!(format_memory(512 * MB), "512 MB");
        assert_eq!(format_memory(2 * GB), "2 GB");
        assert_eq!(format_memory(3 * KB), "3 KB");
        assert_eq!(format_memory(1000), "1000 bytes");
    }

    #[test]
    fn test_service_state_wire_names() {
        assert_eq!(serde_json::to_string(&ServiceState::Running).unwrap(), "\"running\"");
        assert_eq!(ServiceState::Disabled.to_string(), "disabled");
    }
}
