//! Desired kernel crash dump configuration.
//!
//! This is the document callers submit to the daemon and the one the daemon
//! caches across restarts. `reserved-memory` arrives loosely typed (a number
//! of megabytes or a string) and is narrowed to [`ReservedMemory`] while
//! deserializing, so nothing downstream has to guess its type.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Literal reservation spec that selects the built-in size-range table
pub const AUTO_RESERVATION: &str = "auto";

/// Desired crash dump configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct KdumpConfig {
    /// Raw enable flag as configured
    #[serde(default)]
    pub enable: bool,

    /// Number of dumps to keep. Absent means unbounded, zero disables capture.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_to_save: Option<u32>,

    /// Delete the oldest dump when the retention limit is reached
    #[serde(default)]
    pub delete_old_files: bool,

    /// Memory to reserve for the crash kernel on next boot
    #[serde(default)]
    pub reserved_memory: ReservedMemory,
}

impl KdumpConfig {
    /// Whether capture is effectively enabled.
    ///
    /// An explicit retention count of zero turns capture off even when the
    /// enable flag is set.
    pub fn is_enabled(&self) -> bool {
        self.enable && self.files_to_save != Some(0)
    }
}

/// Crash kernel memory reservation as configured
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReservedMemory {
    /// Fixed reservation in MiB. Zero releases the reservation.
    Megabytes(u64),
    /// Symbolic spec; only `auto` is accepted
    Spec(String),
}

impl ReservedMemory {
    pub fn auto() -> Self {
        ReservedMemory::Spec(AUTO_RESERVATION.to_string())
    }

    /// Spec string handed to the boot-loader reservation layer
    pub fn as_spec(&self) -> String {
        match self {
            ReservedMemory::Megabytes(mb) => mb.to_string(),
            ReservedMemory::Spec(s) => s.clone(),
        }
    }
}

impl Default for ReservedMemory {
    fn default() -> Self {
        ReservedMemory::auto()
    }
}

impl fmt::Display for ReservedMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReservedMemory::Megabytes(mb) => write!(f, "{}M", mb),
            ReservedMemory::Spec(s) => write!(f, "{}", s),
        }
    }
}

/// Rejected `reserved-memory` value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid reserved-memory value '{0}': expected megabytes or \"auto\"")]
pub struct InvalidReservedMemory(pub String);

impl FromStr for ReservedMemory {
    type Err = InvalidReservedMemory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == AUTO_RESERVATION {
            return Ok(ReservedMemory::auto());
        }
        if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
            return s
                .parse::<u64>()
                .map(ReservedMemory::Megabytes)
                .map_err(|_| InvalidReservedMemory(s.to_string()));
        }
        Err(InvalidReservedMemory(s.to_string()))
    }
}

/// Wire shape of `reserved-memory`: a bare number or a string
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawReservedMemory {
    Number(u64),
    Text(String),
}

impl TryFrom<RawReservedMemory> for ReservedMemory {
    type Error = InvalidReservedMemory;

    fn try_from(raw: RawReservedMemory) -> Result<Self, Self::Error> {
        match raw {
            RawReservedMemory::Number(mb) => Ok(ReservedMemory::Megabytes(mb)),
            RawReservedMemory::Text(s) => s.parse(),
        }
    }
}

impl From<ReservedMemory> for RawReservedMemory {
    fn from(mem: ReservedMemory) -> Self {
        match mem {
            ReservedMemory::Megabytes(mb) => RawReservedMemory::Number(mb),
            ReservedMemory::Spec(s) => RawReservedMemory::Text(s),
        }
    }
}

impl Serialize for ReservedMemory {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        RawReservedMemory::from(self.clone()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ReservedMemory {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawReservedMemory::deserialize(deserializer)?;
        ReservedMemory::try_from(raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_enabled() {
        let mut cfg = KdumpConfig {
            enable: true,
            ..Default::default()
        };
        assert!(cfg.is_enabled());

        cfg.files_to_save = Some(3);
        assert!(cfg.is_enabled());

        // Zero retention turns capture off behind the enable flag's back
        cfg.files_to_save = Some(0);
        assert!(!cfg.is_enabled());
        assert!(cfg.enable);

        cfg.enable = false;
        cfg.files_to_save = None;
        assert!(!cfg.is_enabled());
    }

    #[test]
    fn test_reserved_memory_from_number() {
        let cfg: KdumpConfig =
            serde_json::from_str(r#"{"enable": true, "reserved-memory": 512}"#).unwrap();
        assert_eq!(cfg.reserved_memory, ReservedMemory::Megabytes(512));
    }

    #[test]
    fn test_reserved_memory_from_string() {
        let cfg: KdumpConfig =
            serde_json::from_str(r#"{"reserved-memory": "auto"}"#).unwrap();
        assert_eq!(cfg.reserved_memory, ReservedMemory::auto());

        let cfg: KdumpConfig =
            serde_json::from_str(r#"{"reserved-memory": "384"}"#).unwrap();
        assert_eq!(cfg.reserved_memory, ReservedMemory::Megabytes(384));
    }

    #[test]
    fn test_reserved_memory_rejects_garbage() {
        let err = serde_json::from_str::<KdumpConfig>(r#"{"reserved-memory": "lots"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("lots"));

        assert!(serde_json::from_str::<KdumpConfig>(r#"{"reserved-memory": true}"#).is_err());
        assert!("-5".parse::<ReservedMemory>().is_err());
        assert!("".parse::<ReservedMemory>().is_err());
    }

    #[test]
    fn test_defaults_when_fields_missing() {
        let cfg: KdumpConfig = serde_json::from_str("{}").unwrap();
        assert!(!cfg.enable);
        assert_eq!(cfg.files_to_save, None);
        assert!(!cfg.delete_old_files);
        assert_eq!(cfg.reserved_memory, ReservedMemory::auto());
    }

    #[test]
    fn test_as_spec() {
        assert_eq!(ReservedMemory::Megabytes(0).as_spec(), "0");
        assert_eq!(ReservedMemory::Megabytes(512).as_spec(), "512");
        assert_eq!(ReservedMemory::auto().as_spec(), "auto");
    }
}
