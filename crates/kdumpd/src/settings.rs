//! Daemon settings.
//!
//! Loads /etc/kdump/kdumpd.toml, then /var/lib/kdump/kdumpd.toml, or uses
//! defaults. Every OS location the engine touches is overridable here so the
//! engine can run against a scratch tree.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Settings file path
pub const SETTINGS_PATH: &str = "/etc/kdump/kdumpd.toml";

/// Fallback settings file path
pub const DEFAULT_SETTINGS_PATH: &str = "/var/lib/kdump/kdumpd.toml";

/// Daemon process settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonSettings {
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// Last accepted configuration, replayed on startup
    #[serde(default = "default_cache_file")]
    pub cache_file: PathBuf,

    /// Default tracing filter, `RUST_LOG` wins when set
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_socket_path() -> PathBuf {
    PathBuf::from(kdump_common::SOCKET_PATH)
}

fn default_cache_file() -> PathBuf {
    PathBuf::from("/var/run/kdump.cfg")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            cache_file: default_cache_file(),
            log_level: default_log_level(),
        }
    }
}

/// How candidate dump files are recognized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnifferKind {
    /// Ask file(1)
    File,
    /// Check the on-disk kdump header ourselves
    Signature,
}

/// OS locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    #[serde(default = "default_crash_dir")]
    pub crash_dir: PathBuf,

    /// Second place the last-boot marker may live
    #[serde(default = "default_run_dir")]
    pub run_dir: PathBuf,

    /// Environment file read by the capture load service
    #[serde(default = "default_env_file")]
    pub env_file: PathBuf,

    #[serde(default = "default_cmdline")]
    pub cmdline: PathBuf,

    #[serde(default = "default_kexec_crash_size")]
    pub kexec_crash_size: PathBuf,

    #[serde(default = "default_kexec_crash_loaded")]
    pub kexec_crash_loaded: PathBuf,

    /// Boot-loader environment editor
    #[serde(default = "default_grub_editenv")]
    pub grub_editenv: PathBuf,

    #[serde(default = "default_file_cmd")]
    pub file_cmd: PathBuf,

    #[serde(default = "default_sniffer")]
    pub sniffer: SnifferKind,

    /// Kernel booted for capture
    #[serde(default = "default_kernel")]
    pub kernel: PathBuf,

    #[serde(default = "default_initrd")]
    pub initrd: PathBuf,
}

fn default_crash_dir() -> PathBuf {
    PathBuf::from("/var/crash")
}

fn default_run_dir() -> PathBuf {
    PathBuf::from("/run")
}

fn default_env_file() -> PathBuf {
    PathBuf::from("/etc/default/kdump-tools")
}

fn default_cmdline() -> PathBuf {
    PathBuf::from("/proc/cmdline")
}

fn default_kexec_crash_size() -> PathBuf {
    PathBuf::from("/sys/kernel/kexec_crash_size")
}

fn default_kexec_crash_loaded() -> PathBuf {
    PathBuf::from("/sys/kernel/kexec_crash_loaded")
}

fn default_grub_editenv() -> PathBuf {
    PathBuf::from("/opt/vyatta/sbin/vyatta-grub-editenv")
}

fn default_file_cmd() -> PathBuf {
    PathBuf::from("/usr/bin/file")
}

fn default_sniffer() -> SnifferKind {
    SnifferKind::File
}

fn default_kernel() -> PathBuf {
    PathBuf::from("/boot/vmlinuz")
}

fn default_initrd() -> PathBuf {
    PathBuf::from("/boot/initrd.img")
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            crash_dir: default_crash_dir(),
            run_dir: default_run_dir(),
            env_file: default_env_file(),
            cmdline: default_cmdline(),
            kexec_crash_size: default_kexec_crash_size(),
            kexec_crash_loaded: default_kexec_crash_loaded(),
            grub_editenv: default_grub_editenv(),
            file_cmd: default_file_cmd(),
            sniffer: default_sniffer(),
            kernel: default_kernel(),
            initrd: default_initrd(),
        }
    }
}

/// Systemd units
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Loads the capture kernel
    #[serde(default = "default_load_unit")]
    pub load_unit: String,

    /// Runs in the capture kernel and saves the dump
    #[serde(default = "default_dump_unit")]
    pub dump_unit: String,
}

fn default_load_unit() -> String {
    "vyatta-kdump-load.service".to_string()
}

fn default_dump_unit() -> String {
    "vyatta-kdump-dump.service".to_string()
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            load_unit: default_load_unit(),
            dump_unit: default_dump_unit(),
        }
    }
}

/// Full daemon settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub daemon: DaemonSettings,

    #[serde(default)]
    pub paths: PathSettings,

    #[serde(default)]
    pub service: ServiceSettings,
}

impl Settings {
    /// Load settings from file, or return defaults
    pub fn load() -> Self {
        Self::load_from_path(SETTINGS_PATH)
            .or_else(|_| Self::load_from_path(DEFAULT_SETTINGS_PATH))
            .unwrap_or_else(|e| {
                warn!("Settings not found, using defaults: {}", e);
                Settings::default()
            })
    }

    /// Load settings from a specific path
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }
}
