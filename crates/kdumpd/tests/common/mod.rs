//! Fakes and a scratch filesystem shared by the integration tests.

#![allow(dead_code)]

use kdumpd::engine::Collaborators;
use kdumpd::facts::BootFacts;
use kdumpd::inventory::DumpSniffer;
use kdumpd::reservation::BootEnv;
use kdumpd::service::{JobResult, ServiceManager};
use kdumpd::settings::Settings;
use kdumpd::{Engine, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Boot-loader environment kept in memory
#[derive(Default)]
pub struct FakeBootEnv {
    pub vars: Mutex<BTreeMap<String, String>>,
    pub fail_set: bool,
}

impl FakeBootEnv {
    pub fn get(&self, key: &str) -> Option<String> {
        self.vars.lock().unwrap().get(key).cloned()
    }
}

impl BootEnv for FakeBootEnv {
    fn set(&self, key: &str, value: &str) -> Result<()> {
        if self.fail_set {
            return Err(kdumpd::KdumpError::Command {
                program: "grub-editenv".to_string(),
                detail: "read-only".to_string(),
            });
        }
        self.vars
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn unset(&self, key: &str) -> Result<()> {
        self.vars.lock().unwrap().remove(key);
        Ok(())
    }

    fn list(&self) -> Result<String> {
        Ok(self
            .vars
            .lock()
            .unwrap()
            .iter()
            .map(|(k, v)| format!("{}={}\n", k, v))
            .collect())
    }
}

/// Service manager recording every call
pub struct FakeServices {
    pub calls: Mutex<Vec<String>>,
    pub start_result: JobResult,
    pub stop_result: JobResult,
}

impl Default for FakeServices {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            start_result: JobResult::Done,
            stop_result: JobResult::Done,
        }
    }
}

impl FakeServices {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl ServiceManager for FakeServices {
    fn start_unit(&self, unit: &str) -> Result<JobResult> {
        self.calls.lock().unwrap().push(format!("start {}", unit));
        Ok(self.start_result.clone())
    }

    fn stop_unit(&self, unit: &str) -> Result<JobResult> {
        self.calls.lock().unwrap().push(format!("stop {}", unit));
        Ok(self.stop_result.clone())
    }
}

/// Accepts every non-empty file
pub struct AnyDump;

impl DumpSniffer for AnyDump {
    fn is_kdump(&self, _path: &Path) -> bool {
        true
    }
}

/// Scratch system: settings pointing into a temp dir plus the fakes
pub struct Sandbox {
    pub dir: TempDir,
    pub settings: Settings,
    pub boot_env: Arc<FakeBootEnv>,
    pub services: Arc<FakeServices>,
}

impl Sandbox {
    pub fn new() -> Self {
        Self::with(FakeBootEnv::default(), FakeServices::default())
    }

    pub fn with(boot_env: FakeBootEnv, services: FakeServices) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let mut settings = Settings::default();
        settings.daemon.socket_path = root.join("kdumpd.sock");
        settings.daemon.cache_file = root.join("kdump.cfg");
        settings.paths.crash_dir = root.join("crash");
        settings.paths.run_dir = root.join("run");
        settings.paths.env_file = root.join("kdump-tools");
        settings.paths.cmdline = root.join("cmdline");
        settings.paths.kexec_crash_size = root.join("kexec_crash_size");
        settings.paths.kexec_crash_loaded = root.join("kexec_crash_loaded");
        fs::create_dir_all(&settings.paths.crash_dir).unwrap();
        fs::create_dir_all(&settings.paths.run_dir).unwrap();
        fs::write(&settings.paths.kexec_crash_loaded, "0\n").unwrap();

        Self {
            dir,
            settings,
            boot_env: Arc::new(boot_env),
            services: Arc::new(services),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            boot_env: self.boot_env.clone(),
            services: self.services.clone(),
            sniffer: Arc::new(AnyDump),
        }
    }

    pub fn engine(&self, facts: BootFacts) -> Engine {
        Engine::new(&self.settings, self.collaborators(), facts)
    }

    pub fn crash_dir(&self) -> PathBuf {
        self.settings.paths.crash_dir.clone()
    }

    pub fn set_loaded(&self, loaded: bool) {
        fs::write(
            &self.settings.paths.kexec_crash_loaded,
            if loaded { "1\n" } else { "0\n" },
        )
        .unwrap();
    }

    /// Create `<crash dir>/<name>/dump.<name>` and its dmesg
    pub fn add_dump(&self, name: &str, size: usize) -> PathBuf {
        let dir = self.crash_dir().join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("dump.{}", name)), vec![0u8; size]).unwrap();
        fs::write(dir.join(format!("dmesg.{}", name)), format!("panic at {}\n", name)).unwrap();
        dir
    }
}

pub fn facts(reserved_memory: u64, crash_kernel_param: &str) -> BootFacts {
    BootFacts {
        reserved_memory,
        crash_kernel_param: crash_kernel_param.to_string(),
        last_boot_crash: None,
    }
}

pub const MIB: u64 = 1024 * 1024;
