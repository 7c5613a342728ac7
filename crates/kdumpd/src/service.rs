//! Crash capture load service activation.
//!
//! Enabling regenerates the kdump-tools environment file and starts the unit
//! that loads the capture kernel. Disabling stops that unit and, on request,
//! removes the environment file. Disabling is best effort and never fails.

use crate::atomic::write_atomic;
use crate::error::{KdumpError, Result};
use crate::facts::{BootFacts, FactReader};
use crate::settings::Settings;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Terminal result of a service manager job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    Done,
    Canceled,
    Timeout,
    Failed,
    Dependency,
    Skipped,
    Other(String),
}

impl JobResult {
    pub fn as_str(&self) -> &str {
        match self {
            JobResult::Done => "done",
            JobResult::Canceled => "canceled",
            JobResult::Timeout => "timeout",
            JobResult::Failed => "failed",
            JobResult::Dependency => "dependency",
            JobResult::Skipped => "skipped",
            JobResult::Other(s) => s,
        }
    }
}

impl fmt::Display for JobResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Starts and stops units, waiting for the job to finish
pub trait ServiceManager: Send + Sync {
    fn start_unit(&self, unit: &str) -> Result<JobResult>;
    fn stop_unit(&self, unit: &str) -> Result<JobResult>;
}

/// Service manager driven through systemctl.
///
/// systemctl blocks until the job completes and reports anything but `done`
/// on stderr with a non-zero exit; the message is mapped back to a result.
#[derive(Debug, Clone, Default)]
pub struct Systemctl;

impl Systemctl {
    fn run(&self, verb: &str, unit: &str) -> Result<JobResult> {
        let output = Command::new("systemctl")
            .args(["--job-mode=replace", verb, unit])
            .output()
            .map_err(|e| KdumpError::Command {
                program: "systemctl".to_string(),
                detail: e.to_string(),
            })?;

        if output.status.success() {
            return Ok(JobResult::Done);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Ok(classify_job_failure(stderr.trim()))
    }
}

/// Map systemctl's failure text to the job result it reports
pub fn classify_job_failure(message: &str) -> JobResult {
    let lower = message.to_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        JobResult::Timeout
    } else if lower.contains("dependency") {
        JobResult::Dependency
    } else if lower.contains("canceled") || lower.contains("cancelled") {
        JobResult::Canceled
    } else if lower.contains("failed") {
        JobResult::Failed
    } else if message.is_empty() {
        JobResult::Other("unknown".to_string())
    } else {
        JobResult::Other(message.to_string())
    }
}

impl ServiceManager for Systemctl {
    fn start_unit(&self, unit: &str) -> Result<JobResult> {
        self.run("start", unit)
    }

    fn stop_unit(&self, unit: &str) -> Result<JobResult> {
        self.run("stop", unit)
    }
}

/// Fixed parameters of the kdump-tools environment file
#[derive(Debug, Clone)]
pub struct EnvTemplate {
    pub kernel: PathBuf,
    pub initrd: PathBuf,
    pub crash_dir: PathBuf,
    pub dump_unit: String,
}

impl EnvTemplate {
    /// Render the environment file.
    ///
    /// An absent retention count renders as an empty `KDUMP_NUM_DUMPS`,
    /// which kdump-tools reads as unbounded.
    pub fn render(&self, files_to_save: Option<u32>, delete_old: bool) -> String {
        let num_dumps = files_to_save.map(|n| n.to_string()).unwrap_or_default();
        let delete_old = if delete_old { "1" } else { "0" };
        format!(
            "### Autogenerated by kdumpd\n\
             ### Note: Manual change to this file will be lost during next commit\n\
             ### kdump-tools defaults are in comments.\n\
             USE_KDUMP=1\n\
             #KDUMP_SYSCTL=\"kernel.panic_on_oops=1\"\n\
             KDUMP_SYSCTL=\"\"\n\
             KDUMP_KERNEL={kernel}\n\
             KDUMP_INITRD={initrd}\n\
             #KDUMP_FAIL_CMD=\"reboot -f\"\n\
             #KDUMP_DUMP_DMESG=\n\
             KDUMP_COREDIR=\"{crash_dir}\"\n\
             KDUMP_DUMP_DMESG=1\n\
             KDUMP_NUM_DUMPS={num_dumps}\n\
             KDUMP_DELETE_OLD={delete_old}\n\
             #MAKEDUMP_ARGS=\"-c -d 31\"\n\
             #KDUMP_KEXEC_ARGS=\"\"\n\
             #KDUMP_CMDLINE=\"\"\n\
             KDUMP_CMDLINE_APPEND=\"nr_cpus=1 systemd.unit={dump_unit} irqpoll nousb ata_piix.prefer_ms_hyperv=0\"\n",
            kernel = self.kernel.display(),
            initrd = self.initrd.display(),
            crash_dir = self.crash_dir.display(),
            num_dumps = num_dumps,
            delete_old = delete_old,
            dump_unit = self.dump_unit,
        )
    }
}

/// Prepares and starts the capture load service
#[derive(Clone)]
pub struct ServiceActivator {
    manager: Arc<dyn ServiceManager>,
    facts: FactReader,
    template: EnvTemplate,
    env_file: PathBuf,
    load_unit: String,
}

impl ServiceActivator {
    pub fn new(manager: Arc<dyn ServiceManager>, settings: &Settings) -> Self {
        Self {
            manager,
            facts: FactReader::new(&settings.paths),
            template: EnvTemplate {
                kernel: settings.paths.kernel.clone(),
                initrd: settings.paths.initrd.clone(),
                crash_dir: settings.paths.crash_dir.clone(),
                dump_unit: settings.service.dump_unit.clone(),
            },
            env_file: settings.paths.env_file.clone(),
            load_unit: settings.service.load_unit.clone(),
        }
    }

    /// Regenerate the environment file, skipping the write if unchanged
    pub fn write_env(&self, files_to_save: Option<u32>, delete_old: bool) -> Result<()> {
        let rendered = self.template.render(files_to_save, delete_old);
        if let Ok(current) = fs::read(&self.env_file) {
            if current == rendered.as_bytes() {
                debug!("{} unchanged", self.env_file.display());
                return Ok(());
            }
        }
        write_atomic(&self.env_file, rendered.as_bytes(), 0o644)
    }

    /// Configure capture and load the capture kernel if this boot allows it.
    ///
    /// Booting without `crashkernel=` is not an error: the environment is
    /// written and the load waits for a reboot.
    pub fn enable(
        &self,
        files_to_save: Option<u32>,
        delete_old: bool,
        facts: &BootFacts,
    ) -> Result<()> {
        self.write_env(files_to_save, delete_old)?;

        if facts.crash_kernel_param.is_empty() {
            debug!("No crashkernel parameter this boot, not starting {}", self.load_unit);
            return Ok(());
        }

        if facts.reserved_memory == 0 {
            return Err(KdumpError::Config(
                "no memory reserved, not starting kernel crash dump".to_string(),
            ));
        }

        if self.facts.is_capture_loaded() {
            info!("No need to restart Kernel Crash Dump Service");
            return Ok(());
        }

        match self.manager.start_unit(&self.load_unit)? {
            JobResult::Done => {
                info!("Started {}", self.load_unit);
                Ok(())
            }
            result => {
                error!("Failed to start {}: result={}", self.load_unit, result);
                Err(KdumpError::Service {
                    action: "start",
                    unit: self.load_unit.clone(),
                    result: result.to_string(),
                })
            }
        }
    }

    /// Stop the load service and optionally remove the environment file
    pub fn disable(&self, cleanup: bool) {
        match self.manager.stop_unit(&self.load_unit) {
            Ok(JobResult::Failed) | Ok(JobResult::Timeout) => {
                // Only these two count as a failed stop
                debug!("Failed to stop {}", self.load_unit);
            }
            Ok(_) => debug!("Stopped {}", self.load_unit),
            Err(e) => debug!("Failed to stop {}: {}", self.load_unit, e),
        }

        if cleanup {
            if let Err(e) = fs::remove_file(&self.env_file) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    debug!("Cannot remove {}: {}", self.env_file.display(), e);
                }
            }
        }
    }
}
