//! Boot-loader crash kernel memory reservation.
//!
//! The next-boot reservation lives in the boot-loader environment as
//! `crashkernel_mem=<directive>`. The boot loader turns it into the kernel's
//! `crashkernel=` parameter, so comparing the two tells us whether the
//! running kernel matches what the next boot will do.

use crate::error::{KdumpError, Result};
use crate::facts::BootFacts;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use tracing::{debug, info};

/// Boot-loader environment variable holding the directive
pub const RESERVATION_VAR: &str = "crashkernel_mem";

/// Directive used for `auto`: 384M on 2432M-8G hosts, 512M above
pub const DEFAULT_DIRECTIVE: &str = "2432-8G:384M,8G-:512M";

/// Smallest reservation accepted, in MiB
pub const MIN_RESERVATION_MB: u64 = 256;

/// Largest reservation accepted, in MiB
pub const MAX_RESERVATION_MB: u64 = i32::MAX as u64;

/// Memory that must stay available to the main kernel, in MiB
pub const MIN_UNRESERVED_MB: u64 = 2048;

/// Persistent boot-loader environment
pub trait BootEnv: Send + Sync {
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn unset(&self, key: &str) -> Result<()>;
    /// Whole environment as `key=value` lines
    fn list(&self) -> Result<String>;
}

/// Boot-loader environment edited through the platform's grub-editenv wrapper
#[derive(Debug, Clone)]
pub struct GrubEditEnv {
    program: PathBuf,
}

impl GrubEditEnv {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, action: &str, arg: Option<&str>) -> Result<String> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--running").arg(format!("--action={}", action));
        if let Some(arg) = arg {
            cmd.arg(arg);
        }

        let output = cmd.output().map_err(|e| KdumpError::Command {
            program: self.program.display().to_string(),
            detail: e.to_string(),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(KdumpError::Command {
                program: self.program.display().to_string(),
                detail: format!("--action={} exited with {}: {}", action, output.status, stderr.trim()),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl BootEnv for GrubEditEnv {
    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.run("set", Some(&format!("{}={}", key, value))).map(|_| ())
    }

    fn unset(&self, key: &str) -> Result<()> {
        self.run("unset", Some(key)).map(|_| ())
    }

    fn list(&self) -> Result<String> {
        self.run("list", None)
    }
}

/// Translate a reservation spec into a boot-loader directive.
///
/// `"auto"` picks the default table. Otherwise the spec is a number of MiB:
/// zero releases the reservation (`None`) and `M` in
/// `[MIN_RESERVATION_MB, MAX_RESERVATION_MB]` becomes `"{M+2048}M-:{M}M"`.
pub fn directive_for(spec: &str) -> Result<Option<String>> {
    let spec = spec.trim();
    if spec == kdump_common::config::AUTO_RESERVATION {
        return Ok(Some(DEFAULT_DIRECTIVE.to_string()));
    }

    let mb: u64 = spec
        .parse()
        .map_err(|_| KdumpError::Config(format!("invalid reserved memory \"{}\"", spec)))?;
    if mb == 0 {
        return Ok(None);
    }
    if mb < MIN_RESERVATION_MB {
        return Err(KdumpError::Config(format!(
            "reservation too small: {}M, need at least {}M",
            mb, MIN_RESERVATION_MB
        )));
    }
    if mb > MAX_RESERVATION_MB {
        return Err(KdumpError::Config(format!(
            "reservation too large: {}M, at most {}M",
            mb, MAX_RESERVATION_MB
        )));
    }
    Ok(Some(format!("{}M-:{}M", MIN_UNRESERVED_MB + mb, mb)))
}

/// Reads and writes the next-boot reservation
#[derive(Clone)]
pub struct Reservation {
    env: Arc<dyn BootEnv>,
}

impl Reservation {
    pub fn new(env: Arc<dyn BootEnv>) -> Self {
        Self { env }
    }

    /// Persist the reservation implied by `spec` for the next boot.
    ///
    /// Invalid specs fail before the boot-loader environment is touched.
    /// Releasing never fails; an unset error is only logged.
    pub fn set_reservation(&self, spec: &str) -> Result<()> {
        match directive_for(spec)? {
            None => {
                if let Err(e) = self.env.unset(RESERVATION_VAR) {
                    debug!("Free reserved memory: {}", e);
                }
                Ok(())
            }
            Some(directive) => {
                self.env.set(RESERVATION_VAR, &directive)?;
                info!("Next boot reserves crash kernel memory {}", directive);
                Ok(())
            }
        }
    }

    /// Directive persisted for the next boot, empty when unset or unreadable
    pub fn current_reservation(&self) -> String {
        let listing = match self.env.list() {
            Ok(listing) => listing,
            Err(e) => {
                debug!("Cannot list boot-loader environment: {}", e);
                return String::new();
            }
        };
        let prefix = format!("{}=", RESERVATION_VAR);
        listing
            .lines()
            .find_map(|line| line.strip_prefix(prefix.as_str()))
            .map(|v| v.trim_end().to_string())
            .unwrap_or_default()
    }

    /// Next boot's reservation differs from what the running kernel booted with
    pub fn reboot_required(&self, facts: &BootFacts) -> bool {
        self.current_reservation() != facts.crash_kernel_param
    }
}
