//! Reconciliation engine.
//!
//! Applies a desired configuration to the boot loader and the capture
//! service, and derives the observable status from kernel facts, the boot
//! loader and the crash directory. Reconciliation is not transactional: the
//! reservation and service steps fail independently and a later failure
//! does not undo an earlier step.

use crate::error::{KdumpError, Result};
use crate::facts::{BootFacts, FactReader};
use crate::inventory::{DumpSniffer, FileCommand, Inventory, KdumpSignature};
use crate::reservation::{BootEnv, GrubEditEnv, Reservation};
use crate::service::{ServiceActivator, ServiceManager, Systemctl};
use crate::settings::{Settings, SnifferKind};
use kdump_common::{KdumpConfig, KdumpStatus, ServiceState};
use std::sync::{Arc, RwLock};
use tracing::{error, info};

/// External tools the engine drives
#[derive(Clone)]
pub struct Collaborators {
    pub boot_env: Arc<dyn BootEnv>,
    pub services: Arc<dyn ServiceManager>,
    pub sniffer: Arc<dyn DumpSniffer>,
}

impl Collaborators {
    /// The real grub environment, systemd and dump sniffer
    pub fn system(settings: &Settings) -> Self {
        let sniffer: Arc<dyn DumpSniffer> = match settings.paths.sniffer {
            SnifferKind::File => Arc::new(FileCommand::new(&settings.paths.file_cmd)),
            SnifferKind::Signature => Arc::new(KdumpSignature),
        };
        Self {
            boot_env: Arc::new(GrubEditEnv::new(&settings.paths.grub_editenv)),
            services: Arc::new(Systemctl),
            sniffer,
        }
    }
}

pub struct Engine {
    facts: RwLock<BootFacts>,
    reader: FactReader,
    reservation: Reservation,
    activator: ServiceActivator,
    inventory: Inventory,
}

impl Engine {
    /// Build an engine against an explicit boot-time snapshot
    pub fn new(settings: &Settings, collaborators: Collaborators, facts: BootFacts) -> Self {
        Self {
            facts: RwLock::new(facts),
            reader: FactReader::new(&settings.paths),
            reservation: Reservation::new(collaborators.boot_env),
            activator: ServiceActivator::new(collaborators.services, settings),
            inventory: Inventory::new(&settings.paths.crash_dir, collaborators.sniffer),
        }
    }

    /// Build an engine on the real system, reading boot facts now
    pub fn from_settings(settings: &Settings) -> Self {
        let facts = FactReader::new(&settings.paths).boot_facts();
        info!(
            "Boot facts: reserved={} crashkernel={:?} last_boot_crashed={}",
            facts.reserved_memory,
            facts.crash_kernel_param,
            facts.last_boot_crash.is_some()
        );
        Self::new(settings, Collaborators::system(settings), facts)
    }

    /// Boot-time snapshot in use
    pub fn facts(&self) -> BootFacts {
        self.facts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Re-read boot facts
    pub fn refresh(&self) {
        let fresh = self.reader.boot_facts();
        *self.facts.write().unwrap_or_else(|e| e.into_inner()) = fresh;
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    /// Reconcile the system with `desired`.
    ///
    /// Both steps always run; their failures are returned together.
    pub fn apply(&self, desired: &KdumpConfig) -> Result<()> {
        let facts = self.facts();
        let mut errors = Vec::new();

        // Reservation follows the raw flag; zero retention still reserves
        if desired.enable {
            if let Err(e) = self
                .reservation
                .set_reservation(&desired.reserved_memory.as_spec())
            {
                error!("Failed to set up boot loader to reserve memory next boot: {}", e);
                errors.push(e);
            }
        } else if let Err(e) = self.reservation.set_reservation("0") {
            error!("Failed to release reserved memory: {}", e);
            errors.push(e);
        }

        if desired.is_enabled() {
            match self
                .activator
                .enable(desired.files_to_save, desired.delete_old_files, &facts)
            {
                Ok(()) => info!(
                    "Kdump enabled: enable={} files_to_save={:?} delete_old_files={} reserved_memory={}",
                    desired.enable, desired.files_to_save, desired.delete_old_files, desired.reserved_memory
                ),
                Err(e) => {
                    error!("Failed to enable kernel crash dump: {}", e);
                    errors.push(e);
                }
            }
        } else {
            self.activator.disable(!desired.enable);
            info!("Kdump disabled");
        }

        KdumpError::combine(errors)
    }

    /// Next boot's reservation differs from the running kernel's
    pub fn reboot_required(&self) -> bool {
        self.reservation.reboot_required(&self.facts())
    }

    pub fn is_capture_loaded(&self) -> bool {
        self.reader.is_capture_loaded()
    }

    /// The dump service recorded a crash before this boot
    pub fn last_boot_crashed(&self) -> bool {
        self.facts().last_boot_crash.is_some()
    }

    pub fn service_state(&self, config: &KdumpConfig) -> ServiceState {
        if self.is_capture_loaded() {
            return ServiceState::Running;
        }
        derive_service_state(false, config.is_enabled(), self.reboot_required())
    }

    /// Status snapshot for `config`
    pub fn status(&self, config: &KdumpConfig) -> KdumpStatus {
        let facts = self.facts();
        let loaded = self.is_capture_loaded();
        let need_reboot = self.reservation.reboot_required(&facts);
        KdumpStatus {
            service_state: derive_service_state(loaded, config.is_enabled(), need_reboot),
            reserved_memory: facts.reserved_memory,
            need_reboot,
            rebooted_after_system_crash: config.is_enabled() && facts.last_boot_crash.is_some(),
            crash_dumps: self.inventory.entries(),
        }
    }

    /// What `config` means for this boot and the next, for display
    pub fn describe(&self, config: &KdumpConfig) -> String {
        let outlook = Outlook {
            loaded: self.is_capture_loaded(),
            reboot: self.reboot_required(),
            reserved: self.facts().reserved_memory != 0,
        };
        outlook.describe(config)
    }
}

fn derive_service_state(loaded: bool, enabled: bool, need_reboot: bool) -> ServiceState {
    if loaded {
        ServiceState::Running
    } else if enabled && !need_reboot {
        ServiceState::Error
    } else {
        ServiceState::Disabled
    }
}

/// Inputs of the post-change description
#[derive(Debug, Clone, Copy)]
struct Outlook {
    loaded: bool,
    reboot: bool,
    reserved: bool,
}

impl Outlook {
    fn describe(&self, config: &KdumpConfig) -> String {
        let memory = match (self.reboot, self.reserved, config.enable) {
            (true, true, true) => "Reserved Memory changes will take effect on next boot.",
            (true, true, false) => "Reseved memory will be released on next boot.",
            (true, false, true) => "Memory will be reserved on next boot.",
            _ => "",
        };

        let state = if config.is_enabled() {
            if self.loaded {
                "Kernel crash dump is enabled."
            } else if self.reboot {
                "kernel crash dump will be enabled on next-boot."
            } else {
                "ERROR: kernel crash dump is not enabled."
            }
        } else if !self.loaded {
            "kernel crash dump is disabled."
        } else {
            "Error: Failed to disable kernel crash dump capture."
        };

        format!("{} {}", state, memory)
    }
}
