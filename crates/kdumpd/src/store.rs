//! Current desired configuration.
//!
//! Writers go through [`ConfigStore::set`], one at a time. Readers clone the
//! published `Arc` and never wait on an in-flight reconciliation: the
//! snapshot lock is only held to swap or clone the pointer.

use crate::atomic::write_atomic;
use crate::engine::Engine;
use crate::error::{KdumpError, Result};
use crate::reservation::directive_for;
use kdump_common::KdumpConfig;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{error, info, warn};

pub struct ConfigStore {
    engine: Arc<Engine>,
    cache_file: PathBuf,
    write_lock: Mutex<()>,
    current: RwLock<Arc<KdumpConfig>>,
}

impl ConfigStore {
    /// Store starting from the empty (disabled) configuration
    pub fn new(engine: Arc<Engine>, cache_file: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            cache_file: cache_file.into(),
            write_lock: Mutex::new(()),
            current: RwLock::new(Arc::new(KdumpConfig::default())),
        }
    }

    /// Store resuming from the cache file.
    ///
    /// A cached configuration is replayed through [`set`](Self::set) so the
    /// system is reconciled on every start. A missing or unreadable cache
    /// leaves the empty configuration and never fails startup.
    pub fn open(engine: Arc<Engine>, cache_file: impl Into<PathBuf>) -> Self {
        let store = Self::new(engine, cache_file);
        match read_cache(&store.cache_file) {
            Ok(cached) => match store.set(Some(cached)) {
                Ok(message) => info!("Restored kernel crash dump configuration: {}", message),
                Err(e) => error!("Failed to restore cached configuration: {}", e),
            },
            Err(e) => warn!("Unable to load kernel crash dump configuration cache: {}", e),
        }
        store
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Snapshot of the current configuration
    pub fn get(&self) -> Arc<KdumpConfig> {
        Arc::clone(&self.current.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Accept `new` as the desired configuration and reconcile.
    ///
    /// The cache is written before reconciling so an interrupted apply
    /// resumes on restart. The new value is published whatever the apply
    /// outcome; the returned text describes what it means for this boot
    /// and the next. Apply failures are logged, not returned.
    pub fn set(&self, new: Option<KdumpConfig>) -> Result<String> {
        let new = new.ok_or_else(|| {
            KdumpError::Config("no kernel crash dump configuration".to_string())
        })?;

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        if let Err(e) = self.write_cache(&new) {
            error!("Failed to write configuration cache: {}", e);
        }

        if let Err(e) = self.engine.apply(&new) {
            error!("Kernel crash dump configuration not fully applied: {}", e);
        }

        let message = self.engine.describe(&new);
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(new);
        info!("{}", message);
        Ok(message)
    }

    /// Validate a proposed configuration without applying it.
    ///
    /// Only an enabled configuration's reservation is checked; a disabled
    /// one releases the reservation whatever it says.
    pub fn check(&self, proposed: &KdumpConfig) -> Result<()> {
        if proposed.enable {
            directive_for(&proposed.reserved_memory.as_spec())?;
        }
        Ok(())
    }

    fn write_cache(&self, config: &KdumpConfig) -> Result<()> {
        let data = serde_json::to_vec_pretty(config)?;
        write_atomic(&self.cache_file, &data, 0o600)
    }
}

fn read_cache(path: &Path) -> Result<KdumpConfig> {
    let raw = fs::read(path).map_err(|e| KdumpError::io(format!("read {}", path.display()), e))?;
    Ok(serde_json::from_slice(&raw)?)
}
