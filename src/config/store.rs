//! Config Store
//!
//! Owns the active node → volume group mapping. Reloads run load and
//! validation outside the lock; the write lock is held only to swap the
//! snapshot, so resolution calls never observe a half-applied config.
//! Reloads themselves are serialized so an older read never replaces a
//! newer one.

use super::canonical::{canonicalize, CanonicalConfig, ConfigData};
use crate::error::{Error, Result};
use crate::metrics::{ProvisionerMetrics, ReloadResult};
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

// =============================================================================
// Configuration
// =============================================================================

/// Where the config comes from and how often it is re-read
#[derive(Debug, Clone)]
pub struct ConfigStoreOptions {
    /// Config file path (JSON, or YAML for `.yaml`/`.yml`)
    pub path: PathBuf,
    /// Interval between background refreshes
    pub reload_interval: Duration,
}

impl Default for ConfigStoreOptions {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/etc/config/config.json"),
            reload_interval: Duration::from_secs(5),
        }
    }
}

/// Result of a single refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Loaded config equals the active one; nothing was swapped
    Unchanged,
    /// A new config was validated and swapped in
    Applied,
}

/// The raw document together with the canonical config built from it
#[derive(Debug)]
struct ActiveConfig {
    raw: ConfigData,
    config: Arc<CanonicalConfig>,
}

// =============================================================================
// Config Store
// =============================================================================

/// Hot-reloadable holder of the active node configuration
pub struct ConfigStore {
    options: ConfigStoreOptions,
    active: RwLock<Option<Arc<ActiveConfig>>>,
    /// Held from load until swap
    refresh_lock: tokio::sync::Mutex<()>,
    metrics: Arc<ProvisionerMetrics>,
    shutdown_tx: broadcast::Sender<()>,
    stopped: AtomicBool,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore")
            .field("path", &self.options.path)
            .field("initialized", &self.active.read().is_some())
            .finish()
    }
}

impl ConfigStore {
    /// Create an empty store; call [`ConfigStore::init`] before use
    pub fn new(options: ConfigStoreOptions, metrics: Arc<ProvisionerMetrics>) -> Arc<Self> {
        let (shutdown_tx, _) = broadcast::channel(1);

        Arc::new(Self {
            options,
            active: RwLock::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
            metrics,
            shutdown_tx,
            stopped: AtomicBool::new(false),
            watcher: Mutex::new(None),
        })
    }

    pub fn options(&self) -> &ConfigStoreOptions {
        &self.options
    }

    /// Perform the first load; fails if the config is missing or invalid
    pub async fn init(&self) -> Result<()> {
        self.refresh().await?;
        info!("Node config loaded from {}", self.options.path.display());
        Ok(())
    }

    /// Read and parse the config source without touching the active config
    pub async fn load(&self) -> Result<ConfigData> {
        load_config_file(&self.options.path).await
    }

    /// Reload the config and swap it in if it changed and is valid
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        let _guard = self.refresh_lock.lock().await;
        let raw = self.load().await?;

        let unchanged = self
            .active
            .read()
            .as_ref()
            .map_or(false, |active| active.raw == raw);
        if unchanged {
            return Ok(RefreshOutcome::Unchanged);
        }

        let config = canonicalize(&raw)?;
        let applied = serde_json::to_string(&raw)?;

        let next = Arc::new(ActiveConfig {
            raw,
            config: Arc::new(config),
        });
        *self.active.write() = Some(next);

        info!("Applied config: {}", applied);
        Ok(RefreshOutcome::Applied)
    }

    /// The active canonical config
    pub fn snapshot(&self) -> Result<Arc<CanonicalConfig>> {
        self.active
            .read()
            .as_ref()
            .map(|active| Arc::clone(&active.config))
            .ok_or(Error::ConfigNotInitialized)
    }

    /// Start refreshing in the background until [`ConfigStore::stop`]
    ///
    /// Does nothing once the store has been stopped.
    pub fn spawn_watcher(self: &Arc<Self>) {
        let store = Arc::clone(self);
        // Subscribe before checking the flag so a concurrent stop is seen
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        if self.stopped.load(Ordering::SeqCst) {
            debug!("Config store stopped, not starting watcher");
            return;
        }

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(store.options.reload_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => store.refresh_and_record().await,
                    _ = shutdown_rx.recv() => {
                        info!("Stop watching config file");
                        return;
                    }
                }
            }
        });

        if let Some(previous) = self.watcher.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Signal the watcher to exit and wait for it
    pub async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
        let handle = self.watcher.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    async fn refresh_and_record(&self) {
        match self.refresh().await {
            Ok(RefreshOutcome::Applied) => self.metrics.record_reload(ReloadResult::Applied),
            Ok(RefreshOutcome::Unchanged) => {
                debug!("Config file unchanged");
                self.metrics.record_reload(ReloadResult::Unchanged);
            }
            Err(e) => {
                error!("Failed to load the new config file: {}", e);
                self.metrics.record_reload(ReloadResult::Failed);
            }
        }
    }
}

/// Read and parse a config file
pub async fn load_config_file(path: &Path) -> Result<ConfigData> {
    let read_error = |reason: String| Error::ConfigRead {
        path: path.display().to_string(),
        reason,
    };

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| read_error(e.to_string()))?;

    let is_yaml = matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    );
    if is_yaml {
        serde_yaml::from_str(&content).map_err(|e| read_error(e.to_string()))
    } else {
        serde_json::from_str(&content).map_err(|e| read_error(e.to_string()))
    }
}
