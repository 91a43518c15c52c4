//! Local LVM Provisioner
//!
//! Provisions node-local, host-directory-backed volumes carved out of LVM
//! volume groups. Each node exposes volume groups under a configured mount
//! path; the mapping is hot-reloaded from a config file.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │               Claim-watching framework (external)                    │
//! └───────────────────────────────┬─────────────────────────────────────┘
//!                                 │ provision / delete
//! ┌───────────────────────────────┴─────────────────────────────────────┐
//! │                     Volume Lifecycle Manager                         │
//! ├──────────────────────────────┬──────────────────────────────────────┤
//! │        Node Resolver         │           Helper Executor            │
//! │   (exact node → fallback)    │   (create → poll → always clean up)  │
//! ├──────────────────────────────┼──────────────────────────────────────┤
//! │         Config Store         │         Kubernetes Runtime           │
//! │  (RwLock snapshot, watcher)  │     (privileged node-pinned pods)    │
//! └──────────────────────────────┴──────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`config`]: Node config loading, canonicalization and hot reload
//! - [`controlplane`]: Node resolution, helper execution and volume lifecycle
//! - [`kubernetes`]: Helper pod runtime and PersistentVolume mapping
//! - [`domain`]: Core domain types and traits
//! - [`metrics`]: Prometheus metrics
//! - [`error`]: Error types and handling

pub mod config;
pub mod controlplane;
pub mod domain;
pub mod error;
pub mod kubernetes;
pub mod metrics;

// Re-export commonly used types
pub use config::{
    canonicalize, CanonicalConfig, ConfigData, ConfigStore, ConfigStoreOptions, NodeStorage,
    RawConfigEntry, RefreshOutcome, DEFAULT_NODE,
};

pub use controlplane::{
    HelperExecutor, HelperExecutorConfig, NodePlacement, NodeResolver, VolumeLifecycleManager,
    MIN_VOLUME_BYTES,
};

pub use domain::ports::{
    AccessMode, HelperAction, HelperRuntime, HelperTask, HelperUnitSpec, NodeAffinity,
    ReclaimPolicy, UnitPhase, VolumeDescriptor, VolumeProvisioner, VolumeProvisionerRef,
    VolumeRequest,
};

pub use error::{Error, ErrorAction, Result, ResultExt};

pub use kubernetes::KubeHelperRuntime;

pub use metrics::ProvisionerMetrics;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
