//! Kubernetes Adapters
//!
//! - `helper_pod`: helper runtime running tasks as node-pinned pods
//! - `persistent_volume`: descriptor ↔ PersistentVolume conversion

pub mod helper_pod;
pub mod persistent_volume;

pub use helper_pod::*;
pub use persistent_volume::*;
