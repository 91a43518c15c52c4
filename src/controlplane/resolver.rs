//! Node Resolver
//!
//! Maps a node name to the mount path and volume group a new volume is
//! carved from.

use crate::config::{CanonicalConfig, ConfigStore, DEFAULT_NODE};
use crate::error::{Error, Result};
use std::sync::Arc;
use tracing::debug;

/// Where a volume for a node is placed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePlacement {
    pub mount_path: String,
    pub volume_group: String,
}

/// Resolves nodes against the store's active config
#[derive(Debug, Clone)]
pub struct NodeResolver {
    store: Arc<ConfigStore>,
}

impl NodeResolver {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self { store }
    }

    /// Resolve a node using the current config snapshot
    pub fn resolve(&self, node: &str) -> Result<NodePlacement> {
        let config = self.store.snapshot()?;
        resolve(&config, node)
    }
}

/// Resolve a node: exact entry first, then the fallback entry.
///
/// With several volume groups configured the lexicographically smallest
/// one is picked.
pub fn resolve(config: &CanonicalConfig, node: &str) -> Result<NodePlacement> {
    let storage = match config.get(node) {
        Some(storage) => storage,
        None => {
            let fallback = config.fallback().ok_or_else(|| Error::NodeNotConfigured {
                node: node.to_string(),
                fallback: DEFAULT_NODE.to_string(),
            })?;
            debug!(
                "Config doesn't contain node {}, use {} instead",
                node, DEFAULT_NODE
            );
            fallback
        }
    };

    if storage.path.is_empty() {
        return Err(Error::NoPath {
            node: node.to_string(),
        });
    }

    let volume_group = storage
        .volume_groups
        .iter()
        .next()
        .ok_or_else(|| Error::NoVolumeGroup {
            node: node.to_string(),
        })?;

    Ok(NodePlacement {
        mount_path: storage.path.clone(),
        volume_group: volume_group.clone(),
    })
}
