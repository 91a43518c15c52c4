//! Node Volume Group Map
//!
//! The raw configuration document as authored by operators, and its
//! validated canonical form keyed by node name.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Reserved node name whose entry applies to every node without its own entry
pub const DEFAULT_NODE: &str = "DEFAULT_VGS_FOR_NON_LISTED_NODES";

// =============================================================================
// Raw Config
// =============================================================================

/// One node entry exactly as found in the config file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawConfigEntry {
    #[serde(default, deserialize_with = "null_as_default")]
    pub node: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub path: String,
    #[serde(
        default,
        rename = "vgs",
        alias = "volumeGroups",
        deserialize_with = "null_as_default"
    )]
    pub volume_groups: Vec<String>,
}

/// The config file document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigData {
    #[serde(
        default,
        rename = "nodeVGMap",
        alias = "NodeVGMap",
        deserialize_with = "null_as_default"
    )]
    pub node_vg_map: Vec<RawConfigEntry>,
}

/// Explicit nulls read as empty values
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// =============================================================================
// Canonical Config
// =============================================================================

/// Validated storage settings for one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStorage {
    /// Cleaned absolute mount path, never `/`
    pub path: String,
    /// Volume groups, iterated in lexicographic order
    pub volume_groups: BTreeSet<String>,
}

/// Validated node → storage mapping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalConfig {
    nodes: BTreeMap<String, NodeStorage>,
}

impl CanonicalConfig {
    /// Entry configured for exactly this node
    pub fn get(&self, node: &str) -> Option<&NodeStorage> {
        self.nodes.get(node)
    }

    /// Entry for nodes that are not listed explicitly
    pub fn fallback(&self) -> Option<&NodeStorage> {
        self.nodes.get(DEFAULT_NODE)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }
}

/// Validate a raw config and build its canonical form
pub fn canonicalize(data: &ConfigData) -> Result<CanonicalConfig> {
    let mut nodes = BTreeMap::new();

    for entry in &data.node_vg_map {
        if nodes.contains_key(&entry.node) {
            return Err(Error::ConfigValidation(format!(
                "duplicate node {}",
                entry.node
            )));
        }

        if entry.path.is_empty() {
            return Err(Error::ConfigValidation(format!(
                "empty mount path on node {}",
                entry.node
            )));
        }
        if !entry.path.starts_with('/') {
            return Err(Error::ConfigValidation(format!(
                "mount path must start with / for path {} on node {}",
                entry.path, entry.node
            )));
        }
        let path = clean_path(&entry.path);
        if path == "/" {
            return Err(Error::ConfigValidation(format!(
                "cannot use root ('/') as mount path on node {}",
                entry.node
            )));
        }

        let mut volume_groups = BTreeSet::new();
        for vg in &entry.volume_groups {
            if !volume_groups.insert(vg.clone()) {
                return Err(Error::ConfigValidation(format!(
                    "duplicate volume group {} on node {}",
                    vg, entry.node
                )));
            }
        }

        nodes.insert(entry.node.clone(), NodeStorage { path, volume_groups });
    }

    Ok(CanonicalConfig { nodes })
}

// =============================================================================
// Path Helpers
// =============================================================================

/// Lexically clean a slash-separated path.
///
/// Collapses repeated separators, drops `.` segments, resolves `..` against
/// the preceding segment and strips trailing separators. `..` never climbs
/// above the root of an absolute path. An empty result is `.`.
pub fn clean_path(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if matches!(parts.last(), Some(last) if *last != "..") {
                    parts.pop();
                } else if !rooted {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    if rooted {
        format!("/{}", joined)
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// Everything but the last element of a path, cleaned
pub fn parent_dir(path: &str) -> String {
    match path.rfind('/') {
        Some(idx) => clean_path(&path[..=idx]),
        None => ".".to_string(),
    }
}

/// Join a base directory and a child name, cleaned
pub fn join_path(base: &str, child: &str) -> String {
    clean_path(&format!("{}/{}", base, child))
}
