//! PersistentVolume Mapping
//!
//! Converts between [`VolumeDescriptor`] and the `PersistentVolume` objects
//! the claim-watching framework registers with the cluster.

use super::helper_pod::HOST_PATH_DIRECTORY_OR_CREATE;
use crate::domain::ports::{
    AccessMode, NodeAffinity, NodeSelectorRequirement, NodeSelectorTerm, ReclaimPolicy,
    VolumeDescriptor,
};
use crate::error::{Error, Result};
use k8s_openapi::api::core::v1::{
    HostPathVolumeSource, NodeSelector, NodeSelectorRequirement as KubeRequirement,
    NodeSelectorTerm as KubeTerm, PersistentVolume, PersistentVolumeSpec, VolumeNodeAffinity,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use tracing::debug;

/// Capacity key of a volume's resource list
const RESOURCE_STORAGE: &str = "storage";

/// Volume mode of every provisioned volume
const VOLUME_MODE_FILESYSTEM: &str = "Filesystem";

impl VolumeDescriptor {
    /// Build the PersistentVolume object for this descriptor
    pub fn to_persistent_volume(&self) -> PersistentVolume {
        let capacity = BTreeMap::from([(
            RESOURCE_STORAGE.to_string(),
            Quantity(self.capacity_bytes.to_string()),
        )]);

        PersistentVolume {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                ..Default::default()
            },
            spec: Some(PersistentVolumeSpec {
                persistent_volume_reclaim_policy: Some(self.reclaim_policy.to_string()),
                access_modes: Some(self.access_modes.iter().map(ToString::to_string).collect()),
                volume_mode: Some(VOLUME_MODE_FILESYSTEM.to_string()),
                capacity: Some(capacity),
                host_path: self.host_path.as_ref().map(|path| HostPathVolumeSource {
                    path: path.clone(),
                    type_: Some(HOST_PATH_DIRECTORY_OR_CREATE.to_string()),
                }),
                node_affinity: self.node_affinity.as_ref().map(to_kube_affinity),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

impl TryFrom<&PersistentVolume> for VolumeDescriptor {
    type Error = Error;

    /// Missing host path or affinity come back as `None` so that deletion
    /// reports exactly what is wrong with the volume.
    fn try_from(pv: &PersistentVolume) -> Result<Self> {
        let name = pv
            .metadata
            .name
            .clone()
            .ok_or_else(|| Error::RequestValidation("PersistentVolume without name".into()))?;
        let spec = pv.spec.clone().unwrap_or_default();

        let reclaim_policy = match spec.persistent_volume_reclaim_policy.as_deref() {
            Some(policy) => policy.parse()?,
            None => ReclaimPolicy::default(),
        };

        let capacity_bytes = spec
            .capacity
            .as_ref()
            .and_then(|capacity| capacity.get(RESOURCE_STORAGE))
            .and_then(|quantity| {
                let parsed = parse_quantity(&quantity.0);
                if parsed.is_none() {
                    debug!("Unparsable capacity {} on volume {}", quantity.0, name);
                }
                parsed
            })
            .unwrap_or(0);

        let access_modes = spec
            .access_modes
            .unwrap_or_default()
            .iter()
            .filter_map(|mode| mode.parse::<AccessMode>().ok())
            .collect();

        Ok(VolumeDescriptor {
            host_path: spec.host_path.map(|source| source.path),
            node_affinity: spec.node_affinity.map(from_kube_affinity),
            name,
            capacity_bytes,
            reclaim_policy,
            access_modes,
        })
    }
}

fn to_kube_affinity(affinity: &NodeAffinity) -> VolumeNodeAffinity {
    VolumeNodeAffinity {
        required: affinity.required.as_ref().map(|terms| NodeSelector {
            node_selector_terms: terms
                .iter()
                .map(|term| KubeTerm {
                    match_expressions: Some(
                        term.match_expressions
                            .iter()
                            .map(|expr| KubeRequirement {
                                key: expr.key.clone(),
                                operator: expr.operator.clone(),
                                values: Some(expr.values.clone()),
                            })
                            .collect(),
                    ),
                    match_fields: None,
                })
                .collect(),
        }),
    }
}

fn from_kube_affinity(affinity: VolumeNodeAffinity) -> NodeAffinity {
    NodeAffinity {
        required: affinity.required.map(|selector| {
            selector
                .node_selector_terms
                .into_iter()
                .map(|term| NodeSelectorTerm {
                    match_expressions: term
                        .match_expressions
                        .unwrap_or_default()
                        .into_iter()
                        .map(|expr| NodeSelectorRequirement {
                            key: expr.key,
                            operator: expr.operator,
                            values: expr.values.unwrap_or_default(),
                        })
                        .collect(),
                })
                .collect()
        }),
    }
}

/// Parse an integral Kubernetes quantity (`8388608`, `8Mi`, `1G`) into bytes
pub fn parse_quantity(quantity: &str) -> Option<u64> {
    const SUFFIXES: [(&str, u64); 12] = [
        ("Ki", 1 << 10),
        ("Mi", 1 << 20),
        ("Gi", 1 << 30),
        ("Ti", 1 << 40),
        ("Pi", 1 << 50),
        ("Ei", 1 << 60),
        ("k", 1_000),
        ("M", 1_000_000),
        ("G", 1_000_000_000),
        ("T", 1_000_000_000_000),
        ("P", 1_000_000_000_000_000),
        ("E", 1_000_000_000_000_000_000),
    ];

    let quantity = quantity.trim();
    let (digits, multiplier) = SUFFIXES
        .iter()
        .find_map(|(suffix, multiplier)| {
            quantity
                .strip_suffix(suffix)
                .map(|digits| (digits, *multiplier))
        })
        .unwrap_or((quantity, 1));

    digits.parse::<u64>().ok()?.checked_mul(multiplier)
}
