//! Domain Ports - Core trait definitions for the provisioner
//!
//! These traits define the boundaries between the volume lifecycle logic and
//! external systems: the framework that calls Provision/Delete, and the
//! cluster API that runs helper pods.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Node label used for node affinity on provisioned volumes
pub const KEY_NODE: &str = "kubernetes.io/hostname";

/// Operator used for the node affinity match expression
pub const NODE_SELECTOR_OP_IN: &str = "In";

// =============================================================================
// Access Modes and Reclaim Policy
// =============================================================================

/// Volume access modes as requested by a claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AccessMode {
    ReadWriteOnce,
    ReadOnlyMany,
    ReadWriteMany,
    ReadWriteOncePod,
}

impl std::fmt::Display for AccessMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessMode::ReadWriteOnce => write!(f, "ReadWriteOnce"),
            AccessMode::ReadOnlyMany => write!(f, "ReadOnlyMany"),
            AccessMode::ReadWriteMany => write!(f, "ReadWriteMany"),
            AccessMode::ReadWriteOncePod => write!(f, "ReadWriteOncePod"),
        }
    }
}

impl std::str::FromStr for AccessMode {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ReadWriteOnce" => Ok(AccessMode::ReadWriteOnce),
            "ReadOnlyMany" => Ok(AccessMode::ReadOnlyMany),
            "ReadWriteMany" => Ok(AccessMode::ReadWriteMany),
            "ReadWriteOncePod" => Ok(AccessMode::ReadWriteOncePod),
            other => Err(crate::error::Error::RequestValidation(format!(
                "unknown access mode {}",
                other
            ))),
        }
    }
}

/// What happens to the backing directory when the claim is released
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ReclaimPolicy {
    #[default]
    Delete,
    Retain,
    Recycle,
}

impl std::fmt::Display for ReclaimPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReclaimPolicy::Delete => write!(f, "Delete"),
            ReclaimPolicy::Retain => write!(f, "Retain"),
            ReclaimPolicy::Recycle => write!(f, "Recycle"),
        }
    }
}

impl std::str::FromStr for ReclaimPolicy {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Delete" => Ok(ReclaimPolicy::Delete),
            "Retain" => Ok(ReclaimPolicy::Retain),
            "Recycle" => Ok(ReclaimPolicy::Recycle),
            other => Err(crate::error::Error::Configuration(format!(
                "unknown reclaim policy {}",
                other
            ))),
        }
    }
}

// =============================================================================
// Provisioning Request / Volume Descriptor
// =============================================================================

/// Request to provision a volume for a claim
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeRequest {
    /// Namespace of the claim
    pub claim_namespace: String,
    /// Name of the claim
    pub claim_name: String,
    /// Name chosen for the volume
    pub volume_name: String,
    /// Requested storage in bytes
    pub requested_bytes: Option<u64>,
    /// Requested access modes
    pub access_modes: Vec<AccessMode>,
    /// Label selector; selector-based placement is unsupported
    pub selector: Option<BTreeMap<String, String>>,
    /// Node picked by the scheduler
    pub selected_node: Option<String>,
    /// Reclaim policy of the storage class
    pub reclaim_policy: ReclaimPolicy,
}

/// One `key operator values` requirement of a node selector term
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSelectorRequirement {
    pub key: String,
    pub operator: String,
    pub values: Vec<String>,
}

/// A node selector term; all expressions must match
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSelectorTerm {
    pub match_expressions: Vec<NodeSelectorRequirement>,
}

/// Node affinity of a volume
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAffinity {
    /// Required node selector terms, `None` when the clause is absent
    pub required: Option<Vec<NodeSelectorTerm>>,
}

impl NodeAffinity {
    /// Affinity requiring an exact match on one node
    pub fn for_node(node: impl Into<String>) -> Self {
        Self {
            required: Some(vec![NodeSelectorTerm {
                match_expressions: vec![NodeSelectorRequirement {
                    key: KEY_NODE.to_string(),
                    operator: NODE_SELECTOR_OP_IN.to_string(),
                    values: vec![node.into()],
                }],
            }]),
        }
    }
}

/// Volume record produced on provision and consumed on delete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeDescriptor {
    /// Volume name
    pub name: String,
    /// Host directory backing the volume
    pub host_path: Option<String>,
    /// Node the volume is bound to
    pub node_affinity: Option<NodeAffinity>,
    /// Capacity in bytes
    pub capacity_bytes: u64,
    /// Reclaim policy
    pub reclaim_policy: ReclaimPolicy,
    /// Access modes copied from the claim
    pub access_modes: Vec<AccessMode>,
}

// =============================================================================
// Helper Task
// =============================================================================

/// Operation a helper pod performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HelperAction {
    Create,
    Delete,
}

impl HelperAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HelperAction::Create => "create",
            HelperAction::Delete => "delete",
        }
    }
}

impl std::fmt::Display for HelperAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single create or delete run on one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperTask {
    pub action: HelperAction,
    pub target_node: String,
    pub mount_path: String,
    pub volume_name: String,
    /// Positional arguments handed verbatim to the helper
    pub args: Vec<String>,
}

impl HelperTask {
    /// `create <mountPath> <vg> <dirName> <volumeName> <bytes>`
    pub fn create(
        node: &str,
        mount_path: &str,
        volume_group: &str,
        dir_name: &str,
        volume_name: &str,
        size_bytes: u64,
    ) -> Self {
        Self {
            action: HelperAction::Create,
            target_node: node.to_string(),
            mount_path: mount_path.to_string(),
            volume_name: volume_name.to_string(),
            args: vec![
                HelperAction::Create.to_string(),
                mount_path.to_string(),
                volume_group.to_string(),
                dir_name.to_string(),
                volume_name.to_string(),
                size_bytes.to_string(),
            ],
        }
    }

    /// `delete <path> <volumeName>`
    pub fn delete(node: &str, path: &str, volume_name: &str) -> Self {
        Self {
            action: HelperAction::Delete,
            target_node: node.to_string(),
            mount_path: path.to_string(),
            volume_name: volume_name.to_string(),
            args: vec![
                HelperAction::Delete.to_string(),
                path.to_string(),
                volume_name.to_string(),
            ],
        }
    }

    /// Deterministic name of the helper pod for this task
    pub fn unit_name(&self) -> String {
        format!("{}-{}", self.action, self.volume_name)
    }
}

// =============================================================================
// Helper Runtime Port
// =============================================================================

/// Everything the cluster needs to run one helper pod
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperUnitSpec {
    pub name: String,
    pub action: HelperAction,
    pub node: String,
    pub image: String,
    pub mount_path: String,
    pub args: Vec<String>,
}

/// Observed phase of a helper pod
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl UnitPhase {
    /// Map a Kubernetes pod phase string
    pub fn from_pod_phase(phase: Option<&str>) -> Self {
        match phase {
            Some("Pending") => UnitPhase::Pending,
            Some("Running") => UnitPhase::Running,
            Some("Succeeded") => UnitPhase::Succeeded,
            Some("Failed") => UnitPhase::Failed,
            _ => UnitPhase::Unknown,
        }
    }
}

impl std::fmt::Display for UnitPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitPhase::Pending => write!(f, "Pending"),
            UnitPhase::Running => write!(f, "Running"),
            UnitPhase::Succeeded => write!(f, "Succeeded"),
            UnitPhase::Failed => write!(f, "Failed"),
            UnitPhase::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Port for running helper pods on the cluster
#[async_trait]
pub trait HelperRuntime: Send + Sync {
    /// Create the helper pod; an existing pod of the same name is an error
    async fn create_unit(&self, spec: &HelperUnitSpec) -> Result<()>;

    /// Current phase of the helper pod
    async fn unit_phase(&self, name: &str) -> Result<UnitPhase>;

    /// Remove the helper pod
    async fn delete_unit(&self, name: &str) -> Result<()>;
}

// =============================================================================
// Volume Provisioner Port
// =============================================================================

/// Callbacks invoked by the claim-watching framework
#[async_trait]
pub trait VolumeProvisioner: Send + Sync {
    /// Provision a volume for a claim
    async fn provision(&self, request: VolumeRequest) -> Result<VolumeDescriptor>;

    /// Delete a previously provisioned volume
    async fn delete(&self, descriptor: &VolumeDescriptor) -> Result<()>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type HelperRuntimeRef = Arc<dyn HelperRuntime>;
pub type VolumeProvisionerRef = Arc<dyn VolumeProvisioner>;
