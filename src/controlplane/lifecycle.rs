//! Volume Lifecycle Manager
//!
//! Entry points called by the claim-watching framework. Provision validates
//! the claim, resolves the node's mount path and volume group and runs a
//! create helper; Delete recovers path and node from the descriptor and runs
//! a delete helper unless the volume is retained.

use super::helper::HelperExecutor;
use super::resolver::NodeResolver;
use crate::config::{join_path, parent_dir};
use crate::domain::ports::{
    AccessMode, HelperAction, HelperTask, NodeAffinity, ReclaimPolicy, VolumeDescriptor,
    VolumeProvisioner, VolumeRequest, KEY_NODE, NODE_SELECTOR_OP_IN,
};
use crate::error::{Error, Result, ResultExt};
use crate::metrics::ProvisionerMetrics;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Smallest volume the provisioner will create (4 MiB)
pub const MIN_VOLUME_BYTES: u64 = 4 * 1024 * 1024;

/// Drives provisioning and deletion of node-local volumes
pub struct VolumeLifecycleManager {
    resolver: NodeResolver,
    executor: HelperExecutor,
    metrics: Arc<ProvisionerMetrics>,
}

impl VolumeLifecycleManager {
    pub fn new(
        resolver: NodeResolver,
        executor: HelperExecutor,
        metrics: Arc<ProvisionerMetrics>,
    ) -> Arc<Self> {
        Arc::new(Self {
            resolver,
            executor,
            metrics,
        })
    }

    /// Provision a volume for a claim
    pub async fn provision(&self, request: VolumeRequest) -> Result<VolumeDescriptor> {
        let result = self.provision_volume(request).await;
        self.metrics.record_provision(result.is_ok());
        result
    }

    /// Delete a provisioned volume, honoring its reclaim policy
    pub async fn delete(&self, descriptor: &VolumeDescriptor) -> Result<()> {
        let result = self.delete_volume(descriptor).await;
        self.metrics.record_delete(result.is_ok());
        result
    }

    async fn provision_volume(&self, request: VolumeRequest) -> Result<VolumeDescriptor> {
        let (node, size) = validate_request(&request)?;
        let node = node.to_string();
        let placement = self.resolver.resolve(&node)?;

        let dir_name = format!("{}-{}", request.claim_namespace, request.claim_name);
        let host_path = join_path(&placement.mount_path, &dir_name);
        info!(
            "Creating volume {} ({}/{}) at {}:{}",
            request.volume_name, request.claim_namespace, request.claim_name, node, host_path
        );

        let task = HelperTask::create(
            &node,
            &placement.mount_path,
            &placement.volume_group,
            &dir_name,
            &request.volume_name,
            size,
        );
        self.executor.dispatch(&task).await?;

        Ok(VolumeDescriptor {
            name: request.volume_name,
            host_path: Some(host_path),
            capacity_bytes: size,
            node_affinity: Some(NodeAffinity::for_node(node)),
            reclaim_policy: request.reclaim_policy,
            access_modes: request.access_modes,
        })
    }

    async fn delete_volume(&self, descriptor: &VolumeDescriptor) -> Result<()> {
        let action = HelperAction::Delete.as_str();
        let (path, node) = path_and_node(descriptor).context(action, &descriptor.name)?;

        if descriptor.reclaim_policy == ReclaimPolicy::Retain {
            info!("Retained volume {}", descriptor.name);
            return Ok(());
        }

        info!("Deleting volume {} at {}:{}", descriptor.name, node, path);
        let task = HelperTask::delete(&node, &path, &descriptor.name);
        if let Err(e) = self.executor.dispatch(&task).await {
            info!("Clean up volume {} failed: {}", descriptor.name, e);
            return Err(e);
        }
        Ok(())
    }
}

#[async_trait]
impl VolumeProvisioner for VolumeLifecycleManager {
    async fn provision(&self, request: VolumeRequest) -> Result<VolumeDescriptor> {
        VolumeLifecycleManager::provision(self, request).await
    }

    async fn delete(&self, descriptor: &VolumeDescriptor) -> Result<()> {
        VolumeLifecycleManager::delete(self, descriptor).await
    }
}

/// Check a request, returning the selected node and requested size
fn validate_request(request: &VolumeRequest) -> Result<(&str, u64)> {
    if request.selector.is_some() {
        return Err(Error::RequestValidation(
            "claim.Spec.Selector is not supported".into(),
        ));
    }
    if let Some(mode) = request
        .access_modes
        .iter()
        .find(|mode| **mode != AccessMode::ReadWriteOnce)
    {
        return Err(Error::RequestValidation(format!(
            "only ReadWriteOnce access mode is supported, got {}",
            mode
        )));
    }
    let node = request
        .selected_node
        .as_deref()
        .ok_or_else(|| Error::RequestValidation("no node was specified".into()))?;
    let size = request.requested_bytes.ok_or_else(|| {
        Error::RequestValidation("claim without storage size request".into())
    })?;
    if size < MIN_VOLUME_BYTES {
        return Err(Error::RequestValidation(format!(
            "volume needs to be at least 4MiB in size, requested {} bytes",
            size
        )));
    }
    Ok((node, size))
}

/// Recover the managed directory and the node from a descriptor
fn path_and_node(descriptor: &VolumeDescriptor) -> Result<(String, String)> {
    let host_path = descriptor
        .host_path
        .as_deref()
        .ok_or_else(|| Error::RequestValidation("no HostPath set".into()))?;
    let path = parent_dir(host_path);
    if path == "." || path == "/" {
        return Err(Error::RequestValidation(format!(
            "invalid HostPath {} set",
            host_path
        )));
    }

    let affinity = descriptor
        .node_affinity
        .as_ref()
        .ok_or_else(|| Error::RequestValidation("no NodeAffinity set".into()))?;
    let terms = affinity
        .required
        .as_ref()
        .ok_or_else(|| Error::RequestValidation("no NodeAffinity.Required set".into()))?;

    let expression = terms
        .iter()
        .flat_map(|term| term.match_expressions.iter())
        .find(|expr| expr.key == KEY_NODE && expr.operator == NODE_SELECTOR_OP_IN)
        .ok_or_else(|| Error::RequestValidation("cannot find affinity node".into()))?;

    match expression.values.as_slice() {
        [node] if !node.is_empty() => Ok((path, node.clone())),
        [_] => Err(Error::RequestValidation("cannot find affinity node".into())),
        values => Err(Error::RequestValidation(format!(
            "expected exactly one value for the node affinity, found {}",
            values.len()
        ))),
    }
}
