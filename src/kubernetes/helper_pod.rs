//! Kubernetes Helper Runtime
//!
//! Runs helper tasks as privileged pods pinned to the target node through
//! the Kubernetes API.

use crate::domain::ports::{HelperRuntime, HelperUnitSpec, UnitPhase};
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    Container, HostPathVolumeSource, Pod, PodSpec, SecurityContext, Toleration, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, PostParams};
use kube::Client;
use tracing::debug;

/// Name of the host path volume inside the helper pod
const DATA_VOLUME: &str = "data";

/// Host path type used for the mount path
pub const HOST_PATH_DIRECTORY_OR_CREATE: &str = "DirectoryOrCreate";

/// Helper runtime backed by pods in one namespace
#[derive(Clone)]
pub struct KubeHelperRuntime {
    pods: Api<Pod>,
    namespace: String,
}

impl KubeHelperRuntime {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            pods: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

#[async_trait]
impl HelperRuntime for KubeHelperRuntime {
    async fn create_unit(&self, spec: &HelperUnitSpec) -> Result<()> {
        let pod = helper_pod(spec);
        match self.pods.create(&PostParams::default(), &pod).await {
            Ok(_) => {
                debug!("Created helper pod {}/{}", self.namespace, spec.name);
                Ok(())
            }
            Err(kube::Error::Api(response)) if response.code == 409 => Err(Error::ResourceExists {
                kind: "Pod".into(),
                name: spec.name.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn unit_phase(&self, name: &str) -> Result<UnitPhase> {
        let pod = self.pods.get(name).await?;
        let phase = pod.status.as_ref().and_then(|status| status.phase.as_deref());
        Ok(UnitPhase::from_pod_phase(phase))
    }

    async fn delete_unit(&self, name: &str) -> Result<()> {
        self.pods.delete(name, &DeleteParams::default()).await?;
        debug!("Deleted helper pod {}/{}", self.namespace, name);
        Ok(())
    }
}

/// Build the pod that runs one helper task
pub fn helper_pod(spec: &HelperUnitSpec) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(spec.name.clone()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            restart_policy: Some("Never".to_string()),
            node_name: Some(spec.node.clone()),
            host_pid: Some(true),
            tolerations: Some(vec![Toleration {
                operator: Some("Exists".to_string()),
                ..Default::default()
            }]),
            containers: vec![Container {
                name: format!("local-lvm-{}", spec.action),
                image: Some(spec.image.clone()),
                args: Some(spec.args.clone()),
                volume_mounts: Some(vec![VolumeMount {
                    name: DATA_VOLUME.to_string(),
                    read_only: Some(false),
                    mount_path: spec.mount_path.clone(),
                    ..Default::default()
                }]),
                security_context: Some(SecurityContext {
                    privileged: Some(true),
                    ..Default::default()
                }),
                ..Default::default()
            }],
            volumes: Some(vec![Volume {
                name: DATA_VOLUME.to_string(),
                host_path: Some(HostPathVolumeSource {
                    path: spec.mount_path.clone(),
                    type_: Some(HOST_PATH_DIRECTORY_OR_CREATE.to_string()),
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
