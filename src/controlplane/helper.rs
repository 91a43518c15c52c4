//! Helper Executor
//!
//! Runs one create or delete task as a privileged helper pod pinned to the
//! volume's node, polls it until it succeeds or the attempt budget runs out,
//! and removes the pod exactly once whatever the outcome.
//!
//! ```text
//! Created ──► Polling ──┬─► Succeeded ──┐
//!                       ├─► Failed ─────┼──► Cleaned
//!                       └─► TimedOut ───┘
//! ```

use crate::config::clean_path;
use crate::domain::ports::{HelperRuntimeRef, HelperTask, HelperUnitSpec, UnitPhase};
use crate::error::{Error, Result, ResultExt};
use crate::metrics::ProvisionerMetrics;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the helper executor
#[derive(Debug, Clone)]
pub struct HelperExecutorConfig {
    /// Image the helper pod runs
    pub image: String,
    /// Delay between two phase queries
    pub poll_interval: Duration,
    /// Number of phase queries before giving up
    pub max_poll_attempts: u32,
}

impl Default for HelperExecutorConfig {
    fn default() -> Self {
        Self {
            image: "local-lvm-provisioner-helper:latest".to_string(),
            poll_interval: Duration::from_secs(1),
            max_poll_attempts: 120,
        }
    }
}

// =============================================================================
// Cleanup Guard
// =============================================================================

/// Deletes the helper pod when released, or from `Drop` if the dispatch
/// future is abandoned before it gets there.
struct CleanupGuard {
    runtime: Option<HelperRuntimeRef>,
    pod: String,
}

impl CleanupGuard {
    fn new(runtime: HelperRuntimeRef, pod: String) -> Self {
        Self {
            runtime: Some(runtime),
            pod,
        }
    }

    async fn release(mut self) {
        if let Some(runtime) = self.runtime.take() {
            delete_helper_pod(runtime, &self.pod).await;
        }
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        let Some(runtime) = self.runtime.take() else {
            return;
        };
        let pod = std::mem::take(&mut self.pod);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { delete_helper_pod(runtime, &pod).await });
            }
            Err(_) => error!("Unable to delete the helper pod {}: no runtime", pod),
        }
    }
}

async fn delete_helper_pod(runtime: HelperRuntimeRef, pod: &str) {
    if let Err(e) = runtime.delete_unit(pod).await {
        let err = Error::Cleanup {
            pod: pod.to_string(),
            reason: e.to_string(),
        };
        error!("{}", err);
    }
}

// =============================================================================
// Helper Executor
// =============================================================================

/// Dispatches helper tasks through a [`HelperRuntime`](crate::domain::ports::HelperRuntime)
pub struct HelperExecutor {
    config: HelperExecutorConfig,
    runtime: HelperRuntimeRef,
    metrics: Arc<ProvisionerMetrics>,
}

impl HelperExecutor {
    pub fn new(
        config: HelperExecutorConfig,
        runtime: HelperRuntimeRef,
        metrics: Arc<ProvisionerMetrics>,
    ) -> Self {
        Self {
            config,
            runtime,
            metrics,
        }
    }

    pub fn config(&self) -> &HelperExecutorConfig {
        &self.config
    }

    /// Run a task to completion; errors carry the action and volume name
    pub async fn dispatch(&self, task: &HelperTask) -> Result<()> {
        self.run(task)
            .await
            .context(task.action.as_str(), &task.volume_name)
    }

    async fn run(&self, task: &HelperTask) -> Result<()> {
        if task.volume_name.is_empty() || task.target_node.is_empty() {
            return Err(Error::Execution("invalid empty name or node".into()));
        }
        let path = clean_path(&task.mount_path);
        if !path.starts_with('/') || path == "/" {
            return Err(Error::Execution(format!(
                "invalid path {} for {}",
                task.mount_path, task.action
            )));
        }

        let spec = HelperUnitSpec {
            name: task.unit_name(),
            action: task.action,
            node: task.target_node.clone(),
            image: self.config.image.clone(),
            mount_path: task.mount_path.clone(),
            args: task.args.clone(),
        };

        let started = Instant::now();
        self.runtime.create_unit(&spec).await?;
        let guard = CleanupGuard::new(Arc::clone(&self.runtime), spec.name.clone());

        let outcome = self.wait_for_completion(&spec.name).await;
        guard.release().await;

        self.metrics
            .observe_helper(task.action, started.elapsed(), outcome.is_ok());
        outcome?;

        info!(
            "Volume {} has been {}d on {}:{}",
            task.volume_name, task.action, task.target_node, path
        );
        Ok(())
    }

    async fn wait_for_completion(&self, pod: &str) -> Result<()> {
        let mut last_phase = UnitPhase::Unknown;

        for attempt in 1..=self.config.max_poll_attempts {
            let phase = self.runtime.unit_phase(pod).await?;
            if phase == UnitPhase::Succeeded {
                return Ok(());
            }
            if phase == UnitPhase::Failed && last_phase != UnitPhase::Failed {
                warn!("Helper pod {} reported phase Failed", pod);
            }
            debug!(pod, attempt, %phase, "Helper pod not finished yet");

            last_phase = phase;
            tokio::time::sleep(self.config.poll_interval).await;
        }

        Err(Error::Timeout {
            pod: pod.to_string(),
            attempts: self.config.max_poll_attempts,
            last_phase: last_phase.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controlplane::testing::{ScriptedRuntime, Step};
    use assert_matches::assert_matches;

    fn executor(runtime: Arc<ScriptedRuntime>, attempts: u32) -> HelperExecutor {
        let config = HelperExecutorConfig {
            image: "helper:test".into(),
            poll_interval: Duration::from_millis(1),
            max_poll_attempts: attempts,
        };
        HelperExecutor::new(config, runtime, ProvisionerMetrics::new().unwrap())
    }

    fn create_task() -> HelperTask {
        HelperTask::create("n1", "/data", "vg0", "ns-claim1", "pvc-1", 8 * 1024 * 1024)
    }

    #[tokio::test]
    async fn test_dispatch_success() {
        let runtime = Arc::new(ScriptedRuntime::new(
            vec![
                Step::Phase(UnitPhase::Pending),
                Step::Phase(UnitPhase::Running),
            ],
            UnitPhase::Succeeded,
        ));
        let executor = executor(runtime.clone(), 10);

        executor.dispatch(&create_task()).await.unwrap();

        assert_eq!(runtime.query_count(), 3);
        assert_eq!(runtime.deleted_count(), 1);

        let created = runtime.created.lock();
        assert_eq!(created.len(), 1);
        let spec = &created[0];
        assert_eq!(spec.name, "create-pvc-1");
        assert_eq!(spec.node, "n1");
        assert_eq!(spec.image, "helper:test");
        assert_eq!(spec.mount_path, "/data");
        assert_eq!(
            spec.args,
            vec!["create", "/data", "vg0", "ns-claim1", "pvc-1", "8388608"]
        );
    }

    #[tokio::test]
    async fn test_dispatch_timeout() {
        let runtime = Arc::new(ScriptedRuntime::stuck(UnitPhase::Running));
        let executor = executor(runtime.clone(), 5);

        let err = executor.dispatch(&create_task()).await.unwrap_err();

        assert_matches!(
            err.root(),
            Error::Timeout { attempts: 5, last_phase, .. } if last_phase == "Running"
        );
        assert_matches!(
            &err,
            Error::Operation { action, volume, .. } if action == "create" && volume == "pvc-1"
        );
        assert_eq!(runtime.query_count(), 5);
        assert_eq!(runtime.deleted_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_phase_times_out() {
        let runtime = Arc::new(ScriptedRuntime::stuck(UnitPhase::Failed));
        let executor = executor(runtime.clone(), 3);

        let err = executor.dispatch(&create_task()).await.unwrap_err();
        assert_matches!(err.root(), Error::Timeout { last_phase, .. } if last_phase == "Failed");
        assert_eq!(runtime.deleted_count(), 1);
    }

    #[tokio::test]
    async fn test_succeeds_on_last_attempt() {
        let runtime = Arc::new(ScriptedRuntime::new(
            vec![
                Step::Phase(UnitPhase::Pending),
                Step::Phase(UnitPhase::Pending),
                Step::Phase(UnitPhase::Succeeded),
            ],
            UnitPhase::Pending,
        ));
        let executor = executor(runtime.clone(), 3);

        executor.dispatch(&create_task()).await.unwrap();
        assert_eq!(runtime.deleted_count(), 1);
    }

    #[tokio::test]
    async fn test_query_error_stops_polling() {
        let runtime = Arc::new(ScriptedRuntime::new(
            vec![Step::Phase(UnitPhase::Pending), Step::QueryError],
            UnitPhase::Succeeded,
        ));
        let executor = executor(runtime.clone(), 10);

        let err = executor.dispatch(&create_task()).await.unwrap_err();
        assert_matches!(err.root(), Error::Execution(_));
        assert_eq!(runtime.query_count(), 2);
        assert_eq!(runtime.deleted_count(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_failure_does_not_change_outcome() {
        let runtime = Arc::new(ScriptedRuntime::succeeding().failing_delete());
        let executor = executor(runtime.clone(), 10);

        executor.dispatch(&create_task()).await.unwrap();
        assert_eq!(runtime.deleted_count(), 1);
    }

    #[tokio::test]
    async fn test_create_failure_skips_cleanup() {
        let runtime = Arc::new(ScriptedRuntime::succeeding().failing_create());
        let executor = executor(runtime.clone(), 10);

        let err = executor.dispatch(&create_task()).await.unwrap_err();
        assert_matches!(err.root(), Error::Execution(_));
        assert_eq!(runtime.query_count(), 0);
        assert_eq!(runtime.deleted_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_dispatch_is_detected() {
        let runtime = Arc::new(ScriptedRuntime::succeeding().with_live_unit("create-pvc-1"));
        let executor = executor(runtime.clone(), 10);

        let err = executor.dispatch(&create_task()).await.unwrap_err();
        assert_matches!(err.root(), Error::ResourceExists { name, .. } if name == "create-pvc-1");
        // The pod belongs to the other dispatch and is left alone
        assert_eq!(runtime.deleted_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_tasks_rejected() {
        let runtime = Arc::new(ScriptedRuntime::succeeding());
        let executor = executor(runtime.clone(), 10);

        let root_path = HelperTask::delete("n1", "/", "pvc-1");
        let err = executor.dispatch(&root_path).await.unwrap_err();
        assert_matches!(err.root(), Error::Execution(_));

        let relative = HelperTask::delete("n1", "data", "pvc-1");
        let err = executor.dispatch(&relative).await.unwrap_err();
        assert_matches!(err.root(), Error::Execution(_));

        let no_node = HelperTask::delete("", "/data", "pvc-1");
        let err = executor.dispatch(&no_node).await.unwrap_err();
        assert_matches!(err.root(), Error::Execution(_));

        assert_eq!(runtime.created_count(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_dispatch_still_cleans_up() {
        let runtime = Arc::new(ScriptedRuntime::stuck(UnitPhase::Running));
        let config = HelperExecutorConfig {
            image: "helper:test".into(),
            poll_interval: Duration::from_secs(60),
            max_poll_attempts: 120,
        };
        let metrics = ProvisionerMetrics::new().unwrap();
        let executor = HelperExecutor::new(config, runtime.clone(), metrics);

        let result =
            tokio::time::timeout(Duration::from_millis(50), executor.dispatch(&create_task()))
                .await;
        assert!(result.is_err());

        for _ in 0..50 {
            if runtime.deleted_count() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(runtime.deleted_count(), 1);
    }
}
