//! Provisioner Metrics
//!
//! Prometheus counters and histograms for provision/delete outcomes,
//! helper pod runs and config reloads, kept in a dedicated registry.

use crate::domain::ports::HelperAction;
use crate::error::{Error, Result};
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Duration;

/// Outcome label value for successful operations
const RESULT_SUCCESS: &str = "success";
/// Outcome label value for failed operations
const RESULT_FAILURE: &str = "failure";

fn result_label(ok: bool) -> &'static str {
    if ok {
        RESULT_SUCCESS
    } else {
        RESULT_FAILURE
    }
}

/// Config reload outcome, as recorded in metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadResult {
    Applied,
    Unchanged,
    Failed,
}

impl ReloadResult {
    fn as_str(&self) -> &'static str {
        match self {
            ReloadResult::Applied => "applied",
            ReloadResult::Unchanged => "unchanged",
            ReloadResult::Failed => "failed",
        }
    }
}

/// Metrics shared by the store, the executor and the lifecycle manager
pub struct ProvisionerMetrics {
    registry: Registry,
    provisions: IntCounterVec,
    deletes: IntCounterVec,
    helper_duration: HistogramVec,
    config_reloads: IntCounterVec,
}

impl std::fmt::Debug for ProvisionerMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisionerMetrics").finish_non_exhaustive()
    }
}

impl ProvisionerMetrics {
    /// Create and register all metrics
    pub fn new() -> Result<Arc<Self>> {
        let registry = Registry::new();

        let provisions = IntCounterVec::new(
            Opts::new("local_lvm_provision_total", "Provision requests by result"),
            &["result"],
        )
        .map_err(metrics_error)?;
        let deletes = IntCounterVec::new(
            Opts::new("local_lvm_delete_total", "Delete requests by result"),
            &["result"],
        )
        .map_err(metrics_error)?;
        let helper_duration = HistogramVec::new(
            HistogramOpts::new(
                "local_lvm_helper_duration_seconds",
                "Time from helper pod creation to completion",
            )
            .buckets(vec![1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]),
            &["action", "result"],
        )
        .map_err(metrics_error)?;
        let config_reloads = IntCounterVec::new(
            Opts::new("local_lvm_config_reloads_total", "Config refreshes by result"),
            &["result"],
        )
        .map_err(metrics_error)?;

        registry.register(Box::new(provisions.clone())).map_err(metrics_error)?;
        registry.register(Box::new(deletes.clone())).map_err(metrics_error)?;
        registry.register(Box::new(helper_duration.clone())).map_err(metrics_error)?;
        registry.register(Box::new(config_reloads.clone())).map_err(metrics_error)?;

        Ok(Arc::new(Self {
            registry,
            provisions,
            deletes,
            helper_duration,
            config_reloads,
        }))
    }

    pub fn record_provision(&self, ok: bool) {
        self.provisions.with_label_values(&[result_label(ok)]).inc();
    }

    pub fn record_delete(&self, ok: bool) {
        self.deletes.with_label_values(&[result_label(ok)]).inc();
    }

    pub fn observe_helper(&self, action: HelperAction, elapsed: Duration, ok: bool) {
        self.helper_duration
            .with_label_values(&[action.as_str(), result_label(ok)])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_reload(&self, result: ReloadResult) {
        self.config_reloads.with_label_values(&[result.as_str()]).inc();
    }

    /// Count recorded for a provision outcome
    pub fn provision_count(&self, ok: bool) -> u64 {
        self.provisions.with_label_values(&[result_label(ok)]).get()
    }

    /// Count recorded for a delete outcome
    pub fn delete_count(&self, ok: bool) -> u64 {
        self.deletes.with_label_values(&[result_label(ok)]).get()
    }

    /// Count recorded for a reload outcome
    pub fn reload_count(&self, result: ReloadResult) -> u64 {
        self.config_reloads.with_label_values(&[result.as_str()]).get()
    }

    /// Render all metrics in the Prometheus text format
    pub fn gather(&self) -> Result<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}

fn metrics_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("metrics error: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = ProvisionerMetrics::new().unwrap();
        metrics.record_provision(true);
        metrics.record_provision(false);
        metrics.record_provision(true);
        metrics.record_reload(ReloadResult::Unchanged);

        assert_eq!(metrics.provision_count(true), 2);
        assert_eq!(metrics.provision_count(false), 1);
        assert_eq!(metrics.reload_count(ReloadResult::Unchanged), 1);
        assert_eq!(metrics.reload_count(ReloadResult::Applied), 0);
    }

    #[test]
    fn test_gather_text_format() {
        let metrics = ProvisionerMetrics::new().unwrap();
        metrics.record_delete(true);
        metrics.observe_helper(HelperAction::Delete, Duration::from_secs(3), true);

        let (content_type, body) = metrics.gather().unwrap();
        let body = String::from_utf8(body).unwrap();
        assert!(content_type.starts_with("text/plain"));
        assert!(body.contains("local_lvm_delete_total{result=\"success\"} 1"));
        assert!(body.contains(
            "local_lvm_helper_duration_seconds_count{action=\"delete\",result=\"success\"} 1"
        ));
    }
}
