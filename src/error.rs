//! Error types for the Local LVM Provisioner
//!
//! Provides structured error types for configuration reloads, request
//! validation, node resolution and helper pod execution.

use std::time::Duration;
use thiserror::Error;

/// Unified error type for the provisioner
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Node Configuration Errors
    // =========================================================================
    #[error("Failed to load config file {path}: {reason}")]
    ConfigRead { path: String, reason: String },

    #[error("Config canonicalization failed: {0}")]
    ConfigValidation(String),

    #[error("No valid config available")]
    ConfigNotInitialized,

    // =========================================================================
    // Resolution Errors
    // =========================================================================
    #[error("Config doesn't contain node {node}, and no {fallback} available")]
    NodeNotConfigured { node: String, fallback: String },

    #[error("No mount path defined on node {node}")]
    NoPath { node: String },

    #[error("No local volume group available on node {node}")]
    NoVolumeGroup { node: String },

    // =========================================================================
    // Request Errors
    // =========================================================================
    #[error("Request validation failed: {0}")]
    RequestValidation(String),

    // =========================================================================
    // Helper Execution Errors
    // =========================================================================
    #[error("Helper execution failed: {0}")]
    Execution(String),

    #[error("Helper pod {pod} timed out after {attempts} attempts (last phase: {last_phase})")]
    Timeout {
        pod: String,
        attempts: u32,
        last_phase: String,
    },

    #[error("Unable to delete helper pod {pod}: {reason}")]
    Cleanup { pod: String, reason: String },

    #[error("Failed to {action} volume {volume}: {source}")]
    Operation {
        action: String,
        volume: String,
        #[source]
        source: Box<Error>,
    },

    // =========================================================================
    // Kubernetes Errors
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Resource already exists: {kind}/{name}")]
    ResourceExists { kind: String, name: String },

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

/// Action the calling framework should take on a failed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Requeue with exponential backoff
    RequeueWithBackoff,
    /// Requeue after specific duration
    RequeueAfter(Duration),
    /// Don't requeue, wait for changes
    NoRequeue,
}

impl Error {
    /// Wrap this error with the action and volume it happened on
    pub fn context(self, action: impl Into<String>, volume: impl Into<String>) -> Self {
        Error::Operation {
            action: action.into(),
            volume: volume.into(),
            source: Box::new(self),
        }
    }

    /// The original failure beneath any context wrappers
    pub fn root(&self) -> &Error {
        let mut current = self;
        while let Error::Operation { source, .. } = current {
            current = source;
        }
        current
    }

    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self.root() {
            // Bad input never becomes valid by itself
            Error::RequestValidation(_) | Error::Configuration(_) => ErrorAction::NoRequeue,

            // A config reload may fix these
            Error::NodeNotConfigured { .. }
            | Error::NoPath { .. }
            | Error::NoVolumeGroup { .. }
            | Error::ConfigNotInitialized => ErrorAction::RequeueAfter(Duration::from_secs(30)),

            // Another helper for the same volume is still around
            Error::ResourceExists { .. } => ErrorAction::RequeueAfter(Duration::from_secs(10)),

            // All other errors - retry with backoff
            _ => ErrorAction::RequeueWithBackoff,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::NoRequeue)
    }
}

/// Extension for attaching operation context to results
pub trait ResultExt<T> {
    /// Wrap the error, if any, with action and volume name
    fn context(self, action: &str, volume: &str) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, action: &str, volume: &str) -> Result<T> {
        self.map_err(|e| e.context(action, volume))
    }
}

/// Result type alias for the provisioner
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_error_actions() {
        let err = Error::RequestValidation("selector set".into());
        assert_eq!(err.action(), ErrorAction::NoRequeue);

        let err = Error::NodeNotConfigured {
            node: "n2".into(),
            fallback: "DEFAULT".into(),
        };
        assert_eq!(
            err.action(),
            ErrorAction::RequeueAfter(Duration::from_secs(30))
        );

        let err = Error::Execution("boom".into());
        assert_eq!(err.action(), ErrorAction::RequeueWithBackoff);
    }

    #[test]
    fn test_context_preserves_root() {
        let err = Error::Timeout {
            pod: "create-pvc-1".into(),
            attempts: 120,
            last_phase: "Pending".into(),
        }
        .context("create", "pvc-1");

        assert_matches!(err.root(), Error::Timeout { attempts: 120, .. });
        assert_eq!(err.action(), ErrorAction::RequeueWithBackoff);
        assert_eq!(
            err.to_string(),
            "Failed to create volume pvc-1: Helper pod create-pvc-1 timed out after 120 attempts \
             (last phase: Pending)"
        );
    }

    #[test]
    fn test_result_ext_wraps_twice() {
        let result: Result<()> = Err(Error::NoPath { node: "n1".into() });
        let err = result
            .context("delete", "pvc-1")
            .context("delete", "pvc-1")
            .unwrap_err();

        assert_matches!(err.root(), Error::NoPath { .. });
        assert!(err.is_retryable());
    }

    #[test]
    fn test_validation_not_retryable() {
        let err = Error::RequestValidation("too small".into()).context("create", "pvc-1");
        assert!(!err.is_retryable());
        assert_eq!(err.action(), ErrorAction::NoRequeue);
    }
}
