//! Module loader adapter
//!
//! The loader owns isolation scopes: it materializes one from an artifact
//! when a module is installed and is the only component allowed to release
//! it again. The registry only ever sees the opaque `ScopeHandle`.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::module::traits::{ArtifactRef, ModuleDescriptor, ScopeHandle};

/// Loader failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoaderError {
    #[error("failed to load artifact: {0}")]
    Load(String),

    #[error("failed to release scope: {0}")]
    Release(String),

    #[error("scope not loaded: {0}")]
    ScopeNotLoaded(String),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("artifact not resolvable: {0}")]
    Unresolvable(String),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}

/// Capability that turns artifacts into isolation scopes and tears them down
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    /// Check that an artifact reference can be resolved, without loading it
    async fn resolve(&self, artifact: &ArtifactRef) -> Result<(), LoaderError> {
        if artifact.location.trim().is_empty() {
            return Err(LoaderError::Unresolvable(
                "empty artifact location".to_string(),
            ));
        }
        Ok(())
    }

    /// Materialize the isolation scope for a module
    ///
    /// Must give up with `LoaderError::Timeout` once `timeout` has elapsed.
    async fn materialize(
        &self,
        descriptor: &ModuleDescriptor,
        timeout: Duration,
    ) -> Result<ScopeHandle, LoaderError>;

    /// Release a scope previously returned by `materialize`
    ///
    /// A scope is released at most once; releasing it again fails with
    /// `LoaderError::ScopeNotLoaded`. A release either completes or has no
    /// effect: once the scope has been dropped the call must report success,
    /// even if it is about to exceed `timeout`.
    async fn release(&self, scope: &ScopeHandle, timeout: Duration) -> Result<(), LoaderError>;
}

/// Namespace assigned to a scope: `biz:<name>:<version>:<scope id>`
pub fn scope_namespace(descriptor: &ModuleDescriptor, scope_id: &uuid::Uuid) -> String {
    format!(
        "biz:{}:{}:{}",
        descriptor.name, descriptor.version, scope_id
    )
}
