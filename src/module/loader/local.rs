//! Local artifact loader
//!
//! Resolves `file://` URLs or plain paths, verifies the artifact digest and
//! gives every module an explicit namespace scope. Loaded scopes are tracked
//! so each one is released exactly once.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::module::loader::loader::{scope_namespace, LoaderError, ModuleLoader};
use crate::module::traits::{ArtifactRef, ModuleDescriptor, ModuleKey, ScopeHandle};

const FILE_SCHEME: &str = "file://";

/// Bookkeeping for one materialized scope
#[derive(Debug, Clone)]
pub struct LoadedScope {
    pub key: ModuleKey,
    pub path: PathBuf,
    /// Hex SHA-256 of the artifact contents
    pub digest: String,
    pub size: u64,
}

/// Loader backed by artifacts on the local filesystem
#[derive(Debug, Default)]
pub struct LocalArtifactLoader {
    /// Base directory for relative locations
    base_dir: Option<PathBuf>,
    scopes: Mutex<HashMap<Uuid, LoadedScope>>,
}

impl LocalArtifactLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative artifact locations against `base_dir`
    pub fn with_base_dir<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: Some(base_dir.as_ref().to_path_buf()),
            scopes: Mutex::new(HashMap::new()),
        }
    }

    fn scopes(&self) -> MutexGuard<'_, HashMap<Uuid, LoadedScope>> {
        self.scopes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Map an artifact location to a filesystem path
    pub fn resolve_path(&self, location: &str) -> Result<PathBuf, LoaderError> {
        let location = location.trim();
        if location.is_empty() {
            return Err(LoaderError::Unresolvable(
                "empty artifact location".to_string(),
            ));
        }

        let raw = match location.strip_prefix(FILE_SCHEME) {
            Some(path) => path,
            None if location.contains("://") => {
                return Err(LoaderError::Unresolvable(format!(
                    "unsupported scheme in {}",
                    location
                )));
            }
            None => location,
        };

        let path = PathBuf::from(raw);
        match &self.base_dir {
            Some(base) if path.is_relative() => Ok(base.join(path)),
            _ => Ok(path),
        }
    }

    /// Number of scopes currently materialized
    pub fn loaded_count(&self) -> usize {
        self.scopes().len()
    }

    /// Bookkeeping for a live scope
    pub fn loaded_scope(&self, scope: &ScopeHandle) -> Option<LoadedScope> {
        self.scopes().get(&scope.id).cloned()
    }

    async fn load(&self, descriptor: &ModuleDescriptor) -> Result<ScopeHandle, LoaderError> {
        let path = self.resolve_path(&descriptor.artifact.location)?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| LoaderError::Load(format!("{}: {}", path.display(), e)))?;

        let digest = hex::encode(Sha256::digest(&bytes));
        if let Some(expected) = &descriptor.artifact.checksum {
            if !expected.eq_ignore_ascii_case(&digest) {
                return Err(LoaderError::ChecksumMismatch {
                    expected: expected.clone(),
                    actual: digest,
                });
            }
        }

        let id = Uuid::new_v4();
        let scope = ScopeHandle {
            id,
            namespace: scope_namespace(descriptor, &id),
        };
        self.scopes().insert(
            id,
            LoadedScope {
                key: descriptor.key(),
                path: path.clone(),
                digest,
                size: bytes.len() as u64,
            },
        );

        info!(
            "Materialized scope {} from {} ({} bytes)",
            scope.namespace,
            path.display(),
            bytes.len()
        );
        Ok(scope)
    }
}

#[async_trait]
impl ModuleLoader for LocalArtifactLoader {
    async fn resolve(&self, artifact: &ArtifactRef) -> Result<(), LoaderError> {
        let path = self.resolve_path(&artifact.location)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(()),
            Ok(_) => Err(LoaderError::Unresolvable(format!(
                "{} is not a file",
                path.display()
            ))),
            Err(e) => Err(LoaderError::Unresolvable(format!(
                "{}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn materialize(
        &self,
        descriptor: &ModuleDescriptor,
        timeout: Duration,
    ) -> Result<ScopeHandle, LoaderError> {
        match tokio::time::timeout(timeout, self.load(descriptor)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Loading {} timed out after {:?}", descriptor.key(), timeout);
                Err(LoaderError::Timeout {
                    operation: "materialize",
                    after: timeout,
                })
            }
        }
    }

    async fn release(&self, scope: &ScopeHandle, _timeout: Duration) -> Result<(), LoaderError> {
        match self.scopes().remove(&scope.id) {
            Some(loaded) => {
                debug!("Released scope {} ({})", scope.namespace, loaded.key);
                Ok(())
            }
            None => Err(LoaderError::ScopeNotLoaded(scope.namespace.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn write_artifact(dir: &TempDir, file: &str, contents: &[u8]) -> PathBuf {
        let path = dir.path().join(file);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents).unwrap();
        path
    }

    fn descriptor(location: String) -> ModuleDescriptor {
        ModuleDescriptor::new("biz", "1.0.0", ArtifactRef::new(location), 0)
    }

    #[test]
    fn test_resolve_path_schemes() {
        let loader = LocalArtifactLoader::with_base_dir("/opt/biz");
        assert_eq!(
            loader.resolve_path("file:///tmp/a.jar").unwrap(),
            PathBuf::from("/tmp/a.jar")
        );
        assert_eq!(
            loader.resolve_path("a.jar").unwrap(),
            PathBuf::from("/opt/biz/a.jar")
        );
        assert!(matches!(
            loader.resolve_path("https://example.com/a.jar"),
            Err(LoaderError::Unresolvable(_))
        ));
    }

    #[tokio::test]
    async fn test_materialize_and_release_once() {
        let dir = TempDir::new().unwrap();
        let path = write_artifact(&dir, "biz.jar", b"biz module");
        let loader = LocalArtifactLoader::new();

        let scope = loader
            .materialize(&descriptor(format!("file://{}", path.display())), TIMEOUT)
            .await
            .unwrap();
        assert!(scope.namespace.starts_with("biz:biz:1.0.0:"));
        assert_eq!(loader.loaded_count(), 1);
        assert_eq!(loader.loaded_scope(&scope).unwrap().size, 10);

        loader.release(&scope, TIMEOUT).await.unwrap();
        assert_eq!(loader.loaded_count(), 0);
        assert!(matches!(
            loader.release(&scope, TIMEOUT).await,
            Err(LoaderError::ScopeNotLoaded(_))
        ));
    }

    #[tokio::test]
    async fn test_checksum_verified() {
        let dir = TempDir::new().unwrap();
        let path = write_artifact(&dir, "biz.jar", b"payload");
        let loader = LocalArtifactLoader::new();
        let digest = hex::encode(Sha256::digest(b"payload"));

        let mut good = descriptor(path.display().to_string());
        good.artifact = good.artifact.with_checksum(digest.to_uppercase());
        assert!(loader.materialize(&good, TIMEOUT).await.is_ok());

        let mut bad = descriptor(path.display().to_string());
        bad.artifact = bad.artifact.with_checksum("00".repeat(32));
        assert!(matches!(
            loader.materialize(&bad, TIMEOUT).await,
            Err(LoaderError::ChecksumMismatch { .. })
        ));
        assert_eq!(loader.loaded_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_artifact() {
        let dir = TempDir::new().unwrap();
        let loader = LocalArtifactLoader::with_base_dir(dir.path());

        assert!(matches!(
            loader.resolve(&ArtifactRef::new("missing.jar")).await,
            Err(LoaderError::Unresolvable(_))
        ));
        assert!(matches!(
            loader
                .materialize(&descriptor("missing.jar".to_string()), TIMEOUT)
                .await,
            Err(LoaderError::Load(_))
        ));
    }
}
