//! Shared helpers for integration tests
//!
//! `MockLoader` is a scriptable in-memory loader: failures, panics and delays
//! can be injected per module key, and every materialize/release is counted.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use arklet::module::loader::scope_namespace;
use arklet::{
    ArtifactRef, Command, CommandDispatchEngine, CommandResult, DispatchConfig, LoaderError,
    ModuleDescriptor, ModuleInstance, ModuleLoader, ModuleRegistry, ModuleState, ScopeHandle,
};

/// Locations with this prefix fail resolution
pub const MISSING_PREFIX: &str = "missing:";

#[derive(Default)]
pub struct MockLoader {
    fail_materialize: Mutex<HashSet<String>>,
    fail_release: Mutex<HashSet<String>>,
    drop_then_fail_release: Mutex<HashSet<String>>,
    panic_materialize: Mutex<HashSet<String>>,
    delays: Mutex<HashMap<String, Duration>>,
    live: Mutex<HashMap<Uuid, String>>,
    materialized: AtomicUsize,
    released: AtomicUsize,
}

impl MockLoader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_materialize(&self, key: &str) {
        self.fail_materialize.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_release(&self, key: &str) {
        self.fail_release.lock().unwrap().insert(key.to_string());
    }

    /// Next release drops the scope but still reports a timeout
    pub fn drop_then_fail_release(&self, key: &str) {
        self.drop_then_fail_release
            .lock()
            .unwrap()
            .insert(key.to_string());
    }

    pub fn heal_release(&self, key: &str) {
        self.fail_release.lock().unwrap().remove(key);
    }

    pub fn panic_on_materialize(&self, key: &str) {
        self.panic_materialize.lock().unwrap().insert(key.to_string());
    }

    pub fn delay_materialize(&self, key: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(key.to_string(), delay);
    }

    pub fn materialize_count(&self) -> usize {
        self.materialized.load(Ordering::SeqCst)
    }

    pub fn release_count(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Keys of scopes materialized and not yet released
    pub fn live_scopes(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.live.lock().unwrap().values().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ModuleLoader for MockLoader {
    async fn resolve(&self, artifact: &ArtifactRef) -> Result<(), LoaderError> {
        if artifact.location.starts_with(MISSING_PREFIX) {
            return Err(LoaderError::Unresolvable(artifact.location.clone()));
        }
        Ok(())
    }

    async fn materialize(
        &self,
        descriptor: &ModuleDescriptor,
        _timeout: Duration,
    ) -> Result<ScopeHandle, LoaderError> {
        let key = descriptor.key().to_string();

        let delay = self.delays.lock().unwrap().get(&key).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.panic_materialize.lock().unwrap().contains(&key) {
            panic!("loader exploded for {}", key);
        }
        if self.fail_materialize.lock().unwrap().contains(&key) {
            return Err(LoaderError::Load(format!("injected failure for {}", key)));
        }

        let id = Uuid::new_v4();
        self.live.lock().unwrap().insert(id, key);
        self.materialized.fetch_add(1, Ordering::SeqCst);
        Ok(ScopeHandle {
            id,
            namespace: scope_namespace(descriptor, &id),
        })
    }

    async fn release(&self, scope: &ScopeHandle, _timeout: Duration) -> Result<(), LoaderError> {
        let key = match self.live.lock().unwrap().get(&scope.id) {
            Some(key) => key.clone(),
            None => return Err(LoaderError::ScopeNotLoaded(scope.namespace.clone())),
        };
        if self.drop_then_fail_release.lock().unwrap().remove(&key) {
            self.live.lock().unwrap().remove(&scope.id);
            return Err(LoaderError::Timeout {
                operation: "release",
                after: Duration::from_millis(1),
            });
        }
        if self.fail_release.lock().unwrap().contains(&key) {
            return Err(LoaderError::Release(format!("injected failure for {}", key)));
        }
        self.live.lock().unwrap().remove(&scope.id);
        self.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn test_config() -> DispatchConfig {
    DispatchConfig {
        lock_timeout: Duration::from_secs(5),
        loader_timeout: Duration::from_secs(5),
    }
}

pub fn engine_with(loader: Arc<MockLoader>, config: DispatchConfig) -> CommandDispatchEngine {
    CommandDispatchEngine::new(Arc::new(ModuleRegistry::new()), loader, config)
}

pub fn engine(loader: Arc<MockLoader>) -> CommandDispatchEngine {
    engine_with(loader, test_config())
}

pub fn install(name: &str, version: &str) -> Command {
    Command::install(name, version, format!("mem://{}/{}", name, version))
}

/// Modules listed by a successful query
pub fn listed(result: &CommandResult) -> Vec<ModuleInstance> {
    result
        .modules()
        .map(|m| m.to_vec())
        .unwrap_or_else(|| panic!("expected module listing, got {:?}", result))
}

pub async fn query_all(engine: &CommandDispatchEngine) -> Vec<ModuleInstance> {
    listed(&engine.dispatch(Command::query()).await)
}

/// (key, state) pairs of the live snapshot, sorted
pub fn summary(modules: &[ModuleInstance]) -> Vec<(String, ModuleState)> {
    let mut pairs: Vec<(String, ModuleState)> = modules
        .iter()
        .map(|m| (m.key().to_string(), m.state))
        .collect();
    pairs.sort();
    pairs
}
