//! Component registry accessor
//!
//! Once-initialized holder for the command dispatch engine. The embedding
//! host publishes the engine exactly once when bootstrap completes; until
//! then every lookup fails with `NotBootstrapped`. Lookups are safe from any
//! thread and always return the same instance.

use std::sync::{Arc, OnceLock};
use tracing::info;

use crate::bootstrap::BootstrapError;
use crate::command::{Command, CommandDispatchEngine, CommandError, CommandResult};

static GLOBAL: ComponentRegistry = ComponentRegistry::new();

/// Holder for the bootstrapped command service
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    engine: OnceLock<Arc<CommandDispatchEngine>>,
}

impl ComponentRegistry {
    pub const fn new() -> Self {
        Self {
            engine: OnceLock::new(),
        }
    }

    /// Process-wide instance used by embedding hosts
    pub fn global() -> &'static ComponentRegistry {
        &GLOBAL
    }

    /// Publish the engine; fails if bootstrap already completed
    pub fn complete_bootstrap(
        &self,
        engine: Arc<CommandDispatchEngine>,
    ) -> Result<Arc<CommandDispatchEngine>, BootstrapError> {
        self.engine
            .set(Arc::clone(&engine))
            .map_err(|_| BootstrapError::AlreadyBootstrapped)?;
        info!("Command service published");
        Ok(engine)
    }

    /// The bootstrapped command service
    pub fn command_service(&self) -> Result<Arc<CommandDispatchEngine>, BootstrapError> {
        self.engine
            .get()
            .cloned()
            .ok_or(BootstrapError::NotBootstrapped)
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.engine.get().is_some()
    }

    /// Dispatch through the published service
    ///
    /// Fails with `NotBootstrapped` before bootstrap completes.
    pub async fn dispatch(&self, command: Command) -> CommandResult {
        match self.engine.get() {
            Some(engine) => engine.dispatch(command).await,
            None => CommandError::NotBootstrapped.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{DispatchConfig, ErrorKind};
    use crate::module::{LocalArtifactLoader, ModuleRegistry};

    fn engine() -> Arc<CommandDispatchEngine> {
        Arc::new(CommandDispatchEngine::new(
            Arc::new(ModuleRegistry::new()),
            Arc::new(LocalArtifactLoader::new()),
            DispatchConfig::default(),
        ))
    }

    #[tokio::test]
    async fn test_not_bootstrapped_until_published() {
        let components = ComponentRegistry::new();
        assert!(matches!(
            components.command_service(),
            Err(BootstrapError::NotBootstrapped)
        ));
        let result = components.dispatch(Command::health()).await;
        assert_eq!(result.kind(), Some(ErrorKind::NotBootstrapped));

        components.complete_bootstrap(engine()).unwrap();
        assert!(components.is_bootstrapped());
        assert!(components.dispatch(Command::health()).await.is_success());
    }

    #[test]
    fn test_same_instance_from_every_thread() {
        let components = ComponentRegistry::new();
        let published = components.complete_bootstrap(engine()).unwrap();

        std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| components.command_service().unwrap()))
                .collect();
            for handle in handles {
                assert!(Arc::ptr_eq(&handle.join().unwrap(), &published));
            }
        });
    }

    #[test]
    fn test_second_publish_rejected() {
        let components = ComponentRegistry::new();
        let first = components.complete_bootstrap(engine()).unwrap();

        assert!(matches!(
            components.complete_bootstrap(engine()),
            Err(BootstrapError::AlreadyBootstrapped)
        ));
        assert!(Arc::ptr_eq(&components.command_service().unwrap(), &first));
    }
}
