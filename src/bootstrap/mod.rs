//! Bootstrap
//!
//! Builds the registry and dispatch engine from configuration, installs the
//! static modules through the normal dispatch path and only then publishes
//! the engine through the component registry.

pub mod component;

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::command::{
    Command, CommandDispatchEngine, CommandError, CommandResult, DispatchConfig, ErrorKind,
};
use crate::config::ArkletConfig;
use crate::module::loader::ModuleLoader;
use crate::module::registry::ModuleRegistry;
use crate::module::traits::ModuleKey;

pub use component::ComponentRegistry;

/// Bootstrap failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BootstrapError {
    #[error("command service is not bootstrapped")]
    NotBootstrapped,

    #[error("command service is already bootstrapped")]
    AlreadyBootstrapped,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("static module {module} failed to install ({kind}): {message}")]
    Install {
        module: String,
        kind: ErrorKind,
        message: String,
    },
}

impl From<BootstrapError> for CommandError {
    fn from(err: BootstrapError) -> Self {
        match err {
            BootstrapError::NotBootstrapped => CommandError::NotBootstrapped,
            other => CommandError::Internal(other.to_string()),
        }
    }
}

/// Bootstrap the command service into `components`
///
/// Must run inside a tokio runtime; that runtime also serves
/// `dispatch_blocking`. On any failure nothing is published, and static
/// modules installed before the failure are uninstalled again so the loader
/// holds no scopes for them.
pub async fn bootstrap(
    components: &ComponentRegistry,
    config: &ArkletConfig,
    loader: Arc<dyn ModuleLoader>,
) -> Result<Arc<CommandDispatchEngine>, BootstrapError> {
    config
        .validate()
        .map_err(|e| BootstrapError::Config(format!("{:#}", e)))?;

    if components.is_bootstrapped() {
        return Err(BootstrapError::AlreadyBootstrapped);
    }

    let registry = Arc::new(ModuleRegistry::with_retention(
        config.registry.retired_capacity,
        config.registry.retired_ttl_secs,
    ));
    let engine = Arc::new(CommandDispatchEngine::new(
        registry,
        loader,
        DispatchConfig::from(config.dispatch.clone()),
    ));

    let mut installed: Vec<ModuleKey> = Vec::with_capacity(config.modules.len());
    for module in &config.modules {
        let key = module.key();
        let artifact = module.artifact();
        let mut command = Command::install(&key.name, &key.version, artifact.location);
        if let Some(checksum) = artifact.checksum {
            command = command.with_arg(checksum);
        }

        if let CommandResult::Failure { kind, message } = engine.dispatch(command).await {
            warn!("Bootstrap aborted: static module {} failed: {}", key, message);
            roll_back(&engine, &installed).await;
            return Err(BootstrapError::Install {
                module: key.to_string(),
                kind,
                message,
            });
        }
        installed.push(key);
    }

    info!(
        "Arklet bootstrap complete (embedded: {}, static modules: {})",
        config.embedded,
        config.modules.len()
    );
    components.complete_bootstrap(engine)
}

/// Uninstall already installed static modules, newest first
async fn roll_back(engine: &CommandDispatchEngine, installed: &[ModuleKey]) {
    for key in installed.iter().rev() {
        let result = engine
            .dispatch(Command::uninstall(&key.name, Some(&key.version)))
            .await;
        if let CommandResult::Failure { message, .. } = result {
            warn!("Rollback of static module {} failed: {}", key, message);
        } else {
            debug!("Rolled back static module {}", key);
        }
    }
}

/// Bootstrap into the process-wide component registry
pub async fn bootstrap_global(
    config: &ArkletConfig,
    loader: Arc<dyn ModuleLoader>,
) -> Result<Arc<CommandDispatchEngine>, BootstrapError> {
    bootstrap(ComponentRegistry::global(), config, loader).await
}
