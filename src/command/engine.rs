//! Command dispatch engine
//!
//! Resolves a command name to its handler, takes the per-module-key lock for
//! mutating commands and runs the handler. The engine is the final catch
//! boundary: every failure, including a handler panic, comes back as a
//! `CommandResult` failure.

use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, error, info_span, warn, Instrument};

use crate::command::handlers::{default_handlers, CommandHandler, HandlerContext};
use crate::command::locks::KeyedLocks;
use crate::command::types::{
    Command, CommandError, CommandName, CommandPayload, CommandResult, ErrorKind,
};
use crate::config::DispatchSettings;
use crate::module::loader::ModuleLoader;
use crate::module::registry::ModuleRegistry;

/// Engine timeouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Bounded wait for a module-key lock
    pub lock_timeout: Duration,
    /// Bound on each loader call
    pub loader_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        DispatchSettings::default().into()
    }
}

impl From<DispatchSettings> for DispatchConfig {
    fn from(settings: DispatchSettings) -> Self {
        Self {
            lock_timeout: settings.lock_timeout(),
            loader_timeout: settings.loader_timeout(),
        }
    }
}

/// Command dispatch engine
pub struct CommandDispatchEngine {
    handlers: HashMap<CommandName, Arc<dyn CommandHandler>>,
    locks: KeyedLocks,
    context: HandlerContext,
    config: DispatchConfig,
    /// Runtime used by `dispatch_blocking`
    runtime: Option<Handle>,
}

impl CommandDispatchEngine {
    /// Build an engine with the built-in handler table
    ///
    /// Captures the current tokio runtime (if any) for `dispatch_blocking`.
    pub fn new(
        registry: Arc<ModuleRegistry>,
        loader: Arc<dyn ModuleLoader>,
        config: DispatchConfig,
    ) -> Self {
        let handlers = default_handlers()
            .into_iter()
            .map(|handler| (handler.name(), handler))
            .collect();

        Self {
            handlers,
            locks: KeyedLocks::new(),
            context: HandlerContext::new(registry, loader, config.loader_timeout),
            config,
            runtime: Handle::try_current().ok(),
        }
    }

    /// Replace the handler for one command name
    pub fn with_handler(mut self, handler: Arc<dyn CommandHandler>) -> Self {
        self.handlers.insert(handler.name(), handler);
        self
    }

    /// Runtime used by `dispatch_blocking`
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.context.registry
    }

    pub fn config(&self) -> DispatchConfig {
        self.config
    }

    /// Execute one command
    pub async fn dispatch(&self, command: Command) -> CommandResult {
        let span = info_span!(
            "dispatch",
            command = %command.name,
            module = %command
                .target
                .as_ref()
                .map(|t| t.to_string())
                .unwrap_or_default(),
        );

        let outcome = AssertUnwindSafe(self.execute(&command))
            .catch_unwind()
            .instrument(span)
            .await;

        match outcome {
            Ok(Ok(payload)) => CommandResult::success(payload),
            Ok(Err(err)) => {
                if err.is_contract_violation() {
                    error!("{} failed on a registry contract violation: {}", command.name, err);
                } else {
                    debug!("{} failed: {}", command.name, err);
                }
                err.into()
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("{} handler panicked: {}", command.name, message);
                CommandResult::failure(
                    ErrorKind::InternalError,
                    format!("{} failed unexpectedly", command.name),
                )
            }
        }
    }

    /// Execute one command from a thread outside the async runtime
    ///
    /// Blocks the calling thread on the runtime captured at construction.
    pub fn dispatch_blocking(&self, command: Command) -> CommandResult {
        if Handle::try_current().is_ok() {
            warn!("dispatch_blocking called from inside the async runtime");
            return CommandResult::failure(
                ErrorKind::InternalError,
                "dispatch_blocking cannot be used from an async context",
            );
        }
        match &self.runtime {
            Some(runtime) => runtime.block_on(self.dispatch(command)),
            None => CommandResult::failure(
                ErrorKind::InternalError,
                "no runtime available for blocking dispatch",
            ),
        }
    }

    async fn execute(&self, command: &Command) -> Result<CommandPayload, CommandError> {
        let name: CommandName = command.name.parse()?;
        let handler = self
            .handlers
            .get(&name)
            .ok_or_else(|| CommandError::UnknownCommand(command.name.clone()))?;

        let command = handler.pin(command, &self.context)?;
        let _guard = match handler.lock_key(&command, &self.context)? {
            Some(key) => {
                let guard = self.locks.acquire(&key, self.config.lock_timeout).await;
                Some(guard.ok_or(CommandError::Busy {
                    key,
                    waited: self.config.lock_timeout,
                })?)
            }
            None => None,
        };

        handler.handle(&command, &self.context).await
    }
}

impl fmt::Debug for CommandDispatchEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDispatchEngine")
            .field("config", &self.config)
            .field("commands", &self.handlers.len())
            .field("modules", &self.context.registry.len())
            .field("locked_keys", &self.locks.len())
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::loader::LocalArtifactLoader;
    use async_trait::async_trait;

    struct PanickingQuery;

    #[async_trait]
    impl CommandHandler for PanickingQuery {
        fn name(&self) -> CommandName {
            CommandName::Query
        }

        async fn handle(
            &self,
            _command: &Command,
            _ctx: &HandlerContext,
        ) -> Result<CommandPayload, CommandError> {
            panic!("query handler bug");
        }
    }

    fn engine() -> CommandDispatchEngine {
        CommandDispatchEngine::new(
            Arc::new(ModuleRegistry::new()),
            Arc::new(LocalArtifactLoader::new()),
            DispatchConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let result = engine().dispatch(Command::new("frobnicate")).await;
        assert_eq!(result.kind(), Some(ErrorKind::UnknownCommand));
    }

    #[tokio::test]
    async fn test_handler_panic_becomes_internal_error() {
        let engine = engine().with_handler(Arc::new(PanickingQuery));
        let result = engine.dispatch(Command::query()).await;
        assert_eq!(result.kind(), Some(ErrorKind::InternalError));

        // Engine keeps serving afterwards
        let health = engine.dispatch(Command::health()).await;
        assert!(health.is_success());
    }

    #[tokio::test]
    async fn test_mutating_command_requires_target() {
        let result = engine().dispatch(Command::new("install")).await;
        assert_eq!(result.kind(), Some(ErrorKind::InvalidArguments));
    }

    #[tokio::test]
    async fn test_blocking_dispatch_refused_inside_runtime() {
        let result = engine().dispatch_blocking(Command::health());
        assert_eq!(result.kind(), Some(ErrorKind::InternalError));
    }

    #[test]
    fn test_blocking_dispatch_from_plain_thread() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let engine = engine().with_runtime(runtime.handle().clone());

        let result = std::thread::scope(|s| {
            s.spawn(|| engine.dispatch_blocking(Command::query()))
                .join()
                .unwrap()
        });
        assert_eq!(result.modules().map(|m| m.len()), Some(0));
    }

    #[test]
    fn test_panic_message_extraction() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(boxed.as_ref()), "non-string panic payload");
    }
}
