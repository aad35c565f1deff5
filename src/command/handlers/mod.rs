//! Command handlers
//!
//! Each handler turns (registry state, command) into (new registry state,
//! payload). Handlers reach the registry only through its API and never keep
//! instance copies beyond one command.

pub mod health;
pub mod install;
pub mod query;
pub mod switch;
pub mod uninstall;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::command::types::{Command, CommandError, CommandName, CommandPayload, ModuleTarget};
use crate::module::loader::ModuleLoader;
use crate::module::registry::ModuleRegistry;
use crate::module::traits::ModuleKey;
use crate::module::validation::DescriptorValidator;

pub use health::{HealthHandler, HealthReport, HealthStatus};
pub use install::InstallHandler;
pub use query::QueryHandler;
pub use switch::SwitchHandler;
pub use uninstall::UninstallHandler;

/// Shared state handed to every handler
pub struct HandlerContext {
    pub registry: Arc<ModuleRegistry>,
    pub loader: Arc<dyn ModuleLoader>,
    /// Bound applied to every loader call
    pub loader_timeout: Duration,
    pub validator: DescriptorValidator,
    /// Engine start, for uptime reporting
    pub started_at: Instant,
}

impl HandlerContext {
    pub fn new(
        registry: Arc<ModuleRegistry>,
        loader: Arc<dyn ModuleLoader>,
        loader_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            loader,
            loader_timeout,
            validator: DescriptorValidator::new(),
            started_at: Instant::now(),
        }
    }
}

/// One command implementation
#[async_trait]
pub trait CommandHandler: Send + Sync {
    fn name(&self) -> CommandName;

    /// Resolve the concrete command before any lock is taken
    ///
    /// The returned command is what `lock_key` and `handle` see, so a handler
    /// only ever acts on the key it holds.
    fn pin(&self, command: &Command, _ctx: &HandlerContext) -> Result<Command, CommandError> {
        Ok(command.clone())
    }

    /// Key to lock before `handle` runs, `None` for lock-free commands
    ///
    /// Mutating commands lock `name@version`, or `name` when no version is
    /// given.
    fn lock_key(
        &self,
        command: &Command,
        _ctx: &HandlerContext,
    ) -> Result<Option<String>, CommandError> {
        if !self.name().is_mutating() {
            return Ok(None);
        }
        Ok(Some(require_target(command)?.lock_key()))
    }

    async fn handle(
        &self,
        command: &Command,
        ctx: &HandlerContext,
    ) -> Result<CommandPayload, CommandError>;
}

/// Handler table for the built-in commands
pub fn default_handlers() -> Vec<Arc<dyn CommandHandler>> {
    vec![
        Arc::new(InstallHandler),
        Arc::new(SwitchHandler),
        Arc::new(UninstallHandler),
        Arc::new(QueryHandler),
        Arc::new(HealthHandler),
    ]
}

pub(crate) fn require_target(command: &Command) -> Result<&ModuleTarget, CommandError> {
    command.target.as_ref().ok_or_else(|| {
        CommandError::InvalidArguments(format!("{} requires a target module", command.name))
    })
}

pub(crate) fn require_key(command: &Command) -> Result<ModuleKey, CommandError> {
    require_target(command)?.key().ok_or_else(|| {
        CommandError::InvalidArguments(format!("{} requires a module version", command.name))
    })
}
