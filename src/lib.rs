//! Arklet - module lifecycle and command dispatch core
//!
//! Tracks independently packaged "biz" modules installed into a running host
//! process, each in its own isolation scope, and exposes one command surface
//! (install, switch, uninstall, query, health) that is safe under concurrent
//! callers.
//!
//! ## Components
//!
//! 1. **Module loader adapter** (`module::loader`): materializes and releases
//!    isolation scopes
//! 2. **Module registry** (`module::registry`): the single source of truth for
//!    what is installed and in which lifecycle state
//! 3. **Command dispatch engine** (`command`): handler resolution, per-module
//!    locking and the final catch boundary
//! 4. **Component registry** (`bootstrap`): the once-initialized accessor the
//!    embedding host uses to reach the engine
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use arklet::{bootstrap, ArkletConfig, Command, ComponentRegistry, LocalArtifactLoader};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = ArkletConfig::default();
//! let components = ComponentRegistry::global();
//! bootstrap(components, &config, Arc::new(LocalArtifactLoader::new())).await?;
//!
//! let engine = components.command_service()?;
//! let result = engine
//!     .dispatch(Command::install("biz", "1.0.0", "file:///opt/biz/biz-1.0.0.jar"))
//!     .await;
//! println!("{:?}", result);
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod command;
pub mod config;
pub mod module;
pub mod utils;

pub use bootstrap::{bootstrap, bootstrap_global, BootstrapError, ComponentRegistry};
pub use command::{
    Command, CommandDispatchEngine, CommandError, CommandName, CommandPayload, CommandResult,
    DispatchConfig, ErrorKind, HealthReport, HealthStatus, ModuleTarget,
};
pub use config::ArkletConfig;
pub use module::{
    ArtifactRef, LoaderError, LocalArtifactLoader, ModuleDescriptor, ModuleId, ModuleInstance,
    ModuleKey, ModuleLoader, ModuleRegistry, ModuleState, RegistryError, ScopeHandle,
};
