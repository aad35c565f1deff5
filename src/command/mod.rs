//! Command surface
//!
//! Transport adapters build `Command` values and hand them to
//! `CommandDispatchEngine::dispatch`; everything else in this module is the
//! machinery behind that one entry point.

pub mod engine;
pub mod handlers;
pub mod locks;
pub mod types;

pub use engine::{CommandDispatchEngine, DispatchConfig};
pub use handlers::{CommandHandler, HandlerContext, HealthReport, HealthStatus};
pub use locks::{KeyGuard, KeyedLocks};
pub use types::{
    Command, CommandError, CommandName, CommandPayload, CommandResult, ErrorKind, ModuleTarget,
};
