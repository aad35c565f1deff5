//! Module loader adapter
//!
//! Materializes and releases isolation scopes for module artifacts.

pub mod loader;
pub mod local;

pub use loader::{scope_namespace, LoaderError, ModuleLoader};
pub use local::{LoadedScope, LocalArtifactLoader};
