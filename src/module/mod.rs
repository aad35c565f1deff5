//! Module lifecycle core
//!
//! - **traits**: identity, lifecycle state and instance views
//! - **registry**: the single source of truth for what is installed
//! - **loader**: the adapter that owns isolation scopes
//! - **validation**: descriptor checks applied before registration

pub mod loader;
pub mod registry;
pub mod traits;
pub mod validation;

pub use loader::{LoaderError, LocalArtifactLoader, ModuleLoader};
pub use registry::ModuleRegistry;
pub use traits::{
    ArtifactRef, ModuleDescriptor, ModuleId, ModuleInstance, ModuleKey, ModuleState,
    RegistryError, ScopeHandle,
};
pub use validation::{DescriptorValidator, ValidationResult};
