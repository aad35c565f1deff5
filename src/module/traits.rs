//! Core module types
//!
//! Identity, lifecycle state and the immutable instance view shared by the
//! registry, the loader adapter and the command handlers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Module lifecycle state
///
/// ```text
/// Installing ──► Installed ──► Switching ──► Installed
///     │              │
///     ▼              ▼
///   Failed      Uninstalling ──► Uninstalled
/// ```
///
/// `Failed` and `Uninstalled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleState {
    /// Record reserved, isolation scope not yet materialized
    Installing,
    /// Scope materialized; the only state that accepts application traffic
    Installed,
    /// Active-version marker is being re-pointed at this instance
    Switching,
    /// Scope release in progress (or failed and awaiting retry)
    Uninstalling,
    /// Scope released
    Uninstalled,
    /// Installation failed; never promoted to `Installed`
    Failed,
}

impl ModuleState {
    /// All states in lifecycle order
    pub const ALL: [ModuleState; 6] = [
        ModuleState::Installing,
        ModuleState::Installed,
        ModuleState::Switching,
        ModuleState::Uninstalling,
        ModuleState::Uninstalled,
        ModuleState::Failed,
    ];

    /// Whether the state is terminal
    pub fn is_terminal(self) -> bool {
        matches!(self, ModuleState::Uninstalled | ModuleState::Failed)
    }

    /// Whether `self -> next` is an edge of the lifecycle state machine
    pub fn can_transition_to(self, next: ModuleState) -> bool {
        use ModuleState::*;
        matches!(
            (self, next),
            (Installing, Installed)
                | (Installing, Failed)
                | (Installed, Switching)
                | (Switching, Installed)
                | (Installed, Uninstalling)
                | (Uninstalling, Uninstalled)
        )
    }

    /// Lowercase wire name
    pub fn as_str(self) -> &'static str {
        match self {
            ModuleState::Installing => "installing",
            ModuleState::Installed => "installed",
            ModuleState::Switching => "switching",
            ModuleState::Uninstalling => "uninstalling",
            ModuleState::Uninstalled => "uninstalled",
            ModuleState::Failed => "failed",
        }
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        ModuleState::ALL
            .into_iter()
            .find(|state| state.as_str() == normalized)
            .ok_or_else(|| format!("unknown module state: {}", s))
    }
}

/// Unique registry key: (name, version)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleKey {
    pub name: String,
    pub version: String,
}

impl ModuleKey {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// Identifier of one registry record
///
/// A re-install of the same key after a terminal state gets a fresh id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(Uuid);

impl ModuleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ModuleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to a module artifact
///
/// The location is opaque to the registry; only the loader adapter
/// interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Artifact location (`file://` URL or filesystem path for the local loader)
    pub location: String,
    /// Expected hex-encoded SHA-256 digest of the artifact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl ArtifactRef {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            checksum: None,
        }
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }
}

/// Identity of an installed module. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    pub name: String,
    pub version: String,
    pub artifact: ArtifactRef,
    /// Unix timestamp (seconds) at which the install was requested
    pub installed_at: u64,
}

impl ModuleDescriptor {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        artifact: ArtifactRef,
        installed_at: u64,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            artifact,
            installed_at,
        }
    }

    pub fn key(&self) -> ModuleKey {
        ModuleKey::new(self.name.clone(), self.version.clone())
    }
}

/// Opaque handle to an isolation scope owned by the loader adapter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeHandle {
    pub id: Uuid,
    /// Namespace under which the scope resolves code and resources
    pub namespace: String,
}

/// Immutable copy of one registry record
///
/// Callers always receive copies; the live record stays inside the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInstance {
    pub id: ModuleId,
    /// Install order within the registry
    pub sequence: u64,
    pub descriptor: ModuleDescriptor,
    pub state: ModuleState,
    /// Whether this version is the routing target for its name
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<ScopeHandle>,
    /// Unix timestamp (seconds) of the last state change
    pub updated_at: u64,
}

impl ModuleInstance {
    pub fn key(&self) -> ModuleKey {
        self.descriptor.key()
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn version(&self) -> &str {
        &self.descriptor.version
    }

    /// Whether the instance may receive application traffic
    pub fn is_routable(&self) -> bool {
        self.state == ModuleState::Installed
    }
}

/// Registry contract violations
///
/// These indicate a handler bug rather than a user error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("module {0} is already registered")]
    DuplicateModule(ModuleKey),

    #[error("illegal transition for {key}: {from} -> {to}")]
    IllegalTransition {
        key: ModuleKey,
        from: ModuleState,
        to: ModuleState,
    },

    #[error("module {key} is still active in state {state}")]
    StillActive { key: ModuleKey, state: ModuleState },

    #[error("module not found: {0}")]
    NotFound(String),

    #[error("module {key} cannot become active in state {state}")]
    NotRoutable { key: ModuleKey, state: ModuleState },
}
