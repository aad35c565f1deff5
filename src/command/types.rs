//! Command values and results
//!
//! `Command` and `CommandResult` are plain serde values so transport
//! adapters can carry them over any wire format.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::command::handlers::health::HealthReport;
use crate::module::loader::LoaderError;
use crate::module::traits::{ModuleInstance, ModuleKey, RegistryError};

/// Recognized command names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandName {
    Install,
    Uninstall,
    Switch,
    Query,
    Health,
}

impl CommandName {
    pub const ALL: [CommandName; 5] = [
        CommandName::Install,
        CommandName::Uninstall,
        CommandName::Switch,
        CommandName::Query,
        CommandName::Health,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CommandName::Install => "install",
            CommandName::Uninstall => "uninstall",
            CommandName::Switch => "switch",
            CommandName::Query => "query",
            CommandName::Health => "health",
        }
    }

    /// Whether the command mutates the registry
    pub fn is_mutating(self) -> bool {
        matches!(
            self,
            CommandName::Install | CommandName::Uninstall | CommandName::Switch
        )
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandName {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CommandName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| CommandError::UnknownCommand(s.to_string()))
    }
}

/// Module a command targets; version may be omitted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleTarget {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ModuleTarget {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }

    pub fn versioned(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: Some(version.into()),
        }
    }

    /// Full key when a version is given
    pub fn key(&self) -> Option<ModuleKey> {
        self.version
            .as_ref()
            .map(|v| ModuleKey::new(self.name.clone(), v.clone()))
    }

    /// Per-module lock key: `name@version`, or `name` alone
    pub fn lock_key(&self) -> String {
        match &self.version {
            Some(version) => format!("{}@{}", self.name, version),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for ModuleTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lock_key())
    }
}

/// A command request
///
/// The name is kept as a string so unknown names reach the engine and are
/// rejected there with `UnknownCommand`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ModuleTarget>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            target: None,
        }
    }

    pub fn with_target(mut self, target: ModuleTarget) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// `install name@version` from `location`
    pub fn install(
        name: impl Into<String>,
        version: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self::new(CommandName::Install.as_str())
            .with_target(ModuleTarget::versioned(name, version))
            .with_arg(location)
    }

    /// `switch name` to `version`
    pub fn switch(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self::new(CommandName::Switch.as_str())
            .with_target(ModuleTarget::versioned(name, version))
    }

    /// `uninstall name[@version]` (active version when omitted)
    pub fn uninstall(name: impl Into<String>, version: Option<&str>) -> Self {
        let target = match version {
            Some(v) => ModuleTarget::versioned(name, v),
            None => ModuleTarget::new(name),
        };
        Self::new(CommandName::Uninstall.as_str()).with_target(target)
    }

    pub fn query() -> Self {
        Self::new(CommandName::Query.as_str())
    }

    pub fn health() -> Self {
        Self::new(CommandName::Health.as_str())
    }
}

/// Failure kinds carried across the transport boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    DuplicateModule,
    IllegalTransition,
    StillActive,
    UnknownCommand,
    Busy,
    InternalError,
    InstallFailed,
    AlreadyInstalled,
    TargetNotInstalled,
    NotInstalled,
    LoadError,
    ReleaseError,
    NotBootstrapped,
    InvalidArguments,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Errors raised while executing a command
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("module {key} is busy (lock not acquired within {waited:?})")]
    Busy { key: String, waited: Duration },

    #[error("module {0} is already installed")]
    AlreadyInstalled(ModuleKey),

    #[error("switch target {0} is not installed")]
    TargetNotInstalled(String),

    #[error("module {0} is not installed")]
    NotInstalled(String),

    #[error("artifact for {key} cannot be loaded: {source}")]
    LoadError {
        key: ModuleKey,
        #[source]
        source: LoaderError,
    },

    #[error("install of {key} failed: {source}")]
    InstallFailed {
        key: ModuleKey,
        #[source]
        source: LoaderError,
    },

    #[error("release of {key} failed: {source}")]
    ReleaseError {
        key: ModuleKey,
        #[source]
        source: LoaderError,
    },

    #[error("command service is not bootstrapped")]
    NotBootstrapped,

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CommandError {
    /// Kind reported to the caller
    pub fn kind(&self) -> ErrorKind {
        match self {
            CommandError::UnknownCommand(_) => ErrorKind::UnknownCommand,
            CommandError::InvalidArguments(_) => ErrorKind::InvalidArguments,
            CommandError::Busy { .. } => ErrorKind::Busy,
            CommandError::AlreadyInstalled(_) => ErrorKind::AlreadyInstalled,
            CommandError::TargetNotInstalled(_) => ErrorKind::TargetNotInstalled,
            CommandError::NotInstalled(_) => ErrorKind::NotInstalled,
            CommandError::LoadError { .. } => ErrorKind::LoadError,
            CommandError::InstallFailed { .. } => ErrorKind::InstallFailed,
            CommandError::ReleaseError { .. } => ErrorKind::ReleaseError,
            CommandError::NotBootstrapped => ErrorKind::NotBootstrapped,
            CommandError::Registry(RegistryError::DuplicateModule(_)) => ErrorKind::DuplicateModule,
            CommandError::Registry(_) => ErrorKind::InternalError,
            CommandError::Internal(_) => ErrorKind::InternalError,
        }
    }

    /// Message safe to return to the caller
    ///
    /// Registry contract violations are reduced to a generic message; the
    /// detail only goes to the log.
    pub fn public_message(&self) -> String {
        match self {
            CommandError::Registry(RegistryError::DuplicateModule(key)) => {
                format!("module {} is already registered", key)
            }
            CommandError::Registry(_) => "internal registry error".to_string(),
            other => other.to_string(),
        }
    }

    /// Whether the error is a contract violation rather than a user outcome
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, CommandError::Registry(_) | CommandError::Internal(_))
    }
}

/// Success payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum CommandPayload {
    Installed(ModuleInstance),
    Switched {
        name: String,
        from: Option<String>,
        to: String,
    },
    Uninstalled(ModuleInstance),
    Modules(Vec<ModuleInstance>),
    Health(HealthReport),
}

/// Outcome of one dispatch: a payload or a failure, never both
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CommandResult {
    Success { payload: CommandPayload },
    Failure { kind: ErrorKind, message: String },
}

impl CommandResult {
    pub fn success(payload: CommandPayload) -> Self {
        CommandResult::Success { payload }
    }

    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        CommandResult::Failure {
            kind,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CommandResult::Success { .. })
    }

    /// Failure kind, `None` on success
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            CommandResult::Success { .. } => None,
            CommandResult::Failure { kind, .. } => Some(*kind),
        }
    }

    pub fn payload(&self) -> Option<&CommandPayload> {
        match self {
            CommandResult::Success { payload } => Some(payload),
            CommandResult::Failure { .. } => None,
        }
    }

    /// Listed modules of a successful `query`
    pub fn modules(&self) -> Option<&[ModuleInstance]> {
        match self.payload()? {
            CommandPayload::Modules(modules) => Some(modules),
            _ => None,
        }
    }
}

impl From<CommandError> for CommandResult {
    fn from(err: CommandError) -> Self {
        CommandResult::failure(err.kind(), err.public_message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::traits::ModuleState;

    #[test]
    fn test_command_name_parsing() {
        assert_eq!("install".parse::<CommandName>(), Ok(CommandName::Install));
        assert_eq!("health".parse::<CommandName>(), Ok(CommandName::Health));
        assert_eq!(
            "frobnicate".parse::<CommandName>(),
            Err(CommandError::UnknownCommand("frobnicate".to_string()))
        );
        assert!("Install".parse::<CommandName>().is_err());
    }

    #[test]
    fn test_lock_keys() {
        assert_eq!(ModuleTarget::new("biz").lock_key(), "biz");
        assert_eq!(ModuleTarget::versioned("biz", "1.0").lock_key(), "biz@1.0");
        assert!(ModuleTarget::new("biz").key().is_none());
    }

    #[test]
    fn test_error_kinds() {
        let dup = CommandError::from(RegistryError::DuplicateModule(ModuleKey::new("m", "1")));
        assert_eq!(dup.kind(), ErrorKind::DuplicateModule);

        let illegal = CommandError::from(RegistryError::IllegalTransition {
            key: ModuleKey::new("m", "1"),
            from: ModuleState::Failed,
            to: ModuleState::Installed,
        });
        assert_eq!(illegal.kind(), ErrorKind::InternalError);
        assert!(!illegal.public_message().contains("Failed"));
        assert!(illegal.is_contract_violation());
    }

    #[test]
    fn test_result_from_error() {
        let result: CommandResult = CommandError::NotInstalled("m@1".to_string()).into();
        assert_eq!(result.kind(), Some(ErrorKind::NotInstalled));
        assert!(result.payload().is_none());
    }

    #[test]
    fn test_wire_format() {
        let command = Command::install("biz", "1.0.0", "file:///biz.jar");
        let json = serde_json::to_value(&command).unwrap();
        assert_eq!(json["name"], "install");
        assert_eq!(json["target"]["version"], "1.0.0");

        let decoded: Command =
            serde_json::from_str(r#"{"name":"query","args":["state=installed"]}"#).unwrap();
        assert_eq!(decoded.args, vec!["state=installed"]);
        assert!(decoded.target.is_none());

        let failure = CommandResult::failure(ErrorKind::Busy, "try later");
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["status"], "failure");
        assert_eq!(json["kind"], "Busy");
    }
}
