//! `query [state=<state>] [terminal=true]`
//!
//! Read-only listing of the registry snapshot, optionally narrowed by the
//! command target (name, version) and extended with retired records.

use async_trait::async_trait;

use super::{CommandHandler, HandlerContext};
use crate::command::types::{Command, CommandError, CommandName, CommandPayload};
use crate::module::traits::{ModuleInstance, ModuleState};

/// Parsed query filters
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct QueryFilter {
    pub name: Option<String>,
    pub version: Option<String>,
    pub state: Option<ModuleState>,
    pub include_terminal: bool,
}

impl QueryFilter {
    pub fn from_command(command: &Command) -> Result<Self, CommandError> {
        let mut filter = QueryFilter {
            name: command.target.as_ref().map(|t| t.name.clone()),
            version: command.target.as_ref().and_then(|t| t.version.clone()),
            ..Default::default()
        };

        for arg in &command.args {
            let (key, value) = arg.split_once('=').ok_or_else(|| {
                CommandError::InvalidArguments(format!("expected key=value, got {:?}", arg))
            })?;
            match key.trim() {
                "state" => {
                    filter.state = Some(
                        value
                            .parse::<ModuleState>()
                            .map_err(CommandError::InvalidArguments)?,
                    );
                }
                "terminal" => {
                    filter.include_terminal = value.trim().parse::<bool>().map_err(|_| {
                        CommandError::InvalidArguments(format!(
                            "terminal expects true or false, got {:?}",
                            value
                        ))
                    })?;
                }
                other => {
                    return Err(CommandError::InvalidArguments(format!(
                        "unknown query filter: {}",
                        other
                    )));
                }
            }
        }
        Ok(filter)
    }

    pub fn matches(&self, instance: &ModuleInstance) -> bool {
        self.name.as_deref().map_or(true, |n| n == instance.name())
            && self.version.as_deref().map_or(true, |v| v == instance.version())
            && self.state.map_or(true, |s| s == instance.state)
    }
}

pub struct QueryHandler;

#[async_trait]
impl CommandHandler for QueryHandler {
    fn name(&self) -> CommandName {
        CommandName::Query
    }

    async fn handle(
        &self,
        command: &Command,
        ctx: &HandlerContext,
    ) -> Result<CommandPayload, CommandError> {
        let filter = QueryFilter::from_command(command)?;

        let mut modules: Vec<ModuleInstance> = ctx
            .registry
            .snapshot()
            .into_iter()
            .filter(|m| filter.matches(m))
            .collect();

        if filter.include_terminal {
            modules.extend(ctx.registry.retired().into_iter().filter(|m| filter.matches(m)));
        }

        Ok(CommandPayload::Modules(modules))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::types::ModuleTarget;

    #[test]
    fn test_filter_parsing() {
        let command = Command::query()
            .with_target(ModuleTarget::new("biz"))
            .with_arg("state=Installed")
            .with_arg("terminal=true");
        let filter = QueryFilter::from_command(&command).unwrap();

        assert_eq!(filter.name.as_deref(), Some("biz"));
        assert_eq!(filter.state, Some(ModuleState::Installed));
        assert!(filter.include_terminal);
    }

    #[test]
    fn test_filter_rejects_malformed_args() {
        for arg in ["state", "state=running", "terminal=maybe", "color=red"] {
            let command = Command::query().with_arg(arg);
            assert!(
                matches!(
                    QueryFilter::from_command(&command),
                    Err(CommandError::InvalidArguments(_))
                ),
                "{}",
                arg
            );
        }
    }
}
