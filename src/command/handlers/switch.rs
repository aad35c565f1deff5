//! `switch name@version`: re-point the active version of a module
//!
//! The previously active version stays installed; unloading it is a
//! separate uninstall.

use async_trait::async_trait;
use tracing::{error, info};

use super::{require_key, CommandHandler, HandlerContext};
use crate::command::types::{Command, CommandError, CommandName, CommandPayload};
use crate::module::traits::ModuleState;

pub struct SwitchHandler;

#[async_trait]
impl CommandHandler for SwitchHandler {
    fn name(&self) -> CommandName {
        CommandName::Switch
    }

    async fn handle(
        &self,
        command: &Command,
        ctx: &HandlerContext,
    ) -> Result<CommandPayload, CommandError> {
        let key = require_key(command)?;
        let validation = ctx.validator.validate_key(&key);
        if !validation.is_valid() {
            return Err(CommandError::InvalidArguments(validation.message()));
        }

        let target = ctx
            .registry
            .lookup(&key.name, Some(&key.version))
            .map_err(|_| CommandError::TargetNotInstalled(key.to_string()))?;
        if target.state != ModuleState::Installed {
            return Err(CommandError::TargetNotInstalled(format!(
                "{} ({})",
                key, target.state
            )));
        }

        if target.active {
            return Ok(CommandPayload::Switched {
                name: key.name,
                from: Some(key.version.clone()),
                to: key.version,
            });
        }

        ctx.registry.transition(target.id, ModuleState::Switching)?;

        let switched = ctx.registry.set_active(&key.name, &key.version);

        // Back to Installed whether or not the marker moved
        if let Err(e) = ctx.registry.transition(target.id, ModuleState::Installed) {
            error!("{} left in switching state: {}", key, e);
            return Err(e.into());
        }

        let from = switched?;
        info!(
            "Switched {} from {} to {}",
            key.name,
            from.as_deref().unwrap_or("<none>"),
            key.version
        );
        Ok(CommandPayload::Switched {
            name: key.name,
            from,
            to: key.version,
        })
    }
}
