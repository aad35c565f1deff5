//! `uninstall name[@version]`
//!
//! Without a version the active version is uninstalled. The version is
//! pinned before the module lock is taken, so a concurrent switch cannot
//! redirect the command to a version it does not hold. A failed release
//! leaves the instance `Uninstalling`; a later uninstall retries only the
//! release.

use async_trait::async_trait;
use tracing::{info, warn};

use super::{require_target, CommandHandler, HandlerContext};
use crate::command::types::{Command, CommandError, CommandName, CommandPayload, ModuleTarget};
use crate::module::loader::LoaderError;
use crate::module::traits::{ModuleInstance, ModuleState};
use crate::utils::timeout::with_loader_timeout;

pub struct UninstallHandler;

impl UninstallHandler {
    fn resolve(command: &Command, ctx: &HandlerContext) -> Result<ModuleInstance, CommandError> {
        let target = require_target(command)?;
        // Unpinned means there was no active version when the command arrived
        let version = target.version.as_deref().ok_or_else(|| {
            CommandError::NotInstalled(format!("{} (no active version)", target.name))
        })?;
        ctx.registry
            .lookup(&target.name, Some(version))
            .map_err(|_| CommandError::NotInstalled(target.to_string()))
    }
}

#[async_trait]
impl CommandHandler for UninstallHandler {
    fn name(&self) -> CommandName {
        CommandName::Uninstall
    }

    /// Fill in the active version when the caller named only the module
    fn pin(&self, command: &Command, ctx: &HandlerContext) -> Result<Command, CommandError> {
        let target = require_target(command)?;
        if target.version.is_some() {
            return Ok(command.clone());
        }
        Ok(match ctx.registry.active_version(&target.name) {
            Some(version) => command
                .clone()
                .with_target(ModuleTarget::versioned(&target.name, version)),
            None => command.clone(),
        })
    }

    async fn handle(
        &self,
        command: &Command,
        ctx: &HandlerContext,
    ) -> Result<CommandPayload, CommandError> {
        let instance = Self::resolve(command, ctx)?;
        let key = instance.key();

        let retry = match instance.state {
            ModuleState::Installed => {
                ctx.registry.transition(instance.id, ModuleState::Uninstalling)?;
                info!("Uninstalling {}", key);
                false
            }
            ModuleState::Uninstalling => {
                info!("Retrying scope release for {}", key);
                true
            }
            other => {
                return Err(CommandError::NotInstalled(format!("{} ({})", key, other)));
            }
        };

        if let Some(scope) = &instance.scope {
            let released = with_loader_timeout(
                "release",
                ctx.loader_timeout,
                ctx.loader.release(scope, ctx.loader_timeout),
            )
            .await;
            match released {
                Ok(()) => {}
                // An earlier attempt dropped the scope before reporting failure
                Err(LoaderError::ScopeNotLoaded(_)) if retry => {
                    warn!(
                        "Scope {} of {} was already released by the loader",
                        scope.namespace, key
                    );
                }
                Err(source) => {
                    warn!(
                        "Scope {} of {} not released, left uninstalling: {}",
                        scope.namespace, key, source
                    );
                    return Err(CommandError::ReleaseError { key, source });
                }
            }
        }

        ctx.registry.transition(instance.id, ModuleState::Uninstalled)?;
        let retired = ctx.registry.remove(instance.id)?;
        info!("Uninstalled {}", key);
        Ok(CommandPayload::Uninstalled(retired))
    }
}
