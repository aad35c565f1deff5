//! `install name@version <location> [checksum]`

use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use tracing::{error, info, warn};

use super::{require_key, CommandHandler, HandlerContext};
use crate::command::types::{Command, CommandError, CommandName, CommandPayload};
use crate::module::loader::LoaderError;
use crate::module::traits::{ArtifactRef, ModuleDescriptor, ModuleId, ModuleState};
use crate::utils::time::current_timestamp;
use crate::utils::timeout::with_loader_timeout;

pub struct InstallHandler;

impl InstallHandler {
    fn artifact(command: &Command) -> Result<ArtifactRef, CommandError> {
        let location = command.args.first().ok_or_else(|| {
            CommandError::InvalidArguments("install requires an artifact location".to_string())
        })?;
        let mut artifact = ArtifactRef::new(location.clone());
        if let Some(checksum) = command.args.get(1) {
            artifact = artifact.with_checksum(checksum.clone());
        }
        if command.args.len() > 2 {
            return Err(CommandError::InvalidArguments(format!(
                "install takes at most 2 arguments, got {}",
                command.args.len()
            )));
        }
        Ok(artifact)
    }

    /// Move a record that will never be promoted to `Failed` and retire it
    fn fail(ctx: &HandlerContext, id: ModuleId) {
        let retired = ctx
            .registry
            .transition(id, ModuleState::Failed)
            .and_then(|_| ctx.registry.remove(id));
        if let Err(e) = retired {
            error!("Could not retire failed install {}: {}", id, e);
        }
    }
}

#[async_trait]
impl CommandHandler for InstallHandler {
    fn name(&self) -> CommandName {
        CommandName::Install
    }

    async fn handle(
        &self,
        command: &Command,
        ctx: &HandlerContext,
    ) -> Result<CommandPayload, CommandError> {
        let key = require_key(command)?;
        let artifact = Self::artifact(command)?;

        let validation = ctx.validator.validate_install(&key, &artifact);
        if !validation.is_valid() {
            return Err(CommandError::InvalidArguments(validation.message()));
        }

        // No silent replace of a live version
        if let Ok(existing) = ctx.registry.lookup(&key.name, Some(&key.version)) {
            if matches!(existing.state, ModuleState::Installed | ModuleState::Switching) {
                return Err(CommandError::AlreadyInstalled(key));
            }
        }

        ctx.loader
            .resolve(&artifact)
            .await
            .map_err(|source| CommandError::LoadError {
                key: key.clone(),
                source,
            })?;

        let descriptor =
            ModuleDescriptor::new(key.name.clone(), key.version.clone(), artifact, current_timestamp());
        let record = ctx.registry.install(descriptor.clone())?;
        info!("Installing {} from {}", key, descriptor.artifact.location);

        let materialized = AssertUnwindSafe(with_loader_timeout(
            "materialize",
            ctx.loader_timeout,
            ctx.loader.materialize(&descriptor, ctx.loader_timeout),
        ))
        .catch_unwind()
        .await
        .unwrap_or_else(|_| Err(LoaderError::Load("loader panicked".to_string())));

        let scope = match materialized {
            Ok(scope) => scope,
            Err(source) => {
                warn!("Install of {} failed: {}", key, source);
                Self::fail(ctx, record.id);
                return Err(CommandError::InstallFailed { key, source });
            }
        };

        let promoted = ctx
            .registry
            .attach_scope(record.id, scope.clone())
            .and_then(|_| ctx.registry.transition(record.id, ModuleState::Installed));

        match promoted {
            Ok(instance) => {
                info!("Installed {} in scope {}", key, scope.namespace);
                Ok(CommandPayload::Installed(instance))
            }
            Err(e) => {
                // The scope is ours to give back; the record never went live
                error!("Could not promote {}: {}", key, e);
                if let Err(release) = ctx.loader.release(&scope, ctx.loader_timeout).await {
                    warn!("Releasing orphaned scope {} failed: {}", scope.namespace, release);
                }
                Self::fail(ctx, record.id);
                Err(e.into())
            }
        }
    }
}
