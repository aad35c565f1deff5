//! `health`: registry health report
//!
//! Instances stuck in `Uninstalling` hold a scope the loader failed to
//! release; they are reported as leaks and degrade the overall status.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{CommandHandler, HandlerContext};
use crate::command::types::{Command, CommandError, CommandName, CommandPayload};
use crate::module::traits::{ModuleKey, ModuleState};
use crate::utils::time::current_timestamp;

/// Overall health status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum HealthStatus {
    /// Operating normally
    Healthy,
    /// Functional, with scopes awaiting release
    Degraded,
}

/// Registry health report
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthReport {
    pub overall_status: HealthStatus,
    /// Non-terminal instances
    pub module_count: usize,
    /// Instance count per lifecycle state (non-terminal states only)
    pub state_counts: BTreeMap<String, usize>,
    /// Module name -> active version
    pub active_versions: BTreeMap<String, String>,
    /// Instances whose scope release failed
    pub leaked: Vec<ModuleKey>,
    /// Retired records still held for audit
    pub retired_count: usize,
    /// Timestamp of report generation
    pub timestamp: u64,
    pub uptime_seconds: u64,
}

impl HealthReport {
    pub fn count(&self, state: ModuleState) -> usize {
        self.state_counts.get(state.as_str()).copied().unwrap_or(0)
    }
}

pub struct HealthHandler;

impl HealthHandler {
    pub fn report(ctx: &HandlerContext) -> HealthReport {
        let snapshot = ctx.registry.snapshot();

        let mut state_counts = BTreeMap::new();
        for instance in &snapshot {
            *state_counts
                .entry(instance.state.as_str().to_string())
                .or_insert(0) += 1;
        }

        let leaked: Vec<ModuleKey> = ctx
            .registry
            .leaked()
            .iter()
            .map(|i| i.key())
            .collect();

        let overall_status = if leaked.is_empty() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };

        HealthReport {
            overall_status,
            module_count: snapshot.len(),
            state_counts,
            active_versions: ctx.registry.active_versions(),
            leaked,
            retired_count: ctx.registry.retired().len(),
            timestamp: current_timestamp(),
            uptime_seconds: ctx.started_at.elapsed().as_secs(),
        }
    }
}

#[async_trait]
impl CommandHandler for HealthHandler {
    fn name(&self) -> CommandName {
        CommandName::Health
    }

    async fn handle(
        &self,
        command: &Command,
        ctx: &HandlerContext,
    ) -> Result<CommandPayload, CommandError> {
        if !command.args.is_empty() {
            return Err(CommandError::InvalidArguments(
                "health takes no arguments".to_string(),
            ));
        }
        Ok(CommandPayload::Health(Self::report(ctx)))
    }
}
