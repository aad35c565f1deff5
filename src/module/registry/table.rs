//! Module registry
//!
//! Process-wide table of module instances keyed by (name, version). The
//! registry is the single source of truth for what is installed: it alone
//! creates records, applies lifecycle transitions and retires them.
//!
//! Every operation runs under one table lock, so mutations are linearized
//! per registry. The lock is a plain `std::sync::Mutex` and is never held
//! across an `.await`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::module::registry::retired::RetiredLog;
use crate::module::traits::{
    ModuleDescriptor, ModuleId, ModuleInstance, ModuleKey, ModuleState, RegistryError,
    ScopeHandle,
};
use crate::utils::time::current_timestamp;

/// Default number of retired records kept for audit
pub const DEFAULT_RETIRED_CAPACITY: usize = 256;

/// Default age (seconds) after which retired records are pruned
pub const DEFAULT_RETIRED_TTL_SECS: u64 = 600;

/// Live record (the registry never hands these out directly)
#[derive(Debug, Clone)]
struct Record {
    id: ModuleId,
    sequence: u64,
    descriptor: ModuleDescriptor,
    state: ModuleState,
    scope: Option<ScopeHandle>,
    updated_at: u64,
}

#[derive(Debug)]
struct Table {
    next_sequence: u64,
    /// Records by install sequence (iteration = install order)
    records: BTreeMap<u64, Record>,
    /// Record id -> sequence
    ids: HashMap<ModuleId, u64>,
    /// Non-terminal records by key
    keys: HashMap<ModuleKey, u64>,
    /// Module name -> active version
    active: HashMap<String, String>,
    retired: RetiredLog,
}

impl Table {
    fn view(&self, record: &Record) -> ModuleInstance {
        let active = self
            .active
            .get(&record.descriptor.name)
            .map_or(false, |v| *v == record.descriptor.version);
        ModuleInstance {
            id: record.id,
            sequence: record.sequence,
            descriptor: record.descriptor.clone(),
            state: record.state,
            active,
            scope: record.scope.clone(),
            updated_at: record.updated_at,
        }
    }

    fn record_mut(&mut self, id: ModuleId) -> Result<&mut Record, RegistryError> {
        let seq = *self
            .ids
            .get(&id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        self.records
            .get_mut(&seq)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }
}

/// Registry of installed module instances
#[derive(Debug)]
pub struct ModuleRegistry {
    table: Mutex<Table>,
}

impl ModuleRegistry {
    /// Create an empty registry with default audit retention
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETIRED_CAPACITY, DEFAULT_RETIRED_TTL_SECS)
    }

    /// Create an empty registry with explicit audit retention
    pub fn with_retention(retired_capacity: usize, retired_ttl_secs: u64) -> Self {
        Self {
            table: Mutex::new(Table {
                next_sequence: 0,
                records: BTreeMap::new(),
                ids: HashMap::new(),
                keys: HashMap::new(),
                active: HashMap::new(),
                retired: RetiredLog::new(retired_capacity, retired_ttl_secs),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        // Every mutation validates before writing, so a poisoned table is
        // still consistent.
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a new record in `Installing` state
    ///
    /// Fails with `DuplicateModule` if a non-terminal record with the same
    /// (name, version) exists.
    pub fn install(&self, descriptor: ModuleDescriptor) -> Result<ModuleInstance, RegistryError> {
        let key = descriptor.key();
        let mut table = self.lock();

        if table.keys.contains_key(&key) {
            return Err(RegistryError::DuplicateModule(key));
        }

        let sequence = table.next_sequence;
        table.next_sequence += 1;

        let record = Record {
            id: ModuleId::new(),
            sequence,
            descriptor,
            state: ModuleState::Installing,
            scope: None,
            updated_at: current_timestamp(),
        };
        let view = table.view(&record);

        table.ids.insert(record.id, sequence);
        table.keys.insert(key.clone(), sequence);
        table.records.insert(sequence, record);

        debug!("Registered {} as {} (installing)", key, view.id);
        Ok(view)
    }

    /// Apply a lifecycle transition
    ///
    /// Side effects on the active-version marker:
    /// - the first version of a name reaching `Installed` becomes active
    /// - an active version entering `Uninstalling` loses the marker
    pub fn transition(
        &self,
        id: ModuleId,
        next: ModuleState,
    ) -> Result<ModuleInstance, RegistryError> {
        let mut table = self.lock();
        let record = table.record_mut(id)?;
        let from = record.state;
        let key = record.descriptor.key();

        if !from.can_transition_to(next) {
            return Err(RegistryError::IllegalTransition {
                key,
                from,
                to: next,
            });
        }

        record.state = next;
        record.updated_at = current_timestamp();
        if next == ModuleState::Uninstalled {
            record.scope = None;
        }

        match (from, next) {
            (ModuleState::Installing, ModuleState::Installed) => {
                if !table.active.contains_key(&key.name) {
                    info!("{} is now the active version of {}", key.version, key.name);
                    table.active.insert(key.name.clone(), key.version.clone());
                }
            }
            (_, ModuleState::Uninstalling) => {
                if table.active.get(&key.name) == Some(&key.version) {
                    info!("Clearing active version of {} ({})", key.name, key.version);
                    table.active.remove(&key.name);
                }
            }
            _ => {}
        }

        if next.is_terminal() {
            table.keys.remove(&key);
        }

        debug!("{}: {} -> {}", key, from, next);
        let seq = table.ids[&id];
        Ok(table.view(&table.records[&seq]))
    }

    /// Record the isolation scope materialized for an `Installing` record
    pub fn attach_scope(&self, id: ModuleId, scope: ScopeHandle) -> Result<(), RegistryError> {
        let mut table = self.lock();
        let record = table.record_mut(id)?;
        if record.state != ModuleState::Installing {
            return Err(RegistryError::IllegalTransition {
                key: record.descriptor.key(),
                from: record.state,
                to: ModuleState::Installed,
            });
        }
        record.scope = Some(scope);
        Ok(())
    }

    /// Look up a module
    ///
    /// With a version: the non-terminal record for (name, version).
    /// Without: the active version for `name`, if one is marked.
    pub fn lookup(&self, name: &str, version: Option<&str>) -> Result<ModuleInstance, RegistryError> {
        let table = self.lock();
        let version = match version {
            Some(v) => v.to_string(),
            None => table
                .active
                .get(name)
                .cloned()
                .ok_or_else(|| RegistryError::NotFound(format!("{} (no active version)", name)))?,
        };
        let key = ModuleKey::new(name, version);
        let seq = table
            .keys
            .get(&key)
            .ok_or_else(|| RegistryError::NotFound(key.to_string()))?;
        Ok(table.view(&table.records[seq]))
    }

    /// Look up a record by id, including terminal records not yet removed
    pub fn get(&self, id: ModuleId) -> Option<ModuleInstance> {
        let table = self.lock();
        let seq = table.ids.get(&id)?;
        table.records.get(seq).map(|r| table.view(r))
    }

    /// Instance currently receiving routed calls for `name`
    pub fn route(&self, name: &str) -> Option<ModuleInstance> {
        self.lookup(name, None)
            .ok()
            .filter(ModuleInstance::is_routable)
    }

    /// Active version for `name`
    pub fn active_version(&self, name: &str) -> Option<String> {
        self.lock().active.get(name).cloned()
    }

    /// Active version of every module name
    pub fn active_versions(&self) -> BTreeMap<String, String> {
        self.lock()
            .active
            .iter()
            .map(|(name, version)| (name.clone(), version.clone()))
            .collect()
    }

    /// Re-point the active marker of `name` to `version`
    ///
    /// The target must be `Installed` or `Switching`. Returns the previously
    /// active version.
    pub fn set_active(&self, name: &str, version: &str) -> Result<Option<String>, RegistryError> {
        let mut table = self.lock();
        let key = ModuleKey::new(name, version);
        let seq = *table
            .keys
            .get(&key)
            .ok_or_else(|| RegistryError::NotFound(key.to_string()))?;
        let state = table.records[&seq].state;
        if !matches!(state, ModuleState::Installed | ModuleState::Switching) {
            return Err(RegistryError::NotRoutable { key, state });
        }
        let previous = table.active.insert(key.name.clone(), key.version.clone());
        info!(
            "Active version of {} switched {} -> {}",
            key.name,
            previous.as_deref().unwrap_or("<none>"),
            key.version
        );
        Ok(previous)
    }

    /// All non-terminal instances in install order
    pub fn snapshot(&self) -> Vec<ModuleInstance> {
        let table = self.lock();
        table
            .records
            .values()
            .filter(|r| !r.state.is_terminal())
            .map(|r| table.view(r))
            .collect()
    }

    /// Delete a terminal record from the live table, moving it to the audit log
    pub fn remove(&self, id: ModuleId) -> Result<ModuleInstance, RegistryError> {
        let mut table = self.lock();
        let seq = *table
            .ids
            .get(&id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        let state = table.records[&seq].state;
        if !state.is_terminal() {
            return Err(RegistryError::StillActive {
                key: table.records[&seq].descriptor.key(),
                state,
            });
        }

        let view = table.view(&table.records[&seq]);
        table.records.remove(&seq);
        table.ids.remove(&id);
        let now = current_timestamp();
        table.retired.prune(now);
        table.retired.push(view.clone(), now);

        debug!("Retired {} ({})", view.key(), view.state);
        Ok(view)
    }

    /// Retired terminal records still within retention, oldest first
    pub fn retired(&self) -> Vec<ModuleInstance> {
        self.prune_retired();
        self.lock().retired.instances()
    }

    /// Prune retired records past their retention age
    ///
    /// Also applied whenever a record is retired or the log is read.
    pub fn prune_retired(&self) -> usize {
        let pruned = self.lock().retired.prune(current_timestamp());
        if pruned > 0 {
            debug!("Pruned {} retired module records", pruned);
        }
        pruned
    }

    /// Instances stuck in `Uninstalling` (scope release failed)
    pub fn leaked(&self) -> Vec<ModuleInstance> {
        let table = self.lock();
        let leaked: Vec<ModuleInstance> = table
            .records
            .values()
            .filter(|r| r.state == ModuleState::Uninstalling)
            .map(|r| table.view(r))
            .collect();
        if !leaked.is_empty() {
            warn!("{} module scope(s) awaiting release retry", leaked.len());
        }
        leaked
    }

    /// Number of non-terminal records
    pub fn len(&self) -> usize {
        self.lock().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
