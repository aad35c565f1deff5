//! Retired record log
//!
//! Terminal records removed from the live table are kept here for audit,
//! bounded by count and by age.

use std::collections::VecDeque;
use tracing::debug;

use crate::module::traits::ModuleInstance;

/// One retired record with its retirement time
#[derive(Debug, Clone)]
pub struct RetiredEntry {
    pub retired_at: u64,
    pub instance: ModuleInstance,
}

/// Bounded audit log of terminal records
#[derive(Debug)]
pub struct RetiredLog {
    entries: VecDeque<RetiredEntry>,
    /// Maximum retained entries
    capacity: usize,
    /// Maximum entry age in seconds
    ttl_secs: u64,
}

impl RetiredLog {
    pub fn new(capacity: usize, ttl_secs: u64) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(64)),
            capacity,
            ttl_secs,
        }
    }

    /// Append a retired record, evicting the oldest entries past capacity
    pub fn push(&mut self, instance: ModuleInstance, now: u64) {
        self.entries.push_back(RetiredEntry {
            retired_at: now,
            instance,
        });
        while self.entries.len() > self.capacity {
            if let Some(evicted) = self.entries.pop_front() {
                debug!("Evicted retired record {}", evicted.instance.key());
            }
        }
    }

    /// Drop entries older than the TTL; returns how many were pruned
    pub fn prune(&mut self, now: u64) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl_secs;
        self.entries
            .retain(|entry| now.saturating_sub(entry.retired_at) <= ttl);
        before - self.entries.len()
    }

    /// Retired records, oldest first
    pub fn instances(&self) -> Vec<ModuleInstance> {
        self.entries.iter().map(|e| e.instance.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::traits::{ArtifactRef, ModuleDescriptor, ModuleId, ModuleState};

    fn retired(name: &str, seq: u64) -> ModuleInstance {
        ModuleInstance {
            id: ModuleId::new(),
            sequence: seq,
            descriptor: ModuleDescriptor::new(name, "1.0.0", ArtifactRef::new("mem://x"), 0),
            state: ModuleState::Uninstalled,
            active: false,
            scope: None,
            updated_at: 0,
        }
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut log = RetiredLog::new(2, 600);
        log.push(retired("a", 1), 10);
        log.push(retired("b", 2), 11);
        log.push(retired("c", 3), 12);

        let names: Vec<String> = log
            .instances()
            .iter()
            .map(|i| i.name().to_string())
            .collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[test]
    fn test_prune_by_age() {
        let mut log = RetiredLog::new(10, 60);
        log.push(retired("old", 1), 100);
        log.push(retired("new", 2), 150);

        assert_eq!(log.prune(170), 1);
        assert_eq!(log.len(), 1);
        assert_eq!(log.instances()[0].name(), "new");
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let mut log = RetiredLog::new(0, 60);
        log.push(retired("a", 1), 1);
        assert!(log.is_empty());
    }
}
