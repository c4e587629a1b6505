//! Peripheral Registry
//!
//! De-duplicating map of peripheral id to [`PeripheralRecord`]. This is the
//! only place where discovered/connected state is mutated. Iteration order is
//! first-insertion order so list rows stay put while their contents change.

use crate::domain::models::{FlagUpdate, PeripheralRecord};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct PeripheralRegistry {
    records: Vec<PeripheralRecord>,
    index: HashMap<String, usize>,
    scan_generation: u64,
}

impl PeripheralRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a record by id.
    ///
    /// Name, RSSI and service UUIDs take the incoming values. `connected` is
    /// kept unless `flag` sets it, `discovered` never goes back to false.
    pub fn upsert(&mut self, mut record: PeripheralRecord, flag: FlagUpdate) {
        match self.index.get(&record.id).copied() {
            Some(slot) => {
                let existing = &mut self.records[slot];
                record.connected = match flag {
                    FlagUpdate::Preserve => existing.connected,
                    FlagUpdate::Set(value) => value,
                };
                if existing.discovered {
                    record.discovered = true;
                    record.last_scan = record.last_scan.max(existing.last_scan);
                }
                *existing = record;
            }
            None => {
                if let FlagUpdate::Set(value) = flag {
                    record.connected = value;
                }
                self.index.insert(record.id.clone(), self.records.len());
                self.records.push(record);
            }
        }
    }

    /// Record a discovery made during the current scan generation.
    pub fn record_discovery(&mut self, mut record: PeripheralRecord) {
        record.discovered = true;
        record.last_scan = self.scan_generation;
        self.upsert(record, FlagUpdate::Preserve);
    }

    /// Change only the `connected` flag, creating a minimal record if needed.
    pub fn set_connected(&mut self, id: &str, value: bool) {
        match self.index.get(id).copied() {
            Some(slot) => self.records[slot].connected = value,
            None => {
                let mut record = PeripheralRecord::new(id);
                record.connected = value;
                self.upsert(record, FlagUpdate::Preserve);
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&PeripheralRecord> {
        self.index.get(id).map(|&slot| &self.records[slot])
    }

    pub fn is_connected(&self, id: &str) -> bool {
        self.get(id).map_or(false, |r| r.connected)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn snapshot_all(&self) -> Vec<PeripheralRecord> {
        self.records.clone()
    }

    pub fn snapshot_connected(&self) -> Vec<PeripheralRecord> {
        self.records.iter().filter(|r| r.connected).cloned().collect()
    }

    pub fn snapshot_discovered(&self) -> Vec<PeripheralRecord> {
        self.records.iter().filter(|r| r.discovered).cloned().collect()
    }

    /// Open a new scan generation and return it.
    pub fn begin_scan(&mut self) -> u64 {
        self.scan_generation += 1;
        self.scan_generation
    }

    pub fn scan_generation(&self) -> u64 {
        self.scan_generation
    }

    /// Drop discovered, disconnected peripherals not seen since `generation`.
    /// Ids in `pinned` are kept regardless.
    ///
    /// Returns the number of records removed.
    pub fn prune_stale(&mut self, generation: u64, pinned: &HashSet<String>) -> usize {
        let before = self.records.len();
        self.records.retain(|r| {
            r.connected || !r.discovered || r.last_scan >= generation || pinned.contains(&r.id)
        });
        let removed = before - self.records.len();
        if removed > 0 {
            self.index = self
                .records
                .iter()
                .enumerate()
                .map(|(slot, r)| (r.id.clone(), slot))
                .collect();
        }
        removed
    }
}
