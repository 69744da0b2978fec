//! Code cache and self-modifying-code tracker.
//!
//! Keyed by 6502 entry address, with a reverse byte-address index so
//! a write can find every affected cache entry in `O(log n)` rather
//! than scanning the whole cache — the same "index built once,
//! resolution stays cheap" shape as `MemoryBus`.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::generator::CompiledFn;

/// One compiled 6502 function, keyed by its entry address.
pub struct CompiledEntry {
    pub entry_address: u16,
    pub byte_range_covered: BTreeSet<u16>,
    pub routine: CompiledFn,
    pub allowed_smc_targets: BTreeSet<u16>,
}

/// The result of routing one memory write through the tracker: which
/// entries were evicted, and whether the write was recorded as a new
/// self-modifying-code target for the function it occurred inside of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmcEffect {
    pub evicted: Vec<u16>,
    pub recorded_smc_target_for: Option<u16>,
}

/// Reverse index from a 6502 byte address to the entry addresses of
/// every cached function whose `byte_range_covered` contains it, plus
/// the set of addresses known to be self-modified per entry — the
/// latter survives eviction so the next compile of that entry knows
/// to lift the address dynamically.
#[derive(Default)]
struct SmcTracker {
    coverage: BTreeMap<u16, BTreeSet<u16>>,
    smc_targets_by_entry: HashMap<u16, BTreeSet<u16>>,
}

impl SmcTracker {
    fn record_coverage(&mut self, entry_address: u16, range: &BTreeSet<u16>) {
        for &addr in range {
            self.coverage.entry(addr).or_default().insert(entry_address);
        }
    }

    fn remove_coverage(&mut self, entry_address: u16, range: &BTreeSet<u16>) {
        for addr in range {
            if let Some(entries) = self.coverage.get_mut(addr) {
                entries.remove(&entry_address);
                if entries.is_empty() {
                    self.coverage.remove(addr);
                }
            }
        }
    }

    fn entries_covering(&self, addr: u16) -> Vec<u16> {
        self.coverage.get(&addr).map(|set| set.iter().copied().collect()).unwrap_or_default()
    }
}

pub struct CodeCache {
    entries: HashMap<u16, CompiledEntry>,
    tracker: SmcTracker,
}

impl CodeCache {
    pub fn new() -> Self {
        Self { entries: HashMap::new(), tracker: SmcTracker::default() }
    }

    pub fn get(&self, entry_address: u16) -> Option<&CompiledEntry> {
        self.entries.get(&entry_address)
    }

    pub fn contains(&self, entry_address: u16) -> bool {
        self.entries.contains_key(&entry_address)
    }

    /// Self-modifying-code targets previously recorded for this entry
    /// address, to feed the lifter on (re)compilation.
    pub fn smc_targets_for(&self, entry_address: u16) -> BTreeSet<u16> {
        self.tracker.smc_targets_by_entry.get(&entry_address).cloned().unwrap_or_default()
    }

    pub fn insert(&mut self, entry: CompiledEntry) {
        log::debug!(
            "caching function at {:#06x} covering {} bytes",
            entry.entry_address,
            entry.byte_range_covered.len()
        );
        self.tracker.record_coverage(entry.entry_address, &entry.byte_range_covered);
        self.entries.insert(entry.entry_address, entry);
    }

    pub fn evict(&mut self, entry_address: u16) -> Option<CompiledEntry> {
        let entry = self.entries.remove(&entry_address)?;
        log::debug!("evicting function at {entry_address:#06x}");
        self.tracker.remove_coverage(entry_address, &entry.byte_range_covered);
        Some(entry)
    }

    /// Route a write at `written_addr` to the tracker. `currently_executing`
    /// is the entry address of the function running when the write
    /// happened, if any (a write from a peripheral thread or from
    /// outside any compiled routine passes `None`).
    pub fn on_memory_written(&mut self, written_addr: u16, currently_executing: Option<u16>) -> SmcEffect {
        let affected = self.tracker.entries_covering(written_addr);
        for &entry_address in &affected {
            self.evict(entry_address);
        }

        let recorded_smc_target_for = currently_executing.filter(|current| affected.contains(current));
        if let Some(current) = recorded_smc_target_for {
            self.tracker.smc_targets_by_entry.entry(current).or_default().insert(written_addr);
        }

        SmcEffect { evicted: affected, recorded_smc_target_for }
    }
}

impl Default for CodeCache {
    fn default() -> Self {
        Self::new()
    }
}
