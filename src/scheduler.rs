//! Drives compiled routines to completion, consulting the patch table
//! and code cache on every iteration.
//!
//! Grounded on the teacher's dispatch loop in `src/bin/main.rs` (a
//! plain `loop` around one step function, logging the program counter
//! at each iteration) — generalized here to compile-on-miss instead of
//! decode-on-every-step, and to consult a patch table first.

use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::rc::Rc;

use thiserror::Error;

use crate::cache::{CodeCache, CompiledEntry};
use crate::decompile::{DecompileError, Disassembler};
use crate::generator::{Customizer, ExecutableMethodGenerator};
use crate::hal::{Hal, HalError};
use crate::lift::{LiftError, Lifter};
use crate::patch::PatchTable;

const MAX_HISTORY: usize = 1000;

#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Hal(#[from] HalError),
    #[error(transparent)]
    Decompile(#[from] DecompileError),
    #[error(transparent)]
    Lift(#[from] LiftError),
}

/// A write observed by the HAL, queued for the scheduler to route to
/// the SMC tracker: `(current_instruction_address, written_address)`.
type PendingWrite = (u16, u16);

/// Shared handle a HAL's write notifier can hold onto independently of
/// the scheduler's own `&mut self` borrow during `run_method` — the
/// `StdHal` notifier closure is constructed before the loop starts and
/// lives for the whole call, so it cannot also borrow the scheduler
/// directly. `Rc<RefCell<_>>` lets both sides reach the same queue
/// without aliasing.
pub type PendingWrites = Rc<RefCell<VecDeque<PendingWrite>>>;

/// Owns the code cache and patch table across however many calls to
/// `run_method` the caller makes, so compiled routines and recorded
/// SMC targets survive between them.
pub struct Scheduler {
    cache: CodeCache,
    patches: PatchTable,
    history: VecDeque<u16>,
    customizers: Vec<Box<Customizer>>,
    pending_writes: PendingWrites,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            cache: CodeCache::new(),
            patches: PatchTable::new(),
            history: VecDeque::new(),
            customizers: Vec::new(),
            pending_writes: Rc::new(RefCell::new(VecDeque::new())),
        }
    }

    pub fn with_customizers(customizers: Vec<Box<Customizer>>) -> Self {
        Self { customizers, ..Self::new() }
    }

    pub fn cache(&self) -> &CodeCache {
        &self.cache
    }

    pub fn patches_mut(&mut self) -> &mut PatchTable {
        &mut self.patches
    }

    /// Bounded at 1000 entries, oldest evicted first — a plain,
    /// inspectable log of every entry address dispatched, not hidden
    /// instrumentation.
    pub fn history(&self) -> &VecDeque<u16> {
        &self.history
    }

    fn record_history(&mut self, address: u16) {
        if self.history.len() == MAX_HISTORY {
            self.history.pop_front();
        }
        self.history.push_back(address);
    }

    /// Route a completed write through the SMC tracker. `current_entry`
    /// is the entry address of whatever compiled routine performed the
    /// write, if any; `None` for writes that originate outside any
    /// compiled routine (a peripheral thread, or setup code).
    pub fn on_memory_written(&mut self, written_addr: u16, current_entry: Option<u16>) {
        self.cache.on_memory_written(written_addr, current_entry);
    }

    /// A clone of the shared queue a HAL's write notifier can push
    /// `(current_instruction_address, written_address)` pairs into;
    /// drained at the top of every `run_method` iteration.
    pub fn pending_writes_handle(&self) -> PendingWrites {
        self.pending_writes.clone()
    }

    fn drain_pending_writes(&mut self) {
        while let Some((current_entry, written_addr)) = self.pending_writes.borrow_mut().pop_front() {
            self.cache.on_memory_written(written_addr, Some(current_entry));
        }
    }

    fn compiled_entry(
        &mut self,
        entry_address: u16,
        fetch_regions: &mut dyn FnMut() -> Vec<(u16, Vec<u8>)>,
    ) -> Result<&CompiledEntry, RunError> {
        if !self.cache.contains(entry_address) {
            let owned = fetch_regions();
            let regions: Vec<(u16, &[u8])> = owned.iter().map(|(base, bytes)| (*base, bytes.as_slice())).collect();

            let function = Disassembler::trace(entry_address, &regions)?;
            let smc_targets = self.cache.smc_targets_for(entry_address);
            let ir = Lifter::lift_function(&function, &smc_targets)?;

            let byte_range_covered: BTreeSet<u16> = function
                .ordered_instructions
                .iter()
                .flat_map(|instr| instr.address..instr.next_address())
                .collect();
            let routine = ExecutableMethodGenerator::generate(ir, &self.customizers);

            self.cache.insert(CompiledEntry {
                entry_address,
                byte_range_covered,
                routine,
                allowed_smc_targets: smc_targets,
            });
        }

        Ok(self.cache.get(entry_address).expect("just compiled or already cached"))
    }

    /// Run compiled routines starting at `entry`, following each
    /// routine's returned next address, until one returns a negative
    /// value or a HAL error propagates. `fetch_regions` is called only
    /// on a cache miss, to re-enumerate the current code regions (a
    /// bank switch since the last compile can change what's visible).
    pub fn run_method(
        &mut self,
        entry: u16,
        hal: &mut dyn Hal,
        mut fetch_regions: impl FnMut() -> Vec<(u16, Vec<u8>)>,
    ) -> Result<(), RunError> {
        let mut current = entry;

        loop {
            self.drain_pending_writes();
            self.record_history(current);
            log::trace!("dispatching {current:#06x}");

            if let Some(patch) = self.patches.get(current) {
                if let Some(next) = patch(hal) {
                    self.drain_pending_writes();
                    if next < 0 {
                        return Ok(());
                    }
                    current = next as u16;
                    continue;
                }
            }

            let compiled = self.compiled_entry(current, &mut fetch_regions)?;
            hal.set_current_instruction_address(current);
            let outcome = (compiled.routine)(hal);
            // Drain before propagating a HAL error: a routine that
            // writes and then fails later in the same call (e.g. an
            // RTS stack underflow right after a self-modifying store)
            // must still have its write routed to the SMC tracker.
            self.drain_pending_writes();
            let next = outcome?;
            log::trace!("{current:#06x} -> {next:#x}");
            if next < 0 {
                return Ok(());
            }
            current = next as u16;
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
