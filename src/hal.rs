//! Hardware-abstraction layer contract: the mutable state and
//! side-effect surface that generated routines drive.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::regfile::Flag;

/// Cross-thread cancel flag a peripheral thread sets to unwind a
/// `run_method` call cleanly from the next cycle-count check onward.
/// Grounded on the teacher's `reset_pending`/`irq_pending` `AtomicBool`
/// fields in `yamos6502.rs`, generalized from CPU-internal request
/// flags to an external cancellation signal shared via `Arc`.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalError {
    #[error("unmapped memory access at {0:#06x}")]
    Unmapped(u16),
    #[error("stack underflow")]
    StackUnderflow,
    #[error("execution cancelled")]
    Cancelled,
}

/// The object-safe hardware-abstraction contract. Generated routines
/// are `Fn(&mut dyn Hal) -> i32`, so every method here takes `&mut
/// self`/`&self` through a trait object.
pub trait Hal {
    fn read_memory(&mut self, addr: u16) -> Result<u8, HalError>;
    fn write_memory(&mut self, addr: u16, value: u8) -> Result<(), HalError>;

    /// Push to `0x0100 | S`, post-decrementing S.
    fn push_to_stack(&mut self, value: u8) -> Result<(), HalError>;
    /// Pre-increment S, then pop from `0x0100 | S`.
    fn pop_from_stack(&mut self) -> Result<u8, HalError>;

    fn get_flag(&self, flag: Flag) -> bool;
    fn set_flag(&mut self, flag: Flag, value: bool);

    /// The packed status byte, `NV-BDIZC` (bit 7 down to bit 0), with
    /// the unused bit always read back as 1.
    fn processor_status(&self) -> u8;
    fn set_processor_status(&mut self, value: u8);

    fn a(&self) -> u8;
    fn set_a(&mut self, value: u8);
    fn x(&self) -> u8;
    fn set_x(&mut self, value: u8);
    fn y(&self) -> u8;
    fn set_y(&mut self, value: u8);
    fn stack_pointer(&self) -> u8;
    fn set_stack_pointer(&mut self, value: u8);

    /// Advance cycle-accounting peripherals by `count` cycles. May
    /// observe a cancellation request and return `Err`; the scheduler
    /// unwinds cleanly when it does.
    fn increment_cpu_cycle_count(&mut self, count: u32) -> Result<(), HalError>;

    /// 0 for no pending interrupt, or the vector address to service.
    fn poll_for_interrupt(&mut self) -> u16;

    fn trigger_software_interrupt(&mut self);

    /// Observer hook; must not mutate CPU-visible state.
    fn debug_hook(&mut self, text: &str);

    /// For diagnostics and SMC tracking only — not a real 6502
    /// register.
    fn current_instruction_address(&self) -> u16;
    fn set_current_instruction_address(&mut self, addr: u16);
}
