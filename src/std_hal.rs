//! Reference [`Hal`] implementation: owns a [`RegisterFile`], shares a
//! [`MemoryBus`] with whatever else needs to see its current contents
//! (e.g. the scheduler's region-fetch callback, for re-disassembling
//! self-modified code), and forwards writes to an injected
//! self-modifying-code notifier.
//!
//! Grounded on the teacher's `Mos6502<'memory, M>` shape (registers
//! owned, memory borrowed for the lifetime of a run) — generalized
//! from a plain borrow to `Rc<RefCell<_>>` since, unlike the teacher's
//! single-pass interpreter, this HAL's bus must also be reachable from
//! outside the currently executing routine to re-enumerate code
//! regions on a cache miss.

use std::cell::RefCell;
use std::rc::Rc;

use crate::hal::{Hal, HalError};
use crate::memory::MemoryBus;
use crate::regfile::{Flag, RegisterFile};

const STACK_BOTTOM: u16 = 0x0100;

/// Called with `(current_instruction_address, written_address)` after
/// every successful write so the SMC tracker can decide whether the
/// write invalidates cached code and/or targets the currently
/// executing function.
pub type SmcNotifier<'a> = &'a mut dyn FnMut(u16, u16);

pub struct StdHal<'a> {
    regfile: RegisterFile,
    bus: Rc<RefCell<MemoryBus>>,
    on_memory_written: SmcNotifier<'a>,
    current_instruction_address: u16,
    cancelled: &'a mut dyn FnMut() -> bool,
    poll_interrupt: &'a mut dyn FnMut() -> u16,
}

impl<'a> StdHal<'a> {
    pub fn new(
        regfile: RegisterFile,
        bus: Rc<RefCell<MemoryBus>>,
        on_memory_written: SmcNotifier<'a>,
        cancelled: &'a mut dyn FnMut() -> bool,
        poll_interrupt: &'a mut dyn FnMut() -> u16,
    ) -> Self {
        Self {
            regfile,
            bus,
            on_memory_written,
            current_instruction_address: 0,
            cancelled,
            poll_interrupt,
        }
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.regfile
    }

    pub fn into_registers(self) -> RegisterFile {
        self.regfile
    }
}

impl<'a> Hal for StdHal<'a> {
    fn read_memory(&mut self, addr: u16) -> Result<u8, HalError> {
        self.bus.borrow().read(addr).map_err(|_| HalError::Unmapped(addr))
    }

    fn write_memory(&mut self, addr: u16, value: u8) -> Result<(), HalError> {
        let current = self.current_instruction_address;
        let on_written = &mut self.on_memory_written;
        self.bus
            .borrow_mut()
            .write_and_notify(addr, value, |written| (on_written)(current, written))
            .map_err(|_| HalError::Unmapped(addr))
    }

    fn push_to_stack(&mut self, value: u8) -> Result<(), HalError> {
        let sp = self.regfile.sp();
        self.write_memory(STACK_BOTTOM | sp as u16, value)?;
        self.regfile.set_sp(sp.wrapping_sub(1));
        Ok(())
    }

    fn pop_from_stack(&mut self) -> Result<u8, HalError> {
        let sp = self.regfile.sp();
        if sp == 0xFF {
            return Err(HalError::StackUnderflow);
        }
        let sp = sp.wrapping_add(1);
        self.regfile.set_sp(sp);
        self.read_memory(STACK_BOTTOM | sp as u16)
    }

    fn get_flag(&self, flag: Flag) -> bool {
        self.regfile.flag_set(flag)
    }

    fn set_flag(&mut self, flag: Flag, value: bool) {
        self.regfile.set_flag_from_cond(flag, value);
    }

    fn processor_status(&self) -> u8 {
        self.regfile.processor_status()
    }

    fn set_processor_status(&mut self, value: u8) {
        self.regfile.set_processor_status(value);
    }

    fn a(&self) -> u8 {
        self.regfile.a()
    }

    fn set_a(&mut self, value: u8) {
        *self.regfile.reg_mut(crate::regfile::Register::A) = value;
    }

    fn x(&self) -> u8 {
        self.regfile.x()
    }

    fn set_x(&mut self, value: u8) {
        *self.regfile.reg_mut(crate::regfile::Register::X) = value;
    }

    fn y(&self) -> u8 {
        self.regfile.y()
    }

    fn set_y(&mut self, value: u8) {
        *self.regfile.reg_mut(crate::regfile::Register::Y) = value;
    }

    fn stack_pointer(&self) -> u8 {
        self.regfile.sp()
    }

    fn set_stack_pointer(&mut self, value: u8) {
        self.regfile.set_sp(value);
    }

    fn increment_cpu_cycle_count(&mut self, _count: u32) -> Result<(), HalError> {
        if (self.cancelled)() {
            Err(HalError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn poll_for_interrupt(&mut self) -> u16 {
        (self.poll_interrupt)()
    }

    fn trigger_software_interrupt(&mut self) {
        log::debug!("software interrupt triggered at {:#06x}", self.current_instruction_address);
    }

    fn debug_hook(&mut self, text: &str) {
        log::trace!("{text}");
    }

    fn current_instruction_address(&self) -> u16 {
        self.current_instruction_address
    }

    fn set_current_instruction_address(&mut self, addr: u16) {
        self.current_instruction_address = addr;
    }
}
