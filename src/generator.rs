//! Executable-method generator: lowers a lifted IR sequence into a
//! callable routine.
//!
//! The backend is a tree-walking interpreter over pre-resolved IR
//! rather than a native code emitter — no code-emission crate exists
//! anywhere in this codebase's lineage, and the contract is explicit
//! that an interpreter is an equally valid implementation as long as
//! it is observably identical to one. Grounded on the teacher's own
//! `run`/`step` split in `yamos6502.rs`: one reusable piece of mutable
//! state (there, the CPU; here, a scratch-variable buffer) driven by a
//! loop that dispatches on a decoded instruction.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use crate::hal::{Hal, HalError};
use crate::ir::{max_variables, BinaryOp, Ir, IrSequence, LabelName, UnaryOp, Value};
use crate::regfile::Register;

/// The interpreter's scratch-register width. Wide enough to hold any
/// intermediate 6502 arithmetic result (the largest is `0xFF + 0xFF +
/// 1` for `ADC`) with headroom to spare.
pub type WideValue = i32;

/// A customizer mutates the IR sequence before it is finalized into a
/// `CompiledRoutine` — e.g. to weave in `DebugValue` instrumentation
/// after every label. Cycle-count notification and interrupt polling
/// are not customizer-driven; see `run`'s unconditional checkpoint.
pub type Customizer = dyn Fn(IrSequence) -> IrSequence + Send + Sync;

/// A lifted function with its labels pre-resolved to IR indices and
/// its scratch-variable count computed, ready to be interpreted
/// without re-scanning on every call.
pub struct CompiledRoutine {
    ir: IrSequence,
    labels: HashMap<LabelName, usize>,
    max_variables: u16,
}

impl CompiledRoutine {
    pub fn build(ir: IrSequence) -> Self {
        let max_variables = max_variables(&ir);
        let labels = ir
            .iter()
            .enumerate()
            .filter_map(|(index, instr)| match instr {
                Ir::Label(name) => Some((*name, index)),
                _ => None,
            })
            .collect();
        Self { ir, labels, max_variables }
    }

    pub fn ir(&self) -> &[Ir] {
        &self.ir
    }

    pub fn max_variables(&self) -> u16 {
        self.max_variables
    }
}

pub type CompiledFn = Box<dyn Fn(&mut dyn Hal) -> Result<i32, HalError> + Send + Sync>;

pub struct ExecutableMethodGenerator;

impl ExecutableMethodGenerator {
    /// Apply `customizers` in order, resolve labels and the
    /// scratch-variable count once, and return a routine closure that
    /// reuses its scratch buffer across invocations.
    pub fn generate(ir: IrSequence, customizers: &[Box<Customizer>]) -> CompiledFn {
        let seq = customizers.iter().fold(ir, |seq, customizer| customizer(seq));
        let routine = Arc::new(CompiledRoutine::build(seq));
        let scratch: Arc<RefCell<Vec<WideValue>>> =
            Arc::new(RefCell::new(vec![0; routine.max_variables as usize]));

        Box::new(move |hal: &mut dyn Hal| {
            let mut scratch = scratch.borrow_mut();
            if scratch.len() < routine.max_variables as usize {
                scratch.resize(routine.max_variables as usize, 0);
            }
            run(&routine, hal, &mut scratch)
        })
    }
}

fn apply_binary(op: BinaryOp, lhs: WideValue, rhs: WideValue) -> WideValue {
    match op {
        BinaryOp::Add => lhs.wrapping_add(rhs),
        BinaryOp::Subtract => lhs.wrapping_sub(rhs),
        BinaryOp::Equals => (lhs == rhs) as WideValue,
        BinaryOp::NotEquals => (lhs != rhs) as WideValue,
        BinaryOp::GreaterThan => (lhs > rhs) as WideValue,
        BinaryOp::GreaterThanOrEqualTo => (lhs >= rhs) as WideValue,
        BinaryOp::LessThan => (lhs < rhs) as WideValue,
        BinaryOp::LessThanOrEqualTo => (lhs <= rhs) as WideValue,
        BinaryOp::And => lhs & rhs,
        BinaryOp::Or => lhs | rhs,
        BinaryOp::Xor => lhs ^ rhs,
        BinaryOp::ShiftLeft => lhs.wrapping_shl(rhs as u32),
        BinaryOp::ShiftRight => lhs.wrapping_shr(rhs as u32),
    }
}

/// Reads the 16-bit pointer stored at `ptr`, honoring the 6502
/// indirect-`JMP` page-boundary bug: the high byte is read from `(ptr
/// & 0xFF00) | ((ptr + 1) & 0x00FF)`, not from `ptr + 1` itself.
fn read_indirect_pointer(ptr: u16, hal: &mut dyn Hal) -> Result<u16, HalError> {
    let lo = hal.read_memory(ptr)? as u16;
    let hi_addr = (ptr & 0xFF00) | (ptr.wrapping_add(1) & 0x00FF);
    let hi = hal.read_memory(hi_addr)? as u16;
    Ok((hi << 8) | lo)
}

fn register_value(reg: Register, hal: &dyn Hal) -> u8 {
    match reg {
        Register::A => hal.a(),
        Register::X => hal.x(),
        Register::Y => hal.y(),
    }
}

fn effective_address(value: &Value, hal: &mut dyn Hal) -> Result<u16, HalError> {
    match value {
        Value::Memory { location, offset_register, zero_page_wrap } => {
            let base = match location {
                crate::ir::Location::Direct(addr) => *addr,
                crate::ir::Location::Dynamic { pointer_address, .. } => {
                    if *zero_page_wrap {
                        hal.read_memory(*pointer_address)? as u16
                    } else {
                        let lo = hal.read_memory(*pointer_address)? as u16;
                        let hi = hal.read_memory(pointer_address.wrapping_add(1))? as u16;
                        (hi << 8) | lo
                    }
                }
            };
            Ok(match offset_register {
                Some(reg) => {
                    let offset = register_value(*reg, hal) as u16;
                    if *zero_page_wrap {
                        (base & 0xFF00) | ((base.wrapping_add(offset)) & 0x00FF)
                    } else {
                        base.wrapping_add(offset)
                    }
                }
                None => base,
            })
        }
        Value::IndirectMemory { zp_pointer, add_x_before_indirect, add_y_after_indirect } => {
            if *add_x_before_indirect {
                let zp = zp_pointer.wrapping_add(hal.x());
                let lo = hal.read_memory(zp as u16)? as u16;
                let hi = hal.read_memory(zp.wrapping_add(1) as u16)? as u16;
                Ok((hi << 8) | lo)
            } else {
                debug_assert!(add_y_after_indirect);
                let lo = hal.read_memory(*zp_pointer as u16)? as u16;
                let hi = hal.read_memory(zp_pointer.wrapping_add(1) as u16)? as u16;
                let pointer = (hi << 8) | lo;
                Ok(pointer.wrapping_add(hal.y() as u16))
            }
        }
        _ => unreachable!("effective_address called on a non-memory Value"),
    }
}

fn read_value(value: &Value, hal: &mut dyn Hal, vars: &[WideValue]) -> Result<WideValue, HalError> {
    Ok(match value {
        Value::Constant(c) => *c as WideValue,
        Value::Register(reg) => register_value(*reg, hal) as WideValue,
        Value::Flag(flag) => hal.get_flag(*flag) as WideValue,
        Value::AllFlags => hal.processor_status() as WideValue,
        Value::StackPointer => hal.stack_pointer() as WideValue,
        Value::Variable(index) => vars[*index as usize],
        Value::Memory { .. } | Value::IndirectMemory { .. } => {
            let addr = effective_address(value, hal)?;
            hal.read_memory(addr)? as WideValue
        }
    })
}

fn write_value(value: &Value, new_value: WideValue, hal: &mut dyn Hal, vars: &mut [WideValue]) -> Result<(), HalError> {
    match value {
        Value::Constant(_) => unreachable!("a Constant is never a write destination"),
        Value::Register(reg) => {
            let byte = (new_value & 0xFF) as u8;
            match reg {
                Register::A => hal.set_a(byte),
                Register::X => hal.set_x(byte),
                Register::Y => hal.set_y(byte),
            }
            Ok(())
        }
        Value::Flag(flag) => {
            hal.set_flag(*flag, (new_value & 1) != 0);
            Ok(())
        }
        Value::AllFlags => {
            hal.set_processor_status((new_value & 0xFF) as u8);
            Ok(())
        }
        Value::StackPointer => {
            hal.set_stack_pointer((new_value & 0xFF) as u8);
            Ok(())
        }
        Value::Variable(index) => {
            vars[*index as usize] = new_value;
            Ok(())
        }
        Value::Memory { .. } | Value::IndirectMemory { .. } => {
            let addr = effective_address(value, hal)?;
            hal.write_memory(addr, (new_value & 0xFF) as u8)
        }
    }
}

/// Advances the HAL's cycle count by one and checks for a pending
/// interrupt. This is the "only required timing signal" and the "only
/// blocking/suspension point inside the core": every routine hits it at
/// entry and at every basic-block boundary (`Ir::Label`), regardless of
/// which customizers, if any, were applied — cancellation and interrupt
/// delivery cannot depend on optional instrumentation. Returns `Some`
/// with the routine's result if the checkpoint wants to short-circuit
/// execution (an interrupt vector to service), `None` to keep running.
fn cycle_checkpoint(hal: &mut dyn Hal) -> Result<Option<i32>, HalError> {
    hal.increment_cpu_cycle_count(1)?;
    let vector = hal.poll_for_interrupt();
    if vector != 0 {
        return Ok(Some(vector as i32));
    }
    Ok(None)
}

fn run(routine: &CompiledRoutine, hal: &mut dyn Hal, vars: &mut [WideValue]) -> Result<i32, HalError> {
    let mut pc = 0usize;

    if let Some(result) = cycle_checkpoint(hal)? {
        return Ok(result);
    }

    loop {
        let Some(instr) = routine.ir.get(pc) else {
            // Fell off the end of a routine with no explicit Return
            // (e.g. a lone InvokeSoftwareInterrupt): terminate.
            return Ok(-1);
        };

        match instr {
            Ir::Label(_) => {
                if let Some(result) = cycle_checkpoint(hal)? {
                    return Ok(result);
                }
            }
            Ir::NoOp => {}

            Ir::Copy { src, dst } => {
                let v = read_value(src, hal, vars)?;
                write_value(dst, v, hal, vars)?;
            }

            Ir::Unary { op, src, dst } => {
                let v = read_value(src, hal, vars)?;
                let result = match op {
                    UnaryOp::BitwiseNot => !v,
                    UnaryOp::LogicalNot => (v == 0) as WideValue,
                };
                write_value(dst, result, hal, vars)?;
            }

            Ir::Binary { op, lhs, rhs, dst } => {
                let l = read_value(lhs, hal, vars)?;
                let r = read_value(rhs, hal, vars)?;
                write_value(dst, apply_binary(*op, l, r), hal, vars)?;
            }

            Ir::WrapValueToByte { value, overflow_out } => {
                let v = read_value(value, hal, vars)?;
                let overflow = (v > 0xFF || v < 0) as WideValue;
                write_value(value, v & 0xFF, hal, vars)?;
                write_value(overflow_out, overflow, hal, vars)?;
            }

            Ir::Jump(label) => {
                pc = *routine.labels.get(label).expect("label pre-declared per invariant (a)");
                continue;
            }
            Ir::JumpIfZero { cond, label } => {
                if read_value(cond, hal, vars)? == 0 {
                    pc = *routine.labels.get(label).expect("label pre-declared per invariant (a)");
                    continue;
                }
            }
            Ir::JumpIfNotZero { cond, label } => {
                if read_value(cond, hal, vars)? != 0 {
                    pc = *routine.labels.get(label).expect("label pre-declared per invariant (a)");
                    continue;
                }
            }

            Ir::CallFunction(target) => {
                let callee =
                    if target.indirect { read_indirect_pointer(target.address, hal)? } else { target.address };
                return Ok(callee as i32);
            }

            Ir::Return { from_interrupt } => {
                if *from_interrupt {
                    let status = hal.pop_from_stack()?;
                    hal.set_processor_status(status);
                }
                let lo = hal.pop_from_stack()? as u16;
                let hi = hal.pop_from_stack()? as u16;
                let addr = (hi << 8) | lo;
                let addr = if *from_interrupt { addr } else { addr.wrapping_add(1) };
                return Ok(addr as i32);
            }

            Ir::PushStackValue(src) => {
                let v = read_value(src, hal, vars)?;
                hal.push_to_stack((v & 0xFF) as u8)?;
            }
            Ir::PopStackValue(dst) => {
                let v = hal.pop_from_stack()? as WideValue;
                write_value(dst, v, hal, vars)?;
            }

            Ir::InvokeSoftwareInterrupt => {
                hal.trigger_software_interrupt();
                return Ok(hal.poll_for_interrupt() as i32);
            }

            Ir::DebugValue(v) => {
                let value = read_value(v, hal, vars)?;
                hal.debug_hook(&format!("{value:#x}"));
            }
        }

        pc += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompile::Disassembler;
    use crate::lift::Lifter;
    use crate::memory::{MemoryBus, Ram};
    use crate::regfile::RegisterFile;
    use crate::std_hal::StdHal;
    use std::cell::RefCell;
    use std::collections::BTreeSet;
    use std::rc::Rc;

    fn compile(code: &[u8], base: u16) -> CompiledFn {
        let regions = [(base, code)];
        let f = Disassembler::trace(base, &regions).unwrap();
        let ir = Lifter::lift_function(&f, &BTreeSet::new()).unwrap();
        ExecutableMethodGenerator::generate(ir, &[])
    }

    #[test]
    fn lda_immediate_sets_flags_and_advances() {
        let routine = compile(&[0xA9, 0x00], 0x1234);
        let mut bus = MemoryBus::new();
        bus.attach(Ram::new(0x10000), 0, false).unwrap();
        let bus = Rc::new(RefCell::new(bus));
        let mut notify = |_: u16, _: u16| {};
        let mut cancelled = || false;
        let mut poll = || 0u16;
        let mut regfile = RegisterFile::default();
        regfile.set_processor_status(0);
        *regfile.reg_mut(Register::A) = 0xFF;
        let mut hal = StdHal::new(regfile, bus, &mut notify, &mut cancelled, &mut poll);

        let next = routine(&mut hal).unwrap();
        assert_eq!(hal.a(), 0x00);
        assert!(hal.get_flag(crate::regfile::Flag::Zero));
        assert!(!hal.get_flag(crate::regfile::Flag::Negative));
        assert_eq!(next, 0x1236);
    }

    #[test]
    fn adc_sets_carry_overflow_and_negative() {
        let routine = compile(&[0x69, 0x01], 0x2000); // ADC #$01
        let mut bus = MemoryBus::new();
        bus.attach(Ram::new(0x10000), 0, false).unwrap();
        let bus = Rc::new(RefCell::new(bus));
        let mut notify = |_: u16, _: u16| {};
        let mut cancelled = || false;
        let mut poll = || 0u16;
        let mut regfile = RegisterFile::default();
        regfile.set_processor_status(0);
        *regfile.reg_mut(Register::A) = 0x7F;
        let mut hal = StdHal::new(regfile, bus, &mut notify, &mut cancelled, &mut poll);

        routine(&mut hal).unwrap();
        assert_eq!(hal.a(), 0x80);
        assert!(!hal.get_flag(crate::regfile::Flag::Carry));
        assert!(hal.get_flag(crate::regfile::Flag::Overflow));
        assert!(hal.get_flag(crate::regfile::Flag::Negative));
        assert!(!hal.get_flag(crate::regfile::Flag::Zero));
    }

    #[test]
    fn indirect_jmp_honors_page_boundary_bug() {
        let routine = compile(&[0x6C, 0xFF, 0x20], 0x1000); // JMP ($20FF)
        let mut bus = MemoryBus::new();
        bus.attach(Ram::new(0x10000), 0, false).unwrap();
        bus.write(0x20FF, 0x45).unwrap();
        bus.write(0x2000, 0x23).unwrap();
        bus.write(0x2100, 0x99).unwrap();
        let bus = Rc::new(RefCell::new(bus));
        let mut notify = |_: u16, _: u16| {};
        let mut cancelled = || false;
        let mut poll = || 0u16;
        let mut hal = StdHal::new(RegisterFile::default(), bus, &mut notify, &mut cancelled, &mut poll);

        assert_eq!(routine(&mut hal).unwrap(), 0x2345);
    }

    #[test]
    fn jsr_then_rts_round_trips_to_call_plus_one() {
        let mut bus = MemoryBus::new();
        bus.attach(Ram::new(0x10000), 0, false).unwrap();
        bus.write(0x8000, 0x20).unwrap(); // JSR $9000
        bus.write(0x8001, 0x00).unwrap();
        bus.write(0x8002, 0x90).unwrap();
        bus.write(0x9000, 0x60).unwrap(); // RTS
        let bus = Rc::new(RefCell::new(bus));

        let regions: Vec<(u16, Vec<u8>)> = vec![(0x8000, vec![0x20, 0x00, 0x90]), (0x9000, vec![0x60])];
        let region_refs: Vec<(u16, &[u8])> = regions.iter().map(|(b, v)| (*b, v.as_slice())).collect();

        let caller_fn = Disassembler::trace(0x8000, &region_refs).unwrap();
        let caller_ir = Lifter::lift_function(&caller_fn, &BTreeSet::new()).unwrap();
        let caller = ExecutableMethodGenerator::generate(caller_ir, &[]);

        let callee_fn = Disassembler::trace(0x9000, &region_refs).unwrap();
        let callee_ir = Lifter::lift_function(&callee_fn, &BTreeSet::new()).unwrap();
        let callee = ExecutableMethodGenerator::generate(callee_ir, &[]);

        let mut notify = |_: u16, _: u16| {};
        let mut cancelled = || false;
        let mut poll = || 0u16;
        let mut regfile = RegisterFile::default();
        regfile.set_sp(0xFF);
        let mut hal = StdHal::new(regfile, bus, &mut notify, &mut cancelled, &mut poll);

        let callee_addr = caller(&mut hal).unwrap();
        assert_eq!(callee_addr, 0x9000);
        assert_eq!(hal.read_memory(0x01FF).unwrap(), 0x80);
        assert_eq!(hal.read_memory(0x01FE).unwrap(), 0x02);

        let resume_addr = callee(&mut hal).unwrap();
        assert_eq!(resume_addr, 0x8003);
        assert_eq!(hal.stack_pointer(), 0xFF);
    }
}
