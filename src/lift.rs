//! IR lifter: maps each decoded 6502 instruction, plus its resolved
//! addressing mode, to a short IR sequence.
//!
//! There is no teacher analog for this module — the teacher is a
//! straight-line interpreter, not a lifter — so the per-opcode rules
//! below are transcribed directly from the component's own
//! specification rather than adapted from existing code; the
//! surrounding style (sum-type instructions, one lowering function per
//! mnemonic family) follows the teacher's `Insn`/`decode_insn` split in
//! `insns.rs`.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::decompile::{DecodedInstruction, DecompiledFunction};
use crate::insns::{AddressMode, Mnemonic};
use crate::ir::{BinaryOp, FunctionAddress, Ir, IrSequence, LabelName, UnaryOp, Value};
use crate::regfile::{Flag, Register};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LiftError {
    #[error("unknown opcode {0:#04x} reached the lifter")]
    UnknownOpcode(u8),
    #[error("branch at {0:#06x} has no resolvable label")]
    UnresolvableBranch(u16),
}

/// Per-function context threaded through every instruction's lowering:
/// which addresses need a label, which addresses are covered by this
/// same function (so a direct `JMP` can be told apart from a tail
/// call), and which operand-byte addresses are known to be
/// self-modified.
pub struct LiftContext<'a> {
    pub jump_targets: &'a BTreeSet<u16>,
    pub internal_addresses: &'a BTreeSet<u16>,
    pub smc_targets: &'a BTreeSet<u16>,
}

/// Monotonic allocator for scratch `Variable` slots within one
/// function's lowering. See `ir::max_variables` for how the generator
/// later learns how many slots to reserve.
struct VarAlloc(u16);

impl VarAlloc {
    fn next(&mut self) -> Value {
        let v = Value::Variable(self.0);
        self.0 += 1;
        v
    }
}

pub struct Lifter;

impl Lifter {
    pub fn lift_function(
        function: &DecompiledFunction,
        smc_targets: &BTreeSet<u16>,
    ) -> Result<IrSequence, LiftError> {
        let internal_addresses: BTreeSet<u16> =
            function.ordered_instructions.iter().map(|i| i.address).collect();
        let ctx = LiftContext {
            jump_targets: &function.jump_targets,
            internal_addresses: &internal_addresses,
            smc_targets,
        };
        let mut vars = VarAlloc(0);
        let mut seq = IrSequence::new();

        // `ordered_instructions` is sorted by address (it comes out of a
        // `BTreeMap`), not by control-flow order, so "is this instruction
        // last in the list" says nothing about whether it is a dead end
        // on its own path. Instead every address this function owns
        // (`internal_addresses`) is made to emit *something* below, so an
        // instruction can tell whether its own successor is covered by
        // this function purely by membership, regardless of where that
        // successor happens to land in address order.
        for instr in &function.ordered_instructions {
            if ctx.jump_targets.contains(&instr.address) {
                seq.push(Ir::Label(instr.address as LabelName));
            }

            if instr.mnemonic == Mnemonic::Jam {
                // By construction of the decompiler's worklist (see
                // `decompile::mnemonic_is_terminal`), a `Jam` is always a
                // dead end for whatever path reached it: tracing never
                // continues past it. Illegal opcodes are an explicit
                // non-goal, so rather than interpret it, hand control
                // back to the scheduler at this exact address -- the
                // same fallback used below for a path that ran off the
                // edge of mapped memory.
                seq.push(Ir::CallFunction(FunctionAddress { address: instr.address, indirect: false }));
                continue;
            }

            lower_instruction(instr, &ctx, &mut vars, &mut seq)?;

            // The decompiler only stops extending a path at a terminal
            // mnemonic (handled above, or below via an explicit label or
            // `CallFunction`+`Return`) or because the next byte fell
            // outside the mapped regions it was given. The latter leaves
            // this instruction with nowhere to fall through to in this
            // IR sequence; hand control back to the scheduler at its
            // real next address instead of letting the interpreter run
            // off the end of the routine, or into unrelated code that
            // merely happens to follow it in address order.
            if falls_through_in_ir(instr.mnemonic) && !ctx.internal_addresses.contains(&instr.next_address()) {
                seq.push(Ir::CallFunction(FunctionAddress { address: instr.next_address(), indirect: false }));
            }
        }

        Ok(seq)
    }
}

/// Whether lowering `mnemonic` leaves the IR sequence without its own
/// explicit exit (`Jump`/`CallFunction`/`Return`/`InvokeSoftwareInterrupt`),
/// meaning a trailing instance needs the fallthrough appended above.
fn falls_through_in_ir(mnemonic: Mnemonic) -> bool {
    !matches!(
        mnemonic,
        Mnemonic::Rts | Mnemonic::Rti | Mnemonic::Brk | Mnemonic::Jsr | Mnemonic::Jam | Mnemonic::Jmp(_)
    )
}

fn set_zero_negative(value: Value, vars: &mut VarAlloc, seq: &mut IrSequence) {
    seq.push(Ir::Binary {
        op: BinaryOp::Equals,
        lhs: value,
        rhs: Value::Constant(0),
        dst: Value::Flag(Flag::Zero),
    });
    let bit7 = vars.next();
    seq.push(Ir::Binary {
        op: BinaryOp::And,
        lhs: value,
        rhs: Value::Constant(0x80),
        dst: bit7,
    });
    seq.push(Ir::Binary {
        op: BinaryOp::NotEquals,
        lhs: bit7,
        rhs: Value::Constant(0),
        dst: Value::Flag(Flag::Negative),
    });
}

fn resolve_memory_operand(
    operand_addr: u16,
    target: u16,
    offset_register: Option<Register>,
    zero_page_wrap: bool,
    ctx: &LiftContext,
) -> Value {
    let is_dynamic = if zero_page_wrap {
        ctx.smc_targets.contains(&operand_addr)
    } else {
        ctx.smc_targets.contains(&operand_addr) || ctx.smc_targets.contains(&operand_addr.wrapping_add(1))
    };
    if is_dynamic {
        Value::memory_dynamic(operand_addr, offset_register, zero_page_wrap)
    } else {
        Value::memory_direct(target, offset_register, zero_page_wrap)
    }
}

/// The operand `Value` for every addressing mode except `Implied`,
/// `Relative`, and `Indirect` (those are resolved by their mnemonic's
/// own lowering, not through a generic operand).
fn operand_value(instr: &DecodedInstruction, ctx: &LiftContext) -> Value {
    let operand_addr = instr.address.wrapping_add(1);
    match instr.addr_mode {
        AddressMode::Immediate => Value::Constant(instr.operand_bytes[0]),
        AddressMode::Accumulator => Value::Register(Register::A),
        AddressMode::Zeropage => {
            resolve_memory_operand(operand_addr, instr.operand_bytes[0] as u16, None, true, ctx)
        }
        AddressMode::ZeropageX => resolve_memory_operand(
            operand_addr,
            instr.operand_bytes[0] as u16,
            Some(Register::X),
            true,
            ctx,
        ),
        AddressMode::ZeropageY => resolve_memory_operand(
            operand_addr,
            instr.operand_bytes[0] as u16,
            Some(Register::Y),
            true,
            ctx,
        ),
        AddressMode::Absolute => {
            resolve_memory_operand(operand_addr, operand_u16(instr), None, false, ctx)
        }
        AddressMode::AbsoluteX => {
            resolve_memory_operand(operand_addr, operand_u16(instr), Some(Register::X), false, ctx)
        }
        AddressMode::AbsoluteY => {
            resolve_memory_operand(operand_addr, operand_u16(instr), Some(Register::Y), false, ctx)
        }
        AddressMode::Xindirect => Value::IndirectMemory {
            zp_pointer: instr.operand_bytes[0],
            add_x_before_indirect: true,
            add_y_after_indirect: false,
        },
        AddressMode::IndirectY => Value::IndirectMemory {
            zp_pointer: instr.operand_bytes[0],
            add_x_before_indirect: false,
            add_y_after_indirect: true,
        },
        AddressMode::Implied | AddressMode::Relative | AddressMode::Indirect => {
            unreachable!("{:?} operands are resolved by their mnemonic's own lowering", instr.addr_mode)
        }
    }
}

fn operand_u16(instr: &DecodedInstruction) -> u16 {
    u16::from_le_bytes([instr.operand_bytes[0], instr.operand_bytes[1]])
}

fn relative_target(instr: &DecodedInstruction) -> u16 {
    let offset = instr.operand_bytes[0] as i8;
    let next = instr.address.wrapping_add(instr.len as u16);
    next.wrapping_add(offset as i16 as u16)
}

fn load(reg: Register, operand: Value, vars: &mut VarAlloc, seq: &mut IrSequence) {
    seq.push(Ir::Copy { src: operand, dst: Value::Register(reg) });
    set_zero_negative(Value::Register(reg), vars, seq);
}

fn transfer(src: Value, dst: Value, with_flags: bool, vars: &mut VarAlloc, seq: &mut IrSequence) {
    seq.push(Ir::Copy { src, dst });
    if with_flags {
        set_zero_negative(dst, vars, seq);
    }
}

fn adc_like(a: Value, operand: Value, vars: &mut VarAlloc, seq: &mut IrSequence) {
    let tmp1 = vars.next();
    seq.push(Ir::Binary { op: BinaryOp::Add, lhs: a, rhs: operand, dst: tmp1 });
    let tmp = vars.next();
    seq.push(Ir::Binary { op: BinaryOp::Add, lhs: tmp1, rhs: Value::Flag(Flag::Carry), dst: tmp });
    seq.push(Ir::Binary {
        op: BinaryOp::GreaterThan,
        lhs: tmp,
        rhs: Value::Constant(0xFF),
        dst: Value::Flag(Flag::Carry),
    });
    let wrap_unused = vars.next();
    seq.push(Ir::WrapValueToByte { value: tmp, overflow_out: wrap_unused });

    let x1 = vars.next();
    seq.push(Ir::Binary { op: BinaryOp::Xor, lhs: a, rhs: tmp, dst: x1 });
    let x2 = vars.next();
    seq.push(Ir::Binary { op: BinaryOp::Xor, lhs: operand, rhs: tmp, dst: x2 });
    let x3 = vars.next();
    seq.push(Ir::Binary { op: BinaryOp::And, lhs: x1, rhs: x2, dst: x3 });
    let x4 = vars.next();
    seq.push(Ir::Binary { op: BinaryOp::And, lhs: x3, rhs: Value::Constant(0x80), dst: x4 });
    seq.push(Ir::Binary {
        op: BinaryOp::NotEquals,
        lhs: x4,
        rhs: Value::Constant(0),
        dst: Value::Flag(Flag::Overflow),
    });

    seq.push(Ir::Copy { src: tmp, dst: a });
    set_zero_negative(a, vars, seq);
}

fn compare(reg: Value, operand: Value, vars: &mut VarAlloc, seq: &mut IrSequence) {
    let tmp = vars.next();
    seq.push(Ir::Binary { op: BinaryOp::Subtract, lhs: reg, rhs: operand, dst: tmp });
    seq.push(Ir::Binary {
        op: BinaryOp::GreaterThanOrEqualTo,
        lhs: reg,
        rhs: operand,
        dst: Value::Flag(Flag::Carry),
    });
    seq.push(Ir::Binary { op: BinaryOp::Equals, lhs: reg, rhs: operand, dst: Value::Flag(Flag::Zero) });
    let bit7 = vars.next();
    seq.push(Ir::Binary { op: BinaryOp::And, lhs: tmp, rhs: Value::Constant(0x80), dst: bit7 });
    seq.push(Ir::Binary {
        op: BinaryOp::NotEquals,
        lhs: bit7,
        rhs: Value::Constant(0),
        dst: Value::Flag(Flag::Negative),
    });
}

fn logical(op: BinaryOp, operand: Value, vars: &mut VarAlloc, seq: &mut IrSequence) {
    seq.push(Ir::Binary { op, lhs: Value::Register(Register::A), rhs: operand, dst: Value::Register(Register::A) });
    set_zero_negative(Value::Register(Register::A), vars, seq);
}

fn bit(operand: Value, vars: &mut VarAlloc, seq: &mut IrSequence) {
    let tmp = vars.next();
    seq.push(Ir::Binary { op: BinaryOp::And, lhs: Value::Register(Register::A), rhs: operand, dst: tmp });
    seq.push(Ir::Binary { op: BinaryOp::Equals, lhs: tmp, rhs: Value::Constant(0), dst: Value::Flag(Flag::Zero) });
    let n = vars.next();
    seq.push(Ir::Binary { op: BinaryOp::And, lhs: operand, rhs: Value::Constant(0x80), dst: n });
    seq.push(Ir::Binary { op: BinaryOp::NotEquals, lhs: n, rhs: Value::Constant(0), dst: Value::Flag(Flag::Negative) });
    let v = vars.next();
    seq.push(Ir::Binary { op: BinaryOp::And, lhs: operand, rhs: Value::Constant(0x40), dst: v });
    seq.push(Ir::Binary { op: BinaryOp::NotEquals, lhs: v, rhs: Value::Constant(0), dst: Value::Flag(Flag::Overflow) });
}

fn shift_left(operand: Value, rotate: bool, vars: &mut VarAlloc, seq: &mut IrSequence) {
    let co = vars.next();
    seq.push(Ir::Binary { op: BinaryOp::And, lhs: operand, rhs: Value::Constant(0x80), dst: co });
    let new_carry = vars.next();
    seq.push(Ir::Binary { op: BinaryOp::NotEquals, lhs: co, rhs: Value::Constant(0), dst: new_carry });
    let shifted = vars.next();
    seq.push(Ir::Binary { op: BinaryOp::ShiftLeft, lhs: operand, rhs: Value::Constant(1), dst: shifted });

    let result = if rotate {
        let r = vars.next();
        seq.push(Ir::Binary { op: BinaryOp::Or, lhs: shifted, rhs: Value::Flag(Flag::Carry), dst: r });
        r
    } else {
        shifted
    };

    seq.push(Ir::Copy { src: new_carry, dst: Value::Flag(Flag::Carry) });
    seq.push(Ir::Copy { src: result, dst: operand });
    set_zero_negative(operand, vars, seq);
}

fn shift_right(operand: Value, rotate: bool, vars: &mut VarAlloc, seq: &mut IrSequence) {
    let co = vars.next();
    seq.push(Ir::Binary { op: BinaryOp::And, lhs: operand, rhs: Value::Constant(0x01), dst: co });
    let new_carry = vars.next();
    seq.push(Ir::Binary { op: BinaryOp::NotEquals, lhs: co, rhs: Value::Constant(0), dst: new_carry });
    let shifted = vars.next();
    seq.push(Ir::Binary { op: BinaryOp::ShiftRight, lhs: operand, rhs: Value::Constant(1), dst: shifted });

    let result = if rotate {
        let carry_hi = vars.next();
        seq.push(Ir::Binary {
            op: BinaryOp::ShiftLeft,
            lhs: Value::Flag(Flag::Carry),
            rhs: Value::Constant(7),
            dst: carry_hi,
        });
        let r = vars.next();
        seq.push(Ir::Binary { op: BinaryOp::Or, lhs: shifted, rhs: carry_hi, dst: r });
        r
    } else {
        shifted
    };

    seq.push(Ir::Copy { src: new_carry, dst: Value::Flag(Flag::Carry) });
    seq.push(Ir::Copy { src: result, dst: operand });
    set_zero_negative(operand, vars, seq);
}

fn inc_dec(operand: Value, increment: bool, vars: &mut VarAlloc, seq: &mut IrSequence) {
    let op = if increment { BinaryOp::Add } else { BinaryOp::Subtract };
    seq.push(Ir::Binary { op, lhs: operand, rhs: Value::Constant(1), dst: operand });
    set_zero_negative(operand, vars, seq);
}

fn set_clear_flag(flag: Flag, set: bool, seq: &mut IrSequence) {
    seq.push(Ir::Copy { src: Value::Constant(set as u8), dst: Value::Flag(flag) });
}

fn branch(flag: Flag, taken_when_set: bool, target: LabelName, seq: &mut IrSequence) {
    let ir = if taken_when_set {
        Ir::JumpIfNotZero { cond: Value::Flag(flag), label: target }
    } else {
        Ir::JumpIfZero { cond: Value::Flag(flag), label: target }
    };
    seq.push(ir);
}

fn lower_instruction(
    instr: &DecodedInstruction,
    ctx: &LiftContext,
    vars: &mut VarAlloc,
    seq: &mut IrSequence,
) -> Result<(), LiftError> {
    use Mnemonic::*;

    match instr.mnemonic {
        Lda(_) => load(Register::A, operand_value(instr, ctx), vars, seq),
        Ldx(_) => load(Register::X, operand_value(instr, ctx), vars, seq),
        Ldy(_) => load(Register::Y, operand_value(instr, ctx), vars, seq),

        Sta(_) => seq.push(Ir::Copy { src: Value::Register(Register::A), dst: operand_value(instr, ctx) }),
        Stx(_) => seq.push(Ir::Copy { src: Value::Register(Register::X), dst: operand_value(instr, ctx) }),
        Sty(_) => seq.push(Ir::Copy { src: Value::Register(Register::Y), dst: operand_value(instr, ctx) }),

        Tax => transfer(Value::Register(Register::A), Value::Register(Register::X), true, vars, seq),
        Tay => transfer(Value::Register(Register::A), Value::Register(Register::Y), true, vars, seq),
        Txa => transfer(Value::Register(Register::X), Value::Register(Register::A), true, vars, seq),
        Tya => transfer(Value::Register(Register::Y), Value::Register(Register::A), true, vars, seq),
        Tsx => transfer(Value::StackPointer, Value::Register(Register::X), true, vars, seq),
        Txs => transfer(Value::Register(Register::X), Value::StackPointer, false, vars, seq),

        Adc(_) => adc_like(Value::Register(Register::A), operand_value(instr, ctx), vars, seq),
        Sbc(_) => {
            let inverted = vars.next();
            seq.push(Ir::Unary { op: UnaryOp::BitwiseNot, src: operand_value(instr, ctx), dst: inverted });
            adc_like(Value::Register(Register::A), inverted, vars, seq);
        }

        Cmp(_) => compare(Value::Register(Register::A), operand_value(instr, ctx), vars, seq),
        Cpx(_) => compare(Value::Register(Register::X), operand_value(instr, ctx), vars, seq),
        Cpy(_) => compare(Value::Register(Register::Y), operand_value(instr, ctx), vars, seq),

        And(_) => logical(BinaryOp::And, operand_value(instr, ctx), vars, seq),
        Ora(_) => logical(BinaryOp::Or, operand_value(instr, ctx), vars, seq),
        Eor(_) => logical(BinaryOp::Xor, operand_value(instr, ctx), vars, seq),

        Bit(_) => bit(operand_value(instr, ctx), vars, seq),

        Asl(_) => shift_left(operand_value(instr, ctx), false, vars, seq),
        Rol(_) => shift_left(operand_value(instr, ctx), true, vars, seq),
        Lsr(_) => shift_right(operand_value(instr, ctx), false, vars, seq),
        Ror(_) => shift_right(operand_value(instr, ctx), true, vars, seq),

        Inc(_) => inc_dec(operand_value(instr, ctx), true, vars, seq),
        Dec(_) => inc_dec(operand_value(instr, ctx), false, vars, seq),
        Inx => inc_dec(Value::Register(Register::X), true, vars, seq),
        Dex => inc_dec(Value::Register(Register::X), false, vars, seq),
        Iny => inc_dec(Value::Register(Register::Y), true, vars, seq),
        Dey => inc_dec(Value::Register(Register::Y), false, vars, seq),

        Sec => set_clear_flag(Flag::Carry, true, seq),
        Clc => set_clear_flag(Flag::Carry, false, seq),
        Sed => set_clear_flag(Flag::Decimal, true, seq),
        Cld => set_clear_flag(Flag::Decimal, false, seq),
        Sei => set_clear_flag(Flag::InterruptDisable, true, seq),
        Cli => set_clear_flag(Flag::InterruptDisable, false, seq),
        Clv => set_clear_flag(Flag::Overflow, false, seq),

        Bcc => branch(Flag::Carry, false, relative_target(instr) as LabelName, seq),
        Bcs => branch(Flag::Carry, true, relative_target(instr) as LabelName, seq),
        Beq => branch(Flag::Zero, true, relative_target(instr) as LabelName, seq),
        Bne => branch(Flag::Zero, false, relative_target(instr) as LabelName, seq),
        Bmi => branch(Flag::Negative, true, relative_target(instr) as LabelName, seq),
        Bpl => branch(Flag::Negative, false, relative_target(instr) as LabelName, seq),
        Bvc => branch(Flag::Overflow, false, relative_target(instr) as LabelName, seq),
        Bvs => branch(Flag::Overflow, true, relative_target(instr) as LabelName, seq),

        Jmp(AddressMode::Absolute) => {
            let target = operand_u16(instr);
            if ctx.internal_addresses.contains(&target) {
                if !ctx.jump_targets.contains(&target) {
                    return Err(LiftError::UnresolvableBranch(instr.address));
                }
                seq.push(Ir::Jump(target as LabelName));
            } else {
                seq.push(Ir::CallFunction(FunctionAddress { address: target, indirect: false }));
                seq.push(Ir::Return { from_interrupt: false });
            }
        }
        Jmp(AddressMode::Indirect) => {
            let pointer = operand_u16(instr);
            seq.push(Ir::CallFunction(FunctionAddress { address: pointer, indirect: true }));
            seq.push(Ir::Return { from_interrupt: false });
        }
        Jmp(_) => unreachable!("JMP only ever decodes to Absolute or Indirect addressing"),

        Jsr => {
            // JSR is always 3 bytes, so `instr.address + 2` is (return
            // address - 1) without needing the generator to recover the
            // originating 6502 address from the call site at run time.
            let target = operand_u16(instr);
            let return_minus_one = instr.address.wrapping_add(2);
            seq.push(Ir::PushStackValue(Value::Constant((return_minus_one >> 8) as u8)));
            seq.push(Ir::PushStackValue(Value::Constant((return_minus_one & 0xFF) as u8)));
            seq.push(Ir::CallFunction(FunctionAddress { address: target, indirect: false }));
        }

        Rts => seq.push(Ir::Return { from_interrupt: false }),
        Rti => seq.push(Ir::Return { from_interrupt: true }),

        Pha => seq.push(Ir::PushStackValue(Value::Register(Register::A))),
        Php => {
            let pushed = vars.next();
            seq.push(Ir::Binary { op: BinaryOp::Or, lhs: Value::AllFlags, rhs: Value::Constant(0x30), dst: pushed });
            seq.push(Ir::PushStackValue(pushed));
        }
        Pla => {
            seq.push(Ir::PopStackValue(Value::Register(Register::A)));
            set_zero_negative(Value::Register(Register::A), vars, seq);
        }
        Plp => {
            let popped = vars.next();
            seq.push(Ir::PopStackValue(popped));
            let preserved = vars.next();
            seq.push(Ir::Binary { op: BinaryOp::And, lhs: Value::AllFlags, rhs: Value::Constant(0x30), dst: preserved });
            let cleared = vars.next();
            seq.push(Ir::Binary { op: BinaryOp::And, lhs: popped, rhs: Value::Constant(0xCF), dst: cleared });
            seq.push(Ir::Binary { op: BinaryOp::Or, lhs: cleared, rhs: preserved, dst: Value::AllFlags });
        }

        Brk => seq.push(Ir::InvokeSoftwareInterrupt),
        Nop => seq.push(Ir::NoOp),

        Jam => return Err(LiftError::UnknownOpcode(instr.opcode)),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompile::Disassembler;

    fn lift(code: &[u8], base: u16) -> IrSequence {
        let regions = [(base, code)];
        let f = Disassembler::trace(base, &regions).unwrap();
        Lifter::lift_function(&f, &BTreeSet::new()).unwrap()
    }

    #[test]
    fn lda_immediate_copies_into_a_and_sets_flags() {
        let seq = lift(&[0xA9, 0x00], 0x1000);
        assert!(matches!(seq[0], Ir::Copy { src: Value::Constant(0x00), dst: Value::Register(Register::A) }));
        assert!(seq.iter().any(|ir| matches!(
            ir,
            Ir::Binary { op: BinaryOp::Equals, dst: Value::Flag(Flag::Zero), .. }
        )));
    }

    #[test]
    fn branch_target_gets_a_label() {
        // BEQ +2 ; LDA #1 ; LDA #2 ; RTS
        let code = [0xF0, 0x02, 0xA9, 0x01, 0xA9, 0x02, 0x60];
        let seq = lift(&code, 0x1000);
        assert!(seq.iter().any(|ir| matches!(ir, Ir::Label(0x1004))));
        assert!(seq.iter().any(|ir| matches!(ir, Ir::JumpIfNotZero { label: 0x1004, .. })));
    }

    #[test]
    fn jsr_pushes_return_minus_one_then_calls() {
        let seq = lift(&[0x20, 0x00, 0x90], 0x8000);
        assert_eq!(seq.len(), 3);
        assert!(matches!(seq[0], Ir::PushStackValue(Value::Constant(0x80))));
        assert!(matches!(seq[1], Ir::PushStackValue(Value::Constant(0x02))));
        assert!(matches!(
            seq[2],
            Ir::CallFunction(FunctionAddress { address: 0x9000, indirect: false })
        ));
    }

    #[test]
    fn indirect_jmp_lowers_to_indirect_call_and_return() {
        let seq = lift(&[0x6C, 0xFF, 0x20], 0x1000);
        assert_eq!(seq.len(), 2);
        assert!(matches!(
            seq[0],
            Ir::CallFunction(FunctionAddress { address: 0x20FF, indirect: true })
        ));
        assert!(matches!(seq[1], Ir::Return { from_interrupt: false }));
    }

    #[test]
    fn jam_not_at_the_end_of_address_order_does_not_fail_lifting() {
        // BEQ +3 ; <unreachable filler> ; NOP ; RTS, with the fallthrough
        // of the BEQ landing on an illegal opcode (0x02). `ordered_instructions`
        // sorts by address, so the Jam (at 0x1002) ends up before the
        // branch target's NOP/RTS (at 0x1005/0x1006) in the list even
        // though it is a dead end on its own path, not the function's.
        let code = [0xF0, 0x03, 0x02, 0xEA, 0xEA, 0xEA, 0x60];
        let seq = lift(&code, 0x1000);
        assert!(seq.iter().any(|ir| matches!(ir, Ir::Label(0x1005))));
        assert!(seq.iter().any(|ir| matches!(ir, Ir::JumpIfNotZero { label: 0x1005, .. })));
        assert!(seq.iter().any(|ir| matches!(
            ir,
            Ir::CallFunction(FunctionAddress { address: 0x1002, indirect: false })
        )));
        assert!(seq.iter().any(|ir| matches!(ir, Ir::Return { from_interrupt: false })));
    }

    #[test]
    fn smc_target_on_operand_bytes_uses_dynamic_memory() {
        // LDA $2000 ; the operand bytes at 0x1001/0x1002 are the SMC target.
        let code = [0xAD, 0x00, 0x20];
        let regions = [(0x1000u16, &code[..])];
        let f = Disassembler::trace(0x1000, &regions).unwrap();
        let mut smc = BTreeSet::new();
        smc.insert(0x1001u16);
        let seq = Lifter::lift_function(&f, &smc).unwrap();
        assert!(matches!(
            seq[0],
            Ir::Copy { src: Value::Memory { location: crate::ir::Location::Dynamic { pointer_address: 0x1001, .. }, .. }, .. }
        ));
    }
}
