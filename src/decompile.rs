//! Function decompiler: traces reachable 6502 instructions from an
//! entry address until the function's control flow leaves it.
//!
//! Grounded on the algorithmic shape of the teacher's `step`/`run`
//! loop in `yamos6502.rs` (decode-one-instruction-at-a-time), adapted
//! from single-step execution to static worklist tracing.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use thiserror::Error;

use crate::insns::{decode_opcode, AddressMode, Mnemonic};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecompileError {
    #[error("no instructions decoded from entry {0:#06x}")]
    Empty(u16),
}

/// One decoded 6502 instruction: the opcode byte plus everything the
/// lifter needs to know about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInstruction {
    pub address: u16,
    pub opcode: u8,
    pub mnemonic: Mnemonic,
    pub addr_mode: AddressMode,
    pub operand_bytes: Vec<u8>,
    pub len: u8,
}

impl DecodedInstruction {
    /// The address one past the last byte of this instruction.
    pub fn next_address(&self) -> u16 {
        self.address.wrapping_add(self.len as u16)
    }

    fn operand_u16(&self) -> u16 {
        debug_assert_eq!(self.operand_bytes.len(), 2);
        u16::from_le_bytes([self.operand_bytes[0], self.operand_bytes[1]])
    }

    fn relative_target(&self) -> u16 {
        debug_assert_eq!(self.operand_bytes.len(), 1);
        let offset = self.operand_bytes[0] as i8;
        self.next_address().wrapping_add(offset as i16 as u16)
    }
}

/// One reachable 6502 function: its instructions in address order and
/// the set of addresses that some branch or jump targets (and
/// therefore need a label when lifted).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecompiledFunction {
    pub address: u16,
    pub ordered_instructions: Vec<DecodedInstruction>,
    pub jump_targets: BTreeSet<u16>,
}

fn mnemonic_is_terminal(mnemonic: Mnemonic) -> bool {
    matches!(
        mnemonic,
        Mnemonic::Rts | Mnemonic::Rti | Mnemonic::Brk | Mnemonic::Jsr | Mnemonic::Jam
    ) || matches!(mnemonic, Mnemonic::Jmp(AddressMode::Indirect))
}

/// Resolves an address against the flat code regions exposed by
/// `MemoryBus::enumerate_code_regions`, without needing a live bus.
fn read_byte(regions: &[(u16, &[u8])], address: u16) -> Option<u8> {
    for (base, bytes) in regions {
        let base = *base;
        let len = bytes.len() as u32;
        let offset = address.wrapping_sub(base) as u32;
        if offset < len && (base as u32 + len) <= 0x1_0000 {
            return Some(bytes[offset as usize]);
        }
    }
    None
}

fn decode_at(regions: &[(u16, &[u8])], address: u16) -> Option<DecodedInstruction> {
    let opcode = read_byte(regions, address)?;
    let mnemonic = decode_opcode(opcode);
    let addr_mode = mnemonic.address_mode();
    let len = mnemonic.byte_len();

    let mut operand_bytes = Vec::with_capacity(len as usize - 1);
    for i in 1..len {
        operand_bytes.push(read_byte(regions, address.wrapping_add(i as u16))?);
    }

    Some(DecodedInstruction {
        address,
        opcode,
        mnemonic,
        addr_mode,
        operand_bytes,
        len,
    })
}

pub struct Disassembler;

impl Disassembler {
    /// Trace one 6502 function reachable from `entry`, reading bytes
    /// from `regions` (as yielded by `MemoryBus::enumerate_code_regions`).
    pub fn trace(entry: u16, regions: &[(u16, &[u8])]) -> Result<DecompiledFunction, DecompileError> {
        let mut worklist: VecDeque<u16> = VecDeque::new();
        let mut visited: BTreeSet<u16> = BTreeSet::new();
        let mut instructions: BTreeMap<u16, DecodedInstruction> = BTreeMap::new();
        let mut jump_targets: BTreeSet<u16> = BTreeSet::new();

        worklist.push_back(entry);

        while let Some(address) = worklist.pop_front() {
            if !visited.insert(address) {
                continue;
            }

            let Some(instruction) = decode_at(regions, address) else {
                // Unmapped opcode or truncated operand at the edge of a
                // region: this path silently dead-ends.
                continue;
            };

            let mnemonic = instruction.mnemonic;
            let next = instruction.next_address();
            let is_branch = matches!(
                mnemonic,
                Mnemonic::Bcc
                    | Mnemonic::Bcs
                    | Mnemonic::Beq
                    | Mnemonic::Bne
                    | Mnemonic::Bmi
                    | Mnemonic::Bpl
                    | Mnemonic::Bvc
                    | Mnemonic::Bvs
            );

            if is_branch {
                let target = instruction.relative_target();
                jump_targets.insert(target);
                worklist.push_back(target);
                worklist.push_back(next);
            } else if mnemonic == Mnemonic::Jmp(AddressMode::Absolute) {
                let target = instruction.operand_u16();
                jump_targets.insert(target);
                worklist.push_back(target);
            } else if !mnemonic_is_terminal(mnemonic) {
                worklist.push_back(next);
            }

            instructions.insert(address, instruction);
        }

        if instructions.is_empty() {
            return Err(DecompileError::Empty(entry));
        }

        // A branch/jump target that was never actually decoded (e.g. it
        // falls outside the mapped regions reachable from `entry`)
        // doesn't need a label in this function.
        jump_targets.retain(|addr| instructions.contains_key(addr));

        Ok(DecompiledFunction {
            address: entry,
            ordered_instructions: instructions.into_values().collect(),
            jump_targets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_line_function_terminates_at_rts() {
        // LDA #$00 ; RTS
        let code: [u8; 3] = [0xA9, 0x00, 0x60];
        let regions = [(0x1000u16, &code[..])];
        let f = Disassembler::trace(0x1000, &regions).unwrap();
        assert_eq!(f.ordered_instructions.len(), 2);
        assert_eq!(f.ordered_instructions[0].mnemonic, Mnemonic::Lda(AddressMode::Immediate));
        assert_eq!(f.ordered_instructions[1].mnemonic, Mnemonic::Rts);
        assert!(f.jump_targets.is_empty());
    }

    #[test]
    fn conditional_branch_extends_both_paths_and_labels_target() {
        // 0x1000: BEQ +2 (to 0x1004)
        // 0x1002: LDA #$01 ; RTS   (fall-through path)
        // 0x1004: LDA #$02 ; RTS   (branch-taken path)
        let code: [u8; 8] = [0xF0, 0x02, 0xA9, 0x01, 0x60, 0xA9, 0x02, 0x60];
        let regions = [(0x1000u16, &code[..])];
        let f = Disassembler::trace(0x1000, &regions).unwrap();
        assert_eq!(f.ordered_instructions.len(), 5);
        assert!(f.jump_targets.contains(&0x1004));
    }

    #[test]
    fn jsr_is_terminal_and_does_not_extend_into_callee() {
        // JSR $9000 at 0x8000, followed by bytes that must never be decoded.
        let code: [u8; 3] = [0x20, 0x00, 0x90];
        let regions = [(0x8000u16, &code[..])];
        let f = Disassembler::trace(0x8000, &regions).unwrap();
        assert_eq!(f.ordered_instructions.len(), 1);
        assert_eq!(f.ordered_instructions[0].mnemonic, Mnemonic::Jsr);
    }

    #[test]
    fn indirect_jmp_is_terminal() {
        let code: [u8; 3] = [0x6C, 0x00, 0x20];
        let regions = [(0x1000u16, &code[..])];
        let f = Disassembler::trace(0x1000, &regions).unwrap();
        assert_eq!(f.ordered_instructions.len(), 1);
        assert_eq!(f.ordered_instructions[0].mnemonic, Mnemonic::Jmp(AddressMode::Indirect));
    }

    #[test]
    fn direct_jmp_follows_its_target_without_falling_through() {
        // 0x1000: JMP $1005
        // 0x1005: RTS
        let mut code = vec![0x4C, 0x05, 0x10];
        code.resize(5, 0xEA); // filler NOPs that must not be decoded
        code.push(0x60);
        let regions = [(0x1000u16, &code[..])];
        let f = Disassembler::trace(0x1000, &regions).unwrap();
        assert_eq!(f.ordered_instructions.len(), 2);
        assert!(f.ordered_instructions.iter().any(|i| i.mnemonic == Mnemonic::Rts));
        assert!(f.jump_targets.contains(&0x1005));
    }

    #[test]
    fn empty_trace_is_an_error() {
        let regions: [(u16, &[u8]); 0] = [];
        assert_eq!(Disassembler::trace(0x1000, &regions), Err(DecompileError::Empty(0x1000)));
    }
}
