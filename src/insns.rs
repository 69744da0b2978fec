//! 6502 instruction decode table: opcode byte -> (mnemonic, addressing mode).
//!
//! The table is built the way the hardware actually decodes opcodes:
//! two bits select an instruction group, three bits select the
//! addressing-mode column, three bits select the operation row. See
//! `decode_opcode` for the group/row/column split.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    Implied,
    Accumulator,
    Immediate,
    Relative,
    Xindirect,
    Indirect,
    IndirectY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    Zeropage,
    ZeropageX,
    ZeropageY,
}

impl AddressMode {
    /// Number of operand bytes following the opcode byte.
    pub fn operand_len(self) -> u8 {
        match self {
            AddressMode::Implied | AddressMode::Accumulator => 0,
            AddressMode::Immediate
            | AddressMode::Relative
            | AddressMode::Xindirect
            | AddressMode::IndirectY
            | AddressMode::Zeropage
            | AddressMode::ZeropageX
            | AddressMode::ZeropageY => 1,
            AddressMode::Indirect
            | AddressMode::Absolute
            | AddressMode::AbsoluteX
            | AddressMode::AbsoluteY => 2,
        }
    }
}

/// One of the 56 official 6502 mnemonics, carrying its addressing
/// mode where the mnemonic supports more than one. `Jam` stands for
/// any of the undocumented/illegal opcodes and is never seen by the
/// lifter: the decompiler treats it strictly as a trace terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mnemonic {
    Adc(AddressMode),
    And(AddressMode),
    Asl(AddressMode),
    Bcc,
    Bcs,
    Beq,
    Bit(AddressMode),
    Bmi,
    Bne,
    Bpl,
    Brk,
    Bvc,
    Bvs,
    Clc,
    Cld,
    Cli,
    Clv,
    Cmp(AddressMode),
    Cpx(AddressMode),
    Cpy(AddressMode),
    Dec(AddressMode),
    Dex,
    Dey,
    Eor(AddressMode),
    Inc(AddressMode),
    Inx,
    Iny,
    Jam,
    Jmp(AddressMode),
    Jsr,
    Lda(AddressMode),
    Ldx(AddressMode),
    Ldy(AddressMode),
    Lsr(AddressMode),
    Nop,
    Ora(AddressMode),
    Pha,
    Php,
    Pla,
    Plp,
    Rol(AddressMode),
    Ror(AddressMode),
    Rti,
    Rts,
    Sbc(AddressMode),
    Sec,
    Sed,
    Sei,
    Sta(AddressMode),
    Stx(AddressMode),
    Sty(AddressMode),
    Tax,
    Tay,
    Tsx,
    Txa,
    Txs,
    Tya,
}

impl Mnemonic {
    pub fn is_valid(self) -> bool {
        !matches!(self, Mnemonic::Jam)
    }

    /// The addressing mode used to fetch this mnemonic's operand, if
    /// any. Implied-only mnemonics (`Inx`, `Clc`, ...) return `Implied`.
    pub fn address_mode(self) -> AddressMode {
        use Mnemonic::*;
        match self {
            Adc(m) | And(m) | Asl(m) | Bit(m) | Cmp(m) | Cpx(m) | Cpy(m) | Dec(m) | Eor(m)
            | Inc(m) | Jmp(m) | Lda(m) | Ldx(m) | Ldy(m) | Lsr(m) | Ora(m) | Rol(m) | Ror(m)
            | Sbc(m) | Sta(m) | Stx(m) | Sty(m) => m,
            Bcc | Bcs | Beq | Bmi | Bne | Bpl | Bvc | Bvs => AddressMode::Relative,
            Jsr => AddressMode::Absolute,
            _ => AddressMode::Implied,
        }
    }

    pub fn byte_len(self) -> u8 {
        1 + self.address_mode().operand_len()
    }
}

/// One opcode row at a fixed addressing-mode column, or `None` when
/// the mnemonic at that (row, column) is illegal.
type Row = [Option<Mnemonic>; 8];

macro_rules! row {
    ($($m:expr),* $(,)?) => { [$($m),*] };
}

use AddressMode::*;
use Mnemonic::*;

#[rustfmt::skip]
const GROUP_00: [Row; 8] = [
    row![Some(Brk), None, Some(Php), None, Some(Bpl), None, Some(Clc), None],
    row![Some(Jsr), Some(Bit(Zeropage)), Some(Plp), Some(Bit(Absolute)), Some(Bmi), None, Some(Sec), None],
    row![Some(Rti), None, Some(Pha), Some(Jmp(Absolute)), Some(Bvc), None, Some(Cli), None],
    row![Some(Rts), None, Some(Pla), Some(Jmp(Indirect)), Some(Bvs), None, Some(Sei), None],
    row![None, Some(Sty(Zeropage)), Some(Dey), Some(Sty(Absolute)), Some(Bcc), Some(Sty(ZeropageX)), Some(Tya), None],
    row![Some(Ldy(Immediate)), Some(Ldy(Zeropage)), Some(Tay), Some(Ldy(Absolute)), Some(Bcs), Some(Ldy(ZeropageX)), Some(Clv), Some(Ldy(AbsoluteX))],
    row![Some(Cpy(Immediate)), Some(Cpy(Zeropage)), Some(Iny), Some(Cpy(Absolute)), Some(Bne), None, Some(Cld), None],
    row![Some(Cpx(Immediate)), Some(Cpx(Zeropage)), Some(Inx), Some(Cpx(Absolute)), Some(Beq), None, Some(Sed), None],
];

#[rustfmt::skip]
const GROUP_01: [Row; 8] = [
    row![Some(Ora(Xindirect)), Some(Ora(Zeropage)), Some(Ora(Immediate)), Some(Ora(Absolute)), Some(Ora(IndirectY)), Some(Ora(ZeropageX)), Some(Ora(AbsoluteY)), Some(Ora(AbsoluteX))],
    row![Some(And(Xindirect)), Some(And(Zeropage)), Some(And(Immediate)), Some(And(Absolute)), Some(And(IndirectY)), Some(And(ZeropageX)), Some(And(AbsoluteY)), Some(And(AbsoluteX))],
    row![Some(Eor(Xindirect)), Some(Eor(Zeropage)), Some(Eor(Immediate)), Some(Eor(Absolute)), Some(Eor(IndirectY)), Some(Eor(ZeropageX)), Some(Eor(AbsoluteY)), Some(Eor(AbsoluteX))],
    row![Some(Adc(Xindirect)), Some(Adc(Zeropage)), Some(Adc(Immediate)), Some(Adc(Absolute)), Some(Adc(IndirectY)), Some(Adc(ZeropageX)), Some(Adc(AbsoluteY)), Some(Adc(AbsoluteX))],
    row![Some(Sta(Xindirect)), Some(Sta(Zeropage)), None, Some(Sta(Absolute)), Some(Sta(IndirectY)), Some(Sta(ZeropageX)), Some(Sta(AbsoluteY)), Some(Sta(AbsoluteX))],
    row![Some(Lda(Xindirect)), Some(Lda(Zeropage)), Some(Lda(Immediate)), Some(Lda(Absolute)), Some(Lda(IndirectY)), Some(Lda(ZeropageX)), Some(Lda(AbsoluteY)), Some(Lda(AbsoluteX))],
    row![Some(Cmp(Xindirect)), Some(Cmp(Zeropage)), Some(Cmp(Immediate)), Some(Cmp(Absolute)), Some(Cmp(IndirectY)), Some(Cmp(ZeropageX)), Some(Cmp(AbsoluteY)), Some(Cmp(AbsoluteX))],
    row![Some(Sbc(Xindirect)), Some(Sbc(Zeropage)), Some(Sbc(Immediate)), Some(Sbc(Absolute)), Some(Sbc(IndirectY)), Some(Sbc(ZeropageX)), Some(Sbc(AbsoluteY)), Some(Sbc(AbsoluteX))],
];

#[rustfmt::skip]
const GROUP_10: [Row; 8] = [
    row![None, Some(Asl(Zeropage)), Some(Asl(Accumulator)), Some(Asl(Absolute)), None, Some(Asl(ZeropageX)), None, Some(Asl(AbsoluteX))],
    row![None, Some(Rol(Zeropage)), Some(Rol(Accumulator)), Some(Rol(Absolute)), None, Some(Rol(ZeropageX)), None, Some(Rol(AbsoluteX))],
    row![None, Some(Lsr(Zeropage)), Some(Lsr(Accumulator)), Some(Lsr(Absolute)), None, Some(Lsr(ZeropageX)), None, Some(Lsr(AbsoluteX))],
    row![None, Some(Ror(Zeropage)), Some(Ror(Accumulator)), Some(Ror(Absolute)), None, Some(Ror(ZeropageX)), None, Some(Ror(AbsoluteX))],
    row![None, Some(Stx(Zeropage)), Some(Txa), Some(Stx(Absolute)), None, Some(Stx(ZeropageY)), Some(Txs), None],
    row![Some(Ldx(Immediate)), Some(Ldx(Zeropage)), Some(Tax), Some(Ldx(Absolute)), None, Some(Ldx(ZeropageY)), Some(Tsx), Some(Ldx(AbsoluteY))],
    row![None, Some(Dec(Zeropage)), Some(Dex), Some(Dec(Absolute)), None, Some(Dec(ZeropageX)), None, Some(Dec(AbsoluteX))],
    row![None, Some(Inc(Zeropage)), Some(Nop), Some(Inc(Absolute)), None, Some(Inc(ZeropageX)), None, Some(Inc(AbsoluteX))],
];

/// Decode a single opcode byte into its mnemonic. `Mnemonic::Jam` for
/// anything undocumented (including all of instruction group `0b11`,
/// which has no legal instructions at all).
pub fn decode_opcode(opcode: u8) -> Mnemonic {
    let group = opcode & 0b11;
    let row = (opcode >> 5) as usize;
    let col = ((opcode >> 2) & 0b111) as usize;

    let table: &[Row; 8] = match group {
        0b00 => &GROUP_00,
        0b01 => &GROUP_01,
        0b10 => &GROUP_10,
        _ => return Mnemonic::Jam,
    };

    table[row][col].unwrap_or(Mnemonic::Jam)
}
