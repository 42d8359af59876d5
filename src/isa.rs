//! Instruction set tables for the stack machine.
//!
//! This module pins down the binary contract shared by the assembler, the
//! disassembler and the emulator: the opcode numbering, the operand bytes
//! each opcode carries, and the register file names.
//!
//! An instruction is an opcode byte followed immediately by its operand
//! bytes (1 to 11 bytes total). Instructions are packed back to back with
//! no padding, no header and no count; end of stream is the only
//! terminator.

use std::fmt;

/// Number of general-purpose registers (`ax`, `bx`, `cx`, `dx`).
pub const REG_COUNT: usize = 4;

/// Size of the emulator's flat data memory, in f64 cells.
pub const MEM_SIZE: usize = 1024;

/// Tolerance used by the `je`/`jn` about-equal comparison.
pub const EPSILON: f64 = 1e-7;

const REG_NAMES: [&str; REG_COUNT] = ["ax", "bx", "cx", "dx"];

/// Look up a register id by its mnemonic name.
pub fn reg_id(name: &str) -> Option<u8> {
    REG_NAMES.iter().position(|&r| r == name).map(|i| i as u8)
}

/// Look up a register name by id. `None` for ids outside the register file.
pub fn reg_name(id: u8) -> Option<&'static str> {
    REG_NAMES.get(id as usize).copied()
}

/// The operand bytes an opcode carries, in encoding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operands {
    /// No operand bytes.
    None,
    /// One register id byte.
    Reg,
    /// One little-endian f64 immediate (8 bytes).
    Imm,
    /// One register id byte plus a little-endian u16 offset.
    Mem,
    /// One little-endian u16 absolute byte position in the stream.
    Target,
}

/// One operation of the virtual machine.
///
/// The discriminants are the encoded byte values; `from_u8` validates
/// membership, so no consumer may assume the numbering is gap-free.
/// Adding an opcode means extending this enum and its `from_u8`,
/// `mnemonic` and `operands` tables, nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Hlt = 0x00,
    In = 0x01,
    Out = 0x02,
    Add = 0x03,
    Sub = 0x04,
    Mul = 0x05,
    Div = 0x06,
    Sin = 0x07,
    Cos = 0x08,
    Sqrt = 0x09,
    PushV = 0x0A,
    PushR = 0x0B,
    PopV = 0x0C,
    PopR = 0x0D,
    Jmp = 0x0E,
    Je = 0x0F,
    Jn = 0x10,
    Jl = 0x11,
    Jg = 0x12,
    Jge = 0x13,
    Jle = 0x14,
    Call = 0x15,
    Ret = 0x16,
    PushM = 0x17,
    PopM = 0x18,
    GpuClear = 0x19,
    GpuPoint = 0x1A,
}

impl Opcode {
    /// Decode an opcode byte, rejecting values outside the table.
    pub fn from_u8(byte: u8) -> Option<Opcode> {
        use Opcode::*;
        Some(match byte {
            0x00 => Hlt,
            0x01 => In,
            0x02 => Out,
            0x03 => Add,
            0x04 => Sub,
            0x05 => Mul,
            0x06 => Div,
            0x07 => Sin,
            0x08 => Cos,
            0x09 => Sqrt,
            0x0A => PushV,
            0x0B => PushR,
            0x0C => PopV,
            0x0D => PopR,
            0x0E => Jmp,
            0x0F => Je,
            0x10 => Jn,
            0x11 => Jl,
            0x12 => Jg,
            0x13 => Jge,
            0x14 => Jle,
            0x15 => Call,
            0x16 => Ret,
            0x17 => PushM,
            0x18 => PopM,
            0x19 => GpuClear,
            0x1A => GpuPoint,
            _ => return None,
        })
    }

    /// The source-level mnemonic. The three push forms (and the three pop
    /// forms) share one mnemonic; the assembler picks the opcode from the
    /// operand's surface syntax.
    pub fn mnemonic(self) -> &'static str {
        use Opcode::*;
        match self {
            Hlt => "hlt",
            In => "in",
            Out => "out",
            Add => "add",
            Sub => "sub",
            Mul => "mul",
            Div => "div",
            Sin => "sin",
            Cos => "cos",
            Sqrt => "sqrt",
            PushV | PushR | PushM => "push",
            PopV | PopR | PopM => "pop",
            Jmp => "jmp",
            Je => "je",
            Jn => "jn",
            Jl => "jl",
            Jg => "jg",
            Jge => "jge",
            Jle => "jle",
            Call => "call",
            Ret => "ret",
            GpuClear => "gpu_clear",
            GpuPoint => "gpu_point",
        }
    }

    /// The operand bytes this opcode is encoded with.
    pub fn operands(self) -> Operands {
        use Opcode::*;
        match self {
            Hlt | In | Out | Add | Sub | Mul | Div | Sin | Cos | Sqrt | PopV | Ret | GpuClear
            | GpuPoint => Operands::None,
            PushV => Operands::Imm,
            PushR | PopR => Operands::Reg,
            PushM | PopM => Operands::Mem,
            Jmp | Je | Jn | Jl | Jg | Jge | Jle | Call => Operands::Target,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
