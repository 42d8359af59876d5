//! Two-pass assembler for the stack-machine source language.
//!
//! The source is line oriented: one instruction or label per logical line,
//! `;` starts a comment, and a `label:` may share a line with the
//! instruction that follows it.
//!
//! Branch targets may name labels defined later in the source, so a single
//! left-to-right pass cannot know every address. Rather than keeping a
//! fixup list, the assembler runs the identical pass twice: pass 1 (with
//! pedantic label checking off) exists to discover label positions and
//! catch encoding-level errors, emitting placeholder addresses for forward
//! references; the output cursor is then rewound and pass 2 re-encodes the
//! whole program in place, this time treating any still-unresolved label as
//! a hard error. The binary is handed out only after both passes succeed.
//!
//! # Example
//!
//! ```
//! let binary = stasm::asm::assemble("
//!     start:
//!         push 2
//!         push 3
//!         add
//!         hlt
//! ").unwrap();
//! assert_eq!(binary.len(), 9 + 9 + 1 + 1);
//! ```

pub mod labels;
pub mod operand;

use once_cell::sync::Lazy;
use std::collections::HashMap;
use thiserror::Error;

use crate::buffer::ByteBuf;
use crate::isa::Opcode;
use labels::{LabelError, LabelTable, UNRESOLVED};
use operand::Operand;

/// Errors reported while assembling, with 1-based source line numbers.
#[derive(Debug, Error)]
pub enum AsmError {
    #[error("line {line}: unknown mnemonic '{name}'")]
    UnknownMnemonic { line: usize, name: String },

    #[error("line {line}: wrong number of operands for '{name}'")]
    ArgCount { line: usize, name: String },

    #[error("line {line}: malformed operand '{token}'")]
    BadOperand { line: usize, token: String },

    /// Only raised by the pedantic second pass: every label that will ever
    /// be defined has been seen by then.
    #[error("line {line}: label '{name}' is never defined")]
    UnresolvedLabel { line: usize, name: String },

    /// A label address too large for the u16 target encoding.
    #[error("line {line}: label '{name}' at {addr} is past the 16-bit target limit")]
    TargetOutOfRange { line: usize, name: String, addr: usize },

    #[error("line {line}: {source}")]
    Label {
        line: usize,
        #[source]
        source: LabelError,
    },
}

/// How a mnemonic consumes its operand tokens.
enum Mnemonic {
    /// Zero operands, one fixed opcode byte.
    Plain(Opcode),
    /// One operand classified by surface syntax into three push forms.
    Push,
    /// Zero operands (discard form) or one register/memory operand.
    Pop,
    /// One label-name operand, encoded as a u16 absolute target.
    Branch(Opcode),
}

static MNEMONICS: Lazy<HashMap<&'static str, Mnemonic>> = Lazy::new(|| {
    use Mnemonic::*;
    let mut table = HashMap::new();
    table.insert("hlt", Plain(Opcode::Hlt));
    table.insert("in", Plain(Opcode::In));
    table.insert("out", Plain(Opcode::Out));
    table.insert("add", Plain(Opcode::Add));
    table.insert("sub", Plain(Opcode::Sub));
    table.insert("mul", Plain(Opcode::Mul));
    table.insert("div", Plain(Opcode::Div));
    table.insert("sin", Plain(Opcode::Sin));
    table.insert("cos", Plain(Opcode::Cos));
    table.insert("sqrt", Plain(Opcode::Sqrt));
    table.insert("ret", Plain(Opcode::Ret));
    table.insert("gpu_clear", Plain(Opcode::GpuClear));
    table.insert("gpu_point", Plain(Opcode::GpuPoint));
    table.insert("push", Push);
    table.insert("pop", Pop);
    table.insert("jmp", Branch(Opcode::Jmp));
    table.insert("je", Branch(Opcode::Je));
    table.insert("jn", Branch(Opcode::Jn));
    table.insert("jl", Branch(Opcode::Jl));
    table.insert("jg", Branch(Opcode::Jg));
    table.insert("jge", Branch(Opcode::Jge));
    table.insert("jle", Branch(Opcode::Jle));
    table.insert("call", Branch(Opcode::Call));
    table
});

/// Assemble source text into the binary instruction stream.
pub fn assemble(source: &str) -> Result<Vec<u8>, AsmError> {
    let mut session = Assembler::new();
    session.pass(source, false)?;
    session.buf.rewind();
    session.pass(source, true)?;
    Ok(session.buf.into_bytes())
}

struct Assembler {
    labels: LabelTable,
    buf: ByteBuf,
}

impl Assembler {
    fn new() -> Assembler {
        Assembler {
            labels: LabelTable::new(),
            buf: ByteBuf::new(),
        }
    }

    fn pass(&mut self, source: &str, pedantic: bool) -> Result<(), AsmError> {
        for (index, raw) in source.lines().enumerate() {
            let line = index + 1;
            let text = raw.split(';').next().unwrap_or("");
            let mut tokens: Vec<&str> = text.split_whitespace().collect();
            if tokens.is_empty() {
                continue;
            }

            if let Some(name) = tokens[0].strip_suffix(':') {
                self.labels
                    .set(name, self.buf.pos())
                    .map_err(|source| AsmError::Label { line, source })?;
                tokens.remove(0);
            }
            if tokens.is_empty() {
                continue;
            }

            self.encode_line(line, tokens[0], &tokens[1..], pedantic)?;
        }
        Ok(())
    }

    fn encode_line(
        &mut self,
        line: usize,
        name: &str,
        args: &[&str],
        pedantic: bool,
    ) -> Result<(), AsmError> {
        let arg_count = |expected: usize| -> Result<(), AsmError> {
            if args.len() != expected {
                Err(AsmError::ArgCount {
                    line,
                    name: name.to_string(),
                })
            } else {
                Ok(())
            }
        };

        match MNEMONICS.get(name) {
            None => Err(AsmError::UnknownMnemonic {
                line,
                name: name.to_string(),
            }),

            Some(Mnemonic::Plain(opcode)) => {
                arg_count(0)?;
                self.buf.write_u8(*opcode as u8);
                Ok(())
            }

            Some(Mnemonic::Branch(opcode)) => {
                arg_count(1)?;
                let opcode = *opcode;
                let addr = self
                    .labels
                    .get_or_create(args[0])
                    .map_err(|source| AsmError::Label { line, source })?;
                if addr == UNRESOLVED {
                    if pedantic {
                        return Err(AsmError::UnresolvedLabel {
                            line,
                            name: args[0].to_string(),
                        });
                    }
                } else if addr > u16::MAX as usize {
                    // Truncating would emit a wrong target.
                    return Err(AsmError::TargetOutOfRange {
                        line,
                        name: args[0].to_string(),
                        addr,
                    });
                }
                self.buf.write_u8(opcode as u8);
                self.buf.write_u16(addr as u16);
                Ok(())
            }

            Some(Mnemonic::Push) => {
                arg_count(1)?;
                match operand::classify(args[0]) {
                    Some(Operand::Immediate(value)) => {
                        self.buf.write_u8(Opcode::PushV as u8);
                        self.buf.write_f64(value);
                    }
                    Some(Operand::Register(id)) => {
                        self.buf.write_u8(Opcode::PushR as u8);
                        self.buf.write_u8(id);
                    }
                    Some(Operand::Memory { reg, offset }) => {
                        self.buf.write_u8(Opcode::PushM as u8);
                        self.buf.write_u8(reg);
                        self.buf.write_u16(offset);
                    }
                    None => {
                        return Err(AsmError::BadOperand {
                            line,
                            token: args[0].to_string(),
                        })
                    }
                }
                Ok(())
            }

            Some(Mnemonic::Pop) => {
                match args {
                    [] => self.buf.write_u8(Opcode::PopV as u8),
                    [token] => match operand::classify(token) {
                        Some(Operand::Register(id)) => {
                            self.buf.write_u8(Opcode::PopR as u8);
                            self.buf.write_u8(id);
                        }
                        Some(Operand::Memory { reg, offset }) => {
                            self.buf.write_u8(Opcode::PopM as u8);
                            self.buf.write_u8(reg);
                            self.buf.write_u16(offset);
                        }
                        // Popping into an immediate makes no sense.
                        Some(Operand::Immediate(_)) | None => {
                            return Err(AsmError::BadOperand {
                                line,
                                token: token.to_string(),
                            })
                        }
                    },
                    _ => {
                        return Err(AsmError::ArgCount {
                            line,
                            name: name.to_string(),
                        })
                    }
                }
                Ok(())
            }
        }
    }
}
