//! Disassembler: reconstructs source text from a binary instruction stream.
//!
//! Decoding is a linear scan: read one opcode byte, decode its fixed-width
//! operands, emit one `\tmnemonic operand` line. Exhausting the stream at
//! an opcode boundary is success; exhausting it inside an operand is a
//! decode fault.
//!
//! The nontrivial part is label recovery. Branch and call instructions
//! encode raw byte positions, and the original label names are not in the
//! binary, so the disassembler synthesizes them: on first encounter of a
//! target address it registers a fresh deterministic name (`L_` plus the
//! current table size, zero padded) and every later reference to the same
//! address reuses it. A `name:` definition line must appear immediately
//! before the instruction at the target offset, which can precede the
//! branch that names it, so the scan runs twice: pass 1 decodes only to
//! harvest targets, pass 2 decodes again and prints, now knowing every
//! labelled offset.

use thiserror::Error;

use crate::asm::labels::{LabelError, LabelTable};
use crate::buffer::{BufError, ByteBuf};
use crate::isa::{self, Opcode, Operands};

/// Decode faults, each carrying the opcode and stream position at fault.
#[derive(Debug, Error)]
pub enum DisasmError {
    #[error("unknown opcode {opcode:#04x} at position {pos}")]
    UnknownOpcode { opcode: u8, pos: usize },

    #[error("truncated operand for '{opcode}' at position {pos}: {source}")]
    Truncated {
        opcode: Opcode,
        pos: usize,
        #[source]
        source: BufError,
    },

    #[error("invalid register id {id} for '{opcode}' at position {pos}")]
    BadRegister { opcode: Opcode, id: u8, pos: usize },

    #[error("label table overflow for '{opcode}' at position {pos}: {source}")]
    Label {
        opcode: Opcode,
        pos: usize,
        #[source]
        source: LabelError,
    },
}

/// Disassemble a binary stream into source text.
pub fn disassemble(bytes: &[u8]) -> Result<String, DisasmError> {
    let mut buf = ByteBuf::from_bytes(bytes.to_vec());
    let mut labels = LabelTable::new();

    scan(&mut buf, &mut labels, None)?;
    buf.rewind();

    let mut text = String::new();
    scan(&mut buf, &mut labels, Some(&mut text))?;

    // A branch may target the end of the stream (an implicit halt); its
    // label line still needs a definition site.
    if let Some(name) = labels.name_for(buf.len()) {
        text.push_str(&format!("{}:\n", name));
    }
    Ok(text)
}

/// One decode pass. With `out` absent the pass only populates the label
/// table; with `out` present every labelled offset is already known and
/// text is emitted.
fn scan(
    buf: &mut ByteBuf,
    labels: &mut LabelTable,
    mut out: Option<&mut String>,
) -> Result<(), DisasmError> {
    loop {
        let pos = buf.pos();
        let byte = match buf.read_u8() {
            Ok(byte) => byte,
            // End of stream at an opcode boundary terminates the scan.
            Err(_) => return Ok(()),
        };
        let opcode = Opcode::from_u8(byte).ok_or(DisasmError::UnknownOpcode { opcode: byte, pos })?;
        let operand = decode_operand(buf, labels, opcode, pos)?;

        if let Some(text) = out.as_mut() {
            if let Some(name) = labels.name_for(pos) {
                text.push_str(&format!("{}:\n", name));
            }
            match operand {
                Some(operand) => text.push_str(&format!("\t{} {}\n", opcode, operand)),
                None => text.push_str(&format!("\t{}\n", opcode)),
            }
        }
    }
}

fn decode_operand(
    buf: &mut ByteBuf,
    labels: &mut LabelTable,
    opcode: Opcode,
    pos: usize,
) -> Result<Option<String>, DisasmError> {
    let truncated = |source: BufError| DisasmError::Truncated { opcode, pos, source };

    match opcode.operands() {
        Operands::None => Ok(None),

        Operands::Imm => {
            let value = buf.read_f64().map_err(truncated)?;
            Ok(Some(value.to_string()))
        }

        Operands::Reg => {
            let id = buf.read_u8().map_err(truncated)?;
            let name = isa::reg_name(id).ok_or(DisasmError::BadRegister { opcode, id, pos })?;
            Ok(Some(name.to_string()))
        }

        Operands::Mem => {
            let id = buf.read_u8().map_err(truncated)?;
            let name = isa::reg_name(id).ok_or(DisasmError::BadRegister { opcode, id, pos })?;
            let offset = buf.read_u16().map_err(truncated)?;
            Ok(Some(format!("[{}+{}]", name, offset)))
        }

        Operands::Target => {
            let target = buf.read_u16().map_err(truncated)? as usize;
            let name = match labels.name_for(target) {
                Some(name) => name.to_string(),
                None => {
                    let name = format!("L_{:06}", labels.len());
                    labels
                        .set(&name, target)
                        .map_err(|source| DisasmError::Label { opcode, pos, source })?;
                    name
                }
            };
            Ok(Some(name))
        }
    }
}
