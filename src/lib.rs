//! A stack-machine toolchain: assembler, disassembler, and bytecode emulator.
//!
//! stasm provides a complete pipeline for a small line-oriented assembly
//! language: source text is compiled to a flat binary opcode stream, the
//! stream can be executed against a register/memory/stack model, and it can
//! be disassembled back to source with label names re-synthesized.
//!
//! # Modules
//!
//! - [`isa`] -- The binary instruction-set contract: opcode and register tables.
//! - [`asm`] -- Two-pass assembler. Compiles source text into the binary stream.
//! - [`disasm`] -- Disassembler. Inverts the encoding, recovering labels for jump targets.
//! - [`vm`] -- Emulator. Fetch/decode/execute over the same encoding.
//! - [`buffer`] -- The shared cursor-based byte buffer the three tools read and write.
//!
//! # Example
//!
//! Assemble a program, execute it, and disassemble the binary:
//!
//! ```
//! use stasm::{asm, disasm, vm::Vm};
//!
//! let binary = asm::assemble("
//!     push 2
//!     push 3
//!     add
//!     out
//!     hlt
//! ").unwrap();
//!
//! let mut vm = Vm::new(binary.clone());
//! let mut output = Vec::new();
//! vm.run(&mut std::io::empty(), &mut output).unwrap();
//! assert_eq!(String::from_utf8(output).unwrap(), "5\n");
//!
//! let text = disasm::disassemble(&binary).unwrap();
//! assert_eq!(text, "\tpush 2\n\tpush 3\n\tadd\n\tout\n\thlt\n");
//! ```

pub mod asm;
pub mod buffer;
pub mod disasm;
pub mod isa;
pub mod vm;
