//! Bytecode emulator: a fetch/decode/execute loop over the binary stream.
//!
//! A [`Vm`] owns all execution state: four f64 registers, the value stack,
//! the return-address stack, a flat f64 memory of [`MEM_SIZE`](crate::isa::MEM_SIZE)
//! cells, and a small text framebuffer for the gpu opcodes. I/O is
//! injected, so programs using `in`/`out` are testable without a terminal.
//!
//! The loop reads one opcode byte per iteration and dispatches on the
//! [`Opcode`] enum. Running off the end of the stream at an opcode boundary
//! is an implicit `hlt`. Every fault -- stack underflow, bad register id,
//! out-of-bounds memory, unknown opcode, truncated operand, ret with no
//! prior call -- is a structured [`VmError`] carrying the opcode and the
//! byte position, and halts execution immediately. Output produced before
//! a fault stays visible.
//!
//! Binary operations pop their right operand first: `push 3; push 2; sub`
//! leaves 1 on the stack. Conditional jumps compare the same way, and the
//! equality tests (`je`/`jn`) are epsilon tolerant, never exact float
//! equality.

use std::io::{BufRead, Write};
use thiserror::Error;

use crate::buffer::{BufError, ByteBuf};
use crate::isa::{Opcode, EPSILON, MEM_SIZE, REG_COUNT};

/// Width of the gpu framebuffer, in cells.
pub const FRAME_WIDTH: usize = 64;
/// Height of the gpu framebuffer, in cells.
pub const FRAME_HEIGHT: usize = 16;

/// Runtime faults. Each carries enough context to diagnose: the opcode
/// being executed and the stream position it was fetched from.
#[derive(Debug, Error)]
pub enum VmError {
    #[error("stack underflow in '{opcode}' at position {pos}")]
    StackUnderflow { opcode: Opcode, pos: usize },

    #[error("return with an empty call stack at position {pos}")]
    CallStackUnderflow { pos: usize },

    #[error("unknown opcode {opcode:#04x} at position {pos}")]
    UnknownOpcode { opcode: u8, pos: usize },

    #[error("invalid register id {id} in '{opcode}' at position {pos}")]
    BadRegister { opcode: Opcode, id: u8, pos: usize },

    #[error("segmentation violation in '{opcode}' at position {pos}: base {base}, offset {offset}")]
    Segfault {
        opcode: Opcode,
        pos: usize,
        base: f64,
        offset: u16,
    },

    #[error("point ({x}, {y}) outside the {}x{} frame in '{opcode}' at position {pos}",
            FRAME_WIDTH, FRAME_HEIGHT)]
    PointOutOfFrame {
        opcode: Opcode,
        pos: usize,
        x: f64,
        y: f64,
    },

    #[error("truncated operand for '{opcode}' at position {pos}: {source}")]
    Truncated {
        opcode: Opcode,
        pos: usize,
        #[source]
        source: BufError,
    },

    #[error("jump out of the stream in '{opcode}' at position {pos}: {source}")]
    BadJump {
        opcode: Opcode,
        pos: usize,
        #[source]
        source: BufError,
    },

    #[error("input exhausted while executing 'in' at position {pos}")]
    InputExhausted { pos: usize },

    #[error("i/o error in '{opcode}' at position {pos}: {source}")]
    Io {
        opcode: Opcode,
        pos: usize,
        #[source]
        source: std::io::Error,
    },
}

/// The virtual machine. One instance per program execution; registers and
/// memory persist for its lifetime, the stacks start empty.
#[derive(Debug)]
pub struct Vm {
    buf: ByteBuf,
    regs: [f64; REG_COUNT],
    stack: Vec<f64>,
    calls: Vec<usize>,
    mem: Vec<f64>,
    frame: Vec<bool>,
}

impl Vm {
    /// Create a machine over a binary instruction stream.
    pub fn new(program: Vec<u8>) -> Vm {
        Vm {
            buf: ByteBuf::from_bytes(program),
            regs: [0.0; REG_COUNT],
            stack: Vec::new(),
            calls: Vec::new(),
            mem: vec![0.0; MEM_SIZE],
            frame: vec![false; FRAME_WIDTH * FRAME_HEIGHT],
        }
    }

    /// The value stack, bottom to top.
    pub fn stack(&self) -> &[f64] {
        &self.stack
    }

    /// The register file, indexed by register id.
    pub fn regs(&self) -> &[f64; REG_COUNT] {
        &self.regs
    }

    /// The flat data memory.
    pub fn mem(&self) -> &[f64] {
        &self.mem
    }

    /// Render the gpu framebuffer, one row per line, `#` for set cells.
    pub fn frame(&self) -> String {
        let mut text = String::with_capacity((FRAME_WIDTH + 1) * FRAME_HEIGHT);
        for row in self.frame.chunks(FRAME_WIDTH) {
            text.extend(row.iter().map(|&on| if on { '#' } else { '.' }));
            text.push('\n');
        }
        text
    }

    /// Run until `hlt`, end of stream, or a fault.
    pub fn run<R: BufRead, W: Write>(
        &mut self,
        input: &mut R,
        output: &mut W,
    ) -> Result<(), VmError> {
        loop {
            let pos = self.buf.pos();
            let byte = match self.buf.read_u8() {
                Ok(byte) => byte,
                // End of stream at an opcode boundary is an implicit hlt.
                Err(_) => return Ok(()),
            };
            let opcode =
                Opcode::from_u8(byte).ok_or(VmError::UnknownOpcode { opcode: byte, pos })?;

            match opcode {
                Opcode::Hlt => return Ok(()),

                Opcode::In => {
                    let value = self.read_input(input, output, pos)?;
                    self.stack.push(value);
                }

                Opcode::Out => {
                    let value = self.pop(opcode, pos)?;
                    writeln!(output, "{}", value)
                        .map_err(|source| VmError::Io { opcode, pos, source })?;
                }

                Opcode::Add => self.binary(opcode, pos, |a, b| a + b)?,
                Opcode::Sub => self.binary(opcode, pos, |a, b| a - b)?,
                Opcode::Mul => self.binary(opcode, pos, |a, b| a * b)?,
                Opcode::Div => self.binary(opcode, pos, |a, b| a / b)?,

                Opcode::Sin => self.unary(opcode, pos, f64::sin)?,
                Opcode::Cos => self.unary(opcode, pos, f64::cos)?,
                Opcode::Sqrt => self.unary(opcode, pos, f64::sqrt)?,

                Opcode::PushV => {
                    let value = self.read_f64(opcode, pos)?;
                    self.stack.push(value);
                }

                Opcode::PushR => {
                    let id = self.read_reg(opcode, pos)?;
                    self.stack.push(self.regs[id]);
                }

                Opcode::PushM => {
                    let addr = self.read_effective_addr(opcode, pos)?;
                    self.stack.push(self.mem[addr]);
                }

                Opcode::PopV => {
                    self.pop(opcode, pos)?;
                }

                Opcode::PopR => {
                    let id = self.read_reg(opcode, pos)?;
                    let value = self.pop(opcode, pos)?;
                    self.regs[id] = value;
                }

                Opcode::PopM => {
                    let addr = self.read_effective_addr(opcode, pos)?;
                    let value = self.pop(opcode, pos)?;
                    self.mem[addr] = value;
                }

                Opcode::Jmp => {
                    let target = self.read_target(opcode, pos)?;
                    self.jump(opcode, pos, target)?;
                }

                Opcode::Je => self.branch_if(opcode, pos, |a, b| (a - b).abs() <= EPSILON)?,
                Opcode::Jn => self.branch_if(opcode, pos, |a, b| (a - b).abs() > EPSILON)?,
                Opcode::Jl => self.branch_if(opcode, pos, |a, b| a < b)?,
                Opcode::Jg => self.branch_if(opcode, pos, |a, b| a > b)?,
                Opcode::Jge => self.branch_if(opcode, pos, |a, b| a >= b)?,
                Opcode::Jle => self.branch_if(opcode, pos, |a, b| a <= b)?,

                Opcode::Call => {
                    let target = self.read_target(opcode, pos)?;
                    self.calls.push(self.buf.pos());
                    self.jump(opcode, pos, target)?;
                }

                Opcode::Ret => {
                    let back = self
                        .calls
                        .pop()
                        .ok_or(VmError::CallStackUnderflow { pos })?;
                    self.jump(opcode, pos, back)?;
                }

                Opcode::GpuClear => {
                    for cell in self.frame.iter_mut() {
                        *cell = false;
                    }
                }

                Opcode::GpuPoint => {
                    let y = self.pop(opcode, pos)?;
                    let x = self.pop(opcode, pos)?;
                    // NaN saturates to 0 in the casts; it fails `>= 0.0`, so
                    // the negated comparison rejects it before casting.
                    if !(x >= 0.0 && y >= 0.0)
                        || x as usize >= FRAME_WIDTH
                        || y as usize >= FRAME_HEIGHT
                    {
                        return Err(VmError::PointOutOfFrame { opcode, pos, x, y });
                    }
                    self.frame[y as usize * FRAME_WIDTH + x as usize] = true;
                }
            }
        }
    }

    fn pop(&mut self, opcode: Opcode, pos: usize) -> Result<f64, VmError> {
        self.stack
            .pop()
            .ok_or(VmError::StackUnderflow { opcode, pos })
    }

    /// Pop b then a, push `op(a, b)`: the value pushed first is the left
    /// operand, which makes sub and div read naturally in source order.
    fn binary(
        &mut self,
        opcode: Opcode,
        pos: usize,
        op: impl Fn(f64, f64) -> f64,
    ) -> Result<(), VmError> {
        let b = self.pop(opcode, pos)?;
        let a = self.pop(opcode, pos)?;
        self.stack.push(op(a, b));
        Ok(())
    }

    fn unary(
        &mut self,
        opcode: Opcode,
        pos: usize,
        op: impl Fn(f64) -> f64,
    ) -> Result<(), VmError> {
        let a = self.pop(opcode, pos)?;
        self.stack.push(op(a));
        Ok(())
    }

    fn branch_if(
        &mut self,
        opcode: Opcode,
        pos: usize,
        cond: impl Fn(f64, f64) -> bool,
    ) -> Result<(), VmError> {
        let target = self.read_target(opcode, pos)?;
        let b = self.pop(opcode, pos)?;
        let a = self.pop(opcode, pos)?;
        if cond(a, b) {
            self.jump(opcode, pos, target)?;
        }
        Ok(())
    }

    fn jump(&mut self, opcode: Opcode, pos: usize, target: usize) -> Result<(), VmError> {
        self.buf
            .seek(target)
            .map_err(|source| VmError::BadJump { opcode, pos, source })
    }

    fn read_f64(&mut self, opcode: Opcode, pos: usize) -> Result<f64, VmError> {
        self.buf
            .read_f64()
            .map_err(|source| VmError::Truncated { opcode, pos, source })
    }

    fn read_target(&mut self, opcode: Opcode, pos: usize) -> Result<usize, VmError> {
        let target = self
            .buf
            .read_u16()
            .map_err(|source| VmError::Truncated { opcode, pos, source })?;
        Ok(target as usize)
    }

    fn read_reg(&mut self, opcode: Opcode, pos: usize) -> Result<usize, VmError> {
        let id = self
            .buf
            .read_u8()
            .map_err(|source| VmError::Truncated { opcode, pos, source })?;
        if (id as usize) < REG_COUNT {
            Ok(id as usize)
        } else {
            Err(VmError::BadRegister { opcode, id, pos })
        }
    }

    /// Decode a memory operand and compute `regs[id] + offset`, faulting
    /// when the base is negative, NaN or already past the end of memory, or
    /// when the effective address is. Never clamped, never wrapped.
    fn read_effective_addr(&mut self, opcode: Opcode, pos: usize) -> Result<usize, VmError> {
        let id = self.read_reg(opcode, pos)?;
        let offset = self
            .buf
            .read_u16()
            .map_err(|source| VmError::Truncated { opcode, pos, source })?;
        let base = self.regs[id];
        // The f64 range check must come before any cast: a huge or NaN base
        // would saturate `as usize` and defeat the bounds check below.
        if !(base >= 0.0 && base < MEM_SIZE as f64) {
            return Err(VmError::Segfault { opcode, pos, base, offset });
        }
        let addr = base as usize + offset as usize;
        if addr >= MEM_SIZE {
            return Err(VmError::Segfault { opcode, pos, base, offset });
        }
        Ok(addr)
    }

    fn read_input<R: BufRead, W: Write>(
        &mut self,
        input: &mut R,
        output: &mut W,
        pos: usize,
    ) -> Result<f64, VmError> {
        let opcode = Opcode::In;
        let io_err = |source| VmError::Io { opcode, pos, source };

        write!(output, "value: ").map_err(io_err)?;
        output.flush().map_err(io_err)?;
        loop {
            let mut line = String::new();
            let read = input.read_line(&mut line).map_err(io_err)?;
            if read == 0 {
                return Err(VmError::InputExhausted { pos });
            }
            match line.trim().parse::<f64>() {
                Ok(value) => return Ok(value),
                Err(_) => {
                    write!(output, "invalid number, try again: ").map_err(io_err)?;
                    output.flush().map_err(io_err)?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::assemble;
    use std::io;

    fn run(source: &str) -> (Vm, String) {
        let binary = assemble(source).expect("test program assembles");
        let mut vm = Vm::new(binary);
        let mut output = Vec::new();
        vm.run(&mut io::empty(), &mut output).expect("test program runs");
        (vm, String::from_utf8(output).unwrap())
    }

    fn run_err(source: &str) -> VmError {
        let binary = assemble(source).expect("test program assembles");
        let mut vm = Vm::new(binary);
        vm.run(&mut io::empty(), &mut Vec::new())
            .expect_err("test program faults")
    }

    #[test]
    fn sub_is_first_pushed_minus_second_pushed() {
        let (vm, _) = run("push 3\npush 2\nsub\nhlt\n");
        assert_eq!(vm.stack(), &[1.0]);
    }

    #[test]
    fn div_ordering_matches_sub() {
        let (vm, _) = run("push 8\npush 2\ndiv\n");
        assert_eq!(vm.stack(), &[4.0]);
    }

    #[test]
    fn end_of_stream_is_an_implicit_halt() {
        let (vm, _) = run("push 1\npush 2\nadd\n");
        assert_eq!(vm.stack(), &[3.0]);
    }

    #[test]
    fn registers_flow_through_pop_and_push() {
        let (vm, out) = run("push 7\npop bx\npush bx\npush bx\nmul\nout\nhlt\n");
        assert_eq!(vm.regs()[1], 7.0);
        assert_eq!(out, "49\n");
    }

    #[test]
    fn memory_round_trip_through_register_base() {
        let (vm, _) = run("push 100\npop ax\npush 2.5\npop [ax+3]\npush [ax+3]\nhlt\n");
        assert_eq!(vm.mem()[103], 2.5);
        assert_eq!(vm.stack(), &[2.5]);
    }

    #[test]
    fn pop_on_empty_stack_underflows() {
        assert!(matches!(
            run_err("pop\n"),
            VmError::StackUnderflow { opcode: Opcode::PopV, pos: 0 }
        ));
    }

    #[test]
    fn negative_memory_base_is_a_segfault() {
        assert!(matches!(
            run_err("push -1\npop ax\npush [ax+0]\n"),
            VmError::Segfault { opcode: Opcode::PushM, .. }
        ));
    }

    #[test]
    fn memory_access_past_the_end_is_a_segfault() {
        assert!(matches!(
            run_err("push 1020\npop ax\npush 0\npop [ax+4]\n"),
            VmError::Segfault { opcode: Opcode::PopM, .. }
        ));
    }

    #[test]
    fn huge_memory_base_is_a_segfault_not_a_wrap() {
        // A base far beyond the usize range must fault, not saturate in the
        // cast and slip past the bounds check (or overflow the addition).
        assert!(matches!(
            run_err("push 1e20\npop ax\npush [ax+1]\n"),
            VmError::Segfault { opcode: Opcode::PushM, .. }
        ));
        assert!(matches!(
            run_err("push 0\npush 0\ndiv\npop ax\npush [ax+0]\n"), // NaN base
            VmError::Segfault { opcode: Opcode::PushM, .. }
        ));
    }

    #[test]
    fn call_returns_to_the_next_instruction() {
        let (vm, _) = run("call f\npush 5\nhlt\nf: push 2\nret\n");
        assert_eq!(vm.stack(), &[2.0, 5.0]);
    }

    #[test]
    fn ret_without_call_is_a_fault() {
        assert!(matches!(run_err("ret\n"), VmError::CallStackUnderflow { pos: 0 }));
    }

    #[test]
    fn je_is_epsilon_tolerant() {
        let (vm, _) = run("push 1\npush 1.00000004\nje close\nhlt\nclose: push 42\nhlt\n");
        assert_eq!(vm.stack(), &[42.0]);
    }

    #[test]
    fn jn_sees_a_real_difference() {
        let (vm, _) = run("push 1\npush 1.1\njn diff\nhlt\ndiff: push 7\nhlt\n");
        assert_eq!(vm.stack(), &[7.0]);
    }

    #[test]
    fn conditionals_compare_in_push_order() {
        // 2 < 3, so jl taken; 3 < 2 is not.
        let (vm, _) = run("push 2\npush 3\njl yes\nhlt\nyes: push 1\nhlt\n");
        assert_eq!(vm.stack(), &[1.0]);
        let (vm, _) = run("push 3\npush 2\njl yes\npush 0\nhlt\nyes: push 1\nhlt\n");
        assert_eq!(vm.stack(), &[0.0]);
    }

    #[test]
    fn in_reads_retries_and_faults_on_eof() {
        let binary = assemble("in\nout\nhlt\n").unwrap();
        let mut vm = Vm::new(binary);
        let mut output = Vec::new();
        let mut input = io::Cursor::new(b"oops\n4.5\n".to_vec());
        vm.run(&mut input, &mut output).unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "value: invalid number, try again: 4.5\n"
        );

        let binary = assemble("in\nhlt\n").unwrap();
        let mut vm = Vm::new(binary);
        let err = vm
            .run(&mut io::empty(), &mut Vec::new())
            .expect_err("no input left");
        assert!(matches!(err, VmError::InputExhausted { pos: 0 }));
    }

    #[test]
    fn gpu_point_sets_a_cell_and_clear_blanks_it() {
        let (vm, _) = run("push 2\npush 1\ngpu_point\nhlt\n");
        assert_eq!(&vm.frame().lines().nth(1).unwrap()[..4], "..#.");

        let (vm, _) = run("push 2\npush 1\ngpu_point\ngpu_clear\nhlt\n");
        assert!(!vm.frame().contains('#'));
    }

    #[test]
    fn gpu_point_outside_the_frame_faults() {
        assert!(matches!(
            run_err("push 999\npush 0\ngpu_point\n"),
            VmError::PointOutOfFrame { .. }
        ));
    }

    #[test]
    fn gpu_point_with_a_nan_coordinate_faults() {
        // 0/0 leaves NaN as the x coordinate; it must fault rather than
        // saturate to cell 0.
        assert!(matches!(
            run_err("push 0\npush 0\ndiv\npush 0\ngpu_point\n"),
            VmError::PointOutOfFrame { .. }
        ));
    }

    #[test]
    fn unknown_opcode_faults_with_position() {
        // hlt stops before the junk byte is ever fetched
        let mut vm = Vm::new(vec![Opcode::Hlt as u8, 0xEE]);
        vm.run(&mut io::empty(), &mut Vec::new()).unwrap();

        let mut vm = Vm::new(vec![0xEE]);
        assert!(matches!(
            vm.run(&mut io::empty(), &mut Vec::new()),
            Err(VmError::UnknownOpcode { opcode: 0xEE, pos: 0 })
        ));
    }
}
