//! Emulator CLI.
//!
//! Usage: emulator <input.sbin> [--hashed]
//!
//! Executes a binary instruction stream with `in` reading from stdin and
//! `out` writing to stdout. A runtime fault is reported with its opcode
//! and stream position; output produced before the fault stays visible.

use stasm::buffer::ByteBuf;
use stasm::vm::Vm;
use std::env;
use std::fs;
use std::io;
use std::process;

fn main() {
    let mut paths = Vec::new();
    let mut hashed = false;
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--hashed" => hashed = true,
            _ => paths.push(arg),
        }
    }
    if paths.len() != 1 {
        eprintln!("usage: emulator <input.sbin> [--hashed]");
        process::exit(1);
    }

    let raw = match fs::read(&paths[0]) {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("error reading {}: {}", paths[0], e);
            process::exit(1);
        }
    };

    let binary = if hashed {
        match ByteBuf::from_hashed_bytes(raw) {
            Ok(buf) => buf.into_bytes(),
            Err(e) => {
                eprintln!("{}: {}", paths[0], e);
                process::exit(1);
            }
        }
    } else {
        raw
    };

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut vm = Vm::new(binary);
    if let Err(e) = vm.run(&mut stdin.lock(), &mut stdout.lock()) {
        eprintln!("{}", e);
        process::exit(1);
    }
}
