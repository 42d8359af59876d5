//! Assembler CLI.
//!
//! Usage: assembler <input.sasm> <output.sbin> [--hashed]
//!
//! Compiles source text to the binary instruction stream, writing the
//! output only after both assembler passes succeed. `--hashed` wraps the
//! stream in the 4-byte integrity-hash container.

use stasm::asm;
use stasm::buffer::ByteBuf;
use std::env;
use std::fs;
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
    if paths.len() != 2 {
        eprintln!("usage: assembler <input.sasm> <output.sbin> [--hashed]");
        process::exit(1);
    }

    let source = match fs::read_to_string(&paths[0]) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("error reading {}: {}", paths[0], e);
            process::exit(1);
        }
    };

    let binary = match asm::assemble(&source) {
        Ok(binary) => binary,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    let bytes = if hashed {
        ByteBuf::from_bytes(binary).to_hashed_bytes()
    } else {
        binary
    };

    if let Err(e) = fs::write(&paths[1], &bytes) {
        eprintln!("error writing {}: {}", paths[1], e);
        process::exit(1);
    }
}
