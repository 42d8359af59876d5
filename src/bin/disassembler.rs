//! Disassembler CLI.
//!
//! Usage: disassembler <input.sbin> <output.sasm> [--hashed]
//!
//! Reconstructs source text from a binary instruction stream, one
//! mnemonic per line, with a `name:` line before every jump/call target.
//! `--hashed` reads the 4-byte integrity-hash container format.

use stasm::buffer::ByteBuf;
use stasm::disasm;
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
        eprintln!("usage: disassembler <input.sbin> <output.sasm> [--hashed]");
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

    let text = match disasm::disassemble(&binary) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    if let Err(e) = fs::write(&paths[1], text.as_bytes()) {
        eprintln!("error writing {}: {}", paths[1], e);
        process::exit(1);
    }
}
