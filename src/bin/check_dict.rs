//! Check TLV dictionary files: syntax, kind keywords, enum references, duplicate codes.
//!
//! Usage:
//!   check_dict [--list] [FILE.dict ...]
//!   check_dict < file.dict
//!
//! With no files, reads from stdin. `--list` prints every resolved TLV type.

use asncp_dissect::parser::load_registry;
use asncp_dissect::TypeRegistry;
use std::io::{self, Read};

fn print_registry(name: &str, reg: &TypeRegistry) {
    for d in reg.descriptors() {
        let symbols = d.symbols.as_ref().map(|t| t.len()).unwrap_or(0);
        if symbols > 0 {
            println!("{}: {:#06x} {} : {} ({} symbols)", name, d.code, d.name, d.kind, symbols);
        } else {
            println!("{}: {:#06x} {} : {}", name, d.code, d.name, d.kind);
        }
    }
}

fn check(name: &str, src: &str, list: bool) -> bool {
    match load_registry(src) {
        Ok(reg) => {
            if list {
                print_registry(name, &reg);
            }
            eprintln!("{}: ok ({} TLV types)", name, reg.len());
            true
        }
        Err(e) => {
            eprintln!("{}: error: {}", name, e);
            false
        }
    }
}

fn main() -> anyhow::Result<()> {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let list = if let Some(pos) = args.iter().position(|a| a == "--list" || a == "-l") {
        args.remove(pos);
        true
    } else {
        false
    };

    let mut failed = 0usize;
    if args.is_empty() {
        let mut src = String::new();
        io::stdin().read_to_string(&mut src)?;
        if !check("<stdin>", &src, list) {
            failed += 1;
        }
    } else {
        for path in &args {
            let src = match std::fs::read_to_string(path) {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("{}: {}", path, e);
                    failed += 1;
                    continue;
                }
            };
            if !check(path, &src, list) {
                failed += 1;
            }
        }
    }

    if failed > 0 {
        eprintln!("check_dict: {} file(s) failed", failed);
        std::process::exit(1);
    }
    Ok(())
}
