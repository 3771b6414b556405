//! Bytecode to assembly CLI.
//!
//! # Usage
//! ```text
//! disassembler <input.bin> [output.txt] [OPTIONS]
//! ```
//!
//! The output defaults to `program.txt` and can be fed back to the assembler.

use clap::Parser;
use stackproc::machine::disasm::disassemble_file;
use stackproc::machine::errors::MachineError;
use stackproc::utils::log::{Level, set_threshold};
use stackproc::{error, info};
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(name = "disassembler", version, about = "Turn a stack machine binary back into source")]
struct Cli {
    /// Binary produced by the assembler
    input: Option<PathBuf>,
    /// Text output
    #[arg(default_value = "program.txt")]
    output: PathBuf,
    #[arg(short = 'I', long = "log-level", value_name = "LEVEL", default_value = "info")]
    log_level: Level,
}

fn main() {
    let cli = Cli::parse();
    set_threshold(cli.log_level);

    let result = match &cli.input {
        Some(input) => disassemble_file(input, &cli.output).map(|()| input),
        None => Err(MachineError::Usage {
            reason: "no input file given".into(),
        }),
    };
    match result {
        Ok(input) => info!("Disassembled {} -> {}", input.display(), cli.output.display()),
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    }
}
