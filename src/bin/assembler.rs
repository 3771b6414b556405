//! Assembly to bytecode compiler CLI.
//!
//! Reads a mnemonic source file and writes an executable binary plus an
//! optional listing.
//!
//! # Usage
//! ```text
//! assembler <input.asm> [output.bin] [OPTIONS]
//! ```
//!
//! # Arguments
//! - `input.asm`: Assembly source file to compile
//! - `output.bin`: Output file path (defaults to `a.bin`)
//!
//! # Options
//! - `-I, --log-level <level>`: Least important messages shown (`status`, `info`, `warn`, `error`)
//! - `-L, --listing <file>`: Listing file path (defaults to `listing.txt`)
//! - `--no-listing`: Do not write a listing
//! - `-S, --max-labels <n>`: Label table capacity
//! - `-F, --output-capacity <n>`: Largest program body in bytes
//!
//! # Examples
//! ```text
//! assembler program.asm
//! assembler program.asm program.bin --no-listing
//! assembler program.asm -L program.lst -S 4096
//! ```

use clap::Parser;
use stackproc::machine::assembler::assemble_file;
use stackproc::machine::config::AssemblerConfig;
use stackproc::machine::errors::MachineError;
use stackproc::utils::log::{Level, set_threshold};
use stackproc::{error, info, warn};
use std::fs;
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(name = "assembler", version, about = "Assemble stack machine source into a binary")]
struct Cli {
    /// Assembly source file
    input: Option<PathBuf>,
    /// Output binary
    #[arg(default_value = "a.bin")]
    output: PathBuf,
    #[arg(short = 'I', long = "log-level", value_name = "LEVEL", default_value = "info")]
    log_level: Level,
    #[arg(short = 'L', long = "listing", value_name = "FILE", default_value = "listing.txt")]
    listing: PathBuf,
    #[arg(long = "no-listing")]
    no_listing: bool,
    #[arg(short = 'S', long = "max-labels", value_name = "N")]
    max_labels: Option<usize>,
    #[arg(short = 'F', long = "output-capacity", value_name = "BYTES")]
    output_capacity: Option<usize>,
}

impl Cli {
    fn config(&self) -> AssemblerConfig {
        let defaults = AssemblerConfig::default();
        AssemblerConfig {
            max_labels: self.max_labels.unwrap_or(defaults.max_labels),
            output_capacity: self.output_capacity.unwrap_or(defaults.output_capacity),
        }
    }
}

fn main() {
    let cli = Cli::parse();
    set_threshold(cli.log_level);

    if let Err(e) = run(&cli) {
        error!("{e}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), MachineError> {
    let input = cli.input.as_ref().ok_or(MachineError::Usage {
        reason: "no input file given".into(),
    })?;
    let config = cli.config();

    let assembly = assemble_file(input, &config)?;
    if assembly.warnings > 0 {
        warn!("{} warning(s)", assembly.warnings);
    }

    assembly.program.save(&cli.output)?;
    info!(
        "Assembled {} -> {} ({} bytes)",
        input.display(),
        cli.output.display(),
        assembly.program.len()
    );

    if !cli.no_listing {
        fs::write(&cli.listing, assembly.listing_text())
            .map_err(|e| MachineError::io(&cli.listing, e))?;
        info!("Listing written to {}", cli.listing.display());
    }
    Ok(())
}
