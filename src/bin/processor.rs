//! Bytecode interpreter CLI.
//!
//! Loads an assembled binary and runs it against the console.
//!
//! # Usage
//! ```text
//! processor <input.bin> [OPTIONS]
//! ```
//!
//! # Options
//! - `-I, --log-level <level>`: `status` traces every instruction
//! - `-R, --registers <n>`: Register count
//! - `-M, --ram <n>`: Memory cells
//! - `-W, --width <n>` / `-H, --height <n>`: Video device size
//! - `--max-call-depth <n>`: Deepest CALL nesting
//!
//! # Examples
//! ```text
//! processor a.bin
//! processor a.bin -M 4096 -W 80 -H 24
//! ```

use clap::Parser;
use stackproc::machine::config::MachineConfig;
use stackproc::machine::errors::MachineError;
use stackproc::machine::program::Program;
use stackproc::machine::vm::Vm;
use stackproc::utils::log::{Level, set_threshold};
use stackproc::{error, info};
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(name = "processor", version, about = "Run an assembled stack machine binary")]
struct Cli {
    /// Binary produced by the assembler
    input: Option<PathBuf>,
    #[arg(short = 'I', long = "log-level", value_name = "LEVEL", default_value = "info")]
    log_level: Level,
    #[arg(short = 'R', long = "registers", value_name = "N")]
    registers: Option<usize>,
    #[arg(short = 'M', long = "ram", value_name = "N")]
    ram: Option<usize>,
    #[arg(short = 'W', long = "width", value_name = "N")]
    width: Option<usize>,
    #[arg(short = 'H', long = "height", value_name = "N")]
    height: Option<usize>,
    #[arg(long = "max-call-depth", value_name = "N")]
    max_call_depth: Option<usize>,
}

impl Cli {
    fn config(&self) -> MachineConfig {
        let defaults = MachineConfig::default();
        MachineConfig {
            registers: self.registers.unwrap_or(defaults.registers),
            ram_size: self.ram.unwrap_or(defaults.ram_size),
            video_width: self.width.unwrap_or(defaults.video_width),
            video_height: self.height.unwrap_or(defaults.video_height),
            max_call_depth: self.max_call_depth.unwrap_or(defaults.max_call_depth),
            ..defaults
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
    let program = Program::load(input)?;
    info!(
        "Loaded {} (version {}, {} bytes)",
        input.display(),
        program.version,
        program.len()
    );

    let stdin = io::stdin();
    let stdout = BufWriter::new(io::stdout().lock());
    let mut vm = Vm::new(program, &cli.config(), stdin.lock(), stdout)?;
    vm.run()
}
