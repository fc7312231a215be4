//! kspvm - command-line host for the KSP virtual machine.
//!
//! Prints the opcode table, disassembles raw bytecode, and runs either a raw
//! bytecode file or the built-in demo program.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ksp_vm_bytecode::{FrameLayout, Module, OPCODE_TABLE, RunnableBytecode, disassemble};
use ksp_vm_core::{Interpreter, Outcome, RuntimeConfig, RuntimeState};
use std::path::{Path, PathBuf};
use tracing_subscriber::filter::EnvFilter;

mod demo;

#[derive(Parser)]
#[command(
    name = "kspvm",
    version,
    about = "Run and inspect KSP bytecode",
    long_about = "kspvm hosts the KSP virtual machine.\n\n\
                  Show the instruction set:  kspvm opcodes\n\
                  Run the sample program:    kspvm demo\n\
                  Run raw bytecode:          kspvm run program.bin --registers 4"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Runtime config file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the opcode table
    Opcodes {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Disassemble a raw bytecode file
    Disasm {
        /// Bytecode file
        file: PathBuf,
    },

    /// Execute a raw bytecode file in a single top-level frame
    Run {
        /// Bytecode file
        file: PathBuf,

        /// Registers in the entry frame
        #[arg(long, default_value = "8")]
        registers: u8,

        /// Heap bytes in the entry frame
        #[arg(long, default_value = "0")]
        heap: usize,

        /// Stop after this many instructions
        #[arg(long)]
        budget: Option<u64>,
    },

    /// Disassemble and run the built-in sample program
    Demo,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(default_level.parse()?))
        .init();

    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Opcodes { json } => print_opcodes(json),
        Commands::Disasm { file } => {
            let code = read_code(&file)?;
            print!("{}", disassemble(code.code())?);
            Ok(())
        }
        Commands::Run {
            file,
            registers,
            heap,
            budget,
        } => {
            if let Some(budget) = budget {
                config = config.instruction_budget(budget);
            }
            let code = read_code(&file)?;
            let mut module = Module::new(file.display().to_string());
            module.build()?;
            run(&config, &module, &code, FrameLayout::new(registers, heap))
        }
        Commands::Demo => {
            let demo = demo::build()?;
            print!("{}", demo.module);
            println!("; entry ({} bytes)", demo.entry.len());
            print!("{}", disassemble(demo.entry.code())?);
            for (index, function) in demo.module.functions().enumerate() {
                println!("; function f{index}: {}", function.signature());
                print!("{}", disassemble(function.code())?);
            }
            run(&config, &demo.module, &demo.entry, demo.layout)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    let Some(path) = path else {
        return Ok(RuntimeConfig::default());
    };
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config = RuntimeConfig::from_json(&json)?;
    tracing::debug!(?config, "runtime config loaded");
    Ok(config)
}

fn read_code(path: &Path) -> Result<RunnableBytecode> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(RunnableBytecode::new(bytes))
}

fn print_opcodes(json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&OPCODE_TABLE[..])?);
    } else {
        for info in OPCODE_TABLE.iter() {
            println!("{:#04x}  {info}", info.code().to_byte());
        }
    }
    Ok(())
}

fn run(
    config: &RuntimeConfig,
    module: &Module,
    code: &RunnableBytecode,
    layout: FrameLayout,
) -> Result<()> {
    let mut state = RuntimeState::new(config);
    let mut interpreter = Interpreter::new();

    match interpreter.execute(&mut state, module, code, layout) {
        Ok(Outcome::Halted) => {
            println!(
                "; halted after {} instructions",
                interpreter.instructions_executed()
            );
            print!("{}", state.dump_registers());
            Ok(())
        }
        Ok(Outcome::Returned(value)) => {
            println!(
                "; returned {value} ({value:#x}) after {} instructions",
                interpreter.instructions_executed()
            );
            Ok(())
        }
        Err(error) => {
            for message in state.errors().drain() {
                eprintln!("error: {message}");
            }
            Err(error.into())
        }
    }
}
