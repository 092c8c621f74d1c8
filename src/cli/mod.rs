pub mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use self::commands::rebuild;

#[derive(Parser)]
#[command(name = "rustalk")]
#[command(about = "A Smalltalk-80 bootstrap environment", version, author)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Rebuild the environment from the class schedule and the kernel
    /// source modules
    Rebuild {
        /// Directory containing the kernel source modules
        #[arg(long, default_value = "kernel")]
        kernel: PathBuf,

        /// Single-step the interpreter with the bytecode debugger
        #[arg(long, default_value_t = false)]
        debug: bool,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Rebuild { kernel, debug } => rebuild::execute(kernel, debug),
    }
}
