use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::filter::EnvFilter;

mod commands;
mod config;

use commands::{DisasmCommand, PrintCommand, VirtualizeCommand};

#[derive(Parser)]
#[command(name = "shroud", version, about = "Shroud JavaScript virtualizer")]
struct Cli {
    /// Config file (defaults to shroud.toml in this or a parent directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite eligible functions of a program into encoded bytecode
    Virtualize(VirtualizeCommand),
    /// Print the bytecode listing of every candidate function
    Disasm(DisasmCommand),
    /// Print a syntax tree as source
    Print(PrintCommand),
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Virtualize(cmd) => cmd.run(&config),
        Commands::Disasm(cmd) => cmd.run(&config),
        Commands::Print(cmd) => cmd.run(),
    }
}
