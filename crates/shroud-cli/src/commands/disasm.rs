//! Disasm command - list the bytecode of every candidate function.

use anyhow::Result;
use clap::Args;
use shroud_engine::disassemble_program;
use std::path::PathBuf;

use super::{OptionFlags, read_program, write_output};
use crate::config::Config;

#[derive(Args)]
pub struct DisasmCommand {
    /// Program syntax tree (JSON)
    pub input: PathBuf,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub flags: OptionFlags,
}

impl DisasmCommand {
    pub fn run(&self, config: &Config) -> Result<()> {
        let options = self.flags.apply(config.virtualize.clone());
        let program = read_program(&self.input)?;
        let listings = disassemble_program(&program, options)?;

        let text: String = listings.iter().map(ToString::to_string).collect();
        write_output(self.output.as_ref(), text.trim_end())
    }
}
