//! Print command - render a syntax tree as source.

use anyhow::Result;
use clap::Args;
use shroud_engine::ast::print_program;
use std::path::PathBuf;

use super::{read_program, write_output};

#[derive(Args)]
pub struct PrintCommand {
    /// Program syntax tree (JSON)
    pub input: PathBuf,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl PrintCommand {
    pub fn run(&self) -> Result<()> {
        let program = read_program(&self.input)?;
        write_output(self.output.as_ref(), &print_program(&program))
    }
}
