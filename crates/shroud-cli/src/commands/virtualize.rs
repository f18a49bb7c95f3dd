//! Virtualize command - rewrite a program's eligible functions.

use anyhow::Result;
use clap::Args;
use shroud_engine::Virtualizer;
use shroud_engine::ast::print_program;
use std::path::PathBuf;

use super::{OptionFlags, read_program, write_output};
use crate::config::Config;

#[derive(Args)]
pub struct VirtualizeCommand {
    /// Program syntax tree (JSON)
    pub input: PathBuf,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Write the run report (virtualized and skipped functions) as JSON
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    #[command(flatten)]
    pub flags: OptionFlags,
}

impl VirtualizeCommand {
    pub fn run(&self, config: &Config) -> Result<()> {
        let options = self.flags.apply(config.virtualize.clone());
        let mut program = read_program(&self.input)?;

        let mut virtualizer = Virtualizer::new(options)?;
        let report = virtualizer.run(&mut program)?;
        for skipped in &report.skipped {
            tracing::info!(name = %skipped.name, reason = %skipped.reason, "kept as written");
        }

        write_output(self.output.as_ref(), &print_program(&program))?;
        if let Some(path) = &self.report {
            std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
        }
        Ok(())
    }
}
