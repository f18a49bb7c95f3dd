//! CLI command implementations.

pub mod disasm;
pub mod print;
pub mod virtualize;

pub use disasm::DisasmCommand;
pub use print::PrintCommand;
pub use virtualize::VirtualizeCommand;

use anyhow::{Context, Result};
use clap::Args;
use shroud_engine::VirtualizeOptions;
use shroud_engine::ast::Program;
use std::path::{Path, PathBuf};

/// Read a program from its JSON syntax tree
pub fn read_program(path: &Path) -> Result<Program> {
    let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid syntax tree in {}", path.display()))
}

/// Write `content` to `output`, or stdout when absent
pub fn write_output(output: Option<&PathBuf>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
        }
        None => {
            println!("{content}");
            Ok(())
        }
    }
}

/// Flags that override the `[virtualize]` table of the config file
#[derive(Args, Debug, Default)]
pub struct OptionFlags {
    /// Seed for every random choice (fixed output for a fixed input)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Downgrade let/const and classes instead of skipping their functions
    #[arg(long)]
    pub downlevel: bool,

    /// Ship tapes, constants and the opcode table as plain literals
    #[arg(long = "no-encode")]
    pub no_encode: bool,

    /// Probability of a filler instruction after each real one
    #[arg(long = "fake-rate", value_name = "P")]
    pub fake_rate: Option<f64>,

    /// Name generated identifiers must not take (repeatable)
    #[arg(long = "reserve", value_name = "NAME")]
    pub reserve: Vec<String>,
}

impl OptionFlags {
    /// Apply the flags on top of the configured options
    pub fn apply(&self, mut options: VirtualizeOptions) -> VirtualizeOptions {
        if let Some(seed) = self.seed {
            options.seed = Some(seed);
        }
        if self.downlevel {
            options.downlevel = true;
        }
        if self.no_encode {
            options = options.without_encoding();
        }
        if let Some(rate) = self.fake_rate {
            options.fake_opcode_rate = rate;
        }
        options.reserved_names.extend(self.reserve.iter().cloned());
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let configured = VirtualizeOptions {
            seed: Some(1),
            fake_opcode_rate: 0.5,
            reserved_names: vec!["jQuery".into()],
            ..VirtualizeOptions::default()
        };
        let flags = OptionFlags {
            seed: Some(9),
            no_encode: true,
            reserve: vec!["$".into()],
            ..OptionFlags::default()
        };
        let options = flags.apply(configured);
        assert_eq!(options.seed, Some(9));
        assert_eq!(options.fake_opcode_rate, 0.5);
        assert!(!options.encodes_anything());
        assert_eq!(options.reserved_names, vec!["jQuery", "$"]);
    }

    #[test]
    fn test_no_flags_keep_config() {
        let configured = VirtualizeOptions::seeded(4);
        assert_eq!(OptionFlags::default().apply(configured.clone()), configured);
    }
}
