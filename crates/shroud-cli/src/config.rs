//! Configuration file parsing for shroud.toml.

use serde::Deserialize;
use shroud_engine::VirtualizeOptions;
use std::path::{Path, PathBuf};

/// Config file names, in lookup order
const CONFIG_NAMES: &[&str] = &["shroud.toml", ".shroudrc.toml"];

/// Main configuration structure.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Defaults for every virtualization run
    #[serde(default)]
    pub virtualize: VirtualizeOptions,
}

/// Load configuration from a file or search for default config files.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config_path = match path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            Some(path.to_path_buf())
        }
        None => std::env::current_dir().ok().and_then(|cwd| find_config_file(&cwd)),
    };

    match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)?;
            let config = parse_config(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
            tracing::debug!(path = %path.display(), "loaded config");
            Ok(config)
        }
        None => Ok(Config::default()),
    }
}

fn parse_config(content: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(content)
}

/// Search for a configuration file in `start` and its parent directories.
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(current) = dir {
        for name in CONFIG_NAMES {
            let path = current.join(name);
            if path.exists() {
                return Some(path);
            }
        }
        dir = current.parent();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.virtualize, VirtualizeOptions::default());
        assert!(config.virtualize.encode_bytecode);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[virtualize]
seed = 7
downlevel = true
fake_opcode_rate = 0.25
encode_opcode_table = false
reserved_names = ["jQuery", "$"]
"#;
        let config = parse_config(toml).unwrap();
        let options = config.virtualize;
        assert_eq!(options.seed, Some(7));
        assert!(options.downlevel);
        assert_eq!(options.fake_opcode_rate, 0.25);
        assert!(options.encode_bytecode);
        assert!(!options.encode_opcode_table);
        assert_eq!(options.reserved_names, vec!["jQuery", "$"]);
    }

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.virtualize, VirtualizeOptions::default());
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(parse_config("[virtualize]\nseed = \"abc\"\n").is_err());
    }

    #[test]
    fn test_config_found_in_parent_directory() {
        let root = std::env::temp_dir().join(format!("shroud-config-{}", std::process::id()));
        let nested = root.join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(root.join("shroud.toml"), "[virtualize]\nseed = 3\n").unwrap();

        let found = find_config_file(&nested).unwrap();
        assert_eq!(found, root.join("shroud.toml"));
        let config = load_config(Some(&found)).unwrap();
        assert_eq!(config.virtualize.seed, Some(3));

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let missing = std::env::temp_dir().join("shroud-no-such-dir").join("shroud.toml");
        assert!(load_config(Some(&missing)).is_err());
    }
}
