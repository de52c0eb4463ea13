use anyhow::{Context, Result};
use rollcall_runtime_config::{CONFIG_FILE_NAME, RollcallConfig};
use std::path::{Path, PathBuf};

/// Load `rollcall.toml`.
///
/// An explicit `path` must exist. Without one, `rollcall.toml` in the
/// working directory is used when present, and defaults otherwise.
pub fn load_config(path: Option<&Path>) -> Result<RollcallConfig> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => {
            let default = PathBuf::from(CONFIG_FILE_NAME);
            if !default.exists() {
                return Ok(RollcallConfig::default());
            }
            default
        }
    };
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config at {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse config at {}", path.display()))
}

/// The database file: `--db` wins over `[database].path`.
pub fn resolve_db_path(config: &RollcallConfig, override_path: Option<&Path>) -> PathBuf {
    override_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&config.database.path))
}

/// Print the effective configuration as TOML.
pub fn show_config(config: &RollcallConfig) -> Result<()> {
    let text = toml::to_string_pretty(config).context("Failed to serialize config")?;
    print!("{text}");
    Ok(())
}
