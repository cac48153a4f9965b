//! Locating and reading the gridmodel config file.

use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use gridmodel_core::ConfigFile;
use std::path::{Path, PathBuf};
use tracing::debug;

const MAX_CONFIG_FILE_BYTES: u64 = 1_048_576; // 1 MiB
const MAX_PARAMS_FILE_BYTES: u64 = 8 * 1_048_576;

/// `<config_dir>/config.toml` for this user, if a home directory exists.
pub fn user_config_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("", "", "gridmodel")?;
    let mut path = proj.config_dir().to_path_buf();
    path.push("config.toml");
    Some(path)
}

/// Load the explicit config file, else the user's config file. A missing
/// user config gives the defaults; a missing explicit one is an error.
pub fn load_config(explicit: Option<&Path>) -> Result<ConfigFile> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match user_config_path() {
            Some(path) if path.exists() => path,
            _ => {
                debug!("no user config; using the default layout");
                return Ok(ConfigFile::default());
            }
        },
    };
    debug!(path = %path.display(), "loading config");
    let content = read_limited(&path, MAX_CONFIG_FILE_BYTES)?;
    ConfigFile::from_toml_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Read a parameters file.
pub fn read_params_file(path: &Path) -> Result<String> {
    read_limited(path, MAX_PARAMS_FILE_BYTES)
}

fn read_limited(path: &Path, max_bytes: u64) -> Result<String> {
    let meta = std::fs::metadata(path).with_context(|| format!("File not found: {}", path.display()))?;
    if meta.len() > max_bytes {
        bail!(
            "Refusing to read {}: file too large ({} bytes, max {})",
            path.display(),
            meta.len(),
            max_bytes
        );
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Parse a `COL=TEXT` label override.
pub fn parse_label(arg: &str) -> Option<(String, String)> {
    let (col, text) = arg.split_once('=')?;
    let col = col.trim().to_ascii_uppercase();
    if col.is_empty() || !col.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    Some((col, text.trim().to_string()))
}
