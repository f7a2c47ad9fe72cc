//! Default export options loaded from a JSON file

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const CONFIG_FILE_NAME: &str = "psd_export.json";

/// Returns the config path next to the executable
pub fn get_export_config_path() -> Result<PathBuf> {
    let exe_path = env::current_exe().with_context(|| "Failed to get executable path")?;
    let exe_dir = exe_path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("Failed to get executable directory"))?;
    Ok(exe_dir.join(CONFIG_FILE_NAME))
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ExportConfig {
    pub single_folder: bool,
    pub numbering: bool,
    pub crop: bool,
    pub parallel: bool,
    pub jobs: Option<usize>,
    pub output_dir: Option<PathBuf>,
}

impl ExportConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?;
        Ok(config)
    }
}

/// Load an explicit config file, or the one next to the executable if it exists.
/// Missing default file yields `ExportConfig::default()`.
pub fn load_export_config(explicit: Option<&Path>) -> Result<ExportConfig> {
    if let Some(path) = explicit {
        return ExportConfig::from_file(path);
    }

    let default_path = get_export_config_path()?;
    if !default_path.exists() {
        return Ok(ExportConfig::default());
    }
    debug!("[config] Loading {}", default_path.display());
    ExportConfig::from_file(&default_path)
}
