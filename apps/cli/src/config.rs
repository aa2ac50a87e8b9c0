//! YAML configuration for the calculator CLI.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "crystal-calc.yaml";

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CalcConfig {
    /// Catalog source document (JSON).
    pub catalog_path: PathBuf,
    /// JSON snapshot of the player's selections.
    pub save_path: PathBuf,
    /// When set, selections live in this SQLite database instead of `save_path`.
    pub db_url: Option<String>,
    /// Save slot name inside the database.
    pub save_name: String,
    /// Number of upgrade suggestions to show.
    pub top_n: usize,
}

impl Default for CalcConfig {
    fn default() -> Self {
        Self {
            catalog_path: PathBuf::from("assets/treasuredata.json"),
            save_path: PathBuf::from("saves/selections.json"),
            db_url: None,
            save_name: "default".to_string(),
            top_n: yield_econ::DEFAULT_TOP_N,
        }
    }
}

impl CalcConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let cfg: CalcConfig = serde_yaml::from_str(text).context("parsing config")?;
        if cfg.save_name.trim().is_empty() {
            anyhow::bail!("save_name must not be empty");
        }
        Ok(cfg)
    }
}

/// Load configuration.
///
/// An explicit path must exist. Without one, `crystal-calc.yaml` in the
/// working directory is used if present, otherwise defaults.
pub fn load(explicit: Option<&Path>) -> Result<CalcConfig> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => {
            let p = PathBuf::from(DEFAULT_CONFIG_FILE);
            if !p.exists() {
                debug!("no config file, using defaults");
                return Ok(CalcConfig::default());
            }
            p
        }
    };
    let text =
        fs::read_to_string(&path).with_context(|| format!("reading config {}", path.display()))?;
    CalcConfig::from_yaml_str(&text)
}
