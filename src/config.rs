//! Locating and loading `config.toml` and `default.rhai`.
//!
//! The file holds the notebook sections (`[math]`, `[plot]`, `[solve]`,
//! `[input]`) plus a `[display]` section only the terminal front end reads.
//! Problems never abort startup; they come back as warnings and the
//! defaults are used instead.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use mathsheet_core::NotebookConfig;
use serde::Deserialize;

const CONFIG_FILE: &str = "config.toml";
const DEFAULT_COMMANDS_FILE: &str = "default.rhai";
const DISPLAY_SECTION: &str = "display";

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DisplaySettings {
    /// Plot size in terminal characters.
    pub plot_width: u32,
    pub plot_height: u32,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            plot_width: 60,
            plot_height: 15,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AppConfig {
    pub notebook: NotebookConfig,
    pub display: DisplaySettings,
}

fn config_dir() -> Option<PathBuf> {
    let proj = ProjectDirs::from("", "", "mathsheet")?;
    Some(proj.config_dir().to_path_buf())
}

pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join(CONFIG_FILE))
}

pub fn default_commands_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join(DEFAULT_COMMANDS_FILE))
}

/// Load the config from `explicit` or the platform config dir.
pub fn load_config(explicit: Option<&Path>) -> (AppConfig, Vec<String>) {
    let mut warnings = Vec::new();
    let Some(path) = explicit.map(Path::to_path_buf).or_else(default_config_path) else {
        return (AppConfig::default(), warnings);
    };

    if !path.exists() {
        if explicit.is_some() {
            warnings.push(format!("Config file not found: {}", path.display()));
        }
        return (AppConfig::default(), warnings);
    }

    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(err) => {
            warnings.push(format!("Failed to read {}: {}", path.display(), err));
            return (AppConfig::default(), warnings);
        }
    };

    match parse_config(&content) {
        Ok(config) => (config, warnings),
        Err(err) => {
            warnings.push(format!("Failed to parse {}: {}", path.display(), err));
            (AppConfig::default(), warnings)
        }
    }
}

fn parse_config(content: &str) -> Result<AppConfig, toml::de::Error> {
    let mut table: toml::Table = toml::from_str(content)?;
    let display = match table.remove(DISPLAY_SECTION) {
        Some(value) => value.try_into()?,
        None => DisplaySettings::default(),
    };
    let notebook = toml::Value::Table(table).try_into()?;
    Ok(AppConfig { notebook, display })
}
