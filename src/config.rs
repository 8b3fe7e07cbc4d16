use crate::controller::{CancelMode, ControllerOptions};
use crate::registry::ModelListFormat;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,
    /// What to do with a backend stream after its request is cancelled.
    #[serde(default)]
    pub cancel_mode: CancelMode,
    /// Rendering of the model list sent over the bridge.
    #[serde(default)]
    pub model_list_format: ModelListFormat,
    /// `tracing` filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ollama_url: default_ollama_url(),
            cancel_mode: CancelMode::default(),
            model_list_format: ModelListFormat::default(),
            log_level: default_log_level(),
        }
    }
}

pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "deepchat", "deepchat")
}

impl Config {
    /// Default location of `config.toml`, if the platform has one.
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Loads from the default location, falling back to defaults when the
    /// file does not exist.
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Loads from an explicit file, which must exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            cancel_mode: self.cancel_mode,
            model_list_format: self.model_list_format,
        }
    }
}
