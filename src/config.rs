//! Configuration for preheat and tracker validation
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (preheat.toml)
//! - Environment variables (PREHEAT__*)
//!
//! ## Example config file (preheat.toml):
//! ```toml
//! [preheat]
//! identifier = "CODE"
//! mode = "REFERENCE"
//!
//! [validation]
//! disabled_hooks = ["EventDataValuesValidationHook"]
//! expiry_bypass_authority = "F_EDIT_EXPIRED"
//!
//! [store]
//! metadata_dir = "./metadata"
//!
//! [report]
//! format = "json"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::preheat::{PreheatIdentifier, PreheatMode};

/// Main configuration for an import run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportConfig {
    #[serde(default)]
    pub preheat: PreheatConfig,

    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub report: ReportConfig,
}

/// How references are resolved
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreheatConfig {
    #[serde(default)]
    pub identifier: PreheatIdentifier,

    #[serde(default)]
    pub mode: PreheatMode,
}

/// Tracker validation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Hook names to skip
    #[serde(default)]
    pub disabled_hooks: Vec<String>,

    /// Authority that lets a user import events past program expiry
    #[serde(default = "default_expiry_bypass_authority")]
    pub expiry_bypass_authority: String,
}

/// Where metadata is read from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory of metadata export documents
    #[serde(default = "default_metadata_dir")]
    pub metadata_dir: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default)]
    pub format: ReportFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

fn default_expiry_bypass_authority() -> String {
    "F_EDIT_EXPIRED".to_string()
}

fn default_metadata_dir() -> PathBuf {
    PathBuf::from("metadata")
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            disabled_hooks: Vec::new(),
            expiry_bypass_authority: default_expiry_bypass_authority(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            metadata_dir: default_metadata_dir(),
        }
    }
}

impl ValidationConfig {
    pub fn is_hook_enabled(&self, name: &str) -> bool {
        !self.disabled_hooks.iter().any(|h| h == name)
    }
}

impl ImportConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, layering an explicit file over the default locations
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        for location in ["preheat.toml", ".preheat.toml", "config/preheat.toml"] {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(dirs) = directories::ProjectDirs::from("org", "dhis2", "preheat") {
            let xdg_config = dirs.config_dir().join("preheat.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // PREHEAT__VALIDATION__EXPIRY_BYPASS_AUTHORITY=...
        builder = builder.add_source(
            Environment::with_prefix("PREHEAT")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Metadata directory, resolved against the working directory
    pub fn metadata_dir(&self) -> PathBuf {
        if self.store.metadata_dir.is_absolute() {
            self.store.metadata_dir.clone()
        } else {
            std::env::current_dir()
                .unwrap_or_default()
                .join(&self.store.metadata_dir)
        }
    }
}
