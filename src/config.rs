//! Configuration for Sprintlens
//!
//! Settings are layered, later sources winning:
//! 1. Built-in defaults
//! 2. A TOML file (`--config <path>`, or `sprintlens.toml` in the working directory)
//! 3. Environment variables prefixed with `SPRINTLENS_`, using `__` between
//!    sections, e.g. `SPRINTLENS_SERVER__ADDR=0.0.0.0:9000`
//!
//! Command-line flags are applied on top by the binary.

use crate::error::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

const ENV_PREFIX: &str = "SPRINTLENS";
const DEFAULT_CONFIG_NAME: &str = "sprintlens";
pub const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Local file path, or a `libsql://` URL for a remote database
    pub path: String,
    pub create_if_missing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub addr: String,
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                path: default_database_path(),
                create_if_missing: true,
            },
            server: ServerConfig {
                addr: DEFAULT_SERVER_ADDR.to_string(),
            },
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, an optional file and the environment
    ///
    /// An explicitly given file must exist; the implicit `sprintlens.toml`
    /// is optional.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let defaults = AppConfig::default();

        let mut builder = Config::builder()
            .set_default("database.path", defaults.database.path)?
            .set_default("database.create_if_missing", defaults.database.create_if_missing)?
            .set_default("server.addr", defaults.server.addr)?
            .set_default("log_level", defaults.log_level)?;

        builder = match config_file {
            Some(path) => {
                debug!("Loading configuration file {}", path.display());
                builder.add_source(File::from(path).required(true))
            }
            None => builder.add_source(File::with_name(DEFAULT_CONFIG_NAME).required(false)),
        };

        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

/// `<data_local_dir>/sprintlens/sprintlens.db`, or the working directory
/// when the platform has no data directory
pub fn default_database_path() -> String {
    dirs::data_local_dir()
        .map(|dir| dir.join("sprintlens"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sprintlens.db")
        .to_string_lossy()
        .to_string()
}
