//! Configuration loading and config file resolution
//!
//! Resolution follows a fixed priority order:
//! 1. Command-line argument (highest priority)
//! 2. `VOXJUKE_CONFIG` environment variable
//! 3. Platform config directory (`<config_dir>/voxjuke/config.toml`)
//! 4. Compiled defaults (fallback)
//!
//! A missing config file is never fatal: a warning is logged and the compiled
//! defaults are used. A config file that exists but fails to parse is an error.
//! Individual fields can then be overridden through environment variables.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "VOXJUKE_CONFIG";

/// TOML configuration file contents
///
/// Every field has a default so partial files are valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// HTTP control API listen address
    pub bind_addr: String,

    /// Volume for newly created sessions (0.0-1.0)
    pub default_volume: f32,

    /// Path or name of the ffmpeg binary
    pub ffmpeg_path: String,

    /// Path or name of the yt-dlp binary
    pub ytdlp_path: String,

    /// Address of the voice relay sidecar
    pub relay_addr: String,

    /// YouTube Data API key; yt-dlp search is used when absent
    pub youtube_api_key: Option<String>,

    /// Default log level when RUST_LOG is not set
    ///
    /// Either a bare level (`warn`) or a full filter directive
    /// (`voxjuke_player=debug,info`).
    pub log_level: String,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5750".to_string(),
            default_volume: 1.0,
            ffmpeg_path: "ffmpeg".to_string(),
            ytdlp_path: "yt-dlp".to_string(),
            relay_addr: "127.0.0.1:5751".to_string(),
            youtube_api_key: None,
            log_level: "info".to_string(),
        }
    }
}

impl TomlConfig {
    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))?;
        config.default_volume = config.default_volume.clamp(0.0, 1.0);
        Ok(config)
    }

    /// Load configuration from a file path
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Tracing filter directive built from `log_level`
    ///
    /// A bare level applies to the voxjuke crates and the HTTP trace layer;
    /// anything containing `=` or `,` is passed through unchanged.
    pub fn log_filter(&self) -> String {
        let level = self.log_level.trim();
        let level = if level.is_empty() { "info" } else { level };
        if level.contains('=') || level.contains(',') {
            return level.to_string();
        }
        format!(
            "voxjuke_player={0},voxjuke_common={0},tower_http={0}",
            level
        )
    }

    /// Apply `VOXJUKE_*` environment overrides on top of file values
    pub fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("VOXJUKE_BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Ok(volume) = std::env::var("VOXJUKE_DEFAULT_VOLUME") {
            match volume.parse::<f32>() {
                Ok(v) => self.default_volume = v.clamp(0.0, 1.0),
                Err(_) => warn!("Ignoring unparseable VOXJUKE_DEFAULT_VOLUME: {}", volume),
            }
        }
        if let Ok(path) = std::env::var("VOXJUKE_FFMPEG_PATH") {
            self.ffmpeg_path = path;
        }
        if let Ok(path) = std::env::var("VOXJUKE_YTDLP_PATH") {
            self.ytdlp_path = path;
        }
        if let Ok(addr) = std::env::var("VOXJUKE_RELAY_ADDR") {
            self.relay_addr = addr;
        }
        if let Ok(level) = std::env::var("VOXJUKE_LOG_LEVEL") {
            if !level.is_empty() {
                self.log_level = level;
            }
        }
        if let Ok(key) = std::env::var("YOUTUBE_API_KEY") {
            if !key.is_empty() {
                self.youtube_api_key = Some(key);
            }
        }
    }
}

/// Resolves which config file to read and loads it
pub struct ConfigResolver {
    cli_path: Option<PathBuf>,
}

impl ConfigResolver {
    /// Create a resolver, optionally seeded with a `--config` CLI argument
    pub fn new(cli_path: Option<PathBuf>) -> Self {
        Self { cli_path }
    }

    /// Determine the config file path by priority order
    ///
    /// Returns `None` when no candidate exists.
    pub fn config_path(&self) -> Option<PathBuf> {
        // Priority 1: Command-line argument
        if let Some(path) = &self.cli_path {
            return Some(path.clone());
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        // Priority 3: Platform config directory
        dirs::config_dir()
            .map(|d| d.join("voxjuke").join("config.toml"))
            .filter(|p| p.exists())
    }

    /// Resolve and load configuration, then apply environment overrides
    pub fn resolve(&self) -> Result<TomlConfig> {
        let mut config = match self.config_path() {
            Some(path) if path.exists() => {
                info!("Loading config from {}", path.display());
                TomlConfig::load(&path)?
            }
            Some(path) => {
                warn!(
                    "Config file {} not found, using compiled defaults",
                    path.display()
                );
                TomlConfig::default()
            }
            None => {
                info!("No config file found, using compiled defaults");
                TomlConfig::default()
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }
}
