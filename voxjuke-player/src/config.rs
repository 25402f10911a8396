//! voxjuke-player specific configuration

use crate::error::{Error, Result};
use std::net::SocketAddr;
use voxjuke_common::config::TomlConfig;

/// Player service configuration
///
/// Built from the resolved [`TomlConfig`] with command-line overrides applied.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub relay_addr: String,
    pub ffmpeg_path: String,
    pub ytdlp_path: String,
    pub default_volume: f32,
    pub youtube_api_key: Option<String>,
}

impl Config {
    /// Merge file/env configuration with optional CLI overrides
    pub fn from_toml(
        toml: TomlConfig,
        bind_override: Option<String>,
        relay_override: Option<String>,
    ) -> Result<Self> {
        let bind = bind_override.unwrap_or(toml.bind_addr);
        let bind_addr = bind
            .parse()
            .map_err(|e| Error::Config(format!("Invalid bind address '{}': {}", bind, e)))?;

        Ok(Self {
            bind_addr,
            relay_addr: relay_override.unwrap_or(toml.relay_addr),
            ffmpeg_path: toml.ffmpeg_path,
            ytdlp_path: toml.ytdlp_path,
            default_volume: toml.default_volume.clamp(0.0, 1.0),
            youtube_api_key: toml.youtube_api_key.filter(|k| !k.is_empty()),
        })
    }
}
