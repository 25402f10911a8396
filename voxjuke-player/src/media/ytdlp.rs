//! yt-dlp backed resolver
//!
//! Metadata comes from `--dump-json`, stream URLs from `-g`. Both run as
//! short-lived child processes.

use crate::error::{Error, Result};
use crate::media::resolver::{extract_video_id, looks_like_url, MediaResolver, Track};
use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// Subset of the `--dump-json` document we read
#[derive(Debug, Deserialize)]
struct VideoInfo {
    id: String,
    title: Option<String>,
    duration: Option<f64>,
    #[serde(default)]
    is_live: Option<bool>,
}

/// Resolver that shells out to yt-dlp
#[derive(Debug, Clone)]
pub struct YtDlpResolver {
    binary: String,
}

impl YtDlpResolver {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        debug!("Running {} {}", self.binary, args.join(" "));

        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::Process(format!("failed to run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Process(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn lookup(&self, target: &str) -> Result<Track> {
        let stdout = self
            .run(&["--dump-json", "--no-playlist", "--skip-download", target])
            .await?;
        let line = stdout
            .lines()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| Error::NotFound(target.to_string()))?;
        parse_video_info(line)
    }
}

/// Build a track from one line of `--dump-json` output
pub(crate) fn parse_video_info(json: &str) -> Result<Track> {
    let info: VideoInfo = serde_json::from_str(json)
        .map_err(|e| Error::Process(format!("unreadable yt-dlp metadata: {}", e)))?;

    let duration = if info.is_live.unwrap_or(false) {
        None
    } else {
        info.duration
            .filter(|d| d.is_finite() && *d > 0.0)
            .map(Duration::from_secs_f64)
    };

    Ok(Track {
        media_id: info.id,
        title: info.title,
        duration,
    })
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    async fn resolve(&self, query: &str) -> Result<Track> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::NotFound("empty query".to_string()));
        }

        if let Some(id) = extract_video_id(query) {
            match self.lookup(&id).await {
                Ok(track) => return Ok(track),
                // Bare words can look like ids; retry as a search
                Err(e) if !looks_like_url(query) => {
                    debug!("'{}' is not a video id ({}), searching instead", query, e)
                }
                Err(e) => return Err(e),
            }
        } else if looks_like_url(query) {
            return self.lookup(query).await;
        }

        let track = self
            .lookup(&format!("ytsearch1:{}", query))
            .await
            .map_err(|e| match e {
                Error::Process(_) => Error::NotFound(query.to_string()),
                other => other,
            })?;
        info!(media_id = %track.media_id, "Resolved '{}'", query);
        Ok(track)
    }

    async fn playable_url(&self, track: &Track) -> Result<String> {
        let format = if track.is_live() { "best" } else { "bestaudio/best" };
        let stdout = self
            .run(&["-g", "-f", format, "--no-playlist", &track.media_id])
            .await?;

        stdout
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)
            .ok_or_else(|| Error::NotFound(format!("no stream for {}", track.media_id)))
    }
}
