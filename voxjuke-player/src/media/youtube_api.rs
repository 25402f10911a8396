//! YouTube Data API v3 resolver
//!
//! Search and metadata go through `search.list` / `videos.list`; stream URLs
//! are still produced by yt-dlp since the API does not expose them.

use crate::error::{Error, Result};
use crate::media::resolver::{extract_video_id, MediaResolver, Track};
use crate::media::ytdlp::YtDlpResolver;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use voxjuke_common::human_time::parse_iso8601_duration;

const YOUTUBE_API_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";
const USER_AGENT: &str = concat!("voxjuke/", env!("CARGO_PKG_VERSION"));
const SEARCH_MAX_RESULTS: &str = "5";

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub items: Vec<SearchItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchItem {
    pub id: SearchItemId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchItemId {
    pub kind: String,
    pub video_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideosResponse {
    #[serde(default)]
    pub items: Vec<VideoItem>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoItem {
    pub id: String,
    pub snippet: Option<VideoSnippet>,
    pub content_details: Option<ContentDetails>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSnippet {
    pub title: String,
    #[serde(default)]
    pub live_broadcast_content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentDetails {
    pub duration: Option<String>,
}

/// Resolver using the YouTube Data API for lookups
pub struct YouTubeApiResolver {
    http_client: reqwest::Client,
    api_key: String,
    base_url: String,
    streams: YtDlpResolver,
}

impl YouTubeApiResolver {
    pub fn new(api_key: String, streams: YtDlpResolver) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            http_client,
            api_key,
            base_url: YOUTUBE_API_BASE_URL.to_string(),
            streams,
        })
    }

    /// Point at a different API host
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<T> {
        let url = format!("{}/{}", self.base_url, endpoint);
        tracing::debug!(endpoint, "Querying YouTube Data API");

        let response = self
            .http_client
            .get(&url)
            .query(params)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Api(format!("{} {}: {}", endpoint, status, error_text)));
        }

        Ok(response.json().await?)
    }

    async fn search(&self, query: &str) -> Result<String> {
        let response: SearchResponse = self
            .get(
                "search",
                &[
                    ("part", "snippet"),
                    ("type", "video"),
                    ("maxResults", SEARCH_MAX_RESULTS),
                    ("q", query),
                ],
            )
            .await?;

        first_video_id(&response).ok_or_else(|| Error::NotFound(query.to_string()))
    }

    async fn video(&self, video_id: &str) -> Result<Track> {
        let response: VideosResponse = self
            .get(
                "videos",
                &[("part", "snippet,contentDetails"), ("id", video_id)],
            )
            .await?;

        track_from_videos(&response).ok_or_else(|| Error::NotFound(video_id.to_string()))
    }
}

/// First result that is a video (channels and playlists are skipped)
pub fn first_video_id(response: &SearchResponse) -> Option<String> {
    response
        .items
        .iter()
        .filter(|item| item.id.kind == "youtube#video")
        .find_map(|item| item.id.video_id.clone())
}

/// Build a track from a `videos.list` response
///
/// Live broadcasts and zero durations (`P0D`) yield a track without duration.
pub fn track_from_videos(response: &VideosResponse) -> Option<Track> {
    let item = response.items.first()?;
    let mut track = Track::new(item.id.clone());

    if let Some(snippet) = &item.snippet {
        track.title = Some(snippet.title.clone());
        if snippet.live_broadcast_content.as_deref() == Some("live") {
            return Some(track);
        }
    }

    track.duration = item
        .content_details
        .as_ref()
        .and_then(|d| d.duration.as_deref())
        .and_then(|d| parse_iso8601_duration(d).ok())
        .filter(|d| !d.is_zero());

    Some(track)
}

#[async_trait]
impl MediaResolver for YouTubeApiResolver {
    async fn resolve(&self, query: &str) -> Result<Track> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::NotFound("empty query".to_string()));
        }

        let video_id = match extract_video_id(query) {
            Some(id) => id,
            None => self.search(query).await?,
        };

        let track = self.video(&video_id).await?;
        tracing::info!(media_id = %track.media_id, "Resolved '{}'", query);
        Ok(track)
    }

    async fn playable_url(&self, track: &Track) -> Result<String> {
        self.streams.playable_url(track).await
    }
}
