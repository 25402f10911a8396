//! Resolver contract and shared helpers

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Length of a YouTube video id
const VIDEO_ID_LEN: usize = 11;

/// A resolved media item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    /// Opaque media identifier (YouTube video id)
    pub media_id: String,
    pub title: Option<String>,
    /// `None` for live streams or when the length is unknown
    pub duration: Option<Duration>,
}

impl Track {
    pub fn new(media_id: impl Into<String>) -> Self {
        Self {
            media_id: media_id.into(),
            title: None,
            duration: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Unknown length is treated as a live stream
    pub fn is_live(&self) -> bool {
        self.duration.is_none()
    }

    /// Title for display, falling back to the media id
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.media_id)
    }
}

/// Looks up media and produces stream URLs for the decoder
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Resolve a search term, URL or id to a track
    ///
    /// Returns `Error::NotFound` when nothing matches.
    async fn resolve(&self, query: &str) -> Result<Track>;

    /// URL the decoder should read; may differ for live and on-demand content
    async fn playable_url(&self, track: &Track) -> Result<String>;
}

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn take_id(rest: &str) -> Option<String> {
    let id: String = rest.chars().take_while(|c| is_id_char(*c)).collect();
    (id.len() == VIDEO_ID_LEN).then_some(id)
}

/// Extract a YouTube video id from a URL or bare id
///
/// Recognises `watch?v=`, `youtu.be/`, `/shorts/`, `/embed/`, `/live/` and
/// `/v/` URLs. Anything else returns `None` and should be treated as a
/// search term.
///
/// # Examples
///
/// ```
/// use voxjuke_player::media::extract_video_id;
///
/// assert_eq!(
///     extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42").as_deref(),
///     Some("dQw4w9WgXcQ")
/// );
/// assert_eq!(extract_video_id("https://youtu.be/dQw4w9WgXcQ").as_deref(), Some("dQw4w9WgXcQ"));
/// assert_eq!(extract_video_id("never gonna give you up"), None);
/// ```
pub fn extract_video_id(input: &str) -> Option<String> {
    let input = input.trim();

    if input.len() == VIDEO_ID_LEN && input.chars().all(is_id_char) {
        return Some(input.to_string());
    }

    if !input.contains("youtube.com") && !input.contains("youtu.be") {
        return None;
    }

    for marker in ["youtu.be/", "/shorts/", "/embed/", "/live/", "/v/"] {
        if let Some(pos) = input.find(marker) {
            return take_id(&input[pos + marker.len()..]);
        }
    }

    let (_, query) = input.split_once('?')?;
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("v="))
        .and_then(take_id)
}

/// True for inputs that look like a URL rather than a search term
pub fn looks_like_url(input: &str) -> bool {
    let input = input.trim();
    input.starts_with("http://") || input.starts_with("https://")
}
