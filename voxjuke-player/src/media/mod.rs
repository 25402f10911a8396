//! Media resolution
//!
//! Turns user queries (search terms, video URLs, bare ids) into [`Track`]s and
//! tracks into playable stream URLs.

pub mod resolver;
pub mod youtube_api;
pub mod ytdlp;

pub use resolver::{extract_video_id, MediaResolver, Track};
pub use youtube_api::YouTubeApiResolver;
pub use ytdlp::YtDlpResolver;
