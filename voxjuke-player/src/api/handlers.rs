//! HTTP request handlers
//!
//! Every response carries `{ status, message }`: `status` is the snake_case
//! command outcome, `message` the text a chat front end shows the user.
//! Command outcomes such as "already paused" are `200 OK`; only malformed
//! requests, failed lookups and bad queue indices use error status codes.
//!
//! Queue positions are 1-based here and 0-based everywhere else.

use crate::api::AppState;
use crate::error::Error;
use crate::playback::{CommandStatus, EntryInfo, LoopOutcome};
use crate::session::GuildSession;
use crate::voice::{ChannelId, GuildId};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use voxjuke_common::human_time::{format_timestamp, parse_timestamp};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
    message: String,
}

impl StatusResponse {
    fn new(status: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            message: message.into(),
        }
    }

    fn command(status: CommandStatus, message: impl Into<String>) -> Self {
        Self::new(status.as_str(), message)
    }
}

type ApiError = (StatusCode, Json<StatusResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Deserialize)]
pub struct PlayRequest {
    channel: ChannelId,
    query: Option<String>,
    requested_by: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResumeRequest {
    channel: Option<ChannelId>,
}

#[derive(Debug, Deserialize)]
pub struct SeekRequest {
    /// `SS`, `M:SS` or `H:MM:SS`
    position: String,
}

#[derive(Debug, Deserialize)]
pub struct SwapRequest {
    a: usize,
    b: usize,
}

#[derive(Debug, Deserialize)]
pub struct SkipToRequest {
    index: usize,
}

#[derive(Debug, Deserialize)]
pub struct VolumeRequest {
    volume: u8, // 0-100 user-facing scale
}

#[derive(Debug, Serialize)]
pub struct EntryView {
    entry_id: Uuid,
    media_id: String,
    title: String,
    /// `None` for live streams
    duration_secs: Option<u64>,
    duration: String,
    requested_by: Option<String>,
    preloaded: bool,
}

impl From<&EntryInfo> for EntryView {
    fn from(info: &EntryInfo) -> Self {
        let duration_secs = info.track.duration.map(|d| d.as_secs());
        Self {
            entry_id: info.entry_id,
            media_id: info.track.media_id.clone(),
            title: info.track.display_title().to_string(),
            duration_secs,
            duration: duration_secs.map_or_else(|| "live".to_string(), format_timestamp),
            requested_by: info.requested_by.clone(),
            preloaded: info.preloaded,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PlayResponse {
    status: String,
    message: String,
    entry: Option<EntryView>,
}

#[derive(Debug, Serialize)]
pub struct QueueItem {
    /// 1-based position
    position: usize,
    #[serde(flatten)]
    entry: EntryView,
}

#[derive(Debug, Serialize)]
pub struct QueueResponse {
    status: String,
    message: String,
    looping: bool,
    entries: Vec<QueueItem>,
}

#[derive(Debug, Serialize)]
pub struct NowPlayingResponse {
    status: String,
    message: String,
    state: String,
    looping: bool,
    /// -1 when nothing is loaded
    elapsed_secs: i64,
    entry: Option<EntryView>,
}

#[derive(Debug, Serialize)]
pub struct VolumeResponse {
    status: String,
    message: String,
    volume: u8,
}

// ============================================================================
// Helpers
// ============================================================================

fn error_response(err: Error) -> ApiError {
    let (code, status) = match &err {
        Error::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        Error::IndexOutOfRange { .. } => (StatusCode::BAD_REQUEST, "out_of_range"),
        Error::BadRequest(_) => (StatusCode::BAD_REQUEST, "invalid_argument"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "error"),
    };
    let message = match &err {
        Error::NotFound(_) => "could not find anything matching that".to_string(),
        Error::IndexOutOfRange { len, .. } => {
            format!("that position is not in the queue (it has {} entries)", len)
        }
        other => other.to_string(),
    };
    if code == StatusCode::INTERNAL_SERVER_ERROR {
        warn!("Request failed: {}", err);
    }
    (code, Json(StatusResponse::new(status, message)))
}

/// Convert a 1-based user position to a queue index
fn to_index(position: usize) -> Result<usize, ApiError> {
    position
        .checked_sub(1)
        .ok_or_else(|| error_response(Error::BadRequest("positions start at 1".to_string())))
}

async fn session(state: &AppState, guild: GuildId) -> Arc<GuildSession> {
    state.registry.get_or_create(guild).await
}

// ============================================================================
// Playback Endpoints
// ============================================================================

/// POST /guilds/:guild/play - Enqueue a query and start playing
pub async fn play(
    State(state): State<AppState>,
    Path(guild): Path<GuildId>,
    Json(req): Json<PlayRequest>,
) -> ApiResult<PlayResponse> {
    let session = session(&state, guild).await;
    let query = req.query.as_deref().map(str::trim).filter(|q| !q.is_empty());

    let (status, entry) = session
        .play(req.channel, query, req.requested_by)
        .await
        .map_err(error_response)?;

    let message = match (status, &entry) {
        (CommandStatus::Ok | CommandStatus::Already, Some(entry)) => {
            format!("added {} to queue", entry.track.display_title())
        }
        (CommandStatus::Ok, None) => "starting the player".to_string(),
        (CommandStatus::Already, None) => "already playing".to_string(),
        (CommandStatus::EmptyQueue, _) => "there are no songs queued".to_string(),
        (CommandStatus::Disconnected, _) => "could not join the voice channel".to_string(),
        (other, _) => other.to_string(),
    };
    info!(guild, %status, "Play command");

    Ok(Json(PlayResponse {
        status: status.as_str().to_string(),
        message,
        entry: entry.as_ref().map(EntryView::from),
    }))
}

/// POST /guilds/:guild/pause
pub async fn pause(
    State(state): State<AppState>,
    Path(guild): Path<GuildId>,
) -> Json<StatusResponse> {
    let status = session(&state, guild).await.player().pause().await;
    let message = match status {
        CommandStatus::Ok => "paused",
        CommandStatus::Already => "already paused",
        CommandStatus::EmptyQueue => "nothing is playing",
        _ => "could not pause",
    };
    Json(StatusResponse::command(status, message))
}

/// POST /guilds/:guild/resume - Continue a paused entry or start the queue
///
/// The body is optional; without a channel the current one is reused.
pub async fn resume(
    State(state): State<AppState>,
    Path(guild): Path<GuildId>,
    req: Option<Json<ResumeRequest>>,
) -> Json<StatusResponse> {
    let channel = req.and_then(|Json(r)| r.channel);
    let status = session(&state, guild).await.player().resume(channel).await;
    let message = match status {
        CommandStatus::Ok => "resuming",
        CommandStatus::Already => "already playing",
        CommandStatus::EmptyQueue => "there are no songs queued",
        CommandStatus::Disconnected => "not in a voice channel",
        _ => "could not resume",
    };
    Json(StatusResponse::command(status, message))
}

/// POST /guilds/:guild/skip
pub async fn skip(
    State(state): State<AppState>,
    Path(guild): Path<GuildId>,
) -> Json<StatusResponse> {
    let status = session(&state, guild).await.player().skip().await;
    Json(StatusResponse::command(status, skip_message(status)))
}

fn skip_message(status: CommandStatus) -> &'static str {
    match status {
        CommandStatus::Ok => "skipping",
        CommandStatus::EmptyQueue => "skipped, the queue is now empty",
        CommandStatus::Disconnected => "skipped, but not in a voice channel",
        _ => "could not skip",
    }
}

/// POST /guilds/:guild/seek
pub async fn seek(
    State(state): State<AppState>,
    Path(guild): Path<GuildId>,
    Json(req): Json<SeekRequest>,
) -> ApiResult<StatusResponse> {
    let offset = parse_timestamp(&req.position).map_err(|e| {
        error_response(Error::BadRequest(format!("invalid position: {}", e)))
    })?;

    let status = session(&state, guild).await.player().seek(offset).await;
    let message = match status {
        CommandStatus::Ok => format!("seeking to {}", format_timestamp(offset.as_secs())),
        CommandStatus::OutOfRange => "that position is too close to the end".to_string(),
        CommandStatus::InvalidArgument => "cannot seek in a live stream".to_string(),
        CommandStatus::NotCurrentlyPlaying => "nothing is playing".to_string(),
        CommandStatus::Disconnected => "could not restart the stream".to_string(),
        other => other.to_string(),
    };
    Ok(Json(StatusResponse::command(status, message)))
}

/// POST /guilds/:guild/loop - Toggle looping of the current entry
pub async fn toggle_loop(
    State(state): State<AppState>,
    Path(guild): Path<GuildId>,
) -> Json<StatusResponse> {
    let outcome = session(&state, guild).await.player().toggle_loop().await;
    let (status, message) = match outcome {
        LoopOutcome::NowLooping => ("now_looping", "now looping"),
        LoopOutcome::NoLongerLooping => ("no_longer_looping", "no longer looping"),
        LoopOutcome::NothingToLoop => ("nothing_to_loop", "nothing to loop"),
    };
    Json(StatusResponse::new(status, message))
}

/// POST /guilds/:guild/leave - Stop and leave the voice channel
pub async fn leave(
    State(state): State<AppState>,
    Path(guild): Path<GuildId>,
) -> Json<StatusResponse> {
    session(&state, guild).await.leave().await;
    Json(StatusResponse::command(CommandStatus::Ok, "left the voice channel"))
}

/// GET /guilds/:guild/now-playing
pub async fn now_playing(
    State(state): State<AppState>,
    Path(guild): Path<GuildId>,
) -> Json<NowPlayingResponse> {
    let snapshot = session(&state, guild).await.player().now_playing().await;

    let (status, message) = match &snapshot.entry {
        Some(entry) => {
            let elapsed = format_timestamp(snapshot.elapsed_secs.max(0) as u64);
            let total = entry
                .track
                .duration
                .map_or_else(|| "live".to_string(), |d| format_timestamp(d.as_secs()));
            (
                CommandStatus::Ok,
                format!("{} [{}/{}]", entry.track.display_title(), elapsed, total),
            )
        }
        None => (CommandStatus::NotCurrentlyPlaying, "nothing is playing".to_string()),
    };

    Json(NowPlayingResponse {
        status: status.as_str().to_string(),
        message,
        state: snapshot.state.to_string(),
        looping: snapshot.looping,
        elapsed_secs: snapshot.elapsed_secs,
        entry: snapshot.entry.as_ref().map(EntryView::from),
    })
}

// ============================================================================
// Queue Endpoints
// ============================================================================

/// GET /guilds/:guild/queue
pub async fn get_queue(
    State(state): State<AppState>,
    Path(guild): Path<GuildId>,
) -> Json<QueueResponse> {
    let session = session(&state, guild).await;
    let entries: Vec<QueueItem> = session
        .queue()
        .snapshot()
        .await
        .iter()
        .enumerate()
        .map(|(i, info)| QueueItem {
            position: i + 1,
            entry: EntryView::from(info),
        })
        .collect();

    let message = match entries.len() {
        0 => "the queue is empty".to_string(),
        1 => "1 song queued".to_string(),
        n => format!("{} songs queued", n),
    };

    Json(QueueResponse {
        status: CommandStatus::Ok.as_str().to_string(),
        message,
        looping: session.queue().is_looping().await,
        entries,
    })
}

/// DELETE /guilds/:guild/queue - Remove every pending entry
pub async fn clear_queue(
    State(state): State<AppState>,
    Path(guild): Path<GuildId>,
) -> Json<StatusResponse> {
    let removed = session(&state, guild).await.queue().clear().await;
    Json(StatusResponse::command(
        CommandStatus::Ok,
        format!("cleared {} songs from the queue", removed),
    ))
}

/// DELETE /guilds/:guild/queue/:index
pub async fn remove(
    State(state): State<AppState>,
    Path((guild, position)): Path<(GuildId, usize)>,
) -> ApiResult<PlayResponse> {
    let index = to_index(position)?;
    let removed = session(&state, guild)
        .await
        .queue()
        .remove(index)
        .await
        .map_err(error_response)?;

    Ok(Json(PlayResponse {
        status: CommandStatus::Ok.as_str().to_string(),
        message: format!("removed {} from the queue", removed.track.display_title()),
        entry: Some(EntryView::from(&removed)),
    }))
}

/// POST /guilds/:guild/queue/swap
pub async fn swap(
    State(state): State<AppState>,
    Path(guild): Path<GuildId>,
    Json(req): Json<SwapRequest>,
) -> ApiResult<StatusResponse> {
    let a = to_index(req.a)?;
    let b = to_index(req.b)?;
    session(&state, guild)
        .await
        .queue()
        .swap(a, b)
        .await
        .map_err(error_response)?;

    Ok(Json(StatusResponse::command(
        CommandStatus::Ok,
        format!("swapped {} and {}", req.a, req.b),
    )))
}

/// POST /guilds/:guild/queue/skip-to - Drop entries before `index`, then skip
///
/// Skipping to position `n` makes the entry at `n` play next. A position past
/// the end empties the queue.
pub async fn skip_to(
    State(state): State<AppState>,
    Path(guild): Path<GuildId>,
    Json(req): Json<SkipToRequest>,
) -> ApiResult<StatusResponse> {
    let index = to_index(req.index)?;
    let session = session(&state, guild).await;

    let dropped = session.queue().truncate_before(index).await;
    let status = session.player().skip().await;
    info!(guild, dropped, %status, "Skip to");

    Ok(Json(StatusResponse::command(status, skip_message(status))))
}

// ============================================================================
// Volume Endpoints
// ============================================================================

/// GET /guilds/:guild/volume
pub async fn get_volume(
    State(state): State<AppState>,
    Path(guild): Path<GuildId>,
) -> Json<VolumeResponse> {
    let volume = session(&state, guild).await.volume_percent();
    Json(VolumeResponse {
        status: CommandStatus::Ok.as_str().to_string(),
        message: format!("volume is {}%", volume),
        volume,
    })
}

/// PUT /guilds/:guild/volume - Set volume (0-100); applies from the next track
pub async fn set_volume(
    State(state): State<AppState>,
    Path(guild): Path<GuildId>,
    Json(req): Json<VolumeRequest>,
) -> ApiResult<VolumeResponse> {
    if req.volume > 100 {
        return Err(error_response(Error::BadRequest(
            "volume must be between 0 and 100".to_string(),
        )));
    }

    let volume = session(&state, guild).await.set_volume_percent(req.volume);
    Ok(Json(VolumeResponse {
        status: CommandStatus::Ok.as_str().to_string(),
        message: format!("volume set to {}%", volume),
        volume,
    }))
}
