//! Test helpers for voxjuke-player integration tests
//!
//! In-process stand-ins for the external collaborators:
//! - `MockResolver`: deterministic tracks, no network
//! - `MockTranscoder`: decoder handles over generated PCM readers
//! - `MockGateway`: voice links whose sinks count bytes and concurrent writers

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::watch;
use tokio::time::{sleep, Sleep};

use voxjuke_player::audio::{DecoderHandle, Transcoder, CHUNK_SIZE};
use voxjuke_player::error::{Error, Result};
use voxjuke_player::media::{MediaResolver, Track};
use voxjuke_player::playback::{PlaybackState, Player, QueueEntry};
use voxjuke_player::session::{GuildSession, SessionRegistry, SessionServices};
use voxjuke_player::voice::{AudioSink, ChannelId, GuildId, VoiceGateway, VoiceLink};
use voxjuke_player::EventBus;

/// Upper bound for every wait in the tests
pub const WAIT: Duration = Duration::from_secs(5);

pub const GUILD: GuildId = 42;
pub const CHANNEL: ChannelId = 1001;
pub const OTHER_CHANNEL: ChannelId = 1002;

/// Default duration of resolved tracks
pub const TRACK_SECS: u64 = 600;

// ============================================================================
// Media resolver
// ============================================================================

/// Resolves any query to a track named after it
///
/// - queries starting with `missing` are not found
/// - queries starting with `live` resolve to tracks without a duration
/// - `name@secs` sets the duration
#[derive(Default)]
pub struct MockResolver {
    pub resolve_calls: AtomicUsize,
}

pub fn track(query: &str) -> Track {
    let (id, secs) = match query.split_once('@') {
        Some((id, secs)) => (id, secs.parse().unwrap_or(TRACK_SECS)),
        None => (query, TRACK_SECS),
    };
    let track = Track::new(id).with_title(format!("Title of {}", id));
    if id.starts_with("live") {
        track
    } else {
        track.with_duration(Duration::from_secs(secs))
    }
}

pub fn entry(query: &str) -> QueueEntry {
    QueueEntry::new(track(query), Some("tester".to_string()))
}

#[async_trait]
impl MediaResolver for MockResolver {
    async fn resolve(&self, query: &str) -> Result<Track> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        if query.starts_with("missing") {
            return Err(Error::NotFound(query.to_string()));
        }
        Ok(track(query))
    }

    async fn playable_url(&self, track: &Track) -> Result<String> {
        Ok(format!("mock://{}", track.media_id))
    }
}

// ============================================================================
// Transcoder
// ============================================================================

/// How a mock decoder behaves for a given media id
#[derive(Debug, Clone, Copy)]
pub enum Source {
    /// Never ends; one chunk per tick
    Endless,
    /// Ends after this many bytes
    Finite(u64),
    /// Fails reading after this many bytes
    FailsAfter(u64),
    /// Decoder cannot be started
    Unavailable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpawnCall {
    pub input: String,
    pub volume: f32,
    pub seek: Duration,
}

/// Counts live mock decoders
struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Generated silence, paced one chunk per `tick`
pub struct MockPcm {
    remaining: Option<u64>,
    fail_at_end: bool,
    tick: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
    _live: LiveGuard,
}

impl AsyncRead for MockPcm {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let tick = self.tick;
        let pending = self.sleep.get_or_insert_with(|| Box::pin(sleep(tick)));
        if pending.as_mut().poll(cx).is_pending() {
            return Poll::Pending;
        }
        self.sleep = None;

        let mut n = buf.remaining().min(CHUNK_SIZE) as u64;
        if let Some(remaining) = self.remaining {
            if remaining == 0 {
                if self.fail_at_end {
                    return Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "decoder died")));
                }
                return Poll::Ready(Ok(()));
            }
            n = n.min(remaining);
            self.remaining = Some(remaining - n);
        }

        buf.put_slice(&vec![0u8; n as usize]);
        Poll::Ready(Ok(()))
    }
}

pub struct MockTranscoder {
    sources: Mutex<HashMap<String, Source>>,
    spawns: Mutex<Vec<SpawnCall>>,
    live: Arc<AtomicUsize>,
    tick: Duration,
}

impl MockTranscoder {
    /// One chunk (20 ms of audio) per millisecond: 20x real time
    pub fn new() -> Self {
        Self::with_tick(Duration::from_millis(1))
    }

    pub fn with_tick(tick: Duration) -> Self {
        Self {
            sources: Mutex::new(HashMap::new()),
            spawns: Mutex::new(Vec::new()),
            live: Arc::new(AtomicUsize::new(0)),
            tick,
        }
    }

    pub fn set_source(&self, media_id: &str, source: Source) {
        self.sources
            .lock()
            .unwrap()
            .insert(format!("mock://{}", media_id), source);
    }

    pub fn spawns(&self) -> Vec<SpawnCall> {
        self.spawns.lock().unwrap().clone()
    }

    pub fn spawn_count(&self) -> usize {
        self.spawns.lock().unwrap().len()
    }

    /// Spawns for one media id
    pub fn spawns_of(&self, media_id: &str) -> Vec<SpawnCall> {
        let url = format!("mock://{}", media_id);
        self.spawns()
            .into_iter()
            .filter(|s| s.input == url)
            .collect()
    }

    /// Decoders not yet terminated or dropped
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcoder for MockTranscoder {
    async fn spawn(
        &self,
        input: &str,
        volume: f32,
        seek: Duration,
    ) -> Option<DecoderHandle> {
        self.spawns.lock().unwrap().push(SpawnCall {
            input: input.to_string(),
            volume,
            seek,
        });

        let source = self
            .sources
            .lock()
            .unwrap()
            .get(input)
            .copied()
            .unwrap_or(Source::Endless);

        let (remaining, fail_at_end) = match source {
            Source::Unavailable => return None,
            Source::Endless => (None, false),
            Source::Finite(bytes) => (Some(bytes), false),
            Source::FailsAfter(bytes) => (Some(bytes), true),
        };

        self.live.fetch_add(1, Ordering::SeqCst);
        Some(DecoderHandle::from_reader(MockPcm {
            remaining,
            fail_at_end,
            tick: self.tick,
            sleep: None,
            _live: LiveGuard(Arc::clone(&self.live)),
        }))
    }
}

// ============================================================================
// Voice gateway
// ============================================================================

/// Counters shared by every sink of a gateway
#[derive(Default)]
pub struct SinkStats {
    pub open: AtomicUsize,
    pub max_open: AtomicUsize,
    pub opened: AtomicUsize,
    pub bytes: AtomicU64,
    pub fail_writes: AtomicBool,
}

impl SinkStats {
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::SeqCst)
    }

    pub fn open(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub fn max_open(&self) -> usize {
        self.max_open.load(Ordering::SeqCst)
    }
}

pub struct MockSink {
    stats: Arc<SinkStats>,
    link_connected: Arc<AtomicBool>,
}

#[async_trait]
impl AudioSink for MockSink {
    async fn write_frame(&mut self, frame: Bytes) -> io::Result<()> {
        if self.stats.fail_writes.load(Ordering::SeqCst)
            || !self.link_connected.load(Ordering::SeqCst)
        {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "voice connection lost"));
        }
        self.stats.bytes.fetch_add(frame.len() as u64, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for MockSink {
    fn drop(&mut self) {
        self.stats.open.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct MockLink {
    channel: ChannelId,
    connected: Arc<AtomicBool>,
    members: watch::Sender<usize>,
    stats: Arc<SinkStats>,
    pub closes: AtomicUsize,
}

impl MockLink {
    pub fn set_members(&self, count: usize) {
        self.members.send_replace(count);
    }

    /// Simulate the network dropping the connection
    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl VoiceLink for MockLink {
    fn channel(&self) -> ChannelId {
        self.channel
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn open_sink(&self) -> io::Result<Box<dyn AudioSink>> {
        if !self.is_connected() {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "link closed"));
        }
        let open = self.stats.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_open.fetch_max(open, Ordering::SeqCst);
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSink {
            stats: Arc::clone(&self.stats),
            link_connected: Arc::clone(&self.connected),
        }))
    }

    fn members(&self) -> watch::Receiver<usize> {
        self.members.subscribe()
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct MockGateway {
    pub stats: Arc<SinkStats>,
    links: Mutex<Vec<Arc<MockLink>>>,
    pub fail_joins: AtomicBool,
}

impl MockGateway {
    pub fn joins(&self) -> usize {
        self.links.lock().unwrap().len()
    }

    pub fn last_link(&self) -> Option<Arc<MockLink>> {
        self.links.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl VoiceGateway for MockGateway {
    async fn join(&self, _guild: GuildId, channel: ChannelId) -> Result<Arc<dyn VoiceLink>> {
        if self.fail_joins.load(Ordering::SeqCst) {
            return Err(Error::Voice("join refused".to_string()));
        }
        let (members, _) = watch::channel(2);
        let link = Arc::new(MockLink {
            channel,
            connected: Arc::new(AtomicBool::new(true)),
            members,
            stats: Arc::clone(&self.stats),
            closes: AtomicUsize::new(0),
        });
        self.links.lock().unwrap().push(Arc::clone(&link));
        Ok(link)
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub registry: Arc<SessionRegistry>,
    pub session: Arc<GuildSession>,
    pub resolver: Arc<MockResolver>,
    pub transcoder: Arc<MockTranscoder>,
    pub gateway: Arc<MockGateway>,
    pub events: EventBus,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_transcoder(MockTranscoder::new()).await
    }

    pub async fn with_transcoder(transcoder: MockTranscoder) -> Self {
        let resolver = Arc::new(MockResolver::default());
        let transcoder = Arc::new(transcoder);
        let gateway = Arc::new(MockGateway::default());
        let events = EventBus::new();

        let registry = Arc::new(SessionRegistry::new(SessionServices {
            resolver: resolver.clone(),
            transcoder: transcoder.clone(),
            gateway: gateway.clone(),
            events: events.clone(),
            default_volume: 0.5,
        }));
        let session = registry.get_or_create(GUILD).await;

        Self {
            registry,
            session,
            resolver,
            transcoder,
            gateway,
            events,
        }
    }

    pub fn player(&self) -> &Player {
        self.session.player()
    }

    pub fn stats(&self) -> &SinkStats {
        &self.gateway.stats
    }
}

/// Wait until the player reaches `state`
pub async fn wait_for_state(player: &Player, state: PlaybackState) {
    let mut rx = player.subscribe_state();
    tokio::time::timeout(WAIT, rx.wait_for(|s| *s == state))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {}", state))
        .expect("player dropped");
}

/// Poll `check` until it holds
pub async fn wait_until<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let result = tokio::time::timeout(WAIT, async {
        while !check().await {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting until {}", what);
}
