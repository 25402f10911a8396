//! Player state machine
//!
//! One [`Player`] per guild. Commands serialize on a single async mutex
//! (`core`). A command that starts playback hands its *owned* lock guard to the
//! background player task, which keeps it until the entry is actually playing;
//! from then on commands may run while audio flows.
//!
//! **Interrupting:** every playback attempt gets a fresh cancellation token.
//! Commands that change what plays cancel it and await the task's
//! `JoinHandle` before touching anything else, so at most one task ever writes
//! to the voice sink. A task interrupted mid-entry hands the entry (with its
//! still-running decoder) back through the handle; resuming continues reading
//! that same decoder.
//!
//! **Lock order:** `core` may be held while taking the queue or connection
//! locks, never the other way round.

use crate::audio::{copy_to_sink, CopyOutcome, StreamLoader, BYTES_PER_SECOND};
use crate::playback::entry::{EntryInfo, QueueEntry};
use crate::playback::queue::PlaybackQueue;
use crate::playback::state::{CommandStatus, LoopOutcome, NowPlaying, PlaybackState};
use crate::state::EventBus;
use crate::voice::{ChannelId, ConnectionManager, VoiceLink};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch, Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use voxjuke_common::events::PlayerEvent;
use voxjuke_common::time;

/// Seeks closer than this to the end of a track are refused
pub const SEEK_GUARD: Duration = Duration::from_secs(30);

/// How a player task ended
enum TaskExit {
    /// Stopped mid-entry; the entry can be resumed
    Interrupted(QueueEntry),
    /// Queue exhausted, or cancelled between entries
    Done,
}

/// What a new player task starts with
enum StartWith {
    /// Pop the next queue entry
    Queue,
    /// A new entry; progress counters start from zero
    Fresh(QueueEntry),
    /// Continue an entry, keeping progress counters
    Resume(QueueEntry),
}

/// State guarded by the command lock
struct PlayerCore {
    /// Entry being played or paused
    current: Option<EntryInfo>,
    /// Paused entry owned by the player while no task runs
    held: Option<QueueEntry>,
    /// Position the current decoder started at
    seek_baseline: Duration,
    token: CancellationToken,
    task: Option<JoinHandle<TaskExit>>,
}

struct PlayerInner {
    guild_id: u64,
    core: Arc<Mutex<PlayerCore>>,
    queue: PlaybackQueue,
    connection: Arc<ConnectionManager>,
    loader: StreamLoader,
    state_tx: watch::Sender<PlaybackState>,
    /// PCM bytes read from the current decoder since it started
    bytes_read: AtomicU64,
    events: EventBus,
}

/// Per-guild playback state machine
///
/// Cloning shares the same player.
#[derive(Clone)]
pub struct Player {
    inner: Arc<PlayerInner>,
}

impl Player {
    pub fn new(
        guild_id: u64,
        queue: PlaybackQueue,
        connection: Arc<ConnectionManager>,
        loader: StreamLoader,
        events: EventBus,
    ) -> Self {
        let (state_tx, _) = watch::channel(PlaybackState::Idle);
        let core = PlayerCore {
            current: None,
            held: None,
            seek_baseline: Duration::ZERO,
            token: CancellationToken::new(),
            task: None,
        };

        Self {
            inner: Arc::new(PlayerInner {
                guild_id,
                core: Arc::new(Mutex::new(core)),
                queue,
                connection,
                loader,
                state_tx,
                bytes_read: AtomicU64::new(0),
                events,
            }),
        }
    }

    pub fn guild_id(&self) -> u64 {
        self.inner.guild_id
    }

    pub fn queue(&self) -> &PlaybackQueue {
        &self.inner.queue
    }

    pub fn state(&self) -> PlaybackState {
        self.inner.state()
    }

    /// Watch phase transitions
    pub fn subscribe_state(&self) -> watch::Receiver<PlaybackState> {
        self.inner.state_tx.subscribe()
    }

    /// Enqueue `entry` (if given) and start playing in `channel`
    ///
    /// Returns `Already` while playing; the entry is still enqueued, which is
    /// how adding to the queue during playback works.
    pub async fn play(&self, entry: Option<QueueEntry>, channel: ChannelId) -> CommandStatus {
        let inner = &self.inner;
        let mut core = Arc::clone(&inner.core).lock_owned().await;

        if let Some(entry) = entry {
            inner.queue.enqueue(entry).await;
        }

        match inner.state() {
            PlaybackState::Playing => return CommandStatus::Already,
            PlaybackState::Idle if core.held.is_none() && !inner.queue.has_next().await => {
                return CommandStatus::EmptyQueue;
            }
            _ => {}
        }

        inner.interrupt_and_await(&mut core).await;
        inner.start(core, channel).await
    }

    /// Continue a paused entry, or start the queue
    ///
    /// Without an explicit channel the current voice channel is reused.
    pub async fn resume(&self, channel: Option<ChannelId>) -> CommandStatus {
        let channel = match channel {
            Some(channel) => channel,
            None => match self.inner.connection.current_channel().await {
                Some(channel) => channel,
                None => return CommandStatus::Disconnected,
            },
        };
        self.play(None, channel).await
    }

    pub async fn pause(&self) -> CommandStatus {
        let inner = &self.inner;
        let mut core = inner.core.lock().await;

        match inner.state() {
            PlaybackState::Paused => return CommandStatus::Already,
            PlaybackState::Idle => return CommandStatus::EmptyQueue,
            PlaybackState::Playing => {}
        }

        inner.interrupt_and_await(&mut core).await;
        inner.set_state(PlaybackState::Paused);
        info!(guild = inner.guild_id, "Paused");
        CommandStatus::Ok
    }

    /// Drop the current entry and play the next one
    pub async fn skip(&self) -> CommandStatus {
        let inner = &self.inner;
        let mut core = Arc::clone(&inner.core).lock_owned().await;

        inner.interrupt_and_await(&mut core).await;
        if let Some(skipped) = core.held.take() {
            info!(guild = inner.guild_id, media_id = %skipped.track.media_id, "Skipped");
            inner.track_finished(&skipped);
            skipped.dispose();
        }
        core.current = None;
        inner.reset_progress(&mut core);

        let Some(next) = inner.queue.try_dequeue().await else {
            inner.set_state(PlaybackState::Idle);
            return CommandStatus::EmptyQueue;
        };

        let Some(link) = inner.connection.current_link().await else {
            core.current = Some(next.info());
            core.held = Some(next);
            inner.set_state(PlaybackState::Paused);
            return CommandStatus::Disconnected;
        };

        inner.launch(core, link, StartWith::Fresh(next));
        CommandStatus::Ok
    }

    /// Restart the current entry at `offset`
    pub async fn seek(&self, offset: Duration) -> CommandStatus {
        let inner = &self.inner;
        let mut core = Arc::clone(&inner.core).lock_owned().await;

        if inner.state() != PlaybackState::Playing {
            return CommandStatus::NotCurrentlyPlaying;
        }
        let Some(current) = core.current.as_ref() else {
            return CommandStatus::NotCurrentlyPlaying;
        };
        let Some(duration) = current.track.duration else {
            return CommandStatus::InvalidArgument;
        };
        if offset.saturating_add(SEEK_GUARD) > duration {
            return CommandStatus::OutOfRange;
        }

        inner.interrupt_and_await(&mut core).await;

        let Some(mut entry) = core.held.take() else {
            // The entry ended while we waited for the task; carry on with the queue
            inner.reset_progress(&mut core);
            match inner.connection.current_link().await {
                Some(link) => inner.launch(core, link, StartWith::Queue),
                None => inner.set_state(PlaybackState::Idle),
            }
            return CommandStatus::NotCurrentlyPlaying;
        };

        entry.dispose_decoder();
        inner.bytes_read.store(0, Ordering::Relaxed);
        core.seek_baseline = offset;

        match inner.loader.load(&entry.track, offset).await {
            Some(decoder) => entry.attach_decoder(decoder),
            None => {
                warn!(guild = inner.guild_id, media_id = %entry.track.media_id, "Seek could not restart decoder");
                core.held = Some(entry);
                inner.set_state(PlaybackState::Paused);
                return CommandStatus::Disconnected;
            }
        }

        let Some(link) = inner.connection.current_link().await else {
            core.held = Some(entry);
            inner.set_state(PlaybackState::Paused);
            return CommandStatus::Disconnected;
        };

        info!(guild = inner.guild_id, offset_secs = offset.as_secs(), "Seeking");
        inner.launch(core, link, StartWith::Resume(entry));
        CommandStatus::Ok
    }

    pub async fn toggle_loop(&self) -> LoopOutcome {
        let inner = &self.inner;
        let core = inner.core.lock().await;

        if inner.queue.is_looping().await {
            inner.queue.disable_loop().await;
            inner.loop_changed(false);
            return LoopOutcome::NoLongerLooping;
        }

        match &core.current {
            Some(current) => {
                let entry = QueueEntry::new(current.track.clone(), current.requested_by.clone());
                inner.queue.enable_loop(entry).await;
                inner.loop_changed(true);
                LoopOutcome::NowLooping
            }
            None => LoopOutcome::NothingToLoop,
        }
    }

    /// Stop playback and drop the current entry; the queue is kept
    pub async fn stop(&self) {
        let inner = &self.inner;
        let mut core = inner.core.lock().await;

        inner.interrupt_and_await(&mut core).await;
        if let Some(entry) = core.held.take() {
            entry.dispose();
        }
        core.current = None;
        inner.reset_progress(&mut core);

        if inner.queue.is_looping().await {
            inner.queue.disable_loop().await;
            inner.loop_changed(false);
        }
        inner.set_state(PlaybackState::Idle);
        info!(guild = inner.guild_id, "Stopped");
    }

    pub async fn now_playing(&self) -> NowPlaying {
        let inner = &self.inner;
        let core = inner.core.lock().await;
        NowPlaying {
            entry: core.current.clone(),
            state: inner.state(),
            elapsed_secs: inner.elapsed_secs(&core),
            looping: inner.queue.is_looping().await,
        }
    }

    /// Elapsed seconds of the current entry, -1 when nothing is loaded
    pub async fn progress(&self) -> i64 {
        let core = self.inner.core.lock().await;
        self.inner.elapsed_secs(&core)
    }
}

impl PlayerInner {
    fn state(&self) -> PlaybackState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, new_state: PlaybackState) {
        let old_state = self.state_tx.send_replace(new_state);
        if old_state != new_state {
            debug!(guild = self.guild_id, %old_state, %new_state, "Playback state changed");
            self.events.broadcast_event(PlayerEvent::PlaybackStateChanged {
                guild_id: self.guild_id,
                old_state,
                new_state,
                timestamp: time::now(),
            });
        }
    }

    fn elapsed_secs(&self, core: &PlayerCore) -> i64 {
        if core.current.is_none() {
            return -1;
        }
        let from_bytes = self.bytes_read.load(Ordering::Relaxed) / BYTES_PER_SECOND;
        (from_bytes + core.seek_baseline.as_secs()) as i64
    }

    fn reset_progress(&self, core: &mut PlayerCore) {
        self.bytes_read.store(0, Ordering::Relaxed);
        core.seek_baseline = Duration::ZERO;
    }

    fn loop_changed(&self, looping: bool) {
        self.events.broadcast_event(PlayerEvent::LoopChanged {
            guild_id: self.guild_id,
            looping,
            timestamp: time::now(),
        });
    }

    fn track_started(&self, entry: &QueueEntry) {
        self.events.broadcast_event(PlayerEvent::TrackStarted {
            guild_id: self.guild_id,
            media_id: entry.track.media_id.clone(),
            title: entry.track.title.clone(),
            timestamp: time::now(),
        });
    }

    fn track_finished(&self, entry: &QueueEntry) {
        self.events.broadcast_event(PlayerEvent::TrackFinished {
            guild_id: self.guild_id,
            media_id: entry.track.media_id.clone(),
            timestamp: time::now(),
        });
    }

    /// Cancel the running task (if any), wait for it, and reclaim its entry
    async fn interrupt_and_await(&self, core: &mut PlayerCore) {
        core.token.cancel();
        core.token = CancellationToken::new();

        let Some(task) = core.task.take() else {
            return;
        };

        match task.await {
            Ok(TaskExit::Interrupted(entry)) => {
                if let Some(stale) = core.held.replace(entry) {
                    stale.dispose();
                }
            }
            Ok(TaskExit::Done) => core.current = None,
            Err(e) => {
                warn!(guild = self.guild_id, "Player task failed: {}", e);
                core.current = None;
            }
        }
    }

    /// Connect and launch a task for the held entry or the queue
    async fn start(
        self: &Arc<Self>,
        mut core: OwnedMutexGuard<PlayerCore>,
        channel: ChannelId,
    ) -> CommandStatus {
        let link = match self.connection.connect(channel).await {
            Ok(link) => link,
            Err(e) => {
                warn!(guild = self.guild_id, channel, "Could not connect: {}", e);
                return CommandStatus::Disconnected;
            }
        };

        let first = match core.held.take() {
            Some(entry) => StartWith::Resume(entry),
            None => StartWith::Queue,
        };
        self.launch(core, link, first);
        CommandStatus::Ok
    }

    /// Spawn a player task and hand it the command lock
    fn launch(
        self: &Arc<Self>,
        mut core: OwnedMutexGuard<PlayerCore>,
        link: Arc<dyn VoiceLink>,
        first: StartWith,
    ) {
        let token = core.token.clone();
        let (guard_tx, guard_rx) = oneshot::channel::<OwnedMutexGuard<PlayerCore>>();
        let this = Arc::clone(self);

        let task = tokio::spawn(async move {
            match guard_rx.await {
                Ok(core) => this.run(core, link, token, first).await,
                Err(_) => TaskExit::Done,
            }
        });

        // The handle must be stored before the task may release the lock
        core.task = Some(task);
        let _ = guard_tx.send(core);
    }

    /// Player task body
    async fn run(
        self: Arc<Self>,
        mut core: OwnedMutexGuard<PlayerCore>,
        link: Arc<dyn VoiceLink>,
        token: CancellationToken,
        first: StartWith,
    ) -> TaskExit {
        let guild = self.guild_id;

        let (mut entry, mut fresh) = match first {
            StartWith::Resume(entry) => (entry, false),
            StartWith::Fresh(entry) => (entry, true),
            StartWith::Queue => match self.queue.try_dequeue().await {
                Some(entry) => (entry, true),
                None => {
                    self.finish_idle(&mut core);
                    return TaskExit::Done;
                }
            },
        };

        let mut sink = match link.open_sink().await {
            Ok(sink) => sink,
            Err(e) => {
                warn!(guild, "Could not open voice sink: {}", e);
                core.current = Some(entry.info());
                self.set_state(PlaybackState::Paused);
                return TaskExit::Interrupted(entry);
            }
        };

        loop {
            if fresh {
                self.reset_progress(&mut core);
            }

            // Preload missed or failed: this is the one retry
            if !entry.is_preloaded() {
                match self.loader.load(&entry.track, core.seek_baseline).await {
                    Some(decoder) => entry.attach_decoder(decoder),
                    None => {
                        warn!(guild, media_id = %entry.track.media_id, "Decoder unavailable, skipping entry");
                        if self.queue.is_looping().await {
                            self.queue.disable_loop().await;
                            self.loop_changed(false);
                        }
                        match self.queue.try_dequeue().await {
                            Some(next) => {
                                entry = next;
                                fresh = true;
                                continue;
                            }
                            None => {
                                self.finish_idle(&mut core);
                                return TaskExit::Done;
                            }
                        }
                    }
                }
            }

            core.current = Some(entry.info());
            self.set_state(PlaybackState::Playing);
            if fresh {
                info!(guild, media_id = %entry.track.media_id, title = entry.track.display_title(), "Now playing");
                self.track_started(&entry);
            }
            drop(core);

            let outcome = match entry.decoder_mut().and_then(|d| d.reader()) {
                Some(reader) => copy_to_sink(reader, sink.as_mut(), &self.bytes_read, &token).await,
                None => CopyOutcome::ReadFailed,
            };

            match outcome {
                CopyOutcome::Cancelled => {
                    debug!(guild, media_id = %entry.track.media_id, "Playback interrupted");
                    self.set_state(PlaybackState::Paused);
                    return TaskExit::Interrupted(entry);
                }
                CopyOutcome::Finished | CopyOutcome::ReadFailed => {
                    debug!(guild, media_id = %entry.track.media_id, ?outcome, "Entry ended");
                    entry.dispose_decoder();
                    self.track_finished(&entry);
                }
            }

            // A canceller holding the lock is waiting on this task
            core = tokio::select! {
                biased;
                _ = token.cancelled() => return TaskExit::Done,
                core = Arc::clone(&self.core).lock_owned() => core,
            };

            match self.queue.try_dequeue().await {
                Some(next) => {
                    entry = next;
                    fresh = true;
                }
                None => {
                    self.finish_idle(&mut core);
                    return TaskExit::Done;
                }
            }
        }
    }

    fn finish_idle(&self, core: &mut PlayerCore) {
        core.current = None;
        self.reset_progress(core);
        self.set_state(PlaybackState::Idle);
        debug!(guild = self.guild_id, "Queue exhausted");
    }
}
