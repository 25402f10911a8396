//! Guild sessions
//!
//! A [`GuildSession`] bundles everything one guild needs to play audio: its
//! queue, player, voice connection and volume. The [`SessionRegistry`] creates
//! sessions on first use and shares the resolver, transcoder, voice gateway and
//! event bus between them.

use crate::audio::{StreamLoader, Transcoder};
use crate::error::Result;
use crate::media::MediaResolver;
use crate::playback::{CommandStatus, EntryInfo, PlaybackQueue, Player, QueueEntry};
use crate::state::{EventBus, Volume};
use crate::voice::{ChannelId, ConnectionEvent, ConnectionManager, GuildId, VoiceGateway};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, RwLock};
use tracing::info;
use voxjuke_common::events::PlayerEvent;
use voxjuke_common::time;

/// Collaborators shared by every session
#[derive(Clone)]
pub struct SessionServices {
    pub resolver: Arc<dyn MediaResolver>,
    pub transcoder: Arc<dyn Transcoder>,
    pub gateway: Arc<dyn VoiceGateway>,
    pub events: EventBus,
    /// Initial volume for new sessions (0.0-1.0)
    pub default_volume: f32,
}

/// Playback session for one guild
pub struct GuildSession {
    guild_id: GuildId,
    player: Player,
    queue: PlaybackQueue,
    connection: Arc<ConnectionManager>,
    loader: StreamLoader,
    events: EventBus,
}

impl GuildSession {
    pub fn new(guild_id: GuildId, services: &SessionServices) -> Arc<Self> {
        let volume = Volume::new(services.default_volume);
        let loader = StreamLoader::new(
            Arc::clone(&services.resolver),
            Arc::clone(&services.transcoder),
            volume,
        );
        let queue = PlaybackQueue::new(guild_id, loader.clone(), services.events.clone());
        let (connection, connection_events) = ConnectionManager::new(
            guild_id,
            Arc::clone(&services.gateway),
            services.events.clone(),
        );
        let connection = Arc::new(connection);
        let player = Player::new(
            guild_id,
            queue.clone(),
            Arc::clone(&connection),
            loader.clone(),
            services.events.clone(),
        );

        let session = Arc::new(Self {
            guild_id,
            player,
            queue,
            connection,
            loader,
            events: services.events.clone(),
        });
        spawn_connection_listener(Arc::downgrade(&session), connection_events);
        session
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    pub fn queue(&self) -> &PlaybackQueue {
        &self.queue
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// Resolve a query into a new queue entry
    ///
    /// Touches neither the queue nor the player, so a failed lookup leaves
    /// playback as it was.
    pub async fn resolve(&self, query: &str, requested_by: Option<String>) -> Result<QueueEntry> {
        let track = self.loader.resolver().resolve(query).await?;
        Ok(QueueEntry::new(track, requested_by))
    }

    /// Resolve `query` (if any), enqueue it and start playback in `channel`
    pub async fn play(
        &self,
        channel: ChannelId,
        query: Option<&str>,
        requested_by: Option<String>,
    ) -> Result<(CommandStatus, Option<EntryInfo>)> {
        let entry = match query {
            Some(query) => Some(self.resolve(query, requested_by).await?),
            None => None,
        };
        let info = entry.as_ref().map(QueueEntry::info);
        let status = self.player.play(entry, channel).await;
        Ok((status, info))
    }

    /// Stop playback and leave the voice channel; the queue is kept
    pub async fn leave(&self) {
        self.player.stop().await;
        self.connection.disconnect().await;
    }

    /// Volume on the 0-100 scale
    pub fn volume_percent(&self) -> u8 {
        self.loader.volume().percent()
    }

    /// Set volume on the 0-100 scale; applies to decoders started from now on
    pub fn set_volume_percent(&self, percent: u8) -> u8 {
        let volume = self.loader.volume().set(f32::from(percent.min(100)) / 100.0);
        info!(guild = self.guild_id, volume, "Volume changed");
        self.events.broadcast_event(PlayerEvent::VolumeChanged {
            guild_id: self.guild_id,
            volume,
            timestamp: time::now(),
        });
        self.loader.volume().percent()
    }
}

fn spawn_connection_listener(
    session: Weak<GuildSession>,
    mut events: mpsc::UnboundedReceiver<ConnectionEvent>,
) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let Some(session) = session.upgrade() else {
                break;
            };
            match event {
                ConnectionEvent::LeftAlone { channel } => {
                    // Ignore reports from a link that was already replaced
                    if session.connection.current_channel().await != Some(channel) {
                        continue;
                    }
                    info!(guild = session.guild_id, channel, "Alone in channel, leaving");
                    session.leave().await;
                }
            }
        }
    });
}

/// All guild sessions of this process
pub struct SessionRegistry {
    services: SessionServices,
    sessions: RwLock<HashMap<GuildId, Arc<GuildSession>>>,
}

impl SessionRegistry {
    pub fn new(services: SessionServices) -> Self {
        Self {
            services,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.services.events
    }

    pub async fn get(&self, guild_id: GuildId) -> Option<Arc<GuildSession>> {
        self.sessions.read().await.get(&guild_id).cloned()
    }

    pub async fn get_or_create(&self, guild_id: GuildId) -> Arc<GuildSession> {
        if let Some(session) = self.get(guild_id).await {
            return session;
        }

        let mut sessions = self.sessions.write().await;
        Arc::clone(sessions.entry(guild_id).or_insert_with(|| {
            info!(guild = guild_id, "Creating guild session");
            GuildSession::new(guild_id, &self.services)
        }))
    }

    /// Stop every session and leave all voice channels
    pub async fn shutdown(&self) {
        let sessions: Vec<_> = self.sessions.read().await.values().cloned().collect();
        for session in sessions {
            session.leave().await;
        }
    }
}
