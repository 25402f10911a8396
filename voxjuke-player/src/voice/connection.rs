//! Connection manager
//!
//! Holds at most one voice connection per guild. Connecting to the channel the
//! manager is already bound to reuses the link; a different channel tears the
//! old link down first. A watcher task follows the channel's member count and
//! reports [`ConnectionEvent::LeftAlone`] once only the bot remains.

use crate::error::Result;
use crate::state::EventBus;
use crate::voice::{ChannelId, GuildId, VoiceGateway, VoiceLink};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use voxjuke_common::events::PlayerEvent;
use voxjuke_common::time;

/// Notifications from the connection manager to its session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Everyone except the bot left the channel
    LeftAlone { channel: ChannelId },
}

#[derive(Default)]
struct ConnectionState {
    link: Option<Arc<dyn VoiceLink>>,
    watcher: Option<JoinHandle<()>>,
}

impl ConnectionState {
    async fn teardown(&mut self) -> Option<ChannelId> {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
        let link = self.link.take()?;
        let channel = link.channel();
        link.close().await;
        Some(channel)
    }
}

pub struct ConnectionManager {
    guild_id: GuildId,
    gateway: Arc<dyn VoiceGateway>,
    state: Mutex<ConnectionState>,
    events_tx: mpsc::UnboundedSender<ConnectionEvent>,
    bus: EventBus,
}

impl ConnectionManager {
    /// Create a manager and the receiver for its [`ConnectionEvent`]s
    pub fn new(
        guild_id: GuildId,
        gateway: Arc<dyn VoiceGateway>,
        bus: EventBus,
    ) -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let manager = Self {
            guild_id,
            gateway,
            state: Mutex::new(ConnectionState::default()),
            events_tx,
            bus,
        };
        (manager, events_rx)
    }

    /// Connect to `channel`, reusing a live link to the same channel
    pub async fn connect(&self, channel: ChannelId) -> Result<Arc<dyn VoiceLink>> {
        let mut state = self.state.lock().await;

        if let Some(link) = &state.link {
            if link.channel() == channel && link.is_connected() {
                return Ok(Arc::clone(link));
            }
        }

        if let Some(old) = state.teardown().await {
            info!(guild = self.guild_id, from = old, to = channel, "Switching voice channel");
        }

        let link = self.gateway.join(self.guild_id, channel).await?;
        state.watcher = Some(self.spawn_watcher(&link));
        state.link = Some(Arc::clone(&link));
        drop(state);

        info!(guild = self.guild_id, channel, "Voice connected");
        self.bus.broadcast_event(PlayerEvent::ConnectionChanged {
            guild_id: self.guild_id,
            channel_id: Some(channel),
            timestamp: time::now(),
        });
        Ok(link)
    }

    /// Drop the current connection; no-op when not connected
    pub async fn disconnect(&self) {
        let torn_down = self.state.lock().await.teardown().await;
        if let Some(channel) = torn_down {
            info!(guild = self.guild_id, channel, "Voice disconnected");
            self.bus.broadcast_event(PlayerEvent::ConnectionChanged {
                guild_id: self.guild_id,
                channel_id: None,
                timestamp: time::now(),
            });
        }
    }

    /// The current link, if it is still connected
    pub async fn current_link(&self) -> Option<Arc<dyn VoiceLink>> {
        let state = self.state.lock().await;
        state
            .link
            .as_ref()
            .filter(|link| link.is_connected())
            .map(Arc::clone)
    }

    pub async fn current_channel(&self) -> Option<ChannelId> {
        self.current_link().await.map(|link| link.channel())
    }

    fn spawn_watcher(&self, link: &Arc<dyn VoiceLink>) -> JoinHandle<()> {
        let mut members = link.members();
        let channel = link.channel();
        let events_tx = self.events_tx.clone();
        let guild_id = self.guild_id;

        tokio::spawn(async move {
            while members.changed().await.is_ok() {
                let count = *members.borrow_and_update();
                debug!(guild = guild_id, channel, count, "Channel member count changed");
                if count <= 1 {
                    info!(guild = guild_id, channel, "Left alone in voice channel");
                    let _ = events_tx.send(ConnectionEvent::LeftAlone { channel });
                    break;
                }
            }
        })
    }
}
