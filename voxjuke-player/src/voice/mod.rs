//! Voice transport
//!
//! The network side of a voice connection is an external collaborator; the
//! player only sees these traits. [`relay::RelayGateway`] is the production
//! implementation, talking to a voice relay sidecar over TCP.

pub mod connection;
pub mod relay;

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::sync::Arc;
use tokio::sync::watch;

pub use connection::{ConnectionEvent, ConnectionManager};
pub use relay::RelayGateway;

pub type GuildId = u64;
pub type ChannelId = u64;

/// Writable PCM stream bound to a live voice connection
#[async_trait]
pub trait AudioSink: Send {
    /// Write one frame of s16le stereo PCM
    ///
    /// An error means the connection is gone.
    async fn write_frame(&mut self, frame: Bytes) -> io::Result<()>;
}

/// One live voice channel connection
#[async_trait]
pub trait VoiceLink: Send + Sync {
    fn channel(&self) -> ChannelId;

    fn is_connected(&self) -> bool;

    async fn open_sink(&self) -> io::Result<Box<dyn AudioSink>>;

    /// Number of members in the channel, including the bot
    fn members(&self) -> watch::Receiver<usize>;

    /// Tear down the connection; idempotent
    async fn close(&self);
}

/// Establishes voice connections
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    async fn join(&self, guild: GuildId, channel: ChannelId) -> Result<Arc<dyn VoiceLink>>;
}
