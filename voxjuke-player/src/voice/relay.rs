//! TCP voice relay transport
//!
//! The bot does not speak the chat platform's voice protocol itself; a relay
//! sidecar does. Per connection the protocol is:
//!
//! - client → relay: one line `JOIN <guild> <channel>\n`, then raw s16le
//!   48 kHz stereo PCM for the rest of the connection
//! - relay → client: lines `MEMBERS <n>\n` whenever the channel's member
//!   count changes
//!
//! Closing the socket leaves the channel.

use crate::error::{Error, Result};
use crate::voice::{AudioSink, ChannelId, GuildId, VoiceGateway, VoiceLink};
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Frames buffered between the copy loop and the socket (about 1 s of audio)
const FRAME_BUFFER: usize = 50;

/// Gateway that opens one relay connection per voice join
#[derive(Debug, Clone)]
pub struct RelayGateway {
    addr: String,
}

impl RelayGateway {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

/// Parse a `MEMBERS <n>` line from the relay
fn parse_members_line(line: &str) -> Option<usize> {
    line.trim().strip_prefix("MEMBERS ")?.trim().parse().ok()
}

#[async_trait]
impl VoiceGateway for RelayGateway {
    async fn join(&self, guild: GuildId, channel: ChannelId) -> Result<Arc<dyn VoiceLink>> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| Error::Voice(format!("relay {} unreachable: {}", self.addr, e)))?;
        stream.set_nodelay(true)?;

        let (read_half, mut write_half) = stream.into_split();
        write_half
            .write_all(format!("JOIN {} {}\n", guild, channel).as_bytes())
            .await
            .map_err(|e| Error::Voice(format!("relay handshake failed: {}", e)))?;

        let (frame_tx, mut frame_rx) = mpsc::channel::<Bytes>(FRAME_BUFFER);
        let (members_tx, members_rx) = watch::channel(0usize);
        let connected = Arc::new(AtomicBool::new(true));
        let shutdown = CancellationToken::new();

        // Send loop: owns the write half
        {
            let connected = Arc::clone(&connected);
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                loop {
                    let frame = tokio::select! {
                        _ = shutdown.cancelled() => break,
                        frame = frame_rx.recv() => frame,
                    };
                    let Some(frame) = frame else { break };
                    if let Err(e) = write_half.write_all(&frame).await {
                        warn!(guild, channel, "Relay send failed: {}", e);
                        break;
                    }
                }
                connected.store(false, Ordering::SeqCst);
                shutdown.cancel();
                let _ = write_half.shutdown().await;
                debug!(guild, channel, "Relay send loop ended");
            });
        }

        // Receive loop: member count updates
        {
            let connected = Arc::clone(&connected);
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(read_half).lines();
                loop {
                    let line = tokio::select! {
                        _ = shutdown.cancelled() => break,
                        line = lines.next_line() => line,
                    };
                    match line {
                        Ok(Some(line)) => match parse_members_line(&line) {
                            Some(count) => {
                                let _ = members_tx.send(count);
                            }
                            None => debug!(guild, channel, "Ignoring relay line: {}", line),
                        },
                        Ok(None) | Err(_) => break,
                    }
                }
                connected.store(false, Ordering::SeqCst);
                shutdown.cancel();
            });
        }

        info!(guild, channel, relay = %self.addr, "Joined voice channel through relay");
        Ok(Arc::new(RelayLink {
            channel,
            connected,
            frames: frame_tx,
            members: members_rx,
            shutdown,
        }))
    }
}

struct RelayLink {
    channel: ChannelId,
    connected: Arc<AtomicBool>,
    frames: mpsc::Sender<Bytes>,
    members: watch::Receiver<usize>,
    shutdown: CancellationToken,
}

#[async_trait]
impl VoiceLink for RelayLink {
    fn channel(&self) -> ChannelId {
        self.channel
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn open_sink(&self) -> io::Result<Box<dyn AudioSink>> {
        if !self.is_connected() {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "relay closed"));
        }
        Ok(Box::new(RelaySink {
            frames: self.frames.clone(),
            shutdown: self.shutdown.clone(),
        }))
    }

    fn members(&self) -> watch::Receiver<usize> {
        self.members.clone()
    }

    async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.shutdown.cancel();
    }
}

struct RelaySink {
    frames: mpsc::Sender<Bytes>,
    shutdown: CancellationToken,
}

#[async_trait]
impl AudioSink for RelaySink {
    async fn write_frame(&mut self, frame: Bytes) -> io::Result<()> {
        let broken = || io::Error::new(io::ErrorKind::BrokenPipe, "relay closed");
        if self.shutdown.is_cancelled() {
            return Err(broken());
        }
        tokio::select! {
            _ = self.shutdown.cancelled() => Err(broken()),
            sent = self.frames.send(frame) => sent.map_err(|_| broken()),
        }
    }
}
