//! PCM copy loop
//!
//! Reads fixed-size chunks from a decoder and writes them to a voice sink.
//! Read failure ends the entry like EOF; write failure is reported the same
//! way as cancellation so a dropped voice connection pauses instead of
//! burning through the queue.

use crate::audio::decoder::CHUNK_SIZE;
use crate::voice::AudioSink;
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How a copy loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    /// Decoder reached end of stream
    Finished,
    /// Token cancelled, or the sink refused a write
    Cancelled,
    /// Decoder output failed mid-stream
    ReadFailed,
}

/// Copy decoder output to `sink` until EOF, failure or cancellation
///
/// `counter` is incremented for every chunk read, before it is written.
pub async fn copy_to_sink<R>(
    reader: &mut R,
    sink: &mut dyn AudioSink,
    counter: &AtomicU64,
    token: &CancellationToken,
) -> CopyOutcome
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let read = tokio::select! {
            biased;
            _ = token.cancelled() => return CopyOutcome::Cancelled,
            read = reader.read(&mut buf) => read,
        };

        let n = match read {
            Ok(0) => return CopyOutcome::Finished,
            Ok(n) => n,
            Err(e) => {
                debug!("Decoder read failed: {}", e);
                return CopyOutcome::ReadFailed;
            }
        };

        counter.fetch_add(n as u64, Ordering::Relaxed);
        let frame = Bytes::copy_from_slice(&buf[..n]);

        let written = tokio::select! {
            biased;
            _ = token.cancelled() => return CopyOutcome::Cancelled,
            written = sink.write_frame(frame) => written,
        };

        if let Err(e) = written {
            debug!("Sink write failed: {}", e);
            return CopyOutcome::Cancelled;
        }
    }
}
