//! Decoder process wrapper
//!
//! An external transcoder (ffmpeg) turns a remote media URL into raw PCM on its
//! standard output. [`DecoderHandle`] owns the process and the reader over its
//! output; dropping a handle kills the process, and [`DecoderHandle::terminate`]
//! additionally waits for it to exit.

use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Output sample rate in Hz
pub const SAMPLE_RATE: u32 = 48_000;

/// Output channel count (stereo)
pub const CHANNELS: u32 = 2;

/// Bytes per sample (signed 16-bit little endian)
pub const BYTES_PER_SAMPLE: u32 = 2;

/// PCM bytes produced per second of audio
pub const BYTES_PER_SECOND: u64 = (SAMPLE_RATE * CHANNELS * BYTES_PER_SAMPLE) as u64;

/// Copy-loop chunk: 20 ms of audio
pub const CHUNK_SIZE: usize = (BYTES_PER_SECOND / 50) as usize;

type PcmReader = Box<dyn AsyncRead + Send + Unpin>;

/// Running decoder process and its PCM output
pub struct DecoderHandle {
    child: Option<Child>,
    reader: Option<PcmReader>,
}

impl DecoderHandle {
    /// Wrap a spawned child whose stdout was piped
    ///
    /// Returns `None` if stdout was not captured.
    pub fn from_child(mut child: Child) -> Option<Self> {
        let stdout = child.stdout.take()?;
        Some(Self {
            child: Some(child),
            reader: Some(Box::new(stdout)),
        })
    }

    /// Wrap an in-process PCM source (no OS process behind it)
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            child: None,
            reader: Some(Box::new(reader)),
        }
    }

    /// PCM output stream, `None` once terminated
    pub fn reader(&mut self) -> Option<&mut (dyn AsyncRead + Send + Unpin + 'static)> {
        self.reader.as_deref_mut()
    }

    /// OS process id, if the process is still owned
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(|c| c.id())
    }

    pub fn is_terminated(&self) -> bool {
        self.reader.is_none() && self.child.is_none()
    }

    /// Kill the process, wait for it to exit, and release its pipes
    ///
    /// Safe to call repeatedly and on processes that already exited. All
    /// errors are logged and swallowed.
    pub async fn terminate(&mut self) {
        self.reader.take();

        let Some(mut child) = self.child.take() else {
            return;
        };

        if let Err(e) = child.start_kill() {
            // Already exited and reaped
            debug!("Decoder kill skipped: {}", e);
        }
        match child.wait().await {
            Ok(status) => debug!("Decoder process exited: {}", status),
            Err(e) => debug!("Decoder wait failed: {}", e),
        }
    }

    /// Terminate on a background task so the caller never waits on teardown
    pub fn dispose(mut self) {
        if self.is_terminated() {
            return;
        }
        tokio::spawn(async move {
            self.terminate().await;
        });
    }
}

impl fmt::Debug for DecoderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderHandle")
            .field("pid", &self.pid())
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

/// Starts decoder processes
///
/// `input` is a URL or local path. Failures are logged and reported as `None`, never as errors: the
/// caller moves on to the next entry.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn spawn(&self, input: &str, volume: f32, seek: Duration) -> Option<DecoderHandle>;
}

/// ffmpeg-backed [`Transcoder`]
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    binary: String,
}

impl FfmpegTranscoder {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Build the ffmpeg argument list
    pub fn build_args(input: &str, volume: f32, seek: Duration) -> Vec<String> {
        let mut args: Vec<String> = vec!["-hide_banner".into(), "-loglevel".into(), "panic".into()];

        if !seek.is_zero() {
            args.push("-ss".into());
            args.push(seek.as_secs().to_string());
        }

        args.push("-i".into());
        args.push(input.to_string());

        args.push("-filter:a".into());
        args.push(format!("loudnorm, volume={:.2}", volume.clamp(0.0, 1.0)));

        args.extend([
            "-ac".to_string(),
            CHANNELS.to_string(),
            "-f".to_string(),
            "s16le".to_string(),
            "-ar".to_string(),
            SAMPLE_RATE.to_string(),
            "pipe:1".to_string(),
        ]);
        args
    }
}

/// Inputs without a scheme are treated as local files
fn is_local_path(input: &str) -> bool {
    !input.contains("://")
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn spawn(
        &self,
        input: &str,
        volume: f32,
        seek: Duration,
    ) -> Option<DecoderHandle> {
        if is_local_path(input) && !Path::new(input).exists() {
            warn!("Decoder input {} does not exist", input);
            return None;
        }

        let args = Self::build_args(input, volume, seek);
        debug!("Spawning {} {}", self.binary, args.join(" "));

        let child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();

        match child {
            Ok(child) => {
                let handle = DecoderHandle::from_child(child);
                if handle.is_none() {
                    warn!("Decoder started without a stdout pipe");
                }
                handle
            }
            Err(e) => {
                warn!("Failed to start decoder '{}': {}", self.binary, e);
                None
            }
        }
    }
}
