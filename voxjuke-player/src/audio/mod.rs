//! Decoder processes and the PCM copy loop
//!
//! - [`decoder`]: spawning and tearing down external decoder processes
//! - [`loader`]: resolving a track to a playable URL and starting its decoder
//! - [`pump`]: moving PCM from a decoder to a voice sink under cancellation

pub mod decoder;
pub mod loader;
pub mod pump;

pub use decoder::{
    DecoderHandle, FfmpegTranscoder, Transcoder, BYTES_PER_SECOND, CHANNELS, CHUNK_SIZE,
    SAMPLE_RATE,
};
pub use loader::StreamLoader;
pub use pump::{copy_to_sink, CopyOutcome};
