//! Audio output trait and error types.

use std::time::Duration;

/// Error type for audio operations.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    /// Failed to query the output device
    #[error("device init error: {0}")]
    DeviceInit(String),
    /// Failed to create the output stream
    #[error("stream create error: {0}")]
    StreamCreate(String),
    /// Failed to start or pause the stream
    #[error("playback error: {0}")]
    Playback(String),
    /// No output device on the default host
    #[error("no audio device available")]
    NoDevice,
    /// The device stopped taking samples
    #[error("output stalled: no samples accepted for {0:?}")]
    Stalled(Duration),
}

/// Sink for interleaved `f32` samples.
pub trait AudioOutput {
    /// Output sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Samples per interleaved frame.
    fn channels(&self) -> usize;

    /// Queue interleaved samples, blocking until all of them are accepted.
    ///
    /// Fails with [`AudioError::Stalled`] if the device stops draining.
    fn write(&mut self, samples: &[f32]) -> Result<(), AudioError>;

    /// Start playback.
    fn start(&mut self) -> Result<(), AudioError>;

    /// Stop playback.
    fn stop(&mut self) -> Result<(), AudioError>;
}
