//! CPAL-based audio output backend.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error};

use crate::traits::{AudioError, AudioOutput};

/// How long `write` waits for the device to free space before giving up.
const STALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Pause between attempts while the queue is full.
const RETRY_INTERVAL: Duration = Duration::from_millis(1);

/// CPAL-based audio output on the default device.
///
/// Samples are interleaved at the device's native channel count and pass
/// through a ring buffer holding about 100ms of audio.
pub struct CpalOutput {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    producer: HeapProd<f32>,
    running: Arc<AtomicBool>,
}

impl CpalOutput {
    /// Open the default output device.
    ///
    /// Returns the output together with the consumer half of the sample
    /// queue, which must be handed to [`CpalOutput::build_stream`].
    pub fn new() -> Result<(Self, HeapCons<f32>), AudioError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;

        let config: StreamConfig = device
            .default_output_config()
            .map_err(|e| AudioError::DeviceInit(e.to_string()))?
            .into();

        debug!(
            device = %device.name().unwrap_or_else(|_| "unknown".into()),
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            "opened output device"
        );

        let buffer_size = (config.sample_rate.0 as usize / 10) * config.channels as usize;
        let rb = HeapRb::<f32>::new(buffer_size.max(1));
        let (producer, consumer) = rb.split();

        let output = Self {
            device,
            config,
            stream: None,
            producer,
            running: Arc::new(AtomicBool::new(false)),
        };

        Ok((output, consumer))
    }

    /// Build and start the audio stream.
    pub fn build_stream(&mut self, mut consumer: HeapCons<f32>) -> Result<(), AudioError> {
        let running = self.running.clone();

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if !running.load(Ordering::Relaxed) {
                        data.fill(0.0);
                        return;
                    }
                    let written = consumer.pop_slice(data);
                    data[written..].fill(0.0);
                },
                |err| error!(%err, "audio stream error"),
                None,
            )
            .map_err(|e| AudioError::StreamCreate(e.to_string()))?;

        stream.play().map_err(|e| AudioError::Playback(e.to_string()))?;
        self.stream = Some(stream);

        Ok(())
    }

    /// Queue samples, waiting while the ring buffer is full.
    ///
    /// Fails once `timeout` passes without the device taking any samples.
    pub fn write_timeout(&mut self, samples: &[f32], timeout: Duration) -> Result<(), AudioError> {
        push_with_timeout(&mut self.producer, samples, timeout)
    }
}

fn push_with_timeout<P>(
    producer: &mut P,
    mut samples: &[f32],
    timeout: Duration,
) -> Result<(), AudioError>
where
    P: Producer<Item = f32>,
{
    let mut last_progress = Instant::now();
    while !samples.is_empty() {
        let pushed = producer.push_slice(samples);
        samples = &samples[pushed..];
        if pushed > 0 {
            last_progress = Instant::now();
        } else if last_progress.elapsed() >= timeout {
            debug!(?timeout, pending = samples.len(), "output stopped draining");
            return Err(AudioError::Stalled(timeout));
        } else {
            std::thread::sleep(RETRY_INTERVAL);
        }
    }
    Ok(())
}

impl AudioOutput for CpalOutput {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    fn channels(&self) -> usize {
        self.config.channels as usize
    }

    fn write(&mut self, samples: &[f32]) -> Result<(), AudioError> {
        self.write_timeout(samples, STALL_TIMEOUT)
    }

    fn start(&mut self) -> Result<(), AudioError> {
        self.running.store(true, Ordering::Relaxed);
        if let Some(ref stream) = self.stream {
            stream.play().map_err(|e| AudioError::Playback(e.to_string()))?;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.running.store(false, Ordering::Relaxed);
        if let Some(ref stream) = self.stream {
            stream.pause().map_err(|e| AudioError::Playback(e.to_string()))?;
        }
        Ok(())
    }
}
