//! Headless controller for the chiptone player.
//!
//! Provides one API for loading sequence files, real-time playback and
//! offline rendering that the CLI and tests share.

mod wav;

use ct_audio::{AudioOutput, CpalOutput};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

// Re-export common types so callers don't need the lower crates directly.
pub use ct_audio::AudioError;
pub use ct_engine::Engine;
pub use ct_formats::FormatError;
pub use ct_ir::Sequence;

pub use wav::{samples_to_wav, write_wav};

/// Frames rendered per engine call.
const BLOCK_FRAMES: usize = 512;

/// Rate used to validate a file before the output device is known.
const VALIDATION_SAMPLE_RATE: u32 = 44100;

/// Error type for controller operations.
#[derive(Debug, thiserror::Error)]
pub enum MasterError {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Audio(#[from] AudioError),
    #[error("wav export failed: {0}")]
    Wav(#[from] hound::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("no sequence loaded")]
    NothingLoaded,
    #[error("invalid render settings: {0}")]
    InvalidConfig(&'static str),
    #[error("audio thread panicked")]
    ThreadPanicked,
}

/// Settings for offline rendering.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderConfig {
    /// Output sample rate; event times are quantized to it
    pub sample_rate: u32,
    /// Interleaved output channels, each carrying the same mono mix
    pub channels: u16,
    /// Rendering stops after this many seconds even if voices are still busy
    pub max_seconds: u32,
    /// Noise seed; `None` draws one from OS entropy
    pub seed: Option<u64>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
            max_seconds: 300,
            seed: None,
        }
    }
}

impl RenderConfig {
    fn validate(&self) -> Result<(), MasterError> {
        if self.sample_rate == 0 {
            return Err(MasterError::InvalidConfig("sample rate must be above zero"));
        }
        if self.channels == 0 {
            return Err(MasterError::InvalidConfig("at least one output channel is required"));
        }
        Ok(())
    }

    fn max_frames(&self) -> usize {
        self.sample_rate as usize * self.max_seconds as usize
    }
}

/// Snapshot of real-time playback position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaybackProgress {
    /// Samples rendered so far
    pub playback_tick: u64,
    /// Sequence length in samples at the device rate
    pub length_samples: u64,
}

impl PlaybackProgress {
    /// Completed fraction in [0, 1]; zero for an empty sequence.
    pub fn fraction(&self) -> f32 {
        if self.length_samples == 0 {
            return 0.0;
        }
        (self.playback_tick as f64 / self.length_samples as f64).min(1.0) as f32
    }

    pub fn percent(&self) -> u32 {
        (self.fraction() * 100.0) as u32
    }
}

fn make_engine(sequence: Sequence, seed: Option<u64>) -> Engine {
    match seed {
        Some(seed) => Engine::seeded(sequence, seed),
        None => Engine::new(sequence),
    }
}

/// Parse `data` and render it to interleaved samples.
///
/// Stops when every voice has finished or after `config.max_seconds`,
/// whichever comes first. The final block is kept whole, so the output can
/// run up to one block past the last event.
pub fn render_samples(data: &[u8], config: &RenderConfig) -> Result<Vec<f32>, MasterError> {
    config.validate()?;
    let sequence = ct_formats::load_smf(data, config.sample_rate)?;
    let channels = config.channels as usize;
    let max_frames = config.max_frames();
    let mut engine = make_engine(sequence, config.seed);

    let mut samples = Vec::with_capacity(max_frames.min(engine.length_samples() as usize) * channels);
    let mut block = vec![0.0f32; BLOCK_FRAMES * channels];
    let mut frames = 0;

    while frames < max_frames {
        let count = BLOCK_FRAMES.min(max_frames - frames);
        let playing = engine.render(count, config.sample_rate, channels, &mut block);
        samples.extend_from_slice(&block[..count * channels]);
        frames += count;
        if !playing {
            break;
        }
    }

    debug!(
        frames,
        finished = engine.is_finished(),
        sample_rate = config.sample_rate,
        "offline render complete"
    );
    Ok(samples)
}

/// Headless controller: owns the loaded file and manages playback.
pub struct Controller {
    data: Vec<u8>,
    sequence: Option<Sequence>,
    seed: Option<u64>,
    playback: Option<PlaybackHandle>,
}

struct PlaybackHandle {
    stop_signal: Arc<AtomicBool>,
    playback_tick: Arc<AtomicU64>,
    length_samples: Arc<AtomicU64>,
    finished: Arc<AtomicBool>,
    thread: Option<JoinHandle<Result<(), MasterError>>>,
}

impl Controller {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            sequence: None,
            seed: None,
            playback: None,
        }
    }

    // --- Loading ---

    /// Validate and keep a sequence file.
    ///
    /// The file is parsed once here so errors surface before playback. It is
    /// parsed again at the output rate when playback or rendering starts.
    pub fn load(&mut self, data: Vec<u8>) -> Result<&Sequence, FormatError> {
        self.stop();
        let sequence = ct_formats::load_smf(&data, VALIDATION_SAMPLE_RATE)?;
        info!(
            tracks = sequence.tracks,
            events = sequence.event_count(),
            seconds = sequence.duration_secs(),
            "sequence loaded"
        );
        self.data = data;
        Ok(self.sequence.insert(sequence))
    }

    /// Read and load a sequence file from disk.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<&Sequence, MasterError> {
        let data = std::fs::read(path)?;
        Ok(self.load(data)?)
    }

    /// The loaded sequence, as parsed for validation.
    pub fn sequence(&self) -> Option<&Sequence> {
        self.sequence.as_ref()
    }

    /// Seed for the noise voice in later playback and renders.
    pub fn set_seed(&mut self, seed: Option<u64>) {
        self.seed = seed;
    }

    // --- Real-time playback ---

    /// Start playback on the default output device.
    ///
    /// Returns once the device is open and the file is parsed at its rate;
    /// failures up to that point are returned here. Errors during playback
    /// are reported by [`Controller::finish`].
    pub fn play(&mut self) -> Result<(), MasterError> {
        self.play_on(open_default_output)
    }

    fn play_on<O, F>(&mut self, open: F) -> Result<(), MasterError>
    where
        O: AudioOutput,
        F: FnOnce() -> Result<O, AudioError> + Send + 'static,
    {
        self.stop();
        if self.sequence.is_none() {
            return Err(MasterError::NothingLoaded);
        }

        let data = self.data.clone();
        let seed = self.seed;
        let stop_signal = Arc::new(AtomicBool::new(false));
        let playback_tick = Arc::new(AtomicU64::new(0));
        let length_samples = Arc::new(AtomicU64::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let shared = SharedState {
            stop: stop_signal.clone(),
            tick: playback_tick.clone(),
            length: length_samples.clone(),
            done: finished.clone(),
        };

        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let thread = std::thread::spawn(move || {
            let result = match start_playback(open, &data, seed, &shared) {
                Ok((output, engine)) => {
                    let _ = ready_tx.send(Ok(()));
                    stream_blocks(output, engine, &shared)
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                    Ok(())
                }
            };
            shared.done.store(true, Ordering::Relaxed);
            result
        });

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let _ = thread.join();
                return Err(err);
            }
            // The thread dropped the sender without reporting, so it panicked.
            Err(_) => {
                let _ = thread.join();
                return Err(MasterError::ThreadPanicked);
            }
        }

        self.playback = Some(PlaybackHandle {
            stop_signal,
            playback_tick,
            length_samples,
            finished,
            thread: Some(thread),
        });
        Ok(())
    }

    /// Wait for playback to end on its own and report how it ended.
    ///
    /// Does nothing if nothing is playing.
    pub fn finish(&mut self) -> Result<(), MasterError> {
        let Some(mut pb) = self.playback.take() else {
            return Ok(());
        };
        match pb.thread.take() {
            Some(handle) => handle.join().map_err(|_| MasterError::ThreadPanicked)?,
            None => Ok(()),
        }
    }

    /// Stop playback and wait for the audio thread to exit.
    pub fn stop(&mut self) {
        if let Some(pb) = self.playback.as_ref() {
            pb.stop_signal.store(true, Ordering::Relaxed);
        }
        if let Err(err) = self.finish() {
            warn!(%err, "playback ended with an error");
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playback
            .as_ref()
            .is_some_and(|p| !p.finished.load(Ordering::Relaxed))
    }

    pub fn is_finished(&self) -> bool {
        self.playback
            .as_ref()
            .is_some_and(|p| p.finished.load(Ordering::Relaxed))
    }

    pub fn progress(&self) -> Option<PlaybackProgress> {
        let pb = self.playback.as_ref()?;
        Some(PlaybackProgress {
            playback_tick: pb.playback_tick.load(Ordering::Relaxed),
            length_samples: pb.length_samples.load(Ordering::Relaxed),
        })
    }

    // --- Offline rendering ---

    /// Render the loaded sequence to interleaved samples.
    pub fn render_samples(&self, config: &RenderConfig) -> Result<Vec<f32>, MasterError> {
        if self.sequence.is_none() {
            return Err(MasterError::NothingLoaded);
        }
        let config = RenderConfig {
            seed: config.seed.or(self.seed),
            ..*config
        };
        render_samples(&self.data, &config)
    }

    /// Render the loaded sequence to an in-memory WAV file.
    pub fn render_to_wav(&self, config: &RenderConfig) -> Result<Vec<u8>, MasterError> {
        let samples = self.render_samples(config)?;
        Ok(samples_to_wav(&samples, config.sample_rate, config.channels)?)
    }

    /// Render the loaded sequence to a WAV file at `path`.
    pub fn export_wav(&self, path: impl AsRef<Path>, config: &RenderConfig) -> Result<(), MasterError> {
        let samples = self.render_samples(config)?;
        write_wav(path, &samples, config.sample_rate, config.channels)?;
        Ok(())
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Atomics shared between the controller and its audio thread.
struct SharedState {
    stop: Arc<AtomicBool>,
    tick: Arc<AtomicU64>,
    length: Arc<AtomicU64>,
    done: Arc<AtomicBool>,
}

fn open_default_output() -> Result<CpalOutput, AudioError> {
    let (mut output, consumer) = CpalOutput::new()?;
    output.build_stream(consumer)?;
    Ok(output)
}

/// Open the output and parse the file at its rate.
fn start_playback<O, F>(
    open: F,
    data: &[u8],
    seed: Option<u64>,
    shared: &SharedState,
) -> Result<(O, Engine), MasterError>
where
    O: AudioOutput,
    F: FnOnce() -> Result<O, AudioError>,
{
    let output = open()?;
    if output.channels() == 0 {
        return Err(AudioError::DeviceInit("device reports zero channels".into()).into());
    }

    // Event times depend on the output rate, so parse again now that it is known.
    let sequence = ct_formats::load_smf(data, output.sample_rate())?;
    shared.length.store(sequence.length_samples as u64, Ordering::Relaxed);
    Ok((output, make_engine(sequence, seed)))
}

fn stream_blocks<O: AudioOutput>(
    mut output: O,
    mut engine: Engine,
    shared: &SharedState,
) -> Result<(), MasterError> {
    let sample_rate = output.sample_rate();
    let channels = output.channels();

    output.start()?;
    info!(sample_rate, channels, "playback started");

    let mut block = vec![0.0f32; BLOCK_FRAMES * channels];
    let mut playing = true;

    while playing && !shared.stop.load(Ordering::Relaxed) {
        playing = engine.render(BLOCK_FRAMES, sample_rate, channels, &mut block);
        output.write(&block)?;
        shared.tick.store(engine.playback_tick(), Ordering::Relaxed);
    }

    if !playing {
        // Let the device drain what is queued before the stream is dropped.
        block.fill(0.0);
        for _ in 0..(sample_rate as usize / BLOCK_FRAMES).max(1) {
            if shared.stop.load(Ordering::Relaxed) {
                break;
            }
            output.write(&block)?;
        }
        info!("playback finished");
    }

    output.stop()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ct_formats::{SmfBuilder, TrackBuilder};
    use std::time::Duration;

    fn one_beat() -> Vec<u8> {
        SmfBuilder::new(1, 96)
            .track(
                TrackBuilder::new()
                    .note_on(0, 0, 60, 127)
                    .note_off(96, 0, 60, 0)
                    .end_of_track(0),
            )
            .build()
    }

    #[test]
    fn default_render_config() {
        let config = RenderConfig::default();
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.channels, 2);
        assert_eq!(config.max_seconds, 300);
        assert_eq!(config.seed, None);
    }

    #[test]
    fn load_reports_parse_errors() {
        let mut ctrl = Controller::new();
        assert!(ctrl.load(b"not a midi file".to_vec()).is_err());
        assert!(ctrl.sequence().is_none());

        let seq = ctrl.load(one_beat()).unwrap();
        assert_eq!(seq.tracks, 1);
        assert_eq!(seq.length_samples, 22050);
    }

    #[test]
    fn render_requires_a_loaded_file() {
        let ctrl = Controller::new();
        assert!(matches!(
            ctrl.render_samples(&RenderConfig::default()),
            Err(MasterError::NothingLoaded)
        ));
    }

    #[test]
    fn render_stops_after_last_event() {
        let mut ctrl = Controller::new();
        ctrl.load(one_beat()).unwrap();
        let config = RenderConfig {
            seed: Some(1),
            ..RenderConfig::default()
        };
        let samples = ctrl.render_samples(&config).unwrap();

        let frames = samples.len() / 2;
        assert_eq!(frames % BLOCK_FRAMES, 0);
        assert!(frames >= 22050 && frames < 22050 + BLOCK_FRAMES);
        assert!(samples.chunks_exact(2).all(|f| f[0] == f[1]));
    }

    #[test]
    fn render_honors_time_cap() {
        let config = RenderConfig {
            sample_rate: 8000,
            channels: 1,
            max_seconds: 1,
            seed: Some(1),
        };
        let data = SmfBuilder::new(1, 96)
            .track(TrackBuilder::new().note_on(0, 0, 60, 127).end_of_track(96 * 8))
            .build();
        let samples = render_samples(&data, &config).unwrap();
        assert_eq!(samples.len(), 8000);
    }

    #[test]
    fn render_rejects_empty_output_layouts() {
        let no_channels = RenderConfig {
            channels: 0,
            ..RenderConfig::default()
        };
        assert!(matches!(
            render_samples(&one_beat(), &no_channels),
            Err(MasterError::InvalidConfig(_))
        ));

        let no_rate = RenderConfig {
            sample_rate: 0,
            ..RenderConfig::default()
        };
        assert!(matches!(
            render_samples(&one_beat(), &no_rate),
            Err(MasterError::InvalidConfig(_))
        ));
    }

    /// Takes every sample immediately and counts them.
    struct NullOutput {
        written: Arc<AtomicU64>,
    }

    impl AudioOutput for NullOutput {
        fn sample_rate(&self) -> u32 {
            8000
        }
        fn channels(&self) -> usize {
            1
        }
        fn write(&mut self, samples: &[f32]) -> Result<(), AudioError> {
            self.written.fetch_add(samples.len() as u64, Ordering::Relaxed);
            Ok(())
        }
        fn start(&mut self) -> Result<(), AudioError> {
            Ok(())
        }
        fn stop(&mut self) -> Result<(), AudioError> {
            Ok(())
        }
    }

    /// A device that never drains its queue.
    struct StalledOutput;

    impl AudioOutput for StalledOutput {
        fn sample_rate(&self) -> u32 {
            8000
        }
        fn channels(&self) -> usize {
            2
        }
        fn write(&mut self, _samples: &[f32]) -> Result<(), AudioError> {
            Err(AudioError::Stalled(Duration::from_millis(1)))
        }
        fn start(&mut self) -> Result<(), AudioError> {
            Ok(())
        }
        fn stop(&mut self) -> Result<(), AudioError> {
            Ok(())
        }
    }

    fn wait_until_done(ctrl: &Controller) {
        for _ in 0..5000 {
            if !ctrl.is_playing() {
                return;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        panic!("playback did not finish");
    }

    #[test]
    fn play_requires_a_loaded_file() {
        let mut ctrl = Controller::new();
        let written = Arc::new(AtomicU64::new(0));
        let result = ctrl.play_on(move || Ok(NullOutput { written }));
        assert!(matches!(result, Err(MasterError::NothingLoaded)));
    }

    #[test]
    fn play_returns_device_errors() {
        let mut ctrl = Controller::new();
        ctrl.load(one_beat()).unwrap();

        let result = ctrl.play_on(|| Err::<NullOutput, _>(AudioError::NoDevice));
        assert!(matches!(result, Err(MasterError::Audio(AudioError::NoDevice))));
        assert!(!ctrl.is_playing());
        assert!(ctrl.progress().is_none());
    }

    #[test]
    fn playback_runs_to_the_end() {
        let mut ctrl = Controller::new();
        ctrl.load(one_beat()).unwrap();
        ctrl.set_seed(Some(4));

        let written = Arc::new(AtomicU64::new(0));
        let counter = written.clone();
        ctrl.play_on(move || Ok(NullOutput { written: counter })).unwrap();
        wait_until_done(&ctrl);

        // One beat at 120 BPM is 4000 samples at 8 kHz.
        let progress = ctrl.progress().unwrap();
        assert_eq!(progress.length_samples, 4000);
        assert_eq!(progress.percent(), 100);
        assert!(ctrl.is_finished());

        ctrl.finish().unwrap();
        assert!(written.load(Ordering::Relaxed) > 4000);
        assert!(ctrl.progress().is_none());
    }

    #[test]
    fn stalled_output_error_reaches_the_caller() {
        let mut ctrl = Controller::new();
        ctrl.load(one_beat()).unwrap();

        ctrl.play_on(|| Ok(StalledOutput)).unwrap();
        wait_until_done(&ctrl);
        assert!(matches!(
            ctrl.finish(),
            Err(MasterError::Audio(AudioError::Stalled(_)))
        ));
    }

    #[test]
    fn stop_ends_a_long_playback() {
        let data = SmfBuilder::new(1, 96)
            .track(TrackBuilder::new().note_on(0, 0, 60, 127).end_of_track(96 * 100_000))
            .build();
        let mut ctrl = Controller::new();
        ctrl.load(data).unwrap();

        let written = Arc::new(AtomicU64::new(0));
        ctrl.play_on(move || Ok(NullOutput { written })).unwrap();
        assert!(ctrl.is_playing());
        ctrl.stop();
        assert!(!ctrl.is_playing());
        assert!(ctrl.finish().is_ok());
    }

    #[test]
    fn progress_fraction() {
        let p = PlaybackProgress {
            playback_tick: 50,
            length_samples: 200,
        };
        assert_eq!(p.fraction(), 0.25);
        assert_eq!(p.percent(), 25);

        let empty = PlaybackProgress {
            playback_tick: 10,
            length_samples: 0,
        };
        assert_eq!(empty.fraction(), 0.0);
    }

    #[test]
    fn export_writes_a_readable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("beat.wav");

        let mut ctrl = Controller::new();
        ctrl.load(one_beat()).unwrap();
        ctrl.set_seed(Some(9));
        ctrl.export_wav(&path, &RenderConfig::default()).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 44100);
        assert!(reader.duration() >= 22050);
    }
}
