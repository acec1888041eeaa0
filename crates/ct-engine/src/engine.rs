//! Render entry point.

use ct_ir::{ChannelRole, Sequence, CHANNEL_COUNT};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::channel::{decay_rate, ChannelState};
use crate::mixer::{mix, write_frame};
use crate::scheduler::Transport;
use crate::voice::render_voice;

/// The playback engine: four voices driven by a parsed sequence.
///
/// `R` supplies the noise voice. Use [`Engine::seeded`] for reproducible
/// output.
pub struct Engine<R = StdRng> {
    channels: [ChannelState; CHANNEL_COUNT],
    transport: Transport,
    length_samples: u32,
    rng: R,
}

#[cfg(feature = "std")]
impl Engine<StdRng> {
    /// Create an engine whose noise voice is seeded from OS entropy.
    pub fn new(sequence: Sequence) -> Self {
        Self::with_rng(sequence, StdRng::from_entropy())
    }
}

impl Engine<StdRng> {
    /// Create an engine with a deterministic noise voice.
    pub fn seeded(sequence: Sequence, seed: u64) -> Self {
        Self::with_rng(sequence, StdRng::seed_from_u64(seed))
    }
}

impl<R: RngCore> Engine<R> {
    /// Create an engine that draws noise from `rng`.
    ///
    /// Takes ownership of the sequence's timelines; voice decay is derived
    /// from the sample rate the sequence was parsed at.
    pub fn with_rng(sequence: Sequence, rng: R) -> Self {
        let sample_rate = sequence.sample_rate;
        let length_samples = sequence.length_samples;
        let mut timelines = sequence.timelines.into_iter();

        let channels = core::array::from_fn(|index| {
            let role = ChannelRole::for_channel(index);
            let events = timelines.next().map(|t| t.events).unwrap_or_default();
            ChannelState::new(role, events, decay_rate(role, sample_rate))
        });

        Self {
            channels,
            transport: Transport::new(),
            length_samples,
            rng,
        }
    }

    /// Fill `out` with `frame_count` interleaved frames.
    ///
    /// Every frame carries the same mono sample in each of its
    /// `channel_count` slots. Returns `false` once every voice has consumed
    /// its timeline; the buffer is still fully written in that case.
    ///
    /// # Panics
    ///
    /// Panics if `out` holds fewer than `frame_count * channel_count` samples.
    pub fn render(
        &mut self,
        frame_count: usize,
        sample_rate: u32,
        channel_count: usize,
        out: &mut [f32],
    ) -> bool {
        let needed = frame_count * channel_count;
        assert!(
            out.len() >= needed,
            "output buffer holds {} samples, {} frames of {} channels need {}",
            out.len(),
            frame_count,
            channel_count,
            needed
        );

        #[cfg(feature = "alloc_check")]
        {
            assert_no_alloc::assert_no_alloc(|| {
                self.render_frames(sample_rate, channel_count, &mut out[..needed])
            })
        }
        #[cfg(not(feature = "alloc_check"))]
        {
            self.render_frames(sample_rate, channel_count, &mut out[..needed])
        }
    }

    fn render_frames(&mut self, sample_rate: u32, channel_count: usize, out: &mut [f32]) -> bool {
        let dt = 1.0 / sample_rate as f32;

        if channel_count > 0 {
            for frame in out.chunks_exact_mut(channel_count) {
                let sample = self.next_sample(dt);
                write_frame(frame, sample);
            }
        }

        !self.is_finished()
    }

    /// Advance the clock by one sample and return the mixed output.
    fn next_sample(&mut self, dt: f32) -> f32 {
        self.transport.step(&mut self.channels);

        let mut voices = [0.0f32; CHANNEL_COUNT];
        for (voice, channel) in voices.iter_mut().zip(self.channels.iter_mut()) {
            *voice = render_voice(channel, dt, &mut self.rng);
        }
        mix(&voices, self.transport.volume)
    }

    /// Samples rendered since playback started.
    pub fn playback_tick(&self) -> u64 {
        self.transport.playback_tick
    }

    /// Latest End of Track time across all voices, in samples.
    pub fn length_samples(&self) -> u32 {
        self.length_samples
    }

    /// Playback position as a fraction of the sequence length, in [0, 1].
    pub fn progress(&self) -> f32 {
        if self.length_samples == 0 {
            return 0.0;
        }
        (self.transport.playback_tick as f64 / self.length_samples as f64).min(1.0) as f32
    }

    /// Current global mix volume.
    pub fn volume(&self) -> f32 {
        self.transport.volume
    }

    /// True once every voice has consumed its timeline.
    pub fn is_finished(&self) -> bool {
        self.channels.iter().all(ChannelState::is_finished)
    }

    pub fn channels(&self) -> &[ChannelState] {
        &self.channels
    }
}
