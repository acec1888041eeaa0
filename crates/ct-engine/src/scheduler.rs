//! Per-sample event dispatch.
//!
//! The transport owns the sample clock and the global mix volume. Each step
//! advances the clock by one sample, decays every voice and hands each voice
//! at most one event that has come due.

use crate::channel::ChannelState;

/// Volume before any volume change event.
pub const INITIAL_VOLUME: f32 = 1.0;

/// Playback clock and global volume.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transport {
    /// Samples rendered since the start of playback
    pub playback_tick: u64,
    /// Global mix volume, replaced by volume change events
    pub volume: f32,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport {
    pub const fn new() -> Self {
        Self {
            playback_tick: 0,
            volume: INITIAL_VOLUME,
        }
    }

    /// Advance one sample and dispatch due events.
    pub fn step(&mut self, channels: &mut [ChannelState]) {
        self.playback_tick += 1;

        for channel in channels.iter_mut() {
            channel.decay();

            if let Some(event) = channel.take_due(self.playback_tick) {
                if let Some(volume) = channel.apply(&event.payload) {
                    self.volume = volume;
                }
            }
        }
    }
}
