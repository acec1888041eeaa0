//! Per-voice playback state.

use alloc::vec::Vec;
use ct_ir::{ChannelRole, Event, EventPayload};

use crate::frequency::note_frequency;

/// Pulse duty cycle and triangle break point.
pub const DEFAULT_DUTY: f32 = 0.5;

/// Volume lost per second by the pulse and triangle voices.
const MELODIC_DECAY_PER_SECOND: f32 = 0.75;

/// Volume lost per second by the noise voice.
const NOISE_DECAY_PER_SECOND: f32 = 8.0;

/// Per-sample volume decrement for a voice role at `sample_rate`.
pub fn decay_rate(role: ChannelRole, sample_rate: u32) -> f32 {
    if sample_rate == 0 {
        return 0.0;
    }
    let per_second = match role {
        ChannelRole::Pulse | ChannelRole::Triangle => MELODIC_DECAY_PER_SECOND,
        ChannelRole::Noise => NOISE_DECAY_PER_SECOND,
    };
    (per_second as f64 / sample_rate as f64) as f32
}

/// Mutable state for one of the four voices.
#[derive(Clone, Debug)]
pub struct ChannelState {
    /// Waveform this voice produces
    pub role: ChannelRole,
    /// Oscillator pitch in Hz
    pub frequency: f32,
    /// Position within the current cycle, in [0, 1)
    pub phase: f32,
    /// Envelope level, in [0, 1]
    pub volume: f32,
    /// Volume removed every sample
    pub decay_rate: f32,
    /// Pulse duty cycle or triangle break point
    pub duty: f32,
    events: Vec<Event>,
    cursor: usize,
}

impl ChannelState {
    /// Create a silent voice that will play `events` in order.
    pub fn new(role: ChannelRole, events: Vec<Event>, decay_rate: f32) -> Self {
        Self {
            role,
            frequency: 0.0,
            phase: 0.0,
            volume: 0.0,
            decay_rate,
            duty: DEFAULT_DUTY,
            events,
            cursor: 0,
        }
    }

    /// Apply one sample of linear decay, never going below silence.
    pub fn decay(&mut self) {
        self.volume = (self.volume - self.decay_rate).max(0.0);
    }

    /// Take the next event if it is due at `tick`.
    ///
    /// Returns at most one event per call even when several share a time.
    pub fn take_due(&mut self, tick: u64) -> Option<Event> {
        let event = *self.events.get(self.cursor)?;
        if event.time as u64 <= tick {
            self.cursor += 1;
            Some(event)
        } else {
            None
        }
    }

    /// Apply an event to this voice.
    ///
    /// Returns the new global volume for a volume change; voice-local events
    /// return `None`. Notes outside the frequency table leave the voice
    /// untouched.
    pub fn apply(&mut self, payload: &EventPayload) -> Option<f32> {
        match *payload {
            EventPayload::NoteOn { note, velocity } => {
                if let Some(freq) = note_frequency(note) {
                    self.frequency = freq;
                    self.volume = velocity;
                }
                None
            }
            EventPayload::NoteOff { note, .. } => {
                if let Some(freq) = note_frequency(note) {
                    self.frequency = freq;
                    self.volume = 0.0;
                }
                None
            }
            EventPayload::VolumeChange(volume) => Some(volume),
            EventPayload::EndOfTrack => None,
        }
    }

    /// Index of the next event to be applied.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// True once every event has been applied.
    pub fn is_finished(&self) -> bool {
        self.cursor >= self.events.len()
    }
}
