//! Parsed sequence: one event timeline per voice.

use alloc::string::String;
use alloc::vec::Vec;

use crate::event::Event;

/// Number of voices. Track chunks past this count are not decoded.
pub const CHANNEL_COUNT: usize = 4;

/// Synthesis role of a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelRole {
    /// Square wave with a fixed duty cycle
    Pulse,
    /// Piecewise linear triangle
    Triangle,
    /// Uniform random noise (drums)
    Noise,
}

impl ChannelRole {
    /// Role bound to a channel index: two pulses, a triangle, then noise.
    pub fn for_channel(index: usize) -> Self {
        match index {
            0 | 1 => Self::Pulse,
            2 => Self::Triangle,
            _ => Self::Noise,
        }
    }
}

/// Header format field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SmfFormat {
    /// One multi-channel track
    SingleTrack,
    /// Simultaneous tracks
    #[default]
    MultiTrack,
    /// Independent single-track patterns
    MultiSequence,
}

impl SmfFormat {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(Self::SingleTrack),
            1 => Some(Self::MultiTrack),
            2 => Some(Self::MultiSequence),
            _ => None,
        }
    }

    pub fn as_u16(self) -> u16 {
        match self {
            Self::SingleTrack => 0,
            Self::MultiTrack => 1,
            Self::MultiSequence => 2,
        }
    }
}

/// Events for one channel, in parse order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Timeline {
    pub events: Vec<Event>,
    /// Track name meta event, if the track carried one
    pub name: Option<String>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Time of the last event, if any.
    pub fn last_time(&self) -> Option<u32> {
        self.events.last().map(|e| e.time)
    }
}

/// A fully parsed sequence file, quantized to one output sample rate.
#[derive(Clone, Debug, PartialEq)]
pub struct Sequence {
    pub format: SmfFormat,
    /// Ticks per quarter note
    pub division: u16,
    /// Sample rate the event times were computed for
    pub sample_rate: u32,
    /// One timeline per channel; channels without a track stay empty
    pub timelines: [Timeline; CHANNEL_COUNT],
    /// Number of track chunks decoded into channels (at most 4)
    pub tracks: usize,
    /// Latest End of Track time across all channels, in samples
    pub length_samples: u32,
}

impl Sequence {
    /// Create an empty sequence.
    pub fn new(format: SmfFormat, division: u16, sample_rate: u32) -> Self {
        Self {
            format,
            division,
            sample_rate,
            timelines: core::array::from_fn(|_| Timeline::new()),
            tracks: 0,
            length_samples: 0,
        }
    }

    /// Total number of events across all channels.
    pub fn event_count(&self) -> usize {
        self.timelines.iter().map(Timeline::len).sum()
    }

    /// Playback length in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.length_samples as f64 / self.sample_rate as f64
    }
}
