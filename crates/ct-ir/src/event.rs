//! Event types consumed by the playback scheduler.

/// A scheduled action on one channel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Event {
    /// Absolute position in output samples
    pub time: u32,
    /// Owning channel (0-3), fixed by track order at parse time
    pub channel: u8,
    /// What the event does
    pub payload: EventPayload,
}

impl Event {
    /// Create a new event.
    pub fn new(time: u32, channel: u8, payload: EventPayload) -> Self {
        Self {
            time,
            channel,
            payload,
        }
    }

    /// Fieldless tag of this event's payload.
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

/// What an event does.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EventPayload {
    /// Release a note. Velocity is normalized to 0.0-1.0.
    NoteOff { note: u8, velocity: f32 },
    /// Trigger a note. Velocity is normalized to 0.0-1.0.
    NoteOn { note: u8, velocity: f32 },
    /// Replace the global mix volume
    VolumeChange(f32),
    /// Last event of a track
    EndOfTrack,
}

impl EventPayload {
    /// Build a note-on from raw MIDI data bytes.
    pub fn note_on(note: u8, velocity: u8) -> Self {
        Self::NoteOn {
            note: note & 0x7F,
            velocity: normalize_velocity(velocity),
        }
    }

    /// Build a note-off from raw MIDI data bytes.
    pub fn note_off(note: u8, velocity: u8) -> Self {
        Self::NoteOff {
            note: note & 0x7F,
            velocity: normalize_velocity(velocity),
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::NoteOff { .. } => EventKind::NoteOff,
            Self::NoteOn { .. } => EventKind::NoteOn,
            Self::VolumeChange(_) => EventKind::VolumeChange,
            Self::EndOfTrack => EventKind::EndOfTrack,
        }
    }
}

/// Event payload tag without data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    NoteOff,
    NoteOn,
    VolumeChange,
    EndOfTrack,
}

fn normalize_velocity(velocity: u8) -> f32 {
    (velocity & 0x7F) as f32 / 127.0
}
