//! Core sequence types for the chiptone player.
//!
//! This crate defines the data shared between the file parser and the
//! playback engine: per-channel event timelines stamped in output samples,
//! the fixed set of voice roles, and the tempo arithmetic that turns musical
//! ticks into sample positions.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod event;
mod sequence;
mod timing;

pub use event::{Event, EventKind, EventPayload};
pub use sequence::{ChannelRole, Sequence, SmfFormat, Timeline, CHANNEL_COUNT};
pub use timing::{bpm_from_micros, samples_per_tick, tick_to_sample, DEFAULT_TEMPO_BPM};
