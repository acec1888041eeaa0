//! Playback engine for the chiptone player.
//!
//! Steps a parsed sequence one output sample at a time: advances the clock,
//! dispatches due events to the four voices, synthesizes each voice and
//! mixes them down to a single mono sample replicated across the output
//! channels.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod channel;
mod engine;
mod frequency;
mod mixer;
pub mod scheduler;
pub mod voice;

pub use channel::{decay_rate, ChannelState, DEFAULT_DUTY};
pub use engine::Engine;
pub use frequency::{note_frequency, NOTE_C4, NOTE_FREQS};
pub use mixer::{clamped_sum, mix, MASTER_VOLUME};
pub use scheduler::Transport;
pub use voice::quantize_4bit;
