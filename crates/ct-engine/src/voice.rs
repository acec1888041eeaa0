//! Waveform generators for the three voice roles.
//!
//! Each voice advances its phase, evaluates its raw waveform in [-1, 1],
//! scales by the envelope and snaps the result to a 4-bit staircase.

use ct_ir::ChannelRole;
use rand::{Rng, RngCore};

use crate::channel::ChannelState;

/// Advance `phase` by one sample of `frequency` and wrap into [0, 1).
#[inline]
pub fn advance_phase(phase: f32, frequency: f32, dt: f32) -> f32 {
    (phase + frequency * dt) % 1.0
}

/// Square wave: high for the first `duty` of the cycle.
#[inline]
pub fn pulse(phase: f32, duty: f32) -> f32 {
    if phase < duty {
        1.0
    } else {
        -1.0
    }
}

/// Triangle wave rising until `break_point`, then falling.
#[inline]
pub fn triangle(phase: f32, break_point: f32) -> f32 {
    if phase < break_point {
        phase * 4.0 - 1.0
    } else {
        1.0 - (phase * 4.0 - 2.0)
    }
}

/// Uniform noise in [0, 1).
#[inline]
pub fn noise<R: RngCore>(rng: &mut R) -> f32 {
    rng.gen::<f32>()
}

/// Snap an amplitude in [-1, 1] to one of the 4-bit DAC levels.
#[inline]
pub fn quantize_4bit(amplitude: f32) -> f32 {
    ((amplitude + 1.0) * 8.0) as i32 as f32 / 8.0 - 1.0
}

/// Produce one quantized sample from `channel`, advancing its phase.
pub fn render_voice<R: RngCore>(channel: &mut ChannelState, dt: f32, rng: &mut R) -> f32 {
    channel.phase = advance_phase(channel.phase, channel.frequency, dt);
    let raw = match channel.role {
        ChannelRole::Pulse => pulse(channel.phase, channel.duty),
        ChannelRole::Triangle => triangle(channel.phase, channel.duty),
        ChannelRole::Noise => noise(rng),
    };
    quantize_4bit(raw * channel.volume)
}
