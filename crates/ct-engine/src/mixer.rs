//! Mono mix of the four voices.

use ct_ir::CHANNEL_COUNT;

/// Fixed headroom applied after the global volume.
pub const MASTER_VOLUME: f32 = 0.25;

/// Sum the voices and clamp to [-1, 1].
#[inline]
pub fn clamped_sum(voices: &[f32; CHANNEL_COUNT]) -> f32 {
    voices.iter().sum::<f32>().clamp(-1.0, 1.0)
}

/// Final mono sample for one frame.
#[inline]
pub fn mix(voices: &[f32; CHANNEL_COUNT], global_volume: f32) -> f32 {
    clamped_sum(voices) * global_volume * MASTER_VOLUME
}

/// Copy `sample` into every slot of an interleaved frame.
#[inline]
pub fn write_frame(frame: &mut [f32], sample: f32) {
    frame.fill(sample);
}
