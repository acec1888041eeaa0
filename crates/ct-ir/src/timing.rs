//! Musical tick to output sample conversion.

/// Tempo in effect before any Set Tempo meta event.
pub const DEFAULT_TEMPO_BPM: u32 = 120;

/// Number of output samples covered by one musical tick.
///
/// `ticks_per_second = tempo * division / 60`, so one tick lasts
/// `sample_rate / ticks_per_second` samples.
pub fn samples_per_tick(tempo_bpm: u32, division: u16, sample_rate: u32) -> f64 {
    let ticks_per_second = tempo_bpm as f64 * division as f64 / 60.0;
    sample_rate as f64 / ticks_per_second
}

/// Absolute sample position of an accumulated tick count.
///
/// The whole tick count is scaled by the *current* tempo, so a tempo change
/// moves every tick before it as well. Truncates toward zero and saturates
/// at `u32::MAX`.
pub fn tick_to_sample(tick: u64, tempo_bpm: u32, division: u16, sample_rate: u32) -> u32 {
    (tick as f64 * samples_per_tick(tempo_bpm, division, sample_rate)) as u32
}

/// Convert a Set Tempo payload (microseconds per quarter note) to whole BPM.
///
/// Returns `None` for a zero payload. Tempos slower than 1 BPM clamp to 1.
pub fn bpm_from_micros(micros_per_quarter: u32) -> Option<u32> {
    if micros_per_quarter == 0 {
        return None;
    }
    let beats_per_second = 1.0 / (micros_per_quarter as f64 / 1_000_000.0);
    Some(((beats_per_second * 60.0) as u32).max(1))
}
