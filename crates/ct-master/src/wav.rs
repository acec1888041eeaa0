//! WAV encoding for 16-bit PCM.

use std::fs::File;
use std::io::{BufWriter, Cursor, Seek, Write};
use std::path::Path;

fn wav_spec(sample_rate: u32, channels: u16) -> hound::WavSpec {
    hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

fn write_samples<W: Write + Seek>(
    writer: W,
    samples: &[f32],
    sample_rate: u32,
    channels: u16,
) -> Result<(), hound::Error> {
    let mut writer = hound::WavWriter::new(writer, wav_spec(sample_rate, channels))?;
    for &sample in samples {
        writer.write_sample(to_i16(sample))?;
    }
    writer.finalize()
}

/// Write interleaved samples to a WAV file at `path`.
pub fn write_wav(
    path: impl AsRef<Path>,
    samples: &[f32],
    sample_rate: u32,
    channels: u16,
) -> Result<(), hound::Error> {
    let file = BufWriter::new(File::create(path)?);
    write_samples(file, samples, sample_rate, channels)
}

/// Encode interleaved samples as an in-memory WAV file.
pub fn samples_to_wav(
    samples: &[f32],
    sample_rate: u32,
    channels: u16,
) -> Result<Vec<u8>, hound::Error> {
    let mut cursor = Cursor::new(Vec::new());
    write_samples(&mut cursor, samples, sample_rate, channels)?;
    Ok(cursor.into_inner())
}
