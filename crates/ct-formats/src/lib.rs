//! Format parsers for the chiptone player.
//!
//! Parses Standard MIDI Files into per-channel timelines stamped in output
//! samples, ready for the playback engine.

mod builder;
mod cursor;
mod smf;

pub use builder::{write_vlq, SmfBuilder, TrackBuilder};
pub use cursor::ByteCursor;
pub use smf::{load_smf, PARSE_TIME_VOLUME};

/// Error type for format parsing.
///
/// Every variant aborts the whole parse; nothing is returned for a file
/// that fails part way through.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    /// A read ran past the end of the file or chunk
    #[error("truncated data: needed {needed} byte(s) at offset {offset}")]
    TruncatedData { offset: usize, needed: usize },
    /// A variable-length quantity had no terminating byte
    #[error("variable-length quantity at offset {offset} is not terminated")]
    MalformedVarInt { offset: usize },
    /// Missing, misplaced or inconsistent header chunk
    #[error("invalid header: {0}")]
    InvalidHeader(&'static str),
    /// Header format field other than 0, 1 or 2
    #[error("unsupported file format {0}")]
    UnsupportedFormat(u16),
    /// SMPTE frame based division
    #[error("unsupported time division {0:#06x} (SMPTE timing)")]
    UnsupportedTimeDivision(u16),
    /// Status byte that the decoder does not understand
    #[error("unsupported MIDI event with status {status:#04x} at offset {offset}")]
    UnsupportedMidiEvent { status: u8, offset: usize },
}
