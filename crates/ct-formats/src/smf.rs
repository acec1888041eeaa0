//! Standard MIDI File parser.
//!
//! Walks the top-level chunks, reads the header, and decodes up to four track
//! chunks into channel timelines. Event times are converted from musical
//! ticks to output samples while parsing, so the result is only valid for
//! the sample rate it was parsed with.

use ct_ir::{
    bpm_from_micros, tick_to_sample, Event, EventKind, EventPayload, Sequence, SmfFormat,
    Timeline, CHANNEL_COUNT, DEFAULT_TEMPO_BPM,
};
use tracing::{debug, warn};

use crate::cursor::ByteCursor;
use crate::FormatError;

/// Volume carried by Control Change 7 events.
///
/// The controller value itself is discarded; the event records the global
/// volume as known at parse time, which the parser never changes.
pub const PARSE_TIME_VOLUME: f32 = 1.0;

const MIDI_HEADER: &[u8; 4] = b"MThd";
const MIDI_TRACK: &[u8; 4] = b"MTrk";

const CC_CHANNEL_VOLUME: u8 = 7;

const META_TRACK_NAME: u8 = 0x03;
const META_END_OF_TRACK: u8 = 0x2F;
const META_SET_TEMPO: u8 = 0x51;

/// A tagged, length-prefixed block of the file.
struct Chunk<'a> {
    tag: [u8; 4],
    body: &'a [u8],
    /// File offset of the first body byte
    offset: usize,
}

/// Header chunk contents.
#[derive(Clone, Copy, Debug)]
struct Header {
    format: SmfFormat,
    tracks: u16,
    division: u16,
}

/// Load a Standard MIDI File from bytes, quantizing event times to `sample_rate`.
pub fn load_smf(data: &[u8], sample_rate: u32) -> Result<Sequence, FormatError> {
    let mut cursor = ByteCursor::new(data);
    let mut sequence: Option<Sequence> = None;
    // Shared by every track, so a conductor track's tempo reaches the others.
    let mut tempo = DEFAULT_TEMPO_BPM;

    while !cursor.is_empty() {
        let chunk = read_chunk(&mut cursor)?;

        match &chunk.tag {
            MIDI_HEADER => {
                if sequence.is_some() {
                    return Err(FormatError::InvalidHeader("duplicate header chunk"));
                }
                let header = parse_header(&chunk)?;
                debug!(
                    format = ?header.format,
                    tracks = header.tracks,
                    division = header.division,
                    "header"
                );
                sequence = Some(Sequence::new(header.format, header.division, sample_rate));
            }
            MIDI_TRACK => {
                let seq = sequence
                    .as_mut()
                    .ok_or(FormatError::InvalidHeader("track chunk before header"))?;
                if seq.tracks == CHANNEL_COUNT {
                    debug!(offset = chunk.offset, "ignoring tracks past the fourth");
                    break;
                }

                let channel = seq.tracks;
                let timeline =
                    decode_track(&chunk, channel as u8, seq.division, sample_rate, &mut tempo)?;
                if let Some(end) = end_of_track_time(&timeline) {
                    seq.length_samples = seq.length_samples.max(end);
                }
                seq.timelines[channel] = timeline;
                seq.tracks += 1;
            }
            _ => {
                debug!(
                    tag = %String::from_utf8_lossy(&chunk.tag),
                    len = chunk.body.len(),
                    "skipping unknown chunk"
                );
            }
        }
    }

    let seq = sequence.ok_or(FormatError::InvalidHeader("missing header chunk"))?;
    debug!(
        tracks = seq.tracks,
        events = seq.event_count(),
        length_samples = seq.length_samples,
        "sequence loaded"
    );
    Ok(seq)
}

fn read_chunk<'a>(cursor: &mut ByteCursor<'a>) -> Result<Chunk<'a>, FormatError> {
    let tag = cursor.read_tag()?;
    let len = cursor.read_u32_be()? as usize;
    let offset = cursor.offset();
    let body = cursor.read_slice(len)?;
    Ok(Chunk { tag, body, offset })
}

fn parse_header(chunk: &Chunk<'_>) -> Result<Header, FormatError> {
    let mut c = ByteCursor::with_base(chunk.body, chunk.offset);

    let raw_format = c.read_u16_be()?;
    let format = SmfFormat::from_u16(raw_format).ok_or(FormatError::UnsupportedFormat(raw_format))?;

    let tracks = c.read_u16_be()?;
    if tracks == 0 {
        return Err(FormatError::InvalidHeader("header declares zero tracks"));
    }

    let division = c.read_u16_be()?;
    if division & 0x8000 != 0 {
        return Err(FormatError::UnsupportedTimeDivision(division));
    }
    if division == 0 {
        return Err(FormatError::InvalidHeader("zero ticks per quarter note"));
    }

    Ok(Header {
        format,
        tracks,
        division,
    })
}

/// Decode one track chunk into the timeline for `channel`.
///
/// `tempo` starts at whatever the previous track left it at and is updated
/// in place by Set Tempo events.
fn decode_track(
    chunk: &Chunk<'_>,
    channel: u8,
    division: u16,
    sample_rate: u32,
    tempo: &mut u32,
) -> Result<Timeline, FormatError> {
    let mut c = ByteCursor::with_base(chunk.body, chunk.offset);
    let mut timeline = Timeline::new();
    let mut tick: u64 = 0;

    while !c.is_empty() {
        tick += c.read_vlq()? as u64;
        let time = tick_to_sample(tick, *tempo, division, sample_rate);

        let status_offset = c.offset();
        let status = c.read_u8()?;

        match status >> 4 {
            0x8 => {
                let note = c.read_u8()?;
                let velocity = c.read_u8()?;
                timeline.push(Event::new(time, channel, EventPayload::note_off(note, velocity)));
            }
            0x9 => {
                let note = c.read_u8()?;
                let velocity = c.read_u8()?;
                timeline.push(Event::new(time, channel, EventPayload::note_on(note, velocity)));
            }
            // Polyphonic aftertouch, pitch wheel
            0xA | 0xE => c.skip(2)?,
            0xB => {
                let controller = c.read_u8()? & 0x7F;
                let _value = c.read_u8()?;
                if controller == CC_CHANNEL_VOLUME {
                    timeline.push(Event::new(
                        time,
                        channel,
                        EventPayload::VolumeChange(PARSE_TIME_VOLUME),
                    ));
                }
            }
            // Program change, channel pressure
            0xC | 0xD => c.skip(1)?,
            0xF if status == 0xFF => {
                let kind = c.read_u8()?;
                let len = c.read_vlq()? as usize;
                let payload_offset = c.offset();
                let payload = c.read_slice(len)?;

                match kind {
                    META_SET_TEMPO => {
                        let micros = ByteCursor::with_base(payload, payload_offset).read_u24_be()?;
                        match bpm_from_micros(micros) {
                            Some(bpm) => *tempo = bpm,
                            None => warn!(channel, offset = payload_offset, "ignoring zero tempo"),
                        }
                    }
                    META_END_OF_TRACK => {
                        timeline.push(Event::new(time, channel, EventPayload::EndOfTrack));
                    }
                    META_TRACK_NAME => {
                        let name = String::from_utf8_lossy(payload).into_owned();
                        debug!(channel, name = %name, "track name");
                        timeline.name = Some(name);
                    }
                    _ => {}
                }
            }
            _ => {
                return Err(FormatError::UnsupportedMidiEvent {
                    status,
                    offset: status_offset,
                })
            }
        }
    }

    Ok(timeline)
}

fn end_of_track_time(timeline: &Timeline) -> Option<u32> {
    timeline
        .events
        .iter()
        .filter(|e| e.kind() == EventKind::EndOfTrack)
        .map(|e| e.time)
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{SmfBuilder, TrackBuilder};

    const RATE: u32 = 44100;

    fn single_track(track: TrackBuilder) -> Vec<u8> {
        SmfBuilder::new(1, 96).track(track).build()
    }

    #[test]
    fn note_events_carry_note_and_velocity() {
        let data = single_track(
            TrackBuilder::new()
                .note_on(0, 0, 60, 127)
                .note_off(96, 0, 60, 64)
                .end_of_track(0),
        );
        let seq = load_smf(&data, RATE).unwrap();
        let events = &seq.timelines[0].events;

        assert_eq!(events.len(), 3);
        assert_eq!(events[0], Event::new(0, 0, EventPayload::NoteOn { note: 60, velocity: 1.0 }));
        assert_eq!(
            events[1],
            Event::new(22050, 0, EventPayload::NoteOff { note: 60, velocity: 64.0 / 127.0 })
        );
        assert_eq!(events[2], Event::new(22050, 0, EventPayload::EndOfTrack));
        assert_eq!(seq.length_samples, 22050);
    }

    #[test]
    fn tracks_bind_to_channels_in_file_order() {
        let data = SmfBuilder::new(1, 96)
            .track(TrackBuilder::new().note_on(0, 5, 60, 100).end_of_track(0))
            .track(TrackBuilder::new().note_on(0, 9, 62, 100).end_of_track(0))
            .build();
        let seq = load_smf(&data, RATE).unwrap();

        assert_eq!(seq.tracks, 2);
        assert!(seq.timelines[0].events.iter().all(|e| e.channel == 0));
        assert!(seq.timelines[1].events.iter().all(|e| e.channel == 1));
        assert!(seq.timelines[2].is_empty());
        assert!(seq.timelines[3].is_empty());
    }

    #[test]
    fn ignored_messages_consume_their_data_bytes() {
        let data = single_track(
            TrackBuilder::new()
                .aftertouch(0, 0, 60, 10)
                .program_change(0, 0, 3)
                .channel_pressure(0, 0, 20)
                .pitch_bend(0, 0, 0x2000)
                .control_change(0, 0, 10, 64)
                .meta(0, 0x7F, &[1, 2, 3, 4])
                .note_on(0, 0, 64, 127)
                .end_of_track(0),
        );
        let seq = load_smf(&data, RATE).unwrap();
        let kinds: Vec<EventKind> = seq.timelines[0].events.iter().map(Event::kind).collect();
        assert_eq!(kinds, vec![EventKind::NoteOn, EventKind::EndOfTrack]);
    }

    #[test]
    fn volume_controller_records_parse_time_volume() {
        let data = single_track(
            TrackBuilder::new()
                .control_change(0, 0, 7, 20)
                .end_of_track(0),
        );
        let seq = load_smf(&data, RATE).unwrap();
        assert_eq!(
            seq.timelines[0].events[0].payload,
            EventPayload::VolumeChange(PARSE_TIME_VOLUME)
        );
    }

    #[test]
    fn tempo_change_rescales_accumulated_ticks() {
        // 96 ticks at 120 BPM is 22050 samples, but after switching to
        // 60 BPM the same accumulated tick count lands at 44100.
        let data = single_track(
            TrackBuilder::new()
                .note_on(96, 0, 60, 100)
                .tempo(0, 1_000_000)
                .note_off(0, 0, 60, 0)
                .end_of_track(96),
        );
        let seq = load_smf(&data, RATE).unwrap();
        let times: Vec<u32> = seq.timelines[0].events.iter().map(|e| e.time).collect();
        assert_eq!(times, vec![22050, 44100, 88200]);
    }

    #[test]
    fn tempo_carries_into_later_tracks() {
        // Conductor track sets 60 BPM; the note track has no tempo of its own.
        let data = SmfBuilder::new(1, 96)
            .track(TrackBuilder::new().tempo(0, 1_000_000).end_of_track(0))
            .track(
                TrackBuilder::new()
                    .note_on(0, 0, 60, 100)
                    .note_off(96, 0, 60, 0)
                    .end_of_track(0),
            )
            .build();
        let seq = load_smf(&data, RATE).unwrap();
        let times: Vec<u32> = seq.timelines[1].events.iter().map(|e| e.time).collect();
        assert_eq!(times, vec![0, 44100, 44100]);
        assert_eq!(seq.length_samples, 44100);
    }

    #[test]
    fn last_tempo_of_a_track_is_what_carries() {
        let data = SmfBuilder::new(1, 96)
            .track(
                TrackBuilder::new()
                    .tempo(0, 1_000_000)
                    .tempo(96, 250_000)
                    .end_of_track(0),
            )
            .track(TrackBuilder::new().end_of_track(96))
            .track(TrackBuilder::new().tempo(0, 500_000).end_of_track(96))
            .build();
        let seq = load_smf(&data, RATE).unwrap();
        // 240 BPM from track 0, then track 2 sets its own 120 BPM.
        assert_eq!(seq.timelines[1].last_time(), Some(11025));
        assert_eq!(seq.timelines[2].last_time(), Some(22050));
    }

    #[test]
    fn zero_tempo_is_ignored() {
        let data = single_track(TrackBuilder::new().tempo(0, 0).end_of_track(96));
        let seq = load_smf(&data, RATE).unwrap();
        assert_eq!(seq.timelines[0].last_time(), Some(22050));
    }

    #[test]
    fn track_name_is_kept() {
        let data = single_track(
            TrackBuilder::new()
                .track_name(0, "Lead")
                .end_of_track(0),
        );
        let seq = load_smf(&data, RATE).unwrap();
        assert_eq!(seq.timelines[0].name.as_deref(), Some("Lead"));
        assert_eq!(seq.timelines[0].len(), 1);
    }

    #[test]
    fn unknown_chunks_are_skipped() {
        let data = SmfBuilder::new(0, 96)
            .chunk(*b"XFIH", vec![1, 2, 3])
            .track(TrackBuilder::new().note_on(0, 0, 60, 100).end_of_track(0))
            .build();
        let seq = load_smf(&data, RATE).unwrap();
        assert_eq!(seq.tracks, 1);
        assert_eq!(seq.format, SmfFormat::SingleTrack);
    }

    #[test]
    fn header_validation() {
        let bad_format = SmfBuilder::new(3, 96).track(TrackBuilder::new()).build();
        assert_eq!(load_smf(&bad_format, RATE), Err(FormatError::UnsupportedFormat(3)));

        let no_tracks = SmfBuilder::new(1, 96).build();
        assert!(matches!(load_smf(&no_tracks, RATE), Err(FormatError::InvalidHeader(_))));

        let smpte = SmfBuilder::new(1, 0xE728).track(TrackBuilder::new()).build();
        assert_eq!(
            load_smf(&smpte, RATE),
            Err(FormatError::UnsupportedTimeDivision(0xE728))
        );

        let zero_division = SmfBuilder::new(1, 0).track(TrackBuilder::new()).build();
        assert!(matches!(load_smf(&zero_division, RATE), Err(FormatError::InvalidHeader(_))));
    }

    #[test]
    fn missing_or_misplaced_header() {
        assert!(matches!(load_smf(&[], RATE), Err(FormatError::InvalidHeader(_))));

        let mut track_first = Vec::new();
        track_first.extend_from_slice(b"MTrk");
        track_first.extend_from_slice(&4u32.to_be_bytes());
        track_first.extend_from_slice(&[0x00, 0xFF, 0x2F, 0x00]);
        assert_eq!(
            load_smf(&track_first, RATE),
            Err(FormatError::InvalidHeader("track chunk before header"))
        );
    }

    #[test]
    fn running_status_is_rejected() {
        let data = single_track(
            TrackBuilder::new()
                .note_on(0, 0, 60, 100)
                .raw(&[0x00, 0x40, 0x7F]),
        );
        let err = load_smf(&data, RATE).unwrap_err();
        assert!(matches!(err, FormatError::UnsupportedMidiEvent { status: 0x40, .. }));
    }

    #[test]
    fn sysex_is_rejected() {
        let data = single_track(TrackBuilder::new().raw(&[0x00, 0xF0, 0x01, 0xF7]));
        let err = load_smf(&data, RATE).unwrap_err();
        // Header is 14 bytes, track header 8, then the delta byte.
        assert_eq!(err, FormatError::UnsupportedMidiEvent { status: 0xF0, offset: 23 });
    }

    #[test]
    fn truncated_chunk_body() {
        let mut data = single_track(TrackBuilder::new().end_of_track(0));
        data.truncate(data.len() - 1);
        assert!(matches!(load_smf(&data, RATE), Err(FormatError::TruncatedData { .. })));
    }

    #[test]
    fn truncated_event_inside_track() {
        let data = single_track(TrackBuilder::new().raw(&[0x00, 0x90, 0x3C]));
        assert!(matches!(load_smf(&data, RATE), Err(FormatError::TruncatedData { .. })));
    }

    #[test]
    fn dangling_delta_time() {
        let data = single_track(TrackBuilder::new().raw(&[0x81]));
        assert!(matches!(load_smf(&data, RATE), Err(FormatError::MalformedVarInt { .. })));
    }

    #[test]
    fn short_tempo_payload() {
        let data = single_track(TrackBuilder::new().meta(0, 0x51, &[0x07, 0xA1]));
        assert!(matches!(load_smf(&data, RATE), Err(FormatError::TruncatedData { .. })));
    }
}
