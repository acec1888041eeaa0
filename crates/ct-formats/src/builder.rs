//! Minimal Standard MIDI File writer.
//!
//! Used to author sequence files in code for tests, benches and demos.

/// Append `value` as a base-128 variable-length quantity.
pub fn write_vlq(out: &mut Vec<u8>, value: u32) {
    let mut groups = [0u8; 5];
    let mut count = 0;
    let mut rest = value;
    loop {
        groups[count] = (rest & 0x7F) as u8;
        count += 1;
        rest >>= 7;
        if rest == 0 {
            break;
        }
    }
    for i in (0..count).rev() {
        let continuation = if i > 0 { 0x80 } else { 0 };
        out.push(groups[i] | continuation);
    }
}

/// Builds the body of one `MTrk` chunk.
#[derive(Clone, Debug, Default)]
pub struct TrackBuilder {
    bytes: Vec<u8>,
}

impl TrackBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn event(mut self, delta: u32, data: &[u8]) -> Self {
        write_vlq(&mut self.bytes, delta);
        self.bytes.extend_from_slice(data);
        self
    }

    pub fn note_on(self, delta: u32, channel: u8, note: u8, velocity: u8) -> Self {
        self.event(delta, &[0x90 | (channel & 0x0F), note, velocity])
    }

    pub fn note_off(self, delta: u32, channel: u8, note: u8, velocity: u8) -> Self {
        self.event(delta, &[0x80 | (channel & 0x0F), note, velocity])
    }

    pub fn aftertouch(self, delta: u32, channel: u8, note: u8, pressure: u8) -> Self {
        self.event(delta, &[0xA0 | (channel & 0x0F), note, pressure])
    }

    pub fn control_change(self, delta: u32, channel: u8, controller: u8, value: u8) -> Self {
        self.event(delta, &[0xB0 | (channel & 0x0F), controller, value])
    }

    pub fn program_change(self, delta: u32, channel: u8, program: u8) -> Self {
        self.event(delta, &[0xC0 | (channel & 0x0F), program])
    }

    pub fn channel_pressure(self, delta: u32, channel: u8, pressure: u8) -> Self {
        self.event(delta, &[0xD0 | (channel & 0x0F), pressure])
    }

    /// 14-bit pitch wheel value, 0x2000 is centered.
    pub fn pitch_bend(self, delta: u32, channel: u8, value: u16) -> Self {
        let lsb = (value & 0x7F) as u8;
        let msb = ((value >> 7) & 0x7F) as u8;
        self.event(delta, &[0xE0 | (channel & 0x0F), lsb, msb])
    }

    /// Meta event with an arbitrary type and payload.
    pub fn meta(mut self, delta: u32, kind: u8, payload: &[u8]) -> Self {
        write_vlq(&mut self.bytes, delta);
        self.bytes.extend_from_slice(&[0xFF, kind]);
        write_vlq(&mut self.bytes, payload.len() as u32);
        self.bytes.extend_from_slice(payload);
        self
    }

    /// Set Tempo in microseconds per quarter note.
    pub fn tempo(self, delta: u32, micros_per_quarter: u32) -> Self {
        let [_, b0, b1, b2] = micros_per_quarter.to_be_bytes();
        self.meta(delta, 0x51, &[b0, b1, b2])
    }

    pub fn track_name(self, delta: u32, name: &str) -> Self {
        self.meta(delta, 0x03, name.as_bytes())
    }

    pub fn end_of_track(self, delta: u32) -> Self {
        self.meta(delta, 0x2F, &[])
    }

    /// Append raw bytes with no delta-time prefix.
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

/// Builds a complete file: one header chunk followed by the added chunks.
#[derive(Clone, Debug)]
pub struct SmfBuilder {
    format: u16,
    division: u16,
    declared_tracks: Option<u16>,
    chunks: Vec<([u8; 4], Vec<u8>)>,
}

impl SmfBuilder {
    pub fn new(format: u16, division: u16) -> Self {
        Self {
            format,
            division,
            declared_tracks: None,
            chunks: Vec::new(),
        }
    }

    /// Override the track count written to the header.
    pub fn declared_tracks(mut self, count: u16) -> Self {
        self.declared_tracks = Some(count);
        self
    }

    pub fn track(self, track: TrackBuilder) -> Self {
        self.chunk(*b"MTrk", track.finish())
    }

    /// Append a chunk with any type tag.
    pub fn chunk(mut self, tag: [u8; 4], body: Vec<u8>) -> Self {
        self.chunks.push((tag, body));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let track_count = self
            .chunks
            .iter()
            .filter(|(tag, _)| tag == b"MTrk")
            .count() as u16;

        let mut out = Vec::new();
        out.extend_from_slice(b"MThd");
        out.extend_from_slice(&6u32.to_be_bytes());
        out.extend_from_slice(&self.format.to_be_bytes());
        out.extend_from_slice(&self.declared_tracks.unwrap_or(track_count).to_be_bytes());
        out.extend_from_slice(&self.division.to_be_bytes());

        for (tag, body) in &self.chunks {
            out.extend_from_slice(tag);
            out.extend_from_slice(&(body.len() as u32).to_be_bytes());
            out.extend_from_slice(body);
        }
        out
    }
}
