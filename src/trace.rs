//! Trace header layout and trace buffer helpers.
//!
//! A trace record is a 240-byte header followed by the sample payload.  The
//! first 180 header bytes are the standard fields; the last 60 bytes are
//! reserved and carried verbatim.  Some producers store station numbers and
//! coordinates in the reserved area; [`TraceExtension`] reads them for the
//! header listing but never rewrites them.

use byteorder::{BigEndian, ByteOrder};

pub const TRACE_HEADER_SIZE: usize = 240;

/// Byte offsets of the trace header fields the transcoder touches.
pub mod offset {
    pub const SEQUENCE_IN_LINE:   usize = 0;
    pub const SEQUENCE_IN_REEL:   usize = 4;
    pub const FIELD_RECORD:       usize = 8;
    pub const TRACE_IN_FIELD:     usize = 12;
    pub const ENERGY_SOURCE:      usize = 16;
    pub const CDP_ENSEMBLE:       usize = 20;
    pub const TRACE_IN_CDP:       usize = 24;
    pub const HORIZONTAL_STACK:   usize = 32;
    pub const OFFSET_DISTANCE:    usize = 36;
    pub const SOURCE_X:           usize = 72;
    pub const SOURCE_Y:           usize = 76;
    pub const GROUP_X:            usize = 80;
    pub const GROUP_Y:            usize = 84;
    pub const SAMPLE_COUNT:       usize = 114;
    pub const SAMPLE_INTERVAL:    usize = 116;
    pub const WEIGHTING_FACTOR:   usize = 168;
    pub const RESERVED:           usize = 180;
}

// ── Trace header ─────────────────────────────────────────────────────────────

/// Decoded standard trace header fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceHeader {
    pub sequence_in_line:    i32,
    pub sequence_in_reel:    i32,
    pub field_record:        i32,
    pub trace_in_field:      i32,
    pub energy_source_point: i32,
    pub cdp_ensemble:        i32,
    pub trace_in_cdp:        i32,
    pub trace_id:            i16,
    pub vertical_stack:      i16,
    pub horizontal_stack:    i16,
    pub data_use:            i16,
    pub offset_distance:     i32,
    pub receiver_elevation:  i32,
    pub source_elevation:    i32,
    pub source_depth:        i32,
    pub receiver_datum:      i32,
    pub source_datum:        i32,
    pub source_water_depth:  i32,
    pub group_water_depth:   i32,
    pub elevation_scaler:    i16,
    pub coordinate_scaler:   i16,
    pub source_x:            i32,
    pub source_y:            i32,
    pub group_x:             i32,
    pub group_y:             i32,
    pub coordinate_units:    i16,
    /// Bytes 90..180 as 2-byte fields, in layout order (timing, gain,
    /// sweep, filter, recording date and geophone group fields).
    pub timing:              [i16; 45],
}

impl Default for TraceHeader {
    fn default() -> Self {
        Self::decode(&[])
    }
}

impl TraceHeader {
    /// Decode from a trace buffer.  Missing bytes read as zero.
    pub fn decode(buf: &[u8]) -> Self {
        let mut b = [0u8; TRACE_HEADER_SIZE];
        let n = buf.len().min(TRACE_HEADER_SIZE);
        b[..n].copy_from_slice(&buf[..n]);

        let l = |off: usize| BigEndian::read_i32(&b[off..off + 4]);
        let s = |off: usize| BigEndian::read_i16(&b[off..off + 2]);
        let mut timing = [0i16; 45];
        for (i, v) in timing.iter_mut().enumerate() {
            *v = s(90 + 2 * i);
        }
        Self {
            sequence_in_line:    l(0),
            sequence_in_reel:    l(4),
            field_record:        l(8),
            trace_in_field:      l(12),
            energy_source_point: l(16),
            cdp_ensemble:        l(20),
            trace_in_cdp:        l(24),
            trace_id:            s(28),
            vertical_stack:      s(30),
            horizontal_stack:    s(32),
            data_use:            s(34),
            offset_distance:     l(36),
            receiver_elevation:  l(40),
            source_elevation:    l(44),
            source_depth:        l(48),
            receiver_datum:      l(52),
            source_datum:        l(56),
            source_water_depth:  l(60),
            group_water_depth:   l(64),
            elevation_scaler:    s(68),
            coordinate_scaler:   s(70),
            source_x:            l(72),
            source_y:            l(76),
            group_x:             l(80),
            group_y:             l(84),
            coordinate_units:    s(88),
            timing,
        }
    }

    /// Samples in this trace, as declared by the trace itself.
    pub fn samples(&self) -> usize {
        self.timing[(offset::SAMPLE_COUNT - 90) / 2] as u16 as usize
    }

    pub fn sample_interval(&self) -> i16 {
        self.timing[(offset::SAMPLE_INTERVAL - 90) / 2]
    }

    /// Trace weighting multiplier `2^-w` for 2-byte integer samples.
    pub fn weight(&self) -> f32 {
        let w = self.timing[(offset::WEIGHTING_FACTOR - 90) / 2] as i32;
        2f32.powi(-w)
    }
}

// ── Reserved-area extension ──────────────────────────────────────────────────

/// Station, shot-point and coordinate words found in the reserved area.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceExtension {
    pub max_traces:        i16,
    pub midpoint_station:  i32,
    pub source_station:    i32,
    pub receiver_station:  i32,
    pub line:              i16,
    pub shot_point:        i32,
    pub water_bottom:      i32,
    pub line2:             i32,
    pub shot_point2:       i32,
    pub midpoint_x:        i32,
    pub midpoint_y:        i32,
    pub source_x:          i32,
    pub source_y:          i32,
    pub group_x:           i32,
    pub group_y:           i32,
}

impl TraceExtension {
    pub fn decode(buf: &[u8]) -> Self {
        let mut b = [0u8; TRACE_HEADER_SIZE];
        let n = buf.len().min(TRACE_HEADER_SIZE);
        b[..n].copy_from_slice(&buf[..n]);
        let l = |off: usize| BigEndian::read_i32(&b[off..off + 4]);
        Self {
            max_traces:       BigEndian::read_i16(&b[180..182]),
            midpoint_station: l(184),
            source_station:   l(188),
            receiver_station: l(192),
            line:             BigEndian::read_i16(&b[196..198]),
            shot_point:       l(200),
            water_bottom:     l(204),
            line2:            l(208),
            shot_point2:      l(212),
            midpoint_x:       l(216),
            midpoint_y:       l(220),
            source_x:         l(224),
            source_y:         l(228),
            group_x:          l(232),
            group_y:          l(236),
        }
    }
}

// ── In-place buffer helpers ──────────────────────────────────────────────────

/// Read a big-endian 4-byte header word.
#[inline]
pub fn read_word(buf: &[u8], off: usize) -> i32 {
    BigEndian::read_i32(&buf[off..off + 4])
}

/// Read a 2- or 4-byte big-endian header field as `f32`; other sizes read 0.
pub fn read_field(buf: &[u8], off: usize, size: usize) -> f32 {
    match size {
        2 if off + 2 <= buf.len() => BigEndian::read_i16(&buf[off..off + 2]) as f32,
        4 if off + 4 <= buf.len() => BigEndian::read_i32(&buf[off..off + 4]) as f32,
        _ => 0.0,
    }
}

/// Overwrite the sample count of a raw trace header.
pub fn set_samples(buf: &mut [u8], samples: usize) {
    let off = offset::SAMPLE_COUNT;
    BigEndian::write_u16(&mut buf[off..off + 2], samples as u16);
}

/// Stamp the trace-sequence-in-reel word of a raw trace header.
pub fn set_sequence_in_reel(buf: &mut [u8], sequence: u32) {
    let off = offset::SEQUENCE_IN_REEL;
    BigEndian::write_u32(&mut buf[off..off + 4], sequence);
}

/// Length of a trace record with `samples` samples of `bytes_per_sample`.
#[inline]
pub fn trace_len(samples: usize, bytes_per_sample: usize) -> usize {
    TRACE_HEADER_SIZE + samples * bytes_per_sample
}
