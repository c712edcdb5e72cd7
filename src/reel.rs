//! Reel headers: the 3200-byte text header and the 400-byte binary header.
//!
//! All binary header fields are big-endian.  Offsets follow the 1975 SEG
//! recommended standard: three 4-byte identifiers followed by 2-byte
//! fields, then 340 unassigned bytes that are carried verbatim.

use byteorder::{BigEndian, ByteOrder};
use std::io::{self, Write};
use std::path::Path;

use crate::format::DataFormat;

pub const TEXT_HEADER_SIZE:   usize = 3200;
pub const BINARY_HEADER_SIZE: usize = 400;

// ── Text header ──────────────────────────────────────────────────────────────

/// Opaque text (EBCDIC) reel header.  Always exactly 3200 bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextHeader {
    bytes: Vec<u8>,
}

impl Default for TextHeader {
    fn default() -> Self {
        Self { bytes: vec![0u8; TEXT_HEADER_SIZE] }
    }
}

impl TextHeader {
    /// Build from a record, zero-padding or truncating to 3200 bytes.
    pub fn from_bytes(record: &[u8]) -> Self {
        let mut bytes = vec![0u8; TEXT_HEADER_SIZE];
        let n = record.len().min(TEXT_HEADER_SIZE);
        bytes[..n].copy_from_slice(&record[..n]);
        Self { bytes }
    }

    /// Load an override file.  Returns the actual length on mismatch.
    pub fn load(path: &Path) -> io::Result<Result<Self, usize>> {
        let bytes = std::fs::read(path)?;
        if bytes.len() != TEXT_HEADER_SIZE {
            return Ok(Err(bytes.len()));
        }
        Ok(Ok(Self { bytes }))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

// ── Binary header ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryHeader {
    pub job_number:              i32,
    pub line_number:             i32,
    pub reel_number:             i32,
    pub traces_per_record:       i16,
    pub aux_traces_per_record:   i16,
    pub sample_interval:         i16,
    pub field_sample_interval:   i16,
    pub samples_per_trace:       i16,
    pub field_samples_per_trace: i16,
    pub format_code:             i16,
    pub cdp_fold:                i16,
    pub trace_sorting:           i16,
    pub vertical_sum:            i16,
    pub sweep_start:             i16,
    pub sweep_end:               i16,
    pub sweep_length:            i16,
    pub sweep_type:              i16,
    pub sweep_channel:           i16,
    pub sweep_taper_start:       i16,
    pub sweep_taper_end:         i16,
    pub taper_type:              i16,
    pub correlated:              i16,
    pub binary_gain_recovered:   i16,
    pub amplitude_recovery:      i16,
    pub measurement_system:      i16,
    pub impulse_polarity:        i16,
    pub vibratory_polarity:      i16,
    pub unassigned:              [u8; 340],
}

impl Default for BinaryHeader {
    fn default() -> Self {
        Self::decode(&[0u8; BINARY_HEADER_SIZE])
    }
}

impl BinaryHeader {
    pub fn decode(b: &[u8; BINARY_HEADER_SIZE]) -> Self {
        let s = |off: usize| BigEndian::read_i16(&b[off..off + 2]);
        let mut unassigned = [0u8; 340];
        unassigned.copy_from_slice(&b[60..]);
        Self {
            job_number:              BigEndian::read_i32(&b[0..4]),
            line_number:             BigEndian::read_i32(&b[4..8]),
            reel_number:             BigEndian::read_i32(&b[8..12]),
            traces_per_record:       s(12),
            aux_traces_per_record:   s(14),
            sample_interval:         s(16),
            field_sample_interval:   s(18),
            samples_per_trace:       s(20),
            field_samples_per_trace: s(22),
            format_code:             s(24),
            cdp_fold:                s(26),
            trace_sorting:           s(28),
            vertical_sum:            s(30),
            sweep_start:             s(32),
            sweep_end:               s(34),
            sweep_length:            s(36),
            sweep_type:              s(38),
            sweep_channel:           s(40),
            sweep_taper_start:       s(42),
            sweep_taper_end:         s(44),
            taper_type:              s(46),
            correlated:              s(48),
            binary_gain_recovered:   s(50),
            amplitude_recovery:      s(52),
            measurement_system:      s(54),
            impulse_polarity:        s(56),
            vibratory_polarity:      s(58),
            unassigned,
        }
    }

    /// Decode from a record of any length, zero-padding short records.
    pub fn from_record(record: &[u8]) -> Self {
        let mut b = [0u8; BINARY_HEADER_SIZE];
        let n = record.len().min(BINARY_HEADER_SIZE);
        b[..n].copy_from_slice(&record[..n]);
        Self::decode(&b)
    }

    pub fn encode(&self) -> [u8; BINARY_HEADER_SIZE] {
        let mut b = [0u8; BINARY_HEADER_SIZE];
        BigEndian::write_i32(&mut b[0..4], self.job_number);
        BigEndian::write_i32(&mut b[4..8], self.line_number);
        BigEndian::write_i32(&mut b[8..12], self.reel_number);
        let shorts = [
            self.traces_per_record,
            self.aux_traces_per_record,
            self.sample_interval,
            self.field_sample_interval,
            self.samples_per_trace,
            self.field_samples_per_trace,
            self.format_code,
            self.cdp_fold,
            self.trace_sorting,
            self.vertical_sum,
            self.sweep_start,
            self.sweep_end,
            self.sweep_length,
            self.sweep_type,
            self.sweep_channel,
            self.sweep_taper_start,
            self.sweep_taper_end,
            self.taper_type,
            self.correlated,
            self.binary_gain_recovered,
            self.amplitude_recovery,
            self.measurement_system,
            self.impulse_polarity,
            self.vibratory_polarity,
        ];
        for (i, v) in shorts.iter().enumerate() {
            let off = 12 + 2 * i;
            BigEndian::write_i16(&mut b[off..off + 2], *v);
        }
        b[60..].copy_from_slice(&self.unassigned);
        b
    }

    pub fn data_format(&self) -> DataFormat {
        DataFormat::from_code(self.format_code)
    }

    pub fn set_data_format(&mut self, format: DataFormat) {
        self.format_code = format.code();
    }

    /// Samples per trace for the reel.  The field is read as unsigned.
    pub fn samples(&self) -> usize {
        self.samples_per_trace as u16 as usize
    }

    /// Write a field-by-field listing of the header.
    pub fn dump<W: Write>(&self, mut out: W) -> io::Result<()> {
        const SWEEP:    &[&str] = &["linear", "parabolic", "exponential", "other"];
        const TAPER:    &[&str] = &["linear", "cos", "other"];
        const YES_NO:   &[&str] = &["no", "yes"];
        const MEASURE:  &[&str] = &["meters", "feet"];
        const RECOVERY: &[&str] = &["none", "spherical divergence", "AGC", "other"];

        let fmt = self.data_format();
        writeln!(out, "job identification number : {}", self.job_number)?;
        writeln!(out, "line number : {}", self.line_number)?;
        writeln!(out, "reel number : {}", self.reel_number)?;
        writeln!(out, "number of traces per record : {}", self.traces_per_record)?;
        writeln!(out, "number of auxiliary traces per record : {}", self.aux_traces_per_record)?;
        writeln!(out, "sampling interval ( for the reel ) : {}", self.sample_interval)?;
        writeln!(out, "sampling interval ( for original rec. ) : {}", self.field_sample_interval)?;
        writeln!(out, "number of samples ( for the reel ) : {}", self.samples_per_trace)?;
        writeln!(out, "number of samples ( for original rec.) : {}", self.field_samples_per_trace)?;
        writeln!(out, "data format : ({}) {}", self.format_code, fmt.describe())?;
        writeln!(out, "CDP fold : {}", self.cdp_fold)?;
        writeln!(out, "trace sorting : {}", self.trace_sorting)?;
        writeln!(out, "vertical sum : {}", self.vertical_sum)?;
        writeln!(out, "sweep frequency at start : {}", self.sweep_start)?;
        writeln!(out, "sweep frequency at end : {}", self.sweep_end)?;
        writeln!(out, "sweep length : {}", self.sweep_length)?;
        writeln!(out, "sweep type : ({}) {}", self.sweep_type, describe_code(self.sweep_type, SWEEP))?;
        writeln!(out, "trace number of sweep channel : {}", self.sweep_channel)?;
        writeln!(out, "sweep trace taper length at start : {}", self.sweep_taper_start)?;
        writeln!(out, "sweep trace taper length at end : {}", self.sweep_taper_end)?;
        writeln!(out, "taper type : ({}) {}", self.taper_type, describe_code(self.taper_type, TAPER))?;
        writeln!(out, "correlated : ({}) {}", self.correlated, describe_code(self.correlated, YES_NO))?;
        writeln!(out, "binary gain recovered : ({}) {}",
                 self.binary_gain_recovered, describe_code(self.binary_gain_recovered, YES_NO))?;
        writeln!(out, "amplitude recovery method : ({}) {}",
                 self.amplitude_recovery, describe_code(self.amplitude_recovery, RECOVERY))?;
        writeln!(out, "measurement system : ({}) {}",
                 self.measurement_system, describe_code(self.measurement_system, MEASURE))?;
        writeln!(out, "impulse signal polarity : {}", self.impulse_polarity)?;
        writeln!(out, "vibratory polarity : {}", self.vibratory_polarity)?;
        Ok(())
    }
}

/// Look up a 1-based enumerated code.  Out-of-table values are "Unknown code".
pub fn describe_code(code: i16, table: &[&'static str]) -> &'static str {
    if code >= 1 && (code as usize) <= table.len() {
        table[code as usize - 1]
    } else {
        "Unknown code"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_header_field_offsets() {
        let mut raw = [0u8; BINARY_HEADER_SIZE];
        BigEndian::write_i32(&mut raw[4..8], 77);
        BigEndian::write_i16(&mut raw[16..18], 4000);
        BigEndian::write_i16(&mut raw[20..22], 1500);
        BigEndian::write_i16(&mut raw[24..26], 1);
        BigEndian::write_i16(&mut raw[58..60], 2);
        raw[399] = 0xab;

        let hd = BinaryHeader::decode(&raw);
        assert_eq!(hd.line_number, 77);
        assert_eq!(hd.sample_interval, 4000);
        assert_eq!(hd.samples(), 1500);
        assert_eq!(hd.data_format(), DataFormat::IbmFloat);
        assert_eq!(hd.vibratory_polarity, 2);
        assert_eq!(hd.encode(), raw);
    }

    #[test]
    fn format_override_rewrites_code() {
        let mut hd = BinaryHeader::default();
        hd.format_code = 1;
        hd.set_data_format(DataFormat::IeeeFloat);
        assert_eq!(BigEndian::read_i16(&hd.encode()[24..26]), 5);
    }

    #[test]
    fn short_record_is_zero_padded() {
        let hd = BinaryHeader::from_record(&[0, 0, 0, 9]);
        assert_eq!(hd.job_number, 9);
        assert_eq!(hd.samples(), 0);
    }

    #[test]
    fn dump_reports_unknown_codes() {
        let mut hd = BinaryHeader::default();
        hd.format_code = 12;
        hd.sweep_type  = 2;
        let mut out = Vec::new();
        hd.dump(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("data format : (12) Unknown code"));
        assert!(text.contains("sweep type : (2) parabolic"));
        assert!(text.contains("taper type : (0) Unknown code"));
    }

    #[test]
    fn text_header_is_fixed_size() {
        assert_eq!(TextHeader::from_bytes(b"C 1 CLIENT").as_bytes().len(), TEXT_HEADER_SIZE);
        assert_eq!(TextHeader::from_bytes(&[1u8; 5000]).as_bytes(), &[1u8; TEXT_HEADER_SIZE][..]);
    }
}
