//! Sample encodings: data-format codes and IBM/IEEE conversion.
//!
//! # Data formats
//! The binary reel header declares one data-format code for every trace in
//! the reel.  Codes outside the table decode to [`DataFormat::Unknown`] and
//! are never rejected; the code is carried through so it can be reported.
//!
//! # IBM hexadecimal float
//! `sign(1) | exponent(7, excess 64, base 16) | mantissa(24)`.  Conversion
//! to IEEE-754 single precision is table driven: the leading nibble of the
//! mantissa selects how far the fraction has to move to become a base-2
//! normalised value, and the matching exponent bias.  Values beyond
//! `f32::MAX` saturate, values below the smallest normal `f32` become a
//! signed zero.  Unnormalised IBM values still map to *some* output; that
//! loss of fidelity is a property of the format, not an error.
//!
//! # Endianness
//! Sample payloads are big-endian on the medium.  Conversion helpers work
//! on host-order `u32` words; [`convert_samples`] handles the byte order.

use byteorder::{BigEndian, ByteOrder};

// ── Data-format codes ───────────────────────────────────────────────────────

/// Per-sample encoding declared by the binary reel header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    /// Code 1: IBM hexadecimal float, 4 bytes.
    IbmFloat,
    /// Code 2: two's complement integer, 4 bytes.
    Int32,
    /// Code 3: two's complement integer, 2 bytes.
    Int16,
    /// Code 4: fixed point with gain code, 4 bytes.
    FixedGain,
    /// Code 5: IEEE-754 single precision, 4 bytes.
    IeeeFloat,
    /// Any other code, kept verbatim.
    Unknown(i16),
}

impl DataFormat {
    pub fn from_code(code: i16) -> Self {
        match code {
            1 => DataFormat::IbmFloat,
            2 => DataFormat::Int32,
            3 => DataFormat::Int16,
            4 => DataFormat::FixedGain,
            5 => DataFormat::IeeeFloat,
            c => DataFormat::Unknown(c),
        }
    }

    pub fn code(self) -> i16 {
        match self {
            DataFormat::IbmFloat   => 1,
            DataFormat::Int32      => 2,
            DataFormat::Int16      => 3,
            DataFormat::FixedGain  => 4,
            DataFormat::IeeeFloat  => 5,
            DataFormat::Unknown(c) => c,
        }
    }

    /// Bytes per sample on the medium.  Only code 3 is 2 bytes wide.
    #[inline]
    pub fn bytes_per_sample(self) -> usize {
        match self {
            DataFormat::Int16 => 2,
            _                 => 4,
        }
    }

    /// Human-readable description (diagnostics only).
    pub fn describe(self) -> &'static str {
        match self {
            DataFormat::IbmFloat   => "floating point",
            DataFormat::Int32      => "fixed point(4 bytes)",
            DataFormat::Int16      => "fixed point(2 bytes)",
            DataFormat::FixedGain  => "fixed point with gain code",
            DataFormat::IeeeFloat  => "ieee floating point",
            DataFormat::Unknown(_) => "Unknown code",
        }
    }

    /// Parse an output format override from the command line.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ibm"     => Some(DataFormat::IbmFloat),
            "integer" => Some(DataFormat::Int32),
            "ieee"    => Some(DataFormat::IeeeFloat),
            _         => None,
        }
    }

    pub fn is_known(self) -> bool {
        !matches!(self, DataFormat::Unknown(_))
    }
}

impl std::fmt::Display for DataFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}) {}", self.code(), self.describe())
    }
}

// ── IBM <-> IEEE ─────────────────────────────────────────────────────────────

const SIGN_BIT: u32 = 0x8000_0000;

/// Largest IBM magnitude that still fits below `f32::MAX`.
const IBM_MAX_CONVERTIBLE: u32 = 0x60ff_ffff;
/// Smallest IBM magnitude that maps to a normal `f32`.
const IBM_MIN_CONVERTIBLE: u32 = 0x2140_0000;
/// Saturation value: `f32::MAX`.
const IEEE_MAX: u32 = 0x7f7f_ffff;

/// Mantissa multiplier keyed on the top three mantissa bits.
const IBM_SHIFT: [i32; 8] = [8, 4, 2, 2, 1, 1, 1, 1];
/// Exponent bias keyed on the top three mantissa bits.
const IBM_BIAS: [i32; 8] = [
    0x2180_0000, 0x2140_0000, 0x2100_0000, 0x2100_0000,
    0x20c0_0000, 0x20c0_0000, 0x20c0_0000, 0x20c0_0000,
];

/// Right shift that aligns an IEEE mantissa on a hex digit, keyed on `exponent mod 4`.
const IEEE_SHIFT: [u32; 4] = [2, 1, 0, 3];
/// Bias added to the halved IEEE exponent (and the high part of the mantissa).
const IEEE_BIAS: [u32; 4] = [0x2120_0000, 0x2140_0000, 0x2180_0000, 0x2210_0000];

/// Convert one IBM float word to IEEE-754 bits.
#[inline]
pub fn ibm_to_ieee(word: u32) -> u32 {
    let sign      = word & SIGN_BIT;
    let magnitude = word & !SIGN_BIT;
    if magnitude > IBM_MAX_CONVERTIBLE {
        return IEEE_MAX | sign;
    }
    if magnitude < IBM_MIN_CONVERTIBLE {
        return sign;
    }
    let mant = (word & 0x00ff_ffff) as i32;
    let ix   = (mant >> 21) as usize;
    let exp  = (word & 0x7f00_0000) as i32 - IBM_BIAS[ix];
    (mant * IBM_SHIFT[ix] + exp * 2) as u32 | sign
}

/// Convert one IEEE-754 word to IBM float bits.  `±0.0` maps to IBM `±0`.
#[inline]
pub fn ieee_to_ibm(word: u32) -> u32 {
    let sign = word & SIGN_BIT;
    if word & !SIGN_BIT == 0 {
        return sign;
    }
    let ix   = ((word >> 23) & 0x3) as usize;
    let mant = (word & 0x007f_ffff) >> IEEE_SHIFT[ix];
    let exp  = ((word & 0x7e00_0000) >> 1) + IEEE_BIAS[ix];
    (mant + exp) | sign
}

/// Element-wise [`ibm_to_ieee`].  Converts `min(input.len(), output.len())` words.
pub fn ibm_to_ieee_words(input: &[u32], output: &mut [u32]) {
    for (o, &i) in output.iter_mut().zip(input) {
        *o = ibm_to_ieee(i);
    }
}

/// Element-wise [`ieee_to_ibm`].  Converts `min(input.len(), output.len())` words.
pub fn ieee_to_ibm_words(input: &[u32], output: &mut [u32]) {
    for (o, &i) in output.iter_mut().zip(input) {
        *o = ieee_to_ibm(i);
    }
}

/// Decode an IBM float word to `f32`.
#[inline]
pub fn ibm_to_f32(word: u32) -> f32 {
    f32::from_bits(ibm_to_ieee(word))
}

/// Encode an `f32` as an IBM float word.
#[inline]
pub fn f32_to_ibm(value: f32) -> u32 {
    ieee_to_ibm(value.to_bits())
}

// ── Sample payloads ──────────────────────────────────────────────────────────

/// Decode one sample to `f32`.  `weight` scales 2-byte integers only.
fn decode_sample(bytes: &[u8], format: DataFormat, weight: f32) -> f32 {
    match format {
        DataFormat::IbmFloat  => ibm_to_f32(BigEndian::read_u32(bytes)),
        DataFormat::Int32     => BigEndian::read_i32(bytes) as f32,
        DataFormat::Int16     => BigEndian::read_i16(bytes) as f32 * weight,
        DataFormat::FixedGain => {
            let gain     = bytes[1] as i32;
            let mantissa = BigEndian::read_i16(&bytes[2..4]) as f32;
            mantissa * 2f32.powi(-gain)
        }
        DataFormat::IeeeFloat | DataFormat::Unknown(_) => BigEndian::read_f32(bytes),
    }
}

fn encode_sample(value: f32, format: DataFormat, out: &mut [u8]) {
    match format {
        DataFormat::IbmFloat  => BigEndian::write_u32(out, f32_to_ibm(value)),
        // `as` saturates and maps NaN to 0.
        DataFormat::Int32     => BigEndian::write_i32(out, value.round() as i32),
        DataFormat::Int16     => BigEndian::write_i16(out, value.round() as i16),
        DataFormat::FixedGain => {
            out[0] = 0;
            out[1] = 0;
            BigEndian::write_i16(&mut out[2..4], value.round() as i16);
        }
        DataFormat::IeeeFloat | DataFormat::Unknown(_) => BigEndian::write_f32(out, value),
    }
}

/// Convert a big-endian sample payload from one data format to another.
///
/// Converts as many samples as fit in both `input` and `output` and returns
/// that count.  IBM<->IEEE conversions are bitwise (no rounding through
/// `f32` arithmetic), 2-byte to 4-byte integer widening is exact, and all
/// other pairs go through `f32`.  `weight` is the trace weighting multiplier
/// (`2^-w`), applied only when 2-byte integers are written as IBM floats.
pub fn convert_samples(
    input:  &[u8],
    from:   DataFormat,
    output: &mut [u8],
    to:     DataFormat,
    weight: f32,
) -> usize {
    let in_size  = from.bytes_per_sample();
    let out_size = to.bytes_per_sample();
    let count    = (input.len() / in_size).min(output.len() / out_size);

    if from == to || matches!(from, DataFormat::Unknown(_)) && out_size == in_size {
        let n = count * in_size;
        output[..n].copy_from_slice(&input[..n]);
        return count;
    }

    let src = input.chunks_exact(in_size).take(count);
    let dst = output.chunks_exact_mut(out_size);
    match (from, to) {
        (DataFormat::IbmFloat, DataFormat::IeeeFloat) => {
            for (s, d) in src.zip(dst) {
                BigEndian::write_u32(d, ibm_to_ieee(BigEndian::read_u32(s)));
            }
        }
        (DataFormat::IeeeFloat, DataFormat::IbmFloat) => {
            for (s, d) in src.zip(dst) {
                BigEndian::write_u32(d, ieee_to_ibm(BigEndian::read_u32(s)));
            }
        }
        (DataFormat::Int16, DataFormat::Int32) => {
            for (s, d) in src.zip(dst) {
                BigEndian::write_i32(d, BigEndian::read_i16(s) as i32);
            }
        }
        _ => {
            let weight = if to == DataFormat::IbmFloat { weight } else { 1.0 };
            for (s, d) in src.zip(dst) {
                encode_sample(decode_sample(s, from, weight), to, d);
            }
        }
    }
    count
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn ibm_known_values() {
        assert_eq!(ibm_to_ieee(0x4110_0000), 1.0f32.to_bits());
        assert_eq!(ibm_to_ieee(0xc276_a000), (-118.625f32).to_bits());
        assert_eq!(ibm_to_ieee(0x4180_0000), 8.0f32.to_bits());
        assert_eq!(ieee_to_ibm(1.0f32.to_bits()), 0x4110_0000);
        assert_eq!(ieee_to_ibm(2.0f32.to_bits()), 0x4120_0000);
        assert_eq!(ieee_to_ibm((-118.625f32).to_bits()), 0xc276_a000);
    }

    #[test]
    fn ibm_saturates_and_underflows() {
        assert_eq!(ibm_to_ieee(0x7fff_ffff), f32::MAX.to_bits());
        assert_eq!(ibm_to_ieee(0xffff_ffff), f32::MIN.to_bits());
        assert_eq!(ibm_to_ieee(0x60ff_ffff), f32::MAX.to_bits());
        assert_eq!(ibm_to_ieee(0x0010_0000), 0);
        assert_eq!(ibm_to_ieee(0x8010_0000), SIGN_BIT);
        assert_eq!(ibm_to_ieee(0x2140_0000), f32::MIN_POSITIVE.to_bits());
    }

    #[test]
    fn zero_maps_to_zero() {
        assert_eq!(ieee_to_ibm(0), 0);
        assert_eq!(ieee_to_ibm(SIGN_BIT), SIGN_BIT);
        assert_eq!(ibm_to_ieee(0), 0);
    }

    #[test]
    fn word_slices_preserve_length() {
        let input  = [0x4110_0000, 0xc276_a000, 0];
        let mut ieee = [0u32; 3];
        let mut back = [0u32; 3];
        ibm_to_ieee_words(&input, &mut ieee);
        ieee_to_ibm_words(&ieee, &mut back);
        assert_eq!(back, input);
    }

    proptest! {
        #[test]
        fn ibm_round_trip_is_exact(
            negative in any::<bool>(),
            exponent in 0x21u32..=0x60,
            mantissa in 0x10_0000u32..=0xff_ffff,
        ) {
            // Below 0x2140_0000 the value is subnormal in f32 and flushes to zero.
            let mantissa = if exponent == 0x21 { mantissa | 0x40_0000 } else { mantissa };
            let sign = if negative { SIGN_BIT } else { 0 };
            let ibm  = sign | (exponent << 24) | mantissa;
            prop_assert_eq!(ieee_to_ibm(ibm_to_ieee(ibm)), ibm);
        }
    }

    #[test]
    fn int16_to_ibm_applies_weight() {
        let mut input = [0u8; 4];
        BigEndian::write_i16(&mut input[0..2], 8);
        BigEndian::write_i16(&mut input[2..4], -4);
        let mut out = [0u8; 8];
        let n = convert_samples(&input, DataFormat::Int16, &mut out, DataFormat::IbmFloat, 0.25);
        assert_eq!(n, 2);
        assert_eq!(ibm_to_f32(BigEndian::read_u32(&out[0..4])), 2.0);
        assert_eq!(ibm_to_f32(BigEndian::read_u32(&out[4..8])), -1.0);
    }

    #[test]
    fn int16_to_ieee_ignores_weight() {
        let mut input = [0u8; 2];
        BigEndian::write_i16(&mut input, 8);
        let mut out = [0u8; 4];
        convert_samples(&input, DataFormat::Int16, &mut out, DataFormat::IeeeFloat, 0.25);
        assert_eq!(BigEndian::read_f32(&out), 8.0);
    }

    #[test]
    fn int16_widens_exactly() {
        let mut input = [0u8; 2];
        BigEndian::write_i16(&mut input, -1234);
        let mut out = [0u8; 4];
        convert_samples(&input, DataFormat::Int16, &mut out, DataFormat::Int32, 0.5);
        assert_eq!(BigEndian::read_i32(&out), -1234);
    }

    #[test]
    fn int32_to_ieee() {
        let mut input = [0u8; 4];
        BigEndian::write_i32(&mut input, 42);
        let mut out = [0u8; 4];
        convert_samples(&input, DataFormat::Int32, &mut out, DataFormat::IeeeFloat, 1.0);
        assert_eq!(BigEndian::read_f32(&out), 42.0);
    }

    #[test]
    fn fixed_gain_decodes_mantissa_and_gain() {
        let input = [0u8, 2, 0x00, 0x10];
        let mut out = [0u8; 4];
        convert_samples(&input, DataFormat::FixedGain, &mut out, DataFormat::IeeeFloat, 1.0);
        assert_eq!(BigEndian::read_f32(&out), 4.0);
    }

    #[test]
    fn unknown_codes_are_kept() {
        assert_eq!(DataFormat::from_code(9), DataFormat::Unknown(9));
        assert_eq!(DataFormat::Unknown(9).code(), 9);
        assert_eq!(DataFormat::Unknown(9).bytes_per_sample(), 4);
        assert_eq!(DataFormat::Unknown(9).describe(), "Unknown code");
    }

    #[test]
    fn output_names() {
        assert_eq!(DataFormat::from_name("IBM"), Some(DataFormat::IbmFloat));
        assert_eq!(DataFormat::from_name("integer"), Some(DataFormat::Int32));
        assert_eq!(DataFormat::from_name("ieee"), Some(DataFormat::IeeeFloat));
        assert_eq!(DataFormat::from_name("vax"), None);
    }
}
