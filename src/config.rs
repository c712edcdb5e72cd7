//! Run configuration.
//!
//! [`CopyOptions`] is what the front end hands the transcoder.  Input and
//! output names (`-`, `+base` or a path) and the coverage and cube
//! descriptions parse with [`FromStr`] so the CLI can take plain strings.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::format::DataFormat;
use crate::medium::{WriterOptions, RELOAD_ATTEMPTS, RELOAD_POLL_INTERVAL};
use crate::reel::TextHeader;
use crate::trace::{offset, TRACE_HEADER_SIZE};

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown sample format {0:?} (expected ibm, integer, ieee or 1, 2, 5)")]
    UnknownFormat(String),
    #[error("cannot write samples as {0}")]
    UnsupportedOutputFormat(DataFormat),
    #[error("bad coverage description {0:?}: {1}")]
    BadCoverage(String, &'static str),
    #[error("bad cube description {0:?}: {1}")]
    BadCube(String, &'static str),
    #[error("text header file {path} is {len} bytes, expected 3200")]
    TextHeaderLength { path: PathBuf, len: usize },
    #[error("cube output cannot be combined with output splitting")]
    CubeWithSplit,
    #[error("IO error on {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
}

// ── Input / output specs ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSpec {
    /// `-`
    Stdin,
    /// `+base`: read `base1`, `base2`, ... in turn.
    Numbered(PathBuf),
    Path(PathBuf),
}

impl FromStr for InputSpec {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "-" => InputSpec::Stdin,
            _ => match s.strip_prefix('+') {
                Some(base) => InputSpec::Numbered(PathBuf::from(base)),
                None       => InputSpec::Path(PathBuf::from(s)),
            },
        })
    }
}

impl InputSpec {
    /// Path of the `n`-th numbered input file (from 1).
    pub fn numbered_path(base: &Path, n: u32) -> PathBuf {
        let mut name = base.as_os_str().to_owned();
        name.push(n.to_string());
        PathBuf::from(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSpec {
    /// `-`
    Stdout,
    /// `+base`: one file `base-{n}` per input reel.
    PerReel(PathBuf),
    Path(PathBuf),
}

impl FromStr for OutputSpec {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "-" => OutputSpec::Stdout,
            _ => match s.strip_prefix('+') {
                Some(base) => OutputSpec::PerReel(PathBuf::from(base)),
                None       => OutputSpec::Path(PathBuf::from(s)),
            },
        })
    }
}

/// Parse a sample format override: a name or a numeric code.
pub fn parse_format(s: &str) -> Result<DataFormat, ConfigError> {
    let fmt = match s.trim().parse::<i16>() {
        Ok(code) => DataFormat::from_code(code),
        Err(_)   => DataFormat::from_name(s).ok_or_else(|| ConfigError::UnknownFormat(s.into()))?,
    };
    match fmt {
        DataFormat::IbmFloat | DataFormat::Int32 | DataFormat::IeeeFloat => Ok(fmt),
        DataFormat::Unknown(_) => Err(ConfigError::UnknownFormat(s.into())),
        other => Err(ConfigError::UnsupportedOutputFormat(other)),
    }
}

// ── Coverage ─────────────────────────────────────────────────────────────────

/// Number of header fields written per trace to a coverage file.
pub const COVERAGE_FIELDS: usize = 7;

/// `"<file> [off size]..."`.  Pairs replace the default slots in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageSpec {
    pub path:   PathBuf,
    /// `(byte offset, size)` per slot; size 0 always reads 0.
    pub fields: [(usize, usize); COVERAGE_FIELDS],
}

impl CoverageSpec {
    pub fn default_fields() -> [(usize, usize); COVERAGE_FIELDS] {
        [
            (offset::SOURCE_X, 4),
            (offset::SOURCE_Y, 4),
            (offset::GROUP_X, 4),
            (offset::GROUP_Y, 4),
            (0, 0),
            (0, 0),
            (0, 0),
        ]
    }
}

impl FromStr for CoverageSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = |why: &'static str| ConfigError::BadCoverage(s.to_string(), why);
        let mut words = s.split_whitespace();
        let path = words.next().ok_or_else(|| bad("missing file name"))?;

        let mut flat = [0usize; 2 * COVERAGE_FIELDS];
        for (i, (off, size)) in Self::default_fields().iter().enumerate() {
            flat[2 * i] = *off;
            flat[2 * i + 1] = *size;
        }
        for (i, word) in words.enumerate() {
            if i >= flat.len() {
                return Err(bad("more than seven offset/size pairs"));
            }
            flat[i] = word.parse().map_err(|_| bad("offsets and sizes must be integers"))?;
        }

        let mut fields = [(0, 0); COVERAGE_FIELDS];
        for (i, slot) in fields.iter_mut().enumerate() {
            let (off, size) = (flat[2 * i], flat[2 * i + 1]);
            if !matches!(size, 0 | 2 | 4) {
                return Err(bad("field sizes must be 2 or 4"));
            }
            if off + size > TRACE_HEADER_SIZE {
                return Err(bad("field lies outside the trace header"));
            }
            *slot = (off, size);
        }
        Ok(Self { path: PathBuf::from(path), fields })
    }
}

// ── Cube ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Axis {
    pub min:  f32,
    pub max:  f32,
    pub step: f32,
}

impl Axis {
    pub fn contains(&self, v: f32) -> bool {
        v >= self.min && v <= self.max
    }

    /// Cells along the axis.
    pub fn cells(&self) -> usize {
        grid(self.max - self.min, self.step).max(0) as usize + 1
    }
}

/// Nearest grid index of `x` for cell size `step`.
pub fn grid(x: f32, step: f32) -> i64 {
    (x / step + 0.5).floor() as i64
}

/// `"<file> lmin lmax lstep tmin tmax tstep smin smax sstep"`.
#[derive(Debug, Clone, PartialEq)]
pub struct CubeSpec {
    pub path:   PathBuf,
    pub line:   Axis,
    pub trace:  Axis,
    pub sample: Axis,
}

impl FromStr for CubeSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = |why: &'static str| ConfigError::BadCube(s.to_string(), why);
        let mut words = s.split_whitespace();
        let path = words.next().ok_or_else(|| bad("missing file name"))?;
        let nums = words
            .map(|w| w.parse::<f32>().map_err(|_| bad("bounds must be numbers")))
            .collect::<Result<Vec<_>, _>>()?;
        if nums.len() != 9 {
            return Err(bad("expected nine numbers: min max step for line, trace and sample"));
        }
        let axis = |i: usize| Axis { min: nums[i], max: nums[i + 1], step: nums[i + 2] };
        let (line, trace, sample) = (axis(0), axis(3), axis(6));
        if [line, trace, sample].iter().any(|a| !(a.step > 0.0)) {
            return Err(bad("steps must be positive"));
        }
        Ok(Self { path: PathBuf::from(path), line, trace, sample })
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{} step {}", self.min, self.max, self.step)
    }
}

// ── CopyOptions ──────────────────────────────────────────────────────────────

/// Everything a copy run needs.
#[derive(Debug, Clone)]
pub struct CopyOptions {
    pub input:                InputSpec,
    /// `None` reads and reports without writing.
    pub output:               Option<OutputSpec>,
    /// Output sample format; `None` keeps the input format.
    pub format_override:      Option<DataFormat>,
    /// Exclusive CDP range; inactive when `cdp_min >= cdp_max`.
    pub cdp_min:              i32,
    pub cdp_max:              i32,
    pub max_traces:           Option<u64>,
    pub skip_traces:          u64,
    pub split_size:           Option<u64>,
    pub split_writes_header:  bool,
    /// Read tape input across filemarks.
    pub all_files_in_input:   bool,
    pub text_header_override: Option<PathBuf>,
    pub coverage:             Option<CoverageSpec>,
    pub cube:                 Option<CubeSpec>,
    /// Input records carry an 8-digit ASCII length prefix.
    pub blocked:              bool,
    /// Do not write reel headers to the output.
    pub no_headers:           bool,
    /// Print each reel's binary header.
    pub dump_binary_header:   bool,
    /// Log short header reads.
    pub report_short_headers: bool,
    /// Per-trace header listing file.
    pub listing:              Option<PathBuf>,
    /// JSON run summary file.
    pub summary_path:         Option<PathBuf>,
    pub poll_interval:        Duration,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            input:                InputSpec::Stdin,
            output:               None,
            format_override:      None,
            cdp_min:              0,
            cdp_max:              0,
            max_traces:           None,
            skip_traces:          0,
            split_size:           None,
            split_writes_header:  false,
            all_files_in_input:   false,
            text_header_override: None,
            coverage:             None,
            cube:                 None,
            blocked:              false,
            no_headers:           false,
            dump_binary_header:   false,
            report_short_headers: true,
            listing:              None,
            summary_path:         None,
            poll_interval:        RELOAD_POLL_INTERVAL,
        }
    }
}

impl CopyOptions {
    /// Reject combinations that cannot run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cube.is_some() && self.split_size.is_some() {
            return Err(ConfigError::CubeWithSplit);
        }
        if let Some(fmt) = self.format_override {
            if !matches!(fmt, DataFormat::IbmFloat | DataFormat::Int32 | DataFormat::IeeeFloat) {
                return Err(ConfigError::UnsupportedOutputFormat(fmt));
            }
        }
        Ok(())
    }

    /// Load the text header override, if configured.
    pub fn load_text_header(&self) -> Result<Option<TextHeader>, ConfigError> {
        let Some(path) = &self.text_header_override else {
            return Ok(None);
        };
        match TextHeader::load(path) {
            Ok(Ok(hd))  => Ok(Some(hd)),
            Ok(Err(len)) => Err(ConfigError::TextHeaderLength { path: path.clone(), len }),
            Err(source) => Err(ConfigError::Io { path: path.clone(), source }),
        }
    }

    pub fn writer_options(&self) -> WriterOptions {
        WriterOptions {
            split_size:          self.split_size,
            split_writes_header: self.split_writes_header,
            poll_interval:       self.poll_interval,
            reload_attempts:     RELOAD_ATTEMPTS,
        }
    }
}
