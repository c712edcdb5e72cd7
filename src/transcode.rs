//! Reel orchestration.
//!
//! A reel is read in phases: text header, binary header, then traces until
//! the medium reports a clean end.  When nothing consumes traces they are
//! only counted.  After each reel the continuation rules decide whether to
//! move to the next numbered input file, keep reading the same stream, ask
//! for the next tape volume, or stop.
//!
//! All run-wide accumulators live in [`CopyState`]; the output trace
//! sequence counter lives in the [`MediumWriter`].

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::PathBuf;
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, CopyOptions, InputSpec, OutputSpec};
use crate::filter::TraceFilter;
use crate::format::{convert_samples, DataFormat};
use crate::listing::HeaderListing;
use crate::medium::tape::is_tape;
use crate::medium::{DeviceOpener, MediumError, MediumReader, MediumWriter, TapeDevice};
use crate::reel::{BinaryHeader, TextHeader, BINARY_HEADER_SIZE, TEXT_HEADER_SIZE};
use crate::sink::{CoverageSink, CubeSink, Sink, SinkError};
use crate::summary::CopySummary;
use crate::trace::{set_samples, trace_len, TraceHeader, TRACE_HEADER_SIZE};

/// Sample-count mismatches logged per reel before going quiet.
pub const MISMATCH_LOG_LIMIT: u64 = 5;

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Medium(#[from] MediumError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error("cannot open input {path}: {source}")]
    OpenInput { path: PathBuf, source: io::Error },
    #[error("cannot open output {path}: {source}")]
    OpenOutput { path: PathBuf, source: MediumError },
    #[error("cannot create header listing {path}: {source}")]
    OpenListing { path: PathBuf, source: io::Error },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Volume confirmation ──────────────────────────────────────────────────────

/// Asked whether another input tape volume should be read.
pub trait VolumeConfirm {
    fn next_volume(&mut self, reel: u32) -> bool;
}

/// Never continues to another volume.
pub struct NeverConfirm;

impl VolumeConfirm for NeverConfirm {
    fn next_volume(&mut self, reel: u32) -> bool {
        info!(reel, "end of input volume, not waiting for another");
        false
    }
}

// ── State ────────────────────────────────────────────────────────────────────

/// Geometry fixed by the first reel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Geometry {
    samples: usize,
    format:  DataFormat,
}

/// Run-wide mutable state.
#[derive(Debug, Default)]
pub struct CopyState {
    pub summary:     CopySummary,
    geometry:        Option<Geometry>,
    last_text:       Option<TextHeader>,
    last_binary:     Option<BinaryHeader>,
    headers_written: bool,
    input_index:     u32,
}

/// How a reel ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReelEnd {
    /// Clean end of the medium.  `had_header` is false when the reel was
    /// empty.
    Exhausted { had_header: bool },
    /// The trace cap was reached.
    TraceCap,
}

/// What happens after a reel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    NextFile,
    SameStream,
    NextVolume,
    Finished,
}

// ── Transcoder ───────────────────────────────────────────────────────────────

pub struct Transcoder {
    opts:          CopyOptions,
    text_override: Option<TextHeader>,
    filter:        TraceFilter,
    sinks:         Vec<Sink>,
    listing:       Option<HeaderListing<io::BufWriter<File>>>,
    confirm:       Box<dyn VolumeConfirm>,
    state:         CopyState,
}

impl Transcoder {
    /// Validate the options and open every output.
    pub fn new(opts: CopyOptions) -> Result<Self, TranscodeError> {
        opts.validate()?;
        let text_override = opts.load_text_header()?;

        let mut sinks = Vec::new();
        if let Some(out) = &opts.output {
            sinks.push(Sink::Copy(open_output(out, &opts)?));
        }
        if let Some(cov) = &opts.coverage {
            sinks.push(Sink::Coverage(CoverageSink::create(cov)?));
        }
        if let Some(cube) = &opts.cube {
            sinks.push(Sink::Cube(CubeSink::create(cube)?));
        }
        let listing = match &opts.listing {
            Some(path) => Some(
                HeaderListing::create(path)
                    .map_err(|source| TranscodeError::OpenListing { path: path.clone(), source })?,
            ),
            None => None,
        };

        Ok(Self {
            filter: TraceFilter::new(opts.cdp_min, opts.cdp_max, opts.skip_traces),
            opts,
            text_override,
            sinks,
            listing,
            confirm: Box::new(NeverConfirm),
            state: CopyState::default(),
        })
    }

    /// Replace the output medium (placed first, ahead of other sinks).
    pub fn with_writer(mut self, writer: MediumWriter) -> Self {
        self.sinks.retain(|s| !matches!(s, Sink::Copy(_)));
        self.sinks.insert(0, Sink::Copy(writer));
        self
    }

    pub fn with_confirm(mut self, confirm: Box<dyn VolumeConfirm>) -> Self {
        self.confirm = confirm;
        self
    }

    pub fn state(&self) -> &CopyState {
        &self.state
    }

    /// Copy everything the configured input provides.
    pub fn run(&mut self) -> Result<CopySummary, TranscodeError> {
        self.state.input_index = 1;
        let reader = open_input(&self.opts, 1)?.ok_or_else(|| TranscodeError::OpenInput {
            path:   describe_input(&self.opts.input, 1),
            source: io::Error::new(io::ErrorKind::NotFound, "no such input"),
        })?;
        self.run_from(reader)
    }

    /// Copy from an already open reader, following the continuation rules.
    pub fn run_from(&mut self, mut reader: MediumReader) -> Result<CopySummary, TranscodeError> {
        loop {
            let end = self.copy_reel(&mut reader)?;
            match self.continuation(end, reader.is_tape()) {
                Continuation::Finished   => break,
                Continuation::SameStream => continue,
                Continuation::NextFile   => {
                    self.state.input_index += 1;
                    match open_input(&self.opts, self.state.input_index)? {
                        Some(next) => {
                            let path = describe_input(&self.opts.input, self.state.input_index);
                            info!(input = %path.display(), "next input file");
                            reader = next;
                        }
                        None => break,
                    }
                }
                Continuation::NextVolume => match open_input(&self.opts, 1)? {
                    Some(next) => reader = next,
                    None => break,
                },
            }
        }
        self.finish()
    }

    /// Decide what follows a reel.
    pub fn continuation(&mut self, end: ReelEnd, input_is_tape: bool) -> Continuation {
        let had_header = match end {
            ReelEnd::TraceCap => return Continuation::Finished,
            ReelEnd::Exhausted { had_header } => had_header,
        };
        if matches!(self.opts.input, InputSpec::Numbered(_)) {
            return Continuation::NextFile;
        }
        let per_reel = matches!(self.opts.output, Some(OutputSpec::PerReel(_)));
        if per_reel || self.opts.max_traces.is_some() {
            return if had_header { Continuation::SameStream } else { Continuation::Finished };
        }
        if input_is_tape && self.confirm.next_volume(self.state.summary.reels + 1) {
            return Continuation::NextVolume;
        }
        Continuation::Finished
    }

    // ── One reel ─────────────────────────────────────────────────────────────

    /// Copy one reel.
    pub fn copy_reel(&mut self, reader: &mut MediumReader) -> Result<ReelEnd, TranscodeError> {
        let Some((text, binary, pending)) = self.read_headers(reader)? else {
            return Ok(ReelEnd::Exhausted { had_header: false });
        };
        self.state.summary.reels += 1;
        let reel = self.state.summary.reels;

        if self.opts.dump_binary_header {
            binary.dump(io::stderr().lock())?;
        }

        let geometry = self.check_geometry(&binary, reel);
        let out_format = self.opts.format_override.unwrap_or(geometry.format);
        info!(reel, samples = geometry.samples, format = %geometry.format, output = %out_format, "reel headers read");

        self.emit_headers(&text, &binary, geometry, out_format)?;
        self.state.last_text   = Some(text);
        self.state.last_binary = Some(binary);

        let before = self.state.summary.traces_read;
        let end = if self.sinks.is_empty() && self.listing.is_none() {
            self.skip_traces(reader, pending)?
        } else {
            self.stream_traces(reader, pending, geometry, out_format)?
        };
        info!(reel, traces = self.state.summary.traces_read - before, "reel done");
        Ok(end)
    }

    /// Read the text and binary headers.  Returns `None` on an empty reel,
    /// and a pending trace record when the binary header is missing.
    #[allow(clippy::type_complexity)]
    fn read_headers(
        &mut self,
        reader: &mut MediumReader,
    ) -> Result<Option<(TextHeader, BinaryHeader, Option<Vec<u8>>)>, TranscodeError> {
        let mut rec = vec![0u8; reader.request_len(TEXT_HEADER_SIZE)];
        let n = reader.read(&mut rec)?;
        if n == 0 {
            return Ok(None);
        }

        let (text, binary_record) = if n == BINARY_HEADER_SIZE {
            warn!("{BINARY_HEADER_SIZE}-byte record where the text header was expected, using it as the binary header");
            (self.state.last_text.clone().unwrap_or_default(), Some(rec[..n].to_vec()))
        } else {
            self.note_short_header("text", n, TEXT_HEADER_SIZE, &rec);
            (TextHeader::from_bytes(&rec[..n]), None)
        };
        let text = self.text_override.clone().unwrap_or(text);

        let mut pending = None;
        let binary = match binary_record {
            Some(record) => BinaryHeader::from_record(&record),
            None => {
                let mut rec = vec![0u8; reader.request_len(BINARY_HEADER_SIZE)];
                let n = reader.read(&mut rec)?;
                if n > BINARY_HEADER_SIZE {
                    warn!(bytes = n, "binary header missing, record is the first trace");
                    pending = Some(rec[..n].to_vec());
                    self.state.last_binary.clone().unwrap_or_default()
                } else {
                    if n > 0 {
                        self.note_short_header("binary", n, BINARY_HEADER_SIZE, &rec);
                    } else {
                        warn!("input ended after the text header");
                    }
                    BinaryHeader::from_record(&rec[..n])
                }
            }
        };
        Ok(Some((text, binary, pending)))
    }

    fn note_short_header(&mut self, which: &str, got: usize, expected: usize, rec: &[u8]) {
        if got >= expected {
            return;
        }
        self.state.summary.short_reads += 1;
        if self.opts.report_short_headers {
            warn!(got, expected, "short {which} header, zero-padded");
            debug!(head = %hex::encode(&rec[..got.min(32)]), "short {which} header bytes");
        }
    }

    /// Fix the geometry on the first reel; report disagreement on later ones.
    fn check_geometry(&mut self, binary: &BinaryHeader, reel: u32) -> Geometry {
        let seen = Geometry { samples: binary.samples(), format: binary.data_format() };
        match self.state.geometry {
            None => {
                if !seen.format.is_known() {
                    warn!(code = seen.format.code(), "unknown data format code, assuming 4-byte samples");
                }
                self.state.geometry = Some(seen);
                seen
            }
            Some(first) => {
                if first != seen {
                    self.state.summary.format_mismatches += 1;
                    warn!(
                        reel,
                        samples = seen.samples,
                        expected_samples = first.samples,
                        format = %seen.format,
                        expected_format = %first.format,
                        "reel geometry differs from the first reel, keeping the first"
                    );
                }
                first
            }
        }
    }

    fn emit_headers(
        &mut self,
        text:       &TextHeader,
        binary:     &BinaryHeader,
        geometry:   Geometry,
        out_format: DataFormat,
    ) -> Result<(), TranscodeError> {
        let Some(writer) = self.sinks.iter_mut().find_map(Sink::writer_mut) else {
            return Ok(());
        };
        writer.begin_reel()?;
        if self.opts.no_headers || (self.state.headers_written && !writer.is_per_reel()) {
            return Ok(());
        }
        let mut out = binary.clone();
        out.set_data_format(out_format);
        out.samples_per_trace = geometry.samples as u16 as i16;
        writer.write_headers(text, &out)?;
        self.state.headers_written = true;
        Ok(())
    }

    /// Count the remaining records of the reel without looking at them.
    fn skip_traces(&mut self, reader: &mut MediumReader, pending: Option<Vec<u8>>) -> Result<ReelEnd, TranscodeError> {
        let expected = self.state.geometry.map_or(TRACE_HEADER_SIZE, |g| trace_len(g.samples, g.format.bytes_per_sample()));
        let mut buf = vec![0u8; reader.request_len(expected)];
        if pending.is_some() {
            self.state.summary.traces_read += 1;
        }
        while reader.read(&mut buf)? > 0 {
            self.state.summary.traces_read += 1;
        }
        Ok(ReelEnd::Exhausted { had_header: true })
    }

    fn stream_traces(
        &mut self,
        reader:     &mut MediumReader,
        mut pending: Option<Vec<u8>>,
        geometry:   Geometry,
        out_format: DataFormat,
    ) -> Result<ReelEnd, TranscodeError> {
        let in_format = geometry.format;
        let samples   = geometry.samples;
        let in_len    = trace_len(samples, in_format.bytes_per_sample());
        let out_len   = trace_len(samples, out_format.bytes_per_sample());
        let convert   = out_format != in_format;

        let mut buf     = vec![0u8; reader.request_len(in_len).max(in_len)];
        let request     = reader.request_len(in_len);
        let mut out_buf = vec![0u8; out_len];
        let mut mismatches = 0u64;

        loop {
            let n = match pending.take() {
                Some(first) => {
                    let n = first.len().min(buf.len());
                    buf[..n].copy_from_slice(&first[..n]);
                    n
                }
                None => reader.read(&mut buf[..request])?,
            };
            if n == 0 {
                return Ok(ReelEnd::Exhausted { had_header: true });
            }
            self.state.summary.traces_read += 1;

            if n < in_len {
                debug!(got = n, expected = in_len, "short trace, zero-padded");
                buf[n..in_len].fill(0);
            }
            let trace = &mut buf[..in_len];
            let hd = TraceHeader::decode(trace);

            if hd.samples() != samples {
                self.state.summary.sample_mismatches += 1;
                if mismatches < MISMATCH_LOG_LIMIT {
                    warn!(found = hd.samples(), expected = samples, "trace sample count differs from reel");
                }
                mismatches += 1;
            }
            set_samples(trace, samples);

            if let Some(listing) = &mut self.listing {
                listing.record(trace)?;
            }

            if !self.filter.keep(hd.cdp_ensemble) {
                self.state.summary.traces_filtered += 1;
                continue;
            }
            if self.sinks.is_empty() {
                continue;
            }

            let record: &mut [u8] = if convert {
                out_buf[..TRACE_HEADER_SIZE].copy_from_slice(&trace[..TRACE_HEADER_SIZE]);
                convert_samples(
                    &trace[TRACE_HEADER_SIZE..],
                    in_format,
                    &mut out_buf[TRACE_HEADER_SIZE..],
                    out_format,
                    hd.weight(),
                );
                &mut out_buf[..]
            } else {
                trace
            };

            if self.filter.take_skip() {
                self.state.summary.traces_skipped += 1;
                continue;
            }

            self.state.summary.record_cdp(hd.cdp_ensemble);
            for sink in &mut self.sinks {
                sink.consume(record, out_format, samples)?;
            }
            self.state.summary.traces_written += 1;

            if let Some(cap) = self.opts.max_traces {
                if self.state.summary.traces_written >= cap {
                    info!(cap, "trace limit reached");
                    self.state.summary.trace_cap_reached = true;
                    return Ok(ReelEnd::TraceCap);
                }
            }
        }
    }

    // ── Wrap-up ──────────────────────────────────────────────────────────────

    fn finish(&mut self) -> Result<CopySummary, TranscodeError> {
        for sink in &mut self.sinks {
            sink.finish()?;
            match sink {
                Sink::Copy(w)     => self.state.summary.output_volumes = w.volumes(),
                Sink::Coverage(c) => self.state.summary.coverage_rows = c.rows(),
                Sink::Cube(c)     => {
                    self.state.summary.cube_traces  = c.written();
                    self.state.summary.cube_skipped = c.skipped();
                }
            }
        }
        if let Some(listing) = &mut self.listing {
            listing.finish()?;
        }
        self.state.summary.finished_at = Some(Utc::now());

        if let Some(path) = &self.opts.summary_path {
            let bytes = self.state.summary.to_bytes().map_err(io::Error::from)?;
            std::fs::write(path, bytes)?;
        }
        Ok(self.state.summary.clone())
    }
}

// ── Opening media ────────────────────────────────────────────────────────────

fn describe_input(spec: &InputSpec, index: u32) -> PathBuf {
    match spec {
        InputSpec::Stdin          => PathBuf::from("-"),
        InputSpec::Path(p)        => p.clone(),
        InputSpec::Numbered(base) => InputSpec::numbered_path(base, index),
    }
}

/// Open input number `index`.  `None` when a numbered input runs out.
fn open_input(opts: &CopyOptions, index: u32) -> Result<Option<MediumReader>, TranscodeError> {
    let wrap = |r: Box<dyn Read>| {
        if opts.blocked { MediumReader::Blocked(r) } else { MediumReader::Plain(r) }
    };
    let path = match &opts.input {
        InputSpec::Stdin => return Ok(Some(wrap(Box::new(io::stdin())))),
        InputSpec::Path(p) => p.clone(),
        InputSpec::Numbered(base) => InputSpec::numbered_path(base, index),
    };
    let open_err = |source: io::Error| TranscodeError::OpenInput { path: path.clone(), source };

    if is_tape(&path).unwrap_or(false) {
        let dev = TapeDevice::open_read(&path).map_err(open_err)?;
        info!(device = %path.display(), "reading tape");
        return Ok(Some(MediumReader::tape(dev, opts.all_files_in_input)));
    }
    match File::open(&path) {
        Ok(f) => Ok(Some(wrap(Box::new(BufReader::new(f))))),
        Err(e) if index > 1 && e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(open_err(e)),
    }
}

fn open_output(spec: &OutputSpec, opts: &CopyOptions) -> Result<MediumWriter, TranscodeError> {
    let wopts = opts.writer_options();
    match spec {
        OutputSpec::Stdout        => Ok(MediumWriter::stdout(wopts)),
        OutputSpec::PerReel(base) => Ok(MediumWriter::per_reel(base, wopts)),
        OutputSpec::Path(path)    => {
            let res = if is_tape(path).unwrap_or(false) {
                info!(device = %path.display(), "writing tape");
                MediumWriter::to_tape(Box::new(DeviceOpener::new(path)), wopts)
            } else {
                MediumWriter::create_file(path, wopts)
            };
            res.map_err(|source| TranscodeError::OpenOutput { path: path.clone(), source })
        }
    }
}
