//! Record writer over stdout, files, per-reel files and tape devices.

use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::tape::{TapeOutput, VolumeOpener};
use super::{retry_bounded, Attempt, MediumError, RELOAD_ATTEMPTS, RELOAD_POLL_INTERVAL};
use crate::reel::{BinaryHeader, TextHeader, BINARY_HEADER_SIZE};
use crate::trace::set_sequence_in_reel;

// ── Options ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Traces per output volume; `None` disables splitting.
    pub split_size:          Option<u64>,
    /// Rewrite the reel headers at the start of every split volume.
    pub split_writes_header: bool,
    /// Delay between attempts to open a replacement tape.
    pub poll_interval:       Duration,
    pub reload_attempts:     u32,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            split_size:          None,
            split_writes_header: false,
            poll_interval:       RELOAD_POLL_INTERVAL,
            reload_attempts:     RELOAD_ATTEMPTS,
        }
    }
}

// ── Targets ──────────────────────────────────────────────────────────────────

enum Target {
    Stream(Box<dyn Write>),
    File {
        path: PathBuf,
        out:  BufWriter<File>,
    },
    PerReel {
        base: PathBuf,
        reel: u32,
        out:  Option<BufWriter<File>>,
    },
    Tape {
        opener: Box<dyn VolumeOpener>,
        device: Box<dyn TapeOutput>,
    },
}

impl Target {
    fn kind(&self) -> &'static str {
        match self {
            Target::Stream(_)       => "stream",
            Target::File { .. }     => "file",
            Target::PerReel { .. }  => "per-reel files",
            Target::Tape { .. }     => "tape",
        }
    }
}

struct SavedHeaders {
    text:   Vec<u8>,
    binary: [u8; BINARY_HEADER_SIZE],
}

/// Sequential SEG-Y output.
///
/// Owns the output trace sequence counter: header writes reset it to 0,
/// each trace write increments it and stamps it big-endian at byte 4 of
/// the trace header.
pub struct MediumWriter {
    target:           Target,
    opts:             WriterOptions,
    headers:          Option<SavedHeaders>,
    sequence:         u32,
    traces_in_volume: u64,
    traces_written:   u64,
    volumes:          u32,
}

impl MediumWriter {
    fn new(target: Target, mut opts: WriterOptions) -> Self {
        if opts.split_size.is_some() && !matches!(target, Target::File { .. } | Target::Tape { .. }) {
            warn!("output splitting needs a named file or tape output ({} given), disabled", target.kind());
            opts.split_size = None;
        }
        if opts.split_size == Some(0) {
            opts.split_size = None;
        }
        Self {
            target,
            opts,
            headers: None,
            sequence: 0,
            traces_in_volume: 0,
            traces_written: 0,
            volumes: 1,
        }
    }

    /// Write to an arbitrary byte stream.
    pub fn to_stream<W: Write + 'static>(out: W, opts: WriterOptions) -> Self {
        Self::new(Target::Stream(Box::new(out)), opts)
    }

    pub fn stdout(opts: WriterOptions) -> Self {
        Self::to_stream(BufWriter::new(io::stdout()), opts)
    }

    /// Create (truncate) a named output file.
    pub fn create_file(path: &Path, opts: WriterOptions) -> Result<Self, MediumError> {
        let out = BufWriter::new(File::create(path)?);
        Ok(Self::new(Target::File { path: path.to_path_buf(), out }, opts))
    }

    /// One file per input reel, named `{base}-{n}` from 1.
    pub fn per_reel(base: &Path, opts: WriterOptions) -> Self {
        Self::new(Target::PerReel { base: base.to_path_buf(), reel: 0, out: None }, opts)
    }

    /// Open the first volume through `opener`.
    pub fn to_tape(mut opener: Box<dyn VolumeOpener>, opts: WriterOptions) -> Result<Self, MediumError> {
        let device = opener.open_volume()?;
        Ok(Self::new(Target::Tape { opener, device }, opts))
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn traces_written(&self) -> u64 {
        self.traces_written
    }

    /// Output volumes used so far, including reel files.
    pub fn volumes(&self) -> u32 {
        match &self.target {
            Target::PerReel { reel, .. } => *reel,
            _ => self.volumes,
        }
    }

    pub fn is_per_reel(&self) -> bool {
        matches!(self.target, Target::PerReel { .. })
    }

    /// Start the next reel file.  Only per-reel targets react.
    pub fn begin_reel(&mut self) -> Result<(), MediumError> {
        if let Target::PerReel { reel, out, .. } = &mut self.target {
            if let Some(mut done) = out.take() {
                done.flush().map_err(MediumError::WriteFailure)?;
            }
            *reel += 1;
            self.sequence = 0;
        }
        Ok(())
    }

    /// Remember the reel headers and write them to the current volume.
    pub fn write_headers(&mut self, text: &TextHeader, binary: &BinaryHeader) -> Result<(), MediumError> {
        self.headers = Some(SavedHeaders { text: text.as_bytes().to_vec(), binary: binary.encode() });
        if !self.emit_headers()? {
            self.reload()?;
        }
        Ok(())
    }

    /// Stamp and write one trace record, rotating or reloading volumes
    /// as needed.
    pub fn write_trace(&mut self, trace: &mut [u8]) -> Result<(), MediumError> {
        if let Some(limit) = self.opts.split_size {
            if self.traces_in_volume >= limit {
                self.rotate()?;
            }
        }

        self.sequence += 1;
        stamp(trace, self.sequence);
        if !self.emit(trace)? {
            self.reload()?;
            self.sequence = 1;
            stamp(trace, self.sequence);
            if !self.emit(trace)? {
                return Err(write_refused("trace"));
            }
        }
        self.traces_in_volume += 1;
        self.traces_written += 1;
        Ok(())
    }

    pub fn finish(&mut self) -> Result<(), MediumError> {
        let res = match &mut self.target {
            Target::Stream(out)               => out.flush(),
            Target::File { out, .. }          => out.flush(),
            Target::PerReel { out: Some(o), .. } => o.flush(),
            Target::PerReel { out: None, .. } => Ok(()),
            Target::Tape { device, .. }       => device.flush(),
        };
        res.map_err(MediumError::WriteFailure)
    }

    // ── Internals ────────────────────────────────────────────────────────────

    /// Emit one record on the current volume.  A failed or short tape
    /// write returns `Ok(false)`; other targets fail hard.
    fn emit(&mut self, record: &[u8]) -> Result<bool, MediumError> {
        let res = match &mut self.target {
            Target::Stream(out)      => out.write_all(record),
            Target::File { out, .. } => out.write_all(record),
            Target::PerReel { base, reel, out } => {
                if out.is_none() {
                    let path = reel_path(base, (*reel).max(1));
                    info!(path = %path.display(), "opening reel output");
                    *out = Some(BufWriter::new(File::create(&path)?));
                }
                out.as_mut().map_or(Ok(()), |f| f.write_all(record))
            }
            Target::Tape { device, .. } => {
                return match device.write(record) {
                    Ok(n) if n == record.len() => Ok(true),
                    Ok(n) => {
                        warn!(written = n, expected = record.len(), "short tape write");
                        Ok(false)
                    }
                    Err(e) => {
                        warn!(error = %e, "tape write failed");
                        Ok(false)
                    }
                };
            }
        };
        res.map_err(MediumError::WriteFailure)?;
        Ok(true)
    }

    /// Write the saved headers, resetting the sequence counter.
    fn emit_headers(&mut self) -> Result<bool, MediumError> {
        let Some(saved) = self.headers.take() else {
            return Ok(true);
        };
        let res = self
            .emit(&saved.text)
            .and_then(|ok| if ok { self.emit(&saved.binary) } else { Ok(false) });
        self.headers = Some(saved);
        self.sequence = 0;
        res
    }

    /// Close the current split volume and open the next one.
    fn rotate(&mut self) -> Result<(), MediumError> {
        match &mut self.target {
            Target::File { path, out } => {
                out.flush().map_err(MediumError::WriteFailure)?;
                let next = next_split_path(path);
                info!(path = %next.display(), traces = self.traces_in_volume, "starting next output volume");
                *out  = BufWriter::new(File::create(&next)?);
                *path = next;
                self.volumes += 1;
            }
            Target::Tape { .. } => self.swap_tape()?,
            _ => return Ok(()),
        }
        self.traces_in_volume = 0;
        if self.opts.split_writes_header && !self.emit_headers()? {
            return Err(write_refused("header"));
        }
        Ok(())
    }

    /// Recover from a failed tape write: swap the volume and rewrite the
    /// headers on the new one.
    fn reload(&mut self) -> Result<(), MediumError> {
        if !matches!(self.target, Target::Tape { .. }) {
            return Err(write_refused("record"));
        }
        self.swap_tape()?;
        self.traces_in_volume = 0;
        if !self.emit_headers()? {
            return Err(write_refused("header"));
        }
        Ok(())
    }

    /// Terminate and eject the mounted tape, then poll for the next one.
    fn swap_tape(&mut self) -> Result<(), MediumError> {
        let Target::Tape { opener, device } = &mut self.target else {
            return Ok(());
        };
        if let Err(e) = device.write_filemarks(2) {
            warn!(error = %e, "writing end-of-volume filemarks failed");
        }
        if let Err(e) = device.offline() {
            warn!(error = %e, "taking tape offline failed");
        }
        let path = opener.device();
        info!(device = %path.display(), "mount the next output tape");

        let poll = self.opts.poll_interval;
        let next = retry_bounded(
            self.opts.reload_attempts,
            |n| {
                std::thread::sleep(poll);
                match opener.open_volume() {
                    Ok(dev) => Attempt::Done(dev),
                    Err(e) => {
                        debug!(attempt = n, error = %e, "tape not ready");
                        Attempt::Retry(Some(e))
                    }
                }
            },
            |attempts, _| MediumError::ReloadExhausted { path: path.clone(), attempts },
        )?;
        *device = next;
        self.volumes += 1;
        info!(volume = self.volumes, "output tape mounted");
        Ok(())
    }
}

fn stamp(trace: &mut [u8], sequence: u32) {
    if trace.len() >= 8 {
        set_sequence_in_reel(trace, sequence);
    }
}

fn write_refused(what: &str) -> MediumError {
    MediumError::WriteFailure(io::Error::new(
        io::ErrorKind::WriteZero,
        format!("{what} write refused by output volume"),
    ))
}

fn reel_path(base: &Path, reel: u32) -> PathBuf {
    let mut name: OsString = base.as_os_str().to_owned();
    name.push(format!("-{reel}"));
    PathBuf::from(name)
}

/// Name of the next split volume: the last character of the file name is
/// advanced by one code point (`out1` → `out2`, `part_a` → `part_b`).
pub fn next_split_path(path: &Path) -> PathBuf {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let mut chars: Vec<char> = name.chars().collect();
    match chars.last_mut() {
        Some(c) => *c = char::from_u32(*c as u32 + 1).unwrap_or(*c),
        None    => chars.push('1'),
    }
    let next: String = chars.into_iter().collect();
    path.with_file_name(next)
}
