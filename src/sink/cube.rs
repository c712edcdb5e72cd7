use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use tracing::{debug, info};

use super::SinkError;
use crate::config::{grid, CubeSpec};
use crate::format::DataFormat;
use crate::trace::{offset, read_word, TRACE_HEADER_SIZE};

/// Random-access writer of a regular line × trace × sample amplitude cube.
///
/// The line number is taken from the group X word and the trace number
/// from the group Y word.  Traces outside the box are skipped without
/// comment.
pub struct CubeSink {
    spec:    CubeSpec,
    file:    File,
    written: u64,
    skipped: u64,
}

impl CubeSink {
    /// Open (never truncate) the cube file.
    pub fn create(spec: &CubeSpec) -> Result<Self, SinkError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&spec.path)
            .map_err(|source| SinkError::Io { what: "cube", path: spec.path.clone(), source })?;
        info!(
            path = %spec.path.display(),
            "cube lines {}, traces {}, samples {}",
            spec.line, spec.trace, spec.sample
        );
        Ok(Self { spec: spec.clone(), file, written: 0, skipped: 0 })
    }

    /// Byte offset of a cell, or `None` outside the box.
    pub fn cell_offset(&self, line: f32, trace: f32, sample_size: usize) -> Option<u64> {
        let s = &self.spec;
        if !s.line.contains(line) || !s.trace.contains(trace) {
            return None;
        }
        let li = grid(line - s.line.min, s.line.step) as u64;
        let ti = grid(trace - s.trace.min, s.trace.step) as u64;
        let ntr   = s.trace.cells() as u64;
        let nsamp = s.sample.cells() as u64;
        Some((li * ntr + ti) * nsamp * sample_size as u64)
    }

    pub fn consume(&mut self, trace: &[u8], format: DataFormat, samples: usize) -> Result<(), SinkError> {
        let line = read_word(trace, offset::GROUP_X) as f32;
        let tr   = read_word(trace, offset::GROUP_Y) as f32;
        let size = format.bytes_per_sample();
        let Some(pos) = self.cell_offset(line, tr, size) else {
            self.skipped += 1;
            return Ok(());
        };

        let first = grid(self.spec.sample.min, self.spec.sample.step).max(0) as usize;
        let in_payload = (trace.len().saturating_sub(TRACE_HEADER_SIZE) / size).min(samples);
        let count = self.spec.sample.cells().min(in_payload.saturating_sub(first));
        if count == 0 {
            self.skipped += 1;
            return Ok(());
        }
        let start = TRACE_HEADER_SIZE + first * size;
        let window = &trace[start..start + count * size];

        debug!(line, trace = tr, pos, count, "cube cell");
        self.file
            .seek(SeekFrom::Start(pos))
            .and_then(|_| self.file.write_all(window))
            .map_err(|source| SinkError::Io { what: "cube", path: self.spec.path.clone(), source })?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn finish(&mut self) -> Result<(), SinkError> {
        self.file
            .flush()
            .map_err(|source| SinkError::Io { what: "cube", path: self.spec.path.clone(), source })
    }
}
