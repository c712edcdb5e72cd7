use byteorder::{NativeEndian, WriteBytesExt};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::info;

use super::SinkError;
use crate::config::{CoverageSpec, COVERAGE_FIELDS};
use crate::trace::read_field;

/// Writes seven header fields per trace as host-order `f32`s.
pub struct CoverageSink {
    path:   PathBuf,
    fields: [(usize, usize); COVERAGE_FIELDS],
    out:    BufWriter<File>,
    rows:   u64,
}

impl CoverageSink {
    pub fn create(spec: &CoverageSpec) -> Result<Self, SinkError> {
        let file = File::create(&spec.path).map_err(|source| SinkError::Io {
            what: "coverage",
            path: spec.path.clone(),
            source,
        })?;
        info!(path = %spec.path.display(), fields = ?spec.fields, "writing coverage");
        Ok(Self { path: spec.path.clone(), fields: spec.fields, out: BufWriter::new(file), rows: 0 })
    }

    pub fn consume(&mut self, trace: &[u8]) -> Result<(), SinkError> {
        for &(off, size) in &self.fields {
            let v = read_field(trace, off, size);
            self.out.write_f32::<NativeEndian>(v).map_err(|e| self.io_error(e))?;
        }
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn finish(&mut self) -> Result<(), SinkError> {
        self.out.flush().map_err(|e| self.io_error(e))
    }

    fn io_error(&self, source: std::io::Error) -> SinkError {
        SinkError::Io { what: "coverage", path: self.path.clone(), source }
    }
}
