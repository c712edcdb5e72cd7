//! Trace consumers.
//!
//! Every trace that survives filtering and conversion is handed to each
//! configured [`Sink`] in order.  The copy sink owns the output medium; the
//! coverage and cube sinks derive side products from the same buffer.

pub mod coverage;
pub mod cube;

pub use coverage::CoverageSink;
pub use cube::CubeSink;

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::format::DataFormat;
use crate::medium::{MediumError, MediumWriter};

#[derive(Error, Debug)]
pub enum SinkError {
    #[error(transparent)]
    Medium(#[from] MediumError),
    #[error("{what} file {path}: {source}")]
    Io {
        what:   &'static str,
        path:   PathBuf,
        source: io::Error,
    },
}

pub enum Sink {
    Copy(MediumWriter),
    Coverage(CoverageSink),
    Cube(CubeSink),
}

impl Sink {
    /// Consume one trace record (240-byte header plus `samples` samples of
    /// `format`).  The copy sink stamps the output sequence number into the
    /// buffer, which later sinks observe.
    pub fn consume(&mut self, trace: &mut [u8], format: DataFormat, samples: usize) -> Result<(), SinkError> {
        match self {
            Sink::Copy(w)     => Ok(w.write_trace(trace)?),
            Sink::Coverage(c) => c.consume(trace),
            Sink::Cube(c)     => c.consume(trace, format, samples),
        }
    }

    pub fn finish(&mut self) -> Result<(), SinkError> {
        match self {
            Sink::Copy(w)     => Ok(w.finish()?),
            Sink::Coverage(c) => c.finish(),
            Sink::Cube(c)     => c.finish(),
        }
    }

    pub fn writer_mut(&mut self) -> Option<&mut MediumWriter> {
        match self {
            Sink::Copy(w) => Some(w),
            _ => None,
        }
    }
}
