//! Sequential media: plain streams, blocked files and tape devices.
//!
//! # Reader
//! [`MediumReader`] returns one logical record per call.  `Ok(0)` is the
//! clean end of the input; an `Err` is a failure that survived the bounded
//! recovery protocol.  Callers must keep the two apart: the first ends the
//! current reel, the second aborts the run.
//!
//! # Writer
//! [`MediumWriter`] stamps the output trace sequence number, rotates
//! volumes when a split size is reached, and on tape targets recovers from
//! end-of-media write failures by ejecting and waiting for the next volume.
//!
//! # Retries
//! Every recovery loop is bounded and lives here, not in the caller: see
//! [`retry_bounded`].

pub mod reader;
pub mod tape;
pub mod writer;

pub use reader::MediumReader;
pub use tape::{DeviceOpener, TapeControl, TapeDevice, TapeInput, TapeOutput, VolumeOpener};
pub use writer::{MediumWriter, WriterOptions};

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Largest physical record read from a record-oriented medium.
pub const MAX_RECORD_SIZE: usize = 40244;
/// Read-error recovery attempts on tape.
pub const READ_RETRY_LIMIT: u32 = 100;
/// Records forward-spaced per read-error recovery attempt.
pub const READ_RETRY_SKIP: u32 = 5;
/// Attempts to open a replacement output volume.
pub const RELOAD_ATTEMPTS: u32 = 100;
/// Delay between attempts to open a replacement output volume.
pub const RELOAD_POLL_INTERVAL: Duration = Duration::from_secs(5);

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum MediumError {
    #[error("read failed after {attempts} recovery attempts: {source}")]
    ReadFailure { attempts: u32, source: io::Error },
    #[error("write failed: {0}")]
    WriteFailure(#[source] io::Error),
    #[error("bad block length prefix {0:?}")]
    BadBlockPrefix(String),
    #[error("no volume could be opened on {path} after {attempts} attempts")]
    ReloadExhausted { path: PathBuf, attempts: u32 },
    #[error("tape positioning failed: {0}")]
    TapeControl(#[source] io::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Bounded retry ────────────────────────────────────────────────────────────

/// Result of one recovery attempt.
pub(crate) enum Attempt<T> {
    /// Recovered.
    Done(T),
    /// Not yet; try again if attempts remain.
    Retry(Option<io::Error>),
    /// Give up immediately.
    Abort(MediumError),
}

/// Run `attempt` up to `limit` times (the attempt number starts at 1).
///
/// Returns the first `Done` value, the first `Abort` error, or the error
/// built by `exhausted` from the attempt count and the last retry error.
pub(crate) fn retry_bounded<T>(
    limit:       u32,
    mut attempt: impl FnMut(u32) -> Attempt<T>,
    exhausted:   impl FnOnce(u32, Option<io::Error>) -> MediumError,
) -> Result<T, MediumError> {
    let mut last = None;
    for n in 1..=limit {
        match attempt(n) {
            Attempt::Done(v)  => return Ok(v),
            Attempt::Retry(e) => last = e.or(last),
            Attempt::Abort(e) => return Err(e),
        }
    }
    Err(exhausted(limit, last))
}
