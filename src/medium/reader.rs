//! Record reader over plain, blocked and tape input.

use std::io::{self, Read};
use tracing::{info, warn};

use super::tape::TapeInput;
use super::{retry_bounded, Attempt, MediumError, MAX_RECORD_SIZE, READ_RETRY_LIMIT, READ_RETRY_SKIP};
use crate::reel::{BINARY_HEADER_SIZE, TEXT_HEADER_SIZE};

/// Width of the ASCII length prefix of a blocked record.
pub const BLOCK_PREFIX_LEN: usize = 8;

pub enum MediumReader {
    /// Byte stream; records are cut at the sizes the caller asks for.
    Plain(Box<dyn Read>),
    /// Byte stream of records framed by an 8-digit ASCII length.
    Blocked(Box<dyn Read>),
    /// Record-structured device.
    Tape {
        device:          Box<dyn TapeInput>,
        /// Continue past filemarks into the next tape file.
        read_across_eov: bool,
    },
}

impl MediumReader {
    pub fn plain<R: Read + 'static>(inner: R) -> Self {
        MediumReader::Plain(Box::new(inner))
    }

    pub fn blocked<R: Read + 'static>(inner: R) -> Self {
        MediumReader::Blocked(Box::new(inner))
    }

    pub fn tape<T: TapeInput + 'static>(device: T, read_across_eov: bool) -> Self {
        MediumReader::Tape { device: Box::new(device), read_across_eov }
    }

    pub fn is_tape(&self) -> bool {
        matches!(self, MediumReader::Tape { .. })
    }

    /// Buffer length to request for a record of `expected` bytes.
    ///
    /// Plain streams are cut at exactly `expected`; record-oriented media
    /// return whole records, so they get room for the largest one.
    pub fn request_len(&self, expected: usize) -> usize {
        match self {
            MediumReader::Plain(_) => expected,
            _                      => MAX_RECORD_SIZE.max(expected),
        }
    }

    /// Read one record into `buf`.  `Ok(0)` is the clean end of input.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, MediumError> {
        match self {
            MediumReader::Plain(inner)   => Ok(read_full(inner, buf)?),
            MediumReader::Blocked(inner) => read_blocked(inner, buf),
            MediumReader::Tape { device, read_across_eov } => {
                read_tape(device.as_mut(), *read_across_eov, buf)
            }
        }
    }
}

// ── Plain ────────────────────────────────────────────────────────────────────

/// Fill `buf` unless the stream ends first.  Returns the bytes read.
fn read_full<R: Read + ?Sized>(inner: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match inner.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

// ── Blocked ──────────────────────────────────────────────────────────────────

fn read_blocked<R: Read + ?Sized>(inner: &mut R, buf: &mut [u8]) -> Result<usize, MediumError> {
    let mut prefix = [0u8; BLOCK_PREFIX_LEN];
    let got = read_full(inner, &mut prefix)?;
    if got < BLOCK_PREFIX_LEN {
        if got > 0 {
            warn!(bytes = got, "truncated block length prefix at end of input");
        }
        return Ok(0);
    }
    let text = String::from_utf8_lossy(&prefix);
    let declared: usize = text
        .trim()
        .parse()
        .map_err(|_| MediumError::BadBlockPrefix(text.to_string()))?;

    let take = declared.min(buf.len());
    let got  = read_full(inner, &mut buf[..take])?;
    if declared > take {
        skip_bytes(inner, (declared - take) as u64)?;
    }
    Ok(got)
}

/// Discard `count` bytes in 512-byte chunks, stopping early at end of input.
fn skip_bytes<R: Read + ?Sized>(inner: &mut R, mut count: u64) -> io::Result<()> {
    let mut scratch = [0u8; 512];
    while count > 0 {
        let n = (count as usize).min(scratch.len());
        let got = read_full(inner, &mut scratch[..n])?;
        if got == 0 {
            break;
        }
        count -= got as u64;
    }
    Ok(())
}

// ── Tape ─────────────────────────────────────────────────────────────────────

fn read_tape(
    device:          &mut dyn TapeInput,
    read_across_eov: bool,
    buf:             &mut [u8],
) -> Result<usize, MediumError> {
    let mut result = device.read(buf);
    if read_across_eov && matches!(result, Ok(0)) {
        device.forward_files(1).map_err(MediumError::TapeControl)?;
        result = read_next_file(device, buf);
    }

    let first_error = match result {
        Ok(n)  => return Ok(n),
        Err(e) => e,
    };
    warn!(error = %first_error, "tape read error, skipping forward");

    retry_bounded(
        READ_RETRY_LIMIT,
        |_| {
            if let Err(e) = device.forward_records(READ_RETRY_SKIP) {
                return Attempt::Abort(MediumError::TapeControl(e));
            }
            info!("skipped {READ_RETRY_SKIP} records");
            match device.read(buf) {
                Ok(n)  => Attempt::Done(n),
                Err(e) => Attempt::Retry(Some(e)),
            }
        },
        |attempts, last| MediumError::ReadFailure {
            attempts,
            source: last.unwrap_or(first_error),
        },
    )
}

/// After a filemark: consume the next file's reel headers and return the
/// first record after them.  If the next file does not start with a text
/// header, its first record is returned as is.
fn read_next_file(device: &mut dyn TapeInput, buf: &mut [u8]) -> io::Result<usize> {
    let mut scratch = vec![0u8; MAX_RECORD_SIZE];
    let n = device.read(&mut scratch)?;
    if n == TEXT_HEADER_SIZE {
        info!("new tape file, read {TEXT_HEADER_SIZE}-byte text header");
        let n = device.read(&mut scratch)?;
        if n == BINARY_HEADER_SIZE {
            info!("new tape file, read {BINARY_HEADER_SIZE}-byte binary header");
            return device.read(buf);
        }
        return Ok(copy_record(&scratch[..n], buf));
    }
    Ok(copy_record(&scratch[..n], buf))
}

fn copy_record(record: &[u8], buf: &mut [u8]) -> usize {
    let n = record.len().min(buf.len());
    buf[..n].copy_from_slice(&record[..n]);
    n
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::medium::tape::TapeControl;
    use std::collections::VecDeque;
    use std::io::Cursor;

    /// One step of a scripted tape.
    pub enum Step {
        Record(Vec<u8>),
        Filemark,
        Error,
    }

    /// Scripted tape: each `read` consumes one step.  A read at a filemark
    /// returns 0 and moves past it, unless the tape keeps SysV semantics
    /// and stays in front of the mark.
    pub struct ScriptedTape {
        pub steps:   VecDeque<Step>,
        pub skipped: Vec<(&'static str, u32)>,
        pub sysv:    bool,
    }

    impl ScriptedTape {
        pub fn new(steps: Vec<Step>) -> Self {
            Self { steps: steps.into(), skipped: Vec::new(), sysv: false }
        }

        pub fn sysv(steps: Vec<Step>) -> Self {
            Self { sysv: true, ..Self::new(steps) }
        }
    }

    impl Read for ScriptedTape {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.steps.pop_front() {
                None => Ok(0),
                Some(Step::Filemark) => {
                    if self.sysv {
                        self.steps.push_front(Step::Filemark);
                    }
                    Ok(0)
                }
                Some(Step::Error) => Err(io::Error::new(io::ErrorKind::Other, "parity error")),
                Some(Step::Record(rec)) => Ok(copy_record(&rec, buf)),
            }
        }
    }

    impl TapeControl for ScriptedTape {
        fn forward_files(&mut self, count: u32) -> io::Result<()> {
            self.skipped.push(("file", count));
            while let Some(step) = self.steps.pop_front() {
                if matches!(step, Step::Filemark) {
                    break;
                }
            }
            Ok(())
        }

        fn forward_records(&mut self, count: u32) -> io::Result<()> {
            self.skipped.push(("record", count));
            Ok(())
        }

        fn write_filemarks(&mut self, _count: u32) -> io::Result<()> {
            Ok(())
        }

        fn offline(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn blocked_record(payload: &[u8]) -> Vec<u8> {
        let mut out = format!("{:>8}", payload.len()).into_bytes();
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn plain_reads_requested_length() {
        let mut r = MediumReader::plain(Cursor::new(vec![7u8; 10]));
        let mut buf = [0u8; 4];
        assert_eq!(r.request_len(4), 4);
        assert_eq!(r.read(&mut buf).unwrap(), 4);
        assert_eq!(r.read(&mut buf).unwrap(), 4);
        assert_eq!(r.read(&mut buf).unwrap(), 2);
        assert_eq!(r.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn blocked_skips_oversized_records() {
        let mut data = blocked_record(&[1u8; 20]);
        data.extend(blocked_record(&[2u8; 3]));
        let mut r = MediumReader::blocked(Cursor::new(data));

        let mut buf = [0u8; 8];
        assert_eq!(r.read(&mut buf).unwrap(), 8);
        assert_eq!(buf, [1u8; 8]);
        assert_eq!(r.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[2u8; 3]);
        assert_eq!(r.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn blocked_rejects_garbage_prefix() {
        let mut r = MediumReader::blocked(Cursor::new(b"abcdefgh1234".to_vec()));
        let mut buf = [0u8; 8];
        assert!(matches!(r.read(&mut buf), Err(MediumError::BadBlockPrefix(_))));
    }

    #[test]
    fn tape_stops_at_filemark_by_default() {
        let tape = ScriptedTape::new(vec![
            Step::Record(vec![1; 10]),
            Step::Filemark,
            Step::Record(vec![2; 10]),
        ]);
        let mut r = MediumReader::tape(tape, false);
        let mut buf = vec![0u8; r.request_len(10)];
        assert_eq!(r.read(&mut buf).unwrap(), 10);
        assert_eq!(r.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn tape_reads_across_end_of_volume() {
        let tape = ScriptedTape::sysv(vec![
            Step::Record(vec![1; 10]),
            Step::Filemark,
            Step::Record(vec![0; TEXT_HEADER_SIZE]),
            Step::Record(vec![0; BINARY_HEADER_SIZE]),
            Step::Record(vec![3; 10]),
        ]);
        let mut r = MediumReader::tape(tape, true);
        let mut buf = vec![0u8; r.request_len(10)];
        assert_eq!(r.read(&mut buf).unwrap(), 10);
        assert_eq!(r.read(&mut buf).unwrap(), 10);
        assert_eq!(&buf[..10], &[3u8; 10]);
        assert_eq!(r.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn tape_recovers_from_read_errors() {
        let tape = ScriptedTape::new(vec![
            Step::Error,
            Step::Error,
            Step::Record(vec![4; 6]),
        ]);
        let mut buf = vec![0u8; 64];
        let mut tape = tape;
        assert_eq!(read_tape(&mut tape, false, &mut buf).unwrap(), 6);
        assert_eq!(&buf[..6], &[4u8; 6]);
        assert_eq!(tape.skipped, vec![("record", READ_RETRY_SKIP); 2]);
    }

    #[test]
    fn tape_gives_up_after_retry_limit() {
        let steps = (0..=READ_RETRY_LIMIT).map(|_| Step::Error).collect();
        let mut r = MediumReader::tape(ScriptedTape::new(steps), false);
        let mut buf = vec![0u8; 64];
        match r.read(&mut buf) {
            Err(MediumError::ReadFailure { attempts, .. }) => assert_eq!(attempts, READ_RETRY_LIMIT),
            other => panic!("unexpected {other:?}"),
        }
    }
}
