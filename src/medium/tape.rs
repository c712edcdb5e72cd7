//! Magnetic tape control.
//!
//! The reader and writer only need four positioning operations and a way to
//! open the device again after the operator (or a stacker) has changed the
//! volume.  [`TapeControl`] and [`VolumeOpener`] are those seams;
//! [`TapeDevice`] implements them with `MTIOCTOP` on Linux.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// Tape positioning operations.
pub trait TapeControl {
    /// Forward-space past `count` filemarks.
    fn forward_files(&mut self, count: u32) -> io::Result<()>;
    /// Forward-space `count` physical records.
    fn forward_records(&mut self, count: u32) -> io::Result<()>;
    /// Write `count` filemarks at the current position.
    fn write_filemarks(&mut self, count: u32) -> io::Result<()>;
    /// Rewind and unload the volume.
    fn offline(&mut self) -> io::Result<()>;
}

/// A readable tape.  One `read` returns at most one physical record.
pub trait TapeInput: Read + TapeControl {}
impl<T: Read + TapeControl> TapeInput for T {}

/// A writable tape.  One `write` emits one physical record.
pub trait TapeOutput: Write + TapeControl {}
impl<T: Write + TapeControl> TapeOutput for T {}

/// Opens the output volume currently mounted on a device.
pub trait VolumeOpener {
    fn open_volume(&mut self) -> io::Result<Box<dyn TapeOutput>>;
    /// Device path, for diagnostics.
    fn device(&self) -> PathBuf;
}

// ── Device ───────────────────────────────────────────────────────────────────

/// A character-special tape device.
pub struct TapeDevice {
    file: File,
}

impl TapeDevice {
    pub fn open_read(path: &Path) -> io::Result<Self> {
        Ok(Self { file: File::open(path)? })
    }

    pub fn open_write(path: &Path) -> io::Result<Self> {
        Ok(Self { file: OpenOptions::new().write(true).open(path)? })
    }
}

impl Read for TapeDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for TapeDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl TapeControl for TapeDevice {
    fn forward_files(&mut self, count: u32) -> io::Result<()> {
        sys::mt_op(&self.file, sys::MTFSF, count)
    }

    fn forward_records(&mut self, count: u32) -> io::Result<()> {
        sys::mt_op(&self.file, sys::MTFSR, count)
    }

    fn write_filemarks(&mut self, count: u32) -> io::Result<()> {
        sys::mt_op(&self.file, sys::MTWEOF, count)
    }

    fn offline(&mut self) -> io::Result<()> {
        sys::mt_op(&self.file, sys::MTOFFL, 1)
    }
}

/// Reopens a tape device path for writing.
pub struct DeviceOpener {
    path: PathBuf,
}

impl DeviceOpener {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl VolumeOpener for DeviceOpener {
    fn open_volume(&mut self) -> io::Result<Box<dyn TapeOutput>> {
        Ok(Box::new(TapeDevice::open_write(&self.path)?))
    }

    fn device(&self) -> PathBuf {
        self.path.clone()
    }
}

/// True when `path` is a character-special file (a tape drive).
#[cfg(unix)]
pub fn is_tape(path: &Path) -> io::Result<bool> {
    use std::os::unix::fs::FileTypeExt;
    Ok(std::fs::metadata(path)?.file_type().is_char_device())
}

#[cfg(not(unix))]
pub fn is_tape(_path: &Path) -> io::Result<bool> {
    Ok(false)
}

// ── ioctl ────────────────────────────────────────────────────────────────────

#[cfg(target_os = "linux")]
mod sys {
    use std::fs::File;
    use std::io;
    use std::os::unix::io::AsRawFd;

    pub const MTFSF:  libc::c_short = 1;
    pub const MTFSR:  libc::c_short = 3;
    pub const MTWEOF: libc::c_short = 5;
    pub const MTOFFL: libc::c_short = 7;

    /// `_IOW('m', 1, struct mtop)`.
    const MTIOCTOP: libc::c_ulong = 0x4008_6d01;

    #[repr(C)]
    struct MtOp {
        mt_op:    libc::c_short,
        mt_count: libc::c_int,
    }

    pub fn mt_op(file: &File, op: libc::c_short, count: u32) -> io::Result<()> {
        let mut cmd = MtOp { mt_op: op, mt_count: count as libc::c_int };
        // SAFETY: `cmd` is a live, correctly laid out `struct mtop` for the
        // duration of the call and the descriptor is owned by `file`.
        let rc = unsafe { libc::ioctl(file.as_raw_fd(), MTIOCTOP as _, &mut cmd as *mut MtOp) };
        if rc == -1 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

#[cfg(not(target_os = "linux"))]
mod sys {
    use std::fs::File;
    use std::io;

    pub const MTFSF:  i16 = 1;
    pub const MTFSR:  i16 = 3;
    pub const MTWEOF: i16 = 5;
    pub const MTOFFL: i16 = 7;

    pub fn mt_op(_file: &File, _op: i16, _count: u32) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "tape control is only available on Linux"))
    }
}
