use std::fs::{File, OpenOptions};
use std::io;
use std::ops::{Deref, Range};
use std::path::Path;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use crate::{ReadAt, WriteAt};

/// A cheaply cloneable file handle performing positioned IO.
///
/// Positioned reads and writes never move a shared cursor, so clones may be used from
/// several batches at once without coordination.
#[derive(Debug, Clone)]
pub struct PiolFile(Arc<File>);

impl PiolFile {
    /// Open an existing file read-only.
    ///
    /// The `PiolFile` takes ownership of the file descriptor, and can be cloned
    /// many times without opening a new file descriptor. When the last instance
    /// of the `PiolFile` is dropped, the file descriptor is closed.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let f = File::open(path)?;
        Ok(Self(Arc::new(f)))
    }

    /// Open an existing file for reading and writing.
    pub fn open_rw(path: impl AsRef<Path>) -> io::Result<Self> {
        let f = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self(Arc::new(f)))
    }

    /// Create (or truncate) a file for reading and writing.
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let f = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self(Arc::new(f)))
    }
}

// Implement deref coercion for non-mut `File` methods on `PiolFile`.
impl Deref for PiolFile {
    type Target = File;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl ReadAt for PiolFile {
    fn read_byte_range(&self, range: Range<u64>) -> io::Result<Bytes> {
        let len = usize::try_from(range.end.saturating_sub(range.start))
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "read too large"))?;
        let mut buffer = BytesMut::zeroed(len);
        read_exact_at(&self.0, &mut buffer, range.start)?;
        Ok(buffer.freeze())
    }

    fn size(&self) -> io::Result<u64> {
        self.metadata().map(|metadata| metadata.len())
    }
}

impl WriteAt for PiolFile {
    fn write_all_at(&self, pos: u64, buffer: &[u8]) -> io::Result<()> {
        write_all_at(&self.0, buffer, pos)
    }

    fn flush(&self) -> io::Result<()> {
        self.0.sync_data()
    }
}

#[cfg(unix)]
fn read_exact_at(file: &File, buffer: &mut [u8], pos: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buffer, pos)
}

#[cfg(unix)]
fn write_all_at(file: &File, buffer: &[u8], pos: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buffer, pos)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buffer: &mut [u8], mut pos: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buffer.is_empty() {
        match file.seek_read(buffer, pos) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "failed to fill whole buffer",
                ));
            }
            Ok(n) => {
                buffer = &mut buffer[n..];
                pos += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(windows)]
fn write_all_at(file: &File, mut buffer: &[u8], mut pos: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buffer.is_empty() {
        match file.seek_write(buffer, pos) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "failed to write whole buffer",
                ));
            }
            Ok(n) => {
                buffer = &buffer[n..];
                pos += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::{self, Write};

    use tempfile::NamedTempFile;

    use crate::{PiolFile, ReadAt, WriteAt};

    #[test]
    fn test_shared_file() {
        let mut tmpfile = NamedTempFile::new().unwrap();
        write!(tmpfile, "0123456789").unwrap();

        let shared_file = PiolFile::open(tmpfile.path()).unwrap();

        let first_half = shared_file.read_byte_range(0..5).unwrap();
        let second_half = shared_file.clone().read_byte_range(5..10).unwrap();

        assert_eq!(&first_half, "01234".as_bytes());
        assert_eq!(&second_half, "56789".as_bytes());
        assert_eq!(shared_file.size().unwrap(), 10);
    }

    #[test]
    fn test_read_past_end() {
        let mut tmpfile = NamedTempFile::new().unwrap();
        write!(tmpfile, "0123").unwrap();

        let file = PiolFile::open(tmpfile.path()).unwrap();
        let err = file.read_byte_range(2..10).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_positioned_writes_extend_file() {
        let tmpfile = NamedTempFile::new().unwrap();
        let file = PiolFile::create(tmpfile.path()).unwrap();

        file.write_all_at(4, b"tail").unwrap();
        file.write_all_at(0, b"head").unwrap();
        file.flush().unwrap();

        let reopened = PiolFile::open(tmpfile.path()).unwrap();
        assert_eq!(reopened.read_byte_range(0..8).unwrap(), "headtail".as_bytes());
    }
}
