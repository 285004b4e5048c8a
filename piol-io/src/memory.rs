use std::io;
use std::ops::Range;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::read::checked_bounds;
use crate::{PerformanceHint, ReadAt, WriteAt};

/// A growable in-memory file that can be shared between workers of one process.
///
/// Clones share the same backing buffer. Writes past the end zero-fill the gap, matching
/// the behaviour of a sparse file on disk.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFile(Arc<RwLock<Vec<u8>>>);

impl InMemoryFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a snapshot of the current file contents.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.0.read())
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<u8>> for InMemoryFile {
    fn from(value: Vec<u8>) -> Self {
        Self(Arc::new(RwLock::new(value)))
    }
}

impl ReadAt for InMemoryFile {
    fn read_byte_range(&self, range: Range<u64>) -> io::Result<Bytes> {
        let guard = self.0.read();
        let (start, end) = checked_bounds(&range, guard.len())?;
        Ok(Bytes::copy_from_slice(&guard[start..end]))
    }

    fn performance_hint(&self) -> PerformanceHint {
        PerformanceHint::local()
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.len() as u64)
    }
}

impl WriteAt for InMemoryFile {
    fn write_all_at(&self, pos: u64, buffer: &[u8]) -> io::Result<()> {
        let start = usize::try_from(pos)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "position too large"))?;
        let end = start + buffer.len();
        let mut guard = self.0.write();
        if guard.len() < end {
            guard.resize(end, 0);
        }
        guard[start..end].copy_from_slice(buffer);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{InMemoryFile, ReadAt, WriteAt};

    #[test]
    fn clones_share_contents() {
        let file = InMemoryFile::new();
        let other = file.clone();

        other.write_all_at(3, b"abc").unwrap();
        assert_eq!(file.len(), 6);
        assert_eq!(file.read_byte_range(0..6).unwrap(), b"\0\0\0abc".as_slice());
    }

    #[test]
    fn overwrite_keeps_surrounding_bytes() {
        let file = InMemoryFile::from(b"0123456789".to_vec());
        file.write_all_at(2, b"xy").unwrap();
        assert_eq!(file.to_bytes(), b"01xy456789".as_slice());
    }
}
