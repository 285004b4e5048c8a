use std::io;
use std::sync::Arc;

/// A trait for types that support blocking positional writes.
///
/// Writes take `&self`: workers write disjoint byte ranges of the same file, so a writer is
/// shared rather than exclusively borrowed.
pub trait WriteAt {
    /// Write the whole buffer starting at byte `pos`, growing the target if needed.
    fn write_all_at(&self, pos: u64, buffer: &[u8]) -> io::Result<()>;

    /// Flush any buffered data to the backing store.
    fn flush(&self) -> io::Result<()> {
        Ok(())
    }
}

impl<T: WriteAt + ?Sized> WriteAt for Arc<T> {
    fn write_all_at(&self, pos: u64, buffer: &[u8]) -> io::Result<()> {
        T::write_all_at(self, pos, buffer)
    }

    fn flush(&self) -> io::Result<()> {
        T::flush(self)
    }
}

impl<T: WriteAt + ?Sized> WriteAt for &T {
    fn write_all_at(&self, pos: u64, buffer: &[u8]) -> io::Result<()> {
        T::write_all_at(self, pos, buffer)
    }

    fn flush(&self) -> io::Result<()> {
        T::flush(self)
    }
}
