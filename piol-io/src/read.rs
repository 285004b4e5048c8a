use std::io;
use std::ops::Range;
use std::sync::Arc;

use bytes::Bytes;
use piol_error::piol_err;

/// A trait for types that support blocking positional reads.
///
/// Readers are shared between the batches of a single worker, so every read is addressed
/// by absolute position and no cursor state is kept.
pub trait ReadAt {
    /// The bytes at `range`, all of them.
    ///
    /// A range reaching past the end fails with
    /// [`UnexpectedEof`][std::io::ErrorKind::UnexpectedEof].
    fn read_byte_range(&self, range: Range<u64>) -> io::Result<Bytes>;

    /// How far apart two ranges may be and still be fetched by one read.
    fn performance_hint(&self) -> PerformanceHint {
        PerformanceHint::default()
    }

    /// Length of the readable data in bytes.
    fn size(&self) -> io::Result<u64>;
}

/// Backend cost profile consulted when batching trace header reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerformanceHint {
    coalescing_window: u64,
}

impl Default for PerformanceHint {
    fn default() -> Self {
        Self {
            coalescing_window: 1 << 20,
        }
    }
}

impl PerformanceHint {
    pub fn new(coalescing_window: u64) -> Self {
        Self { coalescing_window }
    }

    /// Profile of a memory backend: never read bytes nobody asked for.
    pub fn local() -> Self {
        Self::new(0)
    }

    /// Largest gap in bytes bridged by one read.
    pub fn coalescing_window(&self) -> u64 {
        self.coalescing_window
    }
}

impl<T: ReadAt + ?Sized> ReadAt for Arc<T> {
    fn read_byte_range(&self, range: Range<u64>) -> io::Result<Bytes> {
        T::read_byte_range(self, range)
    }

    fn performance_hint(&self) -> PerformanceHint {
        T::performance_hint(self)
    }

    fn size(&self) -> io::Result<u64> {
        T::size(self)
    }
}

impl<T: ReadAt + ?Sized> ReadAt for &T {
    fn read_byte_range(&self, range: Range<u64>) -> io::Result<Bytes> {
        T::read_byte_range(self, range)
    }

    fn performance_hint(&self) -> PerformanceHint {
        T::performance_hint(self)
    }

    fn size(&self) -> io::Result<u64> {
        T::size(self)
    }
}

impl ReadAt for Bytes {
    fn read_byte_range(&self, range: Range<u64>) -> io::Result<Bytes> {
        let (start, end) = checked_bounds(&range, self.len())?;
        Ok(self.slice(start..end))
    }

    fn performance_hint(&self) -> PerformanceHint {
        PerformanceHint::local()
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.len() as u64)
    }
}

/// Convert a `u64` range into `usize` bounds inside a buffer of length `len`.
pub(crate) fn checked_bounds(range: &Range<u64>, len: usize) -> io::Result<(usize, usize)> {
    let start = usize::try_from(range.start)
        .map_err(|_| io::Error::other(piol_err!("start {} too big for usize", range.start)))?;
    let end = usize::try_from(range.end)
        .map_err(|_| io::Error::other(piol_err!("end {} too big for usize", range.end)))?;
    if start > end {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            piol_err!("inverted byte range {start}..{end}"),
        ));
    }
    if end > len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            piol_err!("unexpected eof reading {start}..{end} of {len} bytes"),
        ));
    }
    Ok((start, end))
}
