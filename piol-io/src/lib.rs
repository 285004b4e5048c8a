//! Core traits and implementations for positioned, blocking IO.
//!
//! The SEG-Y file layer never streams: every access is a byte range computed up front from
//! the trace layout and the worker's decomposition. This crate provides the read and write
//! capabilities that layer consumes, implemented for OS files, shared in-memory files and
//! immutable [`Bytes`](bytes::Bytes).

pub use file::*;
pub use memory::*;
pub use read::*;
pub use read_ranges::*;
pub use write::*;

mod file;
mod memory;
mod read;
mod read_ranges;
mod write;
