//! Parallel reading and writing of SEG-Y seismic files.
//!
//! A job is a group of workers sharing one [`Context`]. Each worker takes a contiguous block of
//! the file's traces from [`decomposition`], decodes the trace header fields named by a
//! [`Rules`] set into a [`TraceMetadata`] store, and may then reorder traces globally with
//! [`sort`](sort::sort) or find extreme coordinates with [`minmax`]. Headers are only ever
//! touched in the byte span the rules need.
//!
//! ```no_run
//! use piol::file::ReadSegy;
//! use piol::{Context, Rules, TraceMetadata};
//! use piol_io::PiolFile;
//!
//! # fn main() -> piol_error::PiolResult<()> {
//! let ctx = Context::single();
//! let file = ReadSegy::open(&ctx, PiolFile::open("survey.sgy")?)?;
//! let block = file.decompose()?;
//! let mut store = TraceMetadata::new(Rules::with_defaults(), block.size as usize);
//! file.read_metadata(block.offset, store.num_traces(), &mut store, 0)?;
//! # Ok(())
//! # }
//! ```

pub use context::*;
pub use metadata::TraceMetadata;
pub use rules::{Key, Rules};

mod context;
pub mod decomposition;
pub mod file;
pub mod header;
mod metadata;
pub mod minmax;
pub mod rules;
pub mod segy;
pub mod sort;
