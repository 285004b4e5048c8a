use bytes::Bytes;
use log::{debug, warn};
use piol_error::{PiolResult, piol_bail};
use piol_io::{ReadAt, ReadRanges, merge_ranges};

use crate::Context;
use crate::decomposition::{Decomposition, block_decomposition};
use crate::file::{TextDecoder, decode_samples, sample_count};
use crate::header::{read_rows, read_rows_at};
use crate::metadata::TraceMetadata;
use crate::segy::{BinaryHeader, FILE_HEADER_SIZE, NumberFormat, TEXT_HEADER_LEN, TraceLayout};

/// A SEG-Y file opened for reading by one worker.
///
/// Opening reads only the file header; trace headers and samples are read on request for
/// whichever traces the worker asks for.
pub struct ReadSegy<R> {
    ctx: Context,
    io: R,
    text: Bytes,
    binary: BinaryHeader,
    layout: TraceLayout,
    num_traces: u64,
}

impl<R: ReadAt> ReadSegy<R> {
    pub fn open(ctx: &Context, io: R) -> PiolResult<Self> {
        let size = io.size()?;
        if size < FILE_HEADER_SIZE {
            piol_bail!(FormatError: "file of {size} bytes is smaller than the SEG-Y file header");
        }
        let header = io.read_byte_range(0..FILE_HEADER_SIZE)?;
        let binary = BinaryHeader::parse_with_format(&header, ctx.config().number_format())?;
        let layout = TraceLayout::new(usize::from(binary.num_samples), binary.format);

        let (num_traces, trailing) = layout.trace_count(size);
        if trailing != 0 {
            warn!("ignoring {trailing} bytes after the last whole trace");
        }
        debug!(
            "opened SEG-Y file: {num_traces} traces of {} {} samples",
            binary.num_samples, binary.format
        );

        Ok(Self {
            ctx: ctx.clone(),
            io,
            text: header.slice(0..TEXT_HEADER_LEN),
            binary,
            layout,
            num_traces,
        })
    }

    /// The raw text header.
    pub fn text(&self) -> &[u8] {
        &self.text
    }

    pub fn text_with(&self, decoder: &dyn TextDecoder) -> Vec<u8> {
        decoder.to_ascii(&self.text)
    }

    pub fn binary_header(&self) -> &BinaryHeader {
        &self.binary
    }

    /// Samples per trace.
    pub fn ns(&self) -> usize {
        self.layout.num_samples()
    }

    pub fn num_traces(&self) -> u64 {
        self.num_traces
    }

    /// Sample interval in seconds.
    pub fn sample_interval(&self) -> f64 {
        self.binary.sample_interval_secs()
    }

    pub fn format(&self) -> NumberFormat {
        self.layout.format()
    }

    pub fn layout(&self) -> &TraceLayout {
        &self.layout
    }

    /// This worker's block of the file's traces.
    pub fn decompose(&self) -> PiolResult<Decomposition> {
        block_decomposition(&self.ctx, self.num_traces)
    }

    fn check_traces(&self, offset: u64, count: usize) -> PiolResult<()> {
        let end = offset + count as u64;
        if end > self.num_traces {
            piol_bail!(
                "traces [{offset}, {end}) run past the {} traces in the file",
                self.num_traces
            );
        }
        Ok(())
    }

    fn check_indices(&self, indices: &[u64]) -> PiolResult<()> {
        if let Some(index) = indices.iter().find(|&&i| i >= self.num_traces) {
            piol_bail!("trace {index} is past the {} traces in the file", self.num_traces);
        }
        Ok(())
    }

    /// Decode the headers of traces `offset..offset + count` into `store` from `store_offset`.
    pub fn read_metadata(
        &self,
        offset: u64,
        count: usize,
        store: &mut TraceMetadata,
        store_offset: usize,
    ) -> PiolResult<()> {
        self.check_traces(offset, count)?;
        read_rows(&self.ctx, &self.io, &self.layout, offset, count, store, store_offset)
    }

    /// Decode the headers of the traces at `indices` into `store` from `store_offset`.
    pub fn read_metadata_at(
        &self,
        indices: &[u64],
        store: &mut TraceMetadata,
        store_offset: usize,
    ) -> PiolResult<()> {
        self.check_indices(indices)?;
        read_rows_at(&self.ctx, &self.io, &self.layout, indices, store, store_offset)
    }

    /// Read the samples of traces `offset..offset + count`, trace after trace, into `samples`.
    pub fn read_traces(&self, offset: u64, count: usize, samples: &mut [f32]) -> PiolResult<()> {
        self.check_traces(offset, count)?;
        let indices = (offset..offset + count as u64).collect::<Vec<_>>();
        self.read_samples(&indices, samples)
    }

    /// Read the samples of the traces at `indices`, in the given order, into `samples`.
    pub fn read_traces_at(&self, indices: &[u64], samples: &mut [f32]) -> PiolResult<()> {
        self.check_indices(indices)?;
        self.read_samples(indices, samples)
    }

    fn read_samples(&self, indices: &[u64], samples: &mut [f32]) -> PiolResult<()> {
        let ns = self.ns();
        let needed = sample_count(samples.len(), indices.len(), ns)?;
        if needed == 0 {
            return Ok(());
        }

        let max_gap = self
            .ctx
            .config()
            .coalescing_window()
            .unwrap_or_else(|| self.io.performance_hint().coalescing_window());
        let reader = ReadRanges::with_max_gap(&self.io, max_gap);
        let batch = self.ctx.config().max_traces_per_io();
        for (chunk, out) in indices
            .chunks(batch)
            .zip(samples[..needed].chunks_mut(batch * ns))
        {
            let ranges = chunk
                .iter()
                .map(|&i| {
                    let start = self.layout.samples_offset(i);
                    start..start + self.layout.data_size()
                })
                .collect::<Vec<_>>();
            let reads = merge_ranges(&ranges, max_gap);
            self.ctx.metrics().record_read(
                reads.iter().map(|r| r.end - r.start).sum(),
                reads.len() as u64,
            );

            for (bytes, trace) in reader
                .read_byte_ranges(&ranges)?
                .iter()
                .zip(out.chunks_mut(ns))
            {
                decode_samples(self.layout.format(), bytes, trace)?;
            }
        }
        Ok(())
    }
}
