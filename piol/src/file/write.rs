use log::debug;
use piol_error::{PiolError, PiolResult, piol_bail};
use piol_io::{ReadAt, WriteAt};

use crate::Context;
use crate::file::{encode_samples, sample_count};
use crate::header::{write_rows, write_rows_at};
use crate::metadata::TraceMetadata;
use crate::segy::{
    BinaryHeader, FILE_HEADER_LEN, NumberFormat, TEXT_HEADER_LEN, TEXT_HEADER_SIZE, TraceLayout,
};

/// A SEG-Y file being written by a group of workers.
///
/// Every worker writes its own traces; [`finish`][Self::finish] is collective and writes the
/// file header once.
pub struct WriteSegy<W> {
    ctx: Context,
    io: W,
    text: Vec<u8>,
    binary: BinaryHeader,
    layout: TraceLayout,
    num_traces: Option<u64>,
}

impl<W: WriteAt + ReadAt> WriteSegy<W> {
    pub fn create(
        ctx: &Context,
        io: W,
        num_samples: u16,
        sample_interval: u16,
        format: NumberFormat,
    ) -> Self {
        let binary = BinaryHeader {
            num_samples,
            sample_interval,
            format,
        };
        Self {
            ctx: ctx.clone(),
            io,
            text: vec![b' '; TEXT_HEADER_LEN],
            binary,
            layout: TraceLayout::new(usize::from(num_samples), format),
            num_traces: None,
        }
    }

    /// Set the text header, padded with spaces to its full size.
    pub fn with_text(mut self, text: &[u8]) -> PiolResult<Self> {
        if text.len() > self.text.len() {
            piol_bail!("text header of {} bytes exceeds {TEXT_HEADER_SIZE}", text.len());
        }
        self.text[..text.len()].copy_from_slice(text);
        self.text[text.len()..].fill(b' ');
        Ok(self)
    }

    /// Declare the total number of traces in the file. Must agree across workers.
    pub fn set_num_traces(&mut self, num_traces: u64) {
        self.num_traces = Some(num_traces);
    }

    pub fn num_traces(&self) -> Option<u64> {
        self.num_traces
    }

    pub fn layout(&self) -> &TraceLayout {
        &self.layout
    }

    fn check_indices(&self, indices: impl IntoIterator<Item = u64>) -> PiolResult<()> {
        if let Some(num_traces) = self.num_traces {
            if let Some(index) = indices.into_iter().find(|&i| i >= num_traces) {
                piol_bail!("trace {index} is past the {num_traces} traces of the file");
            }
        }
        Ok(())
    }

    /// Encode rows of `store` from `store_offset` into traces `offset..offset + count`.
    pub fn write_metadata(
        &self,
        offset: u64,
        count: usize,
        store: &TraceMetadata,
        store_offset: usize,
    ) -> PiolResult<()> {
        self.check_indices((offset..offset + count as u64).last())?;
        write_rows(&self.ctx, &self.io, &self.layout, offset, count, store, store_offset)
    }

    /// Encode rows of `store` from `store_offset` into the traces at `indices`.
    pub fn write_metadata_at(
        &self,
        indices: &[u64],
        store: &TraceMetadata,
        store_offset: usize,
    ) -> PiolResult<()> {
        self.check_indices(indices.iter().copied())?;
        write_rows_at(&self.ctx, &self.io, &self.layout, indices, store, store_offset)
    }

    /// Write the samples of traces `offset..offset + count`, trace after trace.
    pub fn write_traces(&self, offset: u64, count: usize, samples: &[f32]) -> PiolResult<()> {
        self.check_indices((offset..offset + count as u64).last())?;
        let indices = (offset..offset + count as u64).collect::<Vec<_>>();
        self.write_samples(&indices, samples)
    }

    /// Write the samples of the traces at `indices`, taken in order from `samples`.
    pub fn write_traces_at(&self, indices: &[u64], samples: &[f32]) -> PiolResult<()> {
        self.check_indices(indices.iter().copied())?;
        self.write_samples(indices, samples)
    }

    fn write_samples(&self, indices: &[u64], samples: &[f32]) -> PiolResult<()> {
        let ns = self.layout.num_samples();
        let needed = sample_count(samples.len(), indices.len(), ns)?;
        if needed == 0 {
            return Ok(());
        }

        let mut buffer = vec![0u8; ns * self.layout.format().sample_size()];
        for (&index, trace) in indices.iter().zip(samples[..needed].chunks(ns)) {
            encode_samples(self.layout.format(), trace, &mut buffer)
                .map_err(|e| e.with_context(format!("encoding samples of trace {index}")))?;
            self.io
                .write_all_at(self.layout.samples_offset(index), &buffer)?;
        }
        self.ctx
            .metrics()
            .record_write((buffer.len() * indices.len()) as u64);
        Ok(())
    }

    /// Write the file header and make every worker's writes durable. Collective.
    ///
    /// With a declared trace count the file is extended to hold all of its traces. A failure
    /// on any worker fails the call on every worker.
    pub fn finish(self) -> PiolResult<()> {
        let flushed = self.io.flush().map_err(PiolError::from);
        self.agree(flushed, "flushing trace data")?;

        let written = if self.ctx.rank() == 0 {
            self.write_file_header()
        } else {
            Ok(())
        };
        self.agree(written, "writing the file header")
    }

    fn write_file_header(&self) -> PiolResult<()> {
        let mut header = vec![0u8; FILE_HEADER_LEN];
        header[..self.text.len()].copy_from_slice(&self.text);
        self.binary.encode(&mut header)?;
        self.io.write_all_at(0, &header)?;

        if let Some(num_traces) = self.num_traces {
            let size = self.layout.trace_offset(num_traces);
            if self.io.size()? < size {
                self.io.write_all_at(size - 1, &[0])?;
            }
        }
        self.io.flush()?;
        debug!("wrote SEG-Y file header");
        Ok(())
    }

    /// Share the outcome of a step every worker takes part in.
    fn agree(&self, local: PiolResult<()>, step: &str) -> PiolResult<()> {
        if self.ctx.all_agree(local.is_ok())? {
            return local;
        }
        local.map_err(|e| e.with_context(format!("{step} failed")))?;
        piol_bail!(CommError: "{step} failed on another worker")
    }
}
