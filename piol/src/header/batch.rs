use log::debug;
use piol_error::{PiolError, PiolResult, piol_bail, piol_err};
use piol_io::{ReadAt, ReadRanges, WriteAt, merge_ranges};

use crate::Context;
use crate::header::{decode_entries, encode_row};
use crate::metadata::TraceMetadata;
use crate::segy::{TRACE_HEADER_SIZE, TraceLayout};

/// Decode the headers of traces `offset..offset + count` into rows
/// `store_offset..store_offset + count` of `store`.
pub fn read_rows<R: ReadAt>(
    ctx: &Context,
    io: &R,
    layout: &TraceLayout,
    offset: u64,
    count: usize,
    store: &mut TraceMetadata,
    store_offset: usize,
) -> PiolResult<()> {
    let indices = (offset..offset + count as u64).collect::<Vec<_>>();
    read_rows_at(ctx, io, layout, &indices, store, store_offset)
}

/// Decode the headers of the traces at `indices`, in any order and possibly repeated, into
/// consecutive rows of `store` starting at `store_offset`.
///
/// Only the byte span the rules need is read from each header, and nearby spans are
/// coalesced into single reads. Rows that fail to decode are reported together as
/// [`PiolError::RowErrors`] after every other row has been decoded.
pub fn read_rows_at<R: ReadAt>(
    ctx: &Context,
    io: &R,
    layout: &TraceLayout,
    indices: &[u64],
    store: &mut TraceMetadata,
    store_offset: usize,
) -> PiolResult<()> {
    check_rows(store, store_offset, indices.len())?;
    let max_gap = ctx
        .config()
        .coalescing_window()
        .unwrap_or_else(|| io.performance_hint().coalescing_window());
    let extent = store.rules().extent();
    let entries = store.rules().entries().to_vec();

    let mut failures = Vec::new();
    let mut row = store_offset;
    for chunk in indices.chunks(ctx.config().max_traces_per_io()) {
        let mut header = [0u8; TRACE_HEADER_SIZE];
        if extent.is_empty() {
            for &index in chunk {
                if let Err(err) = decode_entries(&entries, &header, store, row, index) {
                    failures.push((row, err));
                }
                row += 1;
            }
            continue;
        }

        let ranges = chunk
            .iter()
            .map(|&index| {
                let start = layout.trace_offset(index) + extent.start as u64;
                start..start + extent.len() as u64
            })
            .collect::<Vec<_>>();
        let reads = merge_ranges(&ranges, max_gap);
        ctx.metrics().record_read(
            reads.iter().map(|r| r.end - r.start).sum(),
            reads.len() as u64,
        );
        debug!(
            "reading {} trace headers ({} bytes each) in {} calls",
            chunk.len(),
            extent.len(),
            reads.len()
        );

        let headers = ReadRanges::with_max_gap(io, max_gap).read_byte_ranges(&ranges)?;
        for (&index, bytes) in chunk.iter().zip(headers) {
            if bytes.len() != extent.len() {
                failures.push((
                    row,
                    piol_err!(
                        FormatError: "trace {index} is truncated: {} of {} header bytes",
                        bytes.len(),
                        extent.len()
                    ),
                ));
                row += 1;
                continue;
            }
            header[extent.range()].copy_from_slice(&bytes);
            if let Err(err) = decode_entries(&entries, &header, store, row, index) {
                failures.push((row, err));
            }
            row += 1;
        }
    }

    row_result(failures)
}

/// Encode rows `store_offset..store_offset + count` of `store` into the headers of traces
/// `offset..offset + count`.
pub fn write_rows<W: WriteAt>(
    ctx: &Context,
    io: &W,
    layout: &TraceLayout,
    offset: u64,
    count: usize,
    store: &TraceMetadata,
    store_offset: usize,
) -> PiolResult<()> {
    let indices = (offset..offset + count as u64).collect::<Vec<_>>();
    write_rows_at(ctx, io, layout, &indices, store, store_offset)
}

/// Encode consecutive rows of `store` starting at `store_offset` into the headers of the
/// traces at `indices`.
///
/// Only the bytes covered by the rules are written, so other header bytes already in the file
/// survive. A row that fails to encode is not written; the remaining rows are, and the
/// failures are reported together as [`PiolError::RowErrors`].
pub fn write_rows_at<W: WriteAt>(
    ctx: &Context,
    io: &W,
    layout: &TraceLayout,
    indices: &[u64],
    store: &TraceMetadata,
    store_offset: usize,
) -> PiolResult<()> {
    check_rows(store, store_offset, indices.len())?;
    let ranges = store.rules().write_ranges();
    if ranges.is_empty() {
        return Ok(());
    }

    let mut failures = Vec::new();
    let mut written = 0u64;
    for (row, &index) in (store_offset..).zip(indices) {
        let mut header = [0u8; TRACE_HEADER_SIZE];
        if let Err(err) = encode_row(store, row, &mut header) {
            failures.push((row, err));
            continue;
        }
        let position = layout.trace_offset(index);
        for range in &ranges {
            io.write_all_at(position + range.start as u64, &header[range.clone()])?;
            written += range.len() as u64;
        }
    }
    ctx.metrics().record_write(written);
    debug!(
        "wrote {} of {} trace headers",
        indices.len() - failures.len(),
        indices.len()
    );

    row_result(failures)
}

fn check_rows(store: &TraceMetadata, store_offset: usize, count: usize) -> PiolResult<()> {
    if store_offset + count > store.num_traces() {
        piol_bail!(OutOfBounds: store_offset + count, 0, store.num_traces());
    }
    Ok(())
}

fn row_result(failures: Vec<(usize, PiolError)>) -> PiolResult<()> {
    if failures.is_empty() {
        Ok(())
    } else {
        Err(PiolError::RowErrors(failures))
    }
}
