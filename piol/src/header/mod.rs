//! The trace header codec: decoding rule-selected fields out of 240-byte trace headers into a
//! [`TraceMetadata`] store and encoding them back.

mod batch;
pub mod scale;

pub use batch::*;
use piol_error::{PiolResult, piol_bail, piol_err};

use crate::metadata::TraceMetadata;
use crate::rules::{Key, RuleEntry, RuleKind};
use crate::segy::TRACE_HEADER_SIZE;
use scale::{apply_scale, choose_scale, mantissa};

/// Decode one trace header into `row` of `store`, using the store's rules.
///
/// `trace_index` is the trace's position in the file and fills the global trace number;
/// the local trace number is the row.
pub fn decode_row(
    header: &[u8],
    store: &mut TraceMetadata,
    row: usize,
    trace_index: u64,
) -> PiolResult<()> {
    if header.len() < TRACE_HEADER_SIZE {
        piol_bail!(FormatError: "trace header of {} bytes, expected {TRACE_HEADER_SIZE}", header.len());
    }

    let entries = store.rules().entries().to_vec();
    decode_entries(&entries, header, store, row, trace_index)
}

pub(crate) fn decode_entries(
    entries: &[RuleEntry],
    header: &[u8],
    store: &mut TraceMetadata,
    row: usize,
    trace_index: u64,
) -> PiolResult<()> {
    for entry in entries {
        let key = entry.key();
        match entry.kind() {
            RuleKind::LongInteger { location } => {
                store.set_integer(row, key, i64::from(read_i32(header, location)?))?;
            }
            RuleKind::ShortInteger { location } => {
                store.set_integer(row, key, i64::from(read_i16(header, location)?))?;
            }
            RuleKind::Float {
                location,
                scalar_location,
            } => {
                let scale = read_i16(header, scalar_location)?;
                store.set_float(row, key, apply_scale(read_i32(header, location)?, scale))?;
                store.set_scalar(row, scalar_location, Some(scale))?;
            }
            RuleKind::Index => {
                let value = match key {
                    Key::LocalTraceNumber => row as u64,
                    _ => trace_index,
                };
                store.set_index(row, key, value)?;
            }
            RuleKind::RawCopy => {
                store
                    .raw_header_mut(row)?
                    .copy_from_slice(&header[..TRACE_HEADER_SIZE]);
            }
        }
    }
    Ok(())
}

/// Encode `row` of `store` into a trace header, in place.
///
/// With a raw copy rule the verbatim header is written first; otherwise bytes not covered by
/// a rule are left untouched. The header is not modified at all when any field fails to
/// encode.
pub fn encode_row(store: &TraceMetadata, row: usize, header: &mut [u8]) -> PiolResult<()> {
    if header.len() < TRACE_HEADER_SIZE {
        piol_bail!(FormatError: "trace header of {} bytes, expected {TRACE_HEADER_SIZE}", header.len());
    }

    let mut scratch = [0u8; TRACE_HEADER_SIZE];
    if store.rules().has_raw_copy() {
        scratch.copy_from_slice(store.raw_header(row)?);
    } else {
        scratch.copy_from_slice(&header[..TRACE_HEADER_SIZE]);
    }

    for entry in store.rules().entries() {
        let key = entry.key();
        match entry.kind() {
            RuleKind::LongInteger { location } => {
                let value = store.get_integer(row, key)?;
                let value = i32::try_from(value).map_err(|_| {
                    piol_err!(NumericOverflow: "{key} value {value} does not fit 4 bytes")
                })?;
                write_field(&mut scratch, location, &value.to_be_bytes())?;
            }
            RuleKind::ShortInteger { location } => {
                let value = store.get_integer(row, key)?;
                let value = i16::try_from(value).map_err(|_| {
                    piol_err!(NumericOverflow: "{key} value {value} does not fit 2 bytes")
                })?;
                write_field(&mut scratch, location, &value.to_be_bytes())?;
            }
            // written per scalar group below
            RuleKind::Float { .. } | RuleKind::Index | RuleKind::RawCopy => {}
        }
    }

    for &scalar_location in store.scalar_locations() {
        encode_scaled_group(store, row, scalar_location, &mut scratch)
            .map_err(|e| e.with_context(format!("encoding row {row}")))?;
    }

    header[..TRACE_HEADER_SIZE].copy_from_slice(&scratch);
    Ok(())
}

/// Encode the fields sharing the scalar at `scalar_location`, and the scalar itself.
///
/// The scalar is only re-chosen when every field it scales is known: all of them are in the
/// rules, or the raw header supplies the rest, which are then rewritten under the new scalar.
/// Otherwise the row's decoded or set scalar is kept and values are rounded to it.
fn encode_scaled_group(
    store: &TraceMetadata,
    row: usize,
    scalar_location: u16,
    scratch: &mut [u8],
) -> PiolResult<()> {
    let mut fields = Vec::new();
    for key in store.scaled_keys(scalar_location) {
        let location = store
            .rules()
            .get(key)
            .and_then(|e| e.kind().value_range())
            .map(|r| r.start + 1)
            .ok_or_else(|| piol_err!(InvalidLayout: "{key} has no byte location"))?;
        fields.push((key, location, store.get_float(row, key)?));
    }

    let previous = store.scalar(row, scalar_location)?;
    let siblings = store.rules().uncovered_siblings(scalar_location);
    let scale = if siblings.is_empty() {
        choose_scale(&fields.iter().map(|f| f.2).collect::<Vec<_>>(), previous)?
    } else if store.rules().has_raw_copy() {
        let on_disk = read_i16(scratch, scalar_location)?;
        for (key, location) in siblings {
            let value = apply_scale(read_i32(scratch, location)?, on_disk);
            fields.push((key, usize::from(location), value));
        }
        choose_scale(
            &fields.iter().map(|f| f.2).collect::<Vec<_>>(),
            previous.or(Some(on_disk)),
        )?
    } else {
        match previous {
            Some(scale) => scale,
            None => choose_scale(&fields.iter().map(|f| f.2).collect::<Vec<_>>(), None)?,
        }
    };

    write_field(scratch, scalar_location, &scale.to_be_bytes())?;
    for (key, location, value) in fields {
        let raw = mantissa(value, scale).ok_or_else(|| {
            piol_err!(NumericOverflow: "{key} value {value} does not fit under scalar {scale}")
        })?;
        write_field(scratch, location, &raw.to_be_bytes())?;
    }
    Ok(())
}

fn field_bytes<const N: usize>(header: &[u8], location: impl Into<usize>) -> PiolResult<[u8; N]> {
    let start = location.into().wrapping_sub(1);
    header
        .get(start..start.wrapping_add(N))
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| outside_header(start))
}

fn read_i32(header: &[u8], location: u16) -> PiolResult<i32> {
    field_bytes(header, location).map(i32::from_be_bytes)
}

fn read_i16(header: &[u8], location: u16) -> PiolResult<i16> {
    field_bytes(header, location).map(i16::from_be_bytes)
}

fn write_field(header: &mut [u8], location: impl Into<usize>, bytes: &[u8]) -> PiolResult<()> {
    let start = location.into().wrapping_sub(1);
    header
        .get_mut(start..start.wrapping_add(bytes.len()))
        .ok_or_else(|| outside_header(start))?
        .copy_from_slice(bytes);
    Ok(())
}

fn outside_header(start: usize) -> piol_error::PiolError {
    piol_err!(FormatError: "field at byte {} lies outside the trace header", start.wrapping_add(1))
}
