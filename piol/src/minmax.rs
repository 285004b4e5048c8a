//! Global extremes of a per-trace value and the traces that realize them.

use std::cmp::Ordering;
use std::time::Instant;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use log::debug;
use piol_error::{PiolResult, piol_bail};
use piol_metrics::MIN_MAX_TIMER;

use crate::Context;
use crate::metadata::TraceMetadata;
use crate::rules::Key;

/// A value and the global index of the trace it was taken from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordElem {
    pub value: f64,
    pub trace_index: u64,
}

/// The smallest and largest value over every worker's traces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinMax {
    pub min: CoordElem,
    pub max: CoordElem,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    value: f64,
    secondary: f64,
    index: u64,
}

const CANDIDATE_SIZE: usize = 2 * size_of::<f64>() + size_of::<u64>();

impl Candidate {
    fn key_cmp(&self, other: &Self) -> Ordering {
        self.value
            .total_cmp(&other.value)
            .then(self.secondary.total_cmp(&other.secondary))
    }

    /// Smaller keys first, lower index on ties.
    fn min_cmp(&self, other: &Self) -> Ordering {
        self.key_cmp(other).then(self.index.cmp(&other.index))
    }

    /// Larger keys first, lower index on ties.
    fn max_cmp(&self, other: &Self) -> Ordering {
        other.key_cmp(self).then(self.index.cmp(&other.index))
    }

    fn elem(&self) -> CoordElem {
        CoordElem {
            value: self.value,
            trace_index: self.index,
        }
    }

    fn put(&self, buf: &mut BytesMut) {
        buf.put_f64_le(self.value);
        buf.put_f64_le(self.secondary);
        buf.put_u64_le(self.index);
    }

    fn get(buf: &mut Bytes) -> Self {
        Self {
            value: buf.get_f64_le(),
            secondary: buf.get_f64_le(),
            index: buf.get_u64_le(),
        }
    }
}

fn local_extremes(candidates: impl Iterator<Item = Candidate>) -> Option<(Candidate, Candidate)> {
    candidates.fold(None, |acc, c| match acc {
        None => Some((c, c)),
        Some((min, max)) => Some((
            if c.min_cmp(&min).is_lt() { c } else { min },
            if c.max_cmp(&max).is_lt() { c } else { max },
        )),
    })
}

/// Find the global minimum and maximum of `value_of` over every worker's `items`. Collective.
///
/// Item `i` of a worker has global trace index `offset + i`. Equal values are ordered by
/// `secondary_of`, then by lowest trace index. Workers without items take no part in the
/// reduction; `None` when no worker has any.
pub fn get_min_max<T>(
    ctx: &Context,
    offset: u64,
    items: &[T],
    value_of: impl Fn(&T) -> f64,
    secondary_of: impl Fn(&T) -> f64,
) -> PiolResult<Option<MinMax>> {
    let start = Instant::now();
    let local = local_extremes(items.iter().zip(offset..).map(|(item, index)| Candidate {
        value: value_of(item),
        secondary: secondary_of(item),
        index,
    }));

    let mut payload = BytesMut::with_capacity(2 * CANDIDATE_SIZE);
    if let Some((min, max)) = local {
        min.put(&mut payload);
        max.put(&mut payload);
    }

    let mut gathered = Vec::new();
    for (rank, mut bytes) in ctx.comm().all_gather(payload.freeze())?.into_iter().enumerate() {
        match bytes.len() {
            0 => {}
            len if len == 2 * CANDIDATE_SIZE => {
                gathered.push(Candidate::get(&mut bytes));
                gathered.push(Candidate::get(&mut bytes));
            }
            len => piol_bail!(CommError: "rank {rank} sent a min/max candidate of {len} bytes"),
        }
    }

    let result = local_extremes(gathered.into_iter()).map(|(min, max)| MinMax {
        min: min.elem(),
        max: max.elem(),
    });
    ctx.metrics().timer(MIN_MAX_TIMER).update(start.elapsed());
    if let Some(result) = &result {
        debug!(
            "min {} at trace {}, max {} at trace {}",
            result.min.value, result.min.trace_index, result.max.value, result.max.trace_index
        );
    }
    Ok(result)
}

/// Extremes of a coordinate pair held in `store`: x with y as tie-break, then y with x.
/// Collective.
///
/// Row `r` of the store is global trace `offset + r`.
pub fn get_coord_min_max(
    ctx: &Context,
    offset: u64,
    store: &TraceMetadata,
    x_key: Key,
    y_key: Key,
) -> PiolResult<Option<[MinMax; 2]>> {
    let coords = (0..store.num_traces())
        .map(|row| Ok((store.get_numeric(row, x_key)?, store.get_numeric(row, y_key)?)))
        .collect::<PiolResult<Vec<_>>>()?;

    let x = get_min_max(ctx, offset, &coords, |c| c.0, |c| c.1)?;
    let y = get_min_max(ctx, offset, &coords, |c| c.1, |c| c.0)?;
    Ok(x.zip(y).map(|(x, y)| [x, y]))
}
