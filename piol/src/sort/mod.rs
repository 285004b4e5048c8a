//! Distributed sort of trace metadata.
//!
//! Workers sort their own traces, then repeatedly swap boundary regions with their neighbours
//! (odd-even merge-split) until a round passes in which nothing moves. The result is the
//! order a single-process stable sort would produce, with every worker keeping its count of
//! traces.

mod exchange;
mod item;

pub use exchange::*;
pub use item::*;
use itertools::Itertools;
use piol_comm::CommunicatorExt;
use piol_error::PiolResult;

use crate::Context;
use crate::metadata::TraceMetadata;
use crate::rules::{Key, Rules};

/// The orderings a trace set can be sorted by.
///
/// Every ordering compares its primary keys, then its secondary key, then the original global
/// trace index. Computed offsets are the source to receiver distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortType {
    /// Source x, y then receiver x, y.
    SrcRcv,
    SrcOffset,
    SrcComputedOffset,
    RcvOffset,
    RcvComputedOffset,
    /// Inline then crossline.
    Line,
    LineOffset,
    LineComputedOffset,
    /// Offset, then inline and crossline.
    OffsetLine,
}

const SOURCE: [Key; 2] = [Key::SourceX, Key::SourceY];
const RECEIVER: [Key; 2] = [Key::ReceiverX, Key::ReceiverY];
const LINE: [Key; 2] = [Key::Inline, Key::Crossline];

impl SortType {
    /// The header fields this ordering compares.
    pub fn keys(&self) -> &'static [Key] {
        match self {
            SortType::SrcRcv
            | SortType::SrcComputedOffset
            | SortType::RcvComputedOffset => &[
                Key::SourceX,
                Key::SourceY,
                Key::ReceiverX,
                Key::ReceiverY,
            ],
            SortType::SrcOffset => &[Key::SourceX, Key::SourceY, Key::Offset],
            SortType::RcvOffset => &[Key::ReceiverX, Key::ReceiverY, Key::Offset],
            SortType::Line => &LINE,
            SortType::LineOffset | SortType::OffsetLine => {
                &[Key::Inline, Key::Crossline, Key::Offset]
            }
            SortType::LineComputedOffset => &[
                Key::Inline,
                Key::Crossline,
                Key::SourceX,
                Key::SourceY,
                Key::ReceiverX,
                Key::ReceiverY,
            ],
        }
    }

    /// Rules decoding every field this ordering needs, plus the global trace number.
    pub fn rules(&self) -> PiolResult<Rules> {
        let mut rules = Rules::with_keys(self.keys().iter().copied())?;
        rules.add_key(Key::GlobalTraceNumber)?;
        Ok(rules)
    }

    /// The comparison keys of `row` of `store`.
    pub fn sort_keys(&self, store: &TraceMetadata, row: usize) -> PiolResult<[f64; SORT_KEYS]> {
        let get = |key| store.get_numeric(row, key);
        let pair = |[x, y]: [Key; 2]| -> PiolResult<(f64, f64)> { Ok((get(x)?, get(y)?)) };
        let computed_offset = || -> PiolResult<f64> {
            let (sx, sy) = pair(SOURCE)?;
            let (rx, ry) = pair(RECEIVER)?;
            Ok((sx - rx).hypot(sy - ry))
        };

        Ok(match self {
            SortType::SrcRcv => {
                let (sx, sy) = pair(SOURCE)?;
                let (rx, ry) = pair(RECEIVER)?;
                [sx, sy, rx, ry]
            }
            SortType::SrcOffset => {
                let (sx, sy) = pair(SOURCE)?;
                [sx, sy, get(Key::Offset)?, 0.0]
            }
            SortType::SrcComputedOffset => {
                let (sx, sy) = pair(SOURCE)?;
                [sx, sy, computed_offset()?, 0.0]
            }
            SortType::RcvOffset => {
                let (rx, ry) = pair(RECEIVER)?;
                [rx, ry, get(Key::Offset)?, 0.0]
            }
            SortType::RcvComputedOffset => {
                let (rx, ry) = pair(RECEIVER)?;
                [rx, ry, computed_offset()?, 0.0]
            }
            SortType::Line => {
                let (il, xl) = pair(LINE)?;
                [il, xl, 0.0, 0.0]
            }
            SortType::LineOffset => {
                let (il, xl) = pair(LINE)?;
                [il, xl, get(Key::Offset)?, 0.0]
            }
            SortType::LineComputedOffset => {
                let (il, xl) = pair(LINE)?;
                [il, xl, computed_offset()?, 0.0]
            }
            SortType::OffsetLine => {
                let (il, xl) = pair(LINE)?;
                [get(Key::Offset)?, il, xl, 0.0]
            }
        })
    }

    /// The sort items of every row of `store`.
    ///
    /// The original index of a row is its global trace number when the store decodes one,
    /// otherwise `offset + row`.
    pub fn items(&self, store: &TraceMetadata, offset: u64) -> PiolResult<Vec<SortItem>> {
        let has_index = store.rules().contains(Key::GlobalTraceNumber);
        (0..store.num_traces())
            .map(|row| {
                let index = if has_index {
                    store.get_index(row, Key::GlobalTraceNumber)?
                } else {
                    offset + row as u64
                };
                Ok(SortItem::new(self.sort_keys(store, row)?, index))
            })
            .collect()
    }
}

/// The outcome of a distributed sort on one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortPermutation {
    /// Global sorted position of the first entry of `indices`.
    pub offset: u64,
    /// Original global trace index at each sorted position from `offset`.
    pub indices: Vec<u64>,
}

impl SortPermutation {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Sort the traces held in `store` across all workers. Collective.
///
/// Each worker passes the metadata of its own block of traces, `offset` being the global
/// index of its first row, and receives the original indices of the traces that belong at its
/// block of sorted positions.
pub fn sort(
    ctx: &Context,
    store: &TraceMetadata,
    offset: u64,
    sort_type: SortType,
) -> PiolResult<SortPermutation> {
    let items = sort_type.items(store, offset)?;
    let sorted = sort_items(ctx, items)?;
    let offset = ctx.comm().exclusive_scan_sum(sorted.len() as u64)?;
    Ok(SortPermutation {
        offset,
        indices: sorted.into_iter().map(|item| item.index).collect(),
    })
}

/// Whether the traces in `store`, concatenated over workers in rank order, are sorted.
/// Collective; every worker gets the same answer.
pub fn check_order(
    ctx: &Context,
    store: &TraceMetadata,
    offset: u64,
    sort_type: SortType,
) -> PiolResult<bool> {
    check_items_order(ctx, &sort_type.items(store, offset)?)
}

/// Whether `items`, concatenated over workers in rank order, are sorted. Collective.
///
/// Each worker checks its own items, then hands its last item to the next non-empty worker
/// to check the boundary.
pub fn check_items_order(ctx: &Context, items: &[SortItem]) -> PiolResult<bool> {
    let comm = ctx.comm();
    let mut ordered = items
        .iter()
        .tuple_windows()
        .all(|(a, b)| a.total_cmp(b).is_le());

    let sizes = comm.all_gather_u64(items.len() as u64)?;
    let active = (0..sizes.len()).filter(|&r| sizes[r] > 0).collect::<Vec<_>>();
    if let Some(position) = active.iter().position(|&r| r == ctx.rank()) {
        if let (Some(&next), Some(last)) = (active.get(position + 1), items.last()) {
            comm.send(next, encode_items(std::slice::from_ref(last)))?;
        }
        if let (Some(prev), Some(first)) = (position.checked_sub(1), items.first()) {
            let received = decode_items(comm.recv(active[prev])?)?;
            ordered &= received.iter().all(|last| last.total_cmp(first).is_le());
        }
    }

    comm.all_reduce_and(ordered)
}

#[cfg(test)]
mod tests {
    use piol_comm::run_group;
    use rstest::rstest;

    use super::*;
    use crate::PiolConfig;

    fn line_store(lines: &[(i64, i64)]) -> TraceMetadata {
        let mut store = TraceMetadata::new(Rules::with_keys(LINE).unwrap(), lines.len());
        for (row, &(il, xl)) in lines.iter().enumerate() {
            store.set_integer(row, Key::Inline, il).unwrap();
            store.set_integer(row, Key::Crossline, xl).unwrap();
        }
        store
    }

    #[test]
    fn line_sort_on_one_worker() {
        let store = line_store(&[(2, 1), (1, 5), (1, 2), (2, 1)]);
        let ctx = Context::single();
        let permutation = sort(&ctx, &store, 10, SortType::Line).unwrap();
        assert_eq!(permutation.offset, 0);
        assert_eq!(permutation.indices, vec![12, 11, 10, 13]);
        assert!(!check_order(&ctx, &store, 10, SortType::Line).unwrap());
    }

    #[test]
    fn computed_offset_key() {
        let rules = SortType::SrcComputedOffset.rules().unwrap();
        let mut store = TraceMetadata::new(rules, 1);
        store.set_float(0, Key::SourceX, 3.0).unwrap();
        store.set_float(0, Key::ReceiverY, 4.0).unwrap();
        let keys = SortType::SrcComputedOffset.sort_keys(&store, 0).unwrap();
        assert_eq!(keys, [3.0, 0.0, 5.0, 0.0]);
    }

    #[rstest]
    #[case(SortType::SrcRcv)]
    #[case(SortType::SrcOffset)]
    #[case(SortType::SrcComputedOffset)]
    #[case(SortType::RcvOffset)]
    #[case(SortType::RcvComputedOffset)]
    #[case(SortType::Line)]
    #[case(SortType::LineOffset)]
    #[case(SortType::LineComputedOffset)]
    #[case(SortType::OffsetLine)]
    fn rules_cover_keys(#[case] sort_type: SortType) {
        let rules = sort_type.rules().unwrap();
        let store = TraceMetadata::new(rules, 1);
        sort_type.sort_keys(&store, 0).unwrap();
        assert_eq!(sort_type.items(&store, 0).unwrap()[0].index, 0);
    }

    #[test]
    fn missing_key_is_an_error() {
        let store = line_store(&[(1, 1)]);
        assert!(SortType::LineOffset.sort_keys(&store, 0).is_err());
    }

    #[rstest]
    #[case(None)]
    #[case(Some(1))]
    #[case(Some(2))]
    fn reverse_order_across_uneven_workers(#[case] region: Option<usize>) {
        let sizes = [3usize, 0, 4, 2];
        let results = run_group(sizes.len(), |comm| {
            let mut config = PiolConfig::default();
            if let Some(region) = region {
                config = config.with_sort_region(region)?;
            }
            let ctx = Context::new(comm, config);
            let offset = sizes[..ctx.rank()].iter().sum::<usize>() as u64;
            let items = (offset..offset + sizes[ctx.rank()] as u64)
                .map(|i| SortItem::new([-(i as f64), 0.0, 0.0, 0.0], i))
                .collect::<Vec<_>>();
            let before = check_items_order(&ctx, &items)?;
            let sorted = sort_items(&ctx, items)?;
            let after = check_items_order(&ctx, &sorted)?;
            Ok((before, after, sorted.iter().map(|i| i.index).collect::<Vec<_>>()))
        })
        .unwrap();

        assert!(results.iter().all(|(before, after, _)| !before && *after));
        let indices = results.into_iter().map(|(_, _, i)| i).collect::<Vec<_>>();
        assert_eq!(
            indices,
            vec![vec![8, 7, 6], vec![], vec![5, 4, 3, 2], vec![1, 0]]
        );
    }

    #[test]
    fn permutation_offsets_follow_rank_order() {
        let results = run_group(2, |comm| {
            let ctx = Context::new(comm, PiolConfig::default());
            let lines = if ctx.rank() == 0 {
                vec![(3, 1), (1, 1), (2, 2)]
            } else {
                vec![(1, 2), (0, 9)]
            };
            let offset = if ctx.rank() == 0 { 0 } else { 3 };
            let store = line_store(&lines);
            let permutation = sort(&ctx, &store, offset, SortType::Line)?;
            let sorted_before = check_order(&ctx, &store, offset, SortType::Line)?;
            Ok((permutation, sorted_before))
        })
        .unwrap();

        assert!(results.iter().all(|(_, sorted)| !sorted));
        assert_eq!(results[0].0.offset, 0);
        assert_eq!(results[0].0.indices, vec![4, 1, 3]);
        assert_eq!(results[1].0.offset, 3);
        assert_eq!(results[1].0.indices, vec![2, 0]);
    }
}
