use std::time::Instant;

use log::{debug, trace};
use piol_comm::CommunicatorExt;
use piol_error::{PiolResult, piol_bail};
use piol_metrics::{SORT_MOVED, SORT_ROUNDS, SORT_TIMER};

use crate::Context;
use crate::sort::item::{SortItem, decode_items, encode_items};

/// Progress of one worker through the distributed sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortState {
    /// Sort the local items.
    LocalSort,
    /// Run one neighbour exchange phase. Even phases pair active positions `(0, 1), (2, 3)`,
    /// odd phases pair `(1, 2), (3, 4)`.
    Exchange { round: usize, odd: bool },
    /// No item moved in the last round.
    Converged { rounds: usize },
}

/// One worker's view of the sort: its items and where it sits among the non-empty workers.
struct Sorter<'a> {
    ctx: &'a Context,
    items: Vec<SortItem>,
    sizes: Vec<u64>,
    // ranks holding at least one item, in rank order
    active: Vec<usize>,
    position: Option<usize>,
    region: usize,
    moved: usize,
}

impl<'a> Sorter<'a> {
    fn new(ctx: &'a Context, items: Vec<SortItem>) -> PiolResult<Self> {
        let sizes = ctx.comm().all_gather_u64(items.len() as u64)?;
        let active = (0..sizes.len()).filter(|&r| sizes[r] > 0).collect::<Vec<_>>();
        let position = active.iter().position(|&r| r == ctx.rank());
        Ok(Self {
            ctx,
            items,
            sizes,
            active,
            position,
            region: ctx.config().sort_region().unwrap_or(usize::MAX),
            moved: 0,
        })
    }

    fn step(&mut self, state: SortState) -> PiolResult<SortState> {
        Ok(match state {
            SortState::LocalSort => {
                self.items.sort_by(SortItem::total_cmp);
                SortState::Exchange {
                    round: 1,
                    odd: false,
                }
            }
            SortState::Exchange { round, odd: false } => {
                self.moved += self.exchange(false)?;
                SortState::Exchange { round, odd: true }
            }
            SortState::Exchange { round, odd: true } => {
                self.moved += self.exchange(true)?;
                let metrics = self.ctx.metrics();
                metrics.counter(SORT_ROUNDS).inc();
                metrics
                    .counter(SORT_MOVED)
                    .add(i64::try_from(self.moved).unwrap_or(i64::MAX));
                trace!(
                    "rank {} moved {} items in round {round}",
                    self.ctx.rank(),
                    self.moved
                );

                let settled = self.ctx.comm().all_reduce_and(self.moved == 0)?;
                self.moved = 0;
                if settled {
                    SortState::Converged { rounds: round }
                } else {
                    SortState::Exchange {
                        round: round + 1,
                        odd: false,
                    }
                }
            }
            converged @ SortState::Converged { .. } => converged,
        })
    }

    /// Merge-split with this phase's partner, returning how many items came in.
    fn exchange(&mut self, odd: bool) -> PiolResult<usize> {
        let Some(position) = self.position else {
            return Ok(0);
        };
        let lower = (position % 2 == 1) == odd;
        let partner = if lower {
            position + 1
        } else if let Some(partner) = position.checked_sub(1) {
            partner
        } else {
            return Ok(0);
        };
        let Some(&partner) = self.active.get(partner) else {
            return Ok(0);
        };

        let len = self.items.len();
        let partner_len = usize::try_from(self.sizes[partner]).unwrap_or(usize::MAX);
        let k = len.min(partner_len).min(self.region);

        let window = if lower { len - k..len } else { 0..k };
        let incoming = decode_items(
            self.ctx
                .comm()
                .sendrecv(partner, encode_items(&self.items[window.clone()]))?,
        )?;
        if incoming.len() != k {
            piol_bail!(CommError: "rank {partner} sent {} items, expected {k}", incoming.len());
        }

        let (kept, moved) = if lower {
            merge_lowest(&self.items[window.clone()], &incoming, k)
        } else {
            merge_highest(&self.items[window.clone()], &incoming, k)
        };
        if moved > 0 {
            self.items[window].copy_from_slice(&kept);
            self.items.sort_by(SortItem::total_cmp);
        }
        Ok(moved)
    }
}

/// The `k` smallest of two sorted runs, and how many of them came from `theirs`.
fn merge_lowest(mine: &[SortItem], theirs: &[SortItem], k: usize) -> (Vec<SortItem>, usize) {
    let mut kept = Vec::with_capacity(k);
    let (mut i, mut j) = (0, 0);
    while kept.len() < k {
        let take_theirs = match (mine.get(i), theirs.get(j)) {
            (Some(a), Some(b)) => b.total_cmp(a).is_lt(),
            (None, Some(_)) => true,
            (_, None) => false,
        };
        if take_theirs {
            kept.push(theirs[j]);
            j += 1;
        } else {
            kept.push(mine[i]);
            i += 1;
        }
    }
    (kept, j)
}

/// The `k` largest of two sorted runs, ascending, and how many of them came from `theirs`.
fn merge_highest(mine: &[SortItem], theirs: &[SortItem], k: usize) -> (Vec<SortItem>, usize) {
    let mut kept = Vec::with_capacity(k);
    let (mut i, mut j) = (mine.len(), theirs.len());
    while kept.len() < k {
        let take_theirs = match (i.checked_sub(1), j.checked_sub(1)) {
            (Some(a), Some(b)) => theirs[b].total_cmp(&mine[a]).is_gt(),
            (None, Some(_)) => true,
            (_, None) => false,
        };
        if take_theirs {
            j -= 1;
            kept.push(theirs[j]);
        } else {
            i -= 1;
            kept.push(mine[i]);
        }
    }
    kept.reverse();
    (kept, theirs.len() - j)
}

/// Sort items across all workers. Collective.
///
/// Each worker keeps as many items as it brought; on return the items of every worker are
/// sorted and every item on a worker orders before every item on the next non-empty worker.
pub fn sort_items(ctx: &Context, items: Vec<SortItem>) -> PiolResult<Vec<SortItem>> {
    let start = Instant::now();
    let mut sorter = Sorter::new(ctx, items)?;
    let mut state = SortState::LocalSort;
    loop {
        state = sorter.step(state)?;
        if let SortState::Converged { rounds } = state {
            debug!("sort converged after {rounds} rounds on rank {}", ctx.rank());
            break;
        }
    }
    ctx.metrics().timer(SORT_TIMER).update(start.elapsed());
    Ok(sorter.items)
}
