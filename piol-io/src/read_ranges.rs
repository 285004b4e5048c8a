use std::io;
use std::ops::Range;

use bytes::Bytes;
use log::trace;

use crate::ReadAt;

/// Serves a batch of byte ranges with as few underlying reads as the gap limit allows.
///
/// Requests may arrive unordered, repeated or overlapping. The answer keeps request order.
#[derive(Debug, Clone)]
pub struct ReadRanges<R> {
    read: R,
    max_gap: u64,
}

impl<R: ReadAt> ReadRanges<R> {
    /// Gap limit taken from the reader's [performance hint][crate::PerformanceHint].
    pub fn new(read: R) -> Self {
        let max_gap = read.performance_hint().coalescing_window();
        Self { read, max_gap }
    }

    pub fn with_max_gap(read: R, max_gap: u64) -> Self {
        Self { read, max_gap }
    }

    pub fn max_gap(&self) -> u64 {
        self.max_gap
    }

    pub fn read_byte_ranges(&self, ranges: &[Range<u64>]) -> io::Result<Vec<Bytes>> {
        let spans = merge_ranges(ranges, self.max_gap);
        trace!("{} byte ranges served by {} reads", ranges.len(), spans.len());

        let chunks = spans
            .iter()
            .map(|span| self.read.read_byte_range(span.clone()))
            .collect::<io::Result<Vec<_>>>()?;

        ranges
            .iter()
            .map(|range| {
                // spans are disjoint and sorted, so the covering one starts last at or before us
                let covering = spans
                    .partition_point(|span| span.start <= range.start)
                    .checked_sub(1)
                    .ok_or_else(|| io::Error::other("byte range outside every coalesced read"))?;
                let chunk = &chunks[covering];
                let base = spans[covering].start;
                let start = usize::try_from(range.start - base).map_err(io::Error::other)?;
                let end = usize::try_from(range.end - base).map_err(io::Error::other)?;
                Ok(chunk.slice(start.min(chunk.len())..end.min(chunk.len())))
            })
            .collect()
    }
}

/// The sorted, disjoint spans covering `ranges`, joining neighbours at most `max_gap` apart.
pub fn merge_ranges(ranges: &[Range<u64>], max_gap: u64) -> Vec<Range<u64>> {
    let mut sorted = ranges.to_vec();
    sorted.sort_unstable_by_key(|r| r.start);

    let mut spans: Vec<Range<u64>> = Vec::with_capacity(sorted.len());
    for range in sorted {
        match spans.last_mut() {
            Some(last) if range.start <= last.end.saturating_add(max_gap) => {
                last.end = last.end.max(range.end);
            }
            _ => spans.push(range),
        }
    }
    spans
}

#[cfg(test)]
mod tests {
    use std::ops::Range;

    use bytes::Bytes;
    use rstest::rstest;

    use crate::ReadRanges;
    use crate::read_ranges::merge_ranges;

    const HEADERS: &[u8] = b"hdr0....hdr1....hdr2....hdr3....";

    #[rstest]
    #[case(vec![0..4, 16..20], 12, vec![0..20])]
    #[case(vec![0..4, 16..20], 11, vec![0..4, 16..20])]
    #[case(vec![16..20, 0..4, 2..6], 0, vec![0..6, 16..20])]
    #[case(vec![8..12, 8..12], 0, vec![8..12])]
    #[case(vec![], 100, vec![])]
    fn merges_ranges(
        #[case] ranges: Vec<Range<u64>>,
        #[case] max_gap: u64,
        #[case] expected: Vec<Range<u64>>,
    ) {
        assert_eq!(merge_ranges(&ranges, max_gap), expected);
    }

    #[test]
    fn one_read_serves_strided_headers() {
        let reader = ReadRanges::with_max_gap(Bytes::from_static(HEADERS), 12);
        let ranges = vec![0..4, 8..12, 24..28];
        assert_eq!(merge_ranges(&ranges, 12), vec![0..28]);
        assert_eq!(
            reader.read_byte_ranges(&ranges).unwrap(),
            vec![
                Bytes::from_static(b"hdr0"),
                Bytes::from_static(b"hdr1"),
                Bytes::from_static(b"hdr3"),
            ]
        );
    }

    #[test]
    fn request_order_is_kept() {
        let reader = ReadRanges::with_max_gap(Bytes::from_static(HEADERS), 0);
        let ranges = vec![24..28, 0..4, 24..28, 16..20];
        assert_eq!(
            reader.read_byte_ranges(&ranges).unwrap(),
            vec![
                Bytes::from_static(b"hdr3"),
                Bytes::from_static(b"hdr0"),
                Bytes::from_static(b"hdr3"),
                Bytes::from_static(b"hdr2"),
            ]
        );
    }
}
