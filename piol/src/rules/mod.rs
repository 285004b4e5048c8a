//! Rule sets: which trace header fields to decode, where they live and how they are encoded.

mod key;

use std::fmt::{Display, Formatter};
use std::ops::Range;

pub use key::*;
use piol_error::{PiolResult, piol_bail};

use crate::segy::TRACE_HEADER_SIZE;

/// The on-disk encoding of a field, with its 1-based byte location where it has one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    /// 4-byte big-endian two's complement integer.
    LongInteger { location: u16 },
    /// 2-byte big-endian two's complement integer.
    ShortInteger { location: u16 },
    /// 4-byte integer mantissa scaled by the 2-byte scalar at `scalar_location`.
    Float { location: u16, scalar_location: u16 },
    /// The trace's position; nothing is stored in the header.
    Index,
    /// The complete header, carried verbatim.
    RawCopy,
}

/// The in-memory column a decoded value lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Float,
    Integer,
    Index,
    Raw,
}

impl Display for Family {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Family::Float => "float",
            Family::Integer => "integer",
            Family::Index => "index",
            Family::Raw => "raw",
        })
    }
}

/// Width in bytes of a field scalar.
pub const SCALAR_WIDTH: usize = 2;

impl RuleKind {
    pub fn family(&self) -> Family {
        match self {
            RuleKind::LongInteger { .. } | RuleKind::ShortInteger { .. } => Family::Integer,
            RuleKind::Float { .. } => Family::Float,
            RuleKind::Index => Family::Index,
            RuleKind::RawCopy => Family::Raw,
        }
    }

    /// Zero-based byte range of the value within the trace header, if it has one.
    pub fn value_range(&self) -> Option<Range<usize>> {
        match *self {
            RuleKind::LongInteger { location } | RuleKind::Float { location, .. } => {
                Some(byte_range(location, 4))
            }
            RuleKind::ShortInteger { location } => Some(byte_range(location, 2)),
            RuleKind::Index | RuleKind::RawCopy => None,
        }
    }

    /// Zero-based byte range of the scalar, for scaled fields.
    pub fn scalar_range(&self) -> Option<Range<usize>> {
        match *self {
            RuleKind::Float {
                scalar_location, ..
            } => Some(byte_range(scalar_location, SCALAR_WIDTH)),
            _ => None,
        }
    }

    fn validate(&self, key: Key) -> PiolResult<()> {
        let kind_is_index = matches!(self, RuleKind::Index);
        if key.is_index() != kind_is_index {
            piol_bail!(InvalidLayout: "key {key} cannot be stored as {self}");
        }
        let kind_is_copy = matches!(self, RuleKind::RawCopy);
        if key.is_copy() != kind_is_copy {
            piol_bail!(InvalidLayout: "key {key} cannot be stored as {self}");
        }

        let ranges = [self.value_range(), self.scalar_range()];
        for range in ranges.iter().flatten() {
            check_location(key, range)?;
        }
        if let [Some(value), Some(scalar)] = &ranges {
            if value.start < scalar.end && scalar.start < value.end {
                piol_bail!(InvalidLayout: "scalar of {key} overlaps its value at byte {}", value.start + 1);
            }
        }
        Ok(())
    }
}

impl RuleKind {
    /// Whether the two layouts claim common header bytes. Scaled fields may share a scalar.
    fn overlaps(&self, other: &RuleKind) -> bool {
        let intersect = |a: &Range<usize>, b: &Range<usize>| a.start < b.end && b.start < a.end;
        let own = [self.value_range(), self.scalar_range()];
        let theirs = [other.value_range(), other.scalar_range()];
        own.iter().enumerate().any(|(i, a)| {
            theirs.iter().enumerate().any(|(j, b)| match (a, b) {
                // two scalars at the same place are one shared scalar
                (Some(a), Some(b)) if i == 1 && j == 1 && a == b => false,
                (Some(a), Some(b)) => intersect(a, b),
                _ => false,
            })
        })
    }
}

impl Display for RuleKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleKind::LongInteger { location } => write!(f, "long integer at byte {location}"),
            RuleKind::ShortInteger { location } => write!(f, "short integer at byte {location}"),
            RuleKind::Float {
                location,
                scalar_location,
            } => write!(f, "scaled integer at byte {location} (scalar at {scalar_location})"),
            RuleKind::Index => f.write_str("trace index"),
            RuleKind::RawCopy => f.write_str("raw copy"),
        }
    }
}

fn byte_range(location: u16, width: usize) -> Range<usize> {
    let start = usize::from(location).wrapping_sub(1);
    start..start.wrapping_add(width)
}

fn check_location(key: Key, range: &Range<usize>) -> PiolResult<()> {
    // location 0 wraps to usize::MAX
    if range.start >= TRACE_HEADER_SIZE || range.end > TRACE_HEADER_SIZE {
        piol_bail!(
            InvalidLayout: "field of {key} at byte {} does not fit a {TRACE_HEADER_SIZE}-byte header",
            range.start.wrapping_add(1)
        );
    }
    Ok(())
}

/// One active field of a rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleEntry {
    key: Key,
    kind: RuleKind,
    column: usize,
}

impl RuleEntry {
    pub fn key(&self) -> Key {
        self.key
    }

    pub fn kind(&self) -> RuleKind {
        self.kind
    }

    /// Column of this entry among the entries of the same [`Family`].
    pub fn column(&self) -> usize {
        self.column
    }
}

/// Zero-based half-open byte span of the trace header a rule set touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extent {
    pub start: usize,
    pub end: usize,
}

impl Extent {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// The keys decoded by [`Rules::with_defaults`].
pub const DEFAULT_KEYS: [Key; 10] = [
    Key::SourceX,
    Key::SourceY,
    Key::ReceiverX,
    Key::ReceiverY,
    Key::CmpX,
    Key::CmpY,
    Key::Inline,
    Key::Crossline,
    Key::Offset,
    Key::GlobalTraceNumber,
];

/// An ordered set of field descriptors with at most one entry per [`Key`].
///
/// Insertion order numbers the columns of each [`Family`] in a
/// [`TraceMetadata`][crate::TraceMetadata] store built from the rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rules {
    entries: Vec<RuleEntry>,
}

impl Rules {
    pub fn new() -> Self {
        Self::default()
    }

    /// The default geometry fields at their standard locations.
    pub fn with_defaults() -> Self {
        let mut rules = Self::new();
        for key in DEFAULT_KEYS {
            rules.push(key, key.standard_kind());
        }
        rules
    }

    /// Rules for the given keys at their standard locations.
    pub fn with_keys(keys: impl IntoIterator<Item = Key>) -> PiolResult<Self> {
        let mut rules = Self::new();
        for key in keys {
            rules.add_key(key)?;
        }
        Ok(rules)
    }

    /// Add `key` at its standard location.
    pub fn add_key(&mut self, key: Key) -> PiolResult<()> {
        self.add(key, key.standard_kind())
    }

    /// Add `key` with an explicit layout. The rule set is unchanged on error.
    pub fn add(&mut self, key: Key, kind: RuleKind) -> PiolResult<()> {
        if self.contains(key) {
            piol_bail!(DuplicateKey: "key {key} is already in the rule set");
        }
        kind.validate(key)?;
        if let Some(other) = self.entries.iter().find(|e| e.kind.overlaps(&kind)) {
            piol_bail!(InvalidLayout: "{key} as {kind} overlaps {} as {}", other.key, other.kind);
        }
        self.push(key, kind);
        Ok(())
    }

    /// Add `key` unless already present, for callers that need a field regardless of who
    /// asked for it first.
    pub fn ensure_key(&mut self, key: Key) -> PiolResult<()> {
        if self.contains(key) {
            return Ok(());
        }
        self.add_key(key)
    }

    fn push(&mut self, key: Key, kind: RuleKind) {
        let column = self.family_len(kind.family());
        self.entries.push(RuleEntry { key, kind, column });
    }

    /// Remove `key`, renumbering the columns behind it. A no-op when absent.
    pub fn remove(&mut self, key: Key) {
        let Some(position) = self.entries.iter().position(|e| e.key == key) else {
            return;
        };
        let removed = self.entries.remove(position);
        let family = removed.kind.family();
        for entry in &mut self.entries[position..] {
            if entry.kind.family() == family {
                entry.column -= 1;
            }
        }
    }

    pub fn contains(&self, key: Key) -> bool {
        self.get(key).is_some()
    }

    pub fn get(&self, key: Key) -> Option<&RuleEntry> {
        self.entries.iter().find(|e| e.key == key)
    }

    pub fn entries(&self) -> &[RuleEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries decoding into `family`.
    pub fn family_len(&self, family: Family) -> usize {
        self.entries
            .iter()
            .filter(|e| e.kind.family() == family)
            .count()
    }

    pub fn has_raw_copy(&self) -> bool {
        self.family_len(Family::Raw) > 0
    }

    /// Distinct scalar locations used by scaled fields, in first-use order.
    pub fn scalar_locations(&self) -> Vec<u16> {
        let mut locations = Vec::new();
        for entry in &self.entries {
            if let RuleKind::Float {
                scalar_location, ..
            } = entry.kind
            {
                if !locations.contains(&scalar_location) {
                    locations.push(scalar_location);
                }
            }
        }
        locations
    }

    /// Standard scaled fields sharing the scalar at `scalar_location` that no rule covers, with
    /// their value locations.
    ///
    /// Re-scaling the shared scalar would change what these fields decode to.
    pub fn uncovered_siblings(&self, scalar_location: u16) -> Vec<(Key, u16)> {
        Key::ALL
            .into_iter()
            .filter_map(|key| match key.standard_kind() {
                RuleKind::Float {
                    location,
                    scalar_location: shared,
                } if shared == scalar_location => Some((key, location)),
                _ => None,
            })
            .filter(|&(_, location)| {
                !self.entries.iter().any(|e| {
                    e.kind
                        == RuleKind::Float {
                            location,
                            scalar_location,
                        }
                })
            })
            .collect()
    }

    /// The smallest byte span covering every active field and scalar.
    ///
    /// The whole header when a raw copy is active, empty when no entry touches header bytes.
    pub fn extent(&self) -> Extent {
        if self.has_raw_copy() {
            return Extent {
                start: 0,
                end: TRACE_HEADER_SIZE,
            };
        }
        self.field_ranges()
            .into_iter()
            .reduce(|a, b| a.start.min(b.start)..a.end.max(b.end))
            .map(|r| Extent {
                start: r.start,
                end: r.end,
            })
            .unwrap_or_default()
    }

    /// The disjoint byte ranges an encoder writes, sorted by position.
    pub fn write_ranges(&self) -> Vec<Range<usize>> {
        if self.has_raw_copy() {
            return vec![0..TRACE_HEADER_SIZE];
        }
        let mut ranges = self.field_ranges();
        ranges.sort_unstable_by_key(|r| r.start);
        let mut merged: Vec<Range<usize>> = Vec::with_capacity(ranges.len());
        for range in ranges {
            match merged.last_mut() {
                Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
                _ => merged.push(range),
            }
        }
        merged
    }

    fn field_ranges(&self) -> Vec<Range<usize>> {
        self.entries
            .iter()
            .flat_map(|e| [e.kind.value_range(), e.kind.scalar_range()])
            .flatten()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use piol_error::PiolError;
    use rstest::rstest;

    use super::*;

    #[test]
    fn defaults_cover_geometry() {
        let rules = Rules::with_defaults();
        assert_eq!(rules.len(), DEFAULT_KEYS.len());
        assert_eq!(rules.family_len(Family::Float), 6);
        assert_eq!(rules.family_len(Family::Integer), 3);
        assert_eq!(rules.family_len(Family::Index), 1);
        assert_eq!(rules.scalar_locations(), vec![COORDINATE_SCALAR]);
        // offset at 37 through crossline ending at 196
        assert_eq!(rules.extent(), Extent { start: 36, end: 196 });
    }

    #[test]
    fn extent_starts_at_scalar() {
        let rules = Rules::with_keys([Key::SourceX, Key::CmpY, Key::Crossline]).unwrap();
        assert_eq!(rules.extent(), Extent { start: 70, end: 196 });
    }

    #[rstest]
    #[case(Key::TraceId, RuleKind::LongInteger { location: 70 })]
    #[case(Key::TraceId, RuleKind::ShortInteger { location: 75 })]
    #[case(Key::Inline, RuleKind::LongInteger { location: 182 })]
    #[case(Key::ShotNumber, RuleKind::Float { location: 197, scalar_location: 72 })]
    #[case(Key::ShotNumber, RuleKind::Float { location: 197, scalar_location: 183 })]
    fn overlapping_fields_rejected(#[case] key: Key, #[case] kind: RuleKind) {
        let mut rules = Rules::with_keys([Key::SourceX, Key::CmpX]).unwrap();
        let before = rules.clone();
        let err = rules.add(key, kind).unwrap_err();
        assert!(matches!(err, PiolError::InvalidLayout(..)), "{err}");
        assert_eq!(rules, before);
    }

    #[test]
    fn scaled_fields_share_a_scalar() {
        let mut rules = Rules::with_keys([Key::SourceX]).unwrap();
        let shot = RuleKind::Float {
            location: 197,
            scalar_location: COORDINATE_SCALAR,
        };
        rules.add(Key::ShotNumber, shot).unwrap();
        assert_eq!(rules.scalar_locations(), vec![COORDINATE_SCALAR]);
    }

    #[test]
    fn uncovered_siblings_of_coordinates() {
        let rules = Rules::with_keys([Key::SourceX, Key::SourceY, Key::ReceiverX, Key::ReceiverY])
            .unwrap();
        assert_eq!(
            rules.uncovered_siblings(COORDINATE_SCALAR),
            vec![(Key::CmpX, 181), (Key::CmpY, 185)]
        );
        assert!(Rules::with_defaults().uncovered_siblings(COORDINATE_SCALAR).is_empty());
    }

    #[test]
    fn duplicate_key_rejected_without_mutation() {
        let mut rules = Rules::with_defaults();
        let before = rules.clone();
        let err = rules.add(Key::Inline, RuleKind::LongInteger { location: 9 }).unwrap_err();
        assert!(matches!(err, PiolError::DuplicateKey(..)));
        assert_eq!(rules, before);
    }

    #[rstest]
    #[case(Key::Inline, RuleKind::LongInteger { location: 0 })]
    #[case(Key::Inline, RuleKind::LongInteger { location: 238 })]
    #[case(Key::TraceId, RuleKind::ShortInteger { location: 240 })]
    #[case(Key::Inline, RuleKind::Index)]
    #[case(Key::GlobalTraceNumber, RuleKind::LongInteger { location: 1 })]
    #[case(Key::Copy, RuleKind::Index)]
    #[case(Key::Inline, RuleKind::RawCopy)]
    #[case(Key::SourceX, RuleKind::Float { location: 73, scalar_location: 0 })]
    #[case(Key::SourceX, RuleKind::Float { location: 73, scalar_location: 75 })]
    fn invalid_layouts(#[case] key: Key, #[case] kind: RuleKind) {
        let mut rules = Rules::new();
        let err = rules.add(key, kind).unwrap_err();
        assert!(matches!(err, PiolError::InvalidLayout(..)), "{err}");
        assert!(rules.is_empty());
    }

    #[test]
    fn last_valid_location() {
        let mut rules = Rules::new();
        rules
            .add(Key::Inline, RuleKind::LongInteger { location: 237 })
            .unwrap();
        assert_eq!(rules.extent(), Extent { start: 236, end: 240 });
    }

    #[test]
    fn remove_renumbers_columns() {
        let mut rules = Rules::with_keys([Key::SourceX, Key::Inline, Key::SourceY, Key::Crossline])
            .unwrap();
        assert_eq!(rules.get(Key::SourceY).unwrap().column(), 1);
        rules.remove(Key::SourceX);
        assert_eq!(rules.get(Key::SourceY).unwrap().column(), 0);
        assert_eq!(rules.get(Key::Crossline).unwrap().column(), 1);
        rules.remove(Key::SourceX);
        assert_eq!(rules.len(), 3);
    }

    #[test]
    fn clones_mutate_independently() {
        let rules = Rules::with_defaults();
        let mut copy = rules.clone();
        copy.remove(Key::Inline);
        copy.add_key(Key::ShotNumber).unwrap();
        assert!(rules.contains(Key::Inline));
        assert!(!rules.contains(Key::ShotNumber));
    }

    #[test]
    fn raw_copy_spans_full_header() {
        let mut rules = Rules::with_keys([Key::Inline]).unwrap();
        rules.add_key(Key::Copy).unwrap();
        assert_eq!(rules.extent().range(), 0..TRACE_HEADER_SIZE);
        assert_eq!(rules.write_ranges(), vec![0..TRACE_HEADER_SIZE]);
    }

    #[test]
    fn index_only_extent_is_empty() {
        let rules = Rules::with_keys([Key::GlobalTraceNumber, Key::LocalTraceNumber]).unwrap();
        assert!(rules.extent().is_empty());
        assert!(rules.write_ranges().is_empty());
    }

    #[test]
    fn write_ranges_skip_gaps() {
        let rules = Rules::with_keys([Key::SourceX, Key::SourceY, Key::Inline]).unwrap();
        assert_eq!(rules.write_ranges(), vec![70..80, 188..192]);
    }
}
