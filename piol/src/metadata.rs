use piol_error::{PiolResult, piol_bail, piol_err};

use crate::rules::{Family, Key, RuleKind, Rules};
use crate::segy::TRACE_HEADER_SIZE;

/// Decoded trace header values for a batch of traces.
///
/// Values are held in one column per active rule, grouped by [`Family`]: `f64` for scaled
/// fields, `i64` for integer fields and `u64` for trace indices. With a raw copy rule the
/// complete header of every row is kept as well. The scalar each scaled field was decoded
/// with is remembered per row so an unchanged value is written back with the same scalar.
#[derive(Debug, Clone)]
pub struct TraceMetadata {
    rules: Rules,
    num_traces: usize,
    floats: Vec<f64>,
    integers: Vec<i64>,
    indices: Vec<u64>,
    raw: Vec<u8>,
    scalar_locations: Vec<u16>,
    scalars: Vec<Option<i16>>,
}

impl TraceMetadata {
    pub fn new(rules: Rules, num_traces: usize) -> Self {
        let scalar_locations = rules.scalar_locations();
        let mut store = Self {
            rules,
            num_traces: 0,
            floats: Vec::new(),
            integers: Vec::new(),
            indices: Vec::new(),
            raw: Vec::new(),
            scalar_locations,
            scalars: Vec::new(),
        };
        store.resize(num_traces);
        store
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    pub fn num_traces(&self) -> usize {
        self.num_traces
    }

    pub fn is_empty(&self) -> bool {
        self.num_traces == 0
    }

    /// Grow or shrink to `num_traces` rows. New rows are zeroed with no known scalars.
    pub fn resize(&mut self, num_traces: usize) {
        self.floats
            .resize(num_traces * self.rules.family_len(Family::Float), 0.0);
        self.integers
            .resize(num_traces * self.rules.family_len(Family::Integer), 0);
        self.indices
            .resize(num_traces * self.rules.family_len(Family::Index), 0);
        if self.rules.has_raw_copy() {
            self.raw.resize(num_traces * TRACE_HEADER_SIZE, 0);
        }
        self.scalars
            .resize(num_traces * self.scalar_locations.len(), None);
        self.num_traces = num_traces;
    }

    fn slot(&self, row: usize, key: Key, family: Family) -> PiolResult<usize> {
        if row >= self.num_traces {
            piol_bail!(OutOfBounds: row, 0, self.num_traces);
        }
        let entry = self
            .rules
            .get(key)
            .ok_or_else(|| piol_err!(InvalidArgument: "key {key} is not in the rule set"))?;
        let actual = entry.kind().family();
        if actual != family {
            piol_bail!(InvalidArgument: "key {key} holds {actual} values, not {family}");
        }
        Ok(row * self.rules.family_len(family) + entry.column())
    }

    pub fn get_float(&self, row: usize, key: Key) -> PiolResult<f64> {
        Ok(self.floats[self.slot(row, key, Family::Float)?])
    }

    pub fn set_float(&mut self, row: usize, key: Key, value: f64) -> PiolResult<()> {
        let slot = self.slot(row, key, Family::Float)?;
        self.floats[slot] = value;
        Ok(())
    }

    pub fn get_integer(&self, row: usize, key: Key) -> PiolResult<i64> {
        Ok(self.integers[self.slot(row, key, Family::Integer)?])
    }

    pub fn set_integer(&mut self, row: usize, key: Key, value: i64) -> PiolResult<()> {
        let slot = self.slot(row, key, Family::Integer)?;
        self.integers[slot] = value;
        Ok(())
    }

    pub fn get_index(&self, row: usize, key: Key) -> PiolResult<u64> {
        Ok(self.indices[self.slot(row, key, Family::Index)?])
    }

    pub fn set_index(&mut self, row: usize, key: Key, value: u64) -> PiolResult<()> {
        let slot = self.slot(row, key, Family::Index)?;
        self.indices[slot] = value;
        Ok(())
    }

    /// Any numeric value of `key` as `f64`, whatever its family.
    #[allow(clippy::cast_precision_loss)]
    pub fn get_numeric(&self, row: usize, key: Key) -> PiolResult<f64> {
        let family = self
            .rules
            .get(key)
            .map(|e| e.kind().family())
            .ok_or_else(|| piol_err!(InvalidArgument: "key {key} is not in the rule set"))?;
        match family {
            Family::Float => self.get_float(row, key),
            Family::Integer => self.get_integer(row, key).map(|v| v as f64),
            Family::Index => self.get_index(row, key).map(|v| v as f64),
            Family::Raw => piol_bail!(InvalidArgument: "key {key} has no numeric value"),
        }
    }

    fn raw_range(&self, row: usize) -> PiolResult<std::ops::Range<usize>> {
        if !self.rules.has_raw_copy() {
            piol_bail!(InvalidArgument: "rule set carries no raw headers");
        }
        if row >= self.num_traces {
            piol_bail!(OutOfBounds: row, 0, self.num_traces);
        }
        Ok(row * TRACE_HEADER_SIZE..(row + 1) * TRACE_HEADER_SIZE)
    }

    /// The verbatim header of `row`, when the rules carry a raw copy.
    pub fn raw_header(&self, row: usize) -> PiolResult<&[u8]> {
        let range = self.raw_range(row)?;
        Ok(&self.raw[range])
    }

    pub fn raw_header_mut(&mut self, row: usize) -> PiolResult<&mut [u8]> {
        let range = self.raw_range(row)?;
        Ok(&mut self.raw[range])
    }

    fn scalar_slot(&self, row: usize, location: u16) -> PiolResult<usize> {
        if row >= self.num_traces {
            piol_bail!(OutOfBounds: row, 0, self.num_traces);
        }
        let column = self
            .scalar_locations
            .iter()
            .position(|&l| l == location)
            .ok_or_else(|| {
                piol_err!(InvalidArgument: "no scaled field uses the scalar at byte {location}")
            })?;
        Ok(row * self.scalar_locations.len() + column)
    }

    /// The scalar last decoded or set for `row` at the 1-based scalar `location`.
    pub fn scalar(&self, row: usize, location: u16) -> PiolResult<Option<i16>> {
        Ok(self.scalars[self.scalar_slot(row, location)?])
    }

    /// Set the scalar `row` is encoded with, or clear it with `None` to let the encoder pick
    /// one from the values.
    ///
    /// Binding when the rules leave a field sharing this scalar uncovered. When they cover
    /// every such field it is only preferred, and is replaced if a value is not exact under it.
    pub fn set_scalar(
        &mut self,
        row: usize,
        location: u16,
        scalar: Option<i16>,
    ) -> PiolResult<()> {
        let slot = self.scalar_slot(row, location)?;
        self.scalars[slot] = scalar;
        Ok(())
    }

    /// The scaled keys sharing the scalar at `location`.
    pub(crate) fn scaled_keys(&self, location: u16) -> impl Iterator<Item = Key> + '_ {
        self.rules.entries().iter().filter_map(move |e| match e.kind() {
            RuleKind::Float {
                scalar_location, ..
            } if scalar_location == location => Some(e.key()),
            _ => None,
        })
    }

    pub(crate) fn scalar_locations(&self) -> &[u16] {
        &self.scalar_locations
    }

    /// Copy every value of `src_row` in `src` into `dst_row`. Both stores must share rules.
    pub fn copy_row(
        &mut self,
        dst_row: usize,
        src: &TraceMetadata,
        src_row: usize,
    ) -> PiolResult<()> {
        if self.rules != src.rules {
            piol_bail!(InvalidArgument: "cannot copy rows between stores with different rules");
        }
        if dst_row >= self.num_traces {
            piol_bail!(OutOfBounds: dst_row, 0, self.num_traces);
        }
        if src_row >= src.num_traces {
            piol_bail!(OutOfBounds: src_row, 0, src.num_traces);
        }

        let rows = (dst_row, src_row);
        let floats = self.rules.family_len(Family::Float);
        let integers = self.rules.family_len(Family::Integer);
        let indices = self.rules.family_len(Family::Index);
        copy_columns(&mut self.floats, &src.floats, floats, rows);
        copy_columns(&mut self.integers, &src.integers, integers, rows);
        copy_columns(&mut self.indices, &src.indices, indices, rows);
        let scalars = self.scalar_locations.len();
        copy_columns(&mut self.scalars, &src.scalars, scalars, rows);
        if self.rules.has_raw_copy() {
            copy_columns(&mut self.raw, &src.raw, TRACE_HEADER_SIZE, rows);
        }
        Ok(())
    }
}

fn copy_columns<T: Copy>(dst: &mut [T], src: &[T], width: usize, (dst_row, src_row): (usize, usize)) {
    dst[dst_row * width..(dst_row + 1) * width]
        .copy_from_slice(&src[src_row * width..(src_row + 1) * width]);
}
