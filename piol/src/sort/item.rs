use std::cmp::Ordering;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use piol_error::{PiolResult, piol_bail};

/// Number of comparison keys carried by a [`SortItem`].
pub const SORT_KEYS: usize = 4;

const ITEM_SIZE: usize = SORT_KEYS * size_of::<f64>() + size_of::<u64>();

/// One trace as seen by the distributed sort: its comparison keys and its original global
/// trace index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SortItem {
    pub keys: [f64; SORT_KEYS],
    pub index: u64,
}

impl SortItem {
    pub fn new(keys: [f64; SORT_KEYS], index: u64) -> Self {
        Self { keys, index }
    }

    /// Keys in order under IEEE total ordering, then the original index.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        self.keys
            .iter()
            .zip(&other.keys)
            .map(|(a, b)| a.total_cmp(b))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
            .then(self.index.cmp(&other.index))
    }
}

pub(crate) fn encode_items(items: &[SortItem]) -> Bytes {
    let mut buf = BytesMut::with_capacity(items.len() * ITEM_SIZE);
    for item in items {
        for key in item.keys {
            buf.put_f64_le(key);
        }
        buf.put_u64_le(item.index);
    }
    buf.freeze()
}

pub(crate) fn decode_items(mut bytes: Bytes) -> PiolResult<Vec<SortItem>> {
    if bytes.len() % ITEM_SIZE != 0 {
        piol_bail!(CommError: "sort message of {} bytes is not a whole number of items", bytes.len());
    }
    let mut items = Vec::with_capacity(bytes.len() / ITEM_SIZE);
    while bytes.has_remaining() {
        let mut keys = [0.0; SORT_KEYS];
        for key in &mut keys {
            *key = bytes.get_f64_le();
        }
        items.push(SortItem::new(keys, bytes.get_u64_le()));
    }
    Ok(items)
}
