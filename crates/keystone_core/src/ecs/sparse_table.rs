//! # Sparse Table
//!
//! A sparse-to-dense map keyed by entity slot.
//!
//! ## Layout
//!
//! ```text
//! logical index:   0 ........ 47 | 48 ....... 95 | 96 ...
//! group:           [  group 0   ] [  group 1   ] (not allocated)
//! group 0 bitmap:  0b0010_0101...
//! group 0 dense:   [v0, v2, v5, ...]   <- only occupied slots
//! ```
//!
//! The dense offset of a bit is the number of set bits before it (popcount).
//! Memory is proportional to the occupied entries, not to the id space: a group
//! that was never touched is either absent (past the end of the group vector) or
//! a 32-byte bitmap with an unallocated `Vec`.
//!
//! The bitmap is sized for `MAX_GROUP_SIZE` whatever `GROUP_SIZE` is, because
//! an array sized by the const parameter would need `generic_const_exprs`.
//! Small groups pay for the unused words but never scan them.
//!
//! ## Performance
//!
//! - Lookup: O(1) group index + O(`GROUP_SIZE` / 64) word popcount
//! - Insert/erase: shifts at most `GROUP_SIZE` dense entries of one group

use std::mem;

/// Default number of logical indices per group.
pub const DEFAULT_GROUP_SIZE: usize = 48;

/// Largest supported group size.
pub const MAX_GROUP_SIZE: usize = 256;

const WORD_BITS: usize = u64::BITS as usize;

const BITMAP_WORDS: usize = MAX_GROUP_SIZE / WORD_BITS;

/// Number of occupied slots strictly before `pos` in `bitmap`.
///
/// Position 0 has nothing before it. Only the words covering `[0, pos)` are
/// read, so `pos` may be anywhere inside the group.
#[inline]
fn pos_to_offset(bitmap: &[u64], pos: usize) -> usize {
    let full_words = pos / WORD_BITS;
    let mut count: usize = bitmap[..full_words]
        .iter()
        .map(|word| word.count_ones() as usize)
        .sum();
    let rem = pos % WORD_BITS;
    if rem != 0 {
        let mask = (1u64 << rem) - 1;
        count += (bitmap[full_words] & mask).count_ones() as usize;
    }
    count
}

/// One fixed-size segment of the table.
#[derive(Clone, Debug)]
struct Group<T> {
    bitmap: [u64; BITMAP_WORDS],
    dense: Vec<T>,
}

impl<T> Group<T> {
    const fn new() -> Self {
        Self {
            bitmap: [0; BITMAP_WORDS],
            dense: Vec::new(),
        }
    }

    #[inline]
    fn test(&self, bit: usize) -> bool {
        (self.bitmap[bit / WORD_BITS] >> (bit % WORD_BITS)) & 1 == 1
    }

    #[inline]
    fn set(&mut self, bit: usize) {
        self.bitmap[bit / WORD_BITS] |= 1 << (bit % WORD_BITS);
    }

    #[inline]
    fn clear(&mut self, bit: usize) {
        self.bitmap[bit / WORD_BITS] &= !(1 << (bit % WORD_BITS));
    }

    #[inline]
    fn offset(&self, bit: usize) -> usize {
        pos_to_offset(&self.bitmap, bit)
    }
}

/// Sparse map from logical index to `T`, compressed in groups of `GROUP_SIZE`.
///
/// # Type Parameters
///
/// * `T` - The stored value
/// * `GROUP_SIZE` - Logical indices per group (1 to 256, default 48)
///
/// # Example
///
/// ```rust
/// use keystone_core::SparseTable;
///
/// let mut table: SparseTable<usize> = SparseTable::new();
/// *table.get_or_default(1_000) = 7;
/// assert!(table.contains(1_000));
/// assert_eq!(table.get(1_000), Some(&7));
/// assert_eq!(table.len(), 1);
/// ```
#[derive(Clone, Debug)]
pub struct SparseTable<T, const GROUP_SIZE: usize = DEFAULT_GROUP_SIZE> {
    groups: Vec<Group<T>>,
    len: usize,
}

impl<T, const GROUP_SIZE: usize> SparseTable<T, GROUP_SIZE> {
    const VALID_GROUP_SIZE: () = assert!(
        GROUP_SIZE > 0 && GROUP_SIZE <= MAX_GROUP_SIZE,
        "GROUP_SIZE must be between 1 and 256"
    );

    /// Creates an empty table. Allocates nothing.
    #[must_use]
    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::VALID_GROUP_SIZE;
        Self {
            groups: Vec::new(),
            len: 0,
        }
    }

    #[inline]
    const fn locate(index: usize) -> (usize, usize) {
        (index / GROUP_SIZE, index % GROUP_SIZE)
    }

    /// Returns the number of occupied entries.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Checks if no entry is occupied.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of groups currently materialized.
    #[inline]
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Checks if `index` holds a value.
    #[inline]
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        let (group, bit) = Self::locate(index);
        self.groups.get(group).is_some_and(|g| g.test(bit))
    }

    /// Returns the value at `index`, if any.
    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        let (group, bit) = Self::locate(index);
        let group = self.groups.get(group)?;
        if !group.test(bit) {
            return None;
        }
        group.dense.get(group.offset(bit))
    }

    /// Returns the value at `index` mutably, if any.
    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        let (group, bit) = Self::locate(index);
        let group = self.groups.get_mut(group)?;
        if !group.test(bit) {
            return None;
        }
        let offset = group.offset(bit);
        group.dense.get_mut(offset)
    }

    /// Returns the value at `index`, inserting `init()` first if the slot is empty.
    ///
    /// Materializes the owning group when the table is too short.
    pub fn get_or_insert_with<F>(&mut self, index: usize, init: F) -> &mut T
    where
        F: FnOnce() -> T,
    {
        let (group_index, bit) = Self::locate(index);
        if group_index >= self.groups.len() {
            self.groups.resize_with(group_index + 1, Group::new);
        }
        let group = &mut self.groups[group_index];
        let offset = group.offset(bit);
        if !group.test(bit) {
            group.dense.insert(offset, init());
            group.set(bit);
            self.len += 1;
        }
        &mut group.dense[offset]
    }

    /// Stores `value` at `index`, returning the value it replaced.
    pub fn insert(&mut self, index: usize, value: T) -> Option<T> {
        if let Some(slot) = self.get_mut(index) {
            return Some(mem::replace(slot, value));
        }
        self.get_or_insert_with(index, || value);
        None
    }

    /// Removes and returns the value at `index`. No-op if the slot is empty.
    pub fn erase(&mut self, index: usize) -> Option<T> {
        let (group, bit) = Self::locate(index);
        let group = self.groups.get_mut(group)?;
        if !group.test(bit) {
            return None;
        }
        let offset = group.offset(bit);
        group.clear(bit);
        self.len -= 1;
        Some(group.dense.remove(offset))
    }

    /// Removes every entry and releases all groups.
    pub fn clear(&mut self) {
        self.groups.clear();
        self.len = 0;
    }

    /// Iterates over `(logical_index, &value)` in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> + '_ {
        self.groups
            .iter()
            .enumerate()
            .flat_map(|(group_index, group)| {
                (0..GROUP_SIZE)
                    .filter(move |&bit| group.test(bit))
                    .zip(group.dense.iter())
                    .map(move |(bit, value)| (group_index * GROUP_SIZE + bit, value))
            })
    }
}

impl<T, const GROUP_SIZE: usize> SparseTable<T, GROUP_SIZE>
where
    T: Default,
{
    /// Insert-or-get with a default value.
    pub fn get_or_default(&mut self, index: usize) -> &mut T {
        self.get_or_insert_with(index, T::default)
    }
}

impl<T, const GROUP_SIZE: usize> Default for SparseTable<T, GROUP_SIZE> {
    fn default() -> Self {
        Self::new()
    }
}
