//! # Entity Handles
//!
//! Entities are lightweight identifiers consisting of:
//! - A slot index into the registry's entity table
//! - A generation counter for safe reuse of that slot
//!
//! The two fields stay separate in memory. Packing into a single integer only
//! happens at logging or serialization boundaries through [`Entity::to_bits`]
//! and [`Entity::from_bits`].

use std::fmt;

/// Mask selecting the index bits of a packed entity.
pub const ENTITY_MASK: u64 = 0xFFFF_FFFF;

/// Shift of the version bits inside a packed entity.
pub const ENTITY_SHIFT: u32 = 32;

/// Mask selecting the version bits after shifting.
pub const VERSION_MASK: u64 = 0xFFFF_FFFF;

/// Unique identifier for an entity.
///
/// Packed layout:
/// - Lower 32 bits: slot index
/// - Upper 32 bits: generation counter for detecting stale references
///
/// Two handles are equal only if both the index and the generation match, so a
/// handle kept across a destroy/create cycle of the same slot compares unequal
/// to the new occupant.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity {
    index: u32,
    generation: u32,
}

impl Entity {
    /// "No entity". All index bits are set; also terminates the free list.
    pub const NULL: Self = Self {
        index: u32::MAX,
        generation: 0,
    };

    /// Marker for a logically deleted slot in a packed entity list.
    ///
    /// Distinct from [`Entity::NULL`] and never valid.
    pub const TOMBSTONE: Self = Self {
        index: u32::MAX,
        generation: u32::MAX,
    };

    /// Creates a handle from a slot index and a generation.
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Returns the slot index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Returns the generation.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Returns the slot index widened for indexing.
    #[inline]
    #[must_use]
    pub const fn slot(self) -> usize {
        self.index as usize
    }

    /// Returns this handle with the generation bumped by one (wrapping).
    #[inline]
    #[must_use]
    pub const fn next_generation(self) -> Self {
        Self {
            index: self.index,
            generation: self.generation.wrapping_add(1),
        }
    }

    /// Packs the handle into its integer representation.
    #[inline]
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        ((self.generation as u64) << ENTITY_SHIFT) | (self.index as u64)
    }

    /// Unpacks a handle from its integer representation.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_bits(bits: u64) -> Self {
        Self {
            index: (bits & ENTITY_MASK) as u32,
            generation: ((bits >> ENTITY_SHIFT) & VERSION_MASK) as u32,
        }
    }

    /// Checks if this is the null entity.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.index == u32::MAX && self.generation == 0
    }

    /// Checks if this is the tombstone marker.
    #[inline]
    #[must_use]
    pub const fn is_tombstone(self) -> bool {
        self.index == u32::MAX && self.generation == u32::MAX
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            f.write_str("Entity(null)")
        } else if self.is_tombstone() {
            f.write_str("Entity(tombstone)")
        } else {
            write!(f, "Entity({}v{})", self.index, self.generation)
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_bits_roundtrip() {
        let entity = Entity::new(12345, 67890);
        let bits = entity.to_bits();
        assert_eq!(bits & ENTITY_MASK, 12345);
        assert_eq!((bits >> ENTITY_SHIFT) & VERSION_MASK, 67890);
        assert_eq!(Entity::from_bits(bits), entity);
    }

    #[test]
    fn test_null_layout() {
        assert_eq!(Entity::NULL.to_bits(), ENTITY_MASK);
        assert!(Entity::NULL.is_null());
        assert!(!Entity::NULL.is_tombstone());
        assert!(Entity::TOMBSTONE.is_tombstone());
        assert_ne!(Entity::NULL, Entity::TOMBSTONE);
        assert_eq!(Entity::default(), Entity::NULL);
    }

    #[test]
    fn test_generation_distinguishes_handles() {
        let old = Entity::new(4, 1);
        let new = old.next_generation();
        assert_eq!(old.index(), new.index());
        assert_ne!(old, new);
        assert_eq!(new.generation(), 2);
    }

    #[test]
    fn test_generation_wraps() {
        let entity = Entity::new(0, u32::MAX).next_generation();
        assert_eq!(entity.generation(), 0);
    }
}
