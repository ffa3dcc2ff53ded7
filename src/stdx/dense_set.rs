//! Array-backed set of small integer ids with O(1) insert, targeted removal and
//! uniform random draw.
//!
//! Members live densely in `items[..len]`; `positions[id]` records where `id`
//! sits in `items`, or `None` when absent. Removal swaps the victim with the
//! last occupied slot and patches the moved id's position, so every operation
//! is constant time regardless of capacity.

use rand::Rng;

use super::{try_filled_vec, AllocError};

#[derive(Clone, Debug)]
pub struct DenseIndexSet {
    items: Vec<u32>,
    positions: Vec<Option<u32>>,
}

impl DenseIndexSet {
    /// Creates an empty set accepting ids in `0..capacity`.
    pub fn with_capacity(capacity: u32) -> Result<Self, AllocError> {
        let mut items = Vec::new();
        items
            .try_reserve_exact(capacity as usize)
            .map_err(|_| AllocError {
                what: "dense set items",
                capacity: capacity as usize,
            })?;
        let positions = try_filled_vec("dense set positions", capacity as usize, None)?;
        Ok(Self { items, positions })
    }

    /// Creates a set holding every id in `0..capacity`.
    pub fn with_all(capacity: u32) -> Result<Self, AllocError> {
        let mut set = Self::with_capacity(capacity)?;
        set.items.extend(0..capacity);
        for (slot, pos) in set.positions.iter_mut().enumerate() {
            *pos = Some(slot as u32);
        }
        Ok(set)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Largest id plus one that the set can hold.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.positions.len() as u32
    }

    #[inline]
    pub fn contains(&self, id: u32) -> bool {
        matches!(self.positions.get(id as usize), Some(Some(_)))
    }

    /// Inserts `id`. Returns `false` (and changes nothing) if it is already present.
    ///
    /// # Panics
    ///
    /// Panics if `id >= capacity`.
    pub fn insert(&mut self, id: u32) -> bool {
        let slot = &mut self.positions[id as usize];
        if slot.is_some() {
            return false;
        }
        *slot = Some(self.items.len() as u32);
        self.items.push(id);
        true
    }

    /// Removes `id` if present.
    pub fn remove(&mut self, id: u32) -> bool {
        match self.positions.get(id as usize).copied().flatten() {
            Some(pos) => {
                let removed = self.remove_at(pos as usize);
                debug_assert_eq!(removed, id, "dense set position table diverged");
                true
            }
            None => false,
        }
    }

    /// Removes and returns a uniformly random member, or `None` if empty.
    pub fn remove_random(&mut self) -> Option<u32> {
        self.remove_random_with(&mut rand::rng())
    }

    /// Same as [`remove_random`](Self::remove_random) but draws from `rng`.
    pub fn remove_random_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<u32> {
        if self.items.is_empty() {
            return None;
        }
        let pos = rng.random_range(0..self.items.len());
        Some(self.remove_at(pos))
    }

    /// Iterates members in storage order (not insertion order).
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.items.iter().copied()
    }

    fn remove_at(&mut self, pos: usize) -> u32 {
        let id = self.items.swap_remove(pos);
        if let Some(&moved) = self.items.get(pos) {
            self.positions[moved as usize] = Some(pos as u32);
        }
        self.positions[id as usize] = None;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;
    use std::collections::HashSet;

    #[test]
    fn remove_middle_leaves_the_rest() {
        let mut set = DenseIndexSet::with_capacity(8).unwrap();
        assert!(set.insert(1));
        assert!(set.insert(4));
        assert!(set.insert(6));

        assert!(set.remove(4));
        assert_eq!(set.len(), 2);
        assert!(set.contains(1));
        assert!(!set.contains(4));
        assert!(set.contains(6));

        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let mut drawn = HashSet::new();
        while let Some(id) = set.remove_random_with(&mut rng) {
            assert!(id == 1 || id == 6, "drew removed id {id}");
            drawn.insert(id);
        }
        assert_eq!(drawn, HashSet::from([1, 6]));
        assert!(set.is_empty());
        assert_eq!(set.remove_random(), None);
    }

    #[test]
    fn duplicate_insert_is_noop() {
        let mut set = DenseIndexSet::with_capacity(4).unwrap();
        assert!(set.insert(2));
        assert!(!set.insert(2));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn remove_absent_returns_false() {
        let mut set = DenseIndexSet::with_capacity(4).unwrap();
        assert!(!set.remove(3));
        set.insert(3);
        assert!(set.remove(3));
        assert!(!set.remove(3));
        // Out-of-range ids are simply absent.
        assert!(!set.remove(100));
        assert!(!set.contains(100));
    }

    #[test]
    fn with_all_then_drain() {
        let mut set = DenseIndexSet::with_all(100).unwrap();
        assert_eq!(set.len(), 100);
        assert!((0..100).all(|id| set.contains(id)));

        // Targeted removal of the last slot and of the first slot.
        assert!(set.remove(99));
        assert!(set.remove(0));

        let mut seen = HashSet::new();
        while let Some(id) = set.remove_random() {
            assert!(seen.insert(id), "id {id} drawn twice");
        }
        assert_eq!(seen.len(), 98);
        assert!(!seen.contains(&0) && !seen.contains(&99));
    }

    #[test]
    fn reinsert_after_removal() {
        let mut set = DenseIndexSet::with_capacity(3).unwrap();
        set.insert(0);
        set.insert(1);
        set.insert(2);
        set.remove(0);
        assert!(set.insert(0));
        let mut members: Vec<_> = set.iter().collect();
        members.sort_unstable();
        assert_eq!(members, vec![0, 1, 2]);
    }
}
