//! Heap-allocated bitset sized at runtime.
//!
//! Bits are stored in `u64` words. Padding bits (indices at or beyond
//! `bit_length`) always remain zero so `count` never sees phantom bits.

use super::{try_filled_vec, AllocError};

/// Computes the number of `u64` words needed to store `n` bits.
pub const fn words_for_bits(n: usize) -> usize {
    n.div_ceil(64)
}

/// Fixed-capacity set of small integer ids with O(1) `set`/`test`/`clear`.
///
/// All indexing operations panic when `idx >= bit_length`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DynamicBitSet {
    words: Vec<u64>,
    bit_length: usize,
}

impl DynamicBitSet {
    /// Creates an empty bitset with room for `bit_length` bits.
    pub fn try_new(bit_length: usize) -> Result<Self, AllocError> {
        let words = try_filled_vec("bitset words", words_for_bits(bit_length), 0u64)?;
        Ok(Self { words, bit_length })
    }

    /// Returns the number of addressable bits.
    #[inline]
    pub fn bit_length(&self) -> usize {
        self.bit_length
    }

    #[inline]
    fn locate(&self, idx: usize) -> (usize, u64) {
        assert!(
            idx < self.bit_length,
            "bit index {idx} out of range (len {})",
            self.bit_length
        );
        (idx / 64, 1u64 << (idx % 64))
    }

    /// Sets bit `idx`. Returns `true` if it was previously clear.
    #[inline]
    pub fn set(&mut self, idx: usize) -> bool {
        let (word, mask) = self.locate(idx);
        let was_clear = self.words[word] & mask == 0;
        self.words[word] |= mask;
        was_clear
    }

    /// Clears bit `idx`. Returns `true` if it was previously set.
    #[inline]
    pub fn clear(&mut self, idx: usize) -> bool {
        let (word, mask) = self.locate(idx);
        let was_set = self.words[word] & mask != 0;
        self.words[word] &= !mask;
        was_set
    }

    #[inline]
    pub fn test(&self, idx: usize) -> bool {
        let (word, mask) = self.locate(idx);
        self.words[word] & mask != 0
    }

    /// Counts set bits; never exceeds `bit_length`.
    pub fn count(&self) -> usize {
        let total = self
            .words
            .iter()
            .map(|w| w.count_ones() as usize)
            .sum::<usize>();
        debug_assert!(total <= self.bit_length);
        total
    }

    /// Returns `true` when no bits are set.
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_test_clear() {
        let mut bits = DynamicBitSet::try_new(130).unwrap();
        assert!(bits.is_empty());

        assert!(bits.set(0));
        assert!(bits.set(64));
        assert!(bits.set(129));
        assert!(!bits.set(64), "second set reports already-set");

        assert!(bits.test(0));
        assert!(bits.test(129));
        assert!(!bits.test(1));
        assert_eq!(bits.count(), 3);

        assert!(bits.clear(64));
        assert!(!bits.clear(64));
        assert!(!bits.test(64));
        assert_eq!(bits.count(), 2);
    }

    #[test]
    fn zero_length_is_allowed() {
        let bits = DynamicBitSet::try_new(0).unwrap();
        assert_eq!(bits.bit_length(), 0);
        assert_eq!(bits.count(), 0);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn out_of_range_panics() {
        let bits = DynamicBitSet::try_new(10).unwrap();
        bits.test(10);
    }

    #[test]
    fn words_for_bits_rounds_up() {
        assert_eq!(words_for_bits(0), 0);
        assert_eq!(words_for_bits(1), 1);
        assert_eq!(words_for_bits(64), 1);
        assert_eq!(words_for_bits(65), 2);
    }
}
