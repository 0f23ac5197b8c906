//! Hierarchical fullness index over a fixed range of slots.
//!
//! The index is a root-first tower of word arrays. At the leaf level, bit `j`
//! of word `i` is set when slot `i * B + j` is occupied. At every interior
//! level, bit `j` of word `i` is set when the `j`-th child word underneath it
//! is completely full. The root is a single word, so "is the whole range
//! full?" is one comparison and finding the leftmost free slot is one
//! `trailing_zeros` per level.
//!
//! # Geometry
//!
//! Starting from the slot count `N`, each level holds `max(1, width / B)`
//! words until a single word remains. Because `N` and `B` are both powers of
//! two, every division is exact except possibly the last one: when the
//! second-highest level has fewer than `B` words, the root covers fewer than
//! `B` children. Each level therefore carries the mask of its *valid* child
//! bits, and a word is full when it equals that mask. For every level where a
//! word has exactly `B` children the mask is `(1 << B) - 1`.
//!
//! # Invariants
//!
//! After every mutation:
//! - a leaf bit is set iff [`occupy`](BucketLevels::occupy) marked the slot
//!   and no later [`vacate`](BucketLevels::vacate) cleared it;
//! - an interior bit is set iff its child word equals the child level's full
//!   mask;
//! - the root level holds exactly one word.
//!
//! [`check_consistency`](BucketLevels::check_consistency) asserts the
//! interior half of this contract and is exercised by the fuzz harness.

/// The word type backing every level.
///
/// `u64` admits every legal bucket width and uses hardware bit instructions
/// (`trailing_zeros`, comparison against the full mask) on 64-bit platforms.
pub type Word = u64;

/// One tier of the index.
///
/// `words[i]` summarizes the `span` slots starting at `i * span`; each of its
/// valid bits covers `child_span` slots.
#[derive(Debug, Clone)]
struct Level {
    words: Vec<Word>,
    /// Slots covered by one word at this level.
    span: usize,
    /// Slots covered by one bit of a word at this level (1 at the leaf).
    child_span: usize,
    /// All valid child bits set; a word equal to this mask is full.
    mask_full: Word,
}

impl Level {
    /// Word and bit position addressing `slot` at this level.
    #[inline]
    fn position(&self, slot: usize) -> (usize, usize) {
        (slot / self.span, (slot % self.span) / self.child_span)
    }

    #[inline]
    fn is_full(&self, word: usize) -> bool {
        self.words[word] == self.mask_full
    }
}

/// Hierarchical occupancy index over `slot_count` slots, `bucket_size` bits
/// per word.
#[derive(Debug, Clone)]
pub struct BucketLevels {
    /// Root first; the last entry is the leaf level.
    levels: Vec<Level>,
    slot_count: usize,
    bucket_size: u8,
}

impl BucketLevels {
    /// Builds an all-free index.
    ///
    /// # Panics
    ///
    /// Panics unless `slot_count` is a power of two and `bucket_size` is a
    /// power of two in `2..=64`. The public constructor reports these as
    /// errors before reaching this point.
    pub fn new(slot_count: usize, bucket_size: u8) -> Self {
        assert!(slot_count.is_power_of_two());
        assert!(bucket_size.is_power_of_two());
        assert!(bucket_size >= 2);
        assert!(u32::from(bucket_size) <= Word::BITS);

        let bucket = bucket_size as usize;

        // Collect level widths leaf-first, then reverse so the root is the
        // first entry.
        let mut counts = Vec::new();
        let mut width = slot_count;
        loop {
            let count = (width / bucket).max(1);
            counts.push(count);
            if count == 1 {
                break;
            }
            width = count;
        }
        counts.reverse();

        let depth = counts.len();
        let mut levels = Vec::with_capacity(depth);
        for (index, &count) in counts.iter().enumerate() {
            let span = slot_count / count;
            let children = if index + 1 < depth {
                debug_assert!(counts[index + 1].is_multiple_of(count));
                counts[index + 1] / count
            } else {
                span
            };
            assert!(children >= 1);
            assert!(children <= Word::BITS as usize);

            levels.push(Level {
                words: vec![0; count],
                span,
                child_span: span / children,
                mask_full: full_mask(children),
            });
        }

        assert_eq!(levels[0].words.len(), 1);
        assert_eq!(levels[depth - 1].child_span, 1);

        Self {
            levels,
            slot_count,
            bucket_size,
        }
    }

    /// Number of levels in the tower.
    #[inline]
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Number of slots the index covers.
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Bits per index word.
    #[inline]
    pub fn bucket_size(&self) -> u8 {
        self.bucket_size
    }

    /// Word count of the level `index` levels below the root.
    #[inline]
    pub fn word_count(&self, index: usize) -> usize {
        self.levels[index].words.len()
    }

    /// Whether `slot` is marked occupied at the leaf level.
    #[inline]
    pub fn is_occupied(&self, slot: usize) -> bool {
        assert!(slot < self.slot_count);

        let leaf = &self.levels[self.levels.len() - 1];
        let (word, bit) = leaf.position(slot);
        (leaf.words[word] & (1 << bit)) != 0
    }

    /// Marks `slot` occupied and propagates fullness upward.
    ///
    /// Returns `false` without touching anything when the slot was already
    /// marked, so callers can keep an availability counter in lockstep.
    pub fn occupy(&mut self, slot: usize) -> bool {
        assert!(slot < self.slot_count);

        let leaf = self.levels.len() - 1;
        {
            let level = &self.levels[leaf];
            let (word, bit) = level.position(slot);
            if (level.words[word] & (1 << bit)) != 0 {
                return false;
            }
        }

        // Set the leaf bit; while the updated word saturates its mask, mark
        // the parent bit and continue toward the root.
        let mut index = leaf;
        loop {
            let level = &mut self.levels[index];
            let (word, bit) = level.position(slot);
            level.words[word] |= 1 << bit;

            if !level.is_full(word) || index == 0 {
                break;
            }
            log::trace!("level {index}: word {word} full, propagating");
            index -= 1;
        }

        true
    }

    /// Clears `slot` and propagates lost fullness upward.
    ///
    /// Returns `false` without touching anything when the slot was already
    /// free. A parent bit is cleared only when the word below it was full
    /// before this clear; the first non-full ancestor ends the walk.
    pub fn vacate(&mut self, slot: usize) -> bool {
        assert!(slot < self.slot_count);

        let leaf = self.levels.len() - 1;
        {
            let level = &self.levels[leaf];
            let (word, bit) = level.position(slot);
            if (level.words[word] & (1 << bit)) == 0 {
                return false;
            }
        }

        let mut index = leaf;
        loop {
            let level = &mut self.levels[index];
            let (word, bit) = level.position(slot);
            let was_full = level.is_full(word);
            level.words[word] &= !(1 << bit);

            if !was_full || index == 0 {
                break;
            }
            index -= 1;
        }

        true
    }

    /// Index of the leftmost free slot, or `None` when the range is full.
    ///
    /// Top-down descent: the lowest zero bit of each word selects the child
    /// word to visit, so the walk reads one word per level.
    pub fn first_free(&self) -> Option<usize> {
        let depth = self.levels.len();
        let mut word = 0;

        for (index, level) in self.levels.iter().enumerate() {
            let open = !level.words[word] & level.mask_full;
            if open == 0 {
                // A zero parent bit guarantees a zero bit in the child word,
                // so only the root can be saturated here.
                debug_assert_eq!(index, 0);
                return None;
            }

            let bit = open.trailing_zeros() as usize;
            if index == depth - 1 {
                return Some(word * level.span + bit);
            }
            word = word * (level.span / level.child_span) + bit;
        }

        unreachable!("descent always terminates at the leaf level");
    }

    /// Asserts that every interior bit matches its child word's fullness.
    ///
    /// # Panics
    ///
    /// Panics on any mismatch. Test and fuzz harnesses call this after
    /// mutations; production paths rely on the incremental updates.
    pub fn check_consistency(&self) {
        for index in 0..self.levels.len() - 1 {
            let level = &self.levels[index];
            let child = &self.levels[index + 1];
            let children = level.span / level.child_span;

            for word in 0..level.words.len() {
                for bit in 0..children {
                    let child_word = word * children + bit;
                    let expected = child.is_full(child_word);
                    let actual = (level.words[word] & (1 << bit)) != 0;
                    assert_eq!(
                        expected, actual,
                        "level {index}, word {word}, bit {bit} disagrees with child word {child_word}"
                    );
                }
            }
        }
    }
}

#[inline]
const fn full_mask(children: usize) -> Word {
    if children == Word::BITS as usize {
        Word::MAX
    } else {
        (1u64 << children) - 1
    }
}


#[cfg(test)]
mod proptests {
    use super::BucketLevels;
    use proptest::prelude::*;

    /// Reference occupancy: a plain bool per slot with linear scans.
    struct Model {
        occupied: Vec<bool>,
    }

    impl Model {
        fn new(slot_count: usize) -> Self {
            Self {
                occupied: vec![false; slot_count],
            }
        }

        fn occupy(&mut self, slot: usize) -> bool {
            !std::mem::replace(&mut self.occupied[slot], true)
        }

        fn vacate(&mut self, slot: usize) -> bool {
            std::mem::replace(&mut self.occupied[slot], false)
        }

        fn first_free(&self) -> Option<usize> {
            self.occupied.iter().position(|&occupied| !occupied)
        }
    }

    fn geometry_strategy() -> impl Strategy<Value = (usize, u8)> {
        (
            prop::sample::select(vec![4usize, 8, 64, 128, 256, 512, 1024]),
            prop::sample::select(vec![2u8, 4, 8, 16, 32, 64]),
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: crate::test_utils::proptest_cases(64),
            ..ProptestConfig::default()
        })]

        /// Random occupy/vacate sequences agree with the linear-scan model
        /// and keep the interior levels coherent.
        #[test]
        fn prop_matches_linear_scan_model(
            (slot_count, bucket_size) in geometry_strategy(),
            operations in prop::collection::vec((any::<bool>(), any::<u32>()), 1..200),
        ) {
            let mut levels = BucketLevels::new(slot_count, bucket_size);
            let mut model = Model::new(slot_count);

            for (occupy, raw_slot) in operations {
                let slot = raw_slot as usize % slot_count;
                if occupy {
                    prop_assert_eq!(levels.occupy(slot), model.occupy(slot));
                } else {
                    prop_assert_eq!(levels.vacate(slot), model.vacate(slot));
                }
                prop_assert_eq!(levels.first_free(), model.first_free());
            }

            levels.check_consistency();
            for slot in 0..slot_count {
                prop_assert_eq!(levels.is_occupied(slot), model.occupied[slot]);
            }
        }
    }
}
