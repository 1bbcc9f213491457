// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Entity identifiers, membership masks, and the bit-packed entity table.

use std::sync::atomic::{AtomicU32, Ordering};

use smallvec::SmallVec;

/// Opaque entity identifier. Aliveness is the entity-buffer alive bit;
/// ids carry no generation counter.
pub type Eid = u32;

const WORD_BITS: usize = 32;

/// N-bit component membership mask over u32 words.
///
/// Queries compile their clauses into masks of the same geometry, so the
/// match test is a handful of word ops.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Mask {
    words: SmallVec<[u32; 4]>,
}

impl Mask {
    /// All-zero mask sized for `bits` component ids.
    pub fn with_bits(bits: usize) -> Self {
        Self {
            words: SmallVec::from_elem(0, bits.div_ceil(WORD_BITS).max(1)),
        }
    }

    pub fn set(&mut self, index: usize) {
        self.words[index / WORD_BITS] |= 1 << (index % WORD_BITS);
    }

    pub fn contains(&self, index: usize) -> bool {
        let word = index / WORD_BITS;
        word < self.words.len() && (self.words[word] & (1 << (index % WORD_BITS))) != 0
    }

    pub fn is_zero(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// `(self & other) == other`: every bit of `other` present in `self`.
    pub fn contains_all(&self, other: &Mask) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .all(|(a, b)| a & b == *b)
    }

    /// `(self & other) != 0`.
    pub fn intersects(&self, other: &Mask) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .any(|(a, b)| a & b != 0)
    }

    /// `self |= other`.
    pub fn or_assign(&mut self, other: &Mask) {
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            *a |= b;
        }
    }
}

/// Bit-packed per-entity table: one alive bit and one N-bit component
/// membership mask per entity id, stored in contiguous atomic words so the
/// whole structure is shareable with workers.
///
/// Invariants: a dead id keeps its membership bits until the id is reused
/// (the pool zeroes them before handing the id out again); membership bit i
/// is only ever set for a registered component id.
pub struct EntityBuffer {
    max_entities: u32,
    mask_words: usize,
    alive: Box<[AtomicU32]>,
    membership: Box<[AtomicU32]>,
}

impl EntityBuffer {
    pub fn new(max_entities: u32, component_count: usize) -> Self {
        let mask_words = component_count.div_ceil(WORD_BITS).max(1);
        let alive_words = (max_entities as usize).div_ceil(WORD_BITS).max(1);
        Self {
            max_entities,
            mask_words,
            alive: (0..alive_words).map(|_| AtomicU32::new(0)).collect(),
            membership: (0..max_entities as usize * mask_words)
                .map(|_| AtomicU32::new(0))
                .collect(),
        }
    }

    pub fn max_entities(&self) -> u32 {
        self.max_entities
    }

    pub fn alive(&self, eid: Eid) -> bool {
        let idx = eid as usize;
        let word = self.alive[idx / WORD_BITS].load(Ordering::Relaxed);
        word & (1 << (idx % WORD_BITS)) != 0
    }

    pub fn set_alive(&self, eid: Eid) {
        let idx = eid as usize;
        self.alive[idx / WORD_BITS].fetch_or(1 << (idx % WORD_BITS), Ordering::Relaxed);
    }

    pub fn clear_alive(&self, eid: Eid) {
        let idx = eid as usize;
        self.alive[idx / WORD_BITS].fetch_and(!(1 << (idx % WORD_BITS)), Ordering::Relaxed);
    }

    pub fn set_membership_bit(&self, eid: Eid, cid: u32) {
        let base = eid as usize * self.mask_words;
        self.membership[base + cid as usize / WORD_BITS]
            .fetch_or(1 << (cid as usize % WORD_BITS), Ordering::Relaxed);
    }

    pub fn clear_membership_bit(&self, eid: Eid, cid: u32) {
        let base = eid as usize * self.mask_words;
        self.membership[base + cid as usize / WORD_BITS]
            .fetch_and(!(1 << (cid as usize % WORD_BITS)), Ordering::Relaxed);
    }

    pub fn has_membership_bit(&self, eid: Eid, cid: u32) -> bool {
        let base = eid as usize * self.mask_words;
        let word = self.membership[base + cid as usize / WORD_BITS].load(Ordering::Relaxed);
        word & (1 << (cid as usize % WORD_BITS)) != 0
    }

    /// Zero the whole membership mask; the pool calls this before reusing
    /// a dead id.
    pub fn clear_membership(&self, eid: Eid) {
        let base = eid as usize * self.mask_words;
        for w in 0..self.mask_words {
            self.membership[base + w].store(0, Ordering::Relaxed);
        }
    }

    /// Copy of the entity's membership mask.
    pub fn membership(&self, eid: Eid) -> Mask {
        let base = eid as usize * self.mask_words;
        Mask {
            words: (0..self.mask_words)
                .map(|w| self.membership[base + w].load(Ordering::Relaxed))
                .collect(),
        }
    }

    /// Match test over the raw membership words without materializing a
    /// mask copy: alive && (mem ⊇ with) && (mem ∩ without = ∅)
    /// && (any = ∅ || mem ∩ any ≠ ∅).
    pub fn matches(&self, eid: Eid, with: &Mask, without: &Mask, any: &Mask) -> bool {
        if !self.alive(eid) {
            return false;
        }
        let base = eid as usize * self.mask_words;
        let mut any_hit = any.is_zero();
        for w in 0..self.mask_words {
            let mem = self.membership[base + w].load(Ordering::Relaxed);
            if mem & with.words()[w] != with.words()[w] {
                return false;
            }
            if mem & without.words()[w] != 0 {
                return false;
            }
            if !any_hit && mem & any.words()[w] != 0 {
                any_hit = true;
            }
        }
        any_hit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_ops() {
        let mut a = Mask::with_bits(40);
        let mut b = Mask::with_bits(40);
        a.set(0);
        a.set(35);
        b.set(35);

        assert!(a.contains(35));
        assert!(!a.contains(1));
        assert!(a.contains_all(&b));
        assert!(!b.contains_all(&a));
        assert!(a.intersects(&b));
        assert!(Mask::with_bits(40).is_zero());
    }

    #[test]
    fn test_alive_bits() {
        let buf = EntityBuffer::new(100, 4);
        assert!(!buf.alive(42));
        buf.set_alive(42);
        assert!(buf.alive(42));
        buf.clear_alive(42);
        assert!(!buf.alive(42));
    }

    #[test]
    fn test_membership_bits() {
        let buf = EntityBuffer::new(100, 40);
        buf.set_membership_bit(3, 0);
        buf.set_membership_bit(3, 35);
        assert!(buf.has_membership_bit(3, 0));
        assert!(buf.has_membership_bit(3, 35));
        assert!(!buf.has_membership_bit(3, 1));
        assert!(!buf.has_membership_bit(4, 0));

        buf.clear_membership_bit(3, 0);
        assert!(!buf.has_membership_bit(3, 0));
        assert!(buf.has_membership_bit(3, 35));

        buf.clear_membership(3);
        assert!(buf.membership(3).is_zero());
    }

    #[test]
    fn test_match_test() {
        let buf = EntityBuffer::new(16, 8);
        buf.set_alive(1);
        buf.set_membership_bit(1, 0);
        buf.set_membership_bit(1, 2);

        let mut with = Mask::with_bits(8);
        with.set(0);
        let without = Mask::with_bits(8);
        let any = Mask::with_bits(8);

        assert!(buf.matches(1, &with, &without, &any));
        // Dead entity never matches.
        assert!(!buf.matches(2, &with, &without, &any));

        let mut excl = Mask::with_bits(8);
        excl.set(2);
        assert!(!buf.matches(1, &with, &excl, &any));

        let mut some = Mask::with_bits(8);
        some.set(5);
        assert!(!buf.matches(1, &with, &without, &some));
        let mut some2 = Mask::with_bits(8);
        some2.set(2);
        assert!(buf.matches(1, &with, &without, &some2));
    }
}
