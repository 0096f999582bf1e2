//! Addressing of a single bit inside a sequence of 32-bit words.
//!
//! Words are numbered from 0. Inside a word, bit 31 is the most significant bit
//! and bit 0 the least significant one, matching the VITA-49.2 drawings. The
//! absolute offset counts bits MSB-first from the start of the structure:
//! `offset = word * 32 + (31 - bit)`.

use std::fmt;
use std::ops::{Add, AddAssign, Sub};

/// Number of bits in a VRT word.
pub const WORD_BITS: usize = 32;

/// Location of a bit in a multi-word structure. Ordered by absolute offset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BitPosition {
    offset: usize,
}

impl BitPosition {
    /// MSB of the first word.
    pub const START: BitPosition = BitPosition { offset: 0 };

    /// Position of `bit` (31 = MSB) within word `word`. Bit numbers above 31 wrap.
    pub const fn new(word: usize, bit: u32) -> Self {
        let bit = (bit as usize) % WORD_BITS;
        BitPosition {
            offset: word * WORD_BITS + (WORD_BITS - 1 - bit),
        }
    }

    pub const fn from_offset(offset: usize) -> Self {
        BitPosition { offset }
    }

    /// Absolute bit offset from the MSB of word 0.
    pub const fn offset(&self) -> usize {
        self.offset
    }

    pub const fn word(&self) -> usize {
        self.offset / WORD_BITS
    }

    /// Bit number within the word, 31 (MSB) down to 0 (LSB).
    pub const fn bit(&self) -> u32 {
        (WORD_BITS - 1 - self.offset % WORD_BITS) as u32
    }

    /// True when the position is at the MSB of a word.
    pub const fn is_word_aligned(&self) -> bool {
        self.offset % WORD_BITS == 0
    }

    /// True when the offset is a multiple of `bits` (an alignment of 0 or 1 always holds).
    pub const fn is_aligned_to(&self, bits: usize) -> bool {
        bits <= 1 || self.offset % bits == 0
    }
}

impl Add<usize> for BitPosition {
    type Output = BitPosition;

    fn add(self, bits: usize) -> BitPosition {
        BitPosition::from_offset(self.offset + bits)
    }
}

impl AddAssign<usize> for BitPosition {
    fn add_assign(&mut self, bits: usize) {
        self.offset += bits;
    }
}

impl Sub<usize> for BitPosition {
    type Output = BitPosition;

    /// Saturates at the start of the structure.
    fn sub(self, bits: usize) -> BitPosition {
        BitPosition::from_offset(self.offset.saturating_sub(bits))
    }
}

impl Sub<BitPosition> for BitPosition {
    type Output = usize;

    /// Distance in bits between two positions (zero if `rhs` is after `self`).
    fn sub(self, rhs: BitPosition) -> usize {
        self.offset.saturating_sub(rhs.offset)
    }
}

impl fmt::Display for BitPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "word {}, bit {}", self.word(), self.bit())
    }
}
