//! Succinct bit vectors with rank/select support.
//!
//! Two halves, split around the frozen image:
//! - [`BitBuilder`]: append-only bit pushing during construction, frozen into
//!   the flat image with [`BitBuilder::write_into`]
//! - [`BitSection`] + [`Bits`]: a located section of a serialized image and a
//!   borrowed reader over it, answering `rank`/`select` without unpacking
//!
//! The serialized form is `num_bits: u64, num_ones: u64`, the 64-bit words
//! (little-endian), then a rank directory with one `u32` per word holding the
//! number of set bits in all preceding words. Rank is O(1); select binary
//! searches the directory and scans one word.

use crate::image::{self, Reader};
use crate::{Error, Result};

/// Append-only bit vector used while a level is being constructed.
#[derive(Debug, Default)]
pub struct BitBuilder {
    words: Vec<u64>,
    num_bits: usize,
    num_ones: usize,
}

impl BitBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one bit.
    pub fn push(&mut self, bit: bool) {
        if self.num_bits % 64 == 0 {
            self.words.push(0);
        }
        if bit {
            *self.words.last_mut().unwrap() |= 1u64 << (self.num_bits % 64);
            self.num_ones += 1;
        }
        self.num_bits += 1;
    }

    /// Number of bits pushed so far.
    pub fn len(&self) -> usize {
        self.num_bits
    }

    /// True if no bits have been pushed.
    pub fn is_empty(&self) -> bool {
        self.num_bits == 0
    }

    /// Number of set bits pushed so far.
    pub fn num_ones(&self) -> usize {
        self.num_ones
    }

    /// Serialize the bits plus their rank directory into `out`.
    pub fn write_into(&self, out: &mut Vec<u8>) {
        image::put_u64(out, self.num_bits as u64);
        image::put_u64(out, self.num_ones as u64);
        for &word in &self.words {
            image::put_u64(out, word);
        }
        let mut ones_before = 0u32;
        for &word in &self.words {
            image::put_u32(out, ones_before);
            ones_before += word.count_ones();
        }
    }
}

/// Location of a serialized bit vector inside an image.
#[derive(Debug, Clone, Copy, Default)]
pub struct BitSection {
    num_bits: usize,
    num_ones: usize,
    words_off: usize,
    ranks_off: usize,
    num_words: usize,
}

impl BitSection {
    /// Parse a bit vector section at the reader's position, validating its
    /// declared sizes against the remaining image bytes.
    pub fn read(r: &mut Reader<'_>) -> Result<Self> {
        let num_bits = r.get_u64()? as usize;
        let num_ones = r.get_u64()? as usize;
        let num_words = num_bits.div_ceil(64);
        if num_ones > num_bits {
            return Err(Error::Format("bit vector ones exceed length"));
        }
        let words_off = r.pos();
        r.skip(num_words * 8)?;
        let ranks_off = r.pos();
        r.skip(num_words * 4)?;
        Ok(Self {
            num_bits,
            num_ones,
            words_off,
            ranks_off,
            num_words,
        })
    }

    /// Borrow the section from the image it was parsed out of.
    pub fn slice<'a>(&self, data: &'a [u8]) -> Bits<'a> {
        Bits { data, sec: *self }
    }

    /// Number of bits.
    pub fn len(&self) -> usize {
        self.num_bits
    }

    /// True if the vector holds no bits.
    pub fn is_empty(&self) -> bool {
        self.num_bits == 0
    }

    /// Number of set bits.
    pub fn num_ones(&self) -> usize {
        self.num_ones
    }
}

/// Borrowed rank/select reader over a serialized bit vector.
#[derive(Clone, Copy)]
pub struct Bits<'a> {
    data: &'a [u8],
    sec: BitSection,
}

impl<'a> Bits<'a> {
    #[inline]
    fn word(&self, w: usize) -> u64 {
        image::get_u64(self.data, self.sec.words_off + w * 8)
    }

    #[inline]
    fn ones_before_word(&self, w: usize) -> usize {
        image::get_u32(self.data, self.sec.ranks_off + w * 4) as usize
    }

    /// Number of bits.
    #[inline]
    pub fn len(&self) -> usize {
        self.sec.num_bits
    }

    /// True if the vector holds no bits.
    pub fn is_empty(&self) -> bool {
        self.sec.num_bits == 0
    }

    /// Number of set bits.
    #[inline]
    pub fn num_ones(&self) -> usize {
        self.sec.num_ones
    }

    /// Bit at position `pos`. Out-of-range positions read as zero.
    #[inline]
    pub fn get(&self, pos: usize) -> bool {
        if pos >= self.sec.num_bits {
            return false;
        }
        self.word(pos / 64) >> (pos % 64) & 1 == 1
    }

    /// Number of set bits in `[0, pos)`.
    #[inline]
    pub fn rank1(&self, pos: usize) -> usize {
        if pos >= self.sec.num_bits {
            return self.sec.num_ones;
        }
        let w = pos / 64;
        let mask = (1u64 << (pos % 64)) - 1;
        self.ones_before_word(w) + (self.word(w) & mask).count_ones() as usize
    }

    /// Number of clear bits in `[0, pos)`.
    #[inline]
    pub fn rank0(&self, pos: usize) -> usize {
        pos.min(self.sec.num_bits) - self.rank1(pos)
    }

    /// Position of the `(i + 1)`-th set bit, or `None` past the end.
    pub fn select1(&self, i: usize) -> Option<usize> {
        if i >= self.sec.num_ones {
            return None;
        }
        // Last word whose preceding-ones count is <= i.
        let mut lo = 0;
        let mut hi = self.sec.num_words;
        while hi - lo > 1 {
            let mid = (lo + hi) / 2;
            if self.ones_before_word(mid) <= i {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        let within = i - self.ones_before_word(lo);
        Some(lo * 64 + nth_set_bit(self.word(lo), within))
    }

    /// Position of the `(i + 1)`-th clear bit, or `None` past the end.
    pub fn select0(&self, i: usize) -> Option<usize> {
        if i >= self.sec.num_bits - self.sec.num_ones {
            return None;
        }
        let mut lo = 0;
        let mut hi = self.sec.num_words;
        while hi - lo > 1 {
            let mid = (lo + hi) / 2;
            if mid * 64 - self.ones_before_word(mid) <= i {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        let within = i - (lo * 64 - self.ones_before_word(lo));
        Some(lo * 64 + nth_set_bit(!self.word(lo), within))
    }
}

/// Index of the `(n + 1)`-th set bit of `word`. Caller guarantees it exists.
#[inline]
fn nth_set_bit(mut word: u64, n: usize) -> usize {
    for _ in 0..n {
        word &= word - 1;
    }
    word.trailing_zeros() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    fn freeze(builder: &BitBuilder) -> Vec<u8> {
        let mut out = Vec::new();
        builder.write_into(&mut out);
        out
    }

    fn open(image: &[u8]) -> BitSection {
        let mut r = Reader::new(image);
        let sec = BitSection::read(&mut r).unwrap();
        assert_eq!(r.pos(), image.len());
        sec
    }

    #[test]
    fn test_empty() {
        let image = freeze(&BitBuilder::new());
        let sec = open(&image);
        let bits = sec.slice(&image);
        assert_eq!(bits.len(), 0);
        assert_eq!(bits.rank1(0), 0);
        assert_eq!(bits.select1(0), None);
        assert_eq!(bits.select0(0), None);
        assert!(!bits.get(0));
    }

    #[test]
    fn test_small_pattern() {
        // 10110 -> ones at 0, 2, 3
        let mut b = BitBuilder::new();
        for bit in [true, false, true, true, false] {
            b.push(bit);
        }
        let image = freeze(&b);
        let sec = open(&image);
        let bits = sec.slice(&image);

        assert_eq!(bits.len(), 5);
        assert_eq!(bits.num_ones(), 3);
        assert_eq!(bits.rank1(0), 0);
        assert_eq!(bits.rank1(3), 2);
        assert_eq!(bits.rank1(5), 3);
        assert_eq!(bits.rank0(5), 2);
        assert_eq!(bits.select1(0), Some(0));
        assert_eq!(bits.select1(1), Some(2));
        assert_eq!(bits.select1(2), Some(3));
        assert_eq!(bits.select1(3), None);
        assert_eq!(bits.select0(0), Some(1));
        assert_eq!(bits.select0(1), Some(4));
        assert_eq!(bits.select0(2), None);
    }

    #[test]
    fn test_word_boundaries() {
        // All ones across several words; select and rank must agree at every
        // multiple of 64.
        let mut b = BitBuilder::new();
        for _ in 0..200 {
            b.push(true);
        }
        let image = freeze(&b);
        let sec = open(&image);
        let bits = sec.slice(&image);

        for i in 0..200 {
            assert_eq!(bits.select1(i), Some(i));
            assert_eq!(bits.rank1(i), i);
        }
        assert_eq!(bits.select0(0), None);
    }

    #[test]
    fn test_random_against_naive() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x5717);
        let raw: Vec<bool> = (0..1000).map(|_| rng.gen_bool(0.3)).collect();

        let mut b = BitBuilder::new();
        for &bit in &raw {
            b.push(bit);
        }
        let image = freeze(&b);
        let sec = open(&image);
        let bits = sec.slice(&image);

        let mut ones = 0;
        let mut zeros = 0;
        for (i, &bit) in raw.iter().enumerate() {
            assert_eq!(bits.get(i), bit);
            assert_eq!(bits.rank1(i), ones);
            assert_eq!(bits.rank0(i), zeros);
            if bit {
                assert_eq!(bits.select1(ones), Some(i));
                ones += 1;
            } else {
                assert_eq!(bits.select0(zeros), Some(i));
                zeros += 1;
            }
        }
        assert_eq!(bits.select1(ones), None);
        assert_eq!(bits.select0(zeros), None);
    }

    #[test]
    fn test_truncated_section_rejected() {
        let mut b = BitBuilder::new();
        for _ in 0..100 {
            b.push(true);
        }
        let image = freeze(&b);
        let mut r = Reader::new(&image[..image.len() - 1]);
        assert!(matches!(BitSection::read(&mut r), Err(Error::Format(_))));
    }
}
