use std::fmt::{Debug, Formatter};

const WORD_BITS: usize = 64;

/// A fixed-width set of bits.
///
/// The width is the number of enabled tags; bit `i` refers to the tag with
/// ordinal `i`. Bits beyond the width are always zero.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "BitfieldData")
)]
pub struct Bitfield {
    len: usize,
    words: Vec<u64>,
}

/// The serialized fields of a [`Bitfield`], checked before use.
#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
struct BitfieldData {
    len: usize,
    words: Vec<u64>,
}

#[cfg(feature = "serde")]
impl TryFrom<BitfieldData> for Bitfield {
    type Error = String;

    fn try_from(data: BitfieldData) -> Result<Self, String> {
        let expected = data.len.div_ceil(WORD_BITS);
        if data.words.len() != expected {
            return Err(format!(
                "a bitfield of {} bits needs {} words, got {}",
                data.len,
                expected,
                data.words.len()
            ));
        }
        let mut bitfield = Bitfield {
            len: data.len,
            words: data.words,
        };
        bitfield.clear_padding();
        Ok(bitfield)
    }
}

impl Bitfield {
    /// A bitfield of `len` bits, all cleared.
    pub fn new(len: usize) -> Self {
        Bitfield {
            len,
            words: vec![0; len.div_ceil(WORD_BITS)],
        }
    }

    /// A bitfield of `len` bits, all set.
    pub fn filled(len: usize) -> Self {
        let mut bitfield = Bitfield {
            len,
            words: vec![u64::MAX; len.div_ceil(WORD_BITS)],
        };
        bitfield.clear_padding();
        bitfield
    }

    /// Number of bits.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get bit `index`. Out of range bits read as cleared.
    pub fn get(&self, index: usize) -> bool {
        if index >= self.len {
            return false;
        }
        self.words[index / WORD_BITS] & (1 << (index % WORD_BITS)) != 0
    }

    /// Set or clear bit `index`.
    ///
    /// Panics if `index` is out of range.
    pub fn set(&mut self, index: usize, value: bool) {
        assert!(index < self.len, "bit {index} out of range {}", self.len);
        let mask = 1 << (index % WORD_BITS);
        if value {
            self.words[index / WORD_BITS] |= mask;
        } else {
            self.words[index / WORD_BITS] &= !mask;
        }
    }

    /// Intersect in place with another bitfield of the same width.
    pub fn intersect_with(&mut self, other: &Bitfield) {
        debug_assert_eq!(self.len, other.len);
        for (word, other) in self.words.iter_mut().zip(&other.words) {
            *word &= other;
        }
    }

    /// Whether every bit set here is also set in `other`.
    pub fn is_subset_of(&self, other: &Bitfield) -> bool {
        self.len == other.len
            && self
                .words
                .iter()
                .zip(&other.words)
                .all(|(word, other)| word & other == *word)
    }

    /// Iterate over the indexes of set bits, in increasing order.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(move |index| self.get(*index))
    }

    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|word| word.count_ones() as usize).sum()
    }

    /// Pack into bytes: bit `i` is bit `i % 8` of byte `i / 8`.
    ///
    /// The last byte is zero-padded. This is the encoding of the rule table
    /// handed to the parser.
    pub fn to_bytes(&self) -> Vec<u8> {
        (0..self.len.div_ceil(8))
            .map(|byte| {
                let word = self.words[byte * 8 / WORD_BITS];
                (word >> ((byte * 8) % WORD_BITS)) as u8
            })
            .collect()
    }

    /// Unpack a bitfield of `len` bits from its byte encoding.
    ///
    /// Missing bytes read as zero; bits beyond `len` are ignored.
    pub fn from_bytes(len: usize, bytes: &[u8]) -> Self {
        let mut bitfield = Bitfield::new(len);
        for (byte_index, byte) in bytes.iter().enumerate().take(len.div_ceil(8)) {
            bitfield.words[byte_index * 8 / WORD_BITS] |=
                (*byte as u64) << ((byte_index * 8) % WORD_BITS);
        }
        bitfield.clear_padding();
        bitfield
    }

    fn clear_padding(&mut self) {
        let rest = self.len % WORD_BITS;
        if rest != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1 << rest) - 1;
            }
        }
    }
}

impl Debug for Bitfield {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let bits: String = (0..self.len)
            .map(|index| if self.get(index) { '1' } else { '0' })
            .collect();
        write!(f, "Bitfield({bits})")
    }
}
