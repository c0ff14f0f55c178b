//! Byte coverage tracking for block discovery.
//!
//! [`CoverageMap`] records which bytes of the function buffer already belong to a decoded
//! instruction and where those instructions start. The block builder uses it to tell a
//! jump into the middle of an existing block (split) from a jump into the middle of an
//! instruction (misaligned target), and to stop a linear decode that runs into code that
//! was already claimed by another block.

const WORD_BITS: usize = usize::BITS as usize;

/// A fixed-size bitfield over buffer offsets.
#[derive(Debug, Clone)]
struct BitField {
    words: Vec<usize>,
    elements: usize,
}

impl BitField {
    fn new(elements: usize) -> Self {
        BitField {
            words: vec![0_usize; elements.div_ceil(WORD_BITS)],
            elements,
        }
    }

    fn get(&self, element: usize) -> bool {
        if element >= self.elements {
            return false;
        }

        self.words
            .get(element / WORD_BITS)
            .is_some_and(|word| word & (1_usize << (element % WORD_BITS)) != 0)
    }

    fn set_range(&mut self, element: usize, len: usize) {
        let end = element.saturating_add(len).min(self.elements);
        for index in element..end {
            if let Some(word) = self.words.get_mut(index / WORD_BITS) {
                *word |= 1_usize << (index % WORD_BITS);
            }
        }
    }

    /// Number of clear elements starting at `element`, stopping at the first set one.
    fn clear_run(&self, element: usize) -> usize {
        let mut counter = 0;

        while element + counter < self.elements {
            let index = element + counter;
            let word = self.words.get(index / WORD_BITS).copied().unwrap_or(usize::MAX);

            if word == 0 && index % WORD_BITS == 0 {
                counter += WORD_BITS;
            } else if word & (1_usize << (index % WORD_BITS)) == 0 {
                counter += 1;
            } else {
                break;
            }
        }

        counter.min(self.elements.saturating_sub(element))
    }

    fn count(&self) -> usize {
        self.words
            .iter()
            .map(|word| word.count_ones() as usize)
            .sum()
    }
}

/// Tracks decoded bytes and instruction boundaries of one buffer.
#[derive(Debug, Clone)]
pub struct CoverageMap {
    covered: BitField,
    starts: BitField,
}

impl CoverageMap {
    /// Creates a map for a buffer of `len` bytes with nothing covered.
    #[must_use]
    pub fn new(len: usize) -> Self {
        CoverageMap {
            covered: BitField::new(len),
            starts: BitField::new(len),
        }
    }

    /// Number of bytes tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.covered.elements
    }

    /// Returns true if the map tracks no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.covered.elements == 0
    }

    /// Records an instruction occupying `size` bytes at `offset`.
    pub fn mark_instruction(&mut self, offset: usize, size: usize) {
        self.starts.set_range(offset, 1);
        self.covered.set_range(offset, size);
    }

    /// Returns true if the byte at `offset` belongs to a decoded instruction.
    #[must_use]
    pub fn is_covered(&self, offset: usize) -> bool {
        self.covered.get(offset)
    }

    /// Returns true if a decoded instruction starts at `offset`.
    #[must_use]
    pub fn is_instruction_start(&self, offset: usize) -> bool {
        self.starts.get(offset)
    }

    /// Returns true if none of the `size` bytes starting at `offset` are covered.
    #[must_use]
    pub fn is_free(&self, offset: usize, size: usize) -> bool {
        self.covered.clear_run(offset) >= size
    }

    /// Total number of covered bytes.
    #[must_use]
    pub fn covered_bytes(&self) -> usize {
        self.covered.count()
    }
}
