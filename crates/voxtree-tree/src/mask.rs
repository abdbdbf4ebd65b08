//! Fixed-size bit masks for node slot and voxel activity.

/// A fixed-length bit vector.
///
/// Leaves use one bit per voxel, internal nodes one bit per slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitMask {
    words: Box<[u64]>,
    size: usize,
}

impl BitMask {
    /// Create a mask of `size` bits, all off.
    pub fn new(size: usize) -> Self {
        Self::filled(size, false)
    }

    /// Create a mask of `size` bits, all set to `on`.
    pub fn filled(size: usize, on: bool) -> Self {
        let mut mask = Self {
            words: vec![0; size.div_ceil(64)].into_boxed_slice(),
            size,
        };
        if on {
            mask.fill(true);
        }
        mask
    }

    /// Number of bits in the mask.
    #[inline]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Check if bit `i` is set.
    #[inline]
    pub fn is_on(&self, i: usize) -> bool {
        debug_assert!(i < self.size);
        (self.words[i >> 6] >> (i & 63)) & 1 == 1
    }

    /// Check if bit `i` is clear.
    #[inline]
    pub fn is_off(&self, i: usize) -> bool {
        !self.is_on(i)
    }

    /// Set bit `i`.
    #[inline]
    pub fn set_on(&mut self, i: usize) {
        debug_assert!(i < self.size);
        self.words[i >> 6] |= 1 << (i & 63);
    }

    /// Clear bit `i`.
    #[inline]
    pub fn set_off(&mut self, i: usize) {
        debug_assert!(i < self.size);
        self.words[i >> 6] &= !(1 << (i & 63));
    }

    /// Set or clear bit `i`.
    #[inline]
    pub fn set(&mut self, i: usize, on: bool) {
        if on {
            self.set_on(i);
        } else {
            self.set_off(i);
        }
    }

    /// Set or clear every bit.
    pub fn fill(&mut self, on: bool) {
        let word = if on { u64::MAX } else { 0 };
        self.words.fill(word);
        if on {
            let tail = self.size & 63;
            if tail != 0 {
                if let Some(last) = self.words.last_mut() {
                    *last = (1 << tail) - 1;
                }
            }
        }
    }

    /// Number of set bits.
    pub fn count_on(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Check if any bit is set.
    pub fn any(&self) -> bool {
        self.words.iter().any(|&w| w != 0)
    }

    /// Check if every bit is set.
    pub fn all(&self) -> bool {
        self.count_on() == self.size
    }

    /// Iterate the indices of the set bits in ascending order.
    pub fn iter_on(&self) -> OnBits<'_> {
        OnBits {
            words: &self.words,
            index: 0,
            current: self.words.first().copied().unwrap_or(0),
        }
    }

    /// Heap bytes used by the mask.
    pub fn memory_usage(&self) -> usize {
        std::mem::size_of::<Self>() + self.words.len() * std::mem::size_of::<u64>()
    }
}

/// Iterator over the set bits of a [`BitMask`].
#[derive(Clone, Debug)]
pub struct OnBits<'a> {
    words: &'a [u64],
    index: usize,
    current: u64,
}

impl Iterator for OnBits<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        loop {
            if self.current != 0 {
                let bit = self.current.trailing_zeros() as usize;
                self.current &= self.current - 1;
                return Some((self.index << 6) + bit);
            }
            self.index += 1;
            self.current = *self.words.get(self.index)?;
        }
    }
}
