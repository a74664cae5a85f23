use std::sync::atomic::{AtomicU64, Ordering};

/// One bit per index: set means "White wins with perfect play". Words are
/// atomic so generator workers can publish results without locking; the
/// search only ever reads.
pub struct Bitbase {
    words: Vec<AtomicU64>,
    size_in_bits: u64,
}

impl Bitbase {
    pub fn new(size_in_bits: u64) -> Self {
        let words = (size_in_bits as usize).div_ceil(64);
        let mut vec = Vec::with_capacity(words);
        vec.resize_with(words, || AtomicU64::new(0));
        Self { words: vec, size_in_bits }
    }

    /// Rebuilds from the little-endian byte serialization
    pub fn from_bytes(bytes: &[u8], size_in_bits: u64) -> Self {
        let bitbase = Self::new(size_in_bits);
        for (i, chunk) in bytes.chunks(8).enumerate() {
            if i >= bitbase.words.len() {
                break;
            }
            let mut word = [0u8; 8];
            word[..chunk.len()].copy_from_slice(chunk);
            bitbase.words[i].store(u64::from_le_bytes(word), Ordering::Relaxed);
        }
        bitbase
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity((self.size_in_bits as usize).div_ceil(8));
        for word in &self.words {
            bytes.extend_from_slice(&word.load(Ordering::Relaxed).to_le_bytes());
        }
        bytes.truncate((self.size_in_bits as usize).div_ceil(8));
        bytes
    }

    pub const fn size_in_bits(&self) -> u64 {
        self.size_in_bits
    }

    #[inline(always)]
    pub fn get(&self, index: u64) -> bool {
        debug_assert!(index < self.size_in_bits);
        self.words[(index / 64) as usize].load(Ordering::Relaxed) & (1 << (index % 64)) != 0
    }

    #[inline(always)]
    pub fn set(&self, index: u64) {
        debug_assert!(index < self.size_in_bits);
        self.words[(index / 64) as usize].fetch_or(1 << (index % 64), Ordering::Relaxed);
    }

    pub fn clear_bit(&self, index: u64) {
        self.words[(index / 64) as usize].fetch_and(!(1 << (index % 64)), Ordering::Relaxed);
    }

    pub fn clear(&self) {
        for word in &self.words {
            word.store(0, Ordering::Relaxed);
        }
    }

    pub fn count_set(&self) -> u64 {
        self.words.iter().map(|w| u64::from(w.load(Ordering::Relaxed).count_ones())).sum()
    }
}

#[cfg(test)]
mod bitbase_tests {
    use super::*;

    #[test]
    fn set_get_clear() {
        let bb = Bitbase::new(200);
        assert!(!bb.get(63));
        bb.set(63);
        bb.set(64);
        bb.set(199);
        assert!(bb.get(63));
        assert!(bb.get(64));
        assert!(bb.get(199));
        assert_eq!(bb.count_set(), 3);
        bb.clear_bit(64);
        assert!(!bb.get(64));
        assert_eq!(bb.count_set(), 2);
    }

    #[test]
    fn byte_round_trip() {
        let bb = Bitbase::new(130);
        bb.set(0);
        bb.set(7);
        bb.set(64);
        bb.set(129);
        let bytes = bb.to_bytes();
        assert_eq!(bytes.len(), 17);
        let back = Bitbase::from_bytes(&bytes, 130);
        for i in 0..130 {
            assert_eq!(bb.get(i), back.get(i), "bit {i} differs");
        }
    }
}
