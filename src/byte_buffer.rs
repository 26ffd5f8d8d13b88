const MSB_MASK: u64 = 0x8080_8080_8080_8080;
const LSB_MASK: u64 = 0x0101_0101_0101_0101;

/// Word-at-a-time byte search over raw record bytes.
pub trait ByteBuffer {
    /// Index of the first `needle`.
    fn byte_position(&self, needle: u8) -> Option<usize>;

    /// Index of the last `needle`.
    fn last_byte_position(&self, needle: u8) -> Option<usize>;
}

#[inline(always)]
fn load_word(bytes: &[u8]) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(bytes);
    u64::from_le_bytes(word)
}

/// Sets the high bit of every byte in `word` that equals the broadcast needle.
/// Exact about whether a match exists; only the lowest flagged byte is
/// guaranteed to be a real match.
#[inline(always)]
fn matching_bytes(word: u64, repeat: u64) -> u64 {
    let xored = word ^ repeat;
    xored.wrapping_sub(LSB_MASK) & !xored & MSB_MASK
}

impl ByteBuffer for [u8] {
    #[inline(always)]
    fn byte_position(&self, needle: u8) -> Option<usize> {
        let repeat = LSB_MASK * needle as u64;
        let words = self.chunks_exact(8);
        let tail = words.remainder();

        for (w, word) in words.enumerate() {
            let matches = matching_bytes(load_word(word), repeat);
            if matches != 0 {
                return Some(w * 8 + (matches.trailing_zeros() / 8) as usize);
            }
        }

        let scanned = self.len() - tail.len();
        tail.iter().position(|&b| b == needle).map(|j| scanned + j)
    }

    #[inline(always)]
    fn last_byte_position(&self, needle: u8) -> Option<usize> {
        let repeat = LSB_MASK * needle as u64;
        let words = self.rchunks_exact(8);
        let head = words.remainder();

        for (w, word) in words.enumerate() {
            // Borrows can flag bytes above a real match, so confirm bytewise.
            if matching_bytes(load_word(word), repeat) != 0 {
                if let Some(j) = word.iter().rposition(|&b| b == needle) {
                    return Some(self.len() - (w + 1) * 8 + j);
                }
            }
        }

        head.iter().rposition(|&b| b == needle)
    }
}
