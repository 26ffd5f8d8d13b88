//! Name hashing and shard routing.
//!
//! The two are deliberately unrelated: the hash only has to spread keys
//! inside one shard's table, while the router decides which shard owns a
//! name at all.

// (2^64) / \phi
const MAGIC_CONST: u64 = 0x9E3779B97F4A7C15;

/// How many leading name bytes feed the router.
pub const ROUTING_PREFIX: usize = 8;

/// Seeded partition key hash over entity names.
///
/// Constructed once per run and handed to every parser, so all workers agree
/// on keys. Keys are not stable across seeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameHasher {
    seed: u64,
}

impl NameHasher {
    pub fn with_seed(seed: u64) -> Self {
        Self { seed }
    }

    pub fn random() -> Self {
        Self::with_seed(rand::random())
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    #[inline(always)]
    pub fn hash(&self, name: &[u8]) -> u64 {
        let mut hash = self.seed ^ (name.len() as u64).wrapping_mul(MAGIC_CONST);

        let mut words = name.chunks_exact(8);
        for word in &mut words {
            hash = Self::mix(hash, Self::prefix(word));
        }

        let tail = words.remainder();
        if !tail.is_empty() {
            hash = Self::mix(hash, Self::prefix(tail));
        }

        let hash = hash.wrapping_mul(MAGIC_CONST);
        hash ^ (hash >> 32)
    }

    #[inline(always)]
    fn mix(hash: u64, word: u64) -> u64 {
        (hash ^ word).wrapping_mul(MAGIC_CONST).rotate_left(29)
    }

    /// First eight bytes of `name` as a little-endian word, zero padded.
    #[inline(always)]
    pub fn prefix(name: &[u8]) -> u64 {
        let len = name.len().min(8);
        let mut bytes = [0u8; 8];
        bytes[..len].copy_from_slice(&name[..len]);
        u64::from_le_bytes(bytes)
    }
}

/// Maps a name to the shard that owns it: the sum of its first
/// [`ROUTING_PREFIX`] bytes modulo the shard count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardRouter {
    shards: usize,
}

impl ShardRouter {
    /// `shards` must be non-zero; `PipelineConfig::validate` enforces it.
    pub fn new(shards: usize) -> Self {
        debug_assert!(shards > 0);
        Self { shards }
    }

    pub fn shards(&self) -> usize {
        self.shards
    }

    #[inline(always)]
    pub fn route(&self, name: &[u8]) -> usize {
        let sum: usize = name
            .iter()
            .take(ROUTING_PREFIX)
            .map(|&b| b as usize)
            .sum();
        sum % self.shards
    }
}
