use crate::error::{Error, Result};

pub const DEFAULT_CHUNK_SIZE: usize = 4_000_000;
pub const DEFAULT_PARSERS: usize = 3;
pub const DEFAULT_SHARDS: usize = 4;
pub const DEFAULT_QUEUE_DEPTH: usize = 8;

/// Sizing of the reader, parser and shard stages.
///
/// `shards` is the single source for the aggregator count, the table count
/// and the routing modulus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Bytes read per chunk. Must be larger than the longest record.
    pub chunk_size: usize,
    pub parsers: usize,
    pub shards: usize,
    /// Capacity of the chunk queue and of each shard's batch queue.
    pub queue_depth: usize,
    /// Seed for the partition key hash. `None` draws a random seed per run.
    pub hash_seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            parsers: DEFAULT_PARSERS,
            shards: DEFAULT_SHARDS,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            hash_seed: None,
        }
    }
}

impl PipelineConfig {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_parsers(mut self, parsers: usize) -> Self {
        self.parsers = parsers;
        self
    }

    pub fn with_shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    pub fn with_queue_depth(mut self, queue_depth: usize) -> Self {
        self.queue_depth = queue_depth;
        self
    }

    pub fn with_hash_seed(mut self, seed: u64) -> Self {
        self.hash_seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("chunk_size", self.chunk_size),
            ("parsers", self.parsers),
            ("shards", self.shards),
            ("queue_depth", self.queue_depth),
        ];

        for (name, value) in checks {
            if value == 0 {
                return Err(Error::Config(format!("{name} must be greater than 0")));
            }
        }

        Ok(())
    }
}
