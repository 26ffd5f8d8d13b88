use hashbrown::{HashTable, hash_table::Entry};

use crate::fixed_point::{branchless_max, branchless_min, mean_tenths};

/// Running min/max/sum/count for one entity.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RunningStats {
    key: u64,
    name: Box<[u8]>,

    pub min: i16,
    pub max: i16,
    pub sum: i64,
    pub count: u64,
}

impl RunningStats {
    /// First sighting. The name is copied out of the chunk it was parsed from.
    pub fn new(key: u64, name: &[u8], value: i16) -> Self {
        Self {
            key,
            name: name.into(),
            min: value,
            max: value,
            sum: value as i64,
            count: 1,
        }
    }

    #[inline(always)]
    pub fn add(&mut self, value: i16) {
        self.min = branchless_min(self.min, value);
        self.max = branchless_max(self.max, value);
        self.sum += value as i64;
        self.count += 1;
    }

    pub fn key(&self) -> u64 {
        self.key
    }

    pub fn name(&self) -> &[u8] {
        &self.name
    }

    /// Mean in tenths, or `None` before any sighting.
    pub fn mean(&self) -> Option<i64> {
        (self.count != 0).then(|| mean_tenths(self.sum, self.count))
    }
}

/// One shard's entities, keyed by partition key.
///
/// Keys are only a hash: lookups confirm the full name, so two entities whose
/// keys collide keep separate entries.
#[derive(Debug, Default)]
pub struct ShardTable {
    stats: HashTable<RunningStats>,
}

impl ShardTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            stats: HashTable::with_capacity(capacity),
        }
    }

    #[inline(always)]
    pub fn update(&mut self, key: u64, name: &[u8], value: i16) {
        match self
            .stats
            .entry(key, |s| s.key == key && &*s.name == name, |s| s.key)
        {
            Entry::Occupied(mut entry) => entry.get_mut().add(value),
            Entry::Vacant(entry) => {
                entry.insert(RunningStats::new(key, name, value));
            }
        }
    }

    pub fn get(&self, key: u64, name: &[u8]) -> Option<&RunningStats> {
        self.stats.find(key, |s| s.key == key && &*s.name == name)
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &RunningStats> {
        self.stats.iter()
    }
}
