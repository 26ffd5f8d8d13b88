use crate::hash_table::ShardTable;
use crate::parser::{Record, RecordBatch};

/// Single writer for one shard's table.
#[derive(Debug)]
pub struct ShardAggregator {
    id: usize,
    table: ShardTable,
    records: u64,
}

impl ShardAggregator {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            table: ShardTable::with_capacity(1024),
            records: 0,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    #[inline(always)]
    pub fn fold(&mut self, record: Record<'_>) {
        self.table.update(record.key, record.name, record.value);
        self.records += 1;
    }

    pub fn fold_batch(&mut self, batch: &RecordBatch) {
        for record in batch.records() {
            self.fold(record);
        }
    }

    pub fn table(&self) -> &ShardTable {
        &self.table
    }

    pub fn into_table(self) -> ShardTable {
        self.table
    }
}
