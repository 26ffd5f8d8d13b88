//! Single-pass min/mean/max aggregation of `name;value` records.
//!
//! A reader cuts the input into chunks on record boundaries, a pool of
//! parsers turns chunks into fixed-point records routed by name, and one
//! single-writer aggregator per shard folds them into running statistics.

pub mod byte_buffer;
pub mod config;
pub mod error;
pub mod fixed_point;
pub mod hash_table;
pub mod parser;
pub mod partition;
pub mod pipeline;
pub mod reader;
pub mod report;
pub mod shard;

use std::fs::File;
use std::path::Path;

pub use config::PipelineConfig;
pub use error::{Error, MalformedRecord, Result};
pub use hash_table::{RunningStats, ShardTable};
pub use pipeline::{Aggregation, Summary, run};
pub use report::write_report;

/// Opens `path` and runs it through the pipeline.
pub fn aggregate_file(path: impl AsRef<Path>, config: &PipelineConfig) -> Result<Aggregation> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| Error::Open {
        path: path.to_path_buf(),
        source,
    })?;

    run(file, config)
}
