//! Reader → parser pool → shard aggregators, wired with bounded queues.
//!
//! ```text
//!            chunks                    batches (one queue per shard)
//!  reader ──[bounded]──┬─ parser 0 ─┬──[bounded]── shard 0
//!                      ├─ parser 1 ─┼──[bounded]── shard 1
//!                      └─ parser N ─┴──[bounded]── shard M
//! ```
//!
//! Each stage closes the queues it feeds when its last worker exits: every
//! worker owns one sender clone per downstream queue, so the queue
//! disconnects once all of them are dropped. A failing worker raises the
//! shared [`Cancellation`] flag and drops its endpoints, which unblocks its
//! neighbours; everything else drains and stops.

use std::io::{Read, Seek};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, ScopedJoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, bounded};
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::hash_table::ShardTable;
use crate::parser::{RecordBatch, RecordParser};
use crate::partition::{NameHasher, ShardRouter};
use crate::reader::{Chunk, ChunkReader};
use crate::shard::ShardAggregator;

/// Run-wide stop flag, raised by the first worker that fails.
#[derive(Debug, Default)]
pub struct Cancellation(AtomicBool);

impl Cancellation {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Runs a worker body, raising the flag if it fails or panics.
    fn guard<T>(&self, work: impl FnOnce() -> Result<T>) -> Result<T> {
        let _unwind = CancelOnUnwind(self);
        let result = work();
        if result.is_err() {
            self.cancel();
        }
        result
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Raises the flag while a worker unwinds, so a panic stops the run as
/// promptly as an error does.
struct CancelOnUnwind<'a>(&'a Cancellation);

impl Drop for CancelOnUnwind<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.cancel();
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub chunks: u64,
    pub bytes: u64,
    pub records: u64,
    pub entities: usize,
}

/// Every shard's table once the pipeline has drained.
#[derive(Debug)]
pub struct Aggregation {
    pub tables: Vec<ShardTable>,
    pub summary: Summary,
}

#[derive(Debug, Default)]
struct ReadTotals {
    chunks: u64,
    bytes: u64,
}

fn read_stage<R: Read + Seek>(
    mut reader: ChunkReader<R>,
    chunks: Sender<Chunk>,
    cancel: &Cancellation,
) -> Result<ReadTotals> {
    let mut totals = ReadTotals::default();

    while let Some(chunk) = reader.next_chunk()? {
        cancel.check()?;

        totals.chunks += 1;
        totals.bytes += chunk.len() as u64;

        chunks
            .send(chunk)
            .map_err(|_| Error::Disconnected { stage: "parser" })?;
    }

    debug!(chunks = totals.chunks, bytes = totals.bytes, "reader drained");
    Ok(totals)
}

fn parse_stage(
    worker: usize,
    parser: RecordParser,
    chunks: Receiver<Chunk>,
    shards: Vec<Sender<RecordBatch>>,
    cancel: &Cancellation,
) -> Result<u64> {
    let mut records = 0u64;

    for chunk in chunks.iter() {
        cancel.check()?;

        let batches = parser.parse_chunk(Arc::new(chunk))?;
        for (shard, batch) in batches.into_iter().enumerate() {
            if batch.is_empty() {
                continue;
            }

            records += batch.len() as u64;
            shards[shard]
                .send(batch)
                .map_err(|_| Error::Disconnected { stage: "shard" })?;
        }
    }

    debug!(worker, records, "parser drained");
    Ok(records)
}

fn shard_stage(
    id: usize,
    batches: Receiver<RecordBatch>,
    cancel: &Cancellation,
) -> Result<ShardTable> {
    let mut aggregator = ShardAggregator::new(id);

    for batch in batches.iter() {
        cancel.check()?;
        aggregator.fold_batch(&batch);
    }

    debug!(
        shard = id,
        records = aggregator.records(),
        entities = aggregator.table().len(),
        "shard drained"
    );
    Ok(aggregator.into_table())
}

fn join<T>(handle: ScopedJoinHandle<'_, Result<T>>, stage: &'static str) -> Result<T> {
    handle
        .join()
        .map_err(|_| Error::WorkerPanicked { stage })
        .and_then(|result| result)
}

/// Picks the error that caused the failure over the ones it triggered.
fn root_cause(errors: Vec<Error>) -> Option<Error> {
    let mut secondary = None;

    for error in errors {
        if !error.is_secondary() {
            return Some(error);
        }
        secondary.get_or_insert(error);
    }

    secondary
}

/// Streams `source` through the full pipeline and returns one table per
/// shard.
pub fn run<R: Read + Seek + Send>(source: R, config: &PipelineConfig) -> Result<Aggregation> {
    config.validate()?;

    let hasher = match config.hash_seed {
        Some(seed) => NameHasher::with_seed(seed),
        None => NameHasher::random(),
    };
    let parser = RecordParser::new(hasher, ShardRouter::new(config.shards));
    let cancel = Cancellation::default();
    let started = Instant::now();

    debug!(
        chunk_size = config.chunk_size,
        parsers = config.parsers,
        shards = config.shards,
        seed = hasher.seed(),
        "starting pipeline"
    );

    let (chunk_tx, chunk_rx) = bounded::<Chunk>(config.queue_depth);
    let (batch_txs, batch_rxs): (Vec<_>, Vec<_>) = (0..config.shards)
        .map(|_| bounded::<RecordBatch>(config.queue_depth))
        .unzip();

    let (read, parsed, tables) = thread::scope(|scope| {
        let cancel = &cancel;

        let reader = ChunkReader::new(source, config.chunk_size);
        let read_handle =
            scope.spawn(move || cancel.guard(|| read_stage(reader, chunk_tx, cancel)));

        let parse_handles: Vec<_> = (0..config.parsers)
            .map(|worker| {
                let chunks = chunk_rx.clone();
                let shards = batch_txs.clone();
                scope.spawn(move || {
                    cancel.guard(|| parse_stage(worker, parser, chunks, shards, cancel))
                })
            })
            .collect();

        // The workers now hold every remaining endpoint.
        drop(chunk_rx);
        drop(batch_txs);

        let shard_handles: Vec<_> = batch_rxs
            .into_iter()
            .enumerate()
            .map(|(id, batches)| {
                scope.spawn(move || cancel.guard(|| shard_stage(id, batches, cancel)))
            })
            .collect();

        let read = join(read_handle, "reader");
        let parsed: Vec<_> = parse_handles
            .into_iter()
            .map(|handle| join(handle, "parser"))
            .collect();
        let tables: Vec<_> = shard_handles
            .into_iter()
            .map(|handle| join(handle, "shard"))
            .collect();

        (read, parsed, tables)
    });

    let mut errors = Vec::new();

    let read = read.map_err(|e| errors.push(e)).ok();
    let records: u64 = parsed
        .into_iter()
        .filter_map(|r| r.map_err(|e| errors.push(e)).ok())
        .sum();
    let tables: Vec<ShardTable> = tables
        .into_iter()
        .filter_map(|r| r.map_err(|e| errors.push(e)).ok())
        .collect();

    if let Some(error) = root_cause(errors) {
        return Err(error);
    }

    let read = read.unwrap_or_default();
    let summary = Summary {
        chunks: read.chunks,
        bytes: read.bytes,
        records,
        entities: tables.iter().map(ShardTable::len).sum(),
    };

    info!(
        chunks = summary.chunks,
        bytes = summary.bytes,
        records = summary.records,
        entities = summary.entities,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "aggregation finished"
    );

    Ok(Aggregation { tables, summary })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::write_report;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::HashMap;
    use std::io::{self, Cursor, SeekFrom};

    fn config() -> PipelineConfig {
        PipelineConfig::default().with_hash_seed(0xC0FFEE)
    }

    fn aggregate(input: &[u8], config: &PipelineConfig) -> Result<Aggregation> {
        run(Cursor::new(input.to_vec()), config)
    }

    fn report_lines(aggregation: &Aggregation) -> Vec<String> {
        let mut buf = Vec::new();
        write_report(&aggregation.tables, &mut buf).unwrap();

        let mut lines: Vec<String> = String::from_utf8(buf)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();
        lines.sort_unstable();
        lines
    }

    #[test]
    fn test_scenario_single_entity() {
        let aggregation = aggregate(b"A;1.0\nA;2.0\nA;3.0\n", &config()).unwrap();
        assert_eq!(report_lines(&aggregation), vec!["A;1.0;2.0;3.0"]);
        assert_eq!(aggregation.tables.len(), 4);
        assert_eq!(aggregation.summary.records, 3);
        assert_eq!(aggregation.summary.entities, 1);
    }

    #[test]
    fn test_scenario_mean_truncates_to_zero() {
        let aggregation = aggregate(b"B;-5.0\nB;5.0\n", &config()).unwrap();
        assert_eq!(report_lines(&aggregation), vec!["B;-5.0;0.0;5.0"]);
    }

    #[test]
    fn test_scenario_record_split_by_read() {
        // An 8 byte read stops after "B;", which must be read again whole.
        let config = config().with_chunk_size(8);
        let aggregation = aggregate(b"A;1.0\nB;2.0\nB;4.0\n", &config).unwrap();

        assert_eq!(report_lines(&aggregation), vec!["A;1.0;1.0;1.0", "B;2.0;3.0;4.0"]);
        assert_eq!(aggregation.summary.records, 3);
        assert_eq!(aggregation.summary.chunks, 3);
    }

    #[test]
    fn test_empty_input() {
        let aggregation = aggregate(b"", &config()).unwrap();
        assert!(report_lines(&aggregation).is_empty());
        assert_eq!(aggregation.summary, Summary::default());
    }

    #[test]
    fn test_unterminated_last_record_counts() {
        let aggregation = aggregate(b"A;1.0\nA;2.0", &config().with_chunk_size(8)).unwrap();
        assert_eq!(report_lines(&aggregation), vec!["A;1.0;1.5;2.0"]);
    }

    #[test]
    fn test_entities_never_split_across_shards() {
        let input = b"Kika;4.3\nBo;6.8\nKika;-4.3\nPoyo;39.2\nBo;1.0\nUr;0.0\n";
        let aggregation = aggregate(input, &config().with_chunk_size(12).with_shards(3)).unwrap();

        let mut seen: HashMap<Vec<u8>, usize> = HashMap::new();
        for table in &aggregation.tables {
            for stats in table.entries() {
                *seen.entry(stats.name().to_vec()).or_default() += 1;
            }
        }

        assert_eq!(seen.len(), 4);
        assert!(seen.values().all(|&n| n == 1));
    }

    /// Random input checked against a plain `HashMap` fold, across stage
    /// sizes and chunk sizes small enough to split records often.
    #[test]
    fn test_matches_reference_under_any_configuration() {
        let mut rng = StdRng::seed_from_u64(1_000_000_007);

        let names: Vec<String> = (0..40)
            .map(|i| {
                let len = rng.random_range(1..=24);
                let mut name: String = (0..len)
                    .map(|_| rng.random_range(b'a'..=b'z') as char)
                    .collect();
                name.push_str(&i.to_string());
                name
            })
            .collect();

        let mut input = String::new();
        let mut reference: HashMap<&str, (i16, i16, i64, u64)> = HashMap::new();

        for _ in 0..5_000 {
            let name = names[rng.random_range(0..names.len())].as_str();
            let value: i16 = rng.random_range(-999..=999);
            input.push_str(&format!("{name};{}\n", crate::fixed_point::Tenths(value as i64)));

            let entry = reference.entry(name).or_insert((value, value, 0, 0));
            entry.0 = entry.0.min(value);
            entry.1 = entry.1.max(value);
            entry.2 += value as i64;
            entry.3 += 1;
        }

        let mut expected: Vec<String> = reference
            .iter()
            .map(|(name, &(min, max, sum, count))| {
                format!(
                    "{name};{};{};{}",
                    crate::fixed_point::Tenths(min as i64),
                    crate::fixed_point::Tenths(sum / count as i64),
                    crate::fixed_point::Tenths(max as i64)
                )
            })
            .collect();
        expected.sort_unstable();

        for (parsers, shards, chunk_size) in [(1, 1, 64), (3, 4, 37), (2, 7, 4096), (4, 2, 1 << 20)] {
            let config = PipelineConfig::default()
                .with_parsers(parsers)
                .with_shards(shards)
                .with_chunk_size(chunk_size)
                .with_queue_depth(2)
                .with_hash_seed(rng.random());

            let aggregation = aggregate(input.as_bytes(), &config).unwrap();

            assert_eq!(aggregation.tables.len(), shards);
            assert_eq!(aggregation.summary.records, 5_000);
            assert_eq!(aggregation.summary.bytes, input.len() as u64);
            assert_eq!(report_lines(&aggregation), expected, "{config:?}");
        }
    }

    #[test]
    fn test_malformed_record_fails_run() {
        let mut input = String::new();
        for i in 0..2_000 {
            input.push_str(&format!("Station{};{}.{}\n", i % 13, i % 50, i % 10));
        }
        input.push_str("Broken;12.x\n");
        for i in 0..2_000 {
            input.push_str(&format!("Station{};1.0\n", i % 13));
        }

        let config = config().with_chunk_size(256).with_queue_depth(1);
        match aggregate(input.as_bytes(), &config) {
            Err(Error::Malformed { kind, line, .. }) => {
                assert_eq!(kind, crate::error::MalformedRecord::InvalidByte(b'x'));
                assert_eq!(line, "Broken;12.x");
            }
            other => panic!("expected malformed record, got {other:?}"),
        }
    }

    #[test]
    fn test_record_too_long_fails_run() {
        let input = b"A;1.0\nAnExtremelyLongStationNameThatCannotFit;1.0\n";
        assert!(matches!(
            aggregate(input, &config().with_chunk_size(16)),
            Err(Error::RecordTooLong { offset: 6, .. })
        ));
    }

    #[test]
    fn test_invalid_config_fails_before_start() {
        assert!(matches!(
            aggregate(b"A;1.0\n", &config().with_shards(0)),
            Err(Error::Config(_))
        ));
    }

    struct FailAfter {
        inner: Cursor<Vec<u8>>,
        remaining: usize,
    }

    impl Read for FailAfter {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.remaining == 0 {
                return Err(io::Error::other("device gone"));
            }
            let len = buf.len().min(self.remaining);
            let n = self.inner.read(&mut buf[..len])?;
            self.remaining -= n;
            Ok(n)
        }
    }

    impl Seek for FailAfter {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    #[test]
    fn test_io_error_fails_run() {
        let input = "Xi;1.2\n".repeat(10_000).into_bytes();
        let source = FailAfter {
            inner: Cursor::new(input),
            remaining: 20_000,
        };

        let config = config().with_chunk_size(1024).with_queue_depth(1);
        assert!(matches!(run(source, &config), Err(Error::Io(_))));
    }

    /// Serves `healthy` bytes normally, then panics mid-stream.
    struct PanicAfter {
        inner: Cursor<Vec<u8>>,
        healthy: u64,
    }

    impl Read for PanicAfter {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.inner.position() >= self.healthy {
                panic!("source exploded at {}", self.inner.position());
            }
            self.inner.read(buf)
        }
    }

    impl Seek for PanicAfter {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    #[test]
    fn test_reader_panic_fails_run() {
        let input = "Bo;6.8\nUr;-0.1\n".repeat(5_000).into_bytes();
        let source = PanicAfter {
            inner: Cursor::new(input),
            healthy: 4096,
        };

        let config = config().with_chunk_size(512).with_queue_depth(1);
        assert!(matches!(
            run(source, &config),
            Err(Error::WorkerPanicked { stage: "reader" })
        ));
    }

    #[test]
    fn test_panic_raises_cancellation() {
        let cancel = Cancellation::default();

        let unwound = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            cancel.guard(|| -> Result<()> { panic!("worker blew up") })
        }));

        assert!(unwound.is_err());
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn test_successful_guard_leaves_flag_down() {
        let cancel = Cancellation::default();
        assert_eq!(cancel.guard(|| Ok(7)).unwrap(), 7);
        assert!(!cancel.is_cancelled());
    }

    #[test]
    fn test_root_cause_prefers_primary_error() {
        let errors = vec![
            Error::Cancelled,
            Error::Disconnected { stage: "shard" },
            Error::Config("boom".into()),
        ];
        assert!(matches!(root_cause(errors), Some(Error::Config(_))));

        let errors = vec![Error::Disconnected { stage: "shard" }, Error::Cancelled];
        assert!(matches!(
            root_cause(errors),
            Some(Error::Disconnected { stage: "shard" })
        ));

        assert!(root_cause(Vec::new()).is_none());
    }

    #[test]
    fn test_cancellation_flag() {
        let cancel = Cancellation::default();
        assert!(cancel.check().is_ok());

        let result: Result<()> = cancel.guard(|| Err(Error::Config("x".into())));
        assert!(result.is_err());
        assert!(cancel.is_cancelled());
        assert!(matches!(cancel.check(), Err(Error::Cancelled)));
    }
}
