use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use sharded_brc::{PipelineConfig, aggregate_file, config, write_report};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "aggregate")]
#[command(version)]
#[command(about = "Per-entity min/mean/max over a file of name;value records", long_about = None)]
struct Args {
    /// Measurements file to be processed
    #[arg(short, long)]
    input: PathBuf,

    /// Parser workers
    #[arg(long, default_value_t = config::DEFAULT_PARSERS)]
    parsers: usize,

    /// Aggregation shards (one worker and one table each)
    #[arg(long, default_value_t = config::DEFAULT_SHARDS)]
    shards: usize,

    /// Bytes read per chunk
    #[arg(long, default_value_t = config::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Depth of every inter-stage queue
    #[arg(long, default_value_t = config::DEFAULT_QUEUE_DEPTH)]
    queue_depth: usize,

    /// Fixed seed for name hashing
    #[arg(long)]
    seed: Option<u64>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn pipeline_config(&self) -> PipelineConfig {
        let config = PipelineConfig::default()
            .with_parsers(self.parsers)
            .with_shards(self.shards)
            .with_chunk_size(self.chunk_size)
            .with_queue_depth(self.queue_depth);

        match self.seed {
            Some(seed) => config.with_hash_seed(seed),
            None => config,
        }
    }
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log level {level:?}"))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    Ok(())
}

fn run(args: &Args) -> anyhow::Result<()> {
    let config = args.pipeline_config();
    config.validate()?;

    let aggregation = aggregate_file(&args.input, &config)
        .with_context(|| format!("processing {}", args.input.display()))?;

    let mut out = BufWriter::new(io::stdout().lock());
    write_report(&aggregation.tables, &mut out).context("writing report")?;

    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(&args.log_level) {
        eprintln!("Error: {e:#}");
        return ExitCode::FAILURE;
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
