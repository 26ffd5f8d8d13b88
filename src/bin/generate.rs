use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, anyhow};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

const DEFAULT_STATIONS: &[(&str, f64)] = &[
    ("Abha", 18.0),
    ("Abidjan", 26.0),
    ("Bo", 26.1),
    ("Bāgepalli", 25.2),
    ("Cardinal", 9.6),
    ("Greater Manchester", 9.7),
    ("Kika", 25.7),
    ("Konibodom", 14.4),
    ("Llanfairpwllgwyngyllgogerychwyrndrobwllllantysiliogogogoch", 10.0),
    ("Melbourne", 15.1),
    ("Pālakodu", 27.5),
    ("Poyo", 26.0),
    ("San Fernando", 21.4),
    ("San Francisco", 14.6),
    ("Thiruvananthapuram", 27.6),
    ("Tokyo", 15.4),
    ("Ur", 22.9),
    ("Vostok", -55.2),
    ("Wolsey", 8.4),
    ("Xi", 19.9),
];

#[derive(Parser, Debug)]
#[command(name = "generate")]
#[command(about = "Writes synthetic name;value rows to stdout", long_about = None)]
struct Args {
    /// Number of rows, underscores allowed (1_000_000)
    rows: String,

    /// File of `name;mean` lines; `#` starts a comment
    #[arg(long)]
    stations: Option<PathBuf>,

    /// Seed for reproducible output
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Debug)]
struct City {
    name: String,
    distribution: Normal<f64>,
}

impl City {
    fn new(name: &str, mean: f64) -> anyhow::Result<Self> {
        Ok(Self {
            name: name.to_string(),
            distribution: Normal::new(mean, 10.0)
                .with_context(|| format!("could not create normal distribution for: {name}"))?,
        })
    }

    fn sample(&self, rng: &mut impl Rng) -> f64 {
        self.distribution.sample(rng).clamp(-99.9, 99.9)
    }
}

impl FromStr for City {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, mean) = s
            .split_once(';')
            .ok_or_else(|| anyhow!("missing ';' in station line {s:?}"))?;
        let mean: f64 = mean
            .trim()
            .parse()
            .with_context(|| format!("bad mean in station line {s:?}"))?;
        City::new(name, mean)
    }
}

fn load_cities(path: Option<&PathBuf>) -> anyhow::Result<Vec<City>> {
    let cities = match path {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("could not read {}", path.display()))?
            .lines()
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::parse)
            .collect::<anyhow::Result<Vec<City>>>()?,
        None => DEFAULT_STATIONS
            .iter()
            .map(|&(name, mean)| City::new(name, mean))
            .collect::<anyhow::Result<Vec<City>>>()?,
    };

    if cities.is_empty() {
        return Err(anyhow!("no stations to sample from"));
    }

    Ok(cities)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let rows: u64 = args
        .rows
        .replace('_', "")
        .parse()
        .with_context(|| format!("expected integer row count, got {:?}", args.rows))?;

    let cities = load_cities(args.stations.as_ref())?;

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let mut out = BufWriter::new(io::stdout().lock());
    for _ in 0..rows {
        let city = &cities[rng.random_range(0..cities.len())];
        writeln!(out, "{};{:.1}", city.name, city.sample(&mut rng))?;
    }
    out.flush()?;

    Ok(())
}
