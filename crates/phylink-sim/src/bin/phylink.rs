//! `phylink` command-line front end
//!
//! ```text
//! phylink simulate --snr 8 --bits 4096 --seed 1
//! phylink sweep --from 0 --to 12 --step 2 --trials 20
//! phylink example-config > phylink.yaml
//! ```

use clap::{Parser, Subcommand};
use phylink_core::config::{PhylinkConfig, SimulationConfig};
use phylink_core::metrics::{serde_nonfinite, Metrics};
use phylink_core::observe::init_logging;
use phylink_core::{PhyError, PhyResult};
use phylink_sim::cache::{CacheKey, ResultCache};
use phylink_sim::parallel::ParallelSimulator;
use phylink_sim::pipeline::SimulationPipeline;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[clap(author, version, about = "5G/6G physical-layer link simulator", long_about = None)]
#[clap(propagate_version = true)]
struct Cli {
    /// Configuration file (defaults to the standard search path)
    #[clap(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[clap(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one simulation and print its metrics as JSON
    Simulate {
        /// Override the configured SNR (dB)
        #[clap(long)]
        snr: Option<f64>,

        /// Number of random input bits
        #[clap(long, default_value_t = 4096)]
        bits: usize,

        /// Seed for the input data and the channel
        #[clap(long)]
        seed: Option<u64>,

        /// Directory for cached results
        #[clap(long)]
        cache_dir: Option<PathBuf>,
    },
    /// Sweep SNR and print the mean BER per point
    Sweep {
        /// First SNR (dB)
        #[clap(long, default_value_t = 0.0)]
        from: f64,

        /// Last SNR (dB), inclusive
        #[clap(long, default_value_t = 20.0)]
        to: f64,

        /// SNR step (dB)
        #[clap(long, default_value_t = 2.0)]
        step: f64,

        /// Trials per SNR point
        #[clap(long, default_value_t = 10)]
        trials: usize,

        /// Input bits per trial
        #[clap(long, default_value_t = 2048)]
        bits: usize,

        /// Worker threads (0 = one per CPU)
        #[clap(long, default_value_t = 0)]
        workers: usize,
    },
    /// Print an example configuration file
    ExampleConfig,
}

#[derive(Serialize)]
struct SimulateReport {
    config: SimulationConfig,
    #[serde(serialize_with = "serde_nonfinite::serialize")]
    metrics: Metrics,
}

#[derive(Serialize)]
struct SweepRow {
    snr_db: f64,
    ber: f64,
    ber_std: f64,
    channel_ber: f64,
}

fn random_bits(n: usize, seed: Option<u64>) -> Vec<u8> {
    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };
    (0..n).map(|_| rng.gen_range(0..=1u8)).collect()
}

fn load_config(path: Option<&PathBuf>) -> PhyResult<PhylinkConfig> {
    let config = match path {
        Some(p) => PhylinkConfig::load_from(p)?,
        None => PhylinkConfig::load()?,
    };
    config.validate()?;
    Ok(config)
}

fn to_json<T: Serialize>(value: &T) -> PhyResult<String> {
    serde_json::to_string_pretty(value).map_err(|e| PhyError::Io(e.to_string()))
}

fn simulate(
    mut config: SimulationConfig,
    snr: Option<f64>,
    bits: usize,
    seed: Option<u64>,
    cache_dir: Option<PathBuf>,
) -> PhyResult<String> {
    if let Some(snr) = snr {
        config.snr_db = snr;
    }
    if seed.is_some() {
        config.seed = seed;
    }
    let data = random_bits(bits, config.seed);

    let result = match cache_dir {
        // Only seeded runs are reproducible enough to cache
        Some(dir) if config.seed.is_some() => {
            let cache = ResultCache::with_dir(dir)?;
            let key = CacheKey::new(&config, Some(&data))?;
            let result = cache.get_or_compute(&key, || SimulationPipeline::new(config.clone())?.simulate(&data))?;
            tracing::info!(key = %key, hits = cache.stats().hits, "Cache consulted");
            result
        }
        _ => SimulationPipeline::new(config.clone())?.simulate(&data)?,
    };

    to_json(&SimulateReport {
        config,
        metrics: result.metrics,
    })
}

/// SNR grid from `from` to `to` inclusive. A `to` within rounding of the
/// last step is kept.
fn sweep_points(from: f64, to: f64, step: f64) -> PhyResult<Vec<f64>> {
    if !(step > 0.0) || !(to >= from) {
        return Err(PhyError::config("step", step, "sweep needs step > 0 and to >= from"));
    }
    let n_points = ((to - from) / step + 1e-9).floor() as usize + 1;
    Ok((0..n_points).map(|i| from + i as f64 * step).collect())
}

fn sweep(config: SimulationConfig, from: f64, to: f64, step: f64, trials: usize, bits: usize, workers: usize) -> PhyResult<String> {
    let snrs = sweep_points(from, to, step)?;

    let data = random_bits(bits, config.seed);
    let sim = ParallelSimulator::new(workers)?;
    let points = sim.run_snr_sweep(&config, &snrs, &data, trials)?;

    let rows: Vec<SweepRow> = points
        .iter()
        .map(|p| SweepRow {
            snr_db: p.snr_db,
            ber: p.metrics.mean("ber").unwrap_or_default(),
            ber_std: p.metrics.std("ber").unwrap_or_default(),
            channel_ber: p.metrics.mean("channel_ber").unwrap_or_default(),
        })
        .collect();
    to_json(&rows)
}

fn run(cli: Cli) -> PhyResult<String> {
    if let Commands::ExampleConfig = cli.command {
        return Ok(PhylinkConfig::example_yaml());
    }

    let config = load_config(cli.config.as_ref())?;
    init_logging(&config.logging.clone().with_verbosity(cli.verbose));

    match cli.command {
        Commands::Simulate {
            snr,
            bits,
            seed,
            cache_dir,
        } => simulate(config.simulation, snr, bits, seed, cache_dir),
        Commands::Sweep {
            from,
            to,
            step,
            trials,
            bits,
            workers,
        } => sweep(config.simulation, from, to, step, trials, bits, workers),
        Commands::ExampleConfig => Ok(PhylinkConfig::example_yaml()),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "phylink failed");
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sweep_points_keep_last_point() {
        let points = sweep_points(0.0, 1.0, 0.1).unwrap();
        assert_eq!(points.len(), 11);
        assert_relative_eq!(points[10], 1.0, epsilon = 1e-12);

        assert_eq!(sweep_points(0.0, 0.3, 0.1).unwrap().len(), 4);
        assert_eq!(sweep_points(0.0, 20.0, 2.0).unwrap().len(), 11);
        assert_eq!(sweep_points(0.0, 5.0, 2.0).unwrap(), vec![0.0, 2.0, 4.0]);
        assert_eq!(sweep_points(3.0, 3.0, 1.0).unwrap(), vec![3.0]);
    }

    #[test]
    fn test_sweep_points_reject_bad_range() {
        assert!(sweep_points(0.0, 10.0, 0.0).unwrap_err().is_configuration());
        assert!(sweep_points(5.0, 1.0, 1.0).is_err());
        assert!(sweep_points(0.0, 1.0, f64::NAN).is_err());
    }
}
