//! Parallel Simulation Runner
//!
//! Monte Carlo repetitions, SNR sweeps and parameter sweeps run as
//! independent jobs on a dedicated Rayon pool. Every job builds its own
//! [`SimulationPipeline`], so workers share nothing mutable; results are
//! aggregated only after all jobs finish.
//!
//! When the base configuration carries a seed, job `i` runs with
//! `seed + i`, which makes a whole sweep reproducible.
//!
//! ## Usage
//!
//! ```rust
//! use phylink_core::config::SimulationConfig;
//! use phylink_sim::parallel::ParallelSimulator;
//!
//! let sim = ParallelSimulator::new(2).unwrap();
//! let config = SimulationConfig { block_length: 128, seed: Some(3), ..Default::default() };
//! let bits: Vec<u8> = (0..256).map(|i| (i % 5 < 2) as u8).collect();
//!
//! let sweep = sim.run_snr_sweep(&config, &[0.0, 10.0], &bits, 4).unwrap();
//! assert_eq!(sweep.len(), 2);
//! assert_eq!(sweep[1].metrics.n_simulations, 4);
//! ```

use crate::pipeline::{SimulationPipeline, SimulationResult};
use phylink_core::config::SimulationConfig;
use phylink_core::metrics::{serde_nonfinite, Metrics};
use phylink_core::{PhyError, PhyResult};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mean and standard deviation of each metric over a batch of runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedMetrics {
    pub n_simulations: usize,
    #[serde(with = "serde_nonfinite")]
    pub mean: Metrics,
    /// Population standard deviation
    #[serde(with = "serde_nonfinite")]
    pub std: Metrics,
}

impl AggregatedMetrics {
    /// Aggregate over every key that appears in at least one run.
    pub fn from_runs(runs: &[Metrics]) -> Self {
        let mut samples: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for run in runs {
            for (key, &value) in run {
                samples.entry(key.as_str()).or_default().push(value);
            }
        }

        let mut mean = Metrics::new();
        let mut std = Metrics::new();
        for (key, values) in samples {
            let n = values.len() as f64;
            let m = values.iter().sum::<f64>() / n;
            let var = if m.is_finite() {
                values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n
            } else {
                0.0
            };
            mean.insert(key.to_string(), m);
            std.insert(key.to_string(), var.sqrt());
        }

        Self {
            n_simulations: runs.len(),
            mean,
            std,
        }
    }

    pub fn mean(&self, key: &str) -> Option<f64> {
        self.mean.get(key).copied()
    }

    pub fn std(&self, key: &str) -> Option<f64> {
        self.std.get(key).copied()
    }

    /// Single map with `{key}` for means and `{key}_std` for deviations.
    pub fn flatten(&self) -> Metrics {
        let mut flat = self.mean.clone();
        for (key, &value) in &self.std {
            flat.insert(format!("{}_std", key), value);
        }
        flat
    }
}

/// Aggregated metrics at one SNR point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnrPoint {
    pub snr_db: f64,
    pub metrics: AggregatedMetrics,
}

/// Runs independent pipelines on a worker pool.
#[derive(Debug)]
pub struct ParallelSimulator {
    pool: rayon::ThreadPool,
}

impl ParallelSimulator {
    /// Pool with `n_workers` threads; 0 uses one per CPU.
    pub fn new(n_workers: usize) -> PhyResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(n_workers)
            .thread_name(|i| format!("phylink-sim-{}", i))
            .build()
            .map_err(|e| PhyError::config("n_workers", n_workers, e.to_string()))?;
        tracing::debug!(workers = pool.current_num_threads(), "Parallel simulator ready");
        Ok(Self { pool })
    }

    pub fn n_workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// `n_iterations` runs of one configuration, data drawn per run by
    /// `data_gen(run_index)`.
    pub fn run_monte_carlo<F>(&self, config: &SimulationConfig, n_iterations: usize, data_gen: F) -> PhyResult<AggregatedMetrics>
    where
        F: Fn(usize) -> Vec<u8> + Sync,
    {
        config.validate()?;
        let runs: Vec<Metrics> = self.pool.install(|| {
            (0..n_iterations)
                .into_par_iter()
                .map(|i| {
                    let bits = data_gen(i);
                    run_job(config.clone(), i, &bits).map(|r| r.metrics)
                })
                .collect::<PhyResult<_>>()
        })?;

        let aggregated = AggregatedMetrics::from_runs(&runs);
        tracing::info!(
            runs = n_iterations,
            snr_db = config.snr_db,
            ber = aggregated.mean("ber").unwrap_or_default(),
            "Monte Carlo complete"
        );
        Ok(aggregated)
    }

    /// `trials` runs at each SNR, averaged per SNR. Results come back in
    /// `snr_values` order.
    pub fn run_snr_sweep(
        &self,
        config: &SimulationConfig,
        snr_values: &[f64],
        data: &[u8],
        trials: usize,
    ) -> PhyResult<Vec<SnrPoint>> {
        config.validate()?;
        let trials = trials.max(1);
        let total = snr_values.len() * trials;

        let runs: Vec<Metrics> = self.pool.install(|| {
            (0..total)
                .into_par_iter()
                .map(|job| {
                    let cfg = SimulationConfig {
                        snr_db: snr_values[job / trials],
                        ..config.clone()
                    };
                    run_job(cfg, job, data).map(|r| r.metrics)
                })
                .collect::<PhyResult<_>>()
        })?;

        let points: Vec<SnrPoint> = snr_values
            .iter()
            .zip(runs.chunks(trials))
            .map(|(&snr_db, chunk)| SnrPoint {
                snr_db,
                metrics: AggregatedMetrics::from_runs(chunk),
            })
            .collect();

        for point in &points {
            tracing::debug!(
                snr_db = point.snr_db,
                ber = point.metrics.mean("ber").unwrap_or_default(),
                "SNR point"
            );
        }
        Ok(points)
    }

    /// One run per value, with `apply` writing the value into a copy of
    /// `base`. Each derived configuration is validated on its own.
    pub fn run_parameter_sweep<T, A>(
        &self,
        base: &SimulationConfig,
        values: &[T],
        data: &[u8],
        apply: A,
    ) -> PhyResult<Vec<SimulationResult>>
    where
        T: Sync,
        A: Fn(&mut SimulationConfig, &T) + Sync,
    {
        self.pool.install(|| {
            values
                .par_iter()
                .enumerate()
                .map(|(i, value)| {
                    let mut cfg = base.clone();
                    apply(&mut cfg, value);
                    run_job(cfg, i, data)
                })
                .collect()
        })
    }
}

fn run_job(mut config: SimulationConfig, index: usize, data: &[u8]) -> PhyResult<SimulationResult> {
    config.seed = config.seed.map(|s| s.wrapping_add(index as u64));
    SimulationPipeline::new(config)?.simulate(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use phylink_core::types::{Modulation, Technology};

    fn bits() -> Vec<u8> {
        (0..384).map(|i| ((i * 29 + 5) % 13 < 6) as u8).collect()
    }

    fn config() -> SimulationConfig {
        SimulationConfig {
            block_length: 128,
            seed: Some(21),
            ..Default::default()
        }
    }

    #[test]
    fn test_aggregate_mean_and_std() {
        let runs: Vec<Metrics> = [1.0, 3.0]
            .iter()
            .map(|&v| Metrics::from([("ber".to_string(), v)]))
            .collect();
        let agg = AggregatedMetrics::from_runs(&runs);
        assert_eq!(agg.n_simulations, 2);
        assert_relative_eq!(agg.mean("ber").unwrap(), 2.0);
        assert_relative_eq!(agg.std("ber").unwrap(), 1.0);

        let flat = agg.flatten();
        assert_relative_eq!(flat["ber"], 2.0);
        assert_relative_eq!(flat["ber_std"], 1.0);
    }

    #[test]
    fn test_aggregate_keeps_infinite_means() {
        let runs = vec![Metrics::from([("psnr".to_string(), f64::INFINITY)]); 3];
        let agg = AggregatedMetrics::from_runs(&runs);
        assert!(agg.mean("psnr").unwrap().is_infinite());
        assert_eq!(agg.std("psnr"), Some(0.0));
    }

    #[test]
    fn test_monte_carlo_is_reproducible() {
        let sim = ParallelSimulator::new(3).unwrap();
        let cfg = SimulationConfig { snr_db: 2.0, ..config() };
        let a = sim.run_monte_carlo(&cfg, 6, |_| bits()).unwrap();
        let b = sim.run_monte_carlo(&cfg, 6, |_| bits()).unwrap();
        assert_eq!(a.n_simulations, 6);
        assert_eq!(a, b);
        assert!(a.mean.contains_key("ber"));
    }

    #[test]
    fn test_snr_sweep_order_and_trend() {
        let sim = ParallelSimulator::new(0).unwrap();
        let snrs = [-2.0, 2.0, 12.0];
        let points = sim.run_snr_sweep(&config(), &snrs, &bits(), 6).unwrap();

        let got: Vec<f64> = points.iter().map(|p| p.snr_db).collect();
        assert_eq!(got, snrs.to_vec());
        let ber: Vec<f64> = points.iter().map(|p| p.metrics.mean("channel_ber").unwrap()).collect();
        assert!(ber.windows(2).all(|w| w[1] < w[0]), "{:?}", ber);
        assert_eq!(points[2].metrics.mean("ber"), Some(0.0));
    }

    #[test]
    fn test_parameter_sweep_validates_each_config() {
        let sim = ParallelSimulator::new(2).unwrap();
        let ok = sim
            .run_parameter_sweep(&config(), &[Modulation::Qpsk, Modulation::Qam64], &bits(), |cfg, &m| {
                cfg.modulation = m;
                cfg.snr_db = 30.0;
            })
            .unwrap();
        assert_eq!(ok.len(), 2);
        assert!(ok.iter().all(|r| r.metrics["ber"] == 0.0));

        // 1024QAM is 6G-only
        let err = sim
            .run_parameter_sweep(&config(), &[Technology::FiveG], &bits(), |cfg, &t| {
                cfg.technology = t;
                cfg.modulation = Modulation::Qam1024;
            })
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_invalid_config_fails_before_running() {
        let sim = ParallelSimulator::new(1).unwrap();
        let cfg = SimulationConfig {
            code_rate: 1.5,
            ..config()
        };
        assert!(sim.run_monte_carlo(&cfg, 4, |_| bits()).is_err());
        assert!(sim.run_snr_sweep(&cfg, &[0.0], &bits(), 1).is_err());
    }
}
