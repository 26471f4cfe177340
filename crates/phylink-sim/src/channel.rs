//! Channel Models for Link Simulation
//!
//! Every model perturbs one block of unit-power symbols per
//! [`ChannelModel::transmit`] call:
//!
//! 1. **AWGN**: complex Gaussian noise at the measured signal power ÷ SNR
//! 2. **Rayleigh**: one CN(0, 1) fading coefficient per symbol, then AWGN at
//!    the faded signal's power, then coherent equalization with perfect CSI
//! 3. **Rician**: as Rayleigh, with a line-of-sight term `√(K/(K+1))` plus a
//!    scattered term of power `1/(K+1)`
//!
//! Fading coefficients are drawn fresh on each call; the channel has no
//! memory between blocks.
//!
//! ## Usage
//!
//! ```rust
//! use phylink_sim::channel::{create_channel_model, ChannelModel};
//! use phylink_core::types::{ChannelKind, Complex};
//!
//! let mut channel = create_channel_model(ChannelKind::Rayleigh, 15.0, 10.0, Some(7));
//! let clean = vec![Complex::new(1.0, 0.0); 100];
//! let tx = channel.transmit(&clean);
//! assert_eq!(tx.symbols.len(), 100);
//! assert_eq!(tx.fading.len(), 100);
//! ```

use phylink_core::types::{average_power, db_to_linear, ChannelKind, Complex, Modulation};
use phylink_core::PhyResult;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Floor applied to |h|² before equalization
pub const FADING_POWER_FLOOR: f64 = 1e-10;

/// Output of one pass through the channel
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transmission {
    /// Received symbols, equalized for fading channels
    pub symbols: Vec<Complex>,
    /// Noise variance actually added (before equalization)
    pub noise_variance: f64,
    /// Per-symbol fading coefficients (empty for AWGN)
    pub fading: Vec<Complex>,
}

impl Transmission {
    /// Noise variance seen by each equalized symbol: σ² / |h|².
    pub fn effective_noise_variances(&self) -> Vec<f64> {
        if self.fading.is_empty() {
            return vec![self.noise_variance; self.symbols.len()];
        }
        self.fading
            .iter()
            .map(|h| self.noise_variance / h.norm_sqr().max(FADING_POWER_FLOOR))
            .collect()
    }
}

/// Common interface for channel models.
pub trait ChannelModel: Debug + Send {
    /// Model name
    fn name(&self) -> &str;

    /// Configured SNR in dB
    fn snr_db(&self) -> f64;

    /// Pass one block of symbols through the channel.
    fn transmit(&mut self, symbols: &[Complex]) -> Transmission;

    /// Nominal noise variance for a unit-power signal at the configured SNR
    fn noise_variance(&self) -> f64 {
        1.0 / db_to_linear(self.snr_db())
    }
}

fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

/// Complex Gaussian sample with variance `var` split evenly over I and Q.
fn complex_gaussian(rng: &mut StdRng, var: f64) -> Complex {
    let std = (var / 2.0).sqrt();
    let re: f64 = rng.sample(StandardNormal);
    let im: f64 = rng.sample(StandardNormal);
    Complex::new(re * std, im * std)
}

/// Fade, add noise at the faded power, then divide out the fading.
fn fade_and_equalize(rng: &mut StdRng, snr_linear: f64, symbols: &[Complex], fading: Vec<Complex>) -> Transmission {
    let faded: Vec<Complex> = symbols.iter().zip(&fading).map(|(s, h)| s * h).collect();
    let noise_variance = average_power(&faded) / snr_linear;

    let equalized = faded
        .iter()
        .zip(&fading)
        .map(|(f, h)| {
            let received = f + complex_gaussian(rng, noise_variance);
            received * h.conj() / h.norm_sqr().max(FADING_POWER_FLOOR)
        })
        .collect();

    Transmission {
        symbols: equalized,
        noise_variance,
        fading,
    }
}

/// Additive White Gaussian Noise channel
#[derive(Debug)]
pub struct AwgnChannel {
    snr_db: f64,
    rng: StdRng,
}

impl AwgnChannel {
    pub fn new(snr_db: f64, seed: Option<u64>) -> Self {
        Self {
            snr_db,
            rng: seeded_rng(seed),
        }
    }
}

impl ChannelModel for AwgnChannel {
    fn name(&self) -> &str {
        "AWGN"
    }

    fn snr_db(&self) -> f64 {
        self.snr_db
    }

    fn transmit(&mut self, symbols: &[Complex]) -> Transmission {
        // Noise is scaled to the measured power, not the nominal unit power
        let noise_variance = average_power(symbols) / db_to_linear(self.snr_db);
        let received = symbols
            .iter()
            .map(|&s| s + complex_gaussian(&mut self.rng, noise_variance))
            .collect();

        Transmission {
            symbols: received,
            noise_variance,
            fading: Vec::new(),
        }
    }
}

/// Flat Rayleigh fading with perfect-CSI equalization
#[derive(Debug)]
pub struct RayleighChannel {
    snr_db: f64,
    rng: StdRng,
}

impl RayleighChannel {
    pub fn new(snr_db: f64, seed: Option<u64>) -> Self {
        Self {
            snr_db,
            rng: seeded_rng(seed),
        }
    }
}

impl ChannelModel for RayleighChannel {
    fn name(&self) -> &str {
        "Rayleigh"
    }

    fn snr_db(&self) -> f64 {
        self.snr_db
    }

    fn transmit(&mut self, symbols: &[Complex]) -> Transmission {
        // E[|h|²] = 1
        let fading: Vec<Complex> = (0..symbols.len())
            .map(|_| complex_gaussian(&mut self.rng, 1.0))
            .collect();
        fade_and_equalize(&mut self.rng, db_to_linear(self.snr_db), symbols, fading)
    }
}

/// Flat Rician fading with perfect-CSI equalization
#[derive(Debug)]
pub struct RicianChannel {
    snr_db: f64,
    k_factor_db: f64,
    rng: StdRng,
}

impl RicianChannel {
    pub fn new(snr_db: f64, k_factor_db: f64, seed: Option<u64>) -> Self {
        Self {
            snr_db,
            k_factor_db,
            rng: seeded_rng(seed),
        }
    }

    /// Linear K factor (LOS power over scattered power)
    pub fn k_factor(&self) -> f64 {
        db_to_linear(self.k_factor_db)
    }
}

impl ChannelModel for RicianChannel {
    fn name(&self) -> &str {
        "Rician"
    }

    fn snr_db(&self) -> f64 {
        self.snr_db
    }

    fn transmit(&mut self, symbols: &[Complex]) -> Transmission {
        let k = self.k_factor();
        let los = Complex::new((k / (k + 1.0)).sqrt(), 0.0);
        let scatter_power = 1.0 / (k + 1.0);

        let fading: Vec<Complex> = (0..symbols.len())
            .map(|_| los + complex_gaussian(&mut self.rng, scatter_power))
            .collect();
        fade_and_equalize(&mut self.rng, db_to_linear(self.snr_db), symbols, fading)
    }
}

/// Build a channel model. `k_factor_db` only applies to Rician.
pub fn create_channel_model(kind: ChannelKind, snr_db: f64, k_factor_db: f64, seed: Option<u64>) -> Box<dyn ChannelModel> {
    tracing::debug!(channel = %kind, snr_db, seeded = seed.is_some(), "Channel model constructed");
    match kind {
        ChannelKind::Awgn => Box::new(AwgnChannel::new(snr_db, seed)),
        ChannelKind::Rayleigh => Box::new(RayleighChannel::new(snr_db, seed)),
        ChannelKind::Rician => Box::new(RicianChannel::new(snr_db, k_factor_db, seed)),
    }
}

/// Build a channel model from its string identifier (`"AWGN"`, `"Rayleigh"`, `"Rician"`).
pub fn create_channel_model_by_name(
    name: &str,
    snr_db: f64,
    k_factor_db: f64,
    seed: Option<u64>,
) -> PhyResult<Box<dyn ChannelModel>> {
    Ok(create_channel_model(name.parse()?, snr_db, k_factor_db, seed))
}

/// Complementary error function approximation (Abramowitz and Stegun 7.1.26).
pub fn erfc(x: f64) -> f64 {
    if x < 0.0 {
        return 2.0 - erfc(-x);
    }
    let t = 1.0 / (1.0 + 0.3275911 * x);
    let poly = t * (0.254829592 + t * (-0.284496736 + t * (1.421413741 + t * (-1.453152027 + t * 1.061405429))));
    poly * (-x * x).exp()
}

/// Uncoded AWGN bit error rate at a given Eb/N0.
///
/// QPSK: `0.5·erfc(√(Eb/N0))`. Square M-QAM uses the nearest-neighbour
/// approximation `(2/k)(1 − 1/√M)·erfc(√(3k·Eb/N0 / (2(M−1))))`.
pub fn theoretical_ber_awgn(ebn0_db: f64, modulation: Modulation) -> f64 {
    let ebn0 = db_to_linear(ebn0_db);
    match modulation {
        Modulation::Qpsk => 0.5 * erfc(ebn0.sqrt()),
        _ => {
            let m = modulation.order() as f64;
            let k = modulation.bits_per_symbol() as f64;
            (2.0 / k) * (1.0 - 1.0 / m.sqrt()) * erfc((3.0 * k * ebn0 / (2.0 * (m - 1.0))).sqrt())
        }
    }
}

/// Eb/N0 in dB for a symbol SNR, modulation order and code rate.
pub fn ebn0_from_snr(snr_db: f64, bits_per_symbol: usize, code_rate: f64) -> f64 {
    snr_db - 10.0 * (bits_per_symbol as f64 * code_rate).log10()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_symbols(n: usize) -> Vec<Complex> {
        (0..n)
            .map(|i| {
                let phase = std::f64::consts::FRAC_PI_4 + std::f64::consts::FRAC_PI_2 * (i % 4) as f64;
                Complex::new(phase.cos(), phase.sin())
            })
            .collect()
    }

    #[test]
    fn test_awgn_measured_noise() {
        let mut channel = AwgnChannel::new(10.0, Some(1));
        let samples = unit_symbols(20_000);
        let tx = channel.transmit(&samples);

        assert_eq!(tx.symbols.len(), samples.len());
        assert!(tx.fading.is_empty());
        assert_relative_eq!(tx.noise_variance, 0.1, epsilon = 1e-9);

        let measured: f64 = samples
            .iter()
            .zip(&tx.symbols)
            .map(|(a, b)| (b - a).norm_sqr())
            .sum::<f64>()
            / samples.len() as f64;
        assert!((measured - 0.1).abs() < 0.005, "measured noise {}", measured);
    }

    #[test]
    fn test_awgn_scales_with_signal_power() {
        let mut channel = AwgnChannel::new(0.0, Some(2));
        let loud: Vec<Complex> = unit_symbols(100).iter().map(|s| s * 2.0).collect();
        let tx = channel.transmit(&loud);
        assert_relative_eq!(tx.noise_variance, 4.0, epsilon = 1e-9);
        assert_relative_eq!(channel.noise_variance(), 1.0);
    }

    #[test]
    fn test_seeded_channels_repeat() {
        let samples = unit_symbols(64);
        let a = RayleighChannel::new(5.0, Some(9)).transmit(&samples);
        let b = RayleighChannel::new(5.0, Some(9)).transmit(&samples);
        assert_eq!(a.symbols, b.symbols);
    }

    #[test]
    fn test_fading_redrawn_every_call() {
        let mut channel = RayleighChannel::new(20.0, Some(3));
        let samples = unit_symbols(32);
        let first = channel.transmit(&samples);
        let second = channel.transmit(&samples);
        assert_ne!(first.fading, second.fading);
    }

    #[test]
    fn test_rayleigh_unit_fading_power() {
        let mut channel = RayleighChannel::new(20.0, Some(4));
        let tx = channel.transmit(&unit_symbols(20_000));
        let power = tx.fading.iter().map(|h| h.norm_sqr()).sum::<f64>() / tx.fading.len() as f64;
        assert!((power - 1.0).abs() < 0.05, "fading power {}", power);
    }

    #[test]
    fn test_equalization_recovers_symbols_at_high_snr() {
        for kind in [ChannelKind::Rayleigh, ChannelKind::Rician] {
            let mut channel = create_channel_model(kind, 60.0, 10.0, Some(5));
            let samples = unit_symbols(1000);
            let tx = channel.transmit(&samples);
            // Deep fades amplify the noise, so judge the median error
            let mut errors: Vec<f64> = samples.iter().zip(&tx.symbols).map(|(a, b)| (a - b).norm()).collect();
            errors.sort_by(|a, b| a.total_cmp(b));
            assert!(errors[errors.len() / 2] < 0.01, "{} median error {}", kind, errors[errors.len() / 2]);
        }
    }

    #[test]
    fn test_rician_fading_concentrates_near_los() {
        let mut channel = RicianChannel::new(20.0, 20.0, Some(6));
        let tx = channel.transmit(&unit_symbols(5000));
        let k = channel.k_factor();
        let los = (k / (k + 1.0)).sqrt();
        let mean_re = tx.fading.iter().map(|h| h.re).sum::<f64>() / tx.fading.len() as f64;
        assert!((mean_re - los).abs() < 0.01);
    }

    #[test]
    fn test_effective_noise_variances() {
        let tx = Transmission {
            symbols: vec![Complex::new(1.0, 0.0); 2],
            noise_variance: 0.2,
            fading: vec![Complex::new(0.5, 0.0), Complex::new(0.0, 2.0)],
        };
        let vars = tx.effective_noise_variances();
        assert_relative_eq!(vars[0], 0.8);
        assert_relative_eq!(vars[1], 0.05);
    }

    #[test]
    fn test_factory_by_name() {
        let channel = create_channel_model_by_name("rician", 12.0, 10.0, None).unwrap();
        assert_eq!(channel.name(), "Rician");
        assert_relative_eq!(channel.snr_db(), 12.0);
        assert!(create_channel_model_by_name("Nakagami", 12.0, 10.0, None).is_err());
    }

    #[test]
    fn test_erfc_values() {
        assert_relative_eq!(erfc(0.0), 1.0, epsilon = 1e-6);
        assert_relative_eq!(erfc(1.0), 0.157_299_2, epsilon = 1e-6);
        assert_relative_eq!(erfc(-1.0), 1.842_700_8, epsilon = 1e-6);
    }

    #[test]
    fn test_theoretical_ber() {
        // QPSK at 9.6 dB Eb/N0 is close to 1e-5
        let ber = theoretical_ber_awgn(9.6, Modulation::Qpsk);
        assert!(ber > 5e-6 && ber < 2e-5, "ber {}", ber);

        // Denser constellations need more Eb/N0
        let bers: Vec<f64> = Modulation::ALL.iter().map(|&m| theoretical_ber_awgn(10.0, m)).collect();
        assert!(bers.windows(2).all(|w| w[0] < w[1]), "{:?}", bers);
    }

    #[test]
    fn test_ebn0_from_snr() {
        // Rate-1/2 QPSK carries one info bit per symbol
        assert_relative_eq!(ebn0_from_snr(7.0, 2, 0.5), 7.0, epsilon = 1e-12);
        assert_relative_eq!(ebn0_from_snr(10.0, 4, 0.5), 10.0 - 10.0 * 2.0f64.log10(), epsilon = 1e-12);
    }
}
