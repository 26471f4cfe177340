//! Digital Modulation: QPSK and square M-QAM with max-log soft demapping
//!
//! Every scheme is described by a [`Constellation`]: a table of
//! unit-average-power points indexed by the integer value of the bit group
//! (MSB first), so mapping is a direct array lookup.
//!
//! ## Soft Demapping
//!
//! For received symbol `y`, bit position `i` and noise variance `σ²`:
//!
//! ```text
//!   LLR_i = ( min_{x: b_i(x)=1} |y − x|²  −  min_{x: b_i(x)=0} |y − x|² ) / σ²
//! ```
//!
//! This is the max-log approximation. Positive means bit 0 is more likely.
//! `σ²` is clamped to [`NOISE_VARIANCE_FLOOR`] so a noiseless channel never
//! produces infinities.
//!
//! ## Example
//!
//! ```rust
//! use phylink_core::modulation::create_modulator;
//! use phylink_core::types::Modulation;
//!
//! let qam = create_modulator(Modulation::Qam16);
//! let bits = vec![1, 0, 1, 1, 0, 0, 1, 0];
//! let symbols = qam.modulate(&bits);
//! assert_eq!(symbols.len(), 2);
//!
//! let llrs = qam.demodulate(&symbols, 0.01);
//! let hard: Vec<u8> = llrs.iter().map(|&l| (l < 0.0) as u8).collect();
//! assert_eq!(hard, bits);
//! ```

pub mod qam;
pub mod qpsk;

pub use qam::QamModulator;
pub use qpsk::QpskModulator;

use crate::error::PhyResult;
use crate::types::{pad_to_multiple, Complex, Modulation};
use std::fmt::Debug;

/// Smallest noise variance used when scaling LLRs
pub const NOISE_VARIANCE_FLOOR: f64 = 1e-10;

/// Ordered set of constellation points, indexed by bit-group value.
#[derive(Debug, Clone)]
pub struct Constellation {
    points: Vec<Complex>,
    bits_per_symbol: usize,
}

impl Constellation {
    /// Wrap a point table. `points.len()` must be a power of two.
    pub fn new(points: Vec<Complex>) -> Self {
        let bits_per_symbol = points.len().trailing_zeros() as usize;
        Self {
            points,
            bits_per_symbol,
        }
    }

    /// Points in label order
    pub fn points(&self) -> &[Complex] {
        &self.points
    }

    /// Number of points M
    pub fn order(&self) -> usize {
        self.points.len()
    }

    /// log2(M)
    pub fn bits_per_symbol(&self) -> usize {
        self.bits_per_symbol
    }

    /// Mean |x|² over the set
    pub fn average_energy(&self) -> f64 {
        crate::types::average_power(&self.points)
    }

    /// Value of bit `pos` (MSB first) within label `label`
    #[inline]
    pub fn label_bit(&self, label: usize, pos: usize) -> u8 {
        ((label >> (self.bits_per_symbol - 1 - pos)) & 1) as u8
    }

    /// Bit group (MSB first) to label
    #[inline]
    pub fn label_of(bits: &[u8]) -> usize {
        bits.iter().fold(0usize, |acc, &b| (acc << 1) | (b & 1) as usize)
    }

    /// Map a bit stream onto points, zero-padding to whole symbols.
    pub fn map_bits(&self, bits: &[u8]) -> Vec<Complex> {
        pad_to_multiple(bits, self.bits_per_symbol)
            .chunks(self.bits_per_symbol)
            .map(|group| self.points[Self::label_of(group)])
            .collect()
    }

    /// Exhaustive max-log LLRs over every point.
    pub fn max_log_llrs(&self, symbols: &[Complex], noise_variance: f64) -> Vec<f64> {
        let inv_var = 1.0 / noise_variance.max(NOISE_VARIANCE_FLOOR);
        let bps = self.bits_per_symbol;
        let mut llrs = Vec::with_capacity(symbols.len() * bps);
        let mut min0 = vec![f64::INFINITY; bps];
        let mut min1 = vec![f64::INFINITY; bps];

        for &y in symbols {
            min0.fill(f64::INFINITY);
            min1.fill(f64::INFINITY);
            for (label, &x) in self.points.iter().enumerate() {
                let d = (y - x).norm_sqr();
                for pos in 0..bps {
                    let slot = if self.label_bit(label, pos) == 1 {
                        &mut min1[pos]
                    } else {
                        &mut min0[pos]
                    };
                    if d < *slot {
                        *slot = d;
                    }
                }
            }
            llrs.extend((0..bps).map(|pos| (min1[pos] - min0[pos]) * inv_var));
        }

        llrs
    }

    /// Nearest-point label for each symbol
    pub fn nearest_labels(&self, symbols: &[Complex]) -> Vec<usize> {
        symbols
            .iter()
            .map(|&y| {
                self.points
                    .iter()
                    .enumerate()
                    .map(|(label, &x)| (label, (y - x).norm_sqr()))
                    .min_by(|a, b| a.1.total_cmp(&b.1))
                    .map_or(0, |(label, _)| label)
            })
            .collect()
    }
}

/// Common interface for modulators.
pub trait Modulator: Debug + Send + Sync {
    /// Scheme name (e.g. "16QAM")
    fn name(&self) -> &str;

    /// The point table
    fn constellation(&self) -> &Constellation;

    /// Bits carried per symbol
    fn bits_per_symbol(&self) -> usize {
        self.constellation().bits_per_symbol()
    }

    /// Map bits to symbols. Bits are zero-padded to whole symbols.
    fn modulate(&self, bits: &[u8]) -> Vec<Complex> {
        self.constellation().map_bits(bits)
    }

    /// Max-log LLRs, `bits_per_symbol` per received symbol.
    fn demodulate(&self, symbols: &[Complex], noise_variance: f64) -> Vec<f64> {
        self.constellation().max_log_llrs(symbols, noise_variance)
    }

    /// Nearest-point labels, for symbol error counting.
    fn hard_demodulate(&self, symbols: &[Complex]) -> Vec<usize> {
        self.constellation().nearest_labels(symbols)
    }
}

/// Build the modulator for a scheme.
pub fn create_modulator(modulation: Modulation) -> Box<dyn Modulator> {
    match modulation {
        Modulation::Qpsk => Box::new(QpskModulator::new()),
        Modulation::Qam16 | Modulation::Qam64 | Modulation::Qam256 | Modulation::Qam1024 => {
            Box::new(QamModulator::new(modulation))
        }
    }
}

/// Build a modulator from its string identifier (`"QPSK"`, `"64QAM"`, ...).
pub fn create_modulator_by_name(name: &str) -> PhyResult<Box<dyn Modulator>> {
    Ok(create_modulator(name.parse()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PhyError;
    use approx::assert_relative_eq;

    #[test]
    fn test_constellation_power_all_orders() {
        for &m in Modulation::ALL {
            let modulator = create_modulator(m);
            let c = modulator.constellation();
            assert_eq!(c.order(), m.order());
            assert_relative_eq!(c.average_energy(), 1.0, max_relative = 0.01);
        }
    }

    #[test]
    fn test_noiseless_hard_roundtrip_all_orders() {
        for &m in Modulation::ALL {
            let modulator = create_modulator(m);
            let bps = modulator.bits_per_symbol();
            let bits: Vec<u8> = (0..bps * 40).map(|i| ((i * 5 + i / 3) % 2) as u8).collect();
            let symbols = modulator.modulate(&bits);
            assert_eq!(symbols.len(), 40);
            let llrs = modulator.demodulate(&symbols, 0.0);
            assert!(llrs.iter().all(|l| l.is_finite()), "{} finite", m);
            let hard: Vec<u8> = llrs.iter().map(|&l| u8::from(l < 0.0)).collect();
            assert_eq!(hard, bits, "{} round trip", m);
        }
    }

    #[test]
    fn test_padding_to_whole_symbols() {
        let modulator = create_modulator(Modulation::Qam64);
        let symbols = modulator.modulate(&[1, 1, 1, 1, 1, 1, 1]);
        assert_eq!(symbols.len(), 2);
        assert_eq!(modulator.demodulate(&symbols, 0.1).len(), 12);
    }

    #[test]
    fn test_llr_magnitude_scales_with_noise() {
        let modulator = create_modulator(Modulation::Qpsk);
        let symbols = modulator.modulate(&[0, 1]);
        let quiet = modulator.demodulate(&symbols, 0.1);
        let loud = modulator.demodulate(&symbols, 1.0);
        assert_relative_eq!(quiet[0], 10.0 * loud[0], max_relative = 1e-9);
        assert!(quiet[0] > 0.0 && quiet[1] < 0.0);
    }

    #[test]
    fn test_hard_demodulate_labels() {
        let modulator = create_modulator(Modulation::Qam16);
        let bits = vec![0, 0, 0, 1, 1, 1, 1, 0];
        let labels = modulator.hard_demodulate(&modulator.modulate(&bits));
        assert_eq!(labels, vec![0b0001, 0b1110]);
    }

    #[test]
    fn test_factory_by_name() {
        assert_eq!(create_modulator_by_name("256qam").unwrap().bits_per_symbol(), 8);
        assert!(matches!(
            create_modulator_by_name("8PSK"),
            Err(PhyError::UnknownIdentifier { .. })
        ));
    }
}
