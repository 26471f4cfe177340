//! QPSK: two bits per symbol, first bit on I, second bit on Q.
//!
//! ```text
//!            Q
//!      10    |    00
//!       *    |    *
//!   ---------+---------> I
//!       *    |    *
//!      11    |    01
//! ```

use super::{Constellation, Modulator};
use crate::types::Complex;
use std::f64::consts::FRAC_1_SQRT_2;

/// QPSK modulator with an explicit bit-pair table.
#[derive(Debug, Clone)]
pub struct QpskModulator {
    constellation: Constellation,
}

impl QpskModulator {
    /// Unit-energy Gray QPSK.
    pub fn new() -> Self {
        let points = vec![
            Complex::new(FRAC_1_SQRT_2, FRAC_1_SQRT_2),   // 00
            Complex::new(FRAC_1_SQRT_2, -FRAC_1_SQRT_2),  // 01
            Complex::new(-FRAC_1_SQRT_2, FRAC_1_SQRT_2),  // 10
            Complex::new(-FRAC_1_SQRT_2, -FRAC_1_SQRT_2), // 11
        ];
        Self {
            constellation: Constellation::new(points),
        }
    }
}

impl Default for QpskModulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Modulator for QpskModulator {
    fn name(&self) -> &str {
        "QPSK"
    }

    fn constellation(&self) -> &Constellation {
        &self.constellation
    }

    /// Closed form of the max-log metric: `2√2·Re(y)/σ²` and `2√2·Im(y)/σ²`.
    fn demodulate(&self, symbols: &[Complex], noise_variance: f64) -> Vec<f64> {
        let scale = 2.0 * std::f64::consts::SQRT_2 / noise_variance.max(super::NOISE_VARIANCE_FLOOR);
        symbols
            .iter()
            .flat_map(|y| [y.re * scale, y.im * scale])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_explicit_mapping() {
        let q = QpskModulator::new();
        let s = q.modulate(&[0, 0, 0, 1, 1, 0, 1, 1]);
        assert_relative_eq!(s[0].re, FRAC_1_SQRT_2);
        assert_relative_eq!(s[0].im, FRAC_1_SQRT_2);
        assert_relative_eq!(s[1].im, -FRAC_1_SQRT_2);
        assert_relative_eq!(s[2].re, -FRAC_1_SQRT_2);
        assert_relative_eq!(s[3].re, -FRAC_1_SQRT_2);
        assert_relative_eq!(s[3].im, -FRAC_1_SQRT_2);
    }

    #[test]
    fn test_closed_form_matches_exhaustive_search() {
        let q = QpskModulator::new();
        let symbols = vec![
            Complex::new(0.3, -1.2),
            Complex::new(-0.05, 0.4),
            Complex::new(2.0, 0.0),
        ];
        let fast = q.demodulate(&symbols, 0.25);
        let full = q.constellation().max_log_llrs(&symbols, 0.25);
        for (a, b) in fast.iter().zip(&full) {
            assert_relative_eq!(*a, *b, max_relative = 1e-9);
        }
    }
}
