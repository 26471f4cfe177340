//! Square M-QAM with Gray-coded axes
//!
//! A `log2(M)`-bit label splits into an I half (high bits) and a Q half (low
//! bits). Each half is the Gray code of a level index on its axis, so
//! neighbouring points differ in exactly one bit:
//!
//! ```text
//!   16-QAM, I axis (2 bits):
//!
//!   level   0     1     2     3
//!   coord  -3a   -a    +a    +3a
//!   label   00    01    11    10
//! ```
//!
//! With `a = √(3 / (2(M−1)))` the grid has unit average energy.
//!
//! Because the labels are separable, the max-log metric for an I bit only
//! depends on the I coordinate (the Q terms cancel), so demodulation searches
//! `√M` levels per axis instead of all `M` points. The result is identical
//! to the exhaustive search.

use super::{Constellation, Modulator, NOISE_VARIANCE_FLOOR};
use crate::types::{Complex, Modulation};

/// Gray code of `n`
#[inline]
pub fn gray_encode(n: usize) -> usize {
    n ^ (n >> 1)
}

/// Inverse Gray code
#[inline]
pub fn gray_decode(mut g: usize) -> usize {
    let mut n = g;
    while g > 1 {
        g >>= 1;
        n ^= g;
    }
    n
}

/// Square QAM modulator (16, 64, 256, 1024 points).
#[derive(Debug, Clone)]
pub struct QamModulator {
    name: String,
    constellation: Constellation,
    /// Bits per axis
    half_bits: usize,
    /// Axis coordinate of each level index
    levels: Vec<f64>,
    /// Gray label of each level index
    level_labels: Vec<usize>,
}

impl QamModulator {
    /// Build the modulator for a square QAM order. QPSK is accepted and
    /// yields the 4-point Gray grid.
    pub fn new(modulation: Modulation) -> Self {
        let order = modulation.order();
        let half_bits = modulation.bits_per_symbol() / 2;
        let side = 1usize << half_bits;
        let scale = (3.0 / (2.0 * (order as f64 - 1.0))).sqrt();

        let levels: Vec<f64> = (0..side)
            .map(|l| (2.0 * l as f64 - (side as f64 - 1.0)) * scale)
            .collect();
        let level_labels: Vec<usize> = (0..side).map(gray_encode).collect();

        let points = (0..order)
            .map(|label| {
                let i_level = gray_decode(label >> half_bits);
                let q_level = gray_decode(label & (side - 1));
                Complex::new(levels[i_level], levels[q_level])
            })
            .collect();

        Self {
            name: modulation.to_string(),
            constellation: Constellation::new(points),
            half_bits,
            levels,
            level_labels,
        }
    }

    /// Per-axis max-log LLRs for the `half_bits` bits carried by one axis.
    fn axis_llrs(&self, y: f64, inv_var: f64, out: &mut Vec<f64>) {
        for pos in 0..self.half_bits {
            let shift = self.half_bits - 1 - pos;
            let mut min0 = f64::INFINITY;
            let mut min1 = f64::INFINITY;
            for (&x, &label) in self.levels.iter().zip(&self.level_labels) {
                let d = (y - x) * (y - x);
                if (label >> shift) & 1 == 1 {
                    min1 = min1.min(d);
                } else {
                    min0 = min0.min(d);
                }
            }
            out.push((min1 - min0) * inv_var);
        }
    }
}

impl Modulator for QamModulator {
    fn name(&self) -> &str {
        &self.name
    }

    fn constellation(&self) -> &Constellation {
        &self.constellation
    }

    fn demodulate(&self, symbols: &[Complex], noise_variance: f64) -> Vec<f64> {
        let inv_var = 1.0 / noise_variance.max(NOISE_VARIANCE_FLOOR);
        let mut llrs = Vec::with_capacity(symbols.len() * 2 * self.half_bits);
        for y in symbols {
            self.axis_llrs(y.re, inv_var, &mut llrs);
            self.axis_llrs(y.im, inv_var, &mut llrs);
        }
        llrs
    }

    fn hard_demodulate(&self, symbols: &[Complex]) -> Vec<usize> {
        let nearest = |v: f64| {
            self.levels
                .iter()
                .enumerate()
                .min_by(|a, b| (v - a.1).abs().total_cmp(&(v - b.1).abs()))
                .map_or(0, |(l, _)| self.level_labels[l])
        };
        symbols
            .iter()
            .map(|y| (nearest(y.re) << self.half_bits) | nearest(y.im))
            .collect()
    }
}
