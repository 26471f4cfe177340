//! Polar Code Encoder/Decoder
//!
//! Polar codes achieve channel capacity with successive cancellation (SC)
//! decoding. The transform is the `m`-fold Kronecker power of
//! `F = [[1,0],[1,1]]`, applied in place as Arikan's butterfly.
//!
//! ## Channel Construction
//!
//! Bit-channels are ranked by their Bhattacharyya parameter at a design SNR.
//! One polarization step turns two copies of a channel with parameter `z`
//! into a worse channel `2z − z²` (the left half, decoded with the
//! f-function) and a better channel `z²` (the right half, decoded with the
//! g-function). The `n−k` least reliable positions are frozen to zero. The
//! recursion runs in the log domain so long codes never underflow to ties.
//!
//! ## Example
//!
//! ```rust
//! use phylink_core::codec::{ChannelCodec, CodecParams, PolarCodec};
//!
//! let codec = PolarCodec::new(&CodecParams::with_block_length(16)).unwrap();
//! let info = vec![1, 0, 1, 1, 0, 1, 0, 1];
//! let codeword = codec.encode_block(&info);
//! assert_eq!(codeword.len(), 16);
//!
//! let llrs: Vec<f64> = codeword.iter().map(|&b| if b == 1 { -3.0 } else { 3.0 }).collect();
//! assert_eq!(codec.decode_block(&llrs, &[]).bits, info);
//! ```

use super::{BlockDecode, ChannelCodec, CodecParams};
use crate::error::{PhyError, PhyResult};
use crate::types::db_to_linear;

/// Polar codec with Bhattacharyya frozen-set selection and SC decoding.
#[derive(Debug, Clone)]
pub struct PolarCodec {
    n: usize,
    k: usize,
    /// `true` where the u-domain position is frozen
    frozen_mask: Vec<bool>,
    /// Information bit positions (sorted)
    info_positions: Vec<usize>,
}

impl PolarCodec {
    /// Build a code of length `next_power_of_two(block_length)` with
    /// `k = floor(n * rate)` information bits.
    pub fn new(params: &CodecParams) -> PhyResult<Self> {
        let n = params.block_length.next_power_of_two();
        let k = (n as f64 * params.code_rate).floor() as usize;
        if k == 0 || k >= n {
            return Err(PhyError::config(
                "code_rate",
                params.code_rate,
                format!("gives k = {} for n = {}", k, n),
            ));
        }

        let log_z = bhattacharyya_log(n, params.polar_design_snr_db);
        Ok(Self::with_reliability(n, k, &log_z))
    }

    /// Build a code that keeps the `k` positions with the lowest score.
    pub fn with_reliability(n: usize, k: usize, scores: &[f64]) -> Self {
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]).then(b.cmp(&a)));

        let mut frozen_mask = vec![true; n];
        for &pos in &order[..k] {
            frozen_mask[pos] = false;
        }
        let info_positions: Vec<usize> = (0..n).filter(|&i| !frozen_mask[i]).collect();

        Self {
            n,
            k,
            frozen_mask,
            info_positions,
        }
    }

    /// Information bit positions in the u-domain
    pub fn info_positions(&self) -> &[usize] {
        &self.info_positions
    }

    /// Frozen bit positions in the u-domain
    pub fn frozen_positions(&self) -> Vec<usize> {
        (0..self.n).filter(|&i| self.frozen_mask[i]).collect()
    }
}

impl ChannelCodec for PolarCodec {
    fn name(&self) -> &str {
        "Polar"
    }

    fn n(&self) -> usize {
        self.n
    }

    fn k(&self) -> usize {
        self.k
    }

    fn encode_block(&self, info: &[u8]) -> Vec<u8> {
        let mut u = vec![0u8; self.n];
        for (&pos, &bit) in self.info_positions.iter().zip(info) {
            u[pos] = bit & 1;
        }
        polar_transform(&mut u);
        u
    }

    fn decode_block(&self, llrs: &[f64], prior: &[f64]) -> BlockDecode {
        let mut leaf_prior = vec![0.0; self.n];
        for (&pos, &p) in self.info_positions.iter().zip(prior) {
            leaf_prior[pos] = p;
        }

        let u = sc_decode_recursive(&llrs[..self.n], &self.frozen_mask, &leaf_prior);
        BlockDecode {
            bits: self.info_positions.iter().map(|&pos| u[pos]).collect(),
            converged: None,
            iterations: 0,
        }
    }
}

/// Log-domain Bhattacharyya parameters for each u-domain position.
///
/// Lower is more reliable.
pub fn bhattacharyya_log(n: usize, design_snr_db: f64) -> Vec<f64> {
    let log_z0 = -db_to_linear(design_snr_db);
    let mut out = Vec::with_capacity(n);
    polarize(n, log_z0, &mut out);
    out
}

fn polarize(n: usize, log_z: f64, out: &mut Vec<f64>) {
    if n == 1 {
        out.push(log_z);
        return;
    }
    // ln(2z - z²) = ln z + ln(2 - z)
    let worse = log_z + (2.0 - log_z.exp()).ln();
    let better = 2.0 * log_z;
    polarize(n / 2, worse, out);
    polarize(n / 2, better, out);
}

/// Upper-branch LLR: sign product, smaller magnitude.
#[inline]
fn check_combine(a: f64, b: f64) -> f64 {
    a.signum() * b.signum() * a.abs().min(b.abs())
}

/// Lower-branch LLR given the partial sum `v` fed back from the upper branch.
#[inline]
fn bit_combine(a: f64, b: f64, v: u8) -> f64 {
    if v == 1 {
        b - a
    } else {
        b + a
    }
}

/// Successive cancellation over one (sub)block. `prior` holds the a-priori
/// LLR of each leaf and is added only at information leaves.
fn sc_decode_recursive(channel_llrs: &[f64], frozen_mask: &[bool], prior: &[f64]) -> Vec<u8> {
    if let [llr] = channel_llrs {
        let info = !frozen_mask[0] && llr + prior[0] < 0.0;
        return vec![u8::from(info)];
    }

    let half = channel_llrs.len() / 2;
    let (upper, lower) = channel_llrs.split_at(half);
    let (frozen_upper, frozen_lower) = frozen_mask.split_at(half);
    let (prior_upper, prior_lower) = prior.split_at(half);

    let upper_llrs: Vec<f64> = upper.iter().zip(lower).map(|(&a, &b)| check_combine(a, b)).collect();
    let mut decided = sc_decode_recursive(&upper_llrs, frozen_upper, prior_upper);

    // Partial sums of the upper half as seen by the lower half
    let mut partial = decided.clone();
    polar_transform(&mut partial);

    let lower_llrs: Vec<f64> = upper
        .iter()
        .zip(lower)
        .zip(&partial)
        .map(|((&a, &b), &v)| bit_combine(a, b, v))
        .collect();
    decided.extend(sc_decode_recursive(&lower_llrs, frozen_lower, prior_lower));
    decided
}

/// Apply the polar transform (Arikan's butterfly) in-place.
pub fn polar_transform(bits: &mut [u8]) {
    let n = bits.len();
    let mut step = 1;
    while step < n {
        for i in (0..n).step_by(2 * step) {
            for j in 0..step {
                bits[i + j] ^= bits[i + j + step];
            }
        }
        step *= 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec(n: usize) -> PolarCodec {
        PolarCodec::new(&CodecParams::with_block_length(n)).unwrap()
    }

    fn clean_llrs(codeword: &[u8]) -> Vec<f64> {
        codeword.iter().map(|&b| if b == 1 { -5.0 } else { 5.0 }).collect()
    }

    #[test]
    fn test_block_length_rounds_up() {
        let c = PolarCodec::new(&CodecParams::with_block_length(600)).unwrap();
        assert_eq!(c.n(), 1024);
        assert_eq!(c.k(), 512);
        assert_eq!(c.info_positions().len() + c.frozen_positions().len(), 1024);
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let c = codec(256);
        let info: Vec<u8> = (0..c.k()).map(|i| ((i * 13) % 7 < 3) as u8).collect();
        let codeword = c.encode_block(&info);
        assert_eq!(c.decode_block(&clean_llrs(&codeword), &[]).bits, info);
    }

    #[test]
    fn test_all_zero_and_all_one_info() {
        let c = codec(64);
        assert!(c.encode_block(&vec![0; c.k()]).iter().all(|&b| b == 0));
        let ones = vec![1u8; c.k()];
        assert_eq!(c.decode_block(&clean_llrs(&c.encode_block(&ones)), &[]).bits, ones);
    }

    #[test]
    fn test_polar_transform() {
        // N=2: [u0^u1, u1]
        let mut bits = vec![1, 1];
        polar_transform(&mut bits);
        assert_eq!(bits, vec![0, 1]);

        // N=4 with u = [0,0,0,1] gives the last row of F⊗F = all ones
        let mut bits = vec![0, 0, 0, 1];
        polar_transform(&mut bits);
        assert_eq!(bits, vec![1, 1, 1, 1]);
    }

    #[test]
    fn test_branch_combination() {
        assert_eq!(check_combine(3.0, 5.0), 3.0);
        assert_eq!(check_combine(-3.0, 5.0), -3.0);
        assert_eq!(check_combine(-3.0, -2.0), 2.0);
        assert_eq!(bit_combine(3.0, 5.0, 0), 8.0);
        assert_eq!(bit_combine(3.0, 5.0, 1), 2.0);
    }

    #[test]
    fn test_reliability_ordering_is_not_raw_index() {
        let c = codec(8);
        // Position 7 (all-better path) is the most reliable, 0 the least.
        assert!(c.info_positions().contains(&7));
        assert!(c.frozen_positions().contains(&0));
        // For N=8, K=4 the polarized set is {3, 5, 6, 7}, not {4, 5, 6, 7}.
        assert_eq!(c.info_positions(), &[3, 5, 6, 7]);
    }

    #[test]
    fn test_bhattacharyya_extremes() {
        let log_z = bhattacharyya_log(16, 0.0);
        assert_eq!(log_z.len(), 16);
        let min_idx = (0..16).min_by(|&a, &b| log_z[a].total_cmp(&log_z[b])).unwrap();
        let max_idx = (0..16).max_by(|&a, &b| log_z[a].total_cmp(&log_z[b])).unwrap();
        assert_eq!(min_idx, 15);
        assert_eq!(max_idx, 0);
    }

    #[test]
    fn test_sc_corrects_single_weak_error() {
        let c = codec(128);
        let info: Vec<u8> = (0..c.k()).map(|i| (i % 4 == 1) as u8).collect();
        let codeword = c.encode_block(&info);
        let mut llrs = clean_llrs(&codeword);
        llrs[40] = if codeword[40] == 1 { 0.5 } else { -0.5 };
        assert_eq!(c.decode_block(&llrs, &[]).bits, info);
    }

    #[test]
    fn test_prior_breaks_erasure() {
        let c = codec(16);
        let info = vec![1, 0, 1, 1, 0, 1, 0, 1];
        // Fully erased channel: only the prior carries information.
        let llrs = vec![0.0; 16];
        let prior: Vec<f64> = info.iter().map(|&b| if b == 1 { -2.0 } else { 2.0 }).collect();
        assert_eq!(c.decode_block(&llrs, &prior).bits, info);
    }
}
