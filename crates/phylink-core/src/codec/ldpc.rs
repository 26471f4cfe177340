//! LDPC Codec: Low-Density Parity-Check encoder/decoder
//!
//! The parity-check matrix has the shape `H = [A | B]` where `A` is an
//! `(n-k) x k` sparse matrix with a fixed number of ones per column, spread
//! evenly over the rows, and `B` is a dual-diagonal (accumulator) matrix. That
//! structure makes the code systematic and lets the parity bits be solved one
//! check at a time, which is how the generator rows are derived.
//!
//! ```text
//!          info (k)            parity (n-k)
//!   ┌──────────────────┬─────────────────────┐
//!   │ 1 . . 1 . . 1 .  │ 1 . . . . . . . . . │
//!   │ . 1 . . . 1 . .  │ 1 1 . . . . . . . . │
//!   │ . . 1 . 1 . . 1  │ . 1 1 . . . . . . . │
//!   │       ...        │        ...          │
//!   └──────────────────┴─────────────────────┘
//! ```
//!
//! Decoding is iterative belief propagation (sum-product, or scaled min-sum)
//! with an early exit as soon as the hard decision satisfies every check. A
//! block that never converges returns its last hard decision.
//!
//! ## Example
//!
//! ```rust
//! use phylink_core::codec::{ChannelCodec, CodecParams, LdpcCodec};
//!
//! let codec = LdpcCodec::new(&CodecParams::with_block_length(128)).unwrap();
//! let info: Vec<u8> = (0..codec.k()).map(|i| (i % 3 == 0) as u8).collect();
//! let codeword = codec.encode_block(&info);
//! assert!(codec.parity_check().is_valid(&codeword));
//! ```

use super::{BlockDecode, ChannelCodec, CodecParams};
use crate::error::{PhyError, PhyResult};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Parity-check matrix H stored as adjacency lists in both directions.
#[derive(Debug, Clone)]
pub struct SparseParityCheck {
    /// Check nodes (rows of H)
    pub num_checks: usize,
    /// Variable nodes, i.e. codeword bits (columns of H)
    pub num_vars: usize,
    /// Bit positions taking part in each check
    pub check_to_var: Vec<Vec<usize>>,
    /// Checks each bit position takes part in
    pub var_to_check: Vec<Vec<usize>>,
}

impl SparseParityCheck {
    /// Build from 0/1 rows of H.
    pub fn from_dense(matrix: &[Vec<u8>]) -> Self {
        let num_checks = matrix.len();
        let num_vars = matrix.first().map_or(0, Vec::len);
        let mut check_to_var = vec![Vec::new(); num_checks];

        for (r, row) in matrix.iter().enumerate() {
            for (c, &val) in row.iter().enumerate() {
                if val != 0 {
                    check_to_var[r].push(c);
                }
            }
        }

        Self::from_rows(num_vars, check_to_var)
    }

    fn from_rows(num_vars: usize, mut check_to_var: Vec<Vec<usize>>) -> Self {
        let mut var_to_check = vec![Vec::new(); num_vars];
        for (ci, vars) in check_to_var.iter_mut().enumerate() {
            vars.sort_unstable();
            for &v in vars.iter() {
                var_to_check[v].push(ci);
            }
        }
        Self {
            num_checks: check_to_var.len(),
            num_vars,
            check_to_var,
            var_to_check,
        }
    }

    /// Build the `[A | B]` accumulator structure for `k` info bits and `m`
    /// checks. Every info column gets `column_weight` distinct checks.
    pub fn accumulator(k: usize, m: usize, column_weight: usize, rng: &mut StdRng) -> Self {
        let column_weight = column_weight.clamp(1, m);
        let mut check_to_var: Vec<Vec<usize>> = vec![Vec::new(); m];
        let mut column_rows: Vec<Vec<usize>> = vec![Vec::with_capacity(column_weight); k];
        let mut perm: Vec<usize> = (0..k).collect();

        for _ in 0..column_weight {
            perm.shuffle(rng);
            for (col, &slot) in perm.iter().enumerate() {
                // Spread each layer evenly over the rows; on collision walk to
                // the next free row.
                let mut row = slot * m / k;
                while column_rows[col].contains(&row) {
                    row = (row + 1) % m;
                }
                column_rows[col].push(row);
                check_to_var[row].push(col);
            }
        }

        for (ci, vars) in check_to_var.iter_mut().enumerate() {
            if ci > 0 {
                vars.push(k + ci - 1);
            }
            vars.push(k + ci);
        }

        Self::from_rows(k + m, check_to_var)
    }

    /// Code rate k/n.
    pub fn rate(&self) -> f64 {
        if self.num_vars == 0 {
            return 0.0;
        }
        self.info_len() as f64 / self.num_vars as f64
    }

    /// k = n - m, assuming H has full rank.
    pub fn info_len(&self) -> usize {
        self.num_vars.saturating_sub(self.num_checks)
    }

    /// Total number of ones in H.
    pub fn num_edges(&self) -> usize {
        self.check_to_var.iter().map(Vec::len).sum()
    }

    /// Check syndrome: H * codeword (mod 2).
    pub fn syndrome(&self, codeword: &[u8]) -> Vec<u8> {
        self.check_to_var
            .iter()
            .map(|vars| vars.iter().fold(0u8, |acc, &v| acc ^ (codeword.get(v).copied().unwrap_or(0) & 1)))
            .collect()
    }

    /// True when `codeword` has length n and satisfies every check.
    pub fn is_valid(&self, codeword: &[u8]) -> bool {
        codeword.len() == self.num_vars
            && self
                .check_to_var
                .iter()
                .all(|vars| vars.iter().fold(0u8, |acc, &v| acc ^ (codeword[v] & 1)) == 0)
    }
}

/// Check-node update rule for belief propagation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodingAlgorithm {
    /// Sum-Product (Belief Propagation): optimal but slower.
    SumProduct,
    /// Min-Sum with scaling factor: faster approximation.
    MinSum { scale: f64 },
}

/// Systematic LDPC codec with a BP decoder.
#[derive(Debug, Clone)]
pub struct LdpcCodec {
    h: SparseParityCheck,
    /// Generator rows packed 64 bits per word, one row per info bit
    generator: Vec<Vec<u64>>,
    algorithm: DecodingAlgorithm,
    max_iterations: usize,
    /// First flat edge index of each check
    edge_start: Vec<usize>,
    /// Variable node of each flat edge
    edge_var: Vec<usize>,
    /// Flat edge indices touching each variable node
    var_edges: Vec<Vec<usize>>,
}

const WORD_BITS: usize = 64;

impl LdpcCodec {
    /// Build the code. `k = floor(n * rate)`.
    pub fn new(params: &CodecParams) -> PhyResult<Self> {
        let n = params.block_length;
        let k = (n as f64 * params.code_rate).floor() as usize;
        if k == 0 || k >= n {
            return Err(PhyError::config(
                "code_rate",
                params.code_rate,
                format!("gives k = {} for n = {}", k, n),
            ));
        }

        let mut rng = StdRng::seed_from_u64(params.ldpc_seed);
        let h = SparseParityCheck::accumulator(k, n - k, params.ldpc_column_weight, &mut rng);
        Ok(Self::from_parity_check(h, params.ldpc_algorithm, params.ldpc_max_iterations))
    }

    /// Build a codec around an existing parity-check matrix whose parity
    /// columns (the last `n-k`) are lower triangular with a unit diagonal.
    pub fn from_parity_check(h: SparseParityCheck, algorithm: DecodingAlgorithm, max_iterations: usize) -> Self {
        let mut edge_start = Vec::with_capacity(h.num_checks + 1);
        let mut edge_var = Vec::with_capacity(h.num_edges());
        let mut var_edges = vec![Vec::new(); h.num_vars];
        for vars in &h.check_to_var {
            edge_start.push(edge_var.len());
            for &v in vars {
                var_edges[v].push(edge_var.len());
                edge_var.push(v);
            }
        }
        edge_start.push(edge_var.len());

        let mut codec = Self {
            h,
            generator: Vec::new(),
            algorithm,
            max_iterations: max_iterations.max(1),
            edge_start,
            edge_var,
            var_edges,
        };
        codec.generator = codec.build_generator();
        codec
    }

    /// The parity-check matrix
    pub fn parity_check(&self) -> &SparseParityCheck {
        &self.h
    }

    /// Iteration cap
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Solve the parity bits check by check: `[info | parity]`.
    fn encode_systematic(&self, info: &[u8]) -> Vec<u8> {
        let k = self.h.info_len();
        let n = self.h.num_vars;
        let mut codeword = vec![0u8; n];
        codeword[..k].copy_from_slice(&info[..k]);

        for (ci, vars) in self.h.check_to_var.iter().enumerate() {
            let parity_idx = k + ci;
            let sum = vars
                .iter()
                .filter(|&&v| v != parity_idx)
                .fold(0u8, |acc, &v| acc ^ codeword[v]);
            codeword[parity_idx] = sum;
        }

        codeword
    }

    fn build_generator(&self) -> Vec<Vec<u64>> {
        let k = self.h.info_len();
        let words = self.h.num_vars.div_ceil(WORD_BITS);
        let mut unit = vec![0u8; k];
        (0..k)
            .map(|i| {
                unit[i] = 1;
                let row = self.encode_systematic(&unit);
                unit[i] = 0;
                let mut packed = vec![0u64; words];
                for (j, &b) in row.iter().enumerate() {
                    if b == 1 {
                        packed[j / WORD_BITS] |= 1 << (j % WORD_BITS);
                    }
                }
                packed
            })
            .collect()
    }

    fn check_update(&self, v2c: &[f64], c2v: &mut [f64]) {
        for ci in 0..self.h.num_checks {
            let edges = self.edge_start[ci]..self.edge_start[ci + 1];
            match self.algorithm {
                DecodingAlgorithm::SumProduct => {
                    for e in edges.clone() {
                        let mut product = 1.0f64;
                        for other in edges.clone() {
                            if other != e {
                                product *= (v2c[other] / 2.0).tanh();
                            }
                        }
                        c2v[e] = 2.0 * product.clamp(-1.0 + 1e-15, 1.0 - 1e-15).atanh();
                    }
                }
                DecodingAlgorithm::MinSum { scale } => {
                    let mut min1 = f64::MAX;
                    let mut min2 = f64::MAX;
                    let mut min_edge = usize::MAX;
                    let mut negative = false;
                    for e in edges.clone() {
                        let x = v2c[e];
                        negative ^= x < 0.0;
                        let abs_x = x.abs();
                        if abs_x < min1 {
                            min2 = min1;
                            min1 = abs_x;
                            min_edge = e;
                        } else if abs_x < min2 {
                            min2 = abs_x;
                        }
                    }
                    for e in edges {
                        let magnitude = if e == min_edge { min2 } else { min1 };
                        let sign_negative = negative ^ (v2c[e] < 0.0);
                        let value = scale * magnitude;
                        c2v[e] = if sign_negative { -value } else { value };
                    }
                }
            }
        }
    }
}

impl ChannelCodec for LdpcCodec {
    fn name(&self) -> &str {
        "LDPC"
    }

    fn n(&self) -> usize {
        self.h.num_vars
    }

    fn k(&self) -> usize {
        self.h.info_len()
    }

    /// GF(2) product of the info bits with the generator.
    fn encode_block(&self, info: &[u8]) -> Vec<u8> {
        let n = self.h.num_vars;
        let mut acc = vec![0u64; n.div_ceil(WORD_BITS)];
        for (row, _) in self.generator.iter().zip(info).filter(|&(_, &b)| b == 1) {
            for (a, &w) in acc.iter_mut().zip(row) {
                *a ^= w;
            }
        }
        (0..n)
            .map(|j| ((acc[j / WORD_BITS] >> (j % WORD_BITS)) & 1) as u8)
            .collect()
    }

    /// BP decode of channel LLRs (positive favors bit 0).
    fn decode_block(&self, llrs: &[f64], prior: &[f64]) -> BlockDecode {
        let n = self.h.num_vars;
        let k = self.h.info_len();

        let mut channel: Vec<f64> = llrs[..n].to_vec();
        for (c, &p) in channel.iter_mut().zip(prior) {
            *c += p;
        }

        let mut hard: Vec<u8> = channel.iter().map(|&l| u8::from(l < 0.0)).collect();
        if self.h.is_valid(&hard) {
            hard.truncate(k);
            return BlockDecode {
                bits: hard,
                converged: Some(true),
                iterations: 0,
            };
        }

        let mut v2c: Vec<f64> = self.edge_var.iter().map(|&v| channel[v]).collect();
        let mut c2v = vec![0.0f64; v2c.len()];
        let mut total = channel.clone();
        let mut iterations = 0;

        for iter in 0..self.max_iterations {
            iterations = iter + 1;
            self.check_update(&v2c, &mut c2v);

            for (vi, edges) in self.var_edges.iter().enumerate() {
                total[vi] = channel[vi] + edges.iter().map(|&e| c2v[e]).sum::<f64>();
            }
            for (e, &vi) in self.edge_var.iter().enumerate() {
                v2c[e] = total[vi] - c2v[e];
            }

            for (h, &t) in hard.iter_mut().zip(&total) {
                *h = u8::from(t < 0.0);
            }
            if self.h.is_valid(&hard) {
                hard.truncate(k);
                return BlockDecode {
                    bits: hard,
                    converged: Some(true),
                    iterations,
                };
            }
        }

        hard.truncate(k);
        BlockDecode {
            bits: hard,
            converged: Some(false),
            iterations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hamming_7_4() -> SparseParityCheck {
        SparseParityCheck::from_dense(&[
            vec![1, 1, 0, 1, 1, 0, 0],
            vec![1, 0, 1, 1, 0, 1, 0],
            vec![0, 1, 1, 1, 0, 0, 1],
        ])
    }

    fn clean_llrs(codeword: &[u8], magnitude: f64) -> Vec<f64> {
        codeword.iter().map(|&b| if b == 1 { -magnitude } else { magnitude }).collect()
    }

    fn small_codec(algorithm: DecodingAlgorithm) -> LdpcCodec {
        let params = CodecParams {
            block_length: 256,
            ldpc_algorithm: algorithm,
            ..Default::default()
        };
        LdpcCodec::new(&params).unwrap()
    }

    #[test]
    fn test_dimensions_follow_rate() {
        let codec = LdpcCodec::new(&CodecParams::default()).unwrap();
        assert_eq!(codec.n(), 1024);
        assert_eq!(codec.k(), 512);
        assert!((codec.rate() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_info_columns_have_fixed_weight() {
        let codec = small_codec(DecodingAlgorithm::SumProduct);
        let h = codec.parity_check();
        for v in 0..codec.k() {
            assert_eq!(h.var_to_check[v].len(), 3, "column {}", v);
        }
        // Row weight stays low: 3k/m info ones plus at most two parity ones.
        assert!(h.check_to_var.iter().all(|vars| vars.len() <= 8));
    }

    #[test]
    fn test_generator_codewords_satisfy_parity() {
        let codec = small_codec(DecodingAlgorithm::SumProduct);
        for seed in 0..8u64 {
            let info: Vec<u8> = (0..codec.k()).map(|i| ((i as u64 * 31 + seed * 17) % 7 < 3) as u8).collect();
            let codeword = codec.encode_block(&info);
            assert!(codec.parity_check().is_valid(&codeword));
            assert_eq!(&codeword[..codec.k()], &info[..], "systematic");
            assert_eq!(codeword, codec.encode_systematic(&info));
        }
    }

    #[test]
    fn test_syndrome_invalid_codeword() {
        let codec = small_codec(DecodingAlgorithm::SumProduct);
        let mut codeword = codec.encode_block(&vec![1; codec.k()]);
        codeword[5] ^= 1;
        assert!(!codec.parity_check().is_valid(&codeword));
        assert!(codec.parity_check().syndrome(&codeword).iter().any(|&s| s == 1));
    }

    #[test]
    fn test_wrong_length_codeword_is_invalid() {
        let codec = small_codec(DecodingAlgorithm::SumProduct);
        let codeword = codec.encode_block(&vec![0; codec.k()]);
        let h = codec.parity_check();
        assert!(h.is_valid(&codeword));
        assert!(!h.is_valid(&codeword[..codeword.len() - 1]));
        assert!(!h.is_valid(&[]));
    }

    #[test]
    fn test_clean_decode_exits_before_message_passing() {
        let codec = small_codec(DecodingAlgorithm::SumProduct);
        let info: Vec<u8> = (0..codec.k()).map(|i| (i % 2) as u8).collect();
        let result = codec.decode_block(&clean_llrs(&codec.encode_block(&info), 5.0), &[]);
        assert_eq!(result.converged, Some(true));
        assert_eq!(result.iterations, 0);
        assert_eq!(result.bits, info);
    }

    #[test]
    fn test_belief_propagation_corrects_weak_errors() {
        for algorithm in [DecodingAlgorithm::SumProduct, DecodingAlgorithm::MinSum { scale: 0.75 }] {
            let codec = small_codec(algorithm);
            let info: Vec<u8> = (0..codec.k()).map(|i| (i % 5 == 0) as u8).collect();
            let codeword = codec.encode_block(&info);
            let mut llrs = clean_llrs(&codeword, 4.0);
            // Flip five info bits with low confidence
            for &pos in &[3usize, 29, 61, 90, 117] {
                llrs[pos] = if codeword[pos] == 1 { 1.0 } else { -1.0 };
            }

            let result = codec.decode_block(&llrs, &[]);
            assert_eq!(result.converged, Some(true), "{:?}", algorithm);
            assert!(result.iterations >= 1);
            assert_eq!(result.bits, info, "{:?}", algorithm);
        }
    }

    #[test]
    fn test_prior_steers_systematic_bits() {
        let codec = small_codec(DecodingAlgorithm::SumProduct);
        let info = vec![0u8; codec.k()];
        let mut llrs = clean_llrs(&codec.encode_block(&info), 4.0);
        llrs[0] = -0.5;
        let prior: Vec<f64> = std::iter::once(3.0).chain(std::iter::repeat(0.0)).take(codec.k()).collect();
        let result = codec.decode_block(&llrs, &prior);
        assert_eq!(result.iterations, 0, "prior alone restores the parity");
        assert_eq!(result.bits, info);
    }

    #[test]
    fn test_iteration_cap_on_ambiguous_input() {
        let h = hamming_7_4();
        let codec = LdpcCodec::from_parity_check(h, DecodingAlgorithm::MinSum { scale: 0.8 }, 3);
        let llrs = vec![0.01, -0.01, 0.01, -0.01, 0.01, -0.01, 0.01];
        let result = codec.decode_block(&llrs, &[]);
        assert!(result.iterations <= 3, "ran {} iterations", result.iterations);
    }

    #[test]
    fn test_from_dense() {
        let h = SparseParityCheck::from_dense(&[vec![1, 0, 1], vec![0, 1, 1]]);
        assert_eq!(h.num_checks, 2);
        assert_eq!(h.num_vars, 3);
        assert_eq!(h.check_to_var[0], vec![0, 2]);
        assert_eq!(h.var_to_check[2], vec![0, 1]);
        assert!((h.rate() - 1.0 / 3.0).abs() < 1e-12);
    }
}
