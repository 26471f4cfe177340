//! Hidden Markov source model for residual redundancy in byte streams
//!
//! Hidden states stand for source "contexts"; each emits byte symbols from
//! its own distribution. JSCC decoders use the model to pull channel-decoded
//! bytes towards statistically plausible values.
//!
//! ## Training
//!
//! [`HmmSourceModel::train`] runs Baum-Welch: a scaled forward/backward pass
//! per sequence, state posteriors normalized per time step, then
//! re-estimation of the emission matrix and the initial distribution. The
//! transition matrix keeps its initial value; only emissions and the initial
//! distribution adapt to the data.
//!
//! # Example
//!
//! ```
//! use phylink_core::hmm::HmmSourceModel;
//!
//! let mut model = HmmSourceModel::with_seed(2, 16, 7);
//! let data: Vec<u8> = (0..200).map(|i| if (i / 10) % 2 == 0 { 1 } else { 12 }).collect();
//! model.train(&[data.clone()], 5).unwrap();
//!
//! let path = model.viterbi_decode(&data).unwrap();
//! assert_eq!(path.len(), data.len());
//! ```

use crate::error::{PhyError, PhyResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Probability added to every emission count before normalization
const EMISSION_FLOOR: f64 = 1e-6;

/// Floor applied before taking logarithms in Viterbi
const LOG_FLOOR: f64 = 1e-300;

/// Tolerance for row-stochastic checks
const ROW_TOLERANCE: f64 = 1e-6;

/// Scaled forward recursion output.
#[derive(Debug, Clone)]
pub struct ForwardPass {
    /// `alpha[t][s]`, normalized so each row sums to 1
    pub alpha: Vec<Vec<f64>>,
    /// Per-step normalizers; `Σ ln c_t` is the sequence log-likelihood
    pub scales: Vec<f64>,
}

impl ForwardPass {
    /// Log-likelihood of the observed sequence
    pub fn log_likelihood(&self) -> f64 {
        self.scales.iter().map(|c| c.ln()).sum()
    }
}

/// Discrete-emission HMM over byte symbols.
#[derive(Debug, Clone)]
pub struct HmmSourceModel {
    n_states: usize,
    alphabet_size: usize,
    transition: Vec<Vec<f64>>,
    emission: Vec<Vec<f64>>,
    initial: Vec<f64>,
    trained: bool,
}

impl HmmSourceModel {
    /// Randomly initialized model seeded from system entropy.
    pub fn new(n_states: usize, alphabet_size: usize) -> Self {
        Self::initialize(n_states, alphabet_size, &mut StdRng::from_entropy())
    }

    /// Randomly initialized model with a reproducible seed.
    pub fn with_seed(n_states: usize, alphabet_size: usize, seed: u64) -> Self {
        Self::initialize(n_states, alphabet_size, &mut StdRng::seed_from_u64(seed))
    }

    fn initialize(n_states: usize, alphabet_size: usize, rng: &mut StdRng) -> Self {
        let n_states = n_states.max(1);
        let alphabet_size = alphabet_size.clamp(1, 256);

        // Sticky states: random rows with a boost on the diagonal.
        let mut transition: Vec<Vec<f64>> = (0..n_states)
            .map(|i| {
                (0..n_states)
                    .map(|j| rng.gen::<f64>() + if i == j { 2.0 } else { 0.0 })
                    .collect()
            })
            .collect();

        // Each state favours its own band of the alphabet.
        let band = (alphabet_size / n_states).max(1);
        let mut emission: Vec<Vec<f64>> = (0..n_states)
            .map(|i| {
                let start = (i * band).min(alphabet_size - 1);
                let end = ((i + 1) * band).min(alphabet_size).max(start + 1);
                (0..alphabet_size)
                    .map(|sym| rng.gen::<f64>() + if (start..end).contains(&sym) { 2.0 } else { 0.0 })
                    .collect()
            })
            .collect();

        transition.iter_mut().for_each(|row| normalize(row));
        emission.iter_mut().for_each(|row| normalize(row));

        Self {
            n_states,
            alphabet_size,
            transition,
            emission,
            initial: vec![1.0 / n_states as f64; n_states],
            trained: false,
        }
    }

    /// Build a model from explicit parameters. Every row must be a
    /// probability distribution.
    pub fn from_parameters(transition: Vec<Vec<f64>>, emission: Vec<Vec<f64>>, initial: Vec<f64>) -> PhyResult<Self> {
        let n_states = initial.len();
        if n_states == 0 || transition.len() != n_states || emission.len() != n_states {
            return Err(PhyError::DegenerateInput(format!(
                "HMM shape mismatch: {} initial, {} transition rows, {} emission rows",
                n_states,
                transition.len(),
                emission.len()
            )));
        }
        let alphabet_size = emission[0].len();
        if alphabet_size == 0 || alphabet_size > 256 {
            return Err(PhyError::DegenerateInput(format!("alphabet size {} outside 1..=256", alphabet_size)));
        }
        let rows_ok = transition.iter().all(|r| r.len() == n_states && is_distribution(r))
            && emission.iter().all(|r| r.len() == alphabet_size && is_distribution(r))
            && is_distribution(&initial);
        if !rows_ok {
            return Err(PhyError::DegenerateInput("HMM rows must be probability distributions".into()));
        }
        Ok(Self {
            n_states,
            alphabet_size,
            transition,
            emission,
            initial,
            trained: true,
        })
    }

    /// Number of hidden states
    pub fn n_states(&self) -> usize {
        self.n_states
    }

    /// Number of observable symbols (256 for bytes)
    pub fn alphabet_size(&self) -> usize {
        self.alphabet_size
    }

    /// `n_states x n_states`, row-stochastic
    pub fn transition_matrix(&self) -> &[Vec<f64>] {
        &self.transition
    }

    /// `n_states x alphabet_size`, row-stochastic
    pub fn emission_matrix(&self) -> &[Vec<f64>] {
        &self.emission
    }

    /// Initial state distribution, length `n_states`
    pub fn initial_distribution(&self) -> &[f64] {
        &self.initial
    }

    /// Whether the parameters came from training or were supplied explicitly
    pub fn is_trained(&self) -> bool {
        self.trained
    }

    fn check_symbols(&self, observations: &[u8]) -> PhyResult<()> {
        match observations.iter().find(|&&x| x as usize >= self.alphabet_size) {
            Some(&x) => Err(PhyError::SymbolOutOfAlphabet {
                symbol: x as usize,
                alphabet_size: self.alphabet_size,
            }),
            None => Ok(()),
        }
    }

    /// Scaled forward recursion.
    pub fn forward(&self, observations: &[u8]) -> PhyResult<ForwardPass> {
        self.check_symbols(observations)?;
        let s = self.n_states;
        let mut alpha: Vec<Vec<f64>> = Vec::with_capacity(observations.len());
        let mut scales = Vec::with_capacity(observations.len());

        for (t, &x) in observations.iter().enumerate() {
            let x = x as usize;
            let mut row: Vec<f64> = if t == 0 {
                (0..s).map(|i| self.initial[i] * self.emission[i][x]).collect()
            } else {
                let prev: &Vec<f64> = &alpha[t - 1];
                (0..s)
                    .map(|j| {
                        let pred: f64 = (0..s).map(|i| prev[i] * self.transition[i][j]).sum();
                        pred * self.emission[j][x]
                    })
                    .collect()
            };
            let c = row.iter().sum::<f64>();
            if !(c.is_finite() && c > 0.0) {
                return Err(PhyError::NumericalFailure(format!("forward normalizer {} at t = {}", c, t)));
            }
            row.iter_mut().for_each(|v| *v /= c);
            alpha.push(row);
            scales.push(c);
        }

        Ok(ForwardPass { alpha, scales })
    }

    /// Backward recursion, normalized at every step (`beta[T-1] = 1`).
    pub fn backward(&self, observations: &[u8]) -> PhyResult<Vec<Vec<f64>>> {
        self.check_symbols(observations)?;
        let s = self.n_states;
        let len = observations.len();
        let mut beta = vec![vec![1.0; s]; len];

        for t in (0..len.saturating_sub(1)).rev() {
            let next_x = observations[t + 1] as usize;
            let mut row: Vec<f64> = (0..s)
                .map(|i| {
                    (0..s)
                        .map(|j| self.transition[i][j] * self.emission[j][next_x] * beta[t + 1][j])
                        .sum()
                })
                .collect();
            let c = row.iter().sum::<f64>();
            if !(c.is_finite() && c > 0.0) {
                return Err(PhyError::NumericalFailure(format!("backward normalizer {} at t = {}", c, t)));
            }
            row.iter_mut().for_each(|v| *v /= c);
            beta[t] = row;
        }

        Ok(beta)
    }

    /// State posteriors `gamma[t][s] = P(state_t = s | observations)`.
    pub fn posteriors(&self, observations: &[u8]) -> PhyResult<Vec<Vec<f64>>> {
        let fwd = self.forward(observations)?;
        let beta = self.backward(observations)?;
        Ok(combine_posteriors(&fwd.alpha, &beta))
    }

    /// Log-likelihood of a sequence under the current parameters.
    pub fn sequence_log_likelihood(&self, observations: &[u8]) -> PhyResult<f64> {
        Ok(self.forward(observations)?.log_likelihood())
    }

    /// Baum-Welch over `sequences` for `n_iterations` passes. Returns the
    /// total log-likelihood seen at the start of each pass.
    pub fn train<S: AsRef<[u8]>>(&mut self, sequences: &[S], n_iterations: usize) -> PhyResult<Vec<f64>> {
        if sequences.iter().all(|seq| seq.as_ref().is_empty()) {
            return Err(PhyError::DegenerateInput("no training symbols".into()));
        }
        for seq in sequences {
            self.check_symbols(seq.as_ref())?;
        }

        let s = self.n_states;
        let mut history = Vec::with_capacity(n_iterations);

        for pass in 0..n_iterations {
            let mut initial_acc = vec![0.0; s];
            let mut emission_acc = vec![vec![0.0; self.alphabet_size]; s];
            let mut total_ll = 0.0;

            for seq in sequences {
                let seq: &[u8] = seq.as_ref();
                if seq.is_empty() {
                    continue;
                }
                let fwd = self.forward(seq)?;
                let beta = self.backward(seq)?;
                total_ll += fwd.log_likelihood();
                let gamma = combine_posteriors(&fwd.alpha, &beta);

                for (acc, &g) in initial_acc.iter_mut().zip(&gamma[0]) {
                    *acc += g;
                }
                for (g_t, &x) in gamma.iter().zip(seq) {
                    for (state, &g) in g_t.iter().enumerate() {
                        emission_acc[state][x as usize] += g;
                    }
                }
            }

            for (row, acc) in self.emission.iter_mut().zip(emission_acc) {
                for (e, a) in row.iter_mut().zip(acc) {
                    *e = a + EMISSION_FLOOR;
                }
                normalize(row);
            }
            normalize(&mut initial_acc);
            self.initial = initial_acc;

            tracing::debug!(pass, log_likelihood = total_ll, "Baum-Welch pass");
            history.push(total_ll);
        }

        self.trained = true;
        Ok(history)
    }

    /// Most likely state path for an observed symbol sequence.
    pub fn viterbi_decode(&self, observations: &[u8]) -> PhyResult<Vec<usize>> {
        self.check_symbols(observations)?;
        if observations.is_empty() {
            return Ok(Vec::new());
        }

        let s = self.n_states;
        let ln = |p: f64| p.max(LOG_FLOOR).ln();
        let log_a: Vec<Vec<f64>> = self.transition.iter().map(|r| r.iter().map(|&p| ln(p)).collect()).collect();

        let x0 = observations[0] as usize;
        let mut delta: Vec<f64> = (0..s).map(|i| ln(self.initial[i]) + ln(self.emission[i][x0])).collect();
        let mut backptr: Vec<Vec<usize>> = Vec::with_capacity(observations.len());

        for &x in &observations[1..] {
            let x = x as usize;
            let mut next = vec![f64::NEG_INFINITY; s];
            let mut ptr = vec![0usize; s];
            for j in 0..s {
                for i in 0..s {
                    let score = delta[i] + log_a[i][j];
                    if score > next[j] {
                        next[j] = score;
                        ptr[j] = i;
                    }
                }
                next[j] += ln(self.emission[j][x]);
            }
            delta = next;
            backptr.push(ptr);
        }

        let mut state = (0..s).max_by(|&a, &b| delta[a].total_cmp(&delta[b])).unwrap_or(0);
        let mut path = vec![state; observations.len()];
        for (t, ptr) in backptr.iter().enumerate().rev() {
            state = ptr[state];
            path[t] = state;
        }

        Ok(path)
    }

    /// Symbol with the highest emission probability in `state`.
    pub fn most_likely_symbol(&self, state: usize) -> u8 {
        let row = &self.emission[state];
        (0..row.len()).max_by(|&a, &b| row[a].total_cmp(&row[b])).unwrap_or(0) as u8
    }
}

fn normalize(row: &mut [f64]) {
    let sum: f64 = row.iter().sum();
    if sum > 0.0 {
        row.iter_mut().for_each(|v| *v /= sum);
    } else {
        let uniform = 1.0 / row.len() as f64;
        row.iter_mut().for_each(|v| *v = uniform);
    }
}

fn is_distribution(row: &[f64]) -> bool {
    row.iter().all(|&p| p >= 0.0 && p.is_finite()) && (row.iter().sum::<f64>() - 1.0).abs() < ROW_TOLERANCE
}

fn combine_posteriors(alpha: &[Vec<f64>], beta: &[Vec<f64>]) -> Vec<Vec<f64>> {
    alpha
        .iter()
        .zip(beta)
        .map(|(a, b)| {
            let mut g: Vec<f64> = a.iter().zip(b).map(|(x, y)| x * y).collect();
            normalize(&mut g);
            g
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn row_sums_ok(m: &[Vec<f64>]) -> bool {
        m.iter().all(|r| (r.iter().sum::<f64>() - 1.0).abs() < 1e-6)
    }

    fn two_regime_data(len: usize) -> Vec<u8> {
        (0..len).map(|i| if (i / 25) % 2 == 0 { (i % 3) as u8 } else { 200 + (i % 4) as u8 }).collect()
    }

    /// Two states that strongly prefer symbols 0 and 1 respectively.
    fn toy_model() -> HmmSourceModel {
        HmmSourceModel::from_parameters(
            vec![vec![0.9, 0.1], vec![0.1, 0.9]],
            vec![vec![0.8, 0.1, 0.1], vec![0.1, 0.8, 0.1]],
            vec![0.5, 0.5],
        )
        .unwrap()
    }

    #[test]
    fn test_initialization_is_row_stochastic() {
        let model = HmmSourceModel::with_seed(4, 256, 1);
        assert_eq!(model.transition_matrix().len(), 4);
        assert_eq!(model.emission_matrix()[0].len(), 256);
        assert!(row_sums_ok(model.transition_matrix()));
        assert!(row_sums_ok(model.emission_matrix()));
        assert_relative_eq!(model.initial_distribution().iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        assert!(!model.is_trained());
    }

    #[test]
    fn test_training_keeps_rows_stochastic() {
        let mut model = HmmSourceModel::with_seed(4, 256, 3);
        let transition_before = model.transition_matrix().to_vec();
        let data = two_regime_data(400);
        let history = model.train(&[data.clone(), data[..100].to_vec()], 8).unwrap();

        assert_eq!(history.len(), 8);
        assert!(row_sums_ok(model.transition_matrix()));
        assert!(row_sums_ok(model.emission_matrix()));
        assert_relative_eq!(model.initial_distribution().iter().sum::<f64>(), 1.0, epsilon = 1e-6);
        assert_eq!(model.transition_matrix(), &transition_before[..], "transitions stay fixed");
        assert!(model.is_trained());
    }

    #[test]
    fn test_training_increases_likelihood() {
        let mut model = HmmSourceModel::with_seed(2, 256, 11);
        let data = two_regime_data(300);
        let history = model.train(&[data.clone()], 6).unwrap();
        let after = model.sequence_log_likelihood(&data).unwrap();
        assert!(after > history[0], "{} should exceed {}", after, history[0]);
    }

    #[test]
    fn test_forward_backward_posteriors_normalized() {
        let model = toy_model();
        let obs = vec![0, 0, 1, 1, 1, 0, 2];
        let gamma = model.posteriors(&obs).unwrap();
        assert_eq!(gamma.len(), obs.len());
        assert!(row_sums_ok(&gamma));
        assert!(gamma[0][0] > gamma[0][1]);
        assert!(gamma[3][1] > gamma[3][0]);
    }

    #[test]
    fn test_log_likelihood_single_symbol() {
        let model = toy_model();
        // P(x0 = 0) = 0.5 * 0.8 + 0.5 * 0.1
        assert_relative_eq!(model.sequence_log_likelihood(&[0]).unwrap(), 0.45f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_viterbi_follows_regimes() {
        let model = toy_model();
        let obs = vec![0, 0, 0, 1, 1, 1, 1, 0, 0];
        let path = model.viterbi_decode(&obs).unwrap();
        assert_eq!(path, vec![0, 0, 0, 1, 1, 1, 1, 0, 0]);
        assert!(model.viterbi_decode(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_long_sequence_does_not_underflow() {
        let model = HmmSourceModel::with_seed(4, 256, 5);
        let obs: Vec<u8> = (0..5000).map(|i| (i * 37 % 256) as u8).collect();
        let path = model.viterbi_decode(&obs).unwrap();
        assert_eq!(path.len(), 5000);
        assert!(model.sequence_log_likelihood(&obs).unwrap().is_finite());
    }

    #[test]
    fn test_symbol_outside_alphabet_rejected() {
        let model = toy_model();
        assert_eq!(
            model.viterbi_decode(&[0, 7]).unwrap_err(),
            PhyError::SymbolOutOfAlphabet { symbol: 7, alphabet_size: 3 }
        );
    }

    #[test]
    fn test_from_parameters_validates_rows() {
        let bad = HmmSourceModel::from_parameters(vec![vec![0.5, 0.6], vec![0.5, 0.5]], vec![vec![1.0], vec![1.0]], vec![0.5, 0.5]);
        assert!(bad.is_err());
        assert!(HmmSourceModel::from_parameters(vec![], vec![], vec![]).is_err());
    }

    #[test]
    fn test_most_likely_symbol() {
        let model = toy_model();
        assert_eq!(model.most_likely_symbol(0), 0);
        assert_eq!(model.most_likely_symbol(1), 1);
    }
}
