//! Joint Source-Channel Decoding
//!
//! Separate source-channel coding (SSCC) stops at the channel decoder. JSCC
//! keeps going: an [`HmmSourceModel`] of the source's residual redundancy is
//! used to revise the channel decoder's output.
//!
//! - [`JsccDecoder`] is single-shot: Viterbi over the decoded bytes, then
//!   each byte is replaced by the most likely symbol of its state.
//! - [`TurboJsccDecoder`] iterates between the channel decoder and the source
//!   model, exchanging damped extrinsic LLRs on the information bits.
//! - [`demonstrate_cliff_effect`] compares SSCC and JSCC BER curves.
//!
//! Refinement never fails the caller. Any internal failure returns the
//! unmodified hard decisions with [`RefinementKind::FellBackToHardDecision`],
//! and the fallback is logged.

use crate::error::{PhyError, PhyResult};
use crate::hmm::HmmSourceModel;
use crate::metrics::calculate_ber;
use crate::types::{pack_bits, unpack_bits};
use serde::{Deserialize, Serialize};

/// Probability guard used when turning posteriors into LLRs
const PROB_EPSILON: f64 = 1e-10;

/// Which path a single-shot refinement took
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RefinementKind {
    /// Source-model refinement was applied
    Refined,
    /// The hard decisions were returned unchanged
    FellBackToHardDecision { reason: String },
}

/// Output of [`JsccDecoder::decode`]
#[derive(Debug, Clone)]
pub struct JsccOutcome {
    pub bits: Vec<u8>,
    pub kind: RefinementKind,
}

impl JsccOutcome {
    pub fn is_refined(&self) -> bool {
        self.kind == RefinementKind::Refined
    }
}

/// Single-shot HMM refinement of hard decisions.
#[derive(Debug, Clone)]
pub struct JsccDecoder {
    model: HmmSourceModel,
}

impl JsccDecoder {
    /// Wrap a source model. An untrained model still decodes, just with its
    /// initial parameters.
    pub fn new(model: HmmSourceModel) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &HmmSourceModel {
        &self.model
    }

    /// Mutable access for explicit training
    pub fn model_mut(&mut self) -> &mut HmmSourceModel {
        &mut self.model
    }

    /// Refine hard-decision bits. The output has the input's length.
    pub fn decode(&self, hard_bits: &[u8]) -> JsccOutcome {
        match self.refine(hard_bits) {
            Ok(bits) => JsccOutcome {
                bits,
                kind: RefinementKind::Refined,
            },
            Err(err) => {
                let reason = err.to_string();
                tracing::warn!(%reason, bits = hard_bits.len(), "JSCC refinement fell back to hard decision");
                JsccOutcome {
                    bits: hard_bits.to_vec(),
                    kind: RefinementKind::FellBackToHardDecision { reason },
                }
            }
        }
    }

    fn refine(&self, hard_bits: &[u8]) -> PhyResult<Vec<u8>> {
        let bytes = pack_bits(hard_bits);
        if bytes.len() < 2 {
            return Err(PhyError::DegenerateInput(format!(
                "too short for refinement: {} byte(s)",
                bytes.len()
            )));
        }

        let path = self.model.viterbi_decode(&bytes)?;
        let refined: Vec<u8> = path.iter().map(|&s| self.model.most_likely_symbol(s)).collect();

        let mut bits = hard_bits.to_vec();
        let refined_bits = unpack_bits(&refined);
        let len = bits.len().min(refined_bits.len());
        bits[..len].copy_from_slice(&refined_bits[..len]);
        Ok(bits)
    }
}

/// Output of [`TurboJsccDecoder::decode`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurboOutcome {
    /// Best decision seen (the last one when no reference was given)
    pub bits: Vec<u8>,
    /// Round that produced `bits`
    pub best_iteration: usize,
    /// BER against the reference, one entry per round
    pub ber_per_iteration: Vec<f64>,
    /// Mean |extrinsic LLR| produced after each round
    pub llr_evolution: Vec<f64>,
    /// Rounds in which source inference failed and no extrinsic was produced
    pub source_failures: usize,
}

/// Iterative exchange between channel decoder and source model.
#[derive(Debug, Clone)]
pub struct TurboJsccDecoder {
    model: HmmSourceModel,
    n_iterations: usize,
    damping: f64,
}

impl TurboJsccDecoder {
    /// Decoder with half-weight extrinsic damping.
    pub fn new(model: HmmSourceModel, n_iterations: usize) -> Self {
        Self {
            model,
            n_iterations: n_iterations.max(1),
            damping: 0.5,
        }
    }

    /// Override the extrinsic weight.
    pub fn with_damping(mut self, damping: f64) -> Self {
        self.damping = damping;
        self
    }

    pub fn model(&self) -> &HmmSourceModel {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut HmmSourceModel {
        &mut self.model
    }

    pub fn n_iterations(&self) -> usize {
        self.n_iterations
    }

    /// Run the turbo loop.
    ///
    /// `channel_decode(llrs, prior)` must return hard decisions on the
    /// information bits given channel LLRs and an a-priori LLR per
    /// information bit (empty on the first round).
    pub fn decode<F>(&self, llrs: &[f64], mut channel_decode: F, reference: Option<&[u8]>) -> TurboOutcome
    where
        F: FnMut(&[f64], &[f64]) -> Vec<u8>,
    {
        let mut outcome = TurboOutcome::default();
        let mut extrinsic: Vec<f64> = Vec::new();
        let mut best_ber = f64::INFINITY;
        let mut last = Vec::new();

        for iteration in 0..self.n_iterations {
            let decoded = channel_decode(llrs, &extrinsic);

            if let Some(reference) = reference.filter(|r| r.len() <= decoded.len()) {
                let ber = calculate_ber(reference, &decoded[..reference.len()]);
                outcome.ber_per_iteration.push(ber);
                if ber < best_ber {
                    best_ber = ber;
                    outcome.best_iteration = iteration;
                    outcome.bits = decoded.clone();
                }
            }

            extrinsic = match self.source_llrs(&decoded) {
                Ok(source) => source.into_iter().map(|l| l * self.damping).collect(),
                Err(err) => {
                    outcome.source_failures += 1;
                    tracing::warn!(iteration, error = %err, "Source inference failed, extrinsic reset");
                    vec![0.0; decoded.len()]
                }
            };
            let mean_mag = if extrinsic.is_empty() {
                0.0
            } else {
                extrinsic.iter().map(|l| l.abs()).sum::<f64>() / extrinsic.len() as f64
            };
            outcome.llr_evolution.push(mean_mag);
            tracing::debug!(iteration, mean_extrinsic = mean_mag, "Turbo JSCC round");

            last = decoded;
        }

        if outcome.ber_per_iteration.is_empty() {
            outcome.best_iteration = self.n_iterations - 1;
            outcome.bits = last;
        }
        outcome
    }

    /// Per-bit source LLRs `ln(P(0)/P(1))` from forward-backward posteriors.
    pub fn source_llrs(&self, bits: &[u8]) -> PhyResult<Vec<f64>> {
        let bytes = pack_bits(bits);
        let gamma = self.model.posteriors(&bytes)?;

        // P(bit j = 1 | state), bit 0 being the MSB
        let bit_one: Vec<[f64; 8]> = self
            .model
            .emission_matrix()
            .iter()
            .map(|row| {
                let mut p = [0.0; 8];
                for (sym, &e) in row.iter().enumerate() {
                    for (j, pj) in p.iter_mut().enumerate() {
                        if (sym >> (7 - j)) & 1 == 1 {
                            *pj += e;
                        }
                    }
                }
                p
            })
            .collect();

        let mut llrs = Vec::with_capacity(bytes.len() * 8);
        for g_t in &gamma {
            for j in 0..8 {
                let p1: f64 = g_t.iter().zip(&bit_one).map(|(g, p)| g * p[j]).sum();
                let p1 = p1.clamp(0.0, 1.0);
                llrs.push(((1.0 - p1 + PROB_EPSILON) / (p1 + PROB_EPSILON)).ln());
            }
        }
        llrs.truncate(bits.len());

        if llrs.iter().any(|l| !l.is_finite()) {
            return Err(PhyError::NumericalFailure("non-finite source LLR".into()));
        }
        Ok(llrs)
    }
}

/// SSCC-versus-JSCC BER curve comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CliffAnalysis {
    /// Index of the steepest SSCC BER change
    pub sscc_cliff_index: usize,
    /// SNR at that index
    pub sscc_cliff_snr: f64,
    /// |ΔBER| across the cliff
    pub sscc_cliff_magnitude: f64,
    /// Standard deviation of the SSCC BER differences
    pub sscc_smoothness: f64,
    /// Standard deviation of the JSCC BER differences
    pub jscc_smoothness: f64,
    /// Mean of SSCC − JSCC BER
    pub avg_ber_improvement: f64,
    /// Max of SSCC − JSCC BER
    pub max_ber_improvement: f64,
}

/// Locate the SSCC cliff and compare the smoothness of the two curves.
pub fn demonstrate_cliff_effect(sscc_ber: &[f64], jscc_ber: &[f64], snr_range: &[f64]) -> PhyResult<CliffAnalysis> {
    if sscc_ber.len() != jscc_ber.len() || sscc_ber.len() != snr_range.len() {
        return Err(PhyError::DegenerateInput(format!(
            "curve lengths differ: sscc {}, jscc {}, snr {}",
            sscc_ber.len(),
            jscc_ber.len(),
            snr_range.len()
        )));
    }
    if sscc_ber.len() < 2 {
        return Err(PhyError::DegenerateInput("need at least two SNR points".into()));
    }

    let sscc_diff: Vec<f64> = sscc_ber.windows(2).map(|w| w[1] - w[0]).collect();
    let jscc_diff: Vec<f64> = jscc_ber.windows(2).map(|w| w[1] - w[0]).collect();

    let (cliff_index, cliff_magnitude) = sscc_diff
        .iter()
        .map(|d| d.abs())
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, d)| if d > best.1 { (i, d) } else { best });

    let gaps: Vec<f64> = sscc_ber.iter().zip(jscc_ber).map(|(s, j)| s - j).collect();
    let avg_gap = gaps.iter().sum::<f64>() / gaps.len() as f64;
    let max_gap = gaps.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    Ok(CliffAnalysis {
        sscc_cliff_index: cliff_index,
        sscc_cliff_snr: snr_range[cliff_index],
        sscc_cliff_magnitude: cliff_magnitude,
        sscc_smoothness: std_dev(&sscc_diff),
        jscc_smoothness: std_dev(&jscc_diff),
        avg_ber_improvement: avg_gap,
        max_ber_improvement: max_gap,
    })
}

/// Population standard deviation
fn std_dev(values: &[f64]) -> f64 {
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}
