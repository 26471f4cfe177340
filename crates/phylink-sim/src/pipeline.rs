//! End-to-end Link Simulation
//!
//! [`SimulationPipeline`] validates a [`SimulationConfig`], builds its
//! components through the factories and drives seven stages per call:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                        SimulationPipeline                            │
//! │                                                                      │
//! │  bits ─► source ─► channel ─► modulate ─► channel ─► demod ─► LLRs    │
//! │          encode    encode                 model                │     │
//! │                                                                ▼     │
//! │  reconstructed ◄─ source ◄──────────── channel decode ◄── (JSCC: HMM  │
//! │                   decode                                 turbo loop) │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each stage's output is kept as a named [`Artifact`] in the result.
//!
//! ## Example
//!
//! ```rust
//! use phylink_core::config::SimulationConfig;
//! use phylink_sim::pipeline::SimulationPipeline;
//!
//! let config = SimulationConfig {
//!     snr_db: 25.0,
//!     block_length: 256,
//!     seed: Some(1),
//!     ..Default::default()
//! };
//! let mut pipeline = SimulationPipeline::new(config).unwrap();
//! let bits: Vec<u8> = (0..200).map(|i| (i % 7 < 3) as u8).collect();
//! let result = pipeline.simulate(&bits).unwrap();
//! assert_eq!(result.metrics["ber"], 0.0);
//! assert!(result.artifacts.contains_key("llrs"));
//! ```

use crate::channel::{create_channel_model, ebn0_from_snr, ChannelModel};
use phylink_core::codec::{create_channel_encoder, ChannelCodec, DecodeReport};
use phylink_core::config::SimulationConfig;
use phylink_core::hmm::HmmSourceModel;
use phylink_core::jscc::{JsccDecoder, RefinementKind, TurboJsccDecoder, TurboOutcome};
use phylink_core::metrics::{calculate_ber, calculate_ser, Metrics, MetricsEngine};
use phylink_core::modulation::{create_modulator, Modulator, NOISE_VARIANCE_FLOOR};
use phylink_core::observe::{DiagnosticsSink, Stage, TracingSink};
use phylink_core::types::{hard_decision, validate_bits, Complex, DecodingMode};
use phylink_core::PhyResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Source coding stage.
///
/// Real source codecs live outside this crate; [`PassThrough`] is the
/// default.
pub trait SourceCodec: fmt::Debug + Send + Sync {
    /// Identifier used in diagnostics
    fn name(&self) -> &str;

    /// Compress a bit block.
    fn encode(&self, bits: &[u8]) -> Vec<u8>;

    /// Reconstruct `original_len` bits from decoded source bits.
    fn decode(&self, bits: &[u8], original_len: usize) -> Vec<u8>;
}

/// Identity source codec
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl SourceCodec for PassThrough {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn encode(&self, bits: &[u8]) -> Vec<u8> {
        bits.to_vec()
    }

    fn decode(&self, bits: &[u8], original_len: usize) -> Vec<u8> {
        let mut out = bits.to_vec();
        out.resize(original_len, 0);
        out
    }
}

/// One retained intermediate result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Artifact {
    Bits(Vec<u8>),
    Symbols(Vec<Complex>),
    Llrs(Vec<f64>),
    Series(Vec<f64>),
}

impl Artifact {
    pub fn len(&self) -> usize {
        match self {
            Artifact::Bits(v) => v.len(),
            Artifact::Symbols(v) => v.len(),
            Artifact::Llrs(v) | Artifact::Series(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bits(&self) -> Option<&[u8]> {
        match self {
            Artifact::Bits(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_symbols(&self) -> Option<&[Complex]> {
        match self {
            Artifact::Symbols(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_values(&self) -> Option<&[f64]> {
        match self {
            Artifact::Llrs(v) | Artifact::Series(v) => Some(v),
            _ => None,
        }
    }
}

/// Output of [`SimulationPipeline::simulate`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResult {
    /// Reconstructed bits, same length as the input
    pub reconstructed: Vec<u8>,
    /// Named metric values. In JSCC mode `ber` scores the turbo round
    /// closest to the transmitted source bits, so it never exceeds the
    /// first round's BER; decoder statistics come from that same round.
    #[serde(with = "phylink_core::metrics::serde_nonfinite")]
    pub metrics: Metrics,
    /// Named intermediate results
    pub artifacts: BTreeMap<String, Artifact>,
    /// Outcome of the single-shot refinement, when it ran
    pub refinement: Option<RefinementKind>,
}

impl SimulationResult {
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    pub fn artifact(&self, name: &str) -> Option<&Artifact> {
        self.artifacts.get(name)
    }
}

/// Configured transmit-receive chain.
pub struct SimulationPipeline {
    config: SimulationConfig,
    codec: Box<dyn ChannelCodec>,
    modulator: Box<dyn Modulator>,
    channel: Box<dyn ChannelModel>,
    source_codec: Box<dyn SourceCodec>,
    source_model: Option<HmmSourceModel>,
    metrics: MetricsEngine,
    diagnostics: Arc<dyn DiagnosticsSink>,
}

impl fmt::Debug for SimulationPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulationPipeline")
            .field("config", &self.config)
            .field("codec", &self.codec)
            .field("modulator", &self.modulator)
            .field("channel", &self.channel)
            .field("source_codec", &self.source_codec)
            .field("has_source_model", &self.source_model.is_some())
            .finish_non_exhaustive()
    }
}

impl SimulationPipeline {
    /// Validate the configuration and build the components.
    pub fn new(config: SimulationConfig) -> PhyResult<Self> {
        config.validate()?;

        let codec = create_channel_encoder(config.channel_code, &config.codec_params())?;
        let modulator = create_modulator(config.modulation);
        let channel = create_channel_model(config.channel_model, config.snr_db, config.rician_k_db, config.seed);

        tracing::debug!(
            technology = %config.technology,
            code = codec.name(),
            n = codec.n(),
            k = codec.k(),
            modulation = modulator.name(),
            channel = channel.name(),
            snr_db = config.snr_db,
            mode = %config.mode,
            "Pipeline constructed"
        );

        Ok(Self {
            config,
            codec,
            modulator,
            channel,
            source_codec: Box::new(PassThrough),
            source_model: None,
            metrics: MetricsEngine::new(),
            diagnostics: Arc::new(TracingSink),
        })
    }

    /// Send diagnostics to `sink` instead of `tracing`.
    pub fn with_diagnostics(mut self, sink: Arc<dyn DiagnosticsSink>) -> Self {
        self.diagnostics = sink;
        self
    }

    pub fn with_source_codec(mut self, codec: Box<dyn SourceCodec>) -> Self {
        self.source_codec = codec;
        self
    }

    /// Source model used in JSCC mode. Train it before handing it over;
    /// the pipeline never trains it.
    pub fn with_source_model(mut self, model: HmmSourceModel) -> Self {
        self.source_model = Some(model);
        self
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn codec(&self) -> &dyn ChannelCodec {
        self.codec.as_ref()
    }

    pub fn modulator(&self) -> &dyn Modulator {
        self.modulator.as_ref()
    }

    pub fn source_model(&self) -> Option<&HmmSourceModel> {
        self.source_model.as_ref()
    }

    /// Run one block of bits through the link.
    pub fn simulate(&mut self, bits: &[u8]) -> PhyResult<SimulationResult> {
        validate_bits(bits)?;
        let sink = Arc::clone(&self.diagnostics);
        let mut artifacts = BTreeMap::new();
        let mut metrics = Metrics::new();

        // 1. Source encode
        let source_encoded = self.source_codec.encode(bits);
        validate_bits(&source_encoded)?;
        sink.stage_completed(
            Stage::SourceEncode,
            &format!("{}: {} -> {} bits", self.source_codec.name(), bits.len(), source_encoded.len()),
        );

        // 2. Channel encode
        let codeword = self.codec.encode(&source_encoded);
        sink.stage_completed(
            Stage::ChannelEncode,
            &format!("{} n={} k={}: {} bits", self.codec.name(), self.codec.n(), self.codec.k(), codeword.len()),
        );

        // 3. Modulate
        let symbols = self.modulator.modulate(&codeword);
        sink.stage_completed(
            Stage::Modulate,
            &format!("{}: {} symbols", self.modulator.name(), symbols.len()),
        );

        // 4. Channel
        let transmission = self.channel.transmit(&symbols);
        sink.stage_completed(
            Stage::ChannelTransmit,
            &format!("{}: noise variance {:.3e}", self.channel.name(), transmission.noise_variance),
        );

        // 5. Demodulate. Max-log LLRs scale with 1/σ², so unit-variance LLRs
        // are rescaled per symbol by the post-equalization noise.
        let bps = self.modulator.bits_per_symbol();
        let mut llrs = self.modulator.demodulate(&transmission.symbols, 1.0);
        for (chunk, var) in llrs.chunks_mut(bps).zip(transmission.effective_noise_variances()) {
            let inv = 1.0 / var.max(NOISE_VARIANCE_FLOOR);
            chunk.iter_mut().for_each(|l| *l *= inv);
        }
        llrs.truncate(codeword.len());
        sink.stage_completed(Stage::Demodulate, &format!("{} LLRs", llrs.len()));

        metrics.insert("channel_ber".into(), calculate_ber(&codeword, &hard_decision(&llrs)));
        metrics.insert(
            "ser".into(),
            calculate_ser(
                &self.modulator.hard_demodulate(&symbols),
                &self.modulator.hard_demodulate(&transmission.symbols),
            ),
        );

        // 6. Channel decode
        let info_len = source_encoded.len();
        let mut refinement = None;
        let (decoded, report) = match self.config.mode {
            DecodingMode::Sscc => {
                let mut report = self.codec.decode_with_prior(&llrs, &[]);
                let mut decoded = std::mem::take(&mut report.bits);
                decoded.truncate(info_len);
                (decoded, report)
            }
            DecodingMode::Jscc => {
                let (turbo, report) = self.turbo_decode(&llrs, &source_encoded, sink.as_ref());
                artifacts.insert(
                    "jscc_ber_per_iteration".to_string(),
                    Artifact::Series(turbo.ber_per_iteration.clone()),
                );

                let mut decoded = turbo.bits;
                if self.config.jscc_single_shot {
                    if let Some(model) = self.source_model.as_ref().filter(|m| m.is_trained()) {
                        let outcome = JsccDecoder::new(model.clone()).decode(&decoded);
                        metrics.insert("jscc_refined".into(), if outcome.is_refined() { 1.0 } else { 0.0 });
                        if let RefinementKind::FellBackToHardDecision { reason } = &outcome.kind {
                            sink.fallback("jscc", reason);
                        }
                        refinement = Some(outcome.kind);
                        decoded = outcome.bits;
                    } else {
                        sink.fallback("jscc", "single-shot refinement needs a trained source model");
                    }
                }
                (decoded, report)
            }
        };
        sink.stage_completed(
            Stage::ChannelDecode,
            &format!(
                "{}/{} blocks converged, {} iterations",
                report.converged_blocks, report.blocks, report.iterations
            ),
        );

        // 7. Source decode
        let reconstructed = self.source_codec.decode(&decoded, bits.len());
        sink.stage_completed(Stage::SourceDecode, &format!("{} bits", reconstructed.len()));

        metrics.extend(self.metrics.calculate_all(bits, &reconstructed, self.config.data_type));
        metrics.insert("snr_db".into(), self.config.snr_db);
        metrics.insert(
            "ebn0_db".into(),
            ebn0_from_snr(self.config.snr_db, bps, self.codec.rate()),
        );
        if let Some(ratio) = report.converged_ratio() {
            metrics.insert("decoder_converged_ratio".into(), ratio);
        }
        for (name, value) in &metrics {
            sink.metric(name, *value);
        }

        artifacts.insert("source_encoded".to_string(), Artifact::Bits(source_encoded));
        artifacts.insert("codeword".to_string(), Artifact::Bits(codeword));
        artifacts.insert("modulated_symbols".to_string(), Artifact::Symbols(symbols));
        artifacts.insert("fading".to_string(), Artifact::Symbols(transmission.fading));
        artifacts.insert("received_symbols".to_string(), Artifact::Symbols(transmission.symbols));
        artifacts.insert("llrs".to_string(), Artifact::Llrs(llrs));
        artifacts.insert("decoded_bits".to_string(), Artifact::Bits(decoded));
        artifacts.insert("reconstructed".to_string(), Artifact::Bits(reconstructed.clone()));

        tracing::debug!(
            ber = metrics.get("ber").copied().unwrap_or_default(),
            channel_ber = metrics.get("channel_ber").copied().unwrap_or_default(),
            "Simulation complete"
        );

        Ok(SimulationResult {
            reconstructed,
            metrics,
            artifacts,
            refinement,
        })
    }

    /// Turbo JSCC over the information bits. The best round is picked by BER
    /// against the transmitted source-encoded bits, which a real receiver
    /// would not have.
    fn turbo_decode(&self, llrs: &[f64], reference: &[u8], sink: &dyn DiagnosticsSink) -> (TurboOutcome, DecodeReport) {
        let model = match &self.source_model {
            Some(model) => model.clone(),
            None => {
                sink.fallback("source_model", "no source model supplied, using default initialization");
                match self.config.seed {
                    Some(seed) => HmmSourceModel::with_seed(self.config.hmm_states, self.config.hmm_alphabet, seed),
                    None => HmmSourceModel::new(self.config.hmm_states, self.config.hmm_alphabet),
                }
            }
        };

        let codec = self.codec.as_ref();
        let decoder = TurboJsccDecoder::new(model, self.config.turbo_iterations);
        let (outcome, report) = turbo_with_reports(&decoder, llrs, reference, |channel_llrs, prior| {
            codec.decode_with_prior(channel_llrs, prior)
        });

        if outcome.source_failures > 0 {
            sink.fallback(
                "turbo_jscc",
                &format!("source inference failed in {} round(s)", outcome.source_failures),
            );
        }
        (outcome, report)
    }
}

/// Drive the turbo loop with `decode_round` and return the decoder report of
/// the round whose bits the outcome kept.
fn turbo_with_reports<F>(
    decoder: &TurboJsccDecoder,
    llrs: &[f64],
    reference: &[u8],
    mut decode_round: F,
) -> (TurboOutcome, DecodeReport)
where
    F: FnMut(&[f64], &[f64]) -> DecodeReport,
{
    let info_len = reference.len();
    let mut reports = Vec::with_capacity(decoder.n_iterations());
    let outcome = decoder.decode(
        llrs,
        |channel_llrs, prior| {
            let mut report = decode_round(channel_llrs, prior);
            let mut bits = std::mem::take(&mut report.bits);
            bits.truncate(info_len);
            reports.push(report);
            bits
        },
        Some(reference),
    );
    let report = reports.into_iter().nth(outcome.best_iteration).unwrap_or_default();
    (outcome, report)
}
