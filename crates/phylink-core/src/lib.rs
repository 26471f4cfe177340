//! # PHY Link Core Library
//!
//! Building blocks for simulating a 5G/6G physical-layer link: channel
//! codes, bit-to-symbol mapping, a hidden Markov source model and joint
//! source-channel decoders that use it.
//!
//! ## Overview
//!
//! - **Channel codes**: systematic LDPC with belief-propagation decoding,
//!   Polar codes with successive-cancellation decoding
//! - **Modulation**: QPSK and Gray-coded 16/64/256/1024-QAM with max-log LLRs
//! - **Source model**: HMM with Baum-Welch training and Viterbi decoding
//! - **JSCC**: single-shot refinement and turbo exchange of source and
//!   channel extrinsic information
//! - **Metrics**: entropy, mutual information, BER, SER, MSE, PSNR, SSIM
//!
//! ## Signal Flow
//!
//! ```text
//! TX: Bits → Channel Encode → Modulate → Symbols
//! RX: Symbols → Demodulate (LLR) → Channel Decode ⇄ HMM (JSCC) → Bits
//! ```
//!
//! The channel itself and the orchestration of these stages live in
//! `phylink-sim`.
//!
//! ## Example
//!
//! ```rust
//! use phylink_core::prelude::*;
//!
//! let codec = create_channel_encoder(ChannelCode::Ldpc, &CodecParams::with_block_length(128)).unwrap();
//! let modem = create_modulator(Modulation::Qam16);
//!
//! let bits: Vec<u8> = (0..64).map(|i| (i % 3 == 0) as u8).collect();
//! let symbols = modem.modulate(&codec.encode(&bits));
//! let llrs = modem.demodulate(&symbols, 0.01);
//! let decoded = codec.decode(&llrs);
//! assert_eq!(&decoded[..bits.len()], &bits[..]);
//! ```
//!
//! ## LLR convention
//!
//! Throughout the crate a positive LLR favours bit 0 and a negative LLR
//! favours bit 1.

pub mod codec;
pub mod config;
pub mod error;
pub mod hmm;
pub mod jscc;
pub mod metrics;
pub mod modulation;
pub mod observe;
pub mod types;

pub use codec::{create_channel_encoder, ChannelCodec, CodecParams, DecodeReport, LdpcCodec, PolarCodec};
pub use config::{PhylinkConfig, SimulationConfig};
pub use error::{PhyError, PhyResult};
pub use hmm::HmmSourceModel;
pub use jscc::{CliffAnalysis, JsccDecoder, JsccOutcome, TurboJsccDecoder, TurboOutcome};
pub use metrics::{Metrics, MetricsEngine};
pub use modulation::{create_modulator, Modulator};
pub use types::{ChannelCode, ChannelKind, Complex, DataType, DecodingMode, Modulation, Technology};

/// Commonly used items
pub mod prelude {
    pub use crate::codec::{
        create_channel_encoder, create_channel_encoder_by_name, ChannelCodec, CodecParams, DecodeReport,
    };
    pub use crate::config::SimulationConfig;
    pub use crate::error::{PhyError, PhyResult};
    pub use crate::hmm::HmmSourceModel;
    pub use crate::jscc::{JsccDecoder, TurboJsccDecoder};
    pub use crate::metrics::{Metrics, MetricsEngine};
    pub use crate::modulation::{create_modulator, create_modulator_by_name, Modulator};
    pub use crate::observe::{DiagnosticsSink, Stage};
    pub use crate::types::*;
}
