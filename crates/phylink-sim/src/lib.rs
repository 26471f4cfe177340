//! # PHY Link Simulator
//!
//! Channel models and the machinery that drives complete link simulations
//! on top of `phylink-core`:
//!
//! - **channel**: AWGN, Rayleigh and Rician channels with perfect-CSI
//!   equalization
//! - **pipeline**: the seven-stage transmit-receive orchestrator
//! - **parallel**: Monte Carlo and sweep runner on a Rayon pool
//! - **cache**: content-addressed store for simulation results
//!
//! ## Example
//!
//! ```rust
//! use phylink_sim::prelude::*;
//!
//! let config = SimulationConfig { snr_db: 20.0, block_length: 128, seed: Some(4), ..Default::default() };
//! let bits: Vec<u8> = (0..64).map(|i| (i % 2) as u8).collect();
//! let result = SimulationPipeline::new(config).unwrap().simulate(&bits).unwrap();
//! assert_eq!(result.reconstructed, bits);
//! ```

pub mod cache;
pub mod channel;
pub mod parallel;
pub mod pipeline;

pub use cache::{CacheKey, ResultCache};
pub use channel::{create_channel_model, ChannelModel, Transmission};
pub use parallel::{AggregatedMetrics, ParallelSimulator};
pub use pipeline::{Artifact, SimulationPipeline, SimulationResult, SourceCodec};

/// Commonly used items
pub mod prelude {
    pub use crate::cache::{CacheKey, ResultCache};
    pub use crate::channel::{create_channel_model, create_channel_model_by_name, ChannelModel, Transmission};
    pub use crate::parallel::{AggregatedMetrics, ParallelSimulator, SnrPoint};
    pub use crate::pipeline::{Artifact, PassThrough, SimulationPipeline, SimulationResult, SourceCodec};
    pub use phylink_core::prelude::*;
}
