//! Configuration for link simulations
//!
//! Configuration is loaded from YAML files in the following order:
//! 1. Path given by the `PHYLINK_CONFIG` environment variable
//! 2. `./phylink.yaml` (current directory)
//! 3. `~/.config/phylink/config.yaml` (user config)
//! 4. `/etc/phylink/config.yaml` (system config)
//!
//! If none is found the defaults are used: 5G, text, LDPC, QPSK, AWGN at
//! 10 dB, separate decoding.
//!
//! ## Example Configuration
//!
//! ```yaml
//! simulation:
//!   technology: 6G
//!   data_type: image
//!   channel_code: Polar
//!   modulation: 1024QAM
//!   channel_model: Rician
//!   snr_db: 24.0
//!   mode: JSCC
//!   rician_k_db: 6.0
//!
//! logging:
//!   level: debug
//!   format: compact
//! ```

use crate::codec::CodecParams;
use crate::error::{PhyError, PhyResult};
use crate::observe::LogConfig;
use crate::types::{ChannelCode, ChannelKind, DataType, DecodingMode, Modulation, Technology};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "PHYLINK_CONFIG";

/// One pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Technology generation (5G, 5G_Advanced, 6G)
    pub technology: Technology,
    /// Source data kind (text, audio, image, video)
    pub data_type: DataType,
    /// Channel code (LDPC, Polar)
    pub channel_code: ChannelCode,
    /// Modulation (QPSK ... 1024QAM)
    pub modulation: Modulation,
    /// Channel model (AWGN, Rayleigh, Rician)
    pub channel_model: ChannelKind,
    /// Symbol SNR in dB
    pub snr_db: f64,
    /// SSCC or JSCC
    pub mode: DecodingMode,
    /// Codeword length target
    pub block_length: usize,
    /// Code rate in (0, 1)
    pub code_rate: f64,
    /// LDPC iteration cap
    pub ldpc_max_iterations: usize,
    /// LDPC ones per information column
    pub ldpc_column_weight: usize,
    /// Polar construction design SNR
    pub polar_design_snr_db: f64,
    /// Rician K factor in dB
    pub rician_k_db: f64,
    /// HMM hidden states
    pub hmm_states: usize,
    /// HMM alphabet size
    pub hmm_alphabet: usize,
    /// Turbo JSCC rounds
    pub turbo_iterations: usize,
    /// Apply the single-shot Viterbi refinement after the turbo loop
    pub jscc_single_shot: bool,
    /// Channel RNG seed; entropy-seeded when absent
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        let codec = CodecParams::default();
        Self {
            technology: Technology::FiveG,
            data_type: DataType::Text,
            channel_code: ChannelCode::Ldpc,
            modulation: Modulation::Qpsk,
            channel_model: ChannelKind::Awgn,
            snr_db: 10.0,
            mode: DecodingMode::Sscc,
            block_length: codec.block_length,
            code_rate: codec.code_rate,
            ldpc_max_iterations: codec.ldpc_max_iterations,
            ldpc_column_weight: codec.ldpc_column_weight,
            polar_design_snr_db: codec.polar_design_snr_db,
            rician_k_db: 10.0,
            hmm_states: 4,
            hmm_alphabet: 256,
            turbo_iterations: 5,
            jscc_single_shot: false,
            seed: None,
        }
    }
}

impl SimulationConfig {
    /// Defaults with a different SNR
    pub fn with_snr(snr_db: f64) -> Self {
        Self {
            snr_db,
            ..Default::default()
        }
    }

    /// Codec construction parameters derived from this configuration
    pub fn codec_params(&self) -> CodecParams {
        CodecParams {
            block_length: self.block_length,
            code_rate: self.code_rate,
            ldpc_max_iterations: self.ldpc_max_iterations,
            ldpc_column_weight: self.ldpc_column_weight,
            polar_design_snr_db: self.polar_design_snr_db,
            ..Default::default()
        }
    }

    /// Check the technology rules and parameter ranges.
    pub fn validate(&self) -> PhyResult<()> {
        if !self.technology.allowed_modulations().contains(&self.modulation) {
            return Err(PhyError::config(
                "modulation",
                self.modulation,
                format!("not allowed for technology {}", self.technology),
            ));
        }
        if !self.technology.allowed_codes().contains(&self.channel_code) {
            return Err(PhyError::config(
                "channel_code",
                self.channel_code,
                format!("not allowed for technology {}", self.technology),
            ));
        }
        if !self.snr_db.is_finite() {
            return Err(PhyError::config("snr_db", self.snr_db, "must be finite"));
        }
        if !(self.code_rate > 0.0 && self.code_rate < 1.0) {
            return Err(PhyError::config("code_rate", self.code_rate, "must lie in (0, 1)"));
        }
        if self.block_length < 8 {
            return Err(PhyError::config("block_length", self.block_length, "must be at least 8"));
        }
        if self.ldpc_max_iterations == 0 {
            return Err(PhyError::config("ldpc_max_iterations", 0, "must be > 0"));
        }
        if !self.rician_k_db.is_finite() {
            return Err(PhyError::config("rician_k_db", self.rician_k_db, "must be finite"));
        }
        if self.hmm_states == 0 {
            return Err(PhyError::config("hmm_states", 0, "must be > 0"));
        }
        if !(1..=256).contains(&self.hmm_alphabet) {
            return Err(PhyError::config("hmm_alphabet", self.hmm_alphabet, "must be 1-256"));
        }
        Ok(())
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PhylinkConfig {
    /// Pipeline settings
    pub simulation: SimulationConfig,
    /// Logging settings
    pub logging: LogConfig,
}

impl PhylinkConfig {
    /// Load configuration from standard locations.
    pub fn load() -> PhyResult<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if Path::new(&path).exists() {
                return Self::load_from(Path::new(&path));
            }
        }

        for path in Self::config_search_paths() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from(path: &Path) -> PhyResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PhyError::ConfigLoad(format!("{}: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(yaml: &str) -> PhyResult<Self> {
        serde_yaml::from_str(yaml).map_err(|e| PhyError::ConfigLoad(e.to_string()))
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> PhyResult<()> {
        let content = serde_yaml::to_string(self).map_err(|e| PhyError::ConfigLoad(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| PhyError::ConfigLoad(format!("{}: {}", path.display(), e)))
    }

    /// Get configuration search paths.
    pub fn config_search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("./phylink.yaml")];

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "phylink") {
            paths.push(config_dir.config_dir().join("config.yaml"));
        }

        paths.push(PathBuf::from("/etc/phylink/config.yaml"));
        paths
    }

    /// Validate the configuration.
    pub fn validate(&self) -> PhyResult<()> {
        self.simulation.validate()
    }

    /// Generate example configuration YAML.
    pub fn example_yaml() -> String {
        let config = Self {
            simulation: SimulationConfig {
                technology: Technology::SixG,
                data_type: DataType::Image,
                channel_code: ChannelCode::Polar,
                modulation: Modulation::Qam1024,
                channel_model: ChannelKind::Rician,
                snr_db: 24.0,
                mode: DecodingMode::Jscc,
                seed: Some(42),
                ..Default::default()
            },
            logging: LogConfig::development(),
        };

        serde_yaml::to_string(&config).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SimulationConfig::default();
        assert_eq!(config.technology, Technology::FiveG);
        assert_eq!(config.channel_code, ChannelCode::Ldpc);
        assert_eq!(config.modulation, Modulation::Qpsk);
        assert_eq!(config.snr_db, 10.0);
        assert_eq!(config.mode, DecodingMode::Sscc);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_yaml_identifiers() {
        let yaml = r#"
simulation:
  technology: 5G_Advanced
  data_type: audio
  channel_code: Polar
  modulation: 256QAM
  channel_model: Rayleigh
  snr_db: 18.5
  mode: JSCC
"#;
        let config = PhylinkConfig::parse(yaml).unwrap();
        let sim = &config.simulation;
        assert_eq!(sim.technology, Technology::FiveGAdvanced);
        assert_eq!(sim.data_type, DataType::Audio);
        assert_eq!(sim.modulation, Modulation::Qam256);
        assert_eq!(sim.channel_model, ChannelKind::Rayleigh);
        assert_eq!(sim.mode, DecodingMode::Jscc);
        // Unspecified fields keep their defaults
        assert_eq!(sim.block_length, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_identifier_is_parse_error() {
        let err = PhylinkConfig::parse("simulation:\n  modulation: 8PSK\n").unwrap_err();
        assert!(matches!(err, PhyError::ConfigLoad(_)));
    }

    #[test]
    fn test_1024qam_requires_6g() {
        let mut config = SimulationConfig {
            modulation: Modulation::Qam1024,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, PhyError::Configuration { field: "modulation", .. }));

        config.technology = Technology::SixG;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parameter_validation() {
        let bad_rate = SimulationConfig {
            code_rate: 0.0,
            ..Default::default()
        };
        assert!(bad_rate.validate().is_err());

        let bad_snr = SimulationConfig::with_snr(f64::NAN);
        assert!(bad_snr.validate().is_err());
    }

    #[test]
    fn test_example_yaml_roundtrip() {
        let yaml = PhylinkConfig::example_yaml();
        assert!(yaml.contains("1024QAM"));
        let parsed = PhylinkConfig::parse(&yaml).unwrap();
        assert_eq!(parsed.simulation.technology, Technology::SixG);
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn test_save_and_load_from() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("phylink.yaml");
        let config = PhylinkConfig {
            simulation: SimulationConfig::with_snr(3.5),
            ..Default::default()
        };
        config.save(&path).unwrap();
        let loaded = PhylinkConfig::load_from(&path).unwrap();
        assert_eq!(loaded.simulation, config.simulation);
        assert!(PhylinkConfig::load_from(&dir.path().join("missing.yaml")).is_err());
    }

    #[test]
    fn test_config_search_paths() {
        let paths = PhylinkConfig::config_search_paths();
        assert!(paths.len() >= 2);
        assert_eq!(paths[0], PathBuf::from("./phylink.yaml"));
    }
}
