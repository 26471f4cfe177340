//! Error taxonomy for the link simulator
//!
//! Configuration problems are fatal and surface before a simulation runs.
//! Numerical degeneracy (empty blocks, non-binary input) is rejected with
//! [`PhyError::DegenerateInput`]. Decoder non-convergence is never an error:
//! decoders return their best estimate and report convergence as data.

/// Result type for link-simulation operations
pub type PhyResult<T> = Result<T, PhyError>;

/// Errors that can occur while configuring or running the signal chain
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PhyError {
    #[error("Invalid configuration: {field} = {value}: {reason}")]
    Configuration {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Unknown {kind} identifier: '{name}'")]
    UnknownIdentifier { kind: &'static str, name: String },

    #[error("Degenerate input: {0}")]
    DegenerateInput(String),

    #[error("Symbol {symbol} outside source alphabet of size {alphabet_size}")]
    SymbolOutOfAlphabet { symbol: usize, alphabet_size: usize },

    #[error("Numerical failure: {0}")]
    NumericalFailure(String),

    #[error("Failed to load configuration: {0}")]
    ConfigLoad(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl PhyError {
    /// Shorthand for a configuration error on one field
    pub fn config(field: &'static str, value: impl ToString, reason: impl Into<String>) -> Self {
        PhyError::Configuration {
            field,
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// True for errors raised before any simulation work starts
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            PhyError::Configuration { .. } | PhyError::UnknownIdentifier { .. }
        )
    }
}

impl From<std::io::Error> for PhyError {
    fn from(err: std::io::Error) -> Self {
        PhyError::Io(err.to_string())
    }
}
