//! Core types for link simulation
//!
//! Bits travel through the chain as `Vec<u8>` holding 0/1 values, soft
//! information as `Vec<f64>` log-likelihood ratios, and modulated signals as
//! complex baseband symbols.
//!
//! ## LLR Sign Convention
//!
//! ```text
//!   LLR = ln( P(bit = 0) / P(bit = 1) )
//!
//!   strongly 1  <-------- 0 -------->  strongly 0
//!       -inf          (unsure)            +inf
//! ```
//!
//! Every component in the crate (demodulators, decoders, the source model)
//! follows this convention: a negative LLR means "bit likely 1".

use crate::error::{PhyError, PhyResult};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Type alias for complex numbers using f64 precision
pub type Complex = Complex64;

/// A block of single-bit values (each element is 0 or 1)
pub type BitBlock = Vec<u8>;

/// A sequence of complex constellation symbols
pub type SymbolBuffer = Vec<Complex>;

/// One log-likelihood ratio per transmitted bit
pub type LlrVector = Vec<f64>;

macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $($(#[$vmeta:meta])* $variant:ident => $ident:literal $(| $alias:literal)*),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $ident)]
                $variant,
            )+
        }

        impl $name {
            /// Every variant, in declaration order
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Canonical string identifier
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $ident,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = PhyError;

            fn from_str(s: &str) -> PhyResult<Self> {
                let normalized = normalize_identifier(s);
                $(
                    if normalized == normalize_identifier($ident)
                        $(|| normalized == normalize_identifier($alias))*
                    {
                        return Ok($name::$variant);
                    }
                )+
                Err(PhyError::UnknownIdentifier {
                    kind: $kind,
                    name: s.to_string(),
                })
            }
        }
    };
}

/// Lookup key used by all string factories: case and separators are ignored.
fn normalize_identifier(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, '-' | '_' | ' '))
        .flat_map(char::to_uppercase)
        .collect()
}

string_enum! {
    /// Radio technology generation, which determines the allowed code and
    /// modulation sets
    Technology, "technology" {
        #[default]
        FiveG => "5G",
        FiveGAdvanced => "5G_Advanced" | "5G-A",
        SixG => "6G",
    }
}

string_enum! {
    /// Kind of source data carried by the bit block
    DataType, "data_type" {
        #[default]
        Text => "text",
        Audio => "audio",
        Image => "image",
        Video => "video",
    }
}

string_enum! {
    /// Channel code family
    ChannelCode, "channel_code" {
        #[default]
        Ldpc => "LDPC",
        Polar => "Polar",
    }
}

string_enum! {
    /// Digital modulation scheme
    Modulation, "modulation" {
        #[default]
        Qpsk => "QPSK" | "4QAM",
        Qam16 => "16QAM",
        Qam64 => "64QAM",
        Qam256 => "256QAM",
        Qam1024 => "1024QAM",
    }
}

string_enum! {
    /// Propagation model applied between modulator and demodulator
    ChannelKind, "channel_model" {
        #[default]
        Awgn => "AWGN",
        Rayleigh => "Rayleigh",
        Rician => "Rician" | "Rice",
    }
}

string_enum! {
    /// Separate or joint source-channel decoding
    DecodingMode, "mode" {
        #[default]
        Sscc => "SSCC",
        Jscc => "JSCC",
    }
}

impl Technology {
    /// Modulations this technology is allowed to use
    pub fn allowed_modulations(&self) -> &'static [Modulation] {
        match self {
            Technology::FiveG | Technology::FiveGAdvanced => &[
                Modulation::Qpsk,
                Modulation::Qam16,
                Modulation::Qam64,
                Modulation::Qam256,
            ],
            Technology::SixG => Modulation::ALL,
        }
    }

    /// Channel codes this technology is allowed to use
    pub fn allowed_codes(&self) -> &'static [ChannelCode] {
        ChannelCode::ALL
    }
}

impl Modulation {
    /// Constellation size M
    pub fn order(&self) -> usize {
        match self {
            Modulation::Qpsk => 4,
            Modulation::Qam16 => 16,
            Modulation::Qam64 => 64,
            Modulation::Qam256 => 256,
            Modulation::Qam1024 => 1024,
        }
    }

    /// Bits carried by one symbol, log2(M)
    pub fn bits_per_symbol(&self) -> usize {
        self.order().trailing_zeros() as usize
    }
}

/// Zero-fill `bits` up to the next multiple of `multiple`.
pub fn pad_to_multiple(bits: &[u8], multiple: usize) -> Vec<u8> {
    let mut padded = bits.to_vec();
    if multiple > 0 {
        let remainder = bits.len() % multiple;
        if remainder != 0 {
            padded.resize(bits.len() + multiple - remainder, 0);
        }
    }
    padded
}

/// Pack bits into bytes, MSB first. A trailing partial byte is zero-padded.
pub fn pack_bits(bits: &[u8]) -> Vec<u8> {
    bits.chunks(8)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .fold(0u8, |acc, (i, &b)| acc | ((b & 1) << (7 - i)))
        })
        .collect()
}

/// Unpack bytes into bits, MSB first.
pub fn unpack_bits(bytes: &[u8]) -> Vec<u8> {
    bytes
        .iter()
        .flat_map(|&byte| (0..8).rev().map(move |i| (byte >> i) & 1))
        .collect()
}

/// Hard decision on LLRs: negative means 1.
pub fn hard_decision(llrs: &[f64]) -> Vec<u8> {
    llrs.iter().map(|&l| u8::from(l < 0.0)).collect()
}

/// Check that every element of a bit block is 0 or 1.
pub fn validate_bits(bits: &[u8]) -> PhyResult<()> {
    if bits.is_empty() {
        return Err(PhyError::DegenerateInput("bit block is empty".into()));
    }
    if let Some(pos) = bits.iter().position(|&b| b > 1) {
        return Err(PhyError::DegenerateInput(format!(
            "non-binary value {} at position {}",
            bits[pos], pos
        )));
    }
    Ok(())
}

/// Convert dB to linear power ratio
#[inline]
pub fn db_to_linear(db: f64) -> f64 {
    10.0_f64.powf(db / 10.0)
}

/// Convert linear power ratio to dB
#[inline]
pub fn linear_to_db(linear: f64) -> f64 {
    10.0 * linear.log10()
}

/// Mean |x|² over a symbol sequence (0 for an empty one)
pub fn average_power(symbols: &[Complex]) -> f64 {
    if symbols.is_empty() {
        return 0.0;
    }
    symbols.iter().map(|s| s.norm_sqr()).sum::<f64>() / symbols.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pack_unpack_msb_first() {
        let bits = vec![1, 0, 0, 0, 0, 0, 0, 1, 1, 1];
        let bytes = pack_bits(&bits);
        assert_eq!(bytes, vec![0x81, 0xC0]);
        assert_eq!(&unpack_bits(&bytes)[..10], &bits[..]);
    }

    #[test]
    fn test_pad_to_multiple() {
        assert_eq!(pad_to_multiple(&[1, 1, 1], 4), vec![1, 1, 1, 0]);
        assert_eq!(pad_to_multiple(&[1, 1, 1, 1], 4).len(), 4);
        assert!(pad_to_multiple(&[], 4).is_empty());
    }

    #[test]
    fn test_hard_decision_convention() {
        assert_eq!(hard_decision(&[2.0, -0.1, 0.0, -7.0]), vec![0, 1, 0, 1]);
    }

    #[test]
    fn test_identifier_parsing() {
        assert_eq!("16qam".parse::<Modulation>().unwrap(), Modulation::Qam16);
        assert_eq!("5g-advanced".parse::<Technology>().unwrap(), Technology::FiveGAdvanced);
        assert_eq!("polar".parse::<ChannelCode>().unwrap(), ChannelCode::Polar);
        assert_eq!(Modulation::Qam1024.to_string(), "1024QAM");
        assert!(matches!(
            "8PSK".parse::<Modulation>(),
            Err(PhyError::UnknownIdentifier { kind: "modulation", .. })
        ));
    }

    #[test]
    fn test_allowed_modulations() {
        assert!(!Technology::FiveG.allowed_modulations().contains(&Modulation::Qam1024));
        assert!(Technology::SixG.allowed_modulations().contains(&Modulation::Qam1024));
        assert_eq!(Modulation::Qam256.bits_per_symbol(), 8);
    }

    #[test]
    fn test_enum_defaults() {
        assert_eq!(Technology::default(), Technology::FiveG);
        assert_eq!(DataType::default(), DataType::Text);
        assert_eq!(ChannelCode::default(), ChannelCode::Ldpc);
        assert_eq!(Modulation::default(), Modulation::Qpsk);
        assert_eq!(ChannelKind::default(), ChannelKind::Awgn);
        assert_eq!(DecodingMode::default(), DecodingMode::Sscc);
    }

    #[test]
    fn test_validate_bits() {
        assert!(validate_bits(&[0, 1, 1]).is_ok());
        assert!(validate_bits(&[]).is_err());
        assert!(validate_bits(&[0, 2]).is_err());
    }

    #[test]
    fn test_db_conversion() {
        assert_relative_eq!(db_to_linear(10.0), 10.0, epsilon = 1e-12);
        assert_relative_eq!(linear_to_db(100.0), 20.0, epsilon = 1e-12);
        let s = vec![Complex::new(1.0, 1.0), Complex::new(0.0, 0.0)];
        assert_relative_eq!(average_power(&s), 1.0, epsilon = 1e-12);
    }
}
