//! End-to-end quality metrics
//!
//! Information measures (entropy, mutual information), error rates (BER,
//! SER) and fidelity measures (MSE, PSNR, SSIM, SNR).
//!
//! [`MetricsEngine`] views bit blocks as 8-bit samples (bits packed MSB
//! first) for everything except BER, which compares the bits directly.
//!
//! ## Example
//!
//! ```rust
//! use phylink_core::metrics::{calculate_ber, psnr};
//!
//! assert_eq!(calculate_ber(&[0, 1, 0, 1], &[0, 1, 0, 1]), 0.0);
//! assert_eq!(calculate_ber(&[0, 0, 0, 0], &[1, 1, 1, 1]), 1.0);
//! assert!(psnr(&[10.0, 20.0], &[10.0, 20.0], 255.0).is_infinite());
//! ```

use crate::types::{pack_bits, DataType};
use std::collections::BTreeMap;

/// Named metric values
pub type Metrics = BTreeMap<String, f64>;

/// Shannon entropy in bits per symbol.
pub fn entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut counts = [0usize; 256];
    for &x in data {
        counts[x as usize] += 1;
    }
    let n = data.len() as f64;
    -counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / n;
            p * (p + 1e-10).log2()
        })
        .sum::<f64>()
}

/// I(X;Y) = H(X) + H(Y) − H(X,Y), clamped at zero.
pub fn mutual_information(x: &[u8], y: &[u8]) -> f64 {
    let len = x.len().min(y.len());
    if len == 0 {
        return 0.0;
    }
    let (x, y) = (&x[..len], &y[..len]);

    let mut joint: BTreeMap<(u8, u8), usize> = BTreeMap::new();
    for (&a, &b) in x.iter().zip(y) {
        *joint.entry((a, b)).or_insert(0) += 1;
    }
    let n = len as f64;
    let h_xy = -joint
        .values()
        .map(|&c| {
            let p = c as f64 / n;
            p * (p + 1e-10).log2()
        })
        .sum::<f64>();

    (entropy(x) + entropy(y) - h_xy).max(0.0)
}

/// Fraction of positions that differ (over the common prefix).
pub fn calculate_ber(original: &[u8], received: &[u8]) -> f64 {
    let len = original.len().min(received.len());
    if len == 0 {
        return 0.0;
    }
    let errors = original[..len]
        .iter()
        .zip(&received[..len])
        .filter(|(a, b)| a != b)
        .count();
    errors as f64 / len as f64
}

/// Fraction of symbols that differ.
pub fn calculate_ser(original: &[usize], received: &[usize]) -> f64 {
    let len = original.len().min(received.len());
    if len == 0 {
        return 0.0;
    }
    let errors = original.iter().zip(received).take(len).filter(|(a, b)| a != b).count();
    errors as f64 / len as f64
}

/// Mean squared error over the common prefix.
pub fn mse(original: &[f64], reconstructed: &[f64]) -> f64 {
    let len = original.len().min(reconstructed.len());
    if len == 0 {
        return 0.0;
    }
    original
        .iter()
        .zip(reconstructed)
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f64>()
        / len as f64
}

/// Peak signal-to-noise ratio in dB; +∞ when the inputs match.
pub fn psnr(original: &[f64], reconstructed: &[f64], max_value: f64) -> f64 {
    let err = mse(original, reconstructed);
    if err == 0.0 {
        return f64::INFINITY;
    }
    20.0 * max_value.log10() - 10.0 * err.log10()
}

/// Global (single-window) structural similarity.
pub fn ssim(original: &[f64], reconstructed: &[f64], data_range: f64) -> f64 {
    let len = original.len().min(reconstructed.len());
    if len == 0 {
        return 1.0;
    }
    let (x, y) = (&original[..len], &reconstructed[..len]);
    let n = len as f64;
    let mu_x = x.iter().sum::<f64>() / n;
    let mu_y = y.iter().sum::<f64>() / n;
    let var_x = x.iter().map(|v| (v - mu_x).powi(2)).sum::<f64>() / n;
    let var_y = y.iter().map(|v| (v - mu_y).powi(2)).sum::<f64>() / n;
    let cov = x.iter().zip(y).map(|(a, b)| (a - mu_x) * (b - mu_y)).sum::<f64>() / n;

    let c1 = (0.01 * data_range).powi(2);
    let c2 = (0.03 * data_range).powi(2);
    ((2.0 * mu_x * mu_y + c1) * (2.0 * cov + c2)) / ((mu_x.powi(2) + mu_y.powi(2) + c1) * (var_x + var_y + c2))
}

/// Signal power over error power in dB; +∞ when the inputs match.
pub fn snr_db(original: &[f64], reconstructed: &[f64]) -> f64 {
    let len = original.len().min(reconstructed.len());
    if len == 0 {
        return 0.0;
    }
    let signal = original[..len].iter().map(|v| v * v).sum::<f64>() / len as f64;
    let noise = mse(original, reconstructed);
    if noise == 0.0 {
        return f64::INFINITY;
    }
    10.0 * (signal / noise).log10()
}

/// Serde adapter for [`Metrics`] that writes non-finite values as the
/// strings `"inf"`, `"-inf"` and `"nan"`, which JSON cannot otherwise hold.
///
/// Use with `#[serde(with = "phylink_core::metrics::serde_nonfinite")]`.
pub mod serde_nonfinite {
    use super::Metrics;
    use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum Value {
        Number(f64),
        Special(String),
    }

    pub fn serialize<S: Serializer>(metrics: &Metrics, serializer: S) -> Result<S::Ok, S::Error> {
        let map: BTreeMap<&str, Value> = metrics
            .iter()
            .map(|(k, &v)| {
                let value = if v.is_finite() {
                    Value::Number(v)
                } else if v.is_nan() {
                    Value::Special("nan".into())
                } else if v > 0.0 {
                    Value::Special("inf".into())
                } else {
                    Value::Special("-inf".into())
                };
                (k.as_str(), value)
            })
            .collect();
        map.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Metrics, D::Error> {
        BTreeMap::<String, Value>::deserialize(deserializer)?
            .into_iter()
            .map(|(k, v)| {
                let x = match v {
                    Value::Number(x) => x,
                    Value::Special(s) => match s.as_str() {
                        "inf" => f64::INFINITY,
                        "-inf" => f64::NEG_INFINITY,
                        "nan" => f64::NAN,
                        other => return Err(de::Error::custom(format!("invalid metric value '{}'", other))),
                    },
                };
                Ok((k, x))
            })
            .collect()
    }
}

/// Computes the metric set for a simulation run.
#[derive(Debug, Clone, Default)]
pub struct MetricsEngine;

impl MetricsEngine {
    /// Stateless; every call recomputes from the two bit blocks.
    pub fn new() -> Self {
        Self
    }

    /// Entropy, mutual information, MSE and BER always; PSNR/SSIM for image
    /// and video; SNR for audio.
    pub fn calculate_all(&self, original_bits: &[u8], reconstructed_bits: &[u8], data_type: DataType) -> Metrics {
        let original = pack_bits(original_bits);
        let reconstructed = pack_bits(reconstructed_bits);
        let orig_f: Vec<f64> = original.iter().map(|&b| b as f64).collect();
        let recon_f: Vec<f64> = reconstructed.iter().map(|&b| b as f64).collect();

        let mut metrics = Metrics::new();
        metrics.insert("entropy".into(), entropy(&original));
        metrics.insert("mutual_information".into(), mutual_information(&original, &reconstructed));
        metrics.insert("mse".into(), mse(&orig_f, &recon_f));
        metrics.insert("ber".into(), calculate_ber(original_bits, reconstructed_bits));

        match data_type {
            DataType::Image | DataType::Video => {
                // 8-bit samples peak at 255
                metrics.insert("psnr".into(), psnr(&orig_f, &recon_f, 255.0));
                metrics.insert("ssim".into(), ssim(&orig_f, &recon_f, 255.0));
            }
            DataType::Audio => {
                metrics.insert("snr".into(), snr_db(&orig_f, &recon_f));
            }
            DataType::Text => {}
        }

        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_ber_bounds() {
        assert_eq!(calculate_ber(&[0, 1, 0, 1], &[0, 1, 0, 1]), 0.0);
        assert_eq!(calculate_ber(&[0, 0, 0, 0], &[1, 1, 1, 1]), 1.0);
        assert_relative_eq!(calculate_ber(&[0, 0, 1, 1], &[0, 1, 1, 0]), 0.5);
    }

    #[test]
    fn test_ser() {
        assert_relative_eq!(calculate_ser(&[1, 2, 3, 4], &[1, 2, 0, 4]), 0.25);
        assert_eq!(calculate_ser(&[], &[]), 0.0);
    }

    #[test]
    fn test_entropy() {
        assert_relative_eq!(entropy(&[7; 64]), 0.0, epsilon = 1e-8);
        let uniform: Vec<u8> = (0..=255).collect();
        assert_relative_eq!(entropy(&uniform), 8.0, epsilon = 1e-6);
        assert_relative_eq!(entropy(&[0, 1, 0, 1]), 1.0, epsilon = 1e-8);
    }

    #[test]
    fn test_mutual_information() {
        let x: Vec<u8> = (0..64).map(|i| (i % 4) as u8).collect();
        assert_relative_eq!(mutual_information(&x, &x), 2.0, epsilon = 1e-6);
        let constant = vec![0u8; 64];
        assert_relative_eq!(mutual_information(&x, &constant), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_psnr_identical_is_infinite() {
        let x = vec![1.0, 100.0, 255.0];
        assert!(psnr(&x, &x, 255.0).is_infinite());
        assert!(snr_db(&x, &x).is_infinite());
    }

    #[test]
    fn test_psnr_known_noise() {
        // Alternating ±5 error gives MSE = 25 exactly.
        let x: Vec<f64> = (0..100).map(|i| (i % 200) as f64).collect();
        let y: Vec<f64> = x.iter().enumerate().map(|(i, v)| if i % 2 == 0 { v + 5.0 } else { v - 5.0 }).collect();
        let expected = 10.0 * (255.0f64 * 255.0 / 25.0).log10();
        assert_relative_eq!(psnr(&x, &y, 255.0), expected, epsilon = 1e-9);
        assert!((34.0..34.3).contains(&expected));
    }

    #[test]
    fn test_ssim_properties() {
        let x: Vec<f64> = (0..50).map(|i| (i * 5) as f64).collect();
        assert_relative_eq!(ssim(&x, &x, 255.0), 1.0, epsilon = 1e-12);
        let inverted: Vec<f64> = x.iter().map(|v| 255.0 - v).collect();
        assert!(ssim(&x, &inverted, 255.0) < 0.0);
    }

    #[test]
    fn test_engine_metric_sets() {
        let engine = MetricsEngine::new();
        let bits: Vec<u8> = (0..64).map(|i| (i % 3 == 0) as u8).collect();
        let mut received = bits.clone();
        received[10] ^= 1;

        let text = engine.calculate_all(&bits, &received, DataType::Text);
        for key in ["entropy", "mutual_information", "mse", "ber"] {
            assert!(text.contains_key(key), "missing {}", key);
        }
        assert!(!text.contains_key("psnr"));
        assert_relative_eq!(text["ber"], 1.0 / 64.0);

        let image = engine.calculate_all(&bits, &received, DataType::Image);
        assert!(image["psnr"].is_finite());
        assert!(image.contains_key("ssim"));

        let audio = engine.calculate_all(&bits, &bits, DataType::Audio);
        assert!(audio["snr"].is_infinite());
        assert_eq!(audio["mse"], 0.0);
    }

    #[test]
    fn test_nonfinite_metrics_survive_json() {
        #[derive(serde::Serialize, serde::Deserialize)]
        struct Wrapper {
            #[serde(with = "serde_nonfinite")]
            metrics: Metrics,
        }

        let mut metrics = Metrics::new();
        metrics.insert("psnr".into(), f64::INFINITY);
        metrics.insert("ber".into(), 0.125);
        let json = serde_json::to_string(&Wrapper { metrics }).unwrap();
        assert!(json.contains("\"inf\""));

        let back: Wrapper = serde_json::from_str(&json).unwrap();
        assert!(back.metrics["psnr"].is_infinite());
        assert_eq!(back.metrics["ber"], 0.125);
        assert!(serde_json::from_str::<Wrapper>(r#"{"metrics":{"x":"huge"}}"#).is_err());
    }
}
