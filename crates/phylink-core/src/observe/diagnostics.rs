//! Pipeline diagnostics
//!
//! The pipeline reports stage completions, component fallbacks and metric
//! values to a [`DiagnosticsSink`] handed to it at construction, so that
//! nothing depends on a global logger. [`TracingSink`] forwards events to
//! `tracing`; [`RecordingSink`] keeps them for later inspection.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;

/// The seven pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    SourceEncode,
    ChannelEncode,
    Modulate,
    ChannelTransmit,
    Demodulate,
    ChannelDecode,
    SourceDecode,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::SourceEncode,
        Stage::ChannelEncode,
        Stage::Modulate,
        Stage::ChannelTransmit,
        Stage::Demodulate,
        Stage::ChannelDecode,
        Stage::SourceDecode,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::SourceEncode => "source_encode",
            Stage::ChannelEncode => "channel_encode",
            Stage::Modulate => "modulate",
            Stage::ChannelTransmit => "channel_transmit",
            Stage::Demodulate => "demodulate",
            Stage::ChannelDecode => "channel_decode",
            Stage::SourceDecode => "source_decode",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receiver for pipeline diagnostics.
pub trait DiagnosticsSink: Send + Sync {
    /// A stage finished. `detail` is a short human-readable summary.
    fn stage_completed(&self, stage: Stage, detail: &str);

    /// A component substituted a simpler behaviour.
    fn fallback(&self, component: &str, reason: &str);

    /// A named metric value was produced.
    fn metric(&self, name: &str, value: f64);
}

/// Forwards diagnostics to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn stage_completed(&self, stage: Stage, detail: &str) {
        tracing::debug!(stage = stage.as_str(), detail, "Stage completed");
    }

    fn fallback(&self, component: &str, reason: &str) {
        tracing::warn!(component, reason, "Falling back");
    }

    fn metric(&self, name: &str, value: f64) {
        tracing::trace!(metric = name, value, "Metric");
    }
}

/// One recorded diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DiagnosticEvent {
    StageCompleted { stage: Stage, detail: String },
    Fallback { component: String, reason: String },
    Metric { name: String, value: f64 },
}

/// Stores diagnostics in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far
    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.lock().clone()
    }

    /// Completed stages in the order they were reported
    pub fn stages(&self) -> Vec<Stage> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                DiagnosticEvent::StageCompleted { stage, .. } => Some(*stage),
                _ => None,
            })
            .collect()
    }

    /// `(component, reason)` pairs of all fallbacks
    pub fn fallbacks(&self) -> Vec<(String, String)> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                DiagnosticEvent::Fallback { component, reason } => Some((component.clone(), reason.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<DiagnosticEvent>> {
        // A poisoned log is still a valid log
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn push(&self, event: DiagnosticEvent) {
        self.lock().push(event);
    }
}

impl DiagnosticsSink for RecordingSink {
    fn stage_completed(&self, stage: Stage, detail: &str) {
        self.push(DiagnosticEvent::StageCompleted {
            stage,
            detail: detail.to_string(),
        });
    }

    fn fallback(&self, component: &str, reason: &str) {
        self.push(DiagnosticEvent::Fallback {
            component: component.to_string(),
            reason: reason.to_string(),
        });
    }

    fn metric(&self, name: &str, value: f64) {
        self.push(DiagnosticEvent::Metric {
            name: name.to_string(),
            value,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        sink.stage_completed(Stage::Modulate, "512 symbols");
        sink.fallback("jscc", "too short");
        sink.stage_completed(Stage::Demodulate, "1024 llrs");
        sink.metric("ber", 0.01);

        assert_eq!(sink.stages(), vec![Stage::Modulate, Stage::Demodulate]);
        assert_eq!(sink.fallbacks(), vec![("jscc".to_string(), "too short".to_string())]);
        assert_eq!(sink.events().len(), 4);

        sink.clear();
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_stage_names() {
        let names: Vec<&str> = Stage::ALL.iter().map(|s| s.as_str()).collect();
        assert_eq!(names[0], "source_encode");
        assert_eq!(names[6], "source_decode");
        assert_eq!(Stage::ChannelTransmit.to_string(), "channel_transmit");
    }

    #[test]
    fn test_tracing_sink_is_object_safe() {
        let sink: std::sync::Arc<dyn DiagnosticsSink> = std::sync::Arc::new(TracingSink);
        sink.stage_completed(Stage::SourceEncode, "ok");
        sink.metric("ber", 0.0);
    }
}
