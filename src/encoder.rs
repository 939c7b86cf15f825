//! Reading encoder
//!
//! Encodes per-tick readings into JSON payloads for persistence collaborators.
//! Readings produced from the heuristic fallback carry a `heuristic_source`
//! quality flag so stored data is always watermarked.

use crate::error::EngineError;
use crate::types::{
    Classification, DistressMetric, FeatureVector, LoadReading, MetricsSnapshot, SignalSource,
};
use crate::{LOAD_VERSION, PRODUCER_NAME};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current payload schema version
pub const PAYLOAD_VERSION: &str = "1.0.0";

/// Quality markers attached to an encoded reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingQualityFlag {
    /// Face metrics came from the pointer-velocity proxy
    HeuristicSource,
    /// No vocal energy was observed
    NoVoiceSignal,
    /// No keyboard activity in the rolling window
    NoKeyboardActivity,
}

impl ReadingQualityFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingQualityFlag::HeuristicSource => "heuristic_source",
            ReadingQualityFlag::NoVoiceSignal => "no_voice_signal",
            ReadingQualityFlag::NoKeyboardActivity => "no_keyboard_activity",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingProvenance {
    pub signal_source: SignalSource,
    /// Engine clock at the tick (ms)
    pub tick_ms: u64,
    pub observed_at_utc: String,
    pub computed_at_utc: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingQuality {
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadSummary {
    pub score: u8,
    pub classification: Classification,
    pub is_heuristic: bool,
    pub crisis_fired: bool,
    pub distress_fired: Vec<DistressMetric>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSummary {
    pub keystrokes_per_minute: f64,
    pub error_rate: f64,
    pub pause_frequency: f64,
    pub context_switches: f64,
    pub facial_tension: f64,
    pub vocal_energy: f64,
}

impl From<&FeatureVector> for FeatureSummary {
    fn from(v: &FeatureVector) -> Self {
        Self {
            keystrokes_per_minute: v.keystrokes_per_minute(),
            error_rate: v.error_rate(),
            pause_frequency: v.pause_frequency(),
            context_switches: v.context_switches(),
            facial_tension: v.facial_tension(),
            vocal_energy: v.vocal_energy(),
        }
    }
}

/// Encoded form of one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingPayload {
    pub payload_version: String,
    pub producer: ReadingProducer,
    pub provenance: ReadingProvenance,
    pub quality: ReadingQuality,
    pub load: LoadSummary,
    pub metrics: MetricsSnapshot,
    pub features: FeatureSummary,
}

/// Reading encoder
pub struct ReadingEncoder {
    instance_id: String,
}

impl Default for ReadingEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadingEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn encode(&self, reading: &LoadReading) -> ReadingPayload {
        let computed_at = Utc::now();
        let signal_source = if reading.is_heuristic {
            SignalSource::Heuristic
        } else {
            SignalSource::Vision
        };

        ReadingPayload {
            payload_version: PAYLOAD_VERSION.to_string(),
            producer: ReadingProducer {
                name: PRODUCER_NAME.to_string(),
                version: LOAD_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            provenance: ReadingProvenance {
                signal_source,
                tick_ms: reading.tick_ms,
                observed_at_utc: reading.timestamp.to_rfc3339(),
                computed_at_utc: computed_at.to_rfc3339(),
            },
            quality: ReadingQuality {
                flags: quality_flags(reading)
                    .iter()
                    .map(|f| f.as_str().to_string())
                    .collect(),
            },
            load: LoadSummary {
                score: reading.score,
                classification: reading.classification,
                is_heuristic: reading.is_heuristic,
                crisis_fired: reading.crisis_fired,
                distress_fired: reading.distress_fired.clone(),
            },
            metrics: reading.metrics,
            features: FeatureSummary::from(&reading.features),
        }
    }

    /// Encode to pretty JSON
    pub fn encode_to_json(&self, reading: &LoadReading) -> Result<String, EngineError> {
        let payload = self.encode(reading);
        serde_json::to_string_pretty(&payload).map_err(EngineError::JsonError)
    }
}

fn quality_flags(reading: &LoadReading) -> Vec<ReadingQualityFlag> {
    let mut flags = Vec::new();
    if reading.is_heuristic {
        flags.push(ReadingQualityFlag::HeuristicSource);
    }
    if reading.metrics.vocal_energy <= 0.0 {
        flags.push(ReadingQualityFlag::NoVoiceSignal);
    }
    if reading.features.keystrokes_per_minute() <= 0.0 {
        flags.push(ReadingQualityFlag::NoKeyboardActivity);
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn make_reading(is_heuristic: bool) -> LoadReading {
        LoadReading {
            score: 72,
            classification: Classification::ApproachingOverload,
            metrics: MetricsSnapshot {
                tension: 40.0,
                vocal_energy: 22.0,
                ..Default::default()
            },
            features: FeatureVector::new([0.4, 0.1, 0.0, 0.2, 0.4, 0.22]),
            is_heuristic,
            crisis_fired: false,
            distress_fired: vec![],
            tick_ms: 14_000,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_heuristic_readings_are_watermarked() {
        let encoder = ReadingEncoder::new();
        let payload = encoder.encode(&make_reading(true));
        assert_eq!(payload.quality.flags, vec!["heuristic_source".to_string()]);
        assert_eq!(payload.provenance.signal_source, SignalSource::Heuristic);
        assert!(payload.load.is_heuristic);
    }

    #[test]
    fn test_vision_readings_have_no_watermark() {
        let encoder = ReadingEncoder::new();
        let payload = encoder.encode(&make_reading(false));
        assert!(payload.quality.flags.is_empty());
        assert_eq!(payload.provenance.signal_source, SignalSource::Vision);
    }

    #[test]
    fn test_missing_channels_are_flagged() {
        let mut reading = make_reading(false);
        reading.metrics.vocal_energy = 0.0;
        reading.features = FeatureVector::default();
        let payload = ReadingEncoder::new().encode(&reading);
        assert_eq!(
            payload.quality.flags,
            vec!["no_voice_signal".to_string(), "no_keyboard_activity".to_string()]
        );
    }

    #[test]
    fn test_encode_to_json() {
        let encoder = ReadingEncoder::with_instance_id("test-instance".to_string());
        let json = encoder.encode_to_json(&make_reading(true)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["payload_version"], PAYLOAD_VERSION);
        assert_eq!(value["producer"]["name"], PRODUCER_NAME);
        assert_eq!(value["producer"]["instance_id"], "test-instance");
        assert_eq!(value["load"]["score"], 72);
        assert_eq!(value["load"]["classification"], "approaching_overload");
        assert_eq!(value["provenance"]["observed_at_utc"], "2024-03-04T10:00:00+00:00");
        assert_eq!(value["features"]["facial_tension"], 0.4);
    }

    #[test]
    fn test_unique_instance_ids() {
        assert_ne!(
            ReadingEncoder::new().instance_id(),
            ReadingEncoder::new().instance_id()
        );
    }
}
