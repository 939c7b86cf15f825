//! Core types for the Synheart Load engine
//!
//! This module defines the records that flow between the stages of the engine:
//! per-adapter samples, the fused metrics snapshot, the feature vector handed to
//! the scorer, and the per-tick reading handed to consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which path produced the face-derived metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    /// On-device facial inference
    Vision,
    /// Pointer-velocity proxy used after the vision path was unavailable
    Heuristic,
}

/// Adapter that produced a biometric sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleSource {
    Vision,
    Voice,
    Behavioral,
}

/// Composite face metrics, each in [0, 100]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VisionMetrics {
    pub tension: f64,
    pub gaze_wander: f64,
    pub joy: f64,
    pub frustration: f64,
    pub confusion: f64,
}

/// Vocal metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VoiceMetrics {
    /// RMS energy scaled to [0, 100]
    pub vocal_energy: f64,
    /// Words per minute; `None` when transcription is unavailable
    pub speech_rate: Option<f64>,
}

/// Pointer-derived behavioral proxies
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BehaviorMetrics {
    /// Frustration proxy in [0, 100]
    pub frustration: f64,
    /// Joy proxy in [0, 100]
    pub joy: f64,
    /// Smoothed pointer velocity (px/ms)
    pub velocity: f64,
}

/// One sample from one adapter; last value wins per source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum BiometricSample {
    Vision(VisionMetrics),
    Voice(VoiceMetrics),
    Behavioral(BehaviorMetrics),
}

impl BiometricSample {
    pub fn source(&self) -> SampleSource {
        match self {
            BiometricSample::Vision(_) => SampleSource::Vision,
            BiometricSample::Voice(_) => SampleSource::Voice,
            BiometricSample::Behavioral(_) => SampleSource::Behavioral,
        }
    }
}

/// Latest value of every metric field, read without blocking producers
///
/// `joy` and `frustration` are the stronger of the face and pointer estimates;
/// the pointer estimates are also reported on their own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub tension: f64,
    pub gaze_wander: f64,
    pub joy: f64,
    pub frustration: f64,
    pub confusion: f64,
    pub vocal_energy: f64,
    pub speech_rate: f64,
    #[serde(default)]
    pub pointer_frustration: f64,
    #[serde(default)]
    pub pointer_joy: f64,
}

/// Number of scalars in a feature vector
pub const FEATURE_COUNT: usize = 6;

/// Six pre-normalized scalars handed to the scorer
///
/// Order: keystrokes per minute, error rate, pause frequency, context switches,
/// facial tension, vocal energy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector([f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn new(values: [f64; FEATURE_COUNT]) -> Self {
        Self(values)
    }

    pub fn as_array(&self) -> &[f64; FEATURE_COUNT] {
        &self.0
    }

    pub fn keystrokes_per_minute(&self) -> f64 {
        self.0[0]
    }

    pub fn error_rate(&self) -> f64 {
        self.0[1]
    }

    pub fn pause_frequency(&self) -> f64 {
        self.0[2]
    }

    pub fn context_switches(&self) -> f64 {
        self.0[3]
    }

    pub fn facial_tension(&self) -> f64 {
        self.0[4]
    }

    pub fn vocal_energy(&self) -> f64 {
        self.0[5]
    }
}

/// Discrete load bucket, ordered from lowest to highest load
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Hyperfocus,
    Normal,
    ApproachingOverload,
    Overload,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Hyperfocus => "hyperfocus",
            Classification::Normal => "normal",
            Classification::ApproachingOverload => "approaching_overload",
            Classification::Overload => "overload",
        }
    }
}

/// Score and classification for one evaluation tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CognitiveState {
    pub score: u8,
    pub classification: Classification,
    pub is_heuristic: bool,
    pub timestamp: DateTime<Utc>,
}

/// Edge event emitted when the classification changes between ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationChange {
    pub from: Classification,
    pub to: Classification,
    pub score: u8,
}

/// Face presence transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaceEvent {
    FaceLost,
    FaceRecovered,
}

/// Metric watched by the sustained distress trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistressMetric {
    Frustration,
    Confusion,
}

/// Everything the engine emits per evaluation tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadReading {
    pub score: u8,
    pub classification: Classification,
    pub metrics: MetricsSnapshot,
    pub features: FeatureVector,
    pub is_heuristic: bool,
    /// Crisis intervention fired on this tick
    pub crisis_fired: bool,
    /// Distress metrics whose sustained trigger fired on this tick
    pub distress_fired: Vec<DistressMetric>,
    /// Monotonic engine time of the tick (ms)
    pub tick_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl LoadReading {
    pub fn state(&self) -> CognitiveState {
        CognitiveState {
            score: self.score,
            classification: self.classification,
            is_heuristic: self.is_heuristic,
            timestamp: self.timestamp,
        }
    }
}
