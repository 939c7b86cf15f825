//! Engine configuration
//!
//! Every threshold, gain and cadence used by the engine lives here so hosts can
//! tune policy without touching the pipeline. Defaults reproduce the observed
//! production behavior.

use crate::calibration::CalibrationPolicy;
use crate::error::EngineError;
use serde::{Deserialize, Serialize};

/// Score boundaries between the four classification buckets (inclusive upper bounds)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Scores at or below this are Hyperfocus
    pub hyperfocus_max: u8,
    /// Scores at or below this (and above `hyperfocus_max`) are Normal
    pub normal_max: u8,
    /// Scores at or below this (and above `normal_max`) are ApproachingOverload
    pub approaching_overload_max: u8,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            hyperfocus_max: 25,
            normal_max: 65,
            approaching_overload_max: 80,
        }
    }
}

/// Hysteresis bands for the intervention triggers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterventionConfig {
    /// Crisis fires when the score is strictly above this
    pub crisis_fire_above: u8,
    /// After a dismissal the crisis trigger re-arms once the score is strictly below this
    pub crisis_rearm_below: u8,
    /// Per-metric distress level (inclusive)
    pub sustained_threshold: f64,
    /// How long a metric must stay at or above the threshold before firing
    pub sustained_hold_ms: u64,
    /// Run the per-metric distress triggers (gameplay sessions)
    pub distress_monitor: bool,
}

impl Default for InterventionConfig {
    fn default() -> Self {
        Self {
            crisis_fire_above: 90,
            crisis_rearm_below: 80,
            sustained_threshold: 80.0,
            sustained_hold_ms: 5_000,
            distress_monitor: true,
        }
    }
}

/// Gains used by the pointer-velocity pseudo-metrics emitted in heuristic fallback.
///
/// Frustration and joy come straight from the behavioral adapter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackGains {
    pub tension_per_velocity: f64,
    pub gaze_wander_per_velocity: f64,
    pub confusion_per_velocity: f64,
}

impl Default for FallbackGains {
    fn default() -> Self {
        Self {
            tension_per_velocity: 15.0,
            gaze_wander_per_velocity: 10.0,
            confusion_per_velocity: 5.0,
        }
    }
}

/// Vision adapter settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// Continuous no-detection time before FaceLost fires
    pub face_lost_after_ms: u64,
    /// Fallback cadence (200 ms = 5 Hz)
    pub fallback_interval_ms: u64,
    /// Multiplier applied to the relative brow-distance drop
    pub tension_gain: f64,
    pub fallback: FallbackGains,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            face_lost_after_ms: 5_000,
            fallback_interval_ms: 200,
            tension_gain: 1_000.0,
            fallback: FallbackGains::default(),
        }
    }
}

/// Voice adapter settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Samples per RMS analysis window
    pub analysis_window: usize,
    /// Multiplier applied to the RMS before clamping to 100
    pub energy_gain: f64,
    /// Cadence when transcription is unavailable (1 Hz)
    pub energy_only_interval_ms: u64,
    /// Elapsed time below which words-per-minute is reported as zero
    pub min_rate_elapsed_ms: u64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            analysis_window: 2_048,
            energy_gain: 500.0,
            energy_only_interval_ms: 1_000,
            min_rate_elapsed_ms: 1_000,
        }
    }
}

/// Multipliers applied to behavioral metrics under one interaction context
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContextMultipliers {
    pub frustration: f64,
    pub joy: f64,
}

/// Behavioral heuristic adapter settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Weight kept from the previous velocity on each movement
    pub smoothing_old: f64,
    /// Per-evaluation decay applied once the pointer has been still
    pub decay_factor: f64,
    /// Stillness required before decay applies
    pub decay_idle_ms: u64,
    /// Velocity (px/ms) above which frustration rises
    pub frustration_velocity_threshold: f64,
    pub frustration_per_velocity: f64,
    /// Trailing window for rage-click counting
    pub rage_click_window_ms: u64,
    /// Clicks inside the window that are not penalized
    pub rage_click_allowance: usize,
    pub rage_click_penalty: f64,
    /// Minimum smoothed velocity that counts as decisive movement
    pub joy_velocity_floor: f64,
    pub joy_per_velocity: f64,
    /// Hover dwell after which frustration starts to accrue (mouse only)
    pub dwell_threshold_ms: u64,
    /// Frustration per 100 ms of dwell past the threshold
    pub dwell_frustration_rate: f64,
    pub dwell_frustration_cap: f64,
    /// Recomputation happens at most once per window
    pub cache_window_ms: u64,
    pub wrong_answer_streak: ContextMultipliers,
    pub correct_answer_streak: ContextMultipliers,
    pub idle: ContextMultipliers,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            smoothing_old: 0.8,
            decay_factor: 0.9,
            decay_idle_ms: 100,
            frustration_velocity_threshold: 2.0,
            frustration_per_velocity: 25.0,
            rage_click_window_ms: 5_000,
            rage_click_allowance: 2,
            rage_click_penalty: 15.0,
            joy_velocity_floor: 0.5,
            joy_per_velocity: 30.0,
            dwell_threshold_ms: 3_000,
            dwell_frustration_rate: 1.0,
            dwell_frustration_cap: 20.0,
            cache_window_ms: 500,
            wrong_answer_streak: ContextMultipliers {
                frustration: 1.5,
                joy: 0.0,
            },
            correct_answer_streak: ContextMultipliers {
                frustration: 0.0,
                joy: 1.5,
            },
            idle: ContextMultipliers {
                frustration: 1.0,
                joy: 0.0,
            },
        }
    }
}

/// Feature aggregator settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Rolling keystroke window
    pub keystroke_window_ms: u64,
    /// Keystroke gap that counts as one pause
    pub pause_gap_ms: u64,
    /// Divisors for [kpm, error rate, pauses, context switches, tension, vocal energy]
    pub divisors: [f64; 6],
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            keystroke_window_ms: 60_000,
            pause_gap_ms: 3_000,
            divisors: [150.0, 1.0, 10.0, 5.0, 100.0, 100.0],
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Evaluation tick interval
    pub tick_interval_ms: u64,
    /// How often the driver polls sensor adapters between ticks
    pub sensor_poll_interval_ms: u64,
    pub calibration: CalibrationPolicy,
    pub classifier: ClassifierConfig,
    pub intervention: InterventionConfig,
    pub vision: VisionConfig,
    pub voice: VoiceConfig,
    pub behavior: BehaviorConfig,
    pub aggregator: AggregatorConfig,
    /// Whether the host device supports touch input
    pub touch_capable: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 2_000,
            sensor_poll_interval_ms: 33,
            calibration: CalibrationPolicy::default(),
            classifier: ClassifierConfig::default(),
            intervention: InterventionConfig::default(),
            vision: VisionConfig::default(),
            voice: VoiceConfig::default(),
            behavior: BehaviorConfig::default(),
            aggregator: AggregatorConfig::default(),
            touch_capable: false,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject configurations that would break ordering or divide by zero
    pub fn validate(&self) -> Result<(), EngineError> {
        let c = &self.classifier;
        if !(c.hyperfocus_max < c.normal_max
            && c.normal_max < c.approaching_overload_max
            && c.approaching_overload_max < 100)
        {
            return Err(EngineError::InvalidConfig(format!(
                "classifier thresholds must be strictly increasing below 100 (got {}, {}, {})",
                c.hyperfocus_max, c.normal_max, c.approaching_overload_max
            )));
        }

        let i = &self.intervention;
        if i.crisis_rearm_below > i.crisis_fire_above {
            return Err(EngineError::InvalidConfig(format!(
                "crisis re-arm threshold {} is above fire threshold {}",
                i.crisis_rearm_below, i.crisis_fire_above
            )));
        }

        if self.tick_interval_ms == 0 || self.sensor_poll_interval_ms == 0 {
            return Err(EngineError::InvalidConfig(
                "tick and sensor poll intervals must be non-zero".to_string(),
            ));
        }

        if self.vision.fallback_interval_ms == 0 || self.voice.energy_only_interval_ms == 0 {
            return Err(EngineError::InvalidConfig(
                "adapter cadences must be non-zero".to_string(),
            ));
        }

        if self.voice.analysis_window == 0 {
            return Err(EngineError::InvalidConfig(
                "voice analysis window must hold at least one sample".to_string(),
            ));
        }

        if let Some(idx) = self
            .aggregator
            .divisors
            .iter()
            .position(|d| !d.is_finite() || *d <= 0.0)
        {
            return Err(EngineError::InvalidConfig(format!(
                "feature divisor {} must be positive",
                idx
            )));
        }

        let b = &self.behavior;
        if !(0.0..=1.0).contains(&b.smoothing_old) || !(0.0..=1.0).contains(&b.decay_factor) {
            return Err(EngineError::InvalidConfig(
                "behavior smoothing and decay factors must lie in [0, 1]".to_string(),
            ));
        }

        if let CalibrationPolicy::Freeze { frames: 0 } = self.calibration {
            return Err(EngineError::InvalidConfig(
                "frozen calibration needs at least one frame".to_string(),
            ));
        }

        Ok(())
    }
}
