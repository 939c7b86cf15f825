//! Per-session calibration baseline
//!
//! Accumulates the raw geometric signal (brow distance) over the first frames of
//! a session. The baseline is `accumulated_value / max(1, frame_count)`.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};

/// Default number of frames in a frozen calibration
pub const DEFAULT_CALIBRATION_FRAMES: u32 = 30;

/// Whether the baseline stops accumulating after a fixed number of frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum CalibrationPolicy {
    /// Stop accumulating after `frames` samples
    Freeze { frames: u32 },
    /// Keep accumulating for the whole session; the baseline drifts slowly
    Drift,
}

impl Default for CalibrationPolicy {
    fn default() -> Self {
        CalibrationPolicy::Freeze {
            frames: DEFAULT_CALIBRATION_FRAMES,
        }
    }
}

/// Running calibration baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBaseline {
    accumulated_value: f64,
    frame_count: u32,
    policy: CalibrationPolicy,
}

impl Default for CalibrationBaseline {
    fn default() -> Self {
        Self::new(CalibrationPolicy::default())
    }
}

impl CalibrationBaseline {
    pub fn new(policy: CalibrationPolicy) -> Self {
        Self {
            accumulated_value: 0.0,
            frame_count: 0,
            policy,
        }
    }

    /// Feed one geometric sample. Returns false when the sample was not
    /// accumulated (non-finite, or the baseline is frozen).
    pub fn observe(&mut self, value: f64) -> bool {
        if !value.is_finite() || self.is_frozen() {
            return false;
        }
        self.accumulated_value += value;
        self.frame_count = self.frame_count.saturating_add(1);
        true
    }

    /// Current baseline average
    pub fn baseline(&self) -> f64 {
        self.accumulated_value / self.frame_count.max(1) as f64
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    pub fn accumulated_value(&self) -> f64 {
        self.accumulated_value
    }

    pub fn policy(&self) -> CalibrationPolicy {
        self.policy
    }

    /// True once a frozen baseline has collected all its frames
    pub fn is_frozen(&self) -> bool {
        match self.policy {
            CalibrationPolicy::Freeze { frames } => self.frame_count >= frames,
            CalibrationPolicy::Drift => false,
        }
    }

    /// True once enough frames exist to trust the baseline
    pub fn is_calibrated(&self) -> bool {
        match self.policy {
            CalibrationPolicy::Freeze { .. } => self.is_frozen(),
            CalibrationPolicy::Drift => self.frame_count >= DEFAULT_CALIBRATION_FRAMES,
        }
    }

    pub fn reset(&mut self) {
        self.accumulated_value = 0.0;
        self.frame_count = 0;
    }

    /// Serialize to JSON for carrying a baseline across sessions
    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let baseline: CalibrationBaseline = serde_json::from_str(json)?;
        if !baseline.accumulated_value.is_finite() {
            return Err(EngineError::ParseError(
                "calibration accumulator is not finite".to_string(),
            ));
        }
        Ok(baseline)
    }
}
