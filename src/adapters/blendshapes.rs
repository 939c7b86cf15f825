//! Facial blendshape composites
//!
//! Maps per-frame blendshape activations (each in [0, 1]) and the landmark-derived
//! brow distance onto the five composite emotion metrics.

use crate::types::VisionMetrics;
use serde::{Deserialize, Serialize};

/// Blendshape activations used by the composites, each in [0, 1]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Blendshapes {
    pub brow_down_left: f64,
    pub brow_down_right: f64,
    pub brow_inner_up: f64,
    pub brow_outer_up_left: f64,
    pub cheek_raise_left: f64,
    pub cheek_raise_right: f64,
    pub eye_look_out_left: f64,
    pub eye_look_out_right: f64,
    pub eye_squint_left: f64,
    pub eye_squint_right: f64,
    pub jaw_open: f64,
    pub mouth_smile_left: f64,
    pub mouth_smile_right: f64,
    pub mouth_frown_left: f64,
    pub mouth_frown_right: f64,
    pub mouth_pucker: f64,
    pub mouth_shrug_upper: f64,
    pub nose_sneer_left: f64,
    pub nose_sneer_right: f64,
}

/// One face detected in one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceObservation {
    /// Normalized vertical distance between brow and eye landmarks
    pub brow_distance: f64,
    pub blendshapes: Blendshapes,
}

fn to_percent(weighted: f64) -> f64 {
    if weighted.is_finite() {
        (weighted * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// Relative brow-distance drop versus the calibrated baseline, ×`gain`, clamped to [0, 100]
pub fn tension(baseline: f64, brow_distance: f64, gain: f64) -> f64 {
    if !(baseline > 0.0) || !brow_distance.is_finite() {
        return 0.0;
    }
    let drop = ((baseline - brow_distance) / baseline).max(0.0);
    (drop * gain).clamp(0.0, 100.0)
}

pub fn gaze_wander(b: &Blendshapes) -> f64 {
    to_percent((b.eye_look_out_left + b.eye_look_out_right) / 2.0)
}

pub fn joy(b: &Blendshapes) -> f64 {
    to_percent(
        0.45 * b.mouth_smile_left
            + 0.45 * b.mouth_smile_right
            + 0.05 * b.cheek_raise_left
            + 0.05 * b.cheek_raise_right,
    )
}

pub fn frustration(b: &Blendshapes) -> f64 {
    to_percent(
        0.25 * b.brow_down_left
            + 0.25 * b.brow_down_right
            + 0.15 * b.jaw_open
            + 0.10 * b.mouth_frown_left
            + 0.10 * b.mouth_frown_right
            + 0.075 * b.nose_sneer_left
            + 0.075 * b.nose_sneer_right,
    )
}

pub fn confusion(b: &Blendshapes) -> f64 {
    to_percent(
        0.30 * (b.brow_inner_up - b.brow_outer_up_left).abs()
            + 0.20 * b.brow_inner_up
            + 0.15 * b.eye_squint_left
            + 0.15 * b.eye_squint_right
            + 0.10 * b.mouth_pucker
            + 0.10 * b.mouth_shrug_upper,
    )
}

/// All five composites for one observation
pub fn composite_metrics(observation: &FaceObservation, baseline: f64, tension_gain: f64) -> VisionMetrics {
    let b = &observation.blendshapes;
    VisionMetrics {
        tension: tension(baseline, observation.brow_distance, tension_gain),
        gaze_wander: gaze_wander(b),
        joy: joy(b),
        frustration: frustration(b),
        confusion: confusion(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all(value: f64) -> Blendshapes {
        Blendshapes {
            brow_down_left: value,
            brow_down_right: value,
            brow_inner_up: value,
            brow_outer_up_left: value,
            cheek_raise_left: value,
            cheek_raise_right: value,
            eye_look_out_left: value,
            eye_look_out_right: value,
            eye_squint_left: value,
            eye_squint_right: value,
            jaw_open: value,
            mouth_smile_left: value,
            mouth_smile_right: value,
            mouth_frown_left: value,
            mouth_frown_right: value,
            mouth_pucker: value,
            mouth_shrug_upper: value,
            nose_sneer_left: value,
            nose_sneer_right: value,
        }
    }

    #[test]
    fn test_tension_scales_relative_drop() {
        // 5% drop ×1000 = 50
        assert!((tension(0.2, 0.19, 1000.0) - 50.0).abs() < 1e-9);
        // Wider than baseline is no tension
        assert_eq!(tension(0.2, 0.25, 1000.0), 0.0);
        // Large drop clamps
        assert_eq!(tension(0.2, 0.1, 1000.0), 100.0);
    }

    #[test]
    fn test_tension_without_baseline_is_zero() {
        assert_eq!(tension(0.0, 0.1, 1000.0), 0.0);
        assert_eq!(tension(f64::NAN, 0.1, 1000.0), 0.0);
    }

    #[test]
    fn test_joy_weights() {
        let b = Blendshapes {
            mouth_smile_left: 1.0,
            mouth_smile_right: 1.0,
            ..Default::default()
        };
        assert!((joy(&b) - 90.0).abs() < 1e-9);
        assert!((joy(&all(1.0)) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_frustration_weights() {
        let b = Blendshapes {
            brow_down_left: 1.0,
            brow_down_right: 1.0,
            jaw_open: 1.0,
            ..Default::default()
        };
        assert!((frustration(&b) - 65.0).abs() < 1e-9);
        assert!((frustration(&all(1.0)) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_confusion_asymmetric_brow() {
        let b = Blendshapes {
            brow_inner_up: 1.0,
            brow_outer_up_left: 0.0,
            ..Default::default()
        };
        // 0.30·1 + 0.20·1 = 0.5
        assert!((confusion(&b) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_gaze_wander_is_mean_of_lateral_gaze() {
        let b = Blendshapes {
            eye_look_out_left: 0.6,
            eye_look_out_right: 0.2,
            ..Default::default()
        };
        assert!((gaze_wander(&b) - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_range_activations_clamp() {
        let metrics = composite_metrics(
            &FaceObservation {
                brow_distance: 0.2,
                blendshapes: all(3.0),
            },
            0.2,
            1000.0,
        );
        assert_eq!(metrics.joy, 100.0);
        assert_eq!(metrics.frustration, 100.0);
        assert_eq!(metrics.gaze_wander, 100.0);

        let negative = composite_metrics(
            &FaceObservation {
                brow_distance: 0.2,
                blendshapes: all(-1.0),
            },
            0.2,
            1000.0,
        );
        assert_eq!(negative.joy, 0.0);
        assert_eq!(negative.frustration, 0.0);
    }
}
