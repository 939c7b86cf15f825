//! Pointer and touch input primitives
//!
//! Mouse and touch events feed a single smoothed velocity signal. Clicks and
//! taps are tracked in a trailing window for rage-click detection.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Input device that produced a pointer event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerKind {
    #[default]
    Mouse,
    Touch,
}

/// A pointer position sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerSample {
    pub x: f64,
    pub y: f64,
    pub timestamp_ms: u64,
    pub kind: PointerKind,
}

/// Exponentially smoothed pointer velocity in px/ms
#[derive(Debug, Clone)]
pub struct VelocityTracker {
    smoothing_old: f64,
    decay_factor: f64,
    decay_idle_ms: u64,
    anchor: Option<PointerSample>,
    velocity: f64,
    last_move_ms: Option<u64>,
}

impl VelocityTracker {
    pub fn new(smoothing_old: f64, decay_factor: f64, decay_idle_ms: u64) -> Self {
        Self {
            smoothing_old,
            decay_factor,
            decay_idle_ms,
            anchor: None,
            velocity: 0.0,
            last_move_ms: None,
        }
    }

    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    pub fn last_move_ms(&self) -> Option<u64> {
        self.last_move_ms
    }

    /// Start a new stroke without contributing a velocity sample, so a touch
    /// landing far from the previous one does not register as a jump.
    pub fn anchor(&mut self, sample: PointerSample) {
        self.anchor = Some(sample);
    }

    /// Blend the instantaneous velocity of a move into the smoothed signal
    pub fn on_move(&mut self, sample: PointerSample) {
        if let Some(prev) = self.anchor {
            let dt = sample.timestamp_ms.saturating_sub(prev.timestamp_ms);
            if dt > 0 {
                let distance = (sample.x - prev.x).hypot(sample.y - prev.y);
                let instant = distance / dt as f64;
                if instant.is_finite() {
                    self.velocity =
                        self.smoothing_old * self.velocity + (1.0 - self.smoothing_old) * instant;
                }
            }
        }
        self.anchor = Some(sample);
        self.last_move_ms = Some(sample.timestamp_ms);
    }

    /// Apply one evaluation's worth of decay if the pointer has been still
    pub fn decay(&mut self, now_ms: u64) {
        let idle = match self.last_move_ms {
            Some(t) => now_ms.saturating_sub(t) > self.decay_idle_ms,
            None => true,
        };
        if idle {
            self.velocity *= self.decay_factor;
        }
    }

    pub fn reset(&mut self) {
        self.anchor = None;
        self.velocity = 0.0;
        self.last_move_ms = None;
    }
}

/// Click/tap timestamps within a trailing window
#[derive(Debug, Clone)]
pub struct ClickWindow {
    window_ms: u64,
    clicks: VecDeque<u64>,
}

impl ClickWindow {
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            clicks: VecDeque::new(),
        }
    }

    pub fn record(&mut self, timestamp_ms: u64) {
        self.clicks.push_back(timestamp_ms);
    }

    /// Clicks within the trailing window ending at `now_ms`
    pub fn count(&mut self, now_ms: u64) -> usize {
        let cutoff = now_ms.saturating_sub(self.window_ms);
        while let Some(&front) = self.clicks.front() {
            if front < cutoff {
                self.clicks.pop_front();
            } else {
                break;
            }
        }
        self.clicks.len()
    }
}
