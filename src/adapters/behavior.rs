//! Behavioral heuristic adapter
//!
//! Turns pointer and touch activity into frustration/joy proxies. Results are
//! cached for a fixed window so repeated reads are cheap and bit-identical.

use crate::adapters::pointer::{ClickWindow, PointerKind, PointerSample, VelocityTracker};
use crate::config::{BehaviorConfig, ContextMultipliers};
use crate::types::{BehaviorMetrics, BiometricSample};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Semantic context reported by the host (e.g. a learning game)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionContext {
    #[default]
    Neutral,
    WrongAnswerStreak,
    CorrectAnswerStreak,
    Idle,
}

/// Running mean used to replace non-finite derived values
#[derive(Debug, Clone, Copy, Default)]
struct RunningMean {
    sum: f64,
    count: u64,
}

impl RunningMean {
    fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    /// Clamp and record a finite value, or substitute the historical mean
    fn sanitize(&mut self, value: f64) -> f64 {
        if !value.is_finite() {
            debug!(value, mean = self.mean(), "non-finite behavioral metric replaced");
            return self.mean();
        }
        let value = value.clamp(0.0, 100.0);
        self.sum += value;
        self.count += 1;
        value
    }
}

/// Pointer-behavior heuristic adapter
#[derive(Debug, Clone)]
pub struct BehaviorAdapter {
    config: BehaviorConfig,
    touch_capable: bool,
    velocity: VelocityTracker,
    clicks: ClickWindow,
    context: InteractionContext,
    hover_since: Option<u64>,
    cache: Option<(u64, BehaviorMetrics)>,
    frustration_history: RunningMean,
    joy_history: RunningMean,
}

impl BehaviorAdapter {
    pub fn new(config: BehaviorConfig, touch_capable: bool) -> Self {
        Self {
            velocity: VelocityTracker::new(
                config.smoothing_old,
                config.decay_factor,
                config.decay_idle_ms,
            ),
            clicks: ClickWindow::new(config.rage_click_window_ms),
            config,
            touch_capable,
            context: InteractionContext::Neutral,
            hover_since: None,
            cache: None,
            frustration_history: RunningMean::default(),
            joy_history: RunningMean::default(),
        }
    }

    pub fn is_touch_capable(&self) -> bool {
        self.touch_capable
    }

    pub fn context(&self) -> InteractionContext {
        self.context
    }

    /// Current smoothed pointer velocity (px/ms)
    pub fn velocity(&self) -> f64 {
        self.velocity.velocity()
    }

    fn note_kind(&mut self, kind: PointerKind) {
        if kind == PointerKind::Touch && !self.touch_capable {
            debug!("touch input observed, hover dwell disabled");
            self.touch_capable = true;
        }
    }

    /// Mouse down or touch start: counts as a click and starts a new stroke
    pub fn on_pointer_down(&mut self, sample: PointerSample) {
        self.note_kind(sample.kind);
        self.velocity.anchor(sample);
        self.clicks.record(sample.timestamp_ms);
    }

    /// Mouse move or touch move
    pub fn on_pointer_move(&mut self, sample: PointerSample) {
        self.note_kind(sample.kind);
        self.velocity.on_move(sample);
        if self.hover_since.is_some() {
            self.hover_since = Some(sample.timestamp_ms);
        }
    }

    /// Pointer started hovering an interactive target
    pub fn on_hover_start(&mut self, timestamp_ms: u64) {
        self.hover_since = Some(timestamp_ms);
    }

    pub fn on_hover_end(&mut self) {
        self.hover_since = None;
    }

    pub fn set_context(&mut self, context: InteractionContext) {
        self.context = context;
    }

    fn multipliers(&self) -> ContextMultipliers {
        match self.context {
            InteractionContext::Neutral => ContextMultipliers {
                frustration: 1.0,
                joy: 1.0,
            },
            InteractionContext::WrongAnswerStreak => self.config.wrong_answer_streak,
            InteractionContext::CorrectAnswerStreak => self.config.correct_answer_streak,
            InteractionContext::Idle => self.config.idle,
        }
    }

    /// Metrics for `now_ms`, recomputed at most once per cache window
    pub fn metrics(&mut self, now_ms: u64) -> BehaviorMetrics {
        if let Some((computed_at, cached)) = self.cache {
            if now_ms.saturating_sub(computed_at) < self.config.cache_window_ms {
                return cached;
            }
        }
        let metrics = self.compute(now_ms);
        self.cache = Some((now_ms, metrics));
        metrics
    }

    pub fn sample(&mut self, now_ms: u64) -> BiometricSample {
        BiometricSample::Behavioral(self.metrics(now_ms))
    }

    fn compute(&mut self, now_ms: u64) -> BehaviorMetrics {
        let cfg = self.config;
        self.velocity.decay(now_ms);
        let velocity = self.velocity.velocity();
        let clicks = self.clicks.count(now_ms);

        let mut frustration = 0.0;
        if velocity > cfg.frustration_velocity_threshold {
            frustration +=
                (velocity - cfg.frustration_velocity_threshold) * cfg.frustration_per_velocity;
        }
        let rage_clicks = clicks.saturating_sub(cfg.rage_click_allowance);
        if rage_clicks > 0 {
            frustration += rage_clicks as f64 * cfg.rage_click_penalty;
        }

        // Hover has no touch analog
        if !self.touch_capable {
            if let Some(since) = self.hover_since {
                let dwell = now_ms.saturating_sub(since);
                if dwell > cfg.dwell_threshold_ms {
                    let excess = (dwell - cfg.dwell_threshold_ms) as f64 / 100.0;
                    frustration += (excess * cfg.dwell_frustration_rate).min(cfg.dwell_frustration_cap);
                }
            }
        }

        let mut joy = 0.0;
        if velocity >= cfg.joy_velocity_floor && clicks <= cfg.rage_click_allowance {
            joy = velocity * cfg.joy_per_velocity;
        }

        let m = self.multipliers();
        BehaviorMetrics {
            frustration: self.frustration_history.sanitize(frustration * m.frustration),
            joy: self.joy_history.sanitize(joy * m.joy),
            velocity: if velocity.is_finite() { velocity } else { 0.0 },
        }
    }
}
