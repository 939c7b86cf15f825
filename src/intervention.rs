//! Intervention triggers
//!
//! Two independent hysteresis patterns:
//!
//! - [`CrisisTrigger`] watches the session score. It fires once on a crossing
//!   above the fire threshold. After the consumer dismisses it, it stays
//!   suppressed until the score drops below the re-arm threshold, then fires
//!   again on the next score back at or above the re-arm threshold.
//! - [`SustainedMetricTrigger`] watches one metric and fires only after it has
//!   stayed at or above its threshold for an unbroken hold period. It latches
//!   until dismissed.

use crate::config::InterventionConfig;
use crate::types::DistressMetric;
use serde::{Deserialize, Serialize};

/// Crisis trigger phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrisisPhase {
    /// Will fire on the next score above the fire threshold
    Armed,
    /// Fired and waiting for the consumer to dismiss
    Active,
    /// Dismissed; waiting for the score to drop below the re-arm threshold
    Suppressed,
    /// Dropped below the re-arm threshold after a dismissal; fires on the next
    /// score at or above it
    Rearmed,
}

#[derive(Debug, Clone)]
pub struct CrisisTrigger {
    fire_above: u8,
    rearm_below: u8,
    phase: CrisisPhase,
}

impl CrisisTrigger {
    pub fn new(config: &InterventionConfig) -> Self {
        Self {
            fire_above: config.crisis_fire_above,
            rearm_below: config.crisis_rearm_below,
            phase: CrisisPhase::Armed,
        }
    }

    pub fn phase(&self) -> CrisisPhase {
        self.phase
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.phase, CrisisPhase::Armed | CrisisPhase::Rearmed)
    }

    pub fn is_active(&self) -> bool {
        self.phase == CrisisPhase::Active
    }

    /// Feed one tick's score; returns true on the tick the trigger fires
    pub fn update(&mut self, score: u8) -> bool {
        let fires = match self.phase {
            CrisisPhase::Armed => score > self.fire_above,
            CrisisPhase::Rearmed => score >= self.rearm_below,
            CrisisPhase::Suppressed => {
                if score < self.rearm_below {
                    tracing::debug!(score, "Crisis trigger re-armed");
                    self.phase = CrisisPhase::Rearmed;
                }
                false
            }
            CrisisPhase::Active => false,
        };

        if fires {
            tracing::info!(score, "Crisis trigger fired");
            self.phase = CrisisPhase::Active;
        }
        fires
    }

    /// Consumer acknowledgement; no-op unless the trigger is active
    pub fn dismiss(&mut self) {
        if self.phase == CrisisPhase::Active {
            self.phase = CrisisPhase::Suppressed;
        }
    }

    pub fn reset(&mut self) {
        self.phase = CrisisPhase::Armed;
    }
}

/// Fires after a metric stays at or above a threshold for a continuous hold
#[derive(Debug, Clone)]
pub struct SustainedMetricTrigger {
    threshold: f64,
    hold_ms: u64,
    elevated_since: Option<u64>,
    latched: bool,
}

impl SustainedMetricTrigger {
    pub fn new(threshold: f64, hold_ms: u64) -> Self {
        Self {
            threshold,
            hold_ms,
            elevated_since: None,
            latched: false,
        }
    }

    pub fn is_latched(&self) -> bool {
        self.latched
    }

    /// Start of the current elevated run, if any
    pub fn elevated_since(&self) -> Option<u64> {
        self.elevated_since
    }

    /// Feed one observation; returns true only on the observation that fires
    pub fn update(&mut self, value: f64, now_ms: u64) -> bool {
        if self.latched {
            return false;
        }

        if value.is_nan() || value < self.threshold {
            self.elevated_since = None;
            return false;
        }

        let since = *self.elevated_since.get_or_insert(now_ms);
        if now_ms.saturating_sub(since) >= self.hold_ms {
            self.latched = true;
            return true;
        }
        false
    }

    /// Clear the latch and the timer; a fresh hold window may begin
    pub fn dismiss(&mut self) {
        self.latched = false;
        self.elevated_since = None;
    }
}

/// One sustained trigger per gameplay distress metric
#[derive(Debug, Clone)]
pub struct DistressMonitor {
    frustration: SustainedMetricTrigger,
    confusion: SustainedMetricTrigger,
}

impl DistressMonitor {
    pub fn new(config: &InterventionConfig) -> Self {
        Self {
            frustration: SustainedMetricTrigger::new(
                config.sustained_threshold,
                config.sustained_hold_ms,
            ),
            confusion: SustainedMetricTrigger::new(
                config.sustained_threshold,
                config.sustained_hold_ms,
            ),
        }
    }

    fn trigger_mut(&mut self, metric: DistressMetric) -> &mut SustainedMetricTrigger {
        match metric {
            DistressMetric::Frustration => &mut self.frustration,
            DistressMetric::Confusion => &mut self.confusion,
        }
    }

    pub fn is_latched(&self, metric: DistressMetric) -> bool {
        match metric {
            DistressMetric::Frustration => self.frustration.is_latched(),
            DistressMetric::Confusion => self.confusion.is_latched(),
        }
    }

    /// Returns the metrics that fired on this observation
    pub fn update(&mut self, frustration: f64, confusion: f64, now_ms: u64) -> Vec<DistressMetric> {
        let mut fired = Vec::new();
        if self.frustration.update(frustration, now_ms) {
            fired.push(DistressMetric::Frustration);
        }
        if self.confusion.update(confusion, now_ms) {
            fired.push(DistressMetric::Confusion);
        }
        for metric in &fired {
            tracing::info!(metric = ?metric, "Sustained distress trigger fired");
        }
        fired
    }

    pub fn dismiss(&mut self, metric: DistressMetric) {
        self.trigger_mut(metric).dismiss();
    }

    pub fn reset(&mut self) {
        self.frustration.dismiss();
        self.confusion.dismiss();
    }
}
