//! Feature aggregation
//!
//! Producers write their latest metrics into a lock-free [`MetricsBoard`]; the
//! aggregator reads the board on its own fixed tick together with rolling
//! keyboard/focus counters and builds the six-scalar [`FeatureVector`].

use crate::config::AggregatorConfig;
use crate::types::{BiometricSample, FeatureVector, MetricsSnapshot, FEATURE_COUNT};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
struct AtomicF64(AtomicU64);

impl AtomicF64 {
    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Last-value-wins store of every metric field.
///
/// Each field is an independent atomic scalar: writers never block readers and
/// there is no cross-field ordering.
#[derive(Debug, Default)]
pub struct MetricsBoard {
    tension: AtomicF64,
    gaze_wander: AtomicF64,
    joy: AtomicF64,
    frustration: AtomicF64,
    confusion: AtomicF64,
    vocal_energy: AtomicF64,
    speech_rate: AtomicF64,
    pointer_frustration: AtomicF64,
    pointer_joy: AtomicF64,
}

fn write_finite(cell: &AtomicF64, value: f64) {
    if value.is_finite() {
        cell.store(value);
    }
}

impl MetricsBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the fields carried by `sample`
    pub fn publish(&self, sample: &BiometricSample) {
        match sample {
            BiometricSample::Vision(m) => {
                write_finite(&self.tension, m.tension);
                write_finite(&self.gaze_wander, m.gaze_wander);
                write_finite(&self.joy, m.joy);
                write_finite(&self.frustration, m.frustration);
                write_finite(&self.confusion, m.confusion);
            }
            BiometricSample::Voice(m) => {
                write_finite(&self.vocal_energy, m.vocal_energy);
                if let Some(rate) = m.speech_rate {
                    write_finite(&self.speech_rate, rate);
                }
            }
            BiometricSample::Behavioral(m) => {
                write_finite(&self.pointer_frustration, m.frustration);
                write_finite(&self.pointer_joy, m.joy);
            }
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let pointer_frustration = self.pointer_frustration.load();
        let pointer_joy = self.pointer_joy.load();
        MetricsSnapshot {
            tension: self.tension.load(),
            gaze_wander: self.gaze_wander.load(),
            joy: self.joy.load().max(pointer_joy),
            frustration: self.frustration.load().max(pointer_frustration),
            confusion: self.confusion.load(),
            vocal_energy: self.vocal_energy.load(),
            speech_rate: self.speech_rate.load(),
            pointer_frustration,
            pointer_joy,
        }
    }

    pub fn reset(&self) {
        for cell in [
            &self.tension,
            &self.gaze_wander,
            &self.joy,
            &self.frustration,
            &self.confusion,
            &self.vocal_energy,
            &self.speech_rate,
            &self.pointer_frustration,
            &self.pointer_joy,
        ] {
            cell.store(0.0);
        }
    }
}

/// Keyboard and focus counters drained on each tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyboardSnapshot {
    pub keystrokes_per_minute: f64,
    pub error_rate: f64,
    pub pauses: u32,
    pub context_switches: u32,
}

/// Rolling keystroke window plus burst counters
#[derive(Debug, Clone)]
pub struct KeyboardActivity {
    window_ms: u64,
    pause_gap_ms: u64,
    keystrokes: VecDeque<u64>,
    last_key_ms: Option<u64>,
    focused: bool,
    burst_keystrokes: u32,
    burst_backspaces: u32,
    pauses: u32,
    context_switches: u32,
}

impl KeyboardActivity {
    pub fn new(window_ms: u64, pause_gap_ms: u64) -> Self {
        Self {
            window_ms,
            pause_gap_ms,
            keystrokes: VecDeque::new(),
            last_key_ms: None,
            focused: true,
            burst_keystrokes: 0,
            burst_backspaces: 0,
            pauses: 0,
            context_switches: 0,
        }
    }

    pub fn on_key(&mut self, now_ms: u64, is_backspace: bool) {
        if let Some(last) = self.last_key_ms {
            if now_ms.saturating_sub(last) > self.pause_gap_ms {
                self.pauses += 1;
            }
        }
        self.last_key_ms = Some(now_ms);
        self.keystrokes.push_back(now_ms);
        self.burst_keystrokes += 1;
        if is_backspace {
            self.burst_backspaces += 1;
        }
    }

    /// Focus or visibility transition; each focused → unfocused edge is one switch
    pub fn on_focus_change(&mut self, focused: bool) {
        if self.focused && !focused {
            self.context_switches += 1;
        }
        self.focused = focused;
    }

    /// Prune the rolling window, then read and reset the burst counters
    pub fn drain(&mut self, now_ms: u64) -> KeyboardSnapshot {
        let cutoff = now_ms.saturating_sub(self.window_ms);
        while let Some(&front) = self.keystrokes.front() {
            if front < cutoff {
                self.keystrokes.pop_front();
            } else {
                break;
            }
        }

        let per_minute = 60_000.0 / self.window_ms.max(1) as f64;
        let error_rate = if self.burst_keystrokes == 0 {
            0.0
        } else {
            self.burst_backspaces as f64 / self.burst_keystrokes as f64
        };

        let snapshot = KeyboardSnapshot {
            keystrokes_per_minute: self.keystrokes.len() as f64 * per_minute,
            error_rate,
            pauses: self.pauses,
            context_switches: self.context_switches,
        };

        self.burst_keystrokes = 0;
        self.burst_backspaces = 0;
        self.pauses = 0;
        self.context_switches = 0;
        snapshot
    }
}

/// Builds one feature vector per evaluation tick
#[derive(Debug, Clone)]
pub struct FeatureAggregator {
    divisors: [f64; FEATURE_COUNT],
    keyboard: KeyboardActivity,
}

impl FeatureAggregator {
    pub fn new(config: &AggregatorConfig) -> Self {
        Self {
            divisors: config.divisors,
            keyboard: KeyboardActivity::new(config.keystroke_window_ms, config.pause_gap_ms),
        }
    }

    pub fn keyboard_mut(&mut self) -> &mut KeyboardActivity {
        &mut self.keyboard
    }

    /// Drain the keyboard counters and normalize them with the latest metrics
    pub fn aggregate(&mut self, now_ms: u64, metrics: &MetricsSnapshot) -> FeatureVector {
        let keys = self.keyboard.drain(now_ms);
        let raw = [
            keys.keystrokes_per_minute,
            keys.error_rate,
            keys.pauses as f64,
            keys.context_switches as f64,
            metrics.tension,
            metrics.vocal_energy,
        ];

        let mut values = [0.0; FEATURE_COUNT];
        for (i, value) in values.iter_mut().enumerate() {
            let normalized = raw[i] / self.divisors[i];
            *value = if normalized.is_finite() {
                normalized.max(0.0)
            } else {
                0.0
            };
        }
        FeatureVector::new(values)
    }
}
