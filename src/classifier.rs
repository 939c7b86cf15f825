//! Score classification
//!
//! Buckets are totally ordered and partition [0, 100]:
//! Hyperfocus (≤25), Normal (26..=65), ApproachingOverload (66..=80),
//! Overload (>80). Boundaries come from [`ClassifierConfig`].

use crate::config::ClassifierConfig;
use crate::types::{Classification, ClassificationChange};

/// Pure mapping from score to bucket
pub fn classify(score: u8, config: &ClassifierConfig) -> Classification {
    if score <= config.hyperfocus_max {
        Classification::Hyperfocus
    } else if score <= config.normal_max {
        Classification::Normal
    } else if score <= config.approaching_overload_max {
        Classification::ApproachingOverload
    } else {
        Classification::Overload
    }
}

/// Remembers the previous tick's bucket and reports edges
#[derive(Debug, Clone)]
pub struct ClassificationTracker {
    config: ClassifierConfig,
    current: Classification,
}

impl ClassificationTracker {
    /// Starts at Normal, the bucket of the neutral score
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            current: Classification::Normal,
        }
    }

    pub fn current(&self) -> Classification {
        self.current
    }

    pub fn classify(&self, score: u8) -> Classification {
        classify(score, &self.config)
    }

    /// Classify `score`; returns a change only when the bucket differs from last tick
    pub fn update(&mut self, score: u8) -> Option<ClassificationChange> {
        let next = classify(score, &self.config);
        if next == self.current {
            return None;
        }
        let change = ClassificationChange {
            from: self.current,
            to: next,
            score,
        };
        self.current = next;
        Some(change)
    }

    pub fn reset(&mut self) {
        self.current = Classification::Normal;
    }
}
