//! Streaming transcript word counting

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One recognition result from a streaming speech recognizer.
///
/// A segment is reported repeatedly while in flight (`is_final = false`) and
/// once more when the recognizer commits it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Position of the segment within the recognition session
    pub index: usize,
    pub text: String,
    pub is_final: bool,
}

fn word_count(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

/// Words-per-minute counter over finalized and in-flight segments
#[derive(Debug, Clone, Default)]
pub struct SpeechRateCounter {
    started_ms: Option<u64>,
    final_words: u64,
    /// Highest committed segment index; recognizers commit in index order
    last_finalized: Option<usize>,
    interim: BTreeMap<usize, u64>,
}

impl SpeechRateCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin timing; elapsed minutes are measured from here
    pub fn start(&mut self, now_ms: u64) {
        self.reset();
        self.started_ms = Some(now_ms);
    }

    pub fn reset(&mut self) {
        self.started_ms = None;
        self.final_words = 0;
        self.last_finalized = None;
        self.interim.clear();
    }

    /// Fold a batch of recognition results into the counters.
    ///
    /// Finalized segments move their words from the interim tally to the final
    /// counter exactly once. Results at or below the last committed index are
    /// ignored.
    pub fn ingest(&mut self, segments: &[TranscriptSegment]) {
        for segment in segments {
            if self.last_finalized.is_some_and(|last| segment.index <= last) {
                continue;
            }
            let words = word_count(&segment.text);
            if segment.is_final {
                self.interim = self.interim.split_off(&(segment.index + 1));
                self.last_finalized = Some(segment.index);
                self.final_words += words;
            } else {
                self.interim.insert(segment.index, words);
            }
        }
    }

    pub fn final_words(&self) -> u64 {
        self.final_words
    }

    pub fn interim_words(&self) -> u64 {
        self.interim.values().sum()
    }

    /// (final + interim) words per elapsed minute; zero before `min_elapsed_ms`
    pub fn words_per_minute(&self, now_ms: u64, min_elapsed_ms: u64) -> f64 {
        let Some(started) = self.started_ms else {
            return 0.0;
        };
        let elapsed_ms = now_ms.saturating_sub(started);
        if elapsed_ms == 0 || elapsed_ms < min_elapsed_ms {
            return 0.0;
        }
        let minutes = elapsed_ms as f64 / 60_000.0;
        (self.final_words + self.interim_words()) as f64 / minutes
    }
}
