//! Edge-triggered face presence tracking

use crate::types::FaceEvent;

/// Emits FaceLost once after a continuous no-detection period and FaceRecovered
/// once when detection resumes.
#[derive(Debug, Clone)]
pub struct FacePresence {
    lost_after_ms: u64,
    missing_since: Option<u64>,
    last_detected_ms: Option<u64>,
    lost: bool,
}

impl FacePresence {
    pub fn new(lost_after_ms: u64) -> Self {
        Self {
            lost_after_ms,
            missing_since: None,
            last_detected_ms: None,
            lost: false,
        }
    }

    pub fn is_lost(&self) -> bool {
        self.lost
    }

    /// Record one detection result at `now_ms`
    pub fn observe(&mut self, detected: bool, now_ms: u64) -> Option<FaceEvent> {
        if detected {
            self.missing_since = None;
            self.last_detected_ms = Some(now_ms);
            if self.lost {
                self.lost = false;
                return Some(FaceEvent::FaceRecovered);
            }
            return None;
        }

        let since = *self.missing_since.get_or_insert(now_ms);
        if !self.lost && now_ms.saturating_sub(since) >= self.lost_after_ms {
            self.lost = true;
            return Some(FaceEvent::FaceLost);
        }
        None
    }

    /// Record a poll with no detection result (stalled camera, skipped frame).
    /// The no-detection period runs from the last detection, or from the first
    /// stall when nothing was ever detected.
    pub fn observe_stalled(&mut self, now_ms: u64) -> Option<FaceEvent> {
        if self.lost {
            return None;
        }
        let since = *self
            .missing_since
            .get_or_insert(self.last_detected_ms.unwrap_or(now_ms));
        if now_ms.saturating_sub(since) >= self.lost_after_ms {
            self.lost = true;
            return Some(FaceEvent::FaceLost);
        }
        None
    }

    pub fn reset(&mut self) {
        self.missing_since = None;
        self.last_detected_ms = None;
        self.lost = false;
    }
}
