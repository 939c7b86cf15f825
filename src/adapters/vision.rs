//! Vision adapter
//!
//! Pulls frames from a camera source, runs the face landmarker on each new frame
//! and turns the observation into composite metrics. When the camera or model is
//! unavailable the adapter switches to the heuristic fallback for the rest of the
//! engine's life and emits pointer-derived pseudo-metrics at a fixed cadence.

use crate::adapters::blendshapes::{composite_metrics, FaceObservation};
use crate::adapters::face_presence::FacePresence;
use crate::arbiter::{Consumer, Lease, ResourceArbiter, ResourceKind};
use crate::calibration::{CalibrationBaseline, CalibrationPolicy};
use crate::config::{FallbackGains, VisionConfig};
use crate::error::EngineError;
use crate::types::{BehaviorMetrics, FaceEvent, SignalSource, VisionMetrics};
use tracing::{debug, info, warn};

/// One captured video frame
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    /// Presentation time of the frame on the camera's clock
    pub clock_ms: u64,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Pull-based camera source
pub trait FrameSource: Send {
    /// Presentation time of the newest available frame
    fn frame_clock(&self) -> Option<u64>;

    /// Read the newest available frame
    fn read_frame(&mut self) -> Option<VideoFrame>;

    /// Stop capture. Must be safe to call more than once.
    fn stop(&mut self);
}

/// On-device face inference model
pub trait FaceLandmarker: Send {
    /// Detect a face; `Ok(None)` means the frame contains no face.
    fn detect(&mut self, frame: &VideoFrame) -> Result<Option<FaceObservation>, EngineError>;

    /// Release the inference context
    fn close(&mut self) {}
}

/// Loads the face landmarker model
pub trait LandmarkerFactory: Send {
    fn load(&mut self) -> Result<Box<dyn FaceLandmarker>, EngineError>;
}

/// Output of one poll
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VisionUpdate {
    /// Newly computed metrics, if a sample was processed
    pub metrics: Option<VisionMetrics>,
    /// Face presence transition, if one happened
    pub event: Option<FaceEvent>,
}

/// Pointer-velocity proxy used in place of facial inference
#[derive(Debug)]
struct HeuristicFallback {
    gains: FallbackGains,
    interval_ms: u64,
    last_emit_ms: Option<u64>,
    lease: Option<Lease>,
}

impl HeuristicFallback {
    fn new(config: &VisionConfig) -> Self {
        Self {
            gains: config.fallback,
            interval_ms: config.fallback_interval_ms,
            last_emit_ms: None,
            lease: None,
        }
    }

    fn poll(
        &mut self,
        arbiter: &ResourceArbiter,
        now_ms: u64,
        behavior: &BehaviorMetrics,
    ) -> Option<VisionMetrics> {
        if let Some(last) = self.last_emit_ms {
            if now_ms.saturating_sub(last) < self.interval_ms {
                return None;
            }
        }
        self.last_emit_ms = Some(now_ms);

        // Shares the accelerator context with the vision model
        if self.lease.is_none() {
            match arbiter.acquire(ResourceKind::Accelerator, Consumer::BehavioralFallback) {
                Ok(lease) => self.lease = Some(lease),
                Err(e) => {
                    debug!(error = %e, "fallback sample skipped");
                    return None;
                }
            }
        }

        let v = if behavior.velocity.is_finite() {
            behavior.velocity.max(0.0)
        } else {
            0.0
        };
        Some(VisionMetrics {
            tension: (v * self.gains.tension_per_velocity).min(100.0),
            gaze_wander: (v * self.gains.gaze_wander_per_velocity).min(100.0),
            joy: behavior.joy,
            frustration: behavior.frustration,
            confusion: (v * self.gains.confusion_per_velocity).min(100.0),
        })
    }

    fn release(&mut self) {
        if let Some(mut lease) = self.lease.take() {
            lease.release();
        }
        self.last_emit_ms = None;
    }
}

/// No fresh detection this poll; face loss still times out
fn stalled(presence: &mut FacePresence, now_ms: u64) -> VisionUpdate {
    VisionUpdate {
        metrics: None,
        event: presence.observe_stalled(now_ms),
    }
}

/// Camera + face-model adapter
pub struct VisionAdapter {
    arbiter: ResourceArbiter,
    config: VisionConfig,
    source: SignalSource,
    running: bool,
    model_failed: bool,
    camera: Option<Lease>,
    accelerator: Option<Lease>,
    frames: Option<Box<dyn FrameSource>>,
    landmarker: Option<Box<dyn FaceLandmarker>>,
    last_frame_clock: Option<u64>,
    calibration: CalibrationBaseline,
    presence: FacePresence,
    fallback: HeuristicFallback,
    latest: Option<VisionMetrics>,
}

impl VisionAdapter {
    pub fn new(arbiter: ResourceArbiter, config: VisionConfig, policy: CalibrationPolicy) -> Self {
        Self {
            arbiter,
            source: SignalSource::Vision,
            running: false,
            model_failed: false,
            camera: None,
            accelerator: None,
            frames: None,
            landmarker: None,
            last_frame_clock: None,
            calibration: CalibrationBaseline::new(policy),
            presence: FacePresence::new(config.face_lost_after_ms),
            fallback: HeuristicFallback::new(&config),
            latest: None,
            config,
        }
    }

    pub fn source(&self) -> SignalSource {
        self.source
    }

    pub fn is_heuristic(&self) -> bool {
        self.source == SignalSource::Heuristic
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn latest(&self) -> Option<VisionMetrics> {
        self.latest
    }

    pub fn calibration(&self) -> &CalibrationBaseline {
        &self.calibration
    }

    /// Replace the calibration with one carried over from an earlier session
    pub fn restore_calibration(&mut self, baseline: CalibrationBaseline) {
        self.calibration = baseline;
    }

    /// Start capture and load the face model.
    ///
    /// Permission denial, a missing camera and model load failure switch to the
    /// heuristic fallback. Contention is returned as `ResourceBusy` with nothing
    /// held, so the caller can decide whether to retry or fall back.
    pub fn start(
        &mut self,
        frames: Option<Box<dyn FrameSource>>,
        factory: Option<&mut (dyn LandmarkerFactory + 'static)>,
    ) -> Result<SignalSource, EngineError> {
        if self.running {
            return Ok(self.source);
        }

        if self.model_failed {
            if let Some(mut frames) = frames {
                frames.stop();
            }
            self.enter_fallback("face model failed earlier in this session");
            return Ok(self.source);
        }

        let Some(mut frames) = frames else {
            self.enter_fallback("no video source");
            return Ok(self.source);
        };

        let camera = match self.arbiter.acquire(ResourceKind::Camera, Consumer::Vision) {
            Ok(lease) => lease,
            Err(EngineError::PermissionDenied(_)) => {
                frames.stop();
                self.enter_fallback("camera permission denied");
                return Ok(self.source);
            }
            Err(e) => {
                frames.stop();
                return Err(e);
            }
        };

        let accelerator = match self.arbiter.acquire(ResourceKind::Accelerator, Consumer::Vision) {
            Ok(lease) => lease,
            Err(e) => {
                frames.stop();
                drop(camera);
                return Err(e);
            }
        };

        let loaded = match factory {
            Some(factory) => factory.load(),
            None => Err(EngineError::ModelLoadFailure(
                "no face landmarker configured".to_string(),
            )),
        };

        match loaded {
            Ok(landmarker) => {
                self.camera = Some(camera);
                self.accelerator = Some(accelerator);
                self.frames = Some(frames);
                self.landmarker = Some(landmarker);
                self.source = SignalSource::Vision;
                self.running = true;
                info!("vision adapter started");
                Ok(self.source)
            }
            Err(e) => {
                frames.stop();
                drop(accelerator);
                drop(camera);
                self.model_failed = true;
                warn!(error = %e, "face model unavailable");
                self.enter_fallback("face model failed to load");
                Ok(self.source)
            }
        }
    }

    /// Switch to the pointer-velocity fallback. Leases held for the vision path
    /// are released first so the fallback can take the accelerator.
    pub fn enter_fallback(&mut self, reason: &str) {
        self.shutdown_capture();
        self.source = SignalSource::Heuristic;
        self.running = true;
        warn!(reason, "vision switched to heuristic fallback");
    }

    /// Process at most one sample.
    ///
    /// In vision mode a sample is processed only when the frame clock has
    /// advanced; in fallback mode at the fixed fallback cadence.
    pub fn poll(&mut self, now_ms: u64, behavior: &BehaviorMetrics) -> VisionUpdate {
        if !self.running {
            return VisionUpdate::default();
        }

        if self.source == SignalSource::Heuristic {
            let metrics = self.fallback.poll(&self.arbiter, now_ms, behavior);
            if metrics.is_some() {
                self.latest = metrics;
            }
            return VisionUpdate {
                metrics,
                event: None,
            };
        }

        let (Some(frames), Some(landmarker)) = (self.frames.as_mut(), self.landmarker.as_mut()) else {
            return VisionUpdate::default();
        };

        let Some(clock) = frames.frame_clock() else {
            return stalled(&mut self.presence, now_ms);
        };
        if self.last_frame_clock == Some(clock) {
            return stalled(&mut self.presence, now_ms);
        }
        let Some(frame) = frames.read_frame() else {
            return stalled(&mut self.presence, now_ms);
        };
        self.last_frame_clock = Some(clock);

        match landmarker.detect(&frame) {
            Err(e) => {
                debug!(error = %e, clock, "frame skipped");
                stalled(&mut self.presence, now_ms)
            }
            Ok(None) => VisionUpdate {
                metrics: None,
                event: self.presence.observe(false, now_ms),
            },
            Ok(Some(observation)) => {
                let event = self.presence.observe(true, now_ms);
                self.calibration.observe(observation.brow_distance);
                let metrics = composite_metrics(
                    &observation,
                    self.calibration.baseline(),
                    self.config.tension_gain,
                );
                self.latest = Some(metrics);
                VisionUpdate {
                    metrics: Some(metrics),
                    event,
                }
            }
        }
    }

    fn shutdown_capture(&mut self) {
        if let Some(mut frames) = self.frames.take() {
            frames.stop();
        }
        if let Some(mut landmarker) = self.landmarker.take() {
            landmarker.close();
        }
        if let Some(mut lease) = self.accelerator.take() {
            lease.release();
        }
        if let Some(mut lease) = self.camera.take() {
            lease.release();
        }
        self.last_frame_clock = None;
        self.presence.reset();
    }

    /// Stop capture, release the inference context and every lease. Idempotent.
    pub fn close(&mut self) {
        if !self.running && self.frames.is_none() && self.fallback.lease.is_none() {
            return;
        }
        self.shutdown_capture();
        self.fallback.release();
        self.running = false;
        info!("vision adapter closed");
    }
}

impl Drop for VisionAdapter {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::adapters::blendshapes::Blendshapes;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Arc;

    /// Camera whose clock is advanced by the test
    pub(crate) struct FakeCamera {
        pub clock: Arc<AtomicU64>,
        pub stopped: Arc<AtomicBool>,
    }

    impl FrameSource for FakeCamera {
        fn frame_clock(&self) -> Option<u64> {
            Some(self.clock.load(Ordering::SeqCst))
        }

        fn read_frame(&mut self) -> Option<VideoFrame> {
            Some(VideoFrame {
                clock_ms: self.clock.load(Ordering::SeqCst),
                width: 2,
                height: 2,
                pixels: vec![0; 4],
            })
        }

        fn stop(&mut self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    /// Landmarker that reports a face while `present` is set
    pub(crate) struct FakeLandmarker {
        pub present: Arc<AtomicBool>,
        pub calls: Arc<AtomicU64>,
    }

    impl FaceLandmarker for FakeLandmarker {
        fn detect(&mut self, _frame: &VideoFrame) -> Result<Option<FaceObservation>, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.present.load(Ordering::SeqCst) {
                Ok(Some(FaceObservation {
                    brow_distance: 0.2,
                    blendshapes: Blendshapes {
                        mouth_smile_left: 0.5,
                        mouth_smile_right: 0.5,
                        ..Default::default()
                    },
                }))
            } else {
                Ok(None)
            }
        }
    }

    pub(crate) struct FakeFactory {
        pub fail: bool,
        pub loads: u32,
        pub present: Arc<AtomicBool>,
        pub calls: Arc<AtomicU64>,
    }

    impl LandmarkerFactory for FakeFactory {
        fn load(&mut self) -> Result<Box<dyn FaceLandmarker>, EngineError> {
            self.loads += 1;
            if self.fail {
                return Err(EngineError::ModelLoadFailure("weights missing".to_string()));
            }
            Ok(Box::new(FakeLandmarker {
                present: Arc::clone(&self.present),
                calls: Arc::clone(&self.calls),
            }))
        }
    }

    struct Rig {
        clock: Arc<AtomicU64>,
        stopped: Arc<AtomicBool>,
        present: Arc<AtomicBool>,
        calls: Arc<AtomicU64>,
        factory: FakeFactory,
    }

    fn rig(fail: bool) -> Rig {
        let present = Arc::new(AtomicBool::new(true));
        let calls = Arc::new(AtomicU64::new(0));
        Rig {
            clock: Arc::new(AtomicU64::new(1)),
            stopped: Arc::new(AtomicBool::new(false)),
            factory: FakeFactory {
                fail,
                loads: 0,
                present: Arc::clone(&present),
                calls: Arc::clone(&calls),
            },
            present,
            calls,
        }
    }

    fn camera(rig: &Rig) -> Option<Box<dyn FrameSource>> {
        Some(Box::new(FakeCamera {
            clock: Arc::clone(&rig.clock),
            stopped: Arc::clone(&rig.stopped),
        }))
    }

    fn adapter(arbiter: &ResourceArbiter) -> VisionAdapter {
        VisionAdapter::new(
            arbiter.clone(),
            VisionConfig::default(),
            CalibrationPolicy::default(),
        )
    }

    #[test]
    fn test_stale_frames_are_not_reprocessed() {
        let arbiter = ResourceArbiter::new();
        let mut rig = rig(false);
        let mut vision = adapter(&arbiter);
        let source = vision.start(camera(&rig), Some(&mut rig.factory)).unwrap();
        assert_eq!(source, SignalSource::Vision);

        let idle = BehaviorMetrics::default();
        assert!(vision.poll(0, &idle).metrics.is_some());
        assert!(vision.poll(10, &idle).metrics.is_none());
        assert!(vision.poll(20, &idle).metrics.is_none());
        assert_eq!(rig.calls.load(Ordering::SeqCst), 1);

        rig.clock.store(2, Ordering::SeqCst);
        let update = vision.poll(33, &idle);
        assert!((update.metrics.unwrap().joy - 45.0).abs() < 1e-9);
        assert_eq!(rig.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_face_lost_and_recovered_edges() {
        let arbiter = ResourceArbiter::new();
        let mut rig = rig(false);
        let mut vision = adapter(&arbiter);
        vision.start(camera(&rig), Some(&mut rig.factory)).unwrap();
        let idle = BehaviorMetrics::default();

        rig.present.store(false, Ordering::SeqCst);
        let mut events = Vec::new();
        for (i, t) in (0..12_000).step_by(100).enumerate() {
            rig.clock.store(i as u64 + 10, Ordering::SeqCst);
            if let Some(e) = vision.poll(t, &idle).event {
                events.push((t, e));
            }
        }
        assert_eq!(events, vec![(5_000, FaceEvent::FaceLost)]);

        rig.present.store(true, Ordering::SeqCst);
        let mut recovered = Vec::new();
        for (i, t) in (12_000..13_000).step_by(100).enumerate() {
            rig.clock.store(i as u64 + 1_000, Ordering::SeqCst);
            if let Some(e) = vision.poll(t, &idle).event {
                recovered.push(e);
            }
        }
        assert_eq!(recovered, vec![FaceEvent::FaceRecovered]);
    }

    #[test]
    fn test_stalled_camera_still_reports_face_lost() {
        let arbiter = ResourceArbiter::new();
        let mut rig = rig(false);
        let mut vision = adapter(&arbiter);
        vision.start(camera(&rig), Some(&mut rig.factory)).unwrap();
        let idle = BehaviorMetrics::default();

        rig.present.store(false, Ordering::SeqCst);
        rig.clock.store(5, Ordering::SeqCst);
        assert_eq!(vision.poll(0, &idle).event, None);

        // Frame clock frozen from here on
        let mut events = Vec::new();
        for t in (100..20_000).step_by(100) {
            if let Some(e) = vision.poll(t, &idle).event {
                events.push((t, e));
            }
        }
        assert_eq!(events, vec![(5_000, FaceEvent::FaceLost)]);
        assert_eq!(rig.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_model_failure_is_permanent() {
        let arbiter = ResourceArbiter::new();
        let mut rig = rig(true);
        let mut vision = adapter(&arbiter);

        let source = vision.start(camera(&rig), Some(&mut rig.factory)).unwrap();
        assert_eq!(source, SignalSource::Heuristic);
        assert!(rig.stopped.load(Ordering::SeqCst));
        assert_eq!(arbiter.holder(ResourceKind::Camera), None);

        vision.close();
        rig.factory.fail = false;
        let again = vision.start(camera(&rig), Some(&mut rig.factory)).unwrap();
        assert_eq!(again, SignalSource::Heuristic);
        assert_eq!(rig.factory.loads, 1);
    }

    #[test]
    fn test_permission_denied_falls_back() {
        let arbiter = ResourceArbiter::new();
        arbiter.set_permission(ResourceKind::Camera, false);
        let mut rig = rig(false);
        let mut vision = adapter(&arbiter);

        let source = vision.start(camera(&rig), Some(&mut rig.factory)).unwrap();
        assert_eq!(source, SignalSource::Heuristic);
        assert_eq!(rig.factory.loads, 0);
    }

    #[test]
    fn test_busy_camera_is_reported_with_nothing_held() {
        let arbiter = ResourceArbiter::new();
        let _other = arbiter
            .acquire(ResourceKind::Camera, Consumer::External)
            .unwrap();
        let mut rig = rig(false);
        let mut vision = adapter(&arbiter);

        let err = vision
            .start(camera(&rig), Some(&mut rig.factory))
            .unwrap_err();
        assert!(matches!(err, EngineError::ResourceBusy { .. }));
        assert_eq!(arbiter.active_leases(), 1);
        assert!(!vision.is_running());
    }

    #[test]
    fn test_fallback_runs_at_five_hz() {
        let arbiter = ResourceArbiter::new();
        let mut vision = adapter(&arbiter);
        assert_eq!(vision.start(None, None).unwrap(), SignalSource::Heuristic);

        let moving = BehaviorMetrics {
            frustration: 10.0,
            joy: 20.0,
            velocity: 2.0,
        };
        let emitted = (0..1_000)
            .step_by(33)
            .filter(|t| vision.poll(*t, &moving).metrics.is_some())
            .count();
        assert_eq!(emitted, 5);

        let latest = vision.latest().unwrap();
        assert_eq!(latest.tension, 30.0);
        assert_eq!(latest.frustration, 10.0);
        assert_eq!(latest.joy, 20.0);
        assert_eq!(
            arbiter.holder(ResourceKind::Accelerator),
            Some(Consumer::BehavioralFallback)
        );
    }

    #[test]
    fn test_fallback_waits_for_accelerator() {
        let arbiter = ResourceArbiter::new();
        let mut held = arbiter
            .acquire(ResourceKind::Accelerator, Consumer::External)
            .unwrap();
        let mut vision = adapter(&arbiter);
        vision.start(None, None).unwrap();

        let idle = BehaviorMetrics::default();
        assert!(vision.poll(0, &idle).metrics.is_none());
        held.release();
        assert!(vision.poll(100, &idle).metrics.is_none());
        assert!(vision.poll(200, &idle).metrics.is_some());
    }

    #[test]
    fn test_close_is_idempotent_and_releases_everything() {
        let arbiter = ResourceArbiter::new();
        let mut rig = rig(false);
        let mut vision = adapter(&arbiter);
        vision.start(camera(&rig), Some(&mut rig.factory)).unwrap();
        assert_eq!(arbiter.active_leases(), 2);

        vision.close();
        vision.close();
        assert_eq!(arbiter.active_leases(), 0);
        assert!(rig.stopped.load(Ordering::SeqCst));
        assert!(!vision.is_running());
    }

    #[test]
    fn test_close_before_start_is_safe() {
        let arbiter = ResourceArbiter::new();
        let mut vision = adapter(&arbiter);
        vision.close();
        assert_eq!(arbiter.active_leases(), 0);
    }
}
