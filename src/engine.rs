//! Engine orchestration
//!
//! [`CognitiveLoadEngine`] owns every adapter and pipeline stage. Hosts feed it
//! raw input events, call [`poll_sensors`](CognitiveLoadEngine::poll_sensors) at
//! the sensor cadence and [`tick`](CognitiveLoadEngine::tick) at the evaluation
//! cadence (or let a [`TickDriver`](crate::scheduler::TickDriver) do both).
//!
//! Per tick:
//! 1. MetricsBoard - latest value of every metric field
//! 2. FeatureAggregator - keyboard counters + metrics into a feature vector
//! 3. LoadScorer - feature vector to score
//! 4. ClassificationTracker - score to bucket, edge events
//! 5. CrisisTrigger - hysteresis on the score

use crate::adapters::behavior::{BehaviorAdapter, InteractionContext};
use crate::adapters::pointer::PointerSample;
use crate::adapters::vision::{FrameSource, LandmarkerFactory, VisionAdapter};
use crate::adapters::voice::{MicrophoneStream, SpeechRecognizer, VoiceAdapter, VoiceMode};
use crate::aggregator::{FeatureAggregator, MetricsBoard};
use crate::arbiter::ResourceArbiter;
use crate::calibration::CalibrationBaseline;
use crate::classifier::ClassificationTracker;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::intervention::{CrisisTrigger, DistressMonitor};
use crate::scorer::{LoadScorer, ScorerWeights};
use crate::types::{
    BiometricSample, ClassificationChange, CognitiveState, DistressMetric, FaceEvent,
    LoadReading, SignalSource,
};
use chrono::Utc;
use tracing::{debug, info, warn};

/// Callback invoked with an event payload
pub type Callback<T> = Box<dyn FnMut(&T) + Send>;

#[derive(Default)]
struct Callbacks {
    tick: Vec<Callback<LoadReading>>,
    face: Vec<(FaceEvent, Callback<FaceEvent>)>,
    classification: Vec<Callback<ClassificationChange>>,
    crisis: Vec<Callback<LoadReading>>,
    distress: Vec<Callback<DistressMetric>>,
}

/// Real-time cognitive load engine
pub struct CognitiveLoadEngine {
    config: EngineConfig,
    arbiter: ResourceArbiter,
    vision: VisionAdapter,
    voice: VoiceAdapter,
    behavior: BehaviorAdapter,
    board: MetricsBoard,
    aggregator: FeatureAggregator,
    scorer: LoadScorer,
    tracker: ClassificationTracker,
    crisis: CrisisTrigger,
    distress: DistressMonitor,
    pending_distress: Vec<DistressMetric>,
    landmarker_factory: Option<Box<dyn LandmarkerFactory>>,
    callbacks: Callbacks,
    started: bool,
    last_reading: Option<LoadReading>,
}

impl CognitiveLoadEngine {
    /// Create an engine. The scorer starts uninitialized and reports the
    /// neutral score until weights are loaded.
    pub fn new(config: EngineConfig, arbiter: ResourceArbiter) -> Self {
        Self {
            vision: VisionAdapter::new(arbiter.clone(), config.vision, config.calibration),
            voice: VoiceAdapter::new(arbiter.clone(), config.voice),
            behavior: BehaviorAdapter::new(config.behavior, config.touch_capable),
            board: MetricsBoard::new(),
            aggregator: FeatureAggregator::new(&config.aggregator),
            scorer: LoadScorer::uninitialized(),
            tracker: ClassificationTracker::new(config.classifier),
            crisis: CrisisTrigger::new(&config.intervention),
            distress: DistressMonitor::new(&config.intervention),
            pending_distress: Vec::new(),
            landmarker_factory: None,
            callbacks: Callbacks::default(),
            started: false,
            last_reading: None,
            arbiter,
            config,
        }
    }

    /// Validate `config` before building the engine
    pub fn try_new(config: EngineConfig, arbiter: ResourceArbiter) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self::new(config, arbiter))
    }

    pub fn with_scorer(mut self, scorer: LoadScorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_landmarker_factory(mut self, factory: Box<dyn LandmarkerFactory>) -> Self {
        self.landmarker_factory = Some(factory);
        self
    }

    pub fn load_weights(&mut self, weights: ScorerWeights) -> Result<(), EngineError> {
        self.scorer.load(weights)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn arbiter(&self) -> &ResourceArbiter {
        &self.arbiter
    }

    pub fn board(&self) -> &MetricsBoard {
        &self.board
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn signal_source(&self) -> SignalSource {
        self.vision.source()
    }

    pub fn is_heuristic(&self) -> bool {
        self.vision.is_heuristic()
    }

    pub fn voice_mode(&self) -> Option<VoiceMode> {
        self.voice.mode()
    }

    pub fn calibration(&self) -> &CalibrationBaseline {
        self.vision.calibration()
    }

    pub fn restore_calibration(&mut self, baseline: CalibrationBaseline) {
        self.vision.restore_calibration(baseline);
    }

    /// Score and classification of the most recent tick
    pub fn state(&self) -> Option<CognitiveState> {
        self.last_reading.as_ref().map(LoadReading::state)
    }

    pub fn last_reading(&self) -> Option<&LoadReading> {
        self.last_reading.as_ref()
    }

    // Event subscriptions

    pub fn on_tick<F>(&mut self, callback: F)
    where
        F: FnMut(&LoadReading) + Send + 'static,
    {
        self.callbacks.tick.push(Box::new(callback));
    }

    pub fn on_face_lost<F>(&mut self, callback: F)
    where
        F: FnMut(&FaceEvent) + Send + 'static,
    {
        self.callbacks
            .face
            .push((FaceEvent::FaceLost, Box::new(callback)));
    }

    pub fn on_face_recovered<F>(&mut self, callback: F)
    where
        F: FnMut(&FaceEvent) + Send + 'static,
    {
        self.callbacks
            .face
            .push((FaceEvent::FaceRecovered, Box::new(callback)));
    }

    pub fn on_classification_changed<F>(&mut self, callback: F)
    where
        F: FnMut(&ClassificationChange) + Send + 'static,
    {
        self.callbacks.classification.push(Box::new(callback));
    }

    /// Invoked with the reading on which the crisis trigger fired
    pub fn on_crisis<F>(&mut self, callback: F)
    where
        F: FnMut(&LoadReading) + Send + 'static,
    {
        self.callbacks.crisis.push(Box::new(callback));
    }

    pub fn on_distress<F>(&mut self, callback: F)
    where
        F: FnMut(&DistressMetric) + Send + 'static,
    {
        self.callbacks.distress.push(Box::new(callback));
    }

    // Lifecycle

    /// Start the vision path.
    ///
    /// Never fails: permission denial, a missing video source, model failure and
    /// camera contention all end in the heuristic fallback, reported through the
    /// returned source and `is_heuristic`.
    pub fn start(&mut self, video: Option<Box<dyn FrameSource>>) -> SignalSource {
        let factory = self.landmarker_factory.as_deref_mut();
        let source = match self.vision.start(video, factory) {
            Ok(source) => source,
            Err(e) => {
                warn!(error = %e, "vision start failed");
                self.vision.enter_fallback("camera unavailable");
                self.vision.source()
            }
        };
        self.started = true;
        info!(source = ?source, "engine started");
        source
    }

    /// Start the voice path. Failure leaves the engine running without voice.
    pub fn start_voice(
        &mut self,
        stream: Box<dyn MicrophoneStream>,
        recognizer: Option<Box<dyn SpeechRecognizer>>,
        now_ms: u64,
    ) -> Result<VoiceMode, EngineError> {
        self.voice.start(stream, recognizer, now_ms)
    }

    /// Halt capture and release every lease. Safe before `start` and when
    /// called repeatedly.
    pub fn stop(&mut self) {
        self.vision.close();
        self.voice.stop();
        if self.started {
            self.started = false;
            info!("engine stopped");
        }
    }

    // Raw input

    pub fn pointer_down(&mut self, sample: PointerSample) {
        self.behavior.on_pointer_down(sample);
    }

    pub fn pointer_move(&mut self, sample: PointerSample) {
        self.behavior.on_pointer_move(sample);
    }

    pub fn hover_start(&mut self, now_ms: u64) {
        self.behavior.on_hover_start(now_ms);
    }

    pub fn hover_end(&mut self) {
        self.behavior.on_hover_end();
    }

    pub fn key(&mut self, now_ms: u64, is_backspace: bool) {
        self.aggregator.keyboard_mut().on_key(now_ms, is_backspace);
    }

    /// Focus or visibility change of the host surface
    pub fn focus_changed(&mut self, focused: bool) {
        self.aggregator.keyboard_mut().on_focus_change(focused);
    }

    pub fn set_interaction_context(&mut self, context: InteractionContext) {
        self.behavior.set_context(context);
    }

    // Scheduling

    /// Let each sensor adapter process at most one sample
    pub fn poll_sensors(&mut self, now_ms: u64) {
        let behavior = self.behavior.metrics(now_ms);
        self.board.publish(&BiometricSample::Behavioral(behavior));
        let update = self.vision.poll(now_ms, &behavior);

        if let Some(event) = update.event {
            debug!(event = ?event, now_ms, "face presence changed");
            for (kind, callback) in self.callbacks.face.iter_mut() {
                if *kind == event {
                    callback(&event);
                }
            }
        }

        if let Some(metrics) = update.metrics {
            self.board.publish(&BiometricSample::Vision(metrics));
        }

        if self.started && self.config.intervention.distress_monitor {
            let snapshot = self.board.snapshot();
            let fired = self
                .distress
                .update(snapshot.frustration, snapshot.confusion, now_ms);
            for metric in fired {
                for callback in self.callbacks.distress.iter_mut() {
                    callback(&metric);
                }
                self.pending_distress.push(metric);
            }
        }

        if let Some(metrics) = self.voice.poll(now_ms) {
            self.board.publish(&BiometricSample::Voice(metrics));
        }
    }

    /// Run one evaluation tick
    pub fn tick(&mut self, now_ms: u64) -> LoadReading {
        self.board.publish(&self.behavior.sample(now_ms));
        let metrics = self.board.snapshot();
        let features = self.aggregator.aggregate(now_ms, &metrics);
        let score = self.scorer.score(&features);
        let change = self.tracker.update(score);
        let crisis_fired = self.crisis.update(score);

        let reading = LoadReading {
            score,
            classification: self.tracker.current(),
            metrics,
            features,
            is_heuristic: self.vision.is_heuristic(),
            crisis_fired,
            distress_fired: std::mem::take(&mut self.pending_distress),
            tick_ms: now_ms,
            timestamp: Utc::now(),
        };
        debug!(
            score,
            classification = reading.classification.as_str(),
            is_heuristic = reading.is_heuristic,
            "tick"
        );

        for callback in self.callbacks.tick.iter_mut() {
            callback(&reading);
        }
        if let Some(change) = change {
            info!(
                from = change.from.as_str(),
                to = change.to.as_str(),
                score,
                "classification changed"
            );
            for callback in self.callbacks.classification.iter_mut() {
                callback(&change);
            }
        }
        if crisis_fired {
            for callback in self.callbacks.crisis.iter_mut() {
                callback(&reading);
            }
        }

        self.last_reading = Some(reading.clone());
        reading
    }

    pub fn dismiss_crisis(&mut self) {
        self.crisis.dismiss();
    }

    pub fn dismiss_distress(&mut self, metric: DistressMetric) {
        self.distress.dismiss(metric);
    }
}

impl Drop for CognitiveLoadEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
