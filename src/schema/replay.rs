//! Recorded-session replay
//!
//! Drives a full engine from a list of [`InputEvent`]s. Camera, face model,
//! microphone and recognizer are replaced by scripted sources that serve the
//! recorded frames, waveforms and transcript segments, so a replay exercises the
//! same adapters, arbiter and pipeline as a live session.

use crate::adapters::blendshapes::FaceObservation;
use crate::adapters::transcript::TranscriptSegment;
use crate::adapters::vision::{
    FaceLandmarker, FrameSource, LandmarkerFactory, VideoFrame,
};
use crate::adapters::voice::{MicrophoneStream, SpeechRecognizer, VoiceMode};
use crate::arbiter::ResourceArbiter;
use crate::config::EngineConfig;
use crate::engine::CognitiveLoadEngine;
use crate::error::EngineError;
use crate::schema::event::InputEvent;
use crate::scorer::LoadScorer;
use crate::types::{FaceEvent, LoadReading, SignalSource};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Recorded sensor state served to the scripted sources
#[derive(Debug, Default)]
struct ReplayFeed {
    frame_clock: Option<u64>,
    face: Option<FaceObservation>,
    audio: Option<Vec<f32>>,
    segments: Vec<TranscriptSegment>,
}

type SharedFeed = Arc<Mutex<ReplayFeed>>;

struct ScriptedCamera(SharedFeed);

impl FrameSource for ScriptedCamera {
    fn frame_clock(&self) -> Option<u64> {
        self.0.lock().frame_clock
    }

    fn read_frame(&mut self) -> Option<VideoFrame> {
        let clock_ms = self.0.lock().frame_clock?;
        Some(VideoFrame {
            clock_ms,
            width: 0,
            height: 0,
            pixels: Vec::new(),
        })
    }

    fn stop(&mut self) {}
}

struct ScriptedLandmarker(SharedFeed);

impl FaceLandmarker for ScriptedLandmarker {
    fn detect(&mut self, _frame: &VideoFrame) -> Result<Option<FaceObservation>, EngineError> {
        Ok(self.0.lock().face)
    }
}

struct ScriptedModel(SharedFeed);

impl LandmarkerFactory for ScriptedModel {
    fn load(&mut self) -> Result<Box<dyn FaceLandmarker>, EngineError> {
        Ok(Box::new(ScriptedLandmarker(Arc::clone(&self.0))))
    }
}

struct ScriptedMicrophone(SharedFeed);

impl MicrophoneStream for ScriptedMicrophone {
    fn fill_time_domain(&mut self, window: &mut [f32]) -> bool {
        let feed = self.0.lock();
        let Some(audio) = feed.audio.as_ref() else {
            return false;
        };
        // Newest samples at the end of the window, zero padded in front
        window.fill(0.0);
        let n = audio.len().min(window.len());
        let offset = window.len() - n;
        window[offset..].copy_from_slice(&audio[audio.len() - n..]);
        true
    }

    fn stop(&mut self) {}
}

struct ScriptedRecognizer(SharedFeed);

impl SpeechRecognizer for ScriptedRecognizer {
    fn poll_segments(&mut self) -> Result<Vec<TranscriptSegment>, EngineError> {
        Ok(std::mem::take(&mut self.0.lock().segments))
    }

    fn stop(&mut self) {}
}

/// Face presence transition observed during a replay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedFaceEvent {
    pub t: u64,
    pub event: FaceEvent,
}

/// Everything a replay produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayOutcome {
    pub source: SignalSource,
    pub voice_mode: Option<VoiceMode>,
    pub readings: Vec<LoadReading>,
    pub face_events: Vec<TimedFaceEvent>,
}

/// Replays recorded input through a fresh engine
pub struct ReplaySession {
    config: EngineConfig,
    scorer: LoadScorer,
}

impl ReplaySession {
    pub fn new(config: EngineConfig, scorer: LoadScorer) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self { config, scorer })
    }

    /// Replay `events` and return one reading per evaluation tick.
    ///
    /// Events are applied in time order. Ticks fall on multiples of the tick
    /// interval after the first event; the replay runs through the first tick
    /// at or after the last event.
    pub fn run(&self, events: &[InputEvent]) -> Result<ReplayOutcome, EngineError> {
        for event in events {
            event.validate()?;
        }
        let mut ordered: Vec<&InputEvent> = events.iter().collect();
        ordered.sort_by_key(|e| e.timestamp_ms());

        let has_face = ordered.iter().any(|e| matches!(e, InputEvent::Face { .. }));
        let has_audio = ordered.iter().any(|e| matches!(e, InputEvent::Audio { .. }));
        let has_transcript = ordered
            .iter()
            .any(|e| matches!(e, InputEvent::Transcript { .. }));

        let start_ms = ordered.first().map(|e| e.timestamp_ms()).unwrap_or(0);
        let last_ms = ordered.last().map(|e| e.timestamp_ms()).unwrap_or(0);
        let tick_ms = self.config.tick_interval_ms;
        let poll_ms = self.config.sensor_poll_interval_ms;
        let ticks = (last_ms - start_ms).div_ceil(tick_ms).max(1);
        let end_ms = start_ms + ticks * tick_ms;

        let feed: SharedFeed = Arc::new(Mutex::new(ReplayFeed::default()));
        let arbiter = ResourceArbiter::new();
        let mut engine = CognitiveLoadEngine::new(self.config.clone(), arbiter)
            .with_scorer(self.scorer.clone());
        if has_face {
            engine = engine.with_landmarker_factory(Box::new(ScriptedModel(Arc::clone(&feed))));
        }

        let clock = Arc::new(AtomicU64::new(start_ms));
        let face_events = Arc::new(Mutex::new(Vec::new()));
        for kind in [FaceEvent::FaceLost, FaceEvent::FaceRecovered] {
            let clock = Arc::clone(&clock);
            let sink = Arc::clone(&face_events);
            let record = move |event: &FaceEvent| {
                sink.lock().push(TimedFaceEvent {
                    t: clock.load(Ordering::SeqCst),
                    event: *event,
                });
            };
            match kind {
                FaceEvent::FaceLost => engine.on_face_lost(record),
                FaceEvent::FaceRecovered => engine.on_face_recovered(record),
            }
        }

        let camera: Option<Box<dyn FrameSource>> = if has_face {
            Some(Box::new(ScriptedCamera(Arc::clone(&feed))))
        } else {
            None
        };
        let source = engine.start(camera);

        if has_audio {
            let recognizer: Option<Box<dyn SpeechRecognizer>> = if has_transcript {
                Some(Box::new(ScriptedRecognizer(Arc::clone(&feed))))
            } else {
                None
            };
            engine.start_voice(
                Box::new(ScriptedMicrophone(Arc::clone(&feed))),
                recognizer,
                start_ms,
            )?;
        }
        let voice_mode = engine.voice_mode();
        info!(
            events = ordered.len(),
            source = ?source,
            voice = ?voice_mode,
            "replaying session"
        );

        let mut readings = Vec::with_capacity(ticks as usize);
        let mut pending = ordered.into_iter().peekable();
        let mut next_tick = start_ms + tick_ms;
        let mut now = start_ms;

        loop {
            clock.store(now, Ordering::SeqCst);
            while let Some(event) = pending.next_if(|e| e.timestamp_ms() <= now) {
                apply(&mut engine, &feed, event);
            }
            engine.poll_sensors(now);

            if now >= next_tick {
                readings.push(engine.tick(now));
                next_tick += tick_ms;
            }
            if now >= end_ms {
                break;
            }
            // Land exactly on tick boundaries
            now = (now + poll_ms).min(next_tick);
        }

        engine.stop();
        debug!(readings = readings.len(), "replay finished");

        let face_events = std::mem::take(&mut *face_events.lock());
        Ok(ReplayOutcome {
            source,
            voice_mode,
            readings,
            face_events,
        })
    }
}

fn apply(engine: &mut CognitiveLoadEngine, feed: &SharedFeed, event: &InputEvent) {
    match event {
        InputEvent::PointerDown { .. } => {
            if let Some(sample) = event.pointer_sample() {
                engine.pointer_down(sample);
            }
        }
        InputEvent::PointerMove { .. } => {
            if let Some(sample) = event.pointer_sample() {
                engine.pointer_move(sample);
            }
        }
        InputEvent::HoverStart { t } => engine.hover_start(*t),
        InputEvent::HoverEnd { .. } => engine.hover_end(),
        InputEvent::Key { t, backspace } => engine.key(*t, *backspace),
        InputEvent::Focus { focused, .. } => engine.focus_changed(*focused),
        InputEvent::Face { t, face } => {
            let mut feed = feed.lock();
            feed.frame_clock = Some(*t);
            feed.face = *face;
        }
        InputEvent::Audio { samples, .. } => {
            feed.lock().audio = Some(samples.clone());
        }
        InputEvent::Transcript {
            index,
            text,
            is_final,
            ..
        } => {
            feed.lock().segments.push(TranscriptSegment {
                index: *index,
                text: text.clone(),
                is_final: *is_final,
            });
        }
        InputEvent::Context { context, .. } => engine.set_interaction_context(*context),
        InputEvent::DismissCrisis { .. } => engine.dismiss_crisis(),
        InputEvent::DismissDistress { metric, .. } => engine.dismiss_distress(*metric),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::pointer::PointerKind;
    use crate::schema::event::parse_ndjson;
    use pretty_assertions::assert_eq;

    fn session() -> ReplaySession {
        ReplaySession::new(EngineConfig::default(), LoadScorer::uninitialized()).unwrap()
    }

    #[test]
    fn test_pointer_only_replay_is_heuristic() {
        let events = vec![
            InputEvent::PointerDown {
                t: 0,
                x: 0.0,
                y: 0.0,
                kind: PointerKind::Mouse,
            },
            InputEvent::PointerMove {
                t: 100,
                x: 400.0,
                y: 0.0,
                kind: PointerKind::Mouse,
            },
            InputEvent::Key {
                t: 3_000,
                backspace: false,
            },
        ];
        let outcome = session().run(&events).unwrap();
        assert_eq!(outcome.source, SignalSource::Heuristic);
        assert_eq!(outcome.voice_mode, None);
        assert_eq!(outcome.readings.len(), 2);
        assert_eq!(outcome.readings[0].tick_ms, 2_000);
        assert_eq!(outcome.readings[1].tick_ms, 4_000);
        assert!(outcome.readings.iter().all(|r| r.is_heuristic));
        assert!(outcome.readings[0].metrics.tension > 0.0);
        assert!(outcome.readings[1].features.keystrokes_per_minute() > 0.0);
    }

    #[test]
    fn test_face_replay_uses_vision_and_reports_loss() {
        let mut lines = Vec::new();
        for i in 0..300u64 {
            let t = i * 33;
            if t < 2_000 {
                lines.push(format!(
                    r#"{{"type":"face","t":{},"face":{{"brow_distance":0.2,"blendshapes":{{"mouth_smile_left":0.6,"mouth_smile_right":0.6}}}}}}"#,
                    t
                ));
            } else {
                lines.push(format!(r#"{{"type":"face","t":{}}}"#, t));
            }
        }
        let events = parse_ndjson(&lines.join("\n")).unwrap();
        let outcome = session().run(&events).unwrap();

        assert_eq!(outcome.source, SignalSource::Vision);
        assert!(!outcome.readings[0].is_heuristic);
        assert!(outcome.readings[0].metrics.joy > 0.0);
        assert_eq!(outcome.face_events.len(), 1);
        assert_eq!(outcome.face_events[0].event, FaceEvent::FaceLost);
        // Last face at 1_980
        assert!(outcome.face_events[0].t >= 6_980);
    }

    #[test]
    fn test_audio_replay_produces_vocal_energy() {
        let events = vec![
            InputEvent::Audio {
                t: 0,
                samples: vec![0.1; 2_048],
            },
            InputEvent::Transcript {
                t: 500,
                index: 0,
                text: "let me think about this".to_string(),
                is_final: true,
            },
            InputEvent::Key {
                t: 1_900,
                backspace: false,
            },
        ];
        let outcome = session().run(&events).unwrap();
        assert_eq!(outcome.voice_mode, Some(VoiceMode::Full));
        let metrics = outcome.readings[0].metrics;
        assert!((metrics.vocal_energy - 50.0).abs() < 1e-3);
        assert!(metrics.speech_rate > 0.0);
    }

    #[test]
    fn test_empty_recording_yields_one_neutral_tick() {
        let outcome = session().run(&[]).unwrap();
        assert_eq!(outcome.readings.len(), 1);
        assert_eq!(outcome.readings[0].score, 50);
    }
}
