//! Voice adapter
//!
//! Measures vocal energy from the microphone waveform and speech rate from a
//! streaming recognizer. The microphone and the shared audio context are both
//! obtained through the resource arbiter.

use crate::adapters::transcript::{SpeechRateCounter, TranscriptSegment};
use crate::arbiter::{AudioContextHandle, Consumer, Lease, ResourceArbiter, ResourceKind};
use crate::config::VoiceConfig;
use crate::error::EngineError;
use crate::types::VoiceMetrics;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Live microphone feed
pub trait MicrophoneStream: Send {
    /// Copy the most recent time-domain samples into `window`.
    /// Returns false when no audio has been captured yet.
    fn fill_time_domain(&mut self, window: &mut [f32]) -> bool;

    /// Stop the microphone track. Must be safe to call more than once.
    fn stop(&mut self);
}

/// Continuous speech recognizer
pub trait SpeechRecognizer: Send {
    /// Results produced since the previous call
    fn poll_segments(&mut self) -> Result<Vec<TranscriptSegment>, EngineError>;

    fn stop(&mut self);
}

/// Which voice metrics are being produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceMode {
    /// Energy and speech rate at the audio callback pace
    Full,
    /// Energy only, at a reduced cadence
    EnergyOnly,
}

/// Root mean square of a waveform window
pub fn rms(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples
        .iter()
        .map(|s| {
            let s = *s as f64;
            if s.is_finite() {
                s * s
            } else {
                0.0
            }
        })
        .sum();
    (sum / samples.len() as f64).sqrt()
}

/// Microphone + transcription adapter
pub struct VoiceAdapter {
    arbiter: ResourceArbiter,
    config: VoiceConfig,
    mode: Option<VoiceMode>,
    microphone: Option<Lease>,
    context: Option<AudioContextHandle>,
    stream: Option<Box<dyn MicrophoneStream>>,
    recognizer: Option<Box<dyn SpeechRecognizer>>,
    counter: SpeechRateCounter,
    window: Vec<f32>,
    last_sample_ms: Option<u64>,
    latest: Option<VoiceMetrics>,
}

impl VoiceAdapter {
    pub fn new(arbiter: ResourceArbiter, config: VoiceConfig) -> Self {
        Self {
            arbiter,
            mode: None,
            microphone: None,
            context: None,
            stream: None,
            recognizer: None,
            counter: SpeechRateCounter::new(),
            window: vec![0.0; config.analysis_window],
            last_sample_ms: None,
            latest: None,
            config,
        }
    }

    pub fn mode(&self) -> Option<VoiceMode> {
        self.mode
    }

    pub fn latest(&self) -> Option<VoiceMetrics> {
        self.latest
    }

    /// Acquire the microphone and the shared audio context.
    ///
    /// Without a recognizer the adapter runs energy-only.
    pub fn start(
        &mut self,
        mut stream: Box<dyn MicrophoneStream>,
        recognizer: Option<Box<dyn SpeechRecognizer>>,
        now_ms: u64,
    ) -> Result<VoiceMode, EngineError> {
        if let Some(mode) = self.mode {
            return Ok(mode);
        }

        let lease = match self.arbiter.acquire(ResourceKind::Microphone, Consumer::Voice) {
            Ok(lease) => lease,
            Err(e) => {
                stream.stop();
                if let Some(mut recognizer) = recognizer {
                    recognizer.stop();
                }
                return Err(e);
            }
        };

        self.context = Some(self.arbiter.acquire_audio_context());
        self.microphone = Some(lease);
        self.stream = Some(stream);

        let mode = match recognizer {
            Some(recognizer) => {
                self.recognizer = Some(recognizer);
                VoiceMode::Full
            }
            None => {
                warn!("continuous transcription unavailable, voice running energy-only");
                VoiceMode::EnergyOnly
            }
        };
        self.counter.start(now_ms);
        self.last_sample_ms = None;
        self.mode = Some(mode);
        info!(?mode, "voice adapter started");
        Ok(mode)
    }

    fn degrade(&mut self, error: &EngineError) {
        warn!(error = %error, "transcription failed, voice running energy-only");
        if let Some(mut recognizer) = self.recognizer.take() {
            recognizer.stop();
        }
        self.mode = Some(VoiceMode::EnergyOnly);
    }

    /// Produce one sample if the adapter's cadence allows it
    pub fn poll(&mut self, now_ms: u64) -> Option<VoiceMetrics> {
        let mode = self.mode?;

        if mode == VoiceMode::EnergyOnly {
            if let Some(last) = self.last_sample_ms {
                if now_ms.saturating_sub(last) < self.config.energy_only_interval_ms {
                    return None;
                }
            }
        }

        if let Some(recognizer) = self.recognizer.as_mut() {
            match recognizer.poll_segments() {
                Ok(segments) => self.counter.ingest(&segments),
                Err(e) => self.degrade(&e),
            }
        }

        let stream = self.stream.as_mut()?;
        if !stream.fill_time_domain(&mut self.window) {
            return None;
        }
        self.last_sample_ms = Some(now_ms);

        let vocal_energy = (rms(&self.window) * self.config.energy_gain).clamp(0.0, 100.0);
        let speech_rate = match self.mode {
            Some(VoiceMode::Full) => Some(
                self.counter
                    .words_per_minute(now_ms, self.config.min_rate_elapsed_ms),
            ),
            _ => None,
        };

        let metrics = VoiceMetrics {
            vocal_energy,
            speech_rate,
        };
        self.latest = Some(metrics);
        Some(metrics)
    }

    /// Release the microphone and suspend (not close) the shared audio context.
    /// Idempotent.
    pub fn stop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
        }
        if let Some(mut recognizer) = self.recognizer.take() {
            recognizer.stop();
        }
        if let Some(mut lease) = self.microphone.take() {
            lease.release();
        }
        if self.context.take().is_some() {
            self.arbiter.suspend_audio_context();
        }
        if self.mode.take().is_some() {
            info!("voice adapter stopped");
        }
    }
}

impl Drop for VoiceAdapter {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbiter::AudioContextState;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct ConstantMic {
        level: f32,
        stopped: Arc<Mutex<u32>>,
    }

    impl MicrophoneStream for ConstantMic {
        fn fill_time_domain(&mut self, window: &mut [f32]) -> bool {
            for (i, s) in window.iter_mut().enumerate() {
                *s = if i % 2 == 0 { self.level } else { -self.level };
            }
            true
        }

        fn stop(&mut self) {
            *self.stopped.lock() += 1;
        }
    }

    struct ScriptedRecognizer {
        batches: Vec<Result<Vec<TranscriptSegment>, EngineError>>,
    }

    impl SpeechRecognizer for ScriptedRecognizer {
        fn poll_segments(&mut self) -> Result<Vec<TranscriptSegment>, EngineError> {
            if self.batches.is_empty() {
                Ok(Vec::new())
            } else {
                self.batches.remove(0)
            }
        }

        fn stop(&mut self) {}
    }

    fn mic(level: f32) -> (Box<dyn MicrophoneStream>, Arc<Mutex<u32>>) {
        let stopped = Arc::new(Mutex::new(0));
        (
            Box::new(ConstantMic {
                level,
                stopped: Arc::clone(&stopped),
            }),
            stopped,
        )
    }

    #[test]
    fn test_rms() {
        assert_eq!(rms(&[]), 0.0);
        assert!((rms(&[0.5, -0.5, 0.5, -0.5]) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_energy_scaled_and_clamped() {
        let arbiter = ResourceArbiter::new();
        let mut voice = VoiceAdapter::new(arbiter.clone(), VoiceConfig::default());
        let (stream, _) = mic(0.1);
        voice.start(stream, None, 0).unwrap();
        let metrics = voice.poll(0).unwrap();
        assert!((metrics.vocal_energy - 50.0).abs() < 1e-4);
        assert_eq!(metrics.speech_rate, None);

        let mut loud = VoiceAdapter::new(ResourceArbiter::new(), VoiceConfig::default());
        let (stream, _) = mic(0.9);
        loud.start(stream, None, 0).unwrap();
        assert_eq!(loud.poll(0).unwrap().vocal_energy, 100.0);
    }

    #[test]
    fn test_energy_only_runs_at_one_hz() {
        let arbiter = ResourceArbiter::new();
        let mut voice = VoiceAdapter::new(arbiter, VoiceConfig::default());
        let (stream, _) = mic(0.1);
        assert_eq!(voice.start(stream, None, 0).unwrap(), VoiceMode::EnergyOnly);

        let samples = (0..3_000)
            .step_by(50)
            .filter(|t| voice.poll(*t).is_some())
            .count();
        assert_eq!(samples, 3);
    }

    #[test]
    fn test_speech_rate_with_recognizer() {
        let arbiter = ResourceArbiter::new();
        let mut voice = VoiceAdapter::new(arbiter, VoiceConfig::default());
        let (stream, _) = mic(0.1);
        let recognizer = ScriptedRecognizer {
            batches: vec![Ok(vec![
                TranscriptSegment {
                    index: 0,
                    text: "one two three".to_string(),
                    is_final: true,
                },
                TranscriptSegment {
                    index: 1,
                    text: "four".to_string(),
                    is_final: false,
                },
            ])],
        };
        assert_eq!(
            voice.start(stream, Some(Box::new(recognizer)), 0).unwrap(),
            VoiceMode::Full
        );

        let metrics = voice.poll(30_000).unwrap();
        assert!((metrics.speech_rate.unwrap() - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_recognizer_failure_degrades_to_energy_only() {
        let arbiter = ResourceArbiter::new();
        let mut voice = VoiceAdapter::new(arbiter, VoiceConfig::default());
        let (stream, _) = mic(0.1);
        let recognizer = ScriptedRecognizer {
            batches: vec![Err(EngineError::TransientSample("network".to_string()))],
        };
        voice.start(stream, Some(Box::new(recognizer)), 0).unwrap();

        let metrics = voice.poll(100).unwrap();
        assert_eq!(metrics.speech_rate, None);
        assert_eq!(voice.mode(), Some(VoiceMode::EnergyOnly));
    }

    #[test]
    fn test_stop_suspends_shared_context_and_is_idempotent() {
        let arbiter = ResourceArbiter::new();
        let mut voice = VoiceAdapter::new(arbiter.clone(), VoiceConfig::default());
        let (stream, stopped) = mic(0.1);
        voice.start(stream, None, 0).unwrap();
        assert_eq!(arbiter.holder(ResourceKind::Microphone), Some(Consumer::Voice));

        voice.stop();
        voice.stop();
        assert_eq!(*stopped.lock(), 1);
        assert_eq!(arbiter.active_leases(), 0);
        assert_eq!(
            arbiter.audio_context_state(),
            Some(AudioContextState::Suspended)
        );

        // Restart reuses the same context
        let (stream, _) = mic(0.1);
        voice.start(stream, None, 5_000).unwrap();
        assert_eq!(arbiter.snapshot().audio_contexts_created, 1);
        assert_eq!(
            arbiter.audio_context_state(),
            Some(AudioContextState::Running)
        );
    }

    #[test]
    fn test_denied_microphone_stops_stream() {
        let arbiter = ResourceArbiter::new();
        arbiter.set_permission(ResourceKind::Microphone, false);
        let mut voice = VoiceAdapter::new(arbiter.clone(), VoiceConfig::default());
        let (stream, stopped) = mic(0.1);

        let err = voice.start(stream, None, 0).unwrap_err();
        assert!(matches!(err, EngineError::PermissionDenied(ResourceKind::Microphone)));
        assert_eq!(*stopped.lock(), 1);
        assert_eq!(arbiter.audio_context_state(), None);
        assert!(voice.poll(0).is_none());
    }
}
