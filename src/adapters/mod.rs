//! Sensor and behavior adapters
//!
//! Each adapter turns one raw input stream into a fixed-field metrics record:
//! camera frames into facial composites, microphone audio into vocal metrics,
//! pointer activity into behavioral proxies. Adapters that touch hardware take
//! their leases from the shared [`ResourceArbiter`](crate::arbiter::ResourceArbiter).

pub mod behavior;
pub mod blendshapes;
pub mod face_presence;
pub mod pointer;
pub mod transcript;
pub mod vision;
pub mod voice;

pub use behavior::{BehaviorAdapter, InteractionContext};
pub use blendshapes::{Blendshapes, FaceObservation};
pub use face_presence::FacePresence;
pub use pointer::{PointerKind, PointerSample};
pub use transcript::{SpeechRateCounter, TranscriptSegment};
pub use vision::{FaceLandmarker, FrameSource, LandmarkerFactory, VideoFrame, VisionAdapter, VisionUpdate};
pub use voice::{MicrophoneStream, SpeechRecognizer, VoiceAdapter, VoiceMode};
