//! Synheart Load - On-device cognitive load engine
//!
//! Load fuses facial, vocal and pointer/keyboard signals into a real-time
//! cognitive load score: sensor adaptation → metric board → feature
//! aggregation → scoring → classification → intervention triggers.
//!
//! ## Modules
//!
//! - **Adapters**: camera, microphone and pointer adapters with a heuristic
//!   fallback when the camera or face model is unavailable
//! - **Arbiter**: exclusive leases on camera, microphone and accelerator plus
//!   the single shared audio context
//! - **Engine**: the per-tick pipeline and its lifecycle callbacks
//! - **Schema**: recorded sessions for offline replay

pub mod adapters;
pub mod aggregator;
pub mod arbiter;
pub mod calibration;
pub mod classifier;
pub mod config;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod intervention;
pub mod schema;
pub mod scheduler;
pub mod scorer;
pub mod types;

pub use arbiter::{Consumer, Lease, ResourceArbiter, ResourceKind};
pub use config::EngineConfig;
pub use encoder::ReadingEncoder;
pub use engine::CognitiveLoadEngine;
pub use error::EngineError;
pub use scheduler::{CancellationToken, TickDriver};
pub use scorer::{LoadScorer, ScorerWeights};
pub use types::{Classification, CognitiveState, LoadReading, SignalSource};

// Schema exports
pub use schema::{parse_ndjson, InputEvent, ReplayOutcome, ReplaySession};

/// Load version embedded in all encoded readings
pub const LOAD_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for encoded readings
pub const PRODUCER_NAME: &str = "synheart-load";
