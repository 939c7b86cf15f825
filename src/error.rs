//! Error types for Synheart Load

use crate::arbiter::{Consumer, ResourceKind};
use thiserror::Error;

/// Errors that can occur while acquiring resources or processing samples
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Permission denied for {0:?}")]
    PermissionDenied(ResourceKind),

    #[error("Resource {kind:?} is busy (held by {holder:?})")]
    ResourceBusy { kind: ResourceKind, holder: Consumer },

    #[error("Model failed to load: {0}")]
    ModelLoadFailure(String),

    #[error("Transient sample error: {0}")]
    TransientSample(String),

    #[error("Lease for {kind:?} was not issued by this arbiter")]
    ForeignLease { kind: ResourceKind },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid scorer weights: {0}")]
    InvalidWeights(String),

    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),
}
