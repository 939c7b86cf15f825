//! Resource arbiter
//!
//! Grants exclusive, non-blocking leases on scarce devices (camera, microphone,
//! accelerator context) and owns the single process-wide audio context.
//!
//! The arbiter is a cheap cloneable handle; every adapter receives a clone
//! instead of reaching for a module-level global. A [`Lease`] releases itself
//! on drop, so the claim is returned on every exit path of its holder.

use crate::error::EngineError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

static NEXT_ARBITER_ID: AtomicU64 = AtomicU64::new(1);

/// Scarce resource classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Camera,
    Microphone,
    /// GPU/accelerator context shared by every on-device inference path
    Accelerator,
}

/// Who holds a lease
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Consumer {
    Vision,
    Voice,
    BehavioralFallback,
    External,
}

/// State of the shared audio-processing context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioContextState {
    Running,
    Suspended,
}

/// Handle to the shared audio context returned by [`ResourceArbiter::acquire_audio_context`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioContextHandle {
    /// Identifier of the context; stable across suspend/resume
    pub context_id: u64,
    /// Number of times the context was resumed from suspension
    pub resumes: u32,
}

#[derive(Debug, Clone, Copy)]
struct HeldLease {
    lease_id: u64,
    consumer: Consumer,
}

#[derive(Debug)]
struct AudioContext {
    id: u64,
    state: AudioContextState,
    resumes: u32,
}

#[derive(Debug, Default)]
struct ArbiterState {
    next_lease_id: u64,
    held: HashMap<ResourceKind, HeldLease>,
    denied: HashSet<ResourceKind>,
    audio: Option<AudioContext>,
    audio_contexts_created: u32,
}

#[derive(Debug)]
struct ArbiterInner {
    id: u64,
    state: Mutex<ArbiterState>,
}

impl ArbiterInner {
    fn release(&self, kind: ResourceKind, lease_id: u64) -> bool {
        let mut state = self.state.lock();
        match state.held.get(&kind) {
            Some(held) if held.lease_id == lease_id => {
                let consumer = held.consumer;
                state.held.remove(&kind);
                debug!(?kind, ?consumer, lease_id, "lease released");
                true
            }
            _ => false,
        }
    }
}

/// Snapshot of arbiter state for diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArbiterSnapshot {
    pub active: Vec<(ResourceKind, Consumer)>,
    pub audio_context: Option<AudioContextState>,
    pub audio_contexts_created: u32,
}

/// Exclusive claim on one resource kind
///
/// Dropping the lease releases it. Releasing twice is a no-op.
#[derive(Debug)]
pub struct Lease {
    kind: ResourceKind,
    consumer: Consumer,
    id: u64,
    active: bool,
    arbiter: Arc<ArbiterInner>,
}

impl Lease {
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn consumer(&self) -> Consumer {
        self.consumer
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Release the lease. Returns true only for the call that actually released it.
    pub fn release(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.active = false;
        self.arbiter.release(self.kind, self.id)
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.release();
    }
}

/// Arbiter for exclusive hardware and compute leases
#[derive(Debug, Clone)]
pub struct ResourceArbiter {
    inner: Arc<ArbiterInner>,
}

impl Default for ResourceArbiter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceArbiter {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ArbiterInner {
                id: NEXT_ARBITER_ID.fetch_add(1, Ordering::Relaxed),
                state: Mutex::new(ArbiterState::default()),
            }),
        }
    }

    /// Grant or revoke the host permission for a resource kind.
    ///
    /// Revoking does not tear down an existing lease; it only affects later acquires.
    pub fn set_permission(&self, kind: ResourceKind, granted: bool) {
        let mut state = self.inner.state.lock();
        if granted {
            state.denied.remove(&kind);
        } else {
            state.denied.insert(kind);
        }
    }

    /// Try to take an exclusive lease. Never waits: contention is reported as
    /// [`EngineError::ResourceBusy`] and retry policy is left to the caller.
    pub fn acquire(&self, kind: ResourceKind, consumer: Consumer) -> Result<Lease, EngineError> {
        let mut state = self.inner.state.lock();

        if state.denied.contains(&kind) {
            warn!(?kind, ?consumer, "resource permission denied");
            return Err(EngineError::PermissionDenied(kind));
        }

        if let Some(held) = state.held.get(&kind) {
            debug!(?kind, ?consumer, holder = ?held.consumer, "resource busy");
            return Err(EngineError::ResourceBusy {
                kind,
                holder: held.consumer,
            });
        }

        state.next_lease_id += 1;
        let lease_id = state.next_lease_id;
        state.held.insert(kind, HeldLease { lease_id, consumer });
        debug!(?kind, ?consumer, lease_id, "lease granted");

        Ok(Lease {
            kind,
            consumer,
            id: lease_id,
            active: true,
            arbiter: Arc::clone(&self.inner),
        })
    }

    /// Release a lease through the arbiter.
    ///
    /// Idempotent for leases this arbiter issued; a lease issued by another
    /// arbiter is a contract violation.
    pub fn release(&self, lease: &mut Lease) -> Result<(), EngineError> {
        if lease.arbiter.id != self.inner.id {
            return Err(EngineError::ForeignLease { kind: lease.kind });
        }
        lease.release();
        Ok(())
    }

    /// Current holder of a resource kind, if any
    pub fn holder(&self, kind: ResourceKind) -> Option<Consumer> {
        self.inner.state.lock().held.get(&kind).map(|h| h.consumer)
    }

    /// Number of active leases across all kinds
    pub fn active_leases(&self) -> usize {
        self.inner.state.lock().held.len()
    }

    /// Get the shared audio context, creating it on first use and resuming it
    /// if a previous holder suspended it. Never creates a second context.
    pub fn acquire_audio_context(&self) -> AudioContextHandle {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        if state.audio.is_none() {
            state.audio_contexts_created += 1;
            debug!(context_id = state.audio_contexts_created, "audio context created");
        }
        let next_id = state.audio_contexts_created as u64;

        let ctx = state.audio.get_or_insert_with(|| AudioContext {
            id: next_id,
            state: AudioContextState::Running,
            resumes: 0,
        });
        if ctx.state == AudioContextState::Suspended {
            ctx.state = AudioContextState::Running;
            ctx.resumes += 1;
            debug!(context_id = ctx.id, "audio context resumed");
        }
        AudioContextHandle {
            context_id: ctx.id,
            resumes: ctx.resumes,
        }
    }

    /// Suspend (not close) the shared audio context so it can be cheaply resumed
    pub fn suspend_audio_context(&self) {
        let mut state = self.inner.state.lock();
        if let Some(ctx) = state.audio.as_mut() {
            if ctx.state == AudioContextState::Running {
                ctx.state = AudioContextState::Suspended;
                debug!(context_id = ctx.id, "audio context suspended");
            }
        }
    }

    pub fn audio_context_state(&self) -> Option<AudioContextState> {
        self.inner.state.lock().audio.as_ref().map(|a| a.state)
    }

    pub fn snapshot(&self) -> ArbiterSnapshot {
        let state = self.inner.state.lock();
        let mut active: Vec<(ResourceKind, Consumer)> = state
            .held
            .iter()
            .map(|(kind, held)| (*kind, held.consumer))
            .collect();
        active.sort_by_key(|(kind, _)| *kind as u8);
        ArbiterSnapshot {
            active,
            audio_context: state.audio.as_ref().map(|a| a.state),
            audio_contexts_created: state.audio_contexts_created,
        }
    }
}
