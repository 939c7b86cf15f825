//! Background tick driver
//!
//! Runs the engine on its own thread: sensor adapters are polled at the sensor
//! cadence and the aggregator ticks at the evaluation cadence, both measured on
//! a monotonic clock. The loop exits when its [`CancellationToken`] is
//! cancelled.

use crate::engine::CognitiveLoadEngine;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Owns the background thread driving one engine
pub struct TickDriver {
    token: CancellationToken,
    worker_thread: Option<thread::JoinHandle<()>>,
}

impl TickDriver {
    /// Start driving `engine`. Intervals come from the engine's configuration.
    ///
    /// Engine callbacks run on the driver thread with the engine locked.
    pub fn spawn(engine: Arc<Mutex<CognitiveLoadEngine>>) -> Self {
        let token = CancellationToken::new();
        let loop_token = token.clone();

        let worker_thread = thread::spawn(move || {
            Self::run(engine, loop_token);
        });

        Self {
            token,
            worker_thread: Some(worker_thread),
        }
    }

    fn run(engine: Arc<Mutex<CognitiveLoadEngine>>, token: CancellationToken) {
        let (poll_ms, tick_ms) = {
            let engine = engine.lock();
            (
                engine.config().sensor_poll_interval_ms.max(1),
                engine.config().tick_interval_ms.max(1),
            )
        };
        info!(poll_ms, tick_ms, "tick driver running");

        let epoch = Instant::now();
        let mut next_tick = tick_ms;

        while !token.is_cancelled() {
            thread::sleep(Duration::from_millis(poll_ms));
            if token.is_cancelled() {
                break;
            }

            let now_ms = epoch.elapsed().as_millis() as u64;
            let mut engine = engine.lock();
            engine.poll_sensors(now_ms);
            if now_ms >= next_tick {
                engine.tick(now_ms);
                // Skip missed ticks instead of bursting to catch up
                while next_tick <= now_ms {
                    next_tick += tick_ms;
                }
            }
        }
        debug!("tick driver exited");
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_running(&self) -> bool {
        self.worker_thread.is_some() && !self.token.is_cancelled()
    }

    /// Cancel the loop and wait for the thread. Idempotent.
    pub fn stop(&mut self) {
        self.token.cancel();
        if let Some(handle) = self.worker_thread.take() {
            if handle.join().is_err() {
                tracing::warn!("tick driver thread panicked");
            }
        }
    }
}

impl Drop for TickDriver {
    fn drop(&mut self) {
        self.stop();
    }
}
