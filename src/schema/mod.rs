//! Recorded session schema
//!
//! Hosts can capture raw input (pointer, keyboard, focus, face observations,
//! audio windows, transcript segments) as newline-delimited JSON and replay it
//! through a fresh engine for offline analysis and regression tests.

mod event;
mod replay;

pub use event::*;
pub use replay::*;
