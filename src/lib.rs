//! Party Session Library
//!
//! Coordinates a multi-round competitive session: phase state machine,
//! per-round victory detection, respawn scheduling and leader tracking, all
//! wired together through a single-threaded event bus.

pub mod config;
pub mod events;
pub mod game;
pub mod session;
pub mod util;

#[cfg(test)]
mod testing;
