//! FanBank firmware library.
//!
//! Exposes the pure-logic modules for integration testing and external
//! inspection. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod bus;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod pins;
pub mod scheduler;

pub mod control;
pub mod link;
pub mod sensors;

// Hardware-adjacent modules; the ESP-IDF halves are guarded by cfg
// attributes inside.
pub mod adapters;
pub mod drivers;
