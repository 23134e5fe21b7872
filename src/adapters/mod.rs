//! Adapters bridging the event bus to the world outside the engine.
//!
//! Hardware-facing sinks (PWM drive, alarm LED) live under
//! [`crate::drivers`]; this module holds the ones with no hardware
//! behind them.

pub mod log_sink;
