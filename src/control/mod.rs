//! Closed-loop control: the PID algorithm and the per-channel controller
//! that owns it.

pub mod channel;
pub mod pid;
