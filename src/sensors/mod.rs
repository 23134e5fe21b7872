//! Sensor-side publishers.
//!
//! Temperature acquisition lives outside the core (the one-wire driver
//! publishes `temp` events on its own); what lives here is the tachometer
//! monitor, which turns ISR pulse counts into `speed` readings and stall
//! alarms.

pub mod tach;
