//! Actuator drivers, hardware initialisation, and peripheral helpers.

pub mod alarm_led;
pub mod hw_init;
pub mod pwm;
pub mod uart;
pub mod watchdog;
