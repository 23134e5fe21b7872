//! Monotonic millisecond clock.
//!
//! The controller keeps time as a `u32` millisecond counter that wraps at
//! `u32::MAX` (about 49.7 days of uptime).  Nothing in the firmware may
//! subtract two raw samples directly: [`elapsed_ms`] is the one place that
//! knows how to cross the wrap boundary, and it tolerates exactly one
//! wraparound between samples.
//!
//! On hardware the counter comes from the ESP high-resolution timer; on the
//! host it is derived from `std::time::Instant` so the same loop code runs
//! under test.

/// Milliseconds elapsed from `start` to `now`, tolerating one wraparound.
pub fn elapsed_ms(start: u32, now: u32) -> u32 {
    now.wrapping_sub(start)
}

/// Millisecond uptime source.
///
/// Construct once in `main` and sample once per outer loop iteration; every
/// component receives the same `now_ms` for the tick.
pub struct Monotonic {
    #[cfg(not(target_os = "espidf"))]
    epoch: std::time::Instant,
}

impl Monotonic {
    pub fn new() -> Self {
        #[cfg(target_os = "espidf")]
        {
            Self {}
        }

        #[cfg(not(target_os = "espidf"))]
        {
            Self {
                epoch: std::time::Instant::now(),
            }
        }
    }

    /// Current uptime in milliseconds, wrapping at `u32::MAX`.
    pub fn now_ms(&self) -> u32 {
        #[cfg(target_os = "espidf")]
        {
            // esp_timer counts microseconds since boot as i64.
            let us = unsafe { esp_idf_svc::sys::esp_timer_get_time() };
            (us / 1000) as u32
        }

        #[cfg(not(target_os = "espidf"))]
        {
            (self.epoch.elapsed().as_millis() & u128::from(u32::MAX)) as u32
        }
    }
}

impl Default for Monotonic {
    fn default() -> Self {
        Self::new()
    }
}
