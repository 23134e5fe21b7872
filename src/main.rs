//! FanBank Firmware, Main Entry Point
//!
//! Event-bus architecture with cooperative scheduling.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                         Engine loop                            │
//! │                                                                │
//! │  ChannelController ×N        FanMonitor ×N                     │
//! │  (PID + fail-safe)           (tach windows)                    │
//! │        │ publish                  │ publish                    │
//! │  ┌─────┴──────────────────────────┴───────┐                    │
//! │  │               Event bus                │──▶ tap: log sink,  │
//! │  └─────┬──────────────────────────┬───────┘    PWM, alarm LED  │
//! │        │ deliver                  │ deliver                    │
//! │  CommandLink (UART1)        FramedLink (UART2)                 │
//! │  bridge host                display head                       │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

// ── Module declarations ───────────────────────────────────────
mod adapters;
mod bus;
mod clock;
mod config;
mod control;
mod drivers;
mod engine;
mod error;
mod link;
mod pins;
mod scheduler;
mod sensors;

// ── Imports ───────────────────────────────────────────────────
use anyhow::Result;
use log::info;

#[cfg(not(target_os = "espidf"))]
use bus::{Event, Payload, Tee, Topic};
#[cfg(target_os = "espidf")]
use bus::Tee;
use adapters::log_sink::LogEventSink;
use clock::Monotonic;
use config::SystemConfig;
use drivers::alarm_led::AlarmLed;
use drivers::pwm::FanPwm;
use drivers::uart::UartPort;
use drivers::watchdog::Watchdog;
use engine::Engine;

/// TWDT period for the engine task.  Must comfortably outlast a link's
/// bounded 4 s read stall.
const TWDT_TIMEOUT_MS: u32 = 10_000;

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    #[cfg(target_os = "espidf")]
    {
        esp_idf_svc::sys::link_patches();
        esp_idf_logger::init()?;
    }

    info!("╔══════════════════════════════════════╗");
    info!("║  FanBank v{}                      ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Configuration ──────────────────────────────────────
    // Volatile by design: defaults every boot, hosts re-push their
    // settings over the links.
    let config = SystemConfig::default();
    if let Err(e) = config.validate() {
        log::error!("config rejected: {e}, halting");
        #[allow(clippy::empty_loop)]
        loop {}
    }

    // ── 3. Initialise hardware peripherals ────────────────────
    if let Err(e) = drivers::hw_init::init_peripherals(config.channels) {
        // Peripheral init failure is critical: log and halt.  In
        // production the watchdog resets the board after timeout.
        log::error!("HAL init failed: {e}, halting");
        #[allow(clippy::empty_loop)]
        loop {}
    }
    if let Err(e) = drivers::hw_init::init_isr_service(config.channels) {
        log::error!("ISR service init failed: {e}, tach counters stay at zero");
    }
    let watchdog = Watchdog::new(TWDT_TIMEOUT_MS);

    // ── 4. Host link ports ────────────────────────────────────
    let port_a = UartPort::new(
        pins::LINK_A_UART,
        config.baud,
        pins::LINK_A_TX_GPIO,
        pins::LINK_A_RX_GPIO,
    )?;
    let port_b = UartPort::new(
        pins::LINK_B_UART,
        config.baud,
        pins::LINK_B_TX_GPIO,
        pins::LINK_B_RX_GPIO,
    )?;

    // ── 5. Engine ─────────────────────────────────────────────
    let tap = Tee(LogEventSink::new(), Tee(FanPwm::new(), AlarmLed::new()));
    let mut engine = Engine::new(&config, port_a, port_b, tap);
    let clock = Monotonic::new();

    // Temperature samples arrive through `Engine::inject`; the sensor
    // bus master is a separate component on the one-wire line.  A
    // channel that stops hearing samples rides the fail-safe override
    // until they return.
    info!("System ready. Entering engine loop.");

    #[cfg(not(target_os = "espidf"))]
    let mut sim_last_temp_ms: u32 = 0;

    // ── 6. Engine loop ────────────────────────────────────────
    loop {
        engine.tick(clock.now_ms());
        watchdog.feed();

        // Pace the loop at one RTOS tick; the 10 ms framed-link cadence
        // is the fastest consumer.
        #[cfg(target_os = "espidf")]
        // SAFETY: plain task yield from the engine task.
        unsafe {
            esp_idf_svc::sys::vTaskDelay(1);
        }

        #[cfg(not(target_os = "espidf"))]
        {
            // Host simulation: steady synthetic temperatures stand in for
            // the sensor feed so the loop can be watched end to end.
            let now = clock.now_ms();
            if clock::elapsed_ms(sim_last_temp_ms, now) >= 1_000 {
                sim_last_temp_ms = now;
                for ch in 1..=config.channels {
                    engine.inject(Event::scoped(Topic::Temp, ch, Payload::Float(35.0)));
                }
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
    }
}
