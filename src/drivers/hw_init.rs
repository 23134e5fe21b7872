//! One-shot hardware peripheral initialization.
//!
//! Configures tach GPIO inputs, the fan LEDC timer/channels, and the GPIO
//! ISR service using raw ESP-IDF sys calls.  Called once from `main()`
//! before the engine loop starts.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::info;

use crate::pins;

/// Errors during one-shot peripheral initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwInitError {
    GpioConfigFailed(i32),
    LedcInitFailed,
    IsrInstallFailed(i32),
    UartInitFailed(i32),
}

impl core::fmt::Display for HwInitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::GpioConfigFailed(rc) => write!(f, "GPIO config failed (rc={rc})"),
            Self::LedcInitFailed => write!(f, "LEDC timer/channel config failed"),
            Self::IsrInstallFailed(rc) => write!(f, "GPIO ISR service install failed (rc={rc})"),
            Self::UartInitFailed(rc) => write!(f, "UART driver install failed (rc={rc})"),
        }
    }
}

impl std::error::Error for HwInitError {}

#[cfg(target_os = "espidf")]
pub fn init_peripherals(channels: u8) -> Result<(), HwInitError> {
    // SAFETY: Called once from main() before the engine loop; single-threaded.
    unsafe {
        init_tach_inputs(channels)?;
        init_alarm_led()?;
        init_ledc(channels)?;
    }
    info!("hw_init: peripherals configured for {channels} channel(s)");
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_peripherals(channels: u8) -> Result<(), HwInitError> {
    log::info!("hw_init(sim): peripheral init skipped ({channels} channel(s))");
    Ok(())
}

// ── Tach inputs ───────────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe fn init_tach_inputs(channels: u8) -> Result<(), HwInitError> {
    for &pin in pins::FAN_TACH_GPIO.iter().take(usize::from(channels)) {
        let cfg = gpio_config_t {
            pin_bit_mask: 1u64 << pin,
            mode: gpio_mode_t_GPIO_MODE_INPUT,
            pull_up_en: gpio_pullup_t_GPIO_PULLUP_ENABLE,
            pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
            intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
        };
        let ret = unsafe { gpio_config(&cfg) };
        if ret != ESP_OK as i32 {
            return Err(HwInitError::GpioConfigFailed(ret));
        }
    }
    info!("hw_init: tach inputs configured");
    Ok(())
}

// ── Alarm LED ─────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe fn init_alarm_led() -> Result<(), HwInitError> {
    let cfg = gpio_config_t {
        pin_bit_mask: 1u64 << pins::ALARM_LED_GPIO,
        mode: gpio_mode_t_GPIO_MODE_OUTPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
    };
    let ret = unsafe { gpio_config(&cfg) };
    if ret != ESP_OK as i32 {
        return Err(HwInitError::GpioConfigFailed(ret));
    }
    unsafe { gpio_set_level(pins::ALARM_LED_GPIO, 0) };
    Ok(())
}

#[cfg(target_os = "espidf")]
pub fn gpio_write(pin: i32, high: bool) {
    // SAFETY: writes an output pin configured during init_peripherals();
    // main-loop only.
    unsafe {
        gpio_set_level(pin, if high { 1 } else { 0 });
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn gpio_write(_pin: i32, _high: bool) {}

// ── LEDC PWM ─────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe fn init_ledc(channels: u8) -> Result<(), HwInitError> {
    // Timer 0: fan control line, 25 kHz, 8-bit.
    // SAFETY: Called from the single main task via init_peripherals().
    let timer0 = ledc_timer_config_t {
        speed_mode: ledc_mode_t_LEDC_LOW_SPEED_MODE,
        timer_num: ledc_timer_t_LEDC_TIMER_0,
        duty_resolution: ledc_timer_bit_t_LEDC_TIMER_8_BIT,
        freq_hz: pins::FAN_PWM_FREQ_HZ,
        clk_cfg: soc_periph_ledc_clk_src_legacy_t_LEDC_AUTO_CLK,
        ..Default::default()
    };
    let ret = unsafe { ledc_timer_config(&timer0) };
    if ret != ESP_OK as i32 {
        return Err(HwInitError::LedcInitFailed);
    }

    // One LEDC channel per fan, all on timer 0, parked at zero duty.
    for (i, &gpio) in pins::FAN_PWM_GPIO
        .iter()
        .take(usize::from(channels))
        .enumerate()
    {
        let ret = unsafe {
            ledc_channel_config(&ledc_channel_config_t {
                speed_mode: ledc_mode_t_LEDC_LOW_SPEED_MODE,
                channel: ledc_channel_t_LEDC_CHANNEL_0 + i as u32,
                timer_sel: ledc_timer_t_LEDC_TIMER_0,
                gpio_num: gpio,
                duty: 0,
                hpoint: 0,
                ..Default::default()
            })
        };
        if ret != ESP_OK as i32 {
            return Err(HwInitError::LedcInitFailed);
        }
    }

    info!("hw_init: LEDC configured (fan CH0..CH{})", channels - 1);
    Ok(())
}

/// Set one fan's duty register.  `channel` is 0-based LEDC numbering.
#[cfg(target_os = "espidf")]
pub fn ledc_set(channel: u32, duty: u8) {
    // SAFETY: LEDC channels were configured in init_ledc(); only the main
    // loop writes duty registers.
    unsafe {
        ledc_set_duty(ledc_mode_t_LEDC_LOW_SPEED_MODE, channel, u32::from(duty));
        ledc_update_duty(ledc_mode_t_LEDC_LOW_SPEED_MODE, channel);
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn ledc_set(_channel: u32, _duty: u8) {}

// ── GPIO ISR service ──────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe extern "C" fn tach_gpio_isr(arg: *mut core::ffi::c_void) {
    // The 1-based channel number rides the registration argument.
    let channel = arg as usize as u8;
    crate::sensors::tach::record_pulse(channel);
}

/// Install the GPIO ISR service and hook every wired tach line to the
/// pulse counters.  Call after `init_peripherals()` and before the loop.
#[cfg(target_os = "espidf")]
pub fn init_isr_service(channels: u8) -> Result<(), HwInitError> {
    // SAFETY: gpio_install_isr_service is idempotent; ESP_ERR_INVALID_STATE
    // means it was already installed.  The handler only touches an atomic.
    unsafe {
        let ret = gpio_install_isr_service(0);
        if ret != ESP_OK && ret != ESP_ERR_INVALID_STATE {
            return Err(HwInitError::IsrInstallFailed(ret));
        }

        for (i, &pin) in pins::FAN_TACH_GPIO
            .iter()
            .take(usize::from(channels))
            .enumerate()
        {
            gpio_set_intr_type(pin, gpio_int_type_t_GPIO_INTR_NEGEDGE);
            gpio_isr_handler_add(pin, Some(tach_gpio_isr), (i + 1) as *mut core::ffi::c_void);
            gpio_intr_enable(pin);
        }

        info!("hw_init: ISR service installed ({channels} tach line(s))");
    }
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_isr_service(_channels: u8) -> Result<(), HwInitError> {
    log::info!("hw_init(sim): ISR service skipped");
    Ok(())
}
