//! GPIO / peripheral pin assignments for the FanBank main board.
//!
//! Single source of truth; every driver references this module rather than
//! hard-coding pin numbers.  Change a pin here and it propagates everywhere.
//!
//! Indexed arrays follow the 1-based channel convention used on the bus:
//! `FAN_PWM_GPIO[0]` is channel 1.

use crate::config::MAX_CHANNELS;

// ---------------------------------------------------------------------------
// Fan outputs (4-pin PWM fans, 25 kHz control line)
// ---------------------------------------------------------------------------

/// LEDC PWM output per channel.
pub const FAN_PWM_GPIO: [i32; MAX_CHANNELS] = [1, 2, 3, 4];
/// Tachometer sense input per channel (open-collector, pulled up).
pub const FAN_TACH_GPIO: [i32; MAX_CHANNELS] = [5, 6, 7, 8];

// ---------------------------------------------------------------------------
// Temperature sensing
// ---------------------------------------------------------------------------

/// DS18B20 one-wire bus; all channel probes share this line.
pub const ONEWIRE_GPIO: i32 = 9;

// ---------------------------------------------------------------------------
// Host links
// ---------------------------------------------------------------------------

/// UART1 carries the synchronous command link to the bridge host.
pub const LINK_A_UART: i32 = 1;
pub const LINK_A_TX_GPIO: i32 = 17;
pub const LINK_A_RX_GPIO: i32 = 18;

/// UART2 carries the framed link to the display head.
pub const LINK_B_UART: i32 = 2;
pub const LINK_B_TX_GPIO: i32 = 15;
pub const LINK_B_RX_GPIO: i32 = 16;

// ---------------------------------------------------------------------------
// Status LED
// ---------------------------------------------------------------------------

/// Alarm indicator (active HIGH).
pub const ALARM_LED_GPIO: i32 = 13;

// ---------------------------------------------------------------------------
// PWM configuration
// ---------------------------------------------------------------------------

/// LEDC timer resolution (bits).  8-bit gives 0..=255 duty levels,
/// matching the actuator range on the bus.
pub const PWM_RESOLUTION_BITS: u32 = 8;
/// Intel 4-wire fan specification control frequency.
pub const FAN_PWM_FREQ_HZ: u32 = 25_000;
