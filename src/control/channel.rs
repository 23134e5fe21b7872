//! Per-channel temperature control loop.
//!
//! One `ChannelController` exclusively owns one channel's state: measured
//! temperature, setpoint, gains, computed output, mode, and the timestamp of
//! the last accepted temperature sample.  Everything reaches it as bus
//! events scoped to its channel; everything leaves it the same way.  No
//! other component writes this state.
//!
//! The fail-safe watchdog lives here: in automatic mode, if no fresh
//! temperature sample has been accepted for [`SystemConfig::watchdog_timeout_ms`],
//! the published output is overridden to full drive until a sample arrives.
//! Both transitions (into fail-safe, back to normal) broadcast exactly once.

use log::{info, warn};

use crate::bus::{Event, Outbox, Payload, Topic};
use crate::clock::elapsed_ms;
use crate::config::SystemConfig;
use crate::control::pid::PidController;
use crate::scheduler::Cadence;

/// Actuator ceiling, and the value forced while in fail-safe.
pub const OUTPUT_MAX: u8 = 255;

/// `mode` event payload broadcast when control returns to normal.
pub const MODE_AUTOMATIC: i32 = 1;
/// `mode` event payload broadcast on entering fail-safe.
pub const MODE_FAILSAFE: i32 = 2;

/// Where the loop currently stands.  `FailSafe` is internal; hosts can
/// request `Manual`/`Automatic`, never this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    Manual,
    Automatic,
    FailSafe,
}

pub struct ChannelController {
    channel: u8,
    cadence: Cadence,
    pid: PidController,
    /// Gains mirrored outside the PID so a single-gain event can re-apply
    /// all three in one step.
    kp: f32,
    ki: f32,
    kd: f32,
    input_c: f32,
    target_c: f32,
    output: u8,
    automatic: bool,
    /// Latched while the watchdog holds the output at full drive.
    failsafe: bool,
    last_sample_ms: u32,
    watchdog_timeout_ms: u32,
    dt_secs: f32,
}

impl ChannelController {
    pub fn new(channel: u8, config: &SystemConfig) -> Self {
        let pid = PidController::new(
            config.default_kp,
            config.default_ki,
            config.default_kd,
            config.default_target_c,
        );
        Self {
            channel,
            cadence: Cadence::new(config.control_interval_ms),
            pid,
            kp: config.default_kp,
            ki: config.default_ki,
            kd: config.default_kd,
            input_c: 0.0,
            target_c: config.default_target_c,
            output: 0,
            automatic: true,
            failsafe: false,
            last_sample_ms: 0,
            watchdog_timeout_ms: config.watchdog_timeout_ms,
            dt_secs: config.control_interval_ms as f32 / 1000.0,
        }
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn mode(&self) -> ControlMode {
        if !self.automatic {
            ControlMode::Manual
        } else if self.failsafe {
            ControlMode::FailSafe
        } else {
            ControlMode::Automatic
        }
    }

    /// Last computed (not overridden) output value.
    pub fn output(&self) -> u8 {
        self.output
    }

    pub fn target_c(&self) -> f32 {
        self.target_c
    }

    /// Bus intake.  Events scoped to other channels are ignored here;
    /// global events carry nothing this controller consumes.
    pub fn on_event(&mut self, event: &Event, now_ms: u32) {
        if !event.is_for(self.channel) {
            return;
        }

        match event.topic {
            Topic::Temp => {
                if let Some(v) = event.payload.as_f32() {
                    self.input_c = v;
                    self.last_sample_ms = now_ms;
                }
            }
            Topic::Target => {
                if let Some(v) = event.payload.as_f32() {
                    self.target_c = v;
                    self.pid.set_target(v);
                }
            }
            Topic::Kp => {
                if let Some(v) = event.payload.as_f32() {
                    self.kp = v;
                    self.apply_gains();
                }
            }
            Topic::Ki => {
                if let Some(v) = event.payload.as_f32() {
                    self.ki = v;
                    self.apply_gains();
                }
            }
            Topic::Kd => {
                if let Some(v) = event.payload.as_f32() {
                    self.kd = v;
                    self.apply_gains();
                }
            }
            Topic::Mode => {
                if let Some(v) = event.payload.as_i32() {
                    self.set_automatic(v != 0, now_ms);
                }
            }
            _ => {}
        }
    }

    /// Outer-loop poll; runs one control step when the cadence fires.
    pub fn poll(&mut self, now_ms: u32, out: &mut Outbox<'_>) {
        if self.cadence.tick(now_ms).is_some() {
            self.update(now_ms, out);
        }
    }

    fn update(&mut self, now_ms: u32, out: &mut Outbox<'_>) {
        if !self.automatic {
            return;
        }

        // The PID keeps integrating even on stale input; only the published
        // value is overridden below.
        let computed = self.pid.compute(self.input_c, self.dt_secs);
        self.output = computed as u8;

        let stale = elapsed_ms(self.last_sample_ms, now_ms) > self.watchdog_timeout_ms;
        if stale {
            out.publish(Event::scoped(
                Topic::Output,
                self.channel,
                Payload::Int(i32::from(OUTPUT_MAX)),
            ));
            if !self.failsafe {
                self.failsafe = true;
                warn!(
                    "channel {}: no temperature for {} ms, forcing full output",
                    self.channel, self.watchdog_timeout_ms
                );
                out.publish(Event::scoped(Topic::Alarm, self.channel, Payload::Int(1)));
                out.publish(Event::scoped(
                    Topic::Mode,
                    self.channel,
                    Payload::Int(MODE_FAILSAFE),
                ));
            }
        } else {
            out.publish(Event::scoped(
                Topic::Output,
                self.channel,
                Payload::Int(i32::from(self.output)),
            ));
            if self.failsafe {
                self.failsafe = false;
                info!("channel {}: temperature restored, resuming control", self.channel);
                out.publish(Event::scoped(Topic::Alarm, self.channel, Payload::Int(0)));
                out.publish(Event::scoped(
                    Topic::Mode,
                    self.channel,
                    Payload::Int(MODE_AUTOMATIC),
                ));
            }
        }
    }

    fn apply_gains(&mut self) {
        self.pid.set_gains(self.kp, self.ki, self.kd);
    }

    /// Mode switch.  Only the manual→automatic edge touches the watchdog:
    /// a stale last-seen stamp is moved up to `now_ms` so the switch itself
    /// cannot trip fail-safe, while a fresh stamp is left alone.  Re-
    /// asserting automatic (including hearing our own fail-safe broadcast,
    /// payload 2) changes nothing.
    fn set_automatic(&mut self, automatic: bool, now_ms: u32) {
        if automatic && !self.automatic {
            if elapsed_ms(self.last_sample_ms, now_ms) > self.watchdog_timeout_ms {
                self.last_sample_ms = now_ms;
            }
            info!("channel {}: automatic control enabled", self.channel);
        } else if !automatic && self.automatic {
            info!("channel {}: manual control", self.channel);
        }
        self.automatic = automatic;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heapless::Deque;

    use crate::bus::PENDING_CAP;

    fn controller() -> ChannelController {
        ChannelController::new(1, &SystemConfig::default())
    }

    fn temp(ch: u8, v: f32) -> Event {
        Event::scoped(Topic::Temp, ch, Payload::Float(v))
    }

    /// Poll once and collect what the controller published.
    fn poll_events(c: &mut ChannelController, now_ms: u32) -> Vec<Event> {
        let mut queue: Deque<Event, PENDING_CAP> = Deque::new();
        let mut overflowed = false;
        c.poll(now_ms, &mut Outbox::new(&mut queue, &mut overflowed));
        assert!(!overflowed);
        let mut events = Vec::new();
        while let Some(e) = queue.pop_front() {
            events.push(e);
        }
        events
    }

    fn topics(events: &[Event]) -> Vec<Topic> {
        events.iter().map(|e| e.topic).collect()
    }

    #[test]
    fn publishes_output_every_automatic_update() {
        let mut c = controller();
        c.on_event(&temp(1, 25.0), 0);

        let events = poll_events(&mut c, 1_000);
        assert_eq!(topics(&events), vec![Topic::Output]);
        assert_eq!(events[0].channel, Some(1));
    }

    #[test]
    fn ignores_other_channels() {
        let mut c = controller();
        c.on_event(&temp(2, 90.0), 0);
        assert_eq!(c.mode(), ControlMode::Automatic);
        // Input was never accepted, so the setpoint error is against 0 °C.
        c.on_event(&Event::scoped(Topic::Mode, 2, Payload::Int(0)), 0);
        assert_eq!(c.mode(), ControlMode::Automatic);
    }

    #[test]
    fn manual_mode_publishes_nothing() {
        let mut c = controller();
        c.on_event(&temp(1, 25.0), 0);
        c.on_event(&Event::scoped(Topic::Mode, 1, Payload::Int(0)), 0);
        assert_eq!(c.mode(), ControlMode::Manual);

        assert!(poll_events(&mut c, 1_000).is_empty());
    }

    #[test]
    fn target_event_moves_the_setpoint() {
        let mut c = controller();
        c.on_event(&Event::scoped(Topic::Target, 1, Payload::Float(25.0)), 0);
        assert_eq!(c.target_c(), 25.0);
        // Link B publishes integers; they are accepted the same way.
        c.on_event(&Event::scoped(Topic::Target, 1, Payload::Int(30)), 0);
        assert_eq!(c.target_c(), 30.0);
    }

    #[test]
    fn watchdog_trips_once_and_recovers_once() {
        let mut c = controller();
        c.on_event(&temp(1, 25.0), 0);

        // Fresh enough at 30 s, stale just past it.
        let events = poll_events(&mut c, 30_000);
        assert_eq!(topics(&events), vec![Topic::Output]);

        let events = poll_events(&mut c, 31_000);
        assert_eq!(
            topics(&events),
            vec![Topic::Output, Topic::Alarm, Topic::Mode]
        );
        assert_eq!(events[0].payload, Payload::Int(255));
        assert_eq!(events[1].payload, Payload::Int(1));
        assert_eq!(events[2].payload, Payload::Int(MODE_FAILSAFE));
        assert_eq!(c.mode(), ControlMode::FailSafe);

        // Still stale: forced output continues, transition does not repeat.
        let events = poll_events(&mut c, 32_000);
        assert_eq!(topics(&events), vec![Topic::Output]);
        assert_eq!(events[0].payload, Payload::Int(255));

        // A fresh sample clears it, exactly once.
        c.on_event(&temp(1, 26.0), 32_500);
        let events = poll_events(&mut c, 33_000);
        assert_eq!(
            topics(&events),
            vec![Topic::Output, Topic::Alarm, Topic::Mode]
        );
        assert_eq!(events[1].payload, Payload::Int(0));
        assert_eq!(events[2].payload, Payload::Int(MODE_AUTOMATIC));
        assert_eq!(c.mode(), ControlMode::Automatic);

        let events = poll_events(&mut c, 34_000);
        assert_eq!(topics(&events), vec![Topic::Output]);
    }

    #[test]
    fn own_failsafe_broadcast_does_not_rearm_the_watchdog() {
        let mut c = controller();
        c.on_event(&temp(1, 25.0), 0);

        let events = poll_events(&mut c, 31_000);
        assert_eq!(events.len(), 3);

        // The engine loops our own mode=2 broadcast back to us.
        c.on_event(&Event::scoped(Topic::Mode, 1, Payload::Int(MODE_FAILSAFE)), 31_000);

        // Were the stamp refreshed, this poll would publish a recovery.
        let events = poll_events(&mut c, 32_000);
        assert_eq!(topics(&events), vec![Topic::Output]);
        assert_eq!(c.mode(), ControlMode::FailSafe);
    }

    #[test]
    fn automatic_switch_with_stale_stamp_gets_a_grace_period() {
        let mut c = controller();
        c.on_event(&temp(1, 25.0), 0);
        c.on_event(&Event::scoped(Topic::Mode, 1, Payload::Int(0)), 1_000);

        // Parked in manual far beyond the timeout, then re-enabled.
        c.on_event(&Event::scoped(Topic::Mode, 1, Payload::Int(1)), 120_000);
        let events = poll_events(&mut c, 121_000);

        // Stamp was moved up on the edge, so no instant fail-safe.
        assert_eq!(topics(&events), vec![Topic::Output]);
        assert_eq!(c.mode(), ControlMode::Automatic);
    }

    #[test]
    fn automatic_switch_with_fresh_stamp_keeps_it() {
        let mut c = controller();
        c.on_event(&temp(1, 25.0), 0);
        c.on_event(&Event::scoped(Topic::Mode, 1, Payload::Int(0)), 100);
        c.on_event(&Event::scoped(Topic::Mode, 1, Payload::Int(1)), 5_000);

        // Stamp stayed at 0, so 31 s later the watchdog fires on schedule.
        let events = poll_events(&mut c, 31_000);
        assert_eq!(
            topics(&events),
            vec![Topic::Output, Topic::Alarm, Topic::Mode]
        );
    }

    #[test]
    fn gain_events_retune_without_losing_the_integral() {
        let mut c = controller();
        let mut witness = controller();
        c.on_event(&temp(1, 25.0), 0);
        witness.on_event(&temp(1, 25.0), 0);

        for t in 1..=5u32 {
            poll_events(&mut c, t * 1_000);
            poll_events(&mut witness, t * 1_000);
        }

        // Re-assert the default kp; outputs must stay identical.
        c.on_event(
            &Event::scoped(Topic::Kp, 1, Payload::Float(SystemConfig::default().default_kp)),
            5_500,
        );
        let a = poll_events(&mut c, 6_000);
        let b = poll_events(&mut witness, 6_000);
        assert_eq!(a, b);
    }
}
