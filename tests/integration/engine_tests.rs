//! Integration tests for the engine: channels, fan monitors, and the tap
//! wired through the event bus.
//!
//! These run on the host (x86_64) against in-memory serial ports.  Time
//! is advanced by hand, so every cadence fire is deterministic.

use fanbank::bus::{Event, Payload, Topic};
use fanbank::config::SystemConfig;
use fanbank::control::channel::ControlMode;
use fanbank::engine::Engine;
use fanbank::sensors::tach;

use crate::mock_io::{MockSerial, RecordingSink};

fn make_engine(
    channels: u8,
) -> (
    Engine<MockSerial, MockSerial, RecordingSink>,
    MockSerial,
    MockSerial,
    RecordingSink,
) {
    let config = SystemConfig {
        channels,
        ..SystemConfig::default()
    };
    config.validate().unwrap();

    let port_a = MockSerial::new();
    let port_b = MockSerial::new();
    let sink = RecordingSink::new();
    let engine = Engine::new(&config, port_a.clone(), port_b.clone(), sink.clone());
    (engine, port_a, port_b, sink)
}

fn temp(channel: u8, celsius: f32) -> Event {
    Event::scoped(Topic::Temp, channel, Payload::Float(celsius))
}

// ── Wiring ────────────────────────────────────────────────────

#[test]
fn every_component_and_the_tap_get_a_bus_slot() {
    let (engine, _a, _b, _sink) = make_engine(3);
    // Three channels, two links, one tap.
    assert_eq!(engine.subscriber_count(), 6);
}

// ── Control flow through the bus ──────────────────────────────

#[test]
fn temperature_feed_drives_one_output_event_per_control_tick() {
    let (mut engine, _a, _b, sink) = make_engine(2);

    engine.inject(temp(1, 30.0));
    engine.tick(1_000);

    let outputs = sink.for_channel(Topic::Output, 1);
    assert_eq!(outputs.len(), 1, "one control fire, one output event");
    let Payload::Int(duty) = outputs[0].payload else {
        panic!("output payload must be an integer duty");
    };
    assert!((0..=255).contains(&duty));

    // The idle sibling channel also computed from its own state.
    assert_eq!(sink.for_channel(Topic::Output, 2).len(), 1);
}

#[test]
fn injected_target_lands_in_the_controller() {
    let (mut engine, _a, _b, _sink) = make_engine(2);

    engine.inject(Event::scoped(Topic::Target, 2, Payload::Float(55.0)));

    assert_eq!(engine.controller(2).unwrap().target_c(), 55.0);
    // Channel 1 keeps the boot default.
    assert_eq!(engine.controller(1).unwrap().target_c(), 40.0);
}

// ── Fail-safe watchdog, end to end ────────────────────────────

#[test]
fn silent_sensor_feed_forces_full_output_then_one_recovery() {
    let (mut engine, _a, _b, sink) = make_engine(2);

    // First control fire: the feed is not yet stale.
    engine.tick(1_000);
    assert!(sink.for_channel(Topic::Alarm, 1).is_empty());
    sink.clear();

    // Past the 30 s watchdog with no temperature at all.  The silent
    // tach windows land their stall alarms in the same tick; channels
    // are polled first, so index 0 is always the controller's.
    engine.tick(31_000);
    for ch in 1..=2 {
        let outputs = sink.for_channel(Topic::Output, ch);
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].payload, Payload::Int(255), "full drive override");
        assert_eq!(
            sink.for_channel(Topic::Alarm, ch)[0].payload,
            Payload::Int(1)
        );
        assert_eq!(
            sink.for_channel(Topic::Mode, ch)[0].payload,
            Payload::Int(2)
        );
        assert_eq!(
            engine.controller(ch).unwrap().mode(),
            ControlMode::FailSafe
        );
    }
    sink.clear();

    // One channel's feed returns; only that channel recovers, and the
    // still-silent sibling does not re-broadcast its transition.
    engine.inject(temp(1, 36.0));
    engine.tick(32_000);

    assert_eq!(sink.for_channel(Topic::Alarm, 1)[0].payload, Payload::Int(0));
    assert_eq!(sink.for_channel(Topic::Mode, 1)[0].payload, Payload::Int(1));
    assert_eq!(engine.controller(1).unwrap().mode(), ControlMode::Automatic);

    assert!(sink.for_channel(Topic::Alarm, 2).is_empty());
    assert!(sink.for_channel(Topic::Mode, 2).is_empty());
    assert_eq!(engine.controller(2).unwrap().mode(), ControlMode::FailSafe);
    assert_eq!(
        sink.for_channel(Topic::Output, 2)[0].payload,
        Payload::Int(255)
    );
}

// ── Tachometer windows ────────────────────────────────────────

#[test]
fn tach_pulses_become_speed_reports_and_stall_alarms() {
    // Channels 3 and 4 are used by this test only; the counters are
    // process-global, so sibling tests stay off them.
    let (mut engine, _a, _b, sink) = make_engine(4);

    for _ in 0..60 {
        tach::record_pulse(3);
    }
    engine.tick(2_000);

    // 60 pulses / 2 per rev over a 2 s window: 900 RPM.
    assert_eq!(
        sink.for_channel(Topic::Speed, 3)[0].payload,
        Payload::Int(900)
    );
    assert_eq!(sink.for_channel(Topic::Alarm, 3)[0].payload, Payload::Int(0));

    // A fan that never pulsed reads as stalled.
    assert_eq!(sink.for_channel(Topic::Speed, 4)[0].payload, Payload::Int(0));
    assert_eq!(sink.for_channel(Topic::Alarm, 4)[0].payload, Payload::Int(1));
}
