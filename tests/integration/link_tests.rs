//! Integration tests for both host links, driven through the engine so
//! the full path is exercised: scripted port bytes in, bus events out,
//! controller state updated, replies written back.

use fanbank::bus::{Event, Payload, Topic};
use fanbank::config::SystemConfig;
use fanbank::control::channel::ControlMode;
use fanbank::engine::Engine;
use fanbank::link::{command, framed};

use crate::mock_io::{MockSerial, RecordingSink};

fn make_engine() -> (
    Engine<MockSerial, MockSerial, RecordingSink>,
    MockSerial,
    MockSerial,
    RecordingSink,
) {
    let config = SystemConfig::default();
    let port_a = MockSerial::new();
    let port_b = MockSerial::new();
    let sink = RecordingSink::new();
    let engine = Engine::new(&config, port_a.clone(), port_b.clone(), sink.clone());
    (engine, port_a, port_b, sink)
}

/// Advance time in 10 ms steps so the framed link drains one byte per fire.
fn pump_framed(
    engine: &mut Engine<MockSerial, MockSerial, RecordingSink>,
    now_ms: &mut u32,
    bytes: usize,
) {
    for _ in 0..bytes {
        *now_ms += 10;
        engine.tick(*now_ms);
    }
}

// ── Command link (Link A) ─────────────────────────────────────

#[test]
fn hello_set_target_acks_every_step_and_retunes_the_channel() {
    let (mut engine, port_a, _b, sink) = make_engine();

    // 2500 little-endian: a 25.00 °C setpoint at the ×100 wire scale.
    port_a.feed(&[command::HELLO, command::SET_TARGET, 1, 0xC4, 0x09]);
    engine.tick(100);

    assert_eq!(
        port_a.written(),
        vec![command::ACK, command::RCVD, command::RCVD, command::RCVD]
    );
    assert_eq!(engine.controller(1).unwrap().target_c(), 25.0);
    assert_eq!(
        sink.for_channel(Topic::Target, 1)[0].payload,
        Payload::Float(25.0)
    );
}

#[test]
fn unknown_command_resets_the_port_then_a_fresh_hello_works() {
    let (mut engine, port_a, _b, sink) = make_engine();

    port_a.feed(&[command::HELLO, 0x99]);
    engine.tick(100);
    assert_eq!(port_a.written(), vec![command::ACK, command::ERROR]);
    assert_eq!(port_a.resets(), 1);

    // The link must be ready for the next transaction immediately.
    port_a.take_written();
    port_a.feed(&[command::HELLO, command::SET_OUTPUT, 1, 128]);
    engine.tick(200);

    assert_eq!(
        port_a.written(),
        vec![command::ACK, command::RCVD, command::RCVD, command::RCVD]
    );
    assert_eq!(
        sink.for_channel(Topic::Output, 1)[0].payload,
        Payload::Int(128)
    );
}

#[test]
fn mid_exchange_silence_times_out_and_resets() {
    let (mut engine, port_a, _b, sink) = make_engine();

    // Value bytes never arrive; the bounded read gives up.
    port_a.feed(&[command::HELLO, command::SET_TARGET, 1]);
    engine.tick(100);

    assert_eq!(
        port_a.written(),
        vec![command::ACK, command::RCVD, command::RCVD, command::ERROR]
    );
    assert_eq!(port_a.resets(), 1);
    assert!(sink.for_channel(Topic::Target, 1).is_empty());
}

#[test]
fn out_of_range_channel_is_refused_before_the_value() {
    let (mut engine, port_a, _b, _sink) = make_engine();

    // Only channels 1 and 2 are wired by the default config.
    port_a.feed(&[command::HELLO, command::SET_TARGET, 3, 0xC4, 0x09]);
    engine.tick(100);

    assert_eq!(
        port_a.written(),
        vec![command::ACK, command::RCVD, command::ERROR]
    );
    assert_eq!(port_a.resets(), 1);
}

#[test]
fn set_mode_accepts_zero_and_one_and_rejects_the_rest() {
    let (mut engine, port_a, _b, sink) = make_engine();

    port_a.feed(&[command::HELLO, command::SET_MODE, 1, 2]);
    engine.tick(100);
    assert_eq!(
        port_a.written(),
        vec![command::ACK, command::RCVD, command::RCVD, command::ERROR]
    );
    assert!(sink.for_channel(Topic::Mode, 1).is_empty());
    assert_eq!(engine.controller(1).unwrap().mode(), ControlMode::Automatic);

    port_a.take_written();
    port_a.feed(&[command::HELLO, command::SET_MODE, 1, 0]);
    engine.tick(200);
    assert_eq!(
        port_a.written(),
        vec![command::ACK, command::RCVD, command::RCVD, command::RCVD]
    );
    assert_eq!(engine.controller(1).unwrap().mode(), ControlMode::Manual);
}

#[test]
fn get_status_reports_offset_binary_snapshots() {
    let (mut engine, port_a, _b, _sink) = make_engine();

    engine.inject(Event::scoped(Topic::Temp, 1, Payload::Float(25.0)));
    engine.inject(Event::scoped(Topic::Target, 1, Payload::Float(40.0)));

    // Trailing 0xAA is the host's acknowledgement of the report.
    port_a.feed(&[command::HELLO, command::GET_STATUS, 1, 0xAA]);
    engine.tick(100);

    // temp 25.0 → 250 → 0x80FA; target 40.0 → 400 → 0x8190; speed and
    // output still zero → 0x8000.  All little-endian.
    assert_eq!(
        port_a.written(),
        vec![
            command::ACK,
            command::RCVD,
            command::RCVD,
            0xFA,
            0x80,
            0x90,
            0x81,
            0x00,
            0x80,
            0x00,
            0x80,
        ]
    );
    assert_eq!(port_a.unread(), 0, "host acknowledgement byte consumed");
}

#[test]
fn get_settings_reports_plain_scaled_fields() {
    let (mut engine, port_a, _b, _sink) = make_engine();

    engine.inject(Event::scoped(Topic::Kp, 1, Payload::Float(2.5)));

    port_a.feed(&[command::HELLO, command::GET_SETTINGS, 1, 0xAA]);
    engine.tick(100);

    // No mode broadcast has happened yet, so the cached mode is 0; kp
    // 2.5 → 250 at the ×100 scale; ki and kd still zero.
    assert_eq!(
        port_a.written(),
        vec![
            command::ACK,
            command::RCVD,
            command::RCVD,
            0x00,
            0x00,
            0xFA,
            0x00,
            0x00,
            0x00,
            0x00,
            0x00,
        ]
    );
}

// ── Framed link (Link B) ──────────────────────────────────────

#[test]
fn framed_read_returns_the_cached_quantity() {
    let (mut engine, _a, port_b, _sink) = make_engine();
    let mut now_ms = 0;

    engine.inject(Event::scoped(Topic::Temp, 1, Payload::Float(25.0)));

    let request = framed::build_frame(framed::READ_TEMP, b"").unwrap();
    port_b.feed(&request);
    pump_framed(&mut engine, &mut now_ms, request.len());

    let reply = framed::build_frame(framed::READ_TEMP + framed::WRITE_OFFSET, b"25.0").unwrap();
    let mut expected = vec![framed::ACK];
    expected.extend_from_slice(&reply);
    assert_eq!(port_b.written(), expected);
}

#[test]
fn framed_write_target_acks_and_retunes_the_served_channel() {
    let (mut engine, _a, port_b, sink) = make_engine();
    let mut now_ms = 0;

    let request = framed::build_frame(framed::WRITE_TARGET, b"45").unwrap();
    port_b.feed(&request);
    pump_framed(&mut engine, &mut now_ms, request.len());

    assert_eq!(port_b.written(), vec![framed::ACK]);
    assert_eq!(sink.for_channel(Topic::Target, 1)[0].payload, Payload::Int(45));
    assert_eq!(engine.controller(1).unwrap().target_c(), 45.0);
}

#[test]
fn corrupt_frame_is_nakked_and_publishes_nothing() {
    let (mut engine, _a, port_b, sink) = make_engine();
    let mut now_ms = 0;

    let mut request = framed::build_frame(framed::WRITE_TARGET, b"45").unwrap();
    // Payload flip: "45" becomes "55" while the checksum still covers "45".
    request[2] ^= 0x01;
    port_b.feed(&request);
    pump_framed(&mut engine, &mut now_ms, request.len());

    assert_eq!(port_b.written(), vec![framed::NAK]);
    assert!(sink.for_channel(Topic::Target, 1).is_empty());
}

#[test]
fn keypress_broadcast_is_forwarded_raw() {
    let (mut engine, port_a, port_b, _sink) = make_engine();

    engine.inject(Event::global(Topic::Keypress, Payload::Int(7)));

    assert_eq!(port_b.written(), b"7".to_vec());
    assert!(port_a.written().is_empty(), "the command link stays quiet");
}
