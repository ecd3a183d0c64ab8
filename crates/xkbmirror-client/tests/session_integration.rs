//! Integration tests for the keyboard mirror session.
//!
//! These tests exercise the application layer of xkbmirror-client
//! end-to-end: `Session` + `MirrorRegistry` + `KeyboardMirror` over the
//! scriptable mock server, driving the loop with real channel delivery.

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use xkbmirror_client::application::run_session::{Session, SessionEnd, SymbolSink};
use xkbmirror_client::infrastructure::xkb::mock::{MockXkbServer, KEY_A, KEY_ESCAPE};
use xkbmirror_client::infrastructure::xkb::{EventSource, ServerEvent};
use xkbmirror_core::{
    DeviceId, MapChangeNotify, MapPartSet, NewKeyboardChange, NewKeyboardNotify,
    StateChangeNotify, StateMask, SymbolSequence, XkbNotify,
};

// ── Test doubles ──────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct RecordingSink {
    lines: Arc<Mutex<Vec<SymbolSequence>>>,
}

impl RecordingSink {
    fn texts(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .map(|seq| seq.text.clone())
            .collect()
    }
}

impl SymbolSink for RecordingSink {
    fn emit(&mut self, _keycode: xkbmirror_core::Keycode, symbols: &SymbolSequence) {
        self.lines.lock().unwrap().push(symbols.clone());
    }
}

// ── Event builders ────────────────────────────────────────────────────────────

fn press(keycode: xkbmirror_core::Keycode) -> ServerEvent {
    ServerEvent::KeyPress { keycode }
}

fn map_change(device: DeviceId) -> ServerEvent {
    ServerEvent::Notify(XkbNotify::MapChange(MapChangeNotify {
        device_id: device,
        changed_parts: MapPartSet(MapPartSet::KEY_SYMS),
    }))
}

fn state_change(device: DeviceId, mask: StateMask) -> ServerEvent {
    ServerEvent::Notify(XkbNotify::StateChange(StateChangeNotify {
        device_id: device,
        mask,
    }))
}

fn keyboard_replaced(device: DeviceId, changed: u16) -> ServerEvent {
    ServerEvent::Notify(XkbNotify::NewKeyboard(NewKeyboardNotify {
        device_id: device,
        changed: NewKeyboardChange(changed),
    }))
}

/// Initializes a session over `server`, injects `events`, closes the
/// channel, runs the loop to completion, and returns (end, sink, session
/// stats are read before drop).
fn run_script(
    server: &MockXkbServer,
    events: Vec<ServerEvent>,
) -> (
    SessionEnd,
    RecordingSink,
    xkbmirror_client::application::run_session::SessionStats,
) {
    let sink = RecordingSink::default();
    let mut session = Session::new(
        server,
        server.device_id(),
        sink.clone(),
        KEY_ESCAPE,
        Arc::new(AtomicBool::new(false)),
    );
    session.initialize().expect("initialization must succeed");

    let rx = server.start().expect("event source must start");
    for event in events {
        server.inject(event);
    }
    server.close();

    let end = session.run(rx);
    (end, sink, session.stats())
}

// ── Sequencing ────────────────────────────────────────────────────────────────

#[test]
fn test_each_press_after_a_rebuild_sees_the_new_keymap() {
    // Three generations of keymap, one press under each.  Generation N maps
    // KEY_A to the Nth letter, so a stale read would repeat a letter.
    let server = MockXkbServer::new();
    let device = server.device_id();

    let (end, sink, stats) = run_script(
        &server,
        vec![
            press(KEY_A),
            map_change(device),
            press(KEY_A),
            map_change(device),
            press(KEY_A),
        ],
    );

    assert_eq!(end, SessionEnd::SourceClosed);
    assert_eq!(sink.texts(), vec!["a", "b", "c"]);
    assert_eq!(stats.rebuilds, 2);
}

#[test]
fn test_press_immediately_after_state_change_sees_the_patched_state() {
    let server = MockXkbServer::new();
    let device = server.device_id();

    let (_, sink, stats) = run_script(
        &server,
        vec![
            press(KEY_A),
            state_change(device, MockXkbServer::shift_mask()),
            press(KEY_A),
            state_change(device, StateMask::default()),
            press(KEY_A),
        ],
    );

    assert_eq!(sink.texts(), vec!["a", "A", "a"]);
    assert_eq!(stats.patches, 2);
    assert_eq!(stats.rebuilds, 0, "patches must not recompile");
}

// ── Device-scope filtering ────────────────────────────────────────────────────

#[test]
fn test_foreign_device_notifications_leave_the_mirror_unchanged() {
    let server = MockXkbServer::new();
    let foreign = DeviceId(9);

    let (_, sink, stats) = run_script(
        &server,
        vec![
            map_change(foreign),
            state_change(foreign, MockXkbServer::shift_mask()),
            keyboard_replaced(foreign, NewKeyboardChange::KEYCODES),
            press(KEY_A),
        ],
    );

    // Still the initial keymap, still unshifted.
    assert_eq!(sink.texts(), vec!["a"]);
    assert_eq!(stats.ignored_notifications, 3);
    assert_eq!(server.compile_count(), 1, "only the initial compile");
}

#[test]
fn test_keyboard_replacement_without_keycode_change_is_a_noop() {
    let server = MockXkbServer::new();
    let device = server.device_id();

    let (_, sink, stats) = run_script(
        &server,
        vec![
            keyboard_replaced(device, NewKeyboardChange::GEOMETRY),
            press(KEY_A),
        ],
    );

    assert_eq!(sink.texts(), vec!["a"]);
    assert_eq!(stats.ignored_notifications, 1);
    assert_eq!(server.compile_count(), 1);
}

#[test]
fn test_keyboard_replacement_with_keycode_change_rebuilds() {
    let server = MockXkbServer::new();
    let device = server.device_id();

    let (_, sink, stats) = run_script(
        &server,
        vec![
            keyboard_replaced(device, NewKeyboardChange::KEYCODES),
            press(KEY_A),
        ],
    );

    assert_eq!(sink.texts(), vec!["b"]);
    assert_eq!(stats.rebuilds, 1);
}

// ── Idempotence ───────────────────────────────────────────────────────────────

#[test]
fn test_repeating_an_identical_mask_does_not_change_translation() {
    let server = MockXkbServer::new();
    let device = server.device_id();
    let mask = MockXkbServer::shift_mask();

    let (_, sink, _) = run_script(
        &server,
        vec![
            state_change(device, mask),
            press(KEY_A),
            state_change(device, mask),
            press(KEY_A),
        ],
    );

    assert_eq!(sink.texts(), vec!["A", "A"]);
}

// ── Degraded operation ────────────────────────────────────────────────────────

#[test]
fn test_failed_runtime_rebuild_keeps_the_previous_keymap_working() {
    let server = MockXkbServer::new();
    let device = server.device_id();
    server.fail_next_compile();

    let (end, sink, stats) = run_script(
        &server,
        vec![
            map_change(device), // fails, swallowed
            press(KEY_A),       // still generation 1
            map_change(device), // recovers
            press(KEY_A),       // generation 2
        ],
    );

    assert_eq!(end, SessionEnd::SourceClosed, "the session must survive");
    assert_eq!(sink.texts(), vec!["a", "b"]);
    assert_eq!(stats.rebuild_failures, 1);
    assert_eq!(stats.rebuilds, 1);
    assert_eq!(server.live_keymaps(), 1, "no leaked keymap handles");
}

// ── The full scenario ─────────────────────────────────────────────────────────

#[test]
fn test_shift_then_map_change_scenario() {
    // Device id 0; subscription succeeds; initial rebuild gives keymap K1.
    let server = MockXkbServer::new();
    let device = server.device_id();
    assert_eq!(device, DeviceId(0));

    let (_, sink, stats) = run_script(
        &server,
        vec![
            // State change with baseMods = Shift: keycode 38 now shifted.
            state_change(device, MockXkbServer::shift_mask()),
            press(KEY_A),
            // Map change: rebuild succeeds, producing K2; its fresh state
            // reflects the server's current (neutral) state.
            map_change(device),
            press(KEY_A),
        ],
    );

    assert_eq!(sink.texts(), vec!["A", "b"]);
    // "keymap updated" is emitted exactly once: one replacement rebuild.
    assert_eq!(stats.rebuilds, 1);
}

#[test]
fn test_sentinel_key_ends_the_session_with_at_most_one_more_event() {
    let server = MockXkbServer::new();

    let (end, sink, stats) = run_script(
        &server,
        vec![press(KEY_A), press(KEY_ESCAPE), press(KEY_A), press(KEY_A)],
    );

    // The sentinel press itself is still translated ("" for escape); the
    // queued presses after it are never processed.
    assert_eq!(end, SessionEnd::SentinelKey);
    assert_eq!(sink.texts(), vec!["a", ""]);
    assert_eq!(stats.keys_translated, 2);
}

#[test]
fn test_initial_compile_failure_means_no_subscription_and_no_leak() {
    let server = MockXkbServer::new();
    server.fail_next_compile();

    let sink = RecordingSink::default();
    let mut session = Session::new(
        &server,
        server.device_id(),
        sink,
        KEY_ESCAPE,
        Arc::new(AtomicBool::new(false)),
    );

    let result = session.initialize();

    assert!(result.is_err());
    assert!(
        server.selections().is_empty(),
        "no subscription may be attempted after a failed initial build"
    );
    drop(session);
    assert_eq!(server.live_keymaps(), 0);
    assert_eq!(server.live_states(), 0);
}
