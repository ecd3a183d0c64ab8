//! In-memory mock keyboard server for unit and integration testing.
//!
//! Implements all three backend traits against a tiny scriptable model:
//!
//! - Each device has a keymap *generation* counter; every compilation bumps
//!   it and produces a different symbol table (the letter row rotates by one
//!   position per generation, standing in for a real layout change).
//! - Mask application is absolute, like the real state engine.
//! - Compile, state-construction, and subscription failures can be injected.
//! - Keymap and state handles carry drop-tracked live counters, so tests can
//!   prove release-exactly-once and no-leak properties.
//!
//! Events are injected with [`MockXkbServer::inject`] and delivered through
//! the same `mpsc` channel shape the real backend uses.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};

use xkbmirror_core::{
    DeviceId, EventCategorySet, Keycode, MapPartSet, StateMask, Symbol, SymbolSequence,
};

use crate::application::mirror_keymap::KeymapBackend;
use crate::application::subscribe_events::NotificationSubscriber;

use super::{EventSource, ServerEvent, SourceError};

/// Key code of the `a` key in the mock's table (the X11 core keycode).
pub const KEY_A: Keycode = Keycode(38);
/// Key code of the escape key (the X11 core keycode, the default sentinel).
pub const KEY_ESCAPE: Keycode = Keycode(9);

/// Shift bit in the mock's modifier masks (the X11 core Shift mask).
const SHIFT_MASK: u32 = 0x1;

/// Escape keysym value.
const KEYSYM_ESCAPE: u32 = 0xff1b;

// ── Drop-tracked handles ──────────────────────────────────────────────────────

/// Increments a shared counter on creation, decrements it on drop.
#[derive(Debug)]
struct LiveGuard {
    counter: Arc<AtomicUsize>,
}

impl LiveGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self {
            counter: Arc::clone(counter),
        }
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A compiled keymap handle from the mock server.
#[derive(Debug)]
pub struct MockKeymap {
    device: DeviceId,
    generation: u32,
    _live: LiveGuard,
}

/// A live state handle bound to one [`MockKeymap`].
#[derive(Debug)]
pub struct MockState {
    generation: u32,
    mask: StateMask,
    _live: LiveGuard,
}

// ── The server model ──────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct DeviceModel {
    generation: u32,
    compiles: u32,
}

#[derive(Debug, Default)]
struct ServerModel {
    devices: HashMap<DeviceId, DeviceModel>,
    selections: Vec<(DeviceId, EventCategorySet, MapPartSet)>,
    fail_next_compile: bool,
    fail_next_state_build: bool,
    subscription_rejection: Option<String>,
    total_compiles: u32,
    sender: Option<Sender<ServerEvent>>,
}

/// A scriptable in-memory keyboard server.
///
/// Clones share the same model, so a test can keep one handle for scripting
/// while the session owns another.
#[derive(Clone)]
pub struct MockXkbServer {
    model: Arc<Mutex<ServerModel>>,
    live_keymaps: Arc<AtomicUsize>,
    live_states: Arc<AtomicUsize>,
}

impl MockXkbServer {
    /// Creates a server with one keyboard: the core device, id 0.
    pub fn new() -> Self {
        let mut devices = HashMap::new();
        devices.insert(DeviceId(0), DeviceModel::default());
        Self {
            model: Arc::new(Mutex::new(ServerModel {
                devices,
                ..ServerModel::default()
            })),
            live_keymaps: Arc::new(AtomicUsize::new(0)),
            live_states: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The core keyboard device id.
    pub fn device_id(&self) -> DeviceId {
        DeviceId(0)
    }

    /// Adds another keyboard device to the model.
    pub fn add_device(&self, device: DeviceId) {
        self.model
            .lock()
            .expect("lock poisoned")
            .devices
            .insert(device, DeviceModel::default());
    }

    /// A mask with only the Shift modifier held.
    pub fn shift_mask() -> StateMask {
        StateMask {
            base_mods: SHIFT_MASK,
            ..StateMask::default()
        }
    }

    // ── Failure injection ────────────────────────────────────────────────────

    /// Makes the next keymap compilation fail.
    pub fn fail_next_compile(&self) {
        self.model.lock().expect("lock poisoned").fail_next_compile = true;
    }

    /// Makes the next state construction fail.
    pub fn fail_next_state_build(&self) {
        self.model.lock().expect("lock poisoned").fail_next_state_build = true;
    }

    /// Makes every subscription request fail with `reason`.
    pub fn reject_subscriptions(&self, reason: &str) {
        self.model.lock().expect("lock poisoned").subscription_rejection = Some(reason.to_string());
    }

    // ── Observability for tests ──────────────────────────────────────────────

    /// Total keymap compilations performed, across all devices.
    pub fn compile_count(&self) -> u32 {
        self.model.lock().expect("lock poisoned").total_compiles
    }

    /// Keymap compilations performed for one device.
    pub fn compile_count_for(&self, device: DeviceId) -> u32 {
        self.model
            .lock()
            .expect("lock poisoned")
            .devices
            .get(&device)
            .map(|d| d.compiles)
            .unwrap_or(0)
    }

    /// Keymap handles currently alive (created minus dropped).
    pub fn live_keymaps(&self) -> usize {
        self.live_keymaps.load(Ordering::SeqCst)
    }

    /// State handles currently alive (created minus dropped).
    pub fn live_states(&self) -> usize {
        self.live_states.load(Ordering::SeqCst)
    }

    /// Every subscription request received, in order.
    pub fn selections(&self) -> Vec<(DeviceId, EventCategorySet, MapPartSet)> {
        self.model.lock().expect("lock poisoned").selections.clone()
    }

    // ── Event scripting ──────────────────────────────────────────────────────

    /// Injects an event, as if delivered by the server.
    ///
    /// Panics if `start()` has not been called or the source was stopped.
    pub fn inject(&self, event: ServerEvent) {
        let guard = self.model.lock().expect("lock poisoned");
        match &guard.sender {
            Some(sender) => sender
                .send(event)
                .expect("receiver dropped; keep it alive while injecting"),
            None => panic!("MockXkbServer::inject called before start()"),
        }
    }

    /// Closes the event channel, as if the connection ended.
    pub fn close(&self) {
        self.model.lock().expect("lock poisoned").sender = None;
    }

    // ── Symbol table ─────────────────────────────────────────────────────────

    /// The toy symbol table: a handful of letter keys whose base character
    /// rotates by one alphabet position per keymap generation, plus the
    /// escape key.  Shift selects the uppercase level.  Group fields are
    /// recorded in the state but do not affect this table.
    fn lookup(generation: u32, mask: &StateMask, keycode: Keycode) -> SymbolSequence {
        if keycode == KEY_ESCAPE {
            return SymbolSequence {
                symbols: vec![Symbol {
                    keysym: KEYSYM_ESCAPE,
                    name: "Escape".to_string(),
                }],
                text: String::new(),
            };
        }

        let base = match keycode {
            Keycode(38) => b'a',
            Keycode(56) => b'b',
            Keycode(54) => b'c',
            Keycode(40) => b'd',
            Keycode(26) => b'e',
            _ => return SymbolSequence::default(),
        };

        let rotated = b'a' + (base - b'a' + (generation.saturating_sub(1) % 26) as u8) % 26;
        let shifted = mask.effective_mods() & SHIFT_MASK != 0;
        let byte = if shifted {
            rotated.to_ascii_uppercase()
        } else {
            rotated
        };
        let ch = byte as char;

        SymbolSequence {
            symbols: vec![Symbol {
                keysym: ch as u32,
                name: ch.to_string(),
            }],
            text: ch.to_string(),
        }
    }
}

impl Default for MockXkbServer {
    fn default() -> Self {
        Self::new()
    }
}

// ── Trait implementations ─────────────────────────────────────────────────────

impl KeymapBackend for MockXkbServer {
    type Keymap = MockKeymap;
    type State = MockState;

    fn compile_keymap(&self, device: DeviceId) -> Result<MockKeymap, String> {
        let mut model = self.model.lock().expect("lock poisoned");
        if model.fail_next_compile {
            model.fail_next_compile = false;
            return Err("injected compile failure".to_string());
        }
        let Some(entry) = model.devices.get_mut(&device) else {
            return Err(format!("unknown device {device}"));
        };
        entry.generation += 1;
        entry.compiles += 1;
        let generation = entry.generation;
        model.total_compiles += 1;
        Ok(MockKeymap {
            device,
            generation,
            _live: LiveGuard::new(&self.live_keymaps),
        })
    }

    fn build_state(&self, keymap: &MockKeymap, device: DeviceId) -> Result<MockState, String> {
        let mut model = self.model.lock().expect("lock poisoned");
        if model.fail_next_state_build {
            model.fail_next_state_build = false;
            return Err("injected state failure".to_string());
        }
        if keymap.device != device {
            return Err(format!(
                "keymap belongs to device {}, not {device}",
                keymap.device
            ));
        }
        Ok(MockState {
            generation: keymap.generation,
            mask: StateMask::default(),
            _live: LiveGuard::new(&self.live_states),
        })
    }

    fn apply_mask(&self, state: &mut MockState, mask: &StateMask) {
        // Absolute, like the real state engine: the mask fully describes
        // the new state.
        state.mask = *mask;
    }

    fn symbols_for(&self, state: &MockState, keycode: Keycode) -> SymbolSequence {
        Self::lookup(state.generation, &state.mask, keycode)
    }
}

impl NotificationSubscriber for MockXkbServer {
    fn select_notifications(
        &self,
        device: DeviceId,
        categories: EventCategorySet,
        parts: MapPartSet,
    ) -> Result<(), String> {
        let mut model = self.model.lock().expect("lock poisoned");
        if let Some(reason) = &model.subscription_rejection {
            return Err(reason.clone());
        }
        if !model.devices.contains_key(&device) {
            return Err(format!("unknown device {device}"));
        }
        model.selections.push((device, categories, parts));
        Ok(())
    }
}

impl EventSource for MockXkbServer {
    fn start(&self) -> Result<mpsc::Receiver<ServerEvent>, SourceError> {
        let mut model = self.model.lock().expect("lock poisoned");
        if model.sender.is_some() {
            return Err(SourceError::AlreadyStarted);
        }
        let (tx, rx) = mpsc::channel();
        model.sender = Some(tx);
        Ok(rx)
    }

    fn stop(&self) {
        self.close();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_bumps_generation_and_counts() {
        let server = MockXkbServer::new();

        let first = server.compile_keymap(server.device_id()).unwrap();
        let second = server.compile_keymap(server.device_id()).unwrap();

        assert_eq!(first.generation, 1);
        assert_eq!(second.generation, 2);
        assert_eq!(server.compile_count(), 2);
        assert_eq!(server.live_keymaps(), 2);
    }

    #[test]
    fn test_dropping_handles_decrements_live_counters() {
        let server = MockXkbServer::new();
        let keymap = server.compile_keymap(server.device_id()).unwrap();
        let state = server.build_state(&keymap, server.device_id()).unwrap();
        assert_eq!(server.live_keymaps(), 1);
        assert_eq!(server.live_states(), 1);

        drop(state);
        drop(keymap);

        assert_eq!(server.live_keymaps(), 0);
        assert_eq!(server.live_states(), 0);
    }

    #[test]
    fn test_compile_for_unknown_device_fails() {
        let server = MockXkbServer::new();
        assert!(server.compile_keymap(DeviceId(42)).is_err());
    }

    #[test]
    fn test_generation_rotates_the_letter_table() {
        let server = MockXkbServer::new();
        let keymap = server.compile_keymap(server.device_id()).unwrap();
        let state = server.build_state(&keymap, server.device_id()).unwrap();
        assert_eq!(server.symbols_for(&state, KEY_A).text, "a");

        let keymap2 = server.compile_keymap(server.device_id()).unwrap();
        let state2 = server.build_state(&keymap2, server.device_id()).unwrap();
        assert_eq!(server.symbols_for(&state2, KEY_A).text, "b");
    }

    #[test]
    fn test_shift_selects_the_uppercase_level() {
        let server = MockXkbServer::new();
        let keymap = server.compile_keymap(server.device_id()).unwrap();
        let mut state = server.build_state(&keymap, server.device_id()).unwrap();

        server.apply_mask(&mut state, &MockXkbServer::shift_mask());

        assert_eq!(server.symbols_for(&state, KEY_A).text, "A");
    }

    #[test]
    fn test_escape_translates_to_the_escape_keysym() {
        let server = MockXkbServer::new();
        let keymap = server.compile_keymap(server.device_id()).unwrap();
        let state = server.build_state(&keymap, server.device_id()).unwrap();

        let seq = server.symbols_for(&state, KEY_ESCAPE);

        assert_eq!(seq.symbols[0].name, "Escape");
        assert_eq!(seq.symbols[0].keysym, KEYSYM_ESCAPE);
        assert!(seq.text.is_empty());
    }

    #[test]
    fn test_unbound_keycode_yields_empty_sequence() {
        let server = MockXkbServer::new();
        let keymap = server.compile_keymap(server.device_id()).unwrap();
        let state = server.build_state(&keymap, server.device_id()).unwrap();

        assert!(server.symbols_for(&state, Keycode(200)).is_empty());
    }

    #[test]
    fn test_event_channel_delivers_injected_events() {
        let server = MockXkbServer::new();
        let rx = server.start().expect("start should succeed");

        server.inject(ServerEvent::KeyPress { keycode: KEY_A });

        let event = rx.recv().expect("should receive event");
        assert!(matches!(event, ServerEvent::KeyPress { keycode } if keycode == KEY_A));
    }

    #[test]
    fn test_close_disconnects_the_channel() {
        let server = MockXkbServer::new();
        let rx = server.start().expect("start should succeed");

        server.close();

        assert!(rx.recv().is_err(), "channel should be closed after close()");
    }

    #[test]
    fn test_double_start_is_rejected() {
        let server = MockXkbServer::new();
        let _rx = server.start().expect("first start should succeed");

        assert!(matches!(server.start(), Err(SourceError::AlreadyStarted)));
    }

    #[test]
    fn test_subscription_rejection_is_injectable() {
        let server = MockXkbServer::new();
        server.reject_subscriptions("injected rejection");

        let spec = xkbmirror_core::SubscriptionSpec::required();
        let result = server.select_notifications(server.device_id(), spec.categories, spec.map_parts);

        assert_eq!(result, Err("injected rejection".to_string()));
        assert!(server.selections().is_empty());
    }
}
