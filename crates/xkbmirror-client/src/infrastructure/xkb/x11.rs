//! Real X11 server backend, enabled with the `x11` cargo feature.
//!
//! Implements all three backend traits over one XCB connection:
//!
//! - keymap compilation and state resolution are delegated to
//!   libxkbcommon's X11 support (`xkb_x11_keymap_new_from_device` /
//!   `xkb_x11_state_new_from_device`), which reads the device's complete
//!   configuration off the connection,
//! - the notification subscription is one checked `XkbSelectEvents`
//!   request,
//! - events are pumped by a dedicated reader thread blocking in
//!   `xcb_wait_for_event` and forwarded into the session's channel.
//!
//! # Why a capture window? (for beginners)
//!
//! An X client only receives key-press events while some window of its own
//! has them selected.  The small mapped window created by
//! [`X11Server::create_capture_window`] exists purely so the session has a
//! surface to focus and type into; nothing is ever drawn to it.
//!
//! Extension events are different: once `XkbSelectEvents` is issued they
//! arrive regardless of window focus, tagged with the extension's base
//! event code negotiated at setup time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use thiserror::Error;
use tracing::{debug, warn};
use xcb::{x, xkb as xproto};
use xkbcommon::xkb as xkbc;

use xkbmirror_core::{
    DeviceId, EventCategorySet, Keycode, MapChangeNotify, MapPartSet, NewKeyboardChange,
    NewKeyboardNotify, StateChangeNotify, StateMask, Symbol, SymbolSequence, XkbNotify,
};

use crate::application::mirror_keymap::KeymapBackend;
use crate::application::subscribe_events::NotificationSubscriber;

use super::{EventSource, ServerEvent, SourceError};

/// Error type for connection setup.  Everything here is fatal-at-init.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("could not connect to the X server: {0}")]
    Connect(String),
    #[error("the server does not support a compatible XKB extension")]
    ExtensionUnsupported,
    #[error("no core keyboard device found")]
    NoCoreDevice,
    #[error("server request failed: {0}")]
    Request(String),
}

/// One connection to an X server, usable as keymap backend, notification
/// subscriber, and event source.
pub struct X11Server {
    conn: Arc<xcb::Connection>,
    context: xkbc::Context,
    screen_num: i32,
    core_device: DeviceId,
    stop: Arc<AtomicBool>,
    started: Mutex<bool>,
}

impl X11Server {
    /// Connects to `display` (or `$DISPLAY` when `None`) and negotiates the
    /// XKB extension.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError`] if the connection cannot be established, the
    /// extension version is unsupported, or no core keyboard exists.
    pub fn connect(display: Option<&str>) -> Result<Self, SetupError> {
        let (conn, screen_num) =
            xcb::Connection::connect_with_extensions(display, &[xcb::Extension::Xkb], &[])
                .map_err(|e| SetupError::Connect(e.to_string()))?;

        let mut major = 0u16;
        let mut minor = 0u16;
        let mut base_event = 0u8;
        let mut base_error = 0u8;
        let supported = xkbc::x11::setup_xkb_extension(
            &conn,
            xkbc::x11::MIN_MAJOR_XKB_VERSION,
            xkbc::x11::MIN_MINOR_XKB_VERSION,
            xkbc::x11::SetupXkbExtensionFlags::NoFlags,
            &mut major,
            &mut minor,
            &mut base_event,
            &mut base_error,
        );
        if !supported {
            return Err(SetupError::ExtensionUnsupported);
        }
        debug!(major, minor, base_event, "XKB extension negotiated");

        let device = xkbc::x11::get_core_keyboard_device_id(&conn);
        if device == -1 {
            return Err(SetupError::NoCoreDevice);
        }

        Ok(Self {
            conn: Arc::new(conn),
            context: xkbc::Context::new(xkbc::CONTEXT_NO_FLAGS),
            screen_num,
            core_device: DeviceId(device),
            stop: Arc::new(AtomicBool::new(false)),
            started: Mutex::new(false),
        })
    }

    /// The server's core keyboard device.
    pub fn core_keyboard(&self) -> DeviceId {
        self.core_device
    }

    /// Creates and maps the small window key presses are delivered to.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::Request`] if the server rejects window
    /// creation or mapping.
    pub fn create_capture_window(&self) -> Result<(), SetupError> {
        let setup = self.conn.get_setup();
        let screen = setup
            .roots()
            .nth(self.screen_num as usize)
            .ok_or_else(|| SetupError::Request("default screen not found".to_string()))?;

        let window: x::Window = self.conn.generate_id();
        self.conn
            .send_and_check_request(&x::CreateWindow {
                depth: x::COPY_FROM_PARENT as u8,
                wid: window,
                parent: screen.root(),
                x: 10,
                y: 10,
                width: 100,
                height: 100,
                border_width: 1,
                class: x::WindowClass::InputOutput,
                visual: screen.root_visual(),
                value_list: &[
                    x::Cw::BackPixel(screen.white_pixel()),
                    x::Cw::EventMask(x::EventMask::KEY_PRESS),
                ],
            })
            .map_err(|e| SetupError::Request(e.to_string()))?;
        self.conn
            .send_and_check_request(&x::MapWindow { window })
            .map_err(|e| SetupError::Request(e.to_string()))?;
        self.conn
            .flush()
            .map_err(|e| SetupError::Request(e.to_string()))?;
        Ok(())
    }
}

/// Maps one wire event to the session's event type.
fn map_event(event: xcb::Event) -> ServerEvent {
    match event {
        xcb::Event::X(x::Event::KeyPress(press)) => ServerEvent::KeyPress {
            keycode: Keycode(u32::from(press.detail())),
        },
        xcb::Event::Xkb(xproto::Event::NewKeyboardNotify(notify)) => {
            ServerEvent::Notify(XkbNotify::NewKeyboard(NewKeyboardNotify {
                device_id: DeviceId(i32::from(notify.device_id())),
                changed: NewKeyboardChange(notify.changed().bits() as u16),
            }))
        }
        xcb::Event::Xkb(xproto::Event::MapNotify(notify)) => {
            ServerEvent::Notify(XkbNotify::MapChange(MapChangeNotify {
                device_id: DeviceId(i32::from(notify.device_id())),
                changed_parts: MapPartSet(notify.changed().bits() as u16),
            }))
        }
        xcb::Event::Xkb(xproto::Event::StateNotify(notify)) => {
            ServerEvent::Notify(XkbNotify::StateChange(StateChangeNotify {
                device_id: DeviceId(i32::from(notify.device_id())),
                mask: StateMask {
                    base_mods: notify.base_mods().bits(),
                    latched_mods: notify.latched_mods().bits(),
                    locked_mods: notify.locked_mods().bits(),
                    base_group: i32::from(notify.base_group()),
                    latched_group: i32::from(notify.latched_group()),
                    locked_group: notify.locked_group() as i32,
                },
            }))
        }
        _ => ServerEvent::Unhandled,
    }
}

impl KeymapBackend for X11Server {
    type Keymap = xkbc::Keymap;
    type State = xkbc::State;

    fn compile_keymap(&self, device: DeviceId) -> Result<xkbc::Keymap, String> {
        let keymap = xkbc::x11::keymap_new_from_device(
            &self.context,
            &*self.conn,
            device.0,
            xkbc::KEYMAP_COMPILE_NO_FLAGS,
        );
        Ok(keymap)
    }

    fn build_state(&self, keymap: &xkbc::Keymap, device: DeviceId) -> Result<xkbc::State, String> {
        let state = xkbc::x11::state_new_from_device(keymap, &*self.conn, device.0);
        Ok(state)
    }

    fn apply_mask(&self, state: &mut xkbc::State, mask: &StateMask) {
        // Groups below zero cannot occur on a well-formed state snapshot;
        // clamp rather than wrap if one ever arrives.
        state.update_mask(
            mask.base_mods,
            mask.latched_mods,
            mask.locked_mods,
            mask.base_group.max(0) as u32,
            mask.latched_group.max(0) as u32,
            mask.locked_group.max(0) as u32,
        );
    }

    fn symbols_for(&self, state: &xkbc::State, keycode: Keycode) -> SymbolSequence {
        let key = xkbc::Keycode::new(keycode.0);
        let symbols = state
            .key_get_syms(key)
            .iter()
            .map(|keysym| Symbol {
                keysym: keysym.raw(),
                name: xkbc::keysym_get_name(*keysym),
            })
            .collect();
        SymbolSequence {
            symbols,
            text: state.key_get_utf8(key),
        }
    }
}

impl NotificationSubscriber for X11Server {
    fn select_notifications(
        &self,
        device: DeviceId,
        categories: EventCategorySet,
        parts: MapPartSet,
    ) -> Result<(), String> {
        let events = xproto::EventType::from_bits_truncate(u32::from(categories.0));
        let map_parts = xproto::MapPart::from_bits_truncate(u32::from(parts.0));
        self.conn
            .send_and_check_request(&xproto::SelectEvents {
                device_spec: device.0 as xproto::DeviceSpec,
                affect_which: events,
                clear: xproto::EventType::empty(),
                select_all: events,
                affect_map: map_parts,
                map: map_parts,
                details: &[],
            })
            .map_err(|e| e.to_string())
    }
}

impl EventSource for X11Server {
    fn start(&self) -> Result<mpsc::Receiver<ServerEvent>, SourceError> {
        let mut started = self.started.lock().expect("lock poisoned");
        if *started {
            return Err(SourceError::AlreadyStarted);
        }
        *started = true;

        let (tx, rx) = mpsc::channel();
        let conn = Arc::clone(&self.conn);
        let stop = Arc::clone(&self.stop);
        thread::Builder::new()
            .name("x11-event-reader".to_string())
            .spawn(move || loop {
                if stop.load(Ordering::Relaxed) {
                    break;
                }
                match conn.wait_for_event() {
                    Ok(event) => {
                        if tx.send(map_event(event)).is_err() {
                            // Session is gone; stop pumping.
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "server connection lost");
                        break;
                    }
                }
            })
            .map_err(|e| SourceError::ReaderSpawnFailed(e.to_string()))?;
        Ok(rx)
    }

    fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}
