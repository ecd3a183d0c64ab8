//! Routing of inbound change notifications to per-device mirrors.
//!
//! The dispatcher classifies each notification by its protocol-level
//! category tag and device identifier, then triggers the matching operation
//! on the device's [`KeyboardMirror`]:
//!
//! - keyboard-replaced: full rebuild, but only when the notification says
//!   key-code assignments changed — a replacement that only touched
//!   geometry or similar detail cannot invalidate the compiled keymap.
//! - map-change: full rebuild, always.  The changed-parts detail is not
//!   consulted; any recompilation on the server side invalidates the whole
//!   local pair.
//! - state-change: in-place patch with the carried six-field mask.
//!
//! Notifications for devices with no registered mirror are dropped without
//! side effects — device-scope filtering, not an error.
//!
//! A rebuild that fails here is swallowed: the previous valid pair stays
//! installed, a warning is logged, and the session continues translating
//! with slightly stale tables rather than dying on a transient
//! recompilation failure.

use std::collections::HashMap;

use tracing::{trace, warn};

use xkbmirror_core::{DeviceId, NewKeyboardChange, XkbNotify};

use crate::application::mirror_keymap::{KeymapBackend, KeyboardMirror};

/// What a dispatched notification did to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A full keymap rebuild was performed.
    Rebuilt,
    /// The live state was patched in place.
    Patched,
    /// A rebuild was attempted and failed; the previous pair is retained.
    RebuildFailed,
    /// The notification was outside this registry's scope and dropped.
    Ignored,
}

/// Per-device storage of keyboard mirrors, keyed by device identifier.
///
/// The session registers exactly one device today; routing by id through a
/// map keeps the per-device logic unchanged if more devices are ever
/// registered.
pub struct MirrorRegistry<B: KeymapBackend> {
    mirrors: HashMap<DeviceId, KeyboardMirror<B>>,
}

impl<B: KeymapBackend> MirrorRegistry<B> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            mirrors: HashMap::new(),
        }
    }

    /// Registers an empty mirror for `device` and returns it.  Replaces any
    /// previous mirror for the same device.
    pub fn register(&mut self, device: DeviceId) -> &mut KeyboardMirror<B> {
        self.mirrors.insert(device, KeyboardMirror::new(device));
        self.mirrors
            .get_mut(&device)
            .expect("mirror was just inserted")
    }

    /// The mirror for `device`, if registered.
    pub fn get(&self, device: DeviceId) -> Option<&KeyboardMirror<B>> {
        self.mirrors.get(&device)
    }

    /// The mirror for `device`, if registered.
    pub fn get_mut(&mut self, device: DeviceId) -> Option<&mut KeyboardMirror<B>> {
        self.mirrors.get_mut(&device)
    }

    /// Classifies `notify` and routes it to the owning mirror.
    pub fn dispatch(&mut self, backend: &B, notify: &XkbNotify) -> DispatchOutcome {
        match notify {
            XkbNotify::NewKeyboard(n) => {
                if !n.changed.contains(NewKeyboardChange::KEYCODES) {
                    trace!(device = %n.device_id, changed = n.changed.0,
                           "keyboard replacement without keycode change ignored");
                    return DispatchOutcome::Ignored;
                }
                self.rebuild_for(backend, n.device_id)
            }
            XkbNotify::MapChange(n) => self.rebuild_for(backend, n.device_id),
            XkbNotify::StateChange(n) => match self.mirrors.get_mut(&n.device_id) {
                Some(mirror) => {
                    mirror.patch(backend, &n.mask);
                    DispatchOutcome::Patched
                }
                None => {
                    trace!(device = %n.device_id, "state change for unregistered device ignored");
                    DispatchOutcome::Ignored
                }
            },
        }
    }

    fn rebuild_for(&mut self, backend: &B, device: DeviceId) -> DispatchOutcome {
        let Some(mirror) = self.mirrors.get_mut(&device) else {
            trace!(device = %device, "map change for unregistered device ignored");
            return DispatchOutcome::Ignored;
        };
        match mirror.rebuild(backend) {
            Ok(_) => DispatchOutcome::Rebuilt,
            Err(err) => {
                warn!(device = %device, error = %err,
                      "keymap rebuild failed; keeping previous keymap");
                DispatchOutcome::RebuildFailed
            }
        }
    }
}

impl<B: KeymapBackend> Default for MirrorRegistry<B> {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::xkb::mock::{MockXkbServer, KEY_A};
    use xkbmirror_core::{
        MapChangeNotify, MapPartSet, NewKeyboardNotify, StateChangeNotify, StateMask,
    };

    fn map_change(device: DeviceId) -> XkbNotify {
        XkbNotify::MapChange(MapChangeNotify {
            device_id: device,
            changed_parts: MapPartSet(MapPartSet::KEY_SYMS),
        })
    }

    fn state_change(device: DeviceId, mask: StateMask) -> XkbNotify {
        XkbNotify::StateChange(StateChangeNotify {
            device_id: device,
            mask,
        })
    }

    fn new_keyboard(device: DeviceId, changed: u16) -> XkbNotify {
        XkbNotify::NewKeyboard(NewKeyboardNotify {
            device_id: device,
            changed: NewKeyboardChange(changed),
        })
    }

    fn ready_registry(server: &MockXkbServer) -> MirrorRegistry<MockXkbServer> {
        let mut registry = MirrorRegistry::new();
        registry
            .register(server.device_id())
            .rebuild(server)
            .expect("initial rebuild must succeed");
        registry
    }

    #[test]
    fn test_map_change_for_registered_device_triggers_rebuild() {
        let server = MockXkbServer::new();
        let mut registry = ready_registry(&server);

        let outcome = registry.dispatch(&server, &map_change(server.device_id()));

        assert_eq!(outcome, DispatchOutcome::Rebuilt);
        assert_eq!(server.compile_count(), 2);
    }

    #[test]
    fn test_map_change_for_foreign_device_is_ignored() {
        // Arrange
        let server = MockXkbServer::new();
        let mut registry = ready_registry(&server);

        // Act – device 9 has no mirror registered.
        let outcome = registry.dispatch(&server, &map_change(DeviceId(9)));

        // Assert – provably no side effect on the pair.
        assert_eq!(outcome, DispatchOutcome::Ignored);
        assert_eq!(server.compile_count(), 1);
        let mirror = registry.get(server.device_id()).unwrap();
        assert_eq!(mirror.translate(&server, KEY_A).unwrap().text, "a");
    }

    #[test]
    fn test_new_keyboard_with_keycodes_changed_triggers_rebuild() {
        let server = MockXkbServer::new();
        let mut registry = ready_registry(&server);

        let outcome = registry.dispatch(
            &server,
            &new_keyboard(server.device_id(), NewKeyboardChange::KEYCODES),
        );

        assert_eq!(outcome, DispatchOutcome::Rebuilt);
        assert_eq!(server.compile_count(), 2);
    }

    #[test]
    fn test_new_keyboard_without_keycodes_change_is_ignored() {
        let server = MockXkbServer::new();
        let mut registry = ready_registry(&server);

        // Geometry-only replacement of the bound device: no rebuild.
        let outcome = registry.dispatch(
            &server,
            &new_keyboard(server.device_id(), NewKeyboardChange::GEOMETRY),
        );

        assert_eq!(outcome, DispatchOutcome::Ignored);
        assert_eq!(server.compile_count(), 1);
    }

    #[test]
    fn test_new_keyboard_for_foreign_device_is_ignored_even_with_keycodes() {
        let server = MockXkbServer::new();
        let mut registry = ready_registry(&server);

        let outcome =
            registry.dispatch(&server, &new_keyboard(DeviceId(9), NewKeyboardChange::KEYCODES));

        assert_eq!(outcome, DispatchOutcome::Ignored);
        assert_eq!(server.compile_count(), 1);
    }

    #[test]
    fn test_state_change_for_registered_device_patches_in_place() {
        let server = MockXkbServer::new();
        let mut registry = ready_registry(&server);

        let outcome = registry.dispatch(
            &server,
            &state_change(server.device_id(), MockXkbServer::shift_mask()),
        );

        assert_eq!(outcome, DispatchOutcome::Patched);
        assert_eq!(server.compile_count(), 1, "patch must not recompile");
        let mirror = registry.get(server.device_id()).unwrap();
        assert_eq!(mirror.translate(&server, KEY_A).unwrap().text, "A");
    }

    #[test]
    fn test_state_change_for_foreign_device_leaves_state_untouched() {
        let server = MockXkbServer::new();
        let mut registry = ready_registry(&server);

        let outcome =
            registry.dispatch(&server, &state_change(DeviceId(9), MockXkbServer::shift_mask()));

        assert_eq!(outcome, DispatchOutcome::Ignored);
        let mirror = registry.get(server.device_id()).unwrap();
        assert_eq!(mirror.translate(&server, KEY_A).unwrap().text, "a");
    }

    #[test]
    fn test_failed_rebuild_is_swallowed_and_pair_retained() {
        // Arrange
        let server = MockXkbServer::new();
        let mut registry = ready_registry(&server);
        server.fail_next_compile();

        // Act
        let outcome = registry.dispatch(&server, &map_change(server.device_id()));

        // Assert – degraded but functional: stale pair still translates.
        assert_eq!(outcome, DispatchOutcome::RebuildFailed);
        let mirror = registry.get(server.device_id()).unwrap();
        assert_eq!(mirror.translate(&server, KEY_A).unwrap().text, "a");

        // A later map change recovers.
        let outcome = registry.dispatch(&server, &map_change(server.device_id()));
        assert_eq!(outcome, DispatchOutcome::Rebuilt);
    }

    #[test]
    fn test_registry_routes_by_device_id() {
        // Arrange – two devices, two mirrors.
        let server = MockXkbServer::new();
        let second = DeviceId(4);
        server.add_device(second);
        let mut registry = ready_registry(&server);
        registry
            .register(second)
            .rebuild(&server)
            .expect("second device rebuild must succeed");

        // Act – map change for the second device only.
        registry.dispatch(&server, &map_change(second));

        // Assert – only the second device recompiled.
        assert_eq!(server.compile_count_for(server.device_id()), 1);
        assert_eq!(server.compile_count_for(second), 2);
    }
}
