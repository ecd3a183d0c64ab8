//! The keymap-state pair: one device's mirrored keyboard configuration.
//!
//! A [`KeyboardMirror`] owns at most one (keymap, state) pair for its device
//! and exposes the three operations the rest of the engine needs:
//!
//! - `rebuild` – discard the pair and compile a fresh one from the server's
//!   current configuration.  Keyboard-replaced and map-change notifications
//!   both land here: a partial patch cannot express a changed key type or
//!   symbol table, so the whole pair goes.
//! - `patch` – apply a six-field modifier/group mask to the existing state
//!   in place.  The keymap is never touched; recompiling on every Shift
//!   press would be wasteful.
//! - `translate` – pure read: the symbols a physical key produces under the
//!   current state.
//!
//! # Ownership during rebuild
//!
//! The previous pair must stay valid until its replacement is fully
//! constructed, and must then be released exactly once.  The pair lives in
//! an owned `Option` slot that is only overwritten after both the new
//! keymap and the new state exist; on any failure the slot is untouched and
//! whatever half-built successor exists is dropped on the way out.  No
//! reader can observe a half-rebuilt pair because the engine is
//! single-threaded and `rebuild` runs to completion.

use thiserror::Error;
use tracing::info;

use xkbmirror_core::{DeviceId, Keycode, StateMask, SymbolSequence};

/// Error type for a failed keymap rebuild.
///
/// The backend reports its own failures as opaque strings; this enum records
/// which of the two construction steps failed, which matters for cleanup
/// semantics (a state failure means a fresh keymap had to be released).
#[derive(Debug, Error)]
pub enum RebuildError {
    #[error("keymap compilation failed for device {device}: {reason}")]
    Compile { device: DeviceId, reason: String },
    #[error("state construction failed for device {device}: {reason}")]
    StateBuild { device: DeviceId, reason: String },
}

/// How a successful rebuild changed the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rebuilt {
    /// First successful rebuild; the mirror was empty before.
    Initial,
    /// A previous pair was replaced.  The caller-visible "keymap updated"
    /// diagnostic is emitted exactly once per replacement.
    Replaced,
}

/// Capability contract for the external keymap compiler and state engine.
///
/// The engine treats all four operations as opaque: compilation and state
/// construction are single calls with pass/fail outcomes, mask application
/// cannot fail (malformed input is clamped by the implementation), and
/// symbol lookup is a pure read.  The `Keymap` and `State` types are
/// whatever the backend hands out; the engine only stores and returns them.
pub trait KeymapBackend {
    type Keymap;
    type State;

    /// Compiles a keymap from the device's current server-side
    /// configuration.
    fn compile_keymap(&self, device: DeviceId) -> Result<Self::Keymap, String>;

    /// Builds a fresh state object bound to `keymap`, initialized from the
    /// device's current server-side state.
    fn build_state(&self, keymap: &Self::Keymap, device: DeviceId) -> Result<Self::State, String>;

    /// Applies a six-field mask to `state` in place.  Infallible by
    /// contract.
    fn apply_mask(&self, state: &mut Self::State, mask: &StateMask);

    /// Looks up the symbols `keycode` produces under `state`.
    fn symbols_for(&self, state: &Self::State, keycode: Keycode) -> SymbolSequence;
}

/// The compiled keymap plus the live state built from it.
///
/// Kept as one struct so the two can only be installed and dropped
/// together: a state must never outlive the keymap it was built from.
struct Pair<B: KeymapBackend> {
    keymap: B::Keymap,
    state: B::State,
}

/// One device's mirrored keymap and live state.
pub struct KeyboardMirror<B: KeymapBackend> {
    device_id: DeviceId,
    /// `None` only before the first successful rebuild.
    pair: Option<Pair<B>>,
}

impl<B: KeymapBackend> KeyboardMirror<B> {
    /// Creates an empty mirror bound to `device_id`.  No server requests
    /// are made until [`rebuild`](Self::rebuild).
    pub fn new(device_id: DeviceId) -> Self {
        Self {
            device_id,
            pair: None,
        }
    }

    /// The device this mirror is bound to.
    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    /// Returns `true` once a pair has been successfully built.
    pub fn is_ready(&self) -> bool {
        self.pair.is_some()
    }

    /// Compiles a fresh keymap and state from the device's current
    /// server-side configuration and installs them.
    ///
    /// On success the previous pair (if any) is released, strictly after
    /// both successors exist.  On failure the previous pair is left
    /// untouched and still installed; a keymap that was compiled before the
    /// state construction failed is released before returning.
    ///
    /// # Errors
    ///
    /// Returns [`RebuildError`] if keymap compilation or state construction
    /// fails.
    pub fn rebuild(&mut self, backend: &B) -> Result<Rebuilt, RebuildError> {
        let new_keymap =
            backend
                .compile_keymap(self.device_id)
                .map_err(|reason| RebuildError::Compile {
                    device: self.device_id,
                    reason,
                })?;

        let new_state = match backend.build_state(&new_keymap, self.device_id) {
            Ok(state) => state,
            Err(reason) => {
                // `new_keymap` is dropped here; the installed pair was
                // never touched.
                return Err(RebuildError::StateBuild {
                    device: self.device_id,
                    reason,
                });
            }
        };

        let outcome = if self.pair.is_some() {
            Rebuilt::Replaced
        } else {
            Rebuilt::Initial
        };

        // The old pair is dropped by this assignment, after both successors
        // are fully constructed.
        self.pair = Some(Pair {
            keymap: new_keymap,
            state: new_state,
        });

        if outcome == Rebuilt::Replaced {
            info!(device = %self.device_id, "keymap updated");
        }

        Ok(outcome)
    }

    /// Applies `mask` to the live state in place.  The keymap is not
    /// touched.  A mirror that has not completed its first rebuild has no
    /// state to patch; the call is a no-op then.
    pub fn patch(&mut self, backend: &B, mask: &StateMask) {
        if let Some(pair) = &mut self.pair {
            backend.apply_mask(&mut pair.state, mask);
        }
    }

    /// Translates `keycode` through the current state.  Pure read.
    ///
    /// Returns `None` before the first successful rebuild.
    pub fn translate(&self, backend: &B, keycode: Keycode) -> Option<SymbolSequence> {
        self.pair
            .as_ref()
            .map(|pair| backend.symbols_for(&pair.state, keycode))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
