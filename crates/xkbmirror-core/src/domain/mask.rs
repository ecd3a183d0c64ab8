//! The six-field modifier/group state mask.

use serde::{Deserialize, Serialize};

/// A complete snapshot of a keyboard's live modifier and group status, as
/// carried by state-change notifications and fed to the state-update
/// operation.
///
/// The six fields are the wire protocol's shape, reproduced exactly:
/// base/latched/locked modifier masks and base/latched/locked group.  On the
/// wire the modifier masks are 8-bit core masks and the base/latched groups
/// are signed 16-bit deltas; they are widened here to the types the
/// state-update contract takes, so a backend can pass them straight through.
///
/// Applying a mask is absolute, not cumulative: the mask fully describes the
/// new state, so applying the same mask twice is the same as applying it
/// once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StateMask {
    /// Modifiers held down right now.
    pub base_mods: u32,
    /// Modifiers latched until the next key press.
    pub latched_mods: u32,
    /// Modifiers locked until explicitly unlocked (e.g. Caps Lock).
    pub locked_mods: u32,
    /// Group in effect from keys held down.
    pub base_group: i32,
    /// Group latched until the next key press.
    pub latched_group: i32,
    /// Group locked until explicitly changed.
    pub locked_group: i32,
}

impl StateMask {
    /// Returns `true` when no modifier is active and group zero is in
    /// effect — the state of an untouched keyboard.
    pub fn is_neutral(&self) -> bool {
        *self == StateMask::default()
    }

    /// The effective modifier mask: base, latched and locked combined.
    pub fn effective_mods(&self) -> u32 {
        self.base_mods | self.latched_mods | self.locked_mods
    }
}
