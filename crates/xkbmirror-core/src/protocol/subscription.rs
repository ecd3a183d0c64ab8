//! Notification categories and keymap parts a client can subscribe to.
//!
//! A subscription is a single registration request carrying two bitsets:
//! which notification categories to deliver, and — for map-change
//! notifications — which keymap parts count as a change.  Both sets are
//! computed once at initialization and are immutable afterwards.

use serde::{Deserialize, Serialize};

/// Bitset of notification categories, using the wire's select-mask values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventCategorySet(pub u16);

impl EventCategorySet {
    /// Keyboard replaced / device detail changed.
    pub const NEW_KEYBOARD: u16 = 0x0001;
    /// Keymap recompiled on the server.
    pub const MAP_CHANGE: u16 = 0x0002;
    /// Modifier/group state changed.
    pub const STATE_CHANGE: u16 = 0x0004;

    /// An empty set.
    pub const fn empty() -> Self {
        EventCategorySet(0)
    }

    /// Returns `true` if every bit of `bits` is present in the set.
    pub const fn contains(&self, bits: u16) -> bool {
        self.0 & bits == bits
    }
}

impl std::ops::BitOr for EventCategorySet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        EventCategorySet(self.0 | rhs.0)
    }
}

/// Bitset of keymap parts, using the wire's map-part values.
///
/// These select which kinds of server-side map edits produce a map-change
/// notification at all; the client treats any delivered map change as a
/// total rebuild trigger regardless of which part bit fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MapPartSet(pub u16);

impl MapPartSet {
    pub const KEY_TYPES: u16 = 0x0001;
    pub const KEY_SYMS: u16 = 0x0002;
    pub const MODIFIER_MAP: u16 = 0x0004;
    pub const EXPLICIT_COMPONENTS: u16 = 0x0008;
    pub const KEY_ACTIONS: u16 = 0x0010;
    pub const KEY_BEHAVIORS: u16 = 0x0020;
    pub const VIRTUAL_MODS: u16 = 0x0040;
    pub const VIRTUAL_MOD_MAP: u16 = 0x0080;

    /// An empty set.
    pub const fn empty() -> Self {
        MapPartSet(0)
    }

    /// Returns `true` if every bit of `bits` is present in the set.
    pub const fn contains(&self, bits: u16) -> bool {
        self.0 & bits == bits
    }
}

impl std::ops::BitOr for MapPartSet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        MapPartSet(self.0 | rhs.0)
    }
}

/// The (category set, map-part set) pair registered with the server for one
/// device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionSpec {
    /// Notification categories to deliver.
    pub categories: EventCategorySet,
    /// Keymap parts whose change counts as a map change.
    pub map_parts: MapPartSet,
}

impl SubscriptionSpec {
    /// The minimal subscription a mirror needs to stay correct.
    ///
    /// All three categories are required: keyboard-replaced and map-change
    /// notifications drive keymap rebuilds, state-change notifications
    /// drive in-place patches.  The map-part set covers everything that can
    /// invalidate compiled symbol tables — key types, key symbols, modifier
    /// maps, explicit components, key actions, virtual modifiers, and
    /// virtual-modifier maps.  Key behaviors are the one part left out:
    /// they do not affect symbol lookup.
    pub const fn required() -> Self {
        SubscriptionSpec {
            categories: EventCategorySet(
                EventCategorySet::NEW_KEYBOARD
                    | EventCategorySet::MAP_CHANGE
                    | EventCategorySet::STATE_CHANGE,
            ),
            map_parts: MapPartSet(
                MapPartSet::KEY_TYPES
                    | MapPartSet::KEY_SYMS
                    | MapPartSet::MODIFIER_MAP
                    | MapPartSet::EXPLICIT_COMPONENTS
                    | MapPartSet::KEY_ACTIONS
                    | MapPartSet::VIRTUAL_MODS
                    | MapPartSet::VIRTUAL_MOD_MAP,
            ),
        }
    }
}
