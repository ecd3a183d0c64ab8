//! Typed keyboard change notifications.
//!
//! The server reports three kinds of change, distinguished by a
//! protocol-level category tag.  Together the keyboard-replaced and
//! map-change categories capture every sort of keymap update (remapping
//! tools, recompilation, device replacement) while the state-change
//! category carries the live modifier/group mask — so a client needs
//! nothing else to stay in sync.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::device::DeviceId;
use crate::domain::mask::StateMask;
use crate::protocol::subscription::MapPartSet;

/// Error for unrecognized wire values in this module.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The category select-mask value is not one of the three known
    /// categories.
    #[error("unknown notification category: {0:#06x}")]
    UnknownCategory(u16),
}

// ── Notification categories ───────────────────────────────────────────────────

/// The protocol-level category tag of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotifyCategory {
    /// The keyboard device was replaced or a device detail changed.
    NewKeyboard,
    /// The keymap was recompiled on the server.
    MapChange,
    /// The modifier/group state changed.
    StateChange,
}

impl NotifyCategory {
    /// The wire select-mask value used to subscribe to this category.
    pub const fn select_mask(self) -> u16 {
        match self {
            NotifyCategory::NewKeyboard => 0x0001,
            NotifyCategory::MapChange => 0x0002,
            NotifyCategory::StateChange => 0x0004,
        }
    }
}

impl TryFrom<u16> for NotifyCategory {
    type Error = ProtocolError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0x0001 => Ok(NotifyCategory::NewKeyboard),
            0x0002 => Ok(NotifyCategory::MapChange),
            0x0004 => Ok(NotifyCategory::StateChange),
            other => Err(ProtocolError::UnknownCategory(other)),
        }
    }
}

// ── Per-category payloads ─────────────────────────────────────────────────────

/// Detail bits of a keyboard-replaced notification, using the wire values.
///
/// Only [`NewKeyboardChange::KEYCODES`] matters to a mirror: a replacement
/// that did not change key-code assignments cannot invalidate the compiled
/// keymap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewKeyboardChange(pub u16);

impl NewKeyboardChange {
    /// Key-code assignments changed — the compiled keymap is stale.
    pub const KEYCODES: u16 = 0x0001;
    /// Physical geometry changed.
    pub const GEOMETRY: u16 = 0x0002;
    /// The device identifier itself changed.
    pub const DEVICE_ID: u16 = 0x0004;

    /// Returns `true` if every bit of `bits` is present.
    pub const fn contains(&self, bits: u16) -> bool {
        self.0 & bits == bits
    }
}

/// The keyboard device was replaced or one of its details changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewKeyboardNotify {
    /// Device the notification is about.
    pub device_id: DeviceId,
    /// Which details changed.
    pub changed: NewKeyboardChange,
}

/// The keymap was recompiled on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapChangeNotify {
    /// Device the notification is about.
    pub device_id: DeviceId,
    /// Which map parts changed.  Carried for completeness; the mirror
    /// treats any map change as a total rebuild trigger and never patches
    /// map content piecewise.
    pub changed_parts: MapPartSet,
}

/// The live modifier/group state changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChangeNotify {
    /// Device the notification is about.
    pub device_id: DeviceId,
    /// The complete new state.
    pub mask: StateMask,
}

// ── The notification sum type ─────────────────────────────────────────────────

/// An inbound keyboard change notification, already decoded from the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum XkbNotify {
    NewKeyboard(NewKeyboardNotify),
    MapChange(MapChangeNotify),
    StateChange(StateChangeNotify),
}

impl XkbNotify {
    /// The device this notification is scoped to.
    pub fn device_id(&self) -> DeviceId {
        match self {
            XkbNotify::NewKeyboard(n) => n.device_id,
            XkbNotify::MapChange(n) => n.device_id,
            XkbNotify::StateChange(n) => n.device_id,
        }
    }

    /// The protocol-level category tag.
    pub fn category(&self) -> NotifyCategory {
        match self {
            XkbNotify::NewKeyboard(_) => NotifyCategory::NewKeyboard,
            XkbNotify::MapChange(_) => NotifyCategory::MapChange,
            XkbNotify::StateChange(_) => NotifyCategory::StateChange,
        }
    }
}
