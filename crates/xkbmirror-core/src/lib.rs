//! # xkbmirror-core
//!
//! Shared library for xkbmirror containing the protocol notification types,
//! the change-subscription category/part sets, and the keyboard domain types.
//!
//! This crate is used by the client application and by its test doubles.
//! It has zero dependencies on OS APIs, X11 libraries, or sockets.
//!
//! # Architecture overview (for beginners)
//!
//! xkbmirror keeps a local copy of the keyboard configuration that lives on
//! a remote input server: which symbols each physical key produces, and which
//! modifiers and layout group are currently active.  The server owns the
//! truth; the client subscribes to change notifications and keeps its copy in
//! step, so that every key press can be translated locally without a round
//! trip.
//!
//! This crate (`xkbmirror-core`) is the shared foundation.  It defines:
//!
//! - **`protocol`** – The shape of the server's change notifications: the
//!   three notification categories (keyboard replaced, map recompiled, state
//!   changed), their payloads, and the bitsets used to subscribe to them.
//!   The numeric values are the wire values of the XKB extension protocol.
//!
//! - **`domain`** – Pure value types with no OS dependencies: device
//!   identifiers, physical key codes, the six-field modifier/group state
//!   mask, and the symbolic output of a key translation.

// Declare the two top-level modules.  Rust will look for each in a
// subdirectory with the same name (e.g., src/protocol/mod.rs).
pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `xkbmirror_core::StateMask` instead of `xkbmirror_core::domain::mask::StateMask`.
pub use domain::device::DeviceId;
pub use domain::key::{Keycode, Symbol, SymbolSequence};
pub use domain::mask::StateMask;
pub use protocol::notify::{
    MapChangeNotify, NewKeyboardChange, NewKeyboardNotify, NotifyCategory, ProtocolError,
    StateChangeNotify, XkbNotify,
};
pub use protocol::subscription::{EventCategorySet, MapPartSet, SubscriptionSpec};
