//! The shape of the server's keyboard change-notification protocol.
//!
//! xkbmirror does not define a wire format of its own — it consumes the XKB
//! extension's notification protocol.  This module reproduces that
//! protocol's shape: the three notification categories with their exact
//! select-mask wire values, the typed payloads the dispatcher classifies,
//! and the category/map-part bitsets used to register interest.

pub mod notify;
pub mod subscription;
