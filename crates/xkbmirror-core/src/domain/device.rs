//! Server-assigned keyboard device identifier.

use serde::{Deserialize, Serialize};

/// Identifies one keyboard device on the input server.
///
/// The value is assigned by the server and is opaque to the client: it is
/// only ever compared for equality, to scope incoming notifications to the
/// device the mirror is bound to.  The server reports `-1` when no core
/// keyboard device exists; that value never reaches the engine (device
/// resolution turns it into an error first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub i32);

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for DeviceId {
    fn from(raw: i32) -> Self {
        DeviceId(raw)
    }
}
