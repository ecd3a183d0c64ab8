//! Keyboard server backends.
//!
//! A backend is one connection to an input server, seen through three
//! capability traits: `KeymapBackend` (compile/state/lookup, defined in the
//! application layer), `NotificationSubscriber` (register change interest),
//! and [`EventSource`] (deliver events).
//!
//! Events arrive over a plain `std::sync::mpsc` channel.  The real backend
//! blocks in the server's wait-for-event call on a dedicated reader thread
//! and forwards everything into the channel; the mock injects events
//! directly.  Either way the session loop's blocking `recv()` is the only
//! suspension point in the program, so events are processed strictly one at
//! a time in delivery order.

use std::sync::mpsc;

use xkbmirror_core::{Keycode, XkbNotify};

pub mod mock;

#[cfg(feature = "x11")]
pub mod x11;

/// One event delivered by the server connection.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A physical key was pressed.  The core-protocol key press carries no
    /// device identifier; key presses are scoped to the session's bound
    /// device.
    KeyPress {
        /// Physical key code.
        keycode: Keycode,
    },
    /// A keyboard change notification from the subscribed extension.
    Notify(XkbNotify),
    /// Any other event category; the session discards these.
    Unhandled,
}

/// Error type for event-source operations.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("event source has already been started")]
    AlreadyStarted,
    #[error("could not start the event reader thread: {0}")]
    ReaderSpawnFailed(String),
}

/// Trait abstracting server event delivery.
///
/// The production implementation pumps the server connection on a reader
/// thread; tests use [`mock::MockXkbServer`].
pub trait EventSource {
    /// Starts delivery and returns the receiving end of the event channel.
    /// The channel closes when the connection is lost or the source is
    /// stopped.
    fn start(&self) -> Result<mpsc::Receiver<ServerEvent>, SourceError>;

    /// Stops delivery and closes the channel.
    fn stop(&self);
}
