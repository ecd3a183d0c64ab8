//! The interactive session: one blocking event loop over one keyboard.
//!
//! Each iteration pulls exactly one event from the server connection — the
//! blocking `recv()` is the only suspension point in the program — and
//! processes it to completion before the next is considered:
//!
//! - a key press is translated through the mirrored state and forwarded to
//!   the output sink; the sentinel key (escape by default) additionally
//!   requests cooperative termination,
//! - a keyboard change notification goes to the dispatcher,
//! - anything else is discarded.
//!
//! Because processing is strictly sequential, a key press delivered after a
//! map-change notification always observes the rebuilt pair, never a stale
//! or half-built one.
//!
//! Termination is cooperative: the sentinel key sets a session-owned flag
//! that the loop checks once per iteration, and an external interrupt
//! (Ctrl-C) sets a shared flag checked at the same point.  At most one more
//! event is processed after either flag is raised.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, trace};

use xkbmirror_core::{DeviceId, Keycode, SymbolSequence};

use crate::application::dispatch_notify::{DispatchOutcome, MirrorRegistry};
use crate::application::mirror_keymap::{KeymapBackend, RebuildError};
use crate::application::subscribe_events::{subscribe_keyboard, NotificationSubscriber, SubscribeError};
use crate::infrastructure::xkb::ServerEvent;

/// External output sink for translated key presses.
pub trait SymbolSink {
    /// Forwards one translated key press.
    fn emit(&mut self, keycode: Keycode, symbols: &SymbolSequence);
}

/// Error type for session initialization.  Everything here is fatal: the
/// caller tears the session down and exits nonzero.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("initial keymap build failed: {0}")]
    InitialBuild(#[from] RebuildError),
    #[error("notification subscription failed: {0}")]
    Subscribe(#[from] SubscribeError),
}

/// How the session ended.  All variants are clean exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The sentinel key was pressed.
    SentinelKey,
    /// The external interrupt flag was raised.
    Interrupted,
    /// The event source closed its channel.
    SourceClosed,
}

/// Counters over one session, for diagnostics and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    /// Key presses translated and forwarded to the sink.
    pub keys_translated: u64,
    /// Keymap rebuilds performed in response to notifications.
    pub rebuilds: u64,
    /// Rebuilds that failed and were swallowed.
    pub rebuild_failures: u64,
    /// In-place state patches applied.
    pub patches: u64,
    /// Notifications dropped by device-scope or detail filtering.
    pub ignored_notifications: u64,
    /// Events of categories the session does not handle.
    pub discarded_events: u64,
}

/// One interactive mirror session bound to a single keyboard device.
///
/// The session borrows its backend: the connection outlives the session and
/// is also the event source the caller pulls the receiver from.
pub struct Session<'a, B, K>
where
    B: KeymapBackend + NotificationSubscriber,
    K: SymbolSink,
{
    backend: &'a B,
    registry: MirrorRegistry<B>,
    device_id: DeviceId,
    sink: K,
    sentinel: Keycode,
    /// Session-owned termination flag, set on the sentinel key.
    terminate: bool,
    /// Shared flag raised by the external signal handler.
    interrupted: Arc<AtomicBool>,
    stats: SessionStats,
}

impl<'a, B, K> Session<'a, B, K>
where
    B: KeymapBackend + NotificationSubscriber,
    K: SymbolSink,
{
    /// Creates an uninitialized session for `device_id`.
    pub fn new(
        backend: &'a B,
        device_id: DeviceId,
        sink: K,
        sentinel: Keycode,
        interrupted: Arc<AtomicBool>,
    ) -> Self {
        Self {
            backend,
            registry: MirrorRegistry::new(),
            device_id,
            sink,
            sentinel,
            terminate: false,
            interrupted,
            stats: SessionStats::default(),
        }
    }

    /// Builds the initial keymap/state pair, then registers for change
    /// notifications.
    ///
    /// The order matters: if the initial build fails, no subscription
    /// request is ever issued.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`]; both variants are fatal and the session
    /// must be dropped (resources are released by RAII in reverse
    /// acquisition order).
    pub fn initialize(&mut self) -> Result<(), SessionError> {
        let mirror = self.registry.register(self.device_id);
        mirror.rebuild(self.backend)?;
        subscribe_keyboard(self.backend, self.device_id)?;
        debug!(device = %self.device_id, "keyboard mirror initialized");
        Ok(())
    }

    /// Runs the event loop until a termination condition is met.
    pub fn run(&mut self, events: Receiver<ServerEvent>) -> SessionEnd {
        loop {
            if self.terminate {
                return SessionEnd::SentinelKey;
            }
            if self.interrupted.load(Ordering::Relaxed) {
                info!("interrupt received; ending session");
                return SessionEnd::Interrupted;
            }
            match events.recv() {
                Ok(event) => self.process(event),
                Err(_) => {
                    info!("event source closed; ending session");
                    return SessionEnd::SourceClosed;
                }
            }
        }
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// The device this session is bound to.
    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    fn process(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::KeyPress { keycode } => self.on_key_press(keycode),
            ServerEvent::Notify(notify) => {
                match self.registry.dispatch(self.backend, &notify) {
                    DispatchOutcome::Rebuilt => self.stats.rebuilds += 1,
                    DispatchOutcome::Patched => self.stats.patches += 1,
                    DispatchOutcome::RebuildFailed => self.stats.rebuild_failures += 1,
                    DispatchOutcome::Ignored => self.stats.ignored_notifications += 1,
                }
            }
            ServerEvent::Unhandled => {
                trace!("discarding unhandled event");
                self.stats.discarded_events += 1;
            }
        }
    }

    fn on_key_press(&mut self, keycode: Keycode) {
        let translated = self
            .registry
            .get(self.device_id)
            .and_then(|mirror| mirror.translate(self.backend, keycode));
        if let Some(symbols) = translated {
            self.sink.emit(keycode, &symbols);
            self.stats.keys_translated += 1;
        }

        // Termination is requested, not performed: the loop observes the
        // flag on its next iteration.
        if keycode == self.sentinel {
            info!(keycode = %keycode, "sentinel key pressed; requesting termination");
            self.terminate = true;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
