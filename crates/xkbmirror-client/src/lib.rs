//! xkbmirror-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does xkbmirror do? (for beginners)
//!
//! The input server owns the keyboard: which layout is loaded, which
//! modifiers are held, latched, or locked.  A client that wants to turn raw
//! key-press codes into symbols needs its own copy of that configuration,
//! and the copy goes stale the moment the user switches layouts or presses
//! Shift.  xkbmirror keeps the copy fresh:
//!
//! 1. Compiles a local keymap and state object for the server's core
//!    keyboard device.
//! 2. Subscribes to the three change-notification categories (keyboard
//!    replaced, map recompiled, state changed).
//! 3. Reacts to each notification: a full keymap rebuild where symbol
//!    tables may have changed, an in-place state patch where only the
//!    modifier/group mask moved.
//! 4. Translates every incoming key press through the mirrored state and
//!    prints the resulting keysyms, until the escape key ends the session.

/// Application layer: the synchronization engine and session loop.
pub mod application;

/// Infrastructure layer: server backends, configuration, and output.
pub mod infrastructure;
