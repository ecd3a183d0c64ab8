//! Application layer: use cases of the keyboard mirror.
//!
//! Everything here depends only on traits and `xkbmirror-core` types; the
//! concrete server connection is injected from the infrastructure layer.

pub mod dispatch_notify;
pub mod mirror_keymap;
pub mod run_session;
pub mod subscribe_events;
