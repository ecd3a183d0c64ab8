//! xkbmirror application entry point.
//!
//! Wires together the server connection, the mirror session, and the output
//! sink, then runs the blocking event loop.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config()              -- TOML config or defaults
//!  └─ X11Server::connect()       -- connection + XKB negotiation
//!  └─ Session::initialize()      -- first keymap build, then subscription
//!  └─ create_capture_window()    -- surface for key-press delivery
//!  └─ Session::run()             -- one blocking wait per event
//!       ├─ key press     -> translate through the mirror, print
//!       └─ notification  -> rebuild or patch the mirror
//! ```
//!
//! Exit status is 0 on any clean session end (sentinel key, Ctrl-C, server
//! gone) and nonzero on every initialization failure.  Resources acquired
//! before a failure are released in reverse acquisition order by drop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use xkbmirror_client::infrastructure::config::{self, AppConfig};

fn main() -> anyhow::Result<()> {
    let cfg = config::load_config()?;

    // Initialise structured logging.  Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cfg.session.log_level.clone())),
        )
        .init();

    info!("xkbmirror starting");

    // Interrupt flag shared with the signal handler; the session loop polls
    // it once per iteration.
    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&interrupted);
        ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))?;
    }

    run(&cfg, interrupted)
}

#[cfg(feature = "x11")]
fn run(cfg: &AppConfig, interrupted: Arc<AtomicBool>) -> anyhow::Result<()> {
    use xkbmirror_client::application::run_session::Session;
    use xkbmirror_client::infrastructure::output::StdoutSink;
    use xkbmirror_client::infrastructure::xkb::x11::X11Server;
    use xkbmirror_client::infrastructure::xkb::EventSource;
    use xkbmirror_core::Keycode;

    let server = X11Server::connect(cfg.server.display.as_deref())?;
    let device = server.core_keyboard();
    info!(device = %device, "connected; mirroring the core keyboard");

    let mut session = Session::new(
        &server,
        device,
        StdoutSink,
        Keycode(cfg.session.exit_keycode),
        interrupted,
    );
    session.initialize()?;
    server.create_capture_window()?;

    let events = server.start()?;
    let end = session.run(events);
    server.stop();

    info!(?end, stats = ?session.stats(), "session ended");
    Ok(())
}

#[cfg(not(feature = "x11"))]
fn run(_cfg: &AppConfig, _interrupted: Arc<AtomicBool>) -> anyhow::Result<()> {
    anyhow::bail!(
        "this build has no server backend; rebuild with `cargo build --features x11`"
    )
}
