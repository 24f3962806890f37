//! Signal handling for graceful shutdown.
//!
//! Centralized Ctrl+C handling: an `AtomicBool` flag shared across threads
//! signals that shutdown was requested. The metadata loader and the rename
//! engine check the flag between files, so an interrupt never leaves a
//! file half-renamed; it just stops the batch at the next boundary.
//!
//! The handler also force-kills any live extractor subprocess
//! ([`crate::metadata::force_cleanup_all`]) so an interrupt cannot leak
//! `exiftool` processes.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Exit code for SIGINT (Ctrl+C) interruption: 128 + signal number.
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

/// Shared shutdown flag with convenience accessors.
///
/// `Send + Sync`; clone freely and hand [`ShutdownHandler::get_flag`] to
/// worker code.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandler {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandler {
    /// Create a handler with no shutdown requested.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether shutdown has been requested.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Manually request a shutdown.
    pub fn request_shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// The underlying flag, for passing into loader/engine options.
    #[must_use]
    pub fn get_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }
}

/// Install the Ctrl+C handler and return the shared [`ShutdownHandler`].
///
/// On signal: the flag is set, a short notice goes to stderr, and any
/// live extractor process is killed. The application is expected to
/// observe the flag and exit with [`EXIT_CODE_INTERRUPTED`].
pub fn install_handler() -> anyhow::Result<ShutdownHandler> {
    let handler = ShutdownHandler::new();
    let flag = handler.get_flag();

    ctrlc::set_handler(move || {
        if flag.swap(true, Ordering::SeqCst) {
            // Second interrupt: the user really means it
            let _ = writeln!(std::io::stderr(), "Force exit.");
            crate::metadata::force_cleanup_all();
            std::process::exit(EXIT_CODE_INTERRUPTED);
        }
        let _ = writeln!(std::io::stderr(), "Interrupted. Finishing current file...");
        crate::metadata::force_cleanup_all();
    })?;

    Ok(handler)
}
