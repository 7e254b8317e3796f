//! Graceful shutdown via a process-wide atomic flag.
//!
//! Workers check the flag between records; a second signal force-exits.

use std::sync::atomic::{AtomicBool, Ordering};

static FLAG: AtomicBool = AtomicBool::new(false);

pub fn shutdown_requested() -> bool {
    FLAG.load(Ordering::Relaxed)
}

pub fn trigger_shutdown() {
    FLAG.store(true, Ordering::Relaxed);
}

/// Register SIGINT/SIGTERM handlers: first signal requests graceful
/// shutdown, a second one exits immediately with 130.
pub fn install_signal_handlers() {
    // SAFETY: AtomicBool::swap and process::exit are async-signal-safe
    unsafe {
        for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
            signal_hook::low_level::register(signal, || {
                if FLAG.swap(true, Ordering::Relaxed) {
                    std::process::exit(130);
                }
            })
            .expect("failed to register signal handler");
        }
    }
}
