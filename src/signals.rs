//! Cheap, polling‑based termination signal handling (lock‑free).

use std::sync::atomic::{AtomicI32, Ordering};

static RECEIVED_SIGNAL: AtomicI32 = AtomicI32::new(0);

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        pub fn install_signal_handlers() -> anyhow::Result<()> {
            use nix::sys::signal::{self, Signal};
            extern "C" fn handler(sig: i32) {
                RECEIVED_SIGNAL.store(sig, Ordering::SeqCst);
            }
            let action = signal::SigAction::new(
                signal::SigHandler::Handler(handler),
                signal::SaFlags::empty(),
                signal::SigSet::empty(),
            );
            for sig in [Signal::SIGINT, Signal::SIGTERM] {
                unsafe { signal::sigaction(sig, &action) }
                    .map_err(|e| anyhow::anyhow!("Failed to register {sig} handler: {e}"))?;
            }
            Ok(())
        }

        fn signal_name(sig: i32) -> String {
            nix::sys::signal::Signal::try_from(sig)
                .map(|s| s.to_string())
                .unwrap_or_else(|_| format!("signal {sig}"))
        }
    } else {
        /// Ctrl‑C on Windows keeps its default behaviour.
        pub fn install_signal_handlers() -> anyhow::Result<()> {
            Ok(())
        }

        fn signal_name(sig: i32) -> String {
            format!("signal {sig}")
        }
    }
}

/// Non‑blocking check – returns the signal name once per delivery.
pub fn take_signal() -> Option<String> {
    match RECEIVED_SIGNAL.swap(0, Ordering::AcqRel) {
        0 => None,
        sig => Some(signal_name(sig)),
    }
}
