// File:    shutdown.rs
// Author:  apezoo
// Date:    2026-10-18
//
// Description: Ctrl-C and termination handling: stops a running transform within a grace period, then exits.
//
// License:
// This project is licensed under the terms of the GNU AGPLv3 license.
// See the LICENSE.md file in the project root for full license information.

use std::io;
use std::process;
use std::thread;

use log::{error, warn};
use otpcrypt_core::cancel::{CancelToken, DEFAULT_GRACE};
use tokio::runtime::Builder;

const INTERRUPTED: &str = "User Interrupted...";
const TERMINATED: &str = "Termination requested...";

/// Starts a watcher thread that waits for Ctrl-C or a termination request.
///
/// On either signal a running operation is asked to stop and given
/// [`DEFAULT_GRACE`] to do so; the process then exits with status 1.
///
/// # Errors
///
/// Returns an error if the runtime cannot be built, the handlers cannot be
/// registered, or the thread cannot be spawned.
pub(crate) fn install(cancel: CancelToken) -> io::Result<()> {
    let runtime = Builder::new_current_thread().enable_all().build()?;
    let mut signals = {
        let _context = runtime.enter();
        Signals::register()?
    };
    thread::Builder::new().name("shutdown".to_owned()).spawn(move || {
        match runtime.block_on(signals.next()) {
            Ok(reason) => stop(&cancel, reason),
            Err(e) => warn!("Signal handling unavailable: {e}"),
        }
    })?;
    Ok(())
}

#[cfg(unix)]
struct Signals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn register() -> io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    async fn next(&mut self) -> io::Result<&'static str> {
        tokio::select! {
            _ = self.interrupt.recv() => Ok(INTERRUPTED),
            _ = self.terminate.recv() => Ok(TERMINATED),
        }
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    #[allow(clippy::unnecessary_wraps)]
    const fn register() -> io::Result<Self> {
        Ok(Self)
    }

    #[allow(clippy::unused_self)]
    async fn next(&mut self) -> io::Result<&'static str> {
        tokio::signal::ctrl_c().await.map(|()| INTERRUPTED)
    }
}

fn stop(cancel: &CancelToken, reason: &str) -> ! {
    if cancel.is_running() {
        warn!("{reason}");
        if !cancel.stop_and_wait(DEFAULT_GRACE) {
            error!("Operation did not stop within {} seconds", DEFAULT_GRACE.as_secs());
        }
    }
    crate::logging::flush();
    process::exit(1);
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn termination_request_is_observed() {
        let runtime = Builder::new_current_thread().enable_all().build().unwrap();
        let mut signals = {
            let _context = runtime.enter();
            Signals::register().unwrap()
        };
        let status = Command::new("kill")
            .args(["-TERM", &process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());
        assert_eq!(runtime.block_on(signals.next()).unwrap(), TERMINATED);
    }
}
