// File:    cancel.rs
// Author:  apezoo
// Date:    2026-10-18
//
// Description: Cooperative stop flag and running status shared with the shutdown observer.
//
// License:
// This project is licensed under the terms of the GNU AGPLv3 license.
// See the LICENSE.md file in the project root for full license information.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Default time a running transform is given to notice a stop request.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(2);

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A cheap, cloneable handle on the stop flag and the running flag.
///
/// Long-running loops call [`CancelToken::is_cancelled`] at every chunk
/// boundary. The shutdown observer calls [`CancelToken::stop_and_wait`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    stop: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates an idle, un-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the stop flag.
    pub fn cancel(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Whether a stop has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Whether a cancellable operation is in flight.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Marks an operation as running until the returned guard is dropped.
    #[must_use = "the operation is only marked running while the guard lives"]
    pub fn start(&self) -> RunningGuard {
        self.running.store(true, Ordering::SeqCst);
        RunningGuard {
            running: Arc::clone(&self.running),
        }
    }

    /// Raises the stop flag and waits at most `grace` for the running flag to clear.
    ///
    /// Returns `true` if the operation stopped within the grace period.
    pub fn stop_and_wait(&self, grace: Duration) -> bool {
        self.cancel();
        let deadline = Instant::now() + grace;
        while self.is_running() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(POLL_INTERVAL);
        }
        true
    }
}

/// Clears the running flag on drop.
#[derive(Debug)]
pub struct RunningGuard {
    running: Arc<AtomicBool>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
