//! Cooperative Shutdown and Reload Control
//!
//! The service is single threaded. The only asynchronous inputs are the
//! process signals, which do nothing but store into atomics. The loop
//! observes the flags at its checkpoints and after every wait.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

/// Granularity of the interruptible sleep. A wait never overshoots a
/// shutdown request by more than this.
const WAIT_SLICE: Duration = Duration::from_millis(100);

/// Shutdown and reload request flags shared with the signal handlers.
#[derive(Debug, Clone)]
pub struct Control {
    pub shutdown: Arc<AtomicBool>,
    pub reload: Arc<AtomicBool>,
}

impl Default for Control {
    fn default() -> Self {
        Self::new()
    }
}

impl Control {
    pub fn new() -> Self {
        Self {
            shutdown: Arc::new(AtomicBool::new(false)),
            reload: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether graceful termination has been requested.
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Request graceful termination.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Request a configuration reload.
    pub fn request_reload(&self) {
        self.reload.store(true, Ordering::SeqCst);
    }

    /// Consume a pending reload request. Multiple requests raised before
    /// this call coalesce into a single reload.
    pub fn take_reload(&self) -> bool {
        self.reload.swap(false, Ordering::SeqCst)
    }

    /// Sleep for `duration`, returning early as soon as shutdown is
    /// requested. Returns `true` if shutdown was requested.
    ///
    /// # Arguments
    ///
    /// * `duration` - The pause to apply (pacing delay or backoff).
    ///
    pub fn wait(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.shutdown_requested() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return self.shutdown_requested();
            }
            let remaining = deadline - now;
            std::thread::sleep(remaining.min(WAIT_SLICE));
        }
    }
}

// Flags reachable from the signal handlers. Handlers must not allocate,
// lock or log; they only store into these atomics.
static SHUTDOWN_FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();
static RELOAD_FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();

extern "C" fn handle_terminate(_signum: libc::c_int) {
    if let Some(flag) = SHUTDOWN_FLAG.get() {
        flag.store(true, Ordering::SeqCst);
    }
}

extern "C" fn handle_reload(_signum: libc::c_int) {
    if let Some(flag) = RELOAD_FLAG.get() {
        flag.store(true, Ordering::SeqCst);
    }
}

/// Wire SIGTERM/SIGINT to the shutdown flag and SIGHUP to the reload flag.
pub fn install_signal_handlers(control: &Control) {
    let _ = SHUTDOWN_FLAG.set(control.shutdown.clone());
    let _ = RELOAD_FLAG.set(control.reload.clone());
    unsafe {
        libc::signal(
            libc::SIGTERM,
            handle_terminate as extern "C" fn(libc::c_int) as libc::sighandler_t,
        );
        libc::signal(
            libc::SIGINT,
            handle_terminate as extern "C" fn(libc::c_int) as libc::sighandler_t,
        );
        libc::signal(
            libc::SIGHUP,
            handle_reload as extern "C" fn(libc::c_int) as libc::sighandler_t,
        );
    }
}
