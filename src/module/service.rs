//! Capture Service Loop
//!
//! The heart of the daemon: a single-threaded loop that opens the
//! camera, paces itself with the time-of-day schedule, persists frames
//! through the store, and recovers from every failure by backing off
//! and retrying. The loop only ends when shutdown is requested; no
//! camera or filesystem condition terminates the process.

use chrono::Local;
use rand::Rng;
use std::collections::VecDeque;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use super::control::Control;
use super::define;
use super::schedule::ScheduleTable;
use super::store::{self, SaveOutcome};
use super::util::conf;
use super::util::init::Property;
use super::vision::camera::{self, Device};
use super::vision::frame::Frame;
use super::{disk, health};

/// Mutable state the loop carries across cycles and device reopens.
#[derive(Debug)]
pub struct ServiceState {
    /// Identifier of this boot, `<epoch>-<suffix>`.
    pub boot_id: String,
    pub consecutive_init_failures: u32,
    pub consecutive_read_failures: u32,
    pub consecutive_imwrite_failures: u32,
    /// Cleanup batches run since boot.
    pub disk_cleanup_batches: u64,
    /// Last frame that passed the similarity gate, pre-stamp.
    pub last_significant_frame: Option<Frame>,
    /// Rolling capture latency window, seconds.
    latencies: VecDeque<f64>,
    pub last_saved_path: Option<String>,
    /// FOURCC of the open device, empty while none is open.
    pub effective_fourcc: String,
}

impl Default for ServiceState {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceState {
    pub fn new() -> Self {
        Self {
            boot_id: new_boot_id(),
            consecutive_init_failures: 0,
            consecutive_read_failures: 0,
            consecutive_imwrite_failures: 0,
            disk_cleanup_batches: 0,
            last_significant_frame: None,
            latencies: VecDeque::with_capacity(define::health::LATENCY_WINDOW),
            last_saved_path: None,
            effective_fourcc: String::new(),
        }
    }

    /// Record one capture latency, dropping the oldest past the window.
    pub fn push_latency(&mut self, seconds: f64) {
        if self.latencies.len() == define::health::LATENCY_WINDOW {
            self.latencies.pop_front();
        }
        self.latencies.push_back(seconds);
    }

    /// Mean latency over the window, `None` before the first sample.
    pub fn avg_latency(&self) -> Option<f64> {
        if self.latencies.is_empty() {
            return None;
        }
        Some(self.latencies.iter().sum::<f64>() / self.latencies.len() as f64)
    }
}

/// Boot identifier: epoch seconds plus a random suffix so two boots in
/// the same second still differ.
fn new_boot_id() -> String {
    let epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let suffix: u16 = rand::thread_rng().gen_range(0..10_000);
    format!("{}-{:04}", epoch, suffix)
}

/// Run the capture service until shutdown is requested.
///
/// # Arguments
///
/// * `property` - Resolved paths and configuration; mutated on reload.
/// * `control` - Shutdown and reload flags wired to the signal handlers.
///
pub fn run(property: &mut Property, control: &Control) {
    let mut state = ServiceState::new();
    let mut schedule = ScheduleTable::from_conf(&property.conf.capture_schedule);
    // None means "due now": the first pass checks the disk and reports
    // health before any capture.
    let mut last_disk_check: Option<Instant> = None;
    let mut last_heartbeat: Option<Instant> = None;

    log::info!(
        "Service starting (boot {}). Schedule: {}",
        state.boot_id,
        schedule.describe()
    );

    while !control.shutdown_requested() {
        let device = match camera::open(&property.conf.camera, control) {
            Ok(device) => device,
            Err(camera::DeviceError::ShutdownRequested) => break,
            Err(e) => {
                state.consecutive_init_failures += 1;
                log::error!(
                    "Camera initialization failed ({} consecutive): {}",
                    state.consecutive_init_failures,
                    e
                );
                if state.consecutive_init_failures >= define::backoff::INIT_FAILURE_MAX_CONSECUTIVE
                {
                    log::error!(
                        "Sustained camera failure; backing off {}s.",
                        define::backoff::INIT_LONG_BACKOFF.as_secs()
                    );
                    state.consecutive_init_failures = 0;
                    control.wait(define::backoff::INIT_LONG_BACKOFF);
                } else {
                    control.wait(define::backoff::INIT_RETRY_DELAY);
                }
                continue;
            }
        };
        state.consecutive_init_failures = 0;
        state.effective_fourcc = device.effective_fourcc.clone();

        capture_cycles(
            property,
            control,
            &mut state,
            &mut schedule,
            device,
            &mut last_disk_check,
            &mut last_heartbeat,
        );
        state.effective_fourcc = String::new();
    }

    log::info!("Service stopped (boot {}).", state.boot_id);
}

/// Run capture cycles on an open device until shutdown is requested, a
/// read fails, or a reload changes the camera parameters. Every read
/// failure releases the handle, so recovery always goes through a full
/// reopen. The device is always closed before returning; the outer loop
/// decides whether to reopen.
#[allow(clippy::too_many_arguments)]
fn capture_cycles(
    property: &mut Property,
    control: &Control,
    state: &mut ServiceState,
    schedule: &mut ScheduleTable,
    device: Device,
    last_disk_check: &mut Option<Instant>,
    last_heartbeat: &mut Option<Instant>,
) {
    let mut cycle_start = Instant::now();

    loop {
        if control.shutdown_requested() {
            device.close();
            return;
        }

        if control.take_reload() {
            match apply_reload(property, schedule) {
                ReloadOutcome::CameraChanged => {
                    log::info!("Camera configuration changed; reopening the device.");
                    device.close();
                    return;
                }
                ReloadOutcome::Applied => {
                    // Pace against the new schedule from a fresh origin.
                    cycle_start = Instant::now();
                }
                // A rejected file changes nothing, pacing included.
                ReloadOutcome::Failed => {}
            }
        }

        if is_due(
            last_disk_check,
            Duration::from_secs(property.conf.disk_management.check_interval_seconds),
        ) {
            let batches = disk::check_and_manage(&property.conf, control);
            state.disk_cleanup_batches += batches as u64;
            *last_disk_check = Some(Instant::now());
        }

        // Pace the cycle: the interval covers capture plus processing.
        let current_interval = schedule.interval_for(Local::now().time());
        let elapsed = cycle_start.elapsed();
        if elapsed < current_interval && control.wait(current_interval - elapsed) {
            device.close();
            return;
        }
        cycle_start = Instant::now();

        // Drain stale driver buffers so the frame matches "now".
        for _ in 0..define::camera::DISCARD_FRAMES {
            device.grab();
        }

        let read_start = Instant::now();
        match device.read() {
            Ok(frame) => {
                state.consecutive_read_failures = 0;
                state.push_latency(read_start.elapsed().as_secs_f64());

                let now = Local::now();
                match store::save_frame(state, frame, &property.conf, now) {
                    SaveOutcome::Saved(path) => {
                        log::debug!("Saved {}", path);
                        state.last_saved_path = Some(path);
                    }
                    SaveOutcome::Similar => {
                        log::debug!("Frame unchanged; skipped.");
                    }
                    SaveOutcome::Failed => {
                        if let Some(backoff) = write_failure_backoff(state, &property.conf) {
                            log::error!(
                                "Write failure budget exhausted; running disk cleanup and backing off {}s.",
                                backoff.as_secs()
                            );
                            disk::check_and_manage(&property.conf, control);
                            if control.wait(backoff) {
                                device.close();
                                return;
                            }
                        }
                    }
                }
            }
            Err(e) => {
                let plan = register_read_failure(state);
                if plan.log_as_error {
                    log::error!(
                        "Frame read failed ({} consecutive): {}",
                        plan.failure_count,
                        e
                    );
                }
                if plan.sustained {
                    log::error!(
                        "Sustained read failure; backing off {}s before reopening.",
                        plan.backoff.as_secs()
                    );
                }
                // The handle may be dead; a fresh open after the backoff
                // is the only recovery that also survives re-enumeration.
                device.close();
                control.wait(plan.backoff);
                return;
            }
        }

        if is_due(last_heartbeat, define::health::HEARTBEAT_INTERVAL) {
            health::log_heartbeat(state, &property.conf, current_interval.as_secs_f64());
            health::dump_snapshot(state, &property.conf, current_interval.as_secs_f64());
            *last_heartbeat = Some(Instant::now());
        }
    }
}

/// How the loop responds to one failed read. The device is always
/// released before the backoff; only logging and duration vary.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ReadFailurePlan {
    /// Ordinal of this failure in the consecutive run.
    failure_count: u32,
    /// Whether this failure is logged at error level (throttled).
    log_as_error: bool,
    /// Whether the run hit the threshold; the counter was reset.
    sustained: bool,
    backoff: Duration,
}

/// Register one failed read against the consecutive counter and decide
/// the backoff: the short retry delay below the threshold, the long one
/// (with a counter reset) at it. Only the first failure of a run and
/// every Nth after it are logged at error level.
fn register_read_failure(state: &mut ServiceState) -> ReadFailurePlan {
    let log_as_error = state.consecutive_read_failures % define::backoff::READ_LOG_EVERY_N == 0;
    state.consecutive_read_failures += 1;
    let failure_count = state.consecutive_read_failures;

    if failure_count >= define::backoff::READ_FAILURE_MAX_CONSECUTIVE {
        state.consecutive_read_failures = 0;
        ReadFailurePlan {
            failure_count,
            log_as_error,
            sustained: true,
            backoff: define::backoff::READ_LONG_BACKOFF,
        }
    } else {
        ReadFailurePlan {
            failure_count,
            log_as_error,
            sustained: false,
            backoff: define::backoff::READ_RETRY_DELAY,
        }
    }
}

/// Check the write-failure budget. When exhausted, reset it, account one
/// cleanup batch of the configured size, and return the backoff to apply
/// after the cleanup runs. `None` while the budget still has room.
fn write_failure_backoff(state: &mut ServiceState, conf: &conf::Config) -> Option<Duration> {
    if state.consecutive_imwrite_failures < conf.service.max_consecutive_imwrite_failures {
        return None;
    }
    state.consecutive_imwrite_failures = 0;
    state.disk_cleanup_batches += conf.disk_management.cleanup_batch_days as u64;
    Some(define::backoff::WRITE_FAILURE_BACKOFF)
}

/// Whether a periodic task is due. `None` means it has never run.
fn is_due(last: &Option<Instant>, interval: Duration) -> bool {
    match last {
        Some(at) => at.elapsed() >= interval,
        None => true,
    }
}

/// What a configuration reload resolved to.
enum ReloadOutcome {
    /// New configuration applied; the open device is still valid.
    Applied,
    /// New configuration applied and the camera section changed.
    CameraChanged,
    /// The new file was unreadable; the previous configuration stays.
    Failed,
}

/// Re-read the configuration file and swap it in. A broken file is
/// rejected as a whole; the running configuration is never partially
/// updated.
fn apply_reload(property: &mut Property, schedule: &mut ScheduleTable) -> ReloadOutcome {
    log::info!("Reload requested; re-reading configuration.");
    let fresh = match conf::toml::reload(&property.path.dir.data, &property.conf) {
        Ok(fresh) => fresh,
        Err(e) => {
            log::error!("Reload failed, keeping previous configuration: {}", e);
            return ReloadOutcome::Failed;
        }
    };

    let camera_changed = camera_section_changed(&property.conf.camera, &fresh.camera);
    property.conf = fresh;
    *schedule = ScheduleTable::from_conf(&property.conf.capture_schedule);
    log::info!(
        "Configuration reloaded. Schedule: {}",
        schedule.describe()
    );

    if camera_changed {
        ReloadOutcome::CameraChanged
    } else {
        ReloadOutcome::Applied
    }
}

/// Whether a reload touched anything that requires reopening the device.
fn camera_section_changed(prev: &conf::Camera, next: &conf::Camera) -> bool {
    prev.device_path != next.device_path
        || prev.width != next.width
        || prev.height != next.height
        || prev.requested_fourcc != next.requested_fourcc
        || prev.fps != next.fps
}
