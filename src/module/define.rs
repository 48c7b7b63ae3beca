//! Module for Constants and Paths Definitions
//!
//! This module defines the fixed constants of the capture, retry and
//! backoff machinery. Everything that is tunable at runtime lives in the
//! configuration file instead.

use std::time::Duration;

/// System Constants
pub mod system {
    /// Name of the system
    pub const NAME: &str = "framekeeper";
}

/// File Paths
pub mod path {

    // Persistent Data Directory
    pub const PERSISTENT_DIR: &str = "/opt/";

    // Ephemeral Data Directory (fallback of last resort)
    pub const EPHEMERAL_DIR: &str = "/tmp/";

    // Configuration File
    pub const CONF_FILE: &str = "conf.toml";

    // Health Snapshot File
    pub const HEALTH_FILE: &str = "health.json";

    // Default PID File
    pub const PID_FILE: &str = "/var/run/framekeeper.pid";
}

/// Camera Parameter Negotiation
pub mod camera {
    use super::Duration;

    /// Attempts at starting the stream with the requested parameters.
    pub const PARAMETER_SET_RETRIES: u32 = 3;

    /// Settle delay between negotiation attempts.
    pub const PARAMETER_SETTLE_DELAY: Duration = Duration::from_millis(500);

    /// Buffered frames discarded before each read so that a cycle never
    /// acts on stale data.
    pub const DISCARD_FRAMES: u32 = 4;

    /// Epsilon for float property read-back comparison.
    pub const FLOAT_COMPARE_EPSILON: f64 = 1e-9;
}

/// Backoff and Retry Policy
pub mod backoff {
    use super::Duration;

    /// Consecutive open failures tolerated before the long backoff kicks in.
    pub const INIT_FAILURE_MAX_CONSECUTIVE: u32 = 5;

    /// Short wait after an isolated open failure.
    pub const INIT_RETRY_DELAY: Duration = Duration::from_secs(15);

    /// Long wait after sustained open failure. Resets the counter.
    pub const INIT_LONG_BACKOFF: Duration = Duration::from_secs(300);

    /// Consecutive read failures tolerated before the long backoff kicks in.
    pub const READ_FAILURE_MAX_CONSECUTIVE: u32 = 10;

    /// Short wait after an isolated read failure.
    pub const READ_RETRY_DELAY: Duration = Duration::from_secs(5);

    /// Long wait after sustained read failure. Resets the counter.
    pub const READ_LONG_BACKOFF: Duration = Duration::from_secs(60);

    /// Read failure log throttle. Only every Nth failure is logged.
    pub const READ_LOG_EVERY_N: u32 = 5;

    /// Wait applied after the write failure threshold triggers a cleanup.
    pub const WRITE_FAILURE_BACKOFF: Duration = Duration::from_secs(60);
}

/// Frame Similarity Decision
pub mod similarity {
    /// Intensity threshold for binarizing the per-pixel absolute difference.
    pub const PIXEL_DIFF_THRESHOLD: u8 = 25;

    /// Side of the square dilation kernel.
    pub const DILATE_KERNEL_SIZE: u32 = 5;

    /// Dilation passes applied to the binarized difference map.
    pub const DILATE_ITERATIONS: u32 = 2;

    /// Connected regions at or below this area are treated as noise.
    pub const MIN_REGION_AREA: f64 = 50.0;

    /// Frames wider than this are downsampled before comparison.
    pub const MAX_COMPARE_WIDTH: u32 = 640;
}

/// Health Reporting
pub mod health {
    use super::Duration;

    /// Capacity of the rolling per-cycle latency window.
    pub const LATENCY_WINDOW: usize = 120;

    /// Interval between heartbeat log lines and snapshot dumps.
    pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(300);
}
