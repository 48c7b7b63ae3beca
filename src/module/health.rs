//! Health Reporting
//!
//! Periodic heartbeat log line plus a machine-readable snapshot written
//! to `health.json` in the log directory. The snapshot is advisory:
//! writing it must never disturb the capture loop, so every error here
//! is logged and swallowed.

use chrono::Local;
use serde::Serialize;
use std::fs;
use std::path::Path;

use super::service::ServiceState;
use super::util::conf::Config;
use super::{define, disk};

/// One point-in-time view of the service, serialized to `health.json`.
#[derive(Debug, Serialize)]
pub struct HealthSnapshot {
    /// Identifier of this service boot; changes on every restart.
    pub boot_id: String,
    /// Snapshot time, unix seconds.
    pub timestamp: i64,
    /// Capture interval currently in effect, seconds.
    pub current_interval_seconds: f64,
    /// Mean capture latency over the recent window, seconds.
    pub avg_capture_latency_seconds: Option<f64>,
    pub consecutive_read_failures: u32,
    pub consecutive_imwrite_failures: u32,
    /// Cleanup batches run since boot.
    pub disk_cleanup_batches: u64,
    /// Utilization of the monitored filesystem, percent.
    pub disk_used_percent: Option<f64>,
    /// Path of the most recently persisted image, if any.
    pub last_saved_path: Option<String>,
    /// FOURCC the camera negotiated, empty while no device is open.
    pub effective_fourcc: String,
}

impl HealthSnapshot {
    fn collect(state: &ServiceState, conf: &Config, interval_seconds: f64) -> Self {
        Self {
            boot_id: state.boot_id.clone(),
            timestamp: Local::now().timestamp(),
            current_interval_seconds: interval_seconds,
            avg_capture_latency_seconds: state.avg_latency(),
            consecutive_read_failures: state.consecutive_read_failures,
            consecutive_imwrite_failures: state.consecutive_imwrite_failures,
            disk_cleanup_batches: state.disk_cleanup_batches,
            disk_used_percent: disk::disk_used_percent(conf.monitor_path()),
            last_saved_path: state.last_saved_path.clone(),
            effective_fourcc: state.effective_fourcc.clone(),
        }
    }
}

/// Emit the heartbeat log line.
pub fn log_heartbeat(state: &ServiceState, conf: &Config, interval_seconds: f64) {
    let latency = match state.avg_latency() {
        Some(avg) => format!("{:.3}s", avg),
        None => "n/a".to_string(),
    };
    let disk = match disk::disk_used_percent(conf.monitor_path()) {
        Some(used) => format!("{:.1}%", used),
        None => "n/a".to_string(),
    };
    log::info!(
        "heartbeat: interval={:.1}s avg_latency={} read_failures={} write_failures={} cleanups={} disk_used={} last_saved={}",
        interval_seconds,
        latency,
        state.consecutive_read_failures,
        state.consecutive_imwrite_failures,
        state.disk_cleanup_batches,
        disk,
        state.last_saved_path.as_deref().unwrap_or("none"),
    );
}

/// Overwrite `health.json` in the log directory with the current state.
pub fn dump_snapshot(state: &ServiceState, conf: &Config, interval_seconds: f64) {
    let snapshot = HealthSnapshot::collect(state, conf, interval_seconds);
    let path = Path::new(&conf.paths.log_dir).join(define::path::HEALTH_FILE);

    let body = match serde_json::to_string_pretty(&snapshot) {
        Ok(body) => body,
        Err(e) => {
            log::warn!("Failed to serialize health snapshot: {}", e);
            return;
        }
    };
    if let Err(e) = fs::write(&path, body) {
        log::warn!("Failed to write {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_snapshot_written_as_valid_json() {
        let dir = "/tmp/framekeepertest/health_dump";
        let _ = fs::remove_dir_all(dir);
        fs::create_dir_all(dir).unwrap();
        let mut conf = Config::default();
        conf.paths.log_dir = dir.to_string();

        let mut state = ServiceState::new();
        state.consecutive_read_failures = 2;
        state.effective_fourcc = "YUYV".to_string();
        state.last_saved_path = Some("/tmp/x.jpg".to_string());
        state.push_latency(0.1);
        state.push_latency(0.3);

        dump_snapshot(&state, &conf, 2.0);

        let body = fs::read_to_string(format!("{}/health.json", dir)).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["consecutive_read_failures"], 2);
        assert_eq!(parsed["current_interval_seconds"], 2.0);
        assert_eq!(parsed["effective_fourcc"], "YUYV");
        assert_eq!(parsed["last_saved_path"], "/tmp/x.jpg");
        let avg = parsed["avg_capture_latency_seconds"].as_f64().unwrap();
        assert!((avg - 0.2).abs() < 1e-9);
        assert_eq!(parsed["boot_id"], state.boot_id);
        assert!(parsed["timestamp"].as_i64().unwrap() > 0);
    }

    #[test]
    fn test_snapshot_overwrites_previous() {
        let dir = "/tmp/framekeepertest/health_overwrite";
        let _ = fs::remove_dir_all(dir);
        fs::create_dir_all(dir).unwrap();
        let mut conf = Config::default();
        conf.paths.log_dir = dir.to_string();
        let mut state = ServiceState::new();

        dump_snapshot(&state, &conf, 2.0);
        state.disk_cleanup_batches = 7;
        dump_snapshot(&state, &conf, 5.0);

        let body = fs::read_to_string(format!("{}/health.json", dir)).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["disk_cleanup_batches"], 7);
        assert_eq!(parsed["current_interval_seconds"], 5.0);
    }

    #[test]
    fn test_snapshot_to_missing_dir_is_swallowed() {
        let mut conf = Config::default();
        conf.paths.log_dir = "/tmp/framekeepertest/health_missing/nope".to_string();
        let _ = fs::remove_dir_all("/tmp/framekeepertest/health_missing");
        let state = ServiceState::new();

        // Must not panic.
        dump_snapshot(&state, &conf, 2.0);
    }
}
