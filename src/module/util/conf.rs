//! Config Handler.
//!
//! Built-in defaults always apply; a TOML file in the data directory
//! overrides individual keys. A small set of legacy flat keys from older
//! deployments is still accepted at the document root and folded into
//! the sections they replaced.

use serde::{Deserialize, Serialize};

/// Provides TOML config file handling.
pub mod toml {

    use super::{ConfError, DEFAULT_CONFIG};
    use crate::module::define;
    use std::fs::File;
    use std::io::prelude::*;
    use std::path::Path;

    /// Loads the configuration file from the given directory.
    /// If not found, writes the default config file first.
    ///
    /// # Arguments
    ///
    /// * `dir` - The directory where the configuration file is located or should be created.
    ///
    pub fn load(dir: &str) -> Result<super::Config, ConfError> {
        let path = Path::new(dir).join(define::path::CONF_FILE);

        if !path.is_file() {
            // Persist the annotated defaults so operators have a template to edit.
            let mut file = File::create(&path)?;
            file.write_all(DEFAULT_CONFIG.as_bytes())?;
        }

        let conf_str: String = std::fs::read_to_string(&path)?;
        let mut conf: super::Config = ::toml::from_str(&conf_str)?;
        conf.apply_legacy_keys();
        Ok(conf)
    }

    /// Re-reads the configuration for a hot reload. Fields that affect
    /// open log sinks and the PID file are pinned to their previous
    /// values so a reload never swaps live handles.
    ///
    /// # Arguments
    ///
    /// * `dir` - The directory holding the configuration file.
    /// * `prev` - The configuration currently in effect.
    ///
    pub fn reload(dir: &str, prev: &super::Config) -> Result<super::Config, ConfError> {
        let path = Path::new(dir).join(define::path::CONF_FILE);
        let conf_str: String = std::fs::read_to_string(&path)?;
        let mut conf: super::Config = ::toml::from_str(&conf_str)?;
        conf.apply_legacy_keys();
        conf.paths.log_dir = prev.paths.log_dir.clone();
        conf.paths.pid_file = prev.paths.pid_file.clone();
        conf.logging = prev.logging.clone();
        Ok(conf)
    }
}

/// Configuration loading/parsing failure. Non-fatal on reload; startup
/// decides what to do with it.
#[derive(Debug)]
pub enum ConfError {
    Io(std::io::Error),
    Parse(::toml::de::Error),
}

impl std::fmt::Display for ConfError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfError::Io(e) => write!(f, "config io error: {}", e),
            ConfError::Parse(e) => write!(f, "config parse error: {}", e),
        }
    }
}

impl std::error::Error for ConfError {}

impl From<std::io::Error> for ConfError {
    fn from(e: std::io::Error) -> Self {
        ConfError::Io(e)
    }
}

impl From<::toml::de::Error> for ConfError {
    fn from(e: ::toml::de::Error) -> Self {
        ConfError::Parse(e)
    }
}

/// Represents the configuration data structure.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub paths: Paths,
    pub logging: Logging,
    pub camera: Camera,
    pub capture_schedule: CaptureSchedule,
    pub image_processing: ImageProcessing,
    pub disk_management: DiskManagement,
    pub service: Service,
    pub similarity: Similarity,

    // Legacy flat keys kept for backward compatibility with old deployments.
    #[serde(skip_serializing_if = "Option::is_none")]
    camera_device: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fourcc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    jpeg_quality: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    similarity_threshold_percent_int: Option<u32>,
}

impl Config {
    /// Fold the accepted legacy flat keys into their sections. Nested
    /// keys win when both forms are present in the same file.
    fn apply_legacy_keys(&mut self) {
        if let Some(device) = self.camera_device.take() {
            self.camera.device_path = device;
        }
        if let Some(width) = self.width.take() {
            self.camera.width = width;
        }
        if let Some(height) = self.height.take() {
            self.camera.height = height;
        }
        if let Some(fourcc) = self.fourcc.take() {
            self.camera.requested_fourcc = fourcc;
        }
        if let Some(quality) = self.jpeg_quality.take() {
            self.camera.jpeg_quality = quality;
        }
        if let Some(threshold) = self.similarity_threshold_percent_int.take() {
            self.similarity.threshold_percent_int = threshold;
        }
    }

    /// Path whose filesystem utilization the janitor watches. Falls back
    /// to the image base directory when unset.
    pub fn monitor_path(&self) -> &str {
        if self.disk_management.monitor_path.is_empty() {
            &self.paths.image_save_base_dir
        } else {
            &self.disk_management.monitor_path
        }
    }

    /// Configured fallback base directory, if any.
    pub fn fallback_dir(&self) -> Option<&str> {
        if self.paths.image_save_fallback_dir.is_empty() {
            None
        } else {
            Some(&self.paths.image_save_fallback_dir)
        }
    }
}

/// Represents filesystem location parameters.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Paths {
    pub base_app_dir: String,
    pub image_save_base_dir: String,
    pub image_save_fallback_dir: String,
    pub log_dir: String,
    pub pid_file: String,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            base_app_dir: "/opt/framekeeper".to_string(),
            image_save_base_dir: "/opt/framekeeper/captures".to_string(),
            image_save_fallback_dir: String::new(),
            log_dir: "/opt/framekeeper/logs".to_string(),
            pid_file: crate::module::define::path::PID_FILE.to_string(),
        }
    }
}

/// Represents logging parameters. Excluded from hot reload.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Logging {
    pub level: String,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
        }
    }
}

/// Represents camera-related configuration parameters.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Camera {
    pub device_path: String,
    pub width: u32,
    pub height: u32,
    pub requested_fourcc: String,
    pub fps: u32,
    pub jpeg_quality: u8,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            device_path: "/dev/video0".to_string(),
            width: 1920,
            height: 1080,
            requested_fourcc: "YUYV".to_string(),
            fps: 10,
            jpeg_quality: 90,
        }
    }
}

/// One schedule rule as written in the configuration file.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScheduleRuleConf {
    pub end_time_exclusive: String,
    pub interval_seconds: f64,
}

/// Represents the time-of-day capture schedule.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CaptureSchedule {
    pub default_interval_seconds: f64,
    pub rules: Vec<ScheduleRuleConf>,
}

impl Default for CaptureSchedule {
    fn default() -> Self {
        Self {
            default_interval_seconds: 10.0,
            rules: vec![
                ScheduleRuleConf {
                    end_time_exclusive: "05:00".to_string(),
                    interval_seconds: 10.0,
                },
                ScheduleRuleConf {
                    end_time_exclusive: "06:00".to_string(),
                    interval_seconds: 5.0,
                },
                ScheduleRuleConf {
                    end_time_exclusive: "21:30".to_string(),
                    interval_seconds: 2.0,
                },
                ScheduleRuleConf {
                    end_time_exclusive: "22:30".to_string(),
                    interval_seconds: 5.0,
                },
            ],
        }
    }
}

/// Represents image post-processing parameters.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ImageProcessing {
    pub enable_timestamp: bool,
    pub timestamp_format: String,
}

impl Default for ImageProcessing {
    fn default() -> Self {
        Self {
            enable_timestamp: true,
            timestamp_format: "%Y/%m/%d %H:%M:%S".to_string(),
        }
    }
}

/// Represents disk management parameters.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct DiskManagement {
    pub monitor_path: String,
    pub max_usage_percent: f64,
    pub cleanup_batch_days: u32,
    pub check_interval_seconds: u64,
    pub min_jpeg_save_size_bytes: u64,
}

impl Default for DiskManagement {
    fn default() -> Self {
        Self {
            monitor_path: String::new(),
            max_usage_percent: 85.0,
            cleanup_batch_days: 1,
            check_interval_seconds: 14400,
            min_jpeg_save_size_bytes: 0,
        }
    }
}

/// Represents service limit parameters.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Service {
    pub max_consecutive_imwrite_failures: u32,
}

impl Default for Service {
    fn default() -> Self {
        Self {
            max_consecutive_imwrite_failures: 5,
        }
    }
}

/// Represents the frame similarity threshold.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Similarity {
    pub threshold_percent_int: u32,
}

impl Default for Similarity {
    fn default() -> Self {
        Self {
            threshold_percent_int: 100,
        }
    }
}

// Default configuration data in TOML format
const DEFAULT_CONFIG: &str = r#"
[paths]
  base_app_dir = '/opt/framekeeper' # Application base directory
  image_save_base_dir = '/opt/framekeeper/captures' # Date-partitioned image store
  image_save_fallback_dir = '' # Fallback store when the base is unavailable ('' = none)
  log_dir = '/opt/framekeeper/logs' # Log directory (not hot-reloadable)
  pid_file = '/var/run/framekeeper.pid' # PID file for stop/status tooling

[logging]
  level = 'INFO' # Log level (e.g., 'INFO', 'DEBUG')

[camera]
  device_path = '/dev/video0' # V4L2 device node
  width = 1920 # Requested frame width
  height = 1080 # Requested frame height
  requested_fourcc = 'YUYV' # Requested pixel format (FOURCC)
  fps = 10 # Requested frame rate
  jpeg_quality = 90 # JPEG encode quality (1-100)

[capture_schedule]
  default_interval_seconds = 10.0 # Late-night interval when no rule matches

[[capture_schedule.rules]]
  end_time_exclusive = '05:00' # Applies strictly before this time of day
  interval_seconds = 10.0

[[capture_schedule.rules]]
  end_time_exclusive = '06:00'
  interval_seconds = 5.0

[[capture_schedule.rules]]
  end_time_exclusive = '21:30'
  interval_seconds = 2.0

[[capture_schedule.rules]]
  end_time_exclusive = '22:30'
  interval_seconds = 5.0

[image_processing]
  enable_timestamp = true # Overlay the capture time in the lower-right corner
  timestamp_format = '%Y/%m/%d %H:%M:%S' # strftime format of the overlay

[disk_management]
  monitor_path = '' # Path whose filesystem is watched ('' = image base dir)
  max_usage_percent = 85.0 # Eviction threshold
  cleanup_batch_days = 1 # Oldest day directories removed per cleanup
  check_interval_seconds = 14400 # Periodic utilization check
  min_jpeg_save_size_bytes = 0 # Reject smaller outputs as corrupt (0 = disabled)

[service]
  max_consecutive_imwrite_failures = 5 # Write failures tolerated before cleanup + backoff

[similarity]
  threshold_percent_int = 100 # Diff-rate threshold in 1/100 percent (100 = 1.0%)
"#;

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;
    use std::path::Path;

    #[test]
    fn test_load_generates_default() {
        let dir = "/tmp/framekeepertest/conf_default/";
        fs::create_dir_all(Path::new(dir)).unwrap();
        let _ = fs::remove_file(Path::new(dir).join("conf.toml"));

        let conf = toml::load(dir).unwrap();

        assert!(Path::new(dir).join("conf.toml").is_file());
        assert_eq!(conf.camera.requested_fourcc, "YUYV");
        assert_eq!(conf.capture_schedule.rules.len(), 4);
        assert_eq!(conf.similarity.threshold_percent_int, 100);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = "/tmp/framekeepertest/conf_partial/";
        fs::create_dir_all(Path::new(dir)).unwrap();
        fs::write(
            Path::new(dir).join("conf.toml"),
            "[camera]\nwidth = 1280\nheight = 720\n",
        )
        .unwrap();

        let conf = toml::load(dir).unwrap();

        assert_eq!(conf.camera.width, 1280);
        assert_eq!(conf.camera.height, 720);
        // Unspecified keys keep built-in defaults.
        assert_eq!(conf.camera.device_path, "/dev/video0");
        assert_eq!(conf.disk_management.max_usage_percent, 85.0);
    }

    #[test]
    fn test_legacy_flat_keys() {
        let dir = "/tmp/framekeepertest/conf_legacy/";
        fs::create_dir_all(Path::new(dir)).unwrap();
        fs::write(
            Path::new(dir).join("conf.toml"),
            "camera_device = '/dev/video9'\nfourcc = 'MJPG'\njpeg_quality = 75\nsimilarity_threshold_percent_int = 50\n",
        )
        .unwrap();

        let conf = toml::load(dir).unwrap();

        assert_eq!(conf.camera.device_path, "/dev/video9");
        assert_eq!(conf.camera.requested_fourcc, "MJPG");
        assert_eq!(conf.camera.jpeg_quality, 75);
        assert_eq!(conf.similarity.threshold_percent_int, 50);
    }

    #[test]
    fn test_reload_pins_log_paths() {
        let dir = "/tmp/framekeepertest/conf_reload/";
        fs::create_dir_all(Path::new(dir)).unwrap();
        fs::write(
            Path::new(dir).join("conf.toml"),
            "[paths]\nlog_dir = '/elsewhere/logs'\npid_file = '/elsewhere/pid'\n[camera]\nwidth = 640\n",
        )
        .unwrap();

        let mut prev = Config::default();
        prev.paths.log_dir = "/var/log/framekeeper".to_string();
        prev.paths.pid_file = "/run/framekeeper.pid".to_string();

        let conf = toml::reload(dir, &prev).unwrap();

        assert_eq!(conf.camera.width, 640);
        assert_eq!(conf.paths.log_dir, "/var/log/framekeeper");
        assert_eq!(conf.paths.pid_file, "/run/framekeeper.pid");
    }

    #[test]
    fn test_monitor_path_falls_back_to_base() {
        let mut conf = Config::default();
        assert_eq!(conf.monitor_path(), "/opt/framekeeper/captures");
        conf.disk_management.monitor_path = "/mnt/disk".to_string();
        assert_eq!(conf.monitor_path(), "/mnt/disk");
    }
}
