//! Disk Management
//!
//! Keeps the filesystem holding the frame store below the configured
//! usage ceiling by evicting whole day partitions, oldest first. The
//! date-encoded directory names sort lexicographically, so "oldest"
//! is a plain string comparison, never a filesystem timestamp.

use std::fs;
use std::path::{Path, PathBuf};
use sysinfo::{DiskExt, System, SystemExt};

use super::control::Control;
use super::util::conf::Config;

/// Usage percentage of the filesystem holding `path`, from the mounted
/// disk whose mount point is the longest prefix of it. `None` when no
/// disk matches or the disk reports zero capacity.
pub fn disk_used_percent(path: &str) -> Option<f64> {
    let mut sys = System::new();
    sys.refresh_disks_list();

    let target = Path::new(path);
    let mut best: Option<(usize, u64, u64)> = None;
    for disk in sys.disks() {
        let mount = disk.mount_point();
        if target.starts_with(mount) {
            let depth = mount.as_os_str().len();
            if best.map_or(true, |(d, _, _)| depth > d) {
                best = Some((depth, disk.total_space(), disk.available_space()));
            }
        }
    }

    let (_, total, available) = best?;
    if total == 0 {
        return None;
    }
    Some((total - available) as f64 / total as f64 * 100.0)
}

/// The oldest day partition under the store base, as `(month_dir, day_dir)`.
///
/// Only directories matching the `YYYY-MM/DD` layout participate; anything
/// else under the base is ignored.
pub fn oldest_day_dir(base: &str) -> Option<PathBuf> {
    let mut months: Vec<PathBuf> = fs::read_dir(base)
        .ok()?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir() && is_month_name(p))
        .collect();
    months.sort();

    for month in months {
        let mut days: Vec<PathBuf> = fs::read_dir(&month)
            .ok()?
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_dir() && is_day_name(p))
            .collect();
        days.sort();
        if let Some(day) = days.into_iter().next() {
            return Some(day);
        }
        // A month shell with no day partitions left is itself stale.
        if fs::remove_dir(&month).is_ok() {
            log::info!("Removed empty month directory {}", month.display());
        }
    }
    None
}

fn is_month_name(path: &Path) -> bool {
    match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => {
            name.len() == 7
                && name.as_bytes()[4] == b'-'
                && name[..4].chars().all(|c| c.is_ascii_digit())
                && name[5..].chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

fn is_day_name(path: &Path) -> bool {
    match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name.len() == 2 && name.chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}

/// Evict up to `batch` oldest day partitions. Stops early on shutdown,
/// on a removal error, or when the store is exhausted. Returns the
/// number of partitions actually removed.
pub fn evict_oldest_days(base: &str, batch: u32, control: &Control) -> usize {
    let mut removed = 0;
    for _ in 0..batch {
        if control.shutdown_requested() {
            break;
        }
        let day = match oldest_day_dir(base) {
            Some(day) => day,
            None => {
                log::warn!("Nothing left to evict under {}", base);
                break;
            }
        };
        match fs::remove_dir_all(&day) {
            Ok(()) => {
                log::info!("Evicted day partition {}", day.display());
                removed += 1;
            }
            Err(e) => {
                log::error!("Failed to evict {}: {}", day.display(), e);
                break;
            }
        }
        // Drop the month shell once its last day is gone.
        if let Some(month) = day.parent() {
            if fs::read_dir(month).map(|mut d| d.next().is_none()).unwrap_or(false) {
                let _ = fs::remove_dir(month);
            }
        }
    }
    removed
}

/// One disk-management pass: a single usage measurement and, when the
/// ceiling is exceeded, a single eviction batch. Pressure that one batch
/// does not relieve is left for the next invocation, so a pass never
/// deletes more than `cleanup_batch_days` day partitions. Returns the
/// number of batches run (0 or 1).
pub fn check_and_manage(conf: &Config, control: &Control) -> u32 {
    let monitor = conf.monitor_path();
    match disk_used_percent(monitor) {
        Some(used) => manage_usage(used, conf, control),
        None => {
            log::warn!("Disk usage for {} could not be determined.", monitor);
            0
        }
    }
}

/// Eviction decision for a measured utilization.
fn manage_usage(used: f64, conf: &Config, control: &Control) -> u32 {
    log::debug!(
        "Disk usage at {}: {:.1}% (ceiling {:.1}%)",
        conf.monitor_path(),
        used,
        conf.disk_management.max_usage_percent
    );
    if used < conf.disk_management.max_usage_percent {
        return 0;
    }
    log::warn!(
        "Disk usage {:.1}% exceeds ceiling {:.1}%; evicting oldest {} day(s).",
        used,
        conf.disk_management.max_usage_percent,
        conf.disk_management.cleanup_batch_days
    );
    let removed = evict_oldest_days(
        &conf.paths.image_save_base_dir,
        conf.disk_management.cleanup_batch_days,
        control,
    );
    if removed == 0 {
        // Usage is high but there is nothing of ours left to delete.
        log::error!(
            "Disk usage {:.1}% but the frame store is empty; nothing to evict.",
            used
        );
        return 0;
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn make_day(base: &str, month: &str, day: &str) {
        fs::create_dir_all(format!("{}/{}/{}", base, month, day)).unwrap();
        fs::write(format!("{}/{}/{}/x.jpg", base, month, day), b"data").unwrap();
    }

    #[test]
    fn test_oldest_day_crosses_month_boundary() {
        let base = "/tmp/framekeepertest/disk_oldest";
        let _ = fs::remove_dir_all(base);
        make_day(base, "2024-02", "01");
        make_day(base, "2024-01", "31");
        make_day(base, "2024-01", "05");

        let oldest = oldest_day_dir(base).unwrap();
        assert!(oldest.ends_with("2024-01/05"));
    }

    #[test]
    fn test_oldest_day_ignores_foreign_entries() {
        let base = "/tmp/framekeepertest/disk_foreign";
        let _ = fs::remove_dir_all(base);
        fs::create_dir_all(format!("{}/lost+found", base)).unwrap();
        fs::create_dir_all(format!("{}/2024-03/notaday", base)).unwrap();
        make_day(base, "2024-03", "09");

        let oldest = oldest_day_dir(base).unwrap();
        assert!(oldest.ends_with("2024-03/09"));
    }

    #[test]
    fn test_oldest_day_empty_store() {
        let base = "/tmp/framekeepertest/disk_empty";
        let _ = fs::remove_dir_all(base);
        fs::create_dir_all(base).unwrap();
        assert_eq!(oldest_day_dir(base), None);
    }

    #[test]
    fn test_evict_removes_in_order_and_respects_batch() {
        let base = "/tmp/framekeepertest/disk_evict";
        let _ = fs::remove_dir_all(base);
        make_day(base, "2024-01", "01");
        make_day(base, "2024-01", "02");
        make_day(base, "2024-01", "03");
        let control = Control::new();

        let removed = evict_oldest_days(base, 2, &control);

        assert_eq!(removed, 2);
        assert!(!Path::new(&format!("{}/2024-01/01", base)).exists());
        assert!(!Path::new(&format!("{}/2024-01/02", base)).exists());
        assert!(Path::new(&format!("{}/2024-01/03", base)).exists());
    }

    #[test]
    fn test_evict_drops_empty_month_shell() {
        let base = "/tmp/framekeepertest/disk_shell";
        let _ = fs::remove_dir_all(base);
        make_day(base, "2024-01", "01");
        make_day(base, "2024-02", "01");
        let control = Control::new();

        let removed = evict_oldest_days(base, 1, &control);

        assert_eq!(removed, 1);
        assert!(!Path::new(&format!("{}/2024-01", base)).exists());
        assert!(Path::new(&format!("{}/2024-02/01", base)).exists());
    }

    #[test]
    fn test_evict_stops_on_exhaustion() {
        let base = "/tmp/framekeepertest/disk_exhaust";
        let _ = fs::remove_dir_all(base);
        make_day(base, "2024-01", "01");
        let control = Control::new();

        let removed = evict_oldest_days(base, 10, &control);
        assert_eq!(removed, 1);
    }

    #[test]
    fn test_evict_honors_shutdown() {
        let base = "/tmp/framekeepertest/disk_shutdown";
        let _ = fs::remove_dir_all(base);
        make_day(base, "2024-01", "01");
        let control = Control::new();
        control.request_shutdown();

        assert_eq!(evict_oldest_days(base, 5, &control), 0);
        assert!(Path::new(&format!("{}/2024-01/01", base)).exists());
    }

    #[test]
    fn test_one_pass_evicts_at_most_one_batch() {
        let base = "/tmp/framekeepertest/disk_one_batch";
        let _ = fs::remove_dir_all(base);
        make_day(base, "2024-01", "01");
        make_day(base, "2024-01", "02");
        make_day(base, "2024-01", "03");

        let mut conf = Config::default();
        conf.paths.image_save_base_dir = base.to_string();
        conf.disk_management.cleanup_batch_days = 1;
        conf.disk_management.max_usage_percent = 0.0;
        let control = Control::new();

        // Usage stays over the ceiling, but one pass runs one batch.
        let batches = manage_usage(100.0, &conf, &control);

        assert_eq!(batches, 1);
        assert!(!Path::new(&format!("{}/2024-01/01", base)).exists());
        assert!(Path::new(&format!("{}/2024-01/02", base)).exists());
        assert!(Path::new(&format!("{}/2024-01/03", base)).exists());
    }

    #[test]
    fn test_usage_below_ceiling_evicts_nothing() {
        let base = "/tmp/framekeepertest/disk_under_ceiling";
        let _ = fs::remove_dir_all(base);
        make_day(base, "2024-01", "01");

        let mut conf = Config::default();
        conf.paths.image_save_base_dir = base.to_string();
        conf.disk_management.max_usage_percent = 85.0;
        let control = Control::new();

        assert_eq!(manage_usage(40.0, &conf, &control), 0);
        assert!(Path::new(&format!("{}/2024-01/01", base)).exists());
    }

    #[test]
    fn test_disk_used_percent_for_root() {
        // The root filesystem always exists and has nonzero capacity.
        if let Some(used) = disk_used_percent("/") {
            assert!(used >= 0.0 && used <= 100.0);
        }
    }
}
