//! Path Operations Module
//!
//! This module handles path operations for directories and files,
//! including the `<base>/<YYYY-MM>/<DD>` date partition layout of the
//! image store.

use chrono::{DateTime, Datelike, Local, Timelike};
use std::path::PathBuf;

/// Join Paths
///
/// This function takes a slice of strings as input and joins them into a single path string.
/// It uses the PathBuf type to handle platform-specific separators and conversions.
/// It returns the joined path as a String, or panics if the conversion fails.
pub fn join(paths: &[&str]) -> String {
    let mut path: PathBuf = PathBuf::new();
    for p in paths {
        path.push(p);
    }
    path.into_os_string().into_string().unwrap()
}

/// Date partition directory for the given moment: `<base>/<YYYY-MM>/<DD>`.
pub fn day_dir(base: &str, now: &DateTime<Local>) -> String {
    join(&[
        base,
        &format!("{:04}-{:02}", now.year(), now.month()),
        &format!("{:02}", now.day()),
    ])
}

/// File name for a captured frame: `capture_<YYYYMMDD_HHMMSS_ffffff>.jpg`.
pub fn capture_file_name(now: &DateTime<Local>) -> String {
    format!(
        "capture_{:04}{:02}{:02}_{:02}{:02}{:02}_{:06}.jpg",
        now.year(),
        now.month(),
        now.day(),
        now.hour(),
        now.minute(),
        now.second(),
        now.timestamp_subsec_micros()
    )
}

pub mod dir {
    //! Directory Operations Submodule
    //!
    //! This submodule provides functions for directory operations.

    use std::fs;
    use std::path::Path;

    use crate::module::define;

    /// Create Directory from Path List
    ///
    /// This function takes a slice of strings as input and creates a directory with the joined path.
    /// It uses the `join` function from the parent module to create the path string.
    /// It returns `Some(path)` if the directory creation succeeds, or `None` if it fails.
    pub fn create_dir_from_path_list(paths: &[&str]) -> Option<String> {
        let path = super::join(paths);
        match fs::create_dir_all(Path::new(&path)) {
            Ok(_) => Some(path),
            Err(_) => None,
        }
    }

    /// Create Directory with Fallbacks
    ///
    /// Tries to create `preferred` first, then each fallback candidate in
    /// order. Returns the first directory that could be created, or
    /// `None` when every candidate failed.
    pub fn create_dir_with_fallbacks(preferred: &str, fallbacks: &[String]) -> Option<String> {
        if let Some(path) = create_dir_from_path_list(&[preferred]) {
            return Some(path);
        }
        for candidate in fallbacks {
            if let Some(path) = create_dir_from_path_list(&[candidate]) {
                log::warn!("Falling back to directory: {}", path);
                return Some(path);
            }
        }
        None
    }

    /// Create Data Directory
    ///
    /// Creates the application data directory (configuration lives here)
    /// under the persistent parent, falling back to `$HOME` and finally
    /// to the ephemeral parent when the preferred locations are not
    /// writable. Panics if every candidate fails: without a data
    /// directory there is no configuration and no service.
    pub fn create_data_dir() -> String {
        let preferred = super::join(&[define::path::PERSISTENT_DIR, define::system::NAME]);
        let mut fallbacks = Vec::new();
        if let Ok(home) = std::env::var("HOME") {
            fallbacks.push(super::join(&[&home, &format!(".{}", define::system::NAME)]));
        }
        fallbacks.push(super::join(&[
            define::path::EPHEMERAL_DIR,
            define::system::NAME,
        ]));

        match create_dir_with_fallbacks(&preferred, &fallbacks) {
            Some(path) => path,
            None => panic!("Can't Create Data Dir."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::path::Path;

    #[test]
    fn test_create_dir_from_path_list() {
        // Test the create_dir_from_path_list function from the dir submodule
        dir::create_dir_from_path_list(&["/tmp", "framekeepertest", "test_create_dir"]);

        // Assert that the directory was created
        assert!(Path::new("/tmp/framekeepertest/test_create_dir").is_dir());
    }

    #[test]
    fn test_create_dir_with_fallbacks() {
        let res = dir::create_dir_with_fallbacks(
            "/proc/forbidden/framekeepertest",
            &["/tmp/framekeepertest/fallback".to_string()],
        );
        assert_eq!(res, Some("/tmp/framekeepertest/fallback".to_string()));
    }

    #[test]
    fn test_path_join() {
        // Assert that joining two paths works as expected
        assert_eq!(join(&["/test/", "test"]), "/test/test");

        // Assert that joining three paths works as expected
        assert_eq!(join(&["test", "test", "test"]), "test/test/test");
    }

    #[test]
    fn test_day_dir_layout() {
        let now = Local.with_ymd_and_hms(2024, 3, 7, 1, 2, 3).unwrap();
        assert_eq!(day_dir("/base", &now), "/base/2024-03/07");
    }

    #[test]
    fn test_capture_file_name() {
        let now = Local.with_ymd_and_hms(2024, 3, 7, 1, 2, 3).unwrap();
        let name = capture_file_name(&now);
        assert!(name.starts_with("capture_20240307_010203_"));
        assert!(name.ends_with(".jpg"));
        // Fixed-width timestamp keeps lexicographic order chronological.
        assert_eq!(name.len(), "capture_20240307_010203_000000.jpg".len());
    }
}
