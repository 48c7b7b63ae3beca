//! Frame Persistence
//!
//! Turns a captured raster into an on-disk JPEG under the
//! `<base>/<YYYY-MM>/<DD>` partition, gated by the similarity engine.
//! Every failure path increments the consecutive write-failure counter
//! on the service state and reports back; nothing here is fatal.

use chrono::{DateTime, Local};
use image::codecs::jpeg::JpegEncoder;
use image::ColorType;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use super::service::ServiceState;
use super::util::conf::Config;
use super::util::path as apppath;
use super::vision::frame::Frame;
use super::vision::{similarity, stamp};

/// File mode of every stored image.
const STORED_IMAGE_MODE: u32 = 0o644;

/// Result of one save attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The frame was persisted at this path.
    Saved(String),
    /// The frame matched the last significant frame and was skipped.
    Similar,
    /// The frame could not be persisted; the failure counter was bumped.
    Failed,
}

/// Process one frame and try to persist it.
///
/// Normalizes the channel layout, consults the similarity engine,
/// overlays the timestamp, and writes the encoded image. The retained
/// significant frame is always the pre-stamp raster so overlay pixels
/// never influence future comparisons.
///
/// # Arguments
///
/// * `state` - Mutable service state (failure counters, retained frame).
/// * `frame` - The captured raster, owned for this cycle.
/// * `conf` - The active configuration.
/// * `now` - Capture moment, used for partitioning and the overlay.
///
pub fn save_frame(
    state: &mut ServiceState,
    frame: Frame,
    conf: &Config,
    now: DateTime<Local>,
) -> SaveOutcome {
    if frame.is_empty() {
        log::error!("Received an empty frame, nothing to persist.");
        state.consecutive_imwrite_failures += 1;
        return SaveOutcome::Failed;
    }

    // Normalize to three channels. Unrecognized layouts are carried
    // through with a warning rather than rejected.
    let processed = match frame.to_rgb() {
        Some(rgb) => rgb,
        None => {
            log::warn!(
                "Unrecognized channel layout {:?}; attempting to persist as-is.",
                frame.layout
            );
            frame
        }
    };

    if similarity::similar(
        state.last_significant_frame.as_ref(),
        &processed,
        conf.similarity.threshold_percent_int,
    ) {
        return SaveOutcome::Similar;
    }

    // Retain the pre-stamp raster for future comparisons.
    state.last_significant_frame = Some(processed.clone());

    let mut stamped = processed;
    if conf.image_processing.enable_timestamp {
        stamp::add_timestamp(&mut stamped, &now, &conf.image_processing.timestamp_format);
    }

    let save_dir = match resolve_save_dir(conf, &now) {
        Some(dir) => dir,
        None => {
            state.consecutive_imwrite_failures += 1;
            return SaveOutcome::Failed;
        }
    };

    let filepath = apppath::join(&[&save_dir, &apppath::capture_file_name(&now)]);
    log::debug!(
        "Saving image to {} (quality {})",
        filepath,
        conf.camera.jpeg_quality
    );

    match encode_jpeg(&stamped, &filepath, conf.camera.jpeg_quality) {
        Ok(()) => {
            state.consecutive_imwrite_failures = 0;
            set_stored_mode(&filepath);

            let min_size = conf.disk_management.min_jpeg_save_size_bytes;
            if min_size > 0 {
                let actual = fs::metadata(&filepath).map(|m| m.len()).unwrap_or(0);
                if actual < min_size {
                    // Implausibly small output signals a corrupt encode.
                    let _ = fs::remove_file(&filepath);
                    log::error!(
                        "JPEG too small ({}B < {}B); treated as a write failure.",
                        actual,
                        min_size
                    );
                    state.consecutive_imwrite_failures += 1;
                    return SaveOutcome::Failed;
                }
            }
            SaveOutcome::Saved(filepath)
        }
        Err(e) => {
            log::error!("JPEG encode to {} failed: {}", filepath, e);
            state.consecutive_imwrite_failures += 1;
            SaveOutcome::Failed
        }
    }
}

/// Ensure the date partition exists under the base directory, retrying
/// under the fallback base when configured.
fn resolve_save_dir(conf: &Config, now: &DateTime<Local>) -> Option<String> {
    let primary = apppath::day_dir(&conf.paths.image_save_base_dir, now);
    if fs::create_dir_all(Path::new(&primary)).is_ok() {
        return Some(primary);
    }
    log::error!("Failed to create save directory {}.", primary);

    match conf.fallback_dir() {
        Some(fallback_base) => {
            let fallback = apppath::day_dir(fallback_base, now);
            match fs::create_dir_all(Path::new(&fallback)) {
                Ok(_) => {
                    log::warn!("Using fallback save directory: {}", fallback);
                    Some(fallback)
                }
                Err(e) => {
                    log::error!("Failed to create fallback directory {}: {}", fallback, e);
                    None
                }
            }
        }
        None => None,
    }
}

/// Encode the raster as JPEG at the configured quality.
fn encode_jpeg(frame: &Frame, filepath: &str, quality: u8) -> Result<(), String> {
    let expected = (frame.width as usize) * (frame.height as usize) * 3;
    if frame.data.len() != expected {
        return Err(format!(
            "buffer of {} bytes does not match {}x{} RGB",
            frame.data.len(),
            frame.width,
            frame.height
        ));
    }
    let file = fs::File::create(filepath).map_err(|e| e.to_string())?;
    let mut encoder = JpegEncoder::new_with_quality(file, quality);
    encoder
        .encode(&frame.data, frame.width, frame.height, ColorType::Rgb8)
        .map_err(|e| e.to_string())
}

/// Fix the stored image mode; failure is logged only.
fn set_stored_mode(filepath: &str) {
    let perms = fs::Permissions::from_mode(STORED_IMAGE_MODE);
    if let Err(e) = fs::set_permissions(filepath, perms) {
        log::warn!("Failed to set permissions on {}: {}", filepath, e);
    }
}
