//! Camera Functions
//!
//! Owns the open V4L2 stream. Opening negotiates pixel format, frame
//! rate and resolution with retry and read-back confirmation; whatever
//! the device actually negotiated is accepted and reported back to the
//! loop, mismatches are logged but never fatal.

use rscam::Camera;
use std::path::Path;

use super::frame::Frame;
use crate::module::control::Control;
use crate::module::define;
use crate::module::util::conf;

/// Failure to produce an open, parameterized device handle.
#[derive(Debug)]
pub enum DeviceError {
    /// The device node does not exist.
    NodeNotFound(String),
    /// The handle could not be created or the stream could not start.
    OpenFailed(String),
    /// Shutdown was requested while negotiating.
    ShutdownRequested,
}

impl std::fmt::Display for DeviceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceError::NodeNotFound(path) => write!(f, "device node {} not found", path),
            DeviceError::OpenFailed(detail) => write!(f, "device open failed: {}", detail),
            DeviceError::ShutdownRequested => write!(f, "shutdown requested during open"),
        }
    }
}

/// Failure to pull a usable frame from an open device.
#[derive(Debug)]
pub enum ReadError {
    /// The driver returned no frame.
    Capture(String),
    /// The frame buffer could not be interpreted.
    Decode(String),
    /// The driver returned a degenerate frame.
    Empty,
}

impl std::fmt::Display for ReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadError::Capture(detail) => write!(f, "frame capture failed: {}", detail),
            ReadError::Decode(detail) => write!(f, "frame decode failed: {}", detail),
            ReadError::Empty => write!(f, "empty frame returned"),
        }
    }
}

/// An open, parameterized capture device.
pub struct Device {
    cam: Camera,
    /// FOURCC the device actually negotiated.
    pub effective_fourcc: String,
    /// Resolution the device actually negotiated.
    pub resolution: (u32, u32),
}

impl Device {
    /// Discard one buffered frame to reduce latency.
    pub fn grab(&self) {
        let _ = self.cam.capture();
    }

    /// Pull one frame and interpret it according to the negotiated FOURCC.
    pub fn read(&self) -> Result<Frame, ReadError> {
        let raw = self
            .cam
            .capture()
            .map_err(|e| ReadError::Capture(e.to_string()))?;
        let (width, height) = raw.resolution;
        let frame = Frame::from_raw(&self.effective_fourcc, width, height, raw[..].to_vec())
            .map_err(ReadError::Decode)?;
        if frame.is_empty() {
            return Err(ReadError::Empty);
        }
        Ok(frame)
    }

    /// Stop the stream and release the handle. Errors are swallowed;
    /// consuming `self` makes a double close impossible.
    pub fn close(mut self) {
        let _ = self.cam.stop();
    }
}

/// Open and parameterize the capture device.
///
/// # Arguments
///
/// * `camera` - The `[camera]` configuration section.
/// * `control` - Shutdown flag; negotiation waits are interruptible.
///
pub fn open(camera: &conf::Camera, control: &Control) -> Result<Device, DeviceError> {
    log::info!("Opening camera device: {}", camera.device_path);

    if !Path::new(&camera.device_path).exists() {
        log::error!("Camera device node {} does not exist.", camera.device_path);
        return Err(DeviceError::NodeNotFound(camera.device_path.clone()));
    }

    let mut cam =
        Camera::new(&camera.device_path).map_err(|e| DeviceError::OpenFailed(e.to_string()))?;

    let requested_fourcc = fourcc_bytes(&camera.requested_fourcc);
    let requested = rscam::Config {
        interval: (1, camera.fps),
        resolution: (camera.width, camera.height),
        format: &requested_fourcc,
        nbuffers: 1,
        ..Default::default()
    };

    // Set, settle, confirm; retry a fixed number of times.
    let mut started = false;
    for attempt in 1..=define::camera::PARAMETER_SET_RETRIES {
        match cam.start(&requested) {
            Ok(()) => {
                started = true;
                break;
            }
            Err(e) => log::warn!(
                "Attempt {}/{} to start stream with {} {}x{} failed: {}",
                attempt,
                define::camera::PARAMETER_SET_RETRIES,
                camera.requested_fourcc,
                camera.width,
                camera.height,
                e
            ),
        }
        if control.wait(define::camera::PARAMETER_SETTLE_DELAY) {
            return Err(DeviceError::ShutdownRequested);
        }
    }

    if !started {
        // The device is still usable with whatever it can negotiate.
        let fallback_fourcc = if camera.requested_fourcc.eq_ignore_ascii_case("MJPG") {
            *b"YUYV"
        } else {
            *b"MJPG"
        };
        log::warn!(
            "Requested format {} rejected; trying {}.",
            camera.requested_fourcc,
            fourcc_str(&fallback_fourcc)
        );
        let fallback = rscam::Config {
            interval: (1, camera.fps),
            resolution: (camera.width, camera.height),
            format: &fallback_fourcc,
            nbuffers: 1,
            ..Default::default()
        };
        cam.start(&fallback)
            .map_err(|e| DeviceError::OpenFailed(e.to_string()))?;
    }

    if control.shutdown_requested() {
        let _ = cam.stop();
        return Err(DeviceError::ShutdownRequested);
    }

    // Read back what was actually negotiated from a probe frame.
    let probe = cam
        .capture()
        .map_err(|e| DeviceError::OpenFailed(format!("probe capture failed: {}", e)))?;
    let effective_fourcc = fourcc_str(&probe.format);
    let resolution = probe.resolution;

    if !param_matches(
        &ParamValue::Fourcc(fourcc_code(&requested_fourcc)),
        &ParamValue::Fourcc(fourcc_code(&probe.format)),
    ) {
        log::warn!(
            "Requested FOURCC {} was not applied; device negotiated {}.",
            camera.requested_fourcc,
            effective_fourcc
        );
    }
    if !param_matches(
        &ParamValue::Int(camera.width as i64),
        &ParamValue::Int(resolution.0 as i64),
    ) || !param_matches(
        &ParamValue::Int(camera.height as i64),
        &ParamValue::Int(resolution.1 as i64),
    ) {
        log::error!(
            "Actual resolution {}x{} differs from requested {}x{}!",
            resolution.0,
            resolution.1,
            camera.width,
            camera.height
        );
    }

    log::info!(
        "Camera initialized: {} -> FOURCC: {}, resolution: {}x{}",
        camera.device_path,
        effective_fourcc,
        resolution.0,
        resolution.1
    );

    Ok(Device {
        cam,
        effective_fourcc,
        resolution,
    })
}

/// A device property value for read-back comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Fourcc(u32),
}

/// Compare a requested property against its read-back value: FOURCC by
/// exact integer code, floats within a small epsilon, integers exactly.
pub fn param_matches(requested: &ParamValue, actual: &ParamValue) -> bool {
    match (requested, actual) {
        (ParamValue::Int(a), ParamValue::Int(b)) => a == b,
        (ParamValue::Float(a), ParamValue::Float(b)) => {
            (a - b).abs() < define::camera::FLOAT_COMPARE_EPSILON
        }
        (ParamValue::Fourcc(a), ParamValue::Fourcc(b)) => a == b,
        _ => false,
    }
}

/// FOURCC string to its four byte form, space padded.
pub fn fourcc_bytes(text: &str) -> [u8; 4] {
    let mut bytes = [b' '; 4];
    for (i, b) in text.bytes().take(4).enumerate() {
        bytes[i] = b;
    }
    bytes
}

/// FOURCC bytes to the packed little-endian integer code.
pub fn fourcc_code(bytes: &[u8; 4]) -> u32 {
    u32::from_le_bytes(*bytes)
}

/// FOURCC bytes to a printable string for logs.
pub fn fourcc_str(bytes: &[u8; 4]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '?'
            }
        })
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_round_trip() {
        let bytes = fourcc_bytes("YUYV");
        assert_eq!(&bytes, b"YUYV");
        assert_eq!(fourcc_str(&bytes), "YUYV");
    }

    #[test]
    fn test_fourcc_pads_short_codes() {
        let bytes = fourcc_bytes("Y16");
        assert_eq!(&bytes, b"Y16 ");
        assert_eq!(fourcc_str(&bytes), "Y16");
    }

    #[test]
    fn test_fourcc_codes_differ() {
        assert_ne!(fourcc_code(b"YUYV"), fourcc_code(b"MJPG"));
        assert_eq!(fourcc_code(b"YUYV"), fourcc_code(&fourcc_bytes("YUYV")));
    }

    #[test]
    fn test_param_matches_int_exact() {
        assert!(param_matches(&ParamValue::Int(1920), &ParamValue::Int(1920)));
        assert!(!param_matches(&ParamValue::Int(1920), &ParamValue::Int(1280)));
    }

    #[test]
    fn test_param_matches_float_epsilon() {
        assert!(param_matches(
            &ParamValue::Float(10.0),
            &ParamValue::Float(10.0 + 1e-12)
        ));
        assert!(!param_matches(
            &ParamValue::Float(10.0),
            &ParamValue::Float(9.5)
        ));
    }

    #[test]
    fn test_param_matches_rejects_kind_mismatch() {
        assert!(!param_matches(&ParamValue::Int(10), &ParamValue::Float(10.0)));
    }

    #[test]
    fn test_open_missing_node_fails_typed() {
        let camera = conf::Camera {
            device_path: "/dev/framekeeper-does-not-exist".to_string(),
            ..Default::default()
        };
        let control = Control::new();
        match open(&camera, &control) {
            Err(DeviceError::NodeNotFound(path)) => {
                assert_eq!(path, "/dev/framekeeper-does-not-exist")
            }
            other => panic!("expected NodeNotFound, got {:?}", other.map(|_| ())),
        }
    }
}
