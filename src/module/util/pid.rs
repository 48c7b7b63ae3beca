//! PID File Management
//!
//! A PID file is the contract with external stop/status tooling. Failing
//! to create it at startup is the one hard failure this service allows,
//! because without it the operator cannot stop or query the process.

use std::fs;
use std::io;
use std::path::Path;

/// Write the current process id to `path`, creating parent directories
/// as needed.
pub fn create_pid_file(path: &str) -> io::Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, format!("{}", std::process::id()))?;
    log::info!("PID file created: {} (PID={})", path, std::process::id());
    Ok(())
}

/// Remove the PID file. Failure is logged but never fatal.
pub fn remove_pid_file(path: &str) {
    if Path::new(path).exists() {
        match fs::remove_file(path) {
            Ok(_) => log::info!("PID file removed: {}", path),
            Err(e) => log::warn!("Unable to remove PID file {}: {}", path, e),
        }
    }
}

/// Read a PID from the file, if it holds one.
pub fn read_pid(path: &str) -> Option<i32> {
    let text = fs::read_to_string(path).ok()?;
    text.trim().parse::<i32>().ok()
}

/// Whether a process with the given PID exists (signal 0 probe).
pub fn process_alive(pid: i32) -> bool {
    unsafe { libc::kill(pid, 0) == 0 }
}

/// Startup guard: refuse to run when another live instance owns the PID
/// file; remove the file when it is stale. Returns `false` when another
/// instance is running.
pub fn ensure_single_instance(path: &str) -> bool {
    if !Path::new(path).exists() {
        return true;
    }
    match read_pid(path) {
        Some(pid) if process_alive(pid) => {
            log::warn!(
                "Service already running with PID {} (found in {}). Remove the PID file if this is wrong.",
                pid,
                path
            );
            false
        }
        _ => {
            log::warn!("Found stale PID file {}. Removing it.", path);
            remove_pid_file(path);
            true
        }
    }
}
