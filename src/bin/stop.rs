//! Graceful stop for a running framekeeper instance.

// Only the read/probe/remove subset is used here.
#[allow(dead_code)]
#[path = "../module/util/pid.rs"]
mod pid;

use pid::{process_alive, read_pid, remove_pid_file};
use std::thread;
use std::time::Duration;

const DEFAULT_PID_FILE: &str = "/var/run/framekeeper.pid";
const STOP_WAIT_SECONDS: u32 = 10;

fn main() {
    let pid_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_PID_FILE.to_string());

    let pid = match read_pid(&pid_path) {
        Some(pid) => pid,
        None => {
            eprintln!("No readable PID in {}; nothing to stop.", pid_path);
            std::process::exit(1);
        }
    };

    if !process_alive(pid) {
        println!("Process {} is not running; removing stale {}.", pid, pid_path);
        remove_pid_file(&pid_path);
        return;
    }

    println!("Sending SIGTERM to PID {}...", pid);
    unsafe {
        libc::kill(pid, libc::SIGTERM);
    }

    for _ in 0..STOP_WAIT_SECONDS {
        thread::sleep(Duration::from_secs(1));
        if !process_alive(pid) {
            println!("Stopped.");
            return;
        }
    }

    eprintln!(
        "PID {} still alive after {}s; not forcing.",
        pid, STOP_WAIT_SECONDS
    );
    std::process::exit(1);
}
