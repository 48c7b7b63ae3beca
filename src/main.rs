//! Framekeeper is a self-healing image acquisition daemon: it captures
//! frames from a V4L2 camera on a time-of-day schedule, skips frames
//! that did not change, and keeps the disk below its usage ceiling by
//! evicting the oldest day partitions.

pub mod module;
use crate::module::control;
use crate::module::service;
use crate::module::util::init::resource::init;
use crate::module::util::pid;

/// Command line overrides. The configuration file remains the primary
/// tuning surface; these exist for service files and ad-hoc runs.
#[derive(Debug, Default)]
struct CliArgs {
    config_dir: Option<String>,
    log_dir: Option<String>,
    log_level: Option<String>,
    pid_file: Option<String>,
}

fn parse_args() -> CliArgs {
    let mut parsed = CliArgs::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => parsed.config_dir = args.next(),
            "--logdir" => parsed.log_dir = args.next(),
            "--loglevel" => parsed.log_level = args.next(),
            "--pidfile" => parsed.pid_file = args.next(),
            // Accepted for compatibility with older service files.
            "--use-config" => {}
            other => eprintln!("Ignoring unknown argument '{}'.", other),
        }
    }
    parsed
}

pub fn main() {
    let args = parse_args();

    // Prepare directories and configuration before anything can log.
    let mut property = init(args.config_dir.as_deref());
    if let Some(log_dir) = args.log_dir {
        property.conf.paths.log_dir = log_dir.clone();
        property.path.dir.log = log_dir;
        std::fs::create_dir_all(&property.path.dir.log).ok();
    }
    if let Some(level) = args.log_level {
        property.conf.logging.level = level;
    }
    if let Some(pid_file) = args.pid_file {
        property.conf.paths.pid_file = pid_file;
    }

    init_log(
        property.path.dir.log.as_str(),
        crate::module::define::system::NAME,
        &property.conf.logging.level,
    );
    log::info!("Starting framekeeper...");
    log::info!(
        "Data dir: {}, image dir: {}, log dir: {}",
        property.path.dir.data,
        property.path.dir.img,
        property.path.dir.log
    );

    // A second instance would fight over the camera and the PID file.
    let pid_file = property.conf.paths.pid_file.clone();
    if !pid::ensure_single_instance(&pid_file) {
        log::error!("Another instance is already running. Exiting.");
        std::process::exit(1);
    }
    if let Err(e) = pid::create_pid_file(&pid_file) {
        log::error!("Failed to write PID file {}: {}", pid_file, e);
        std::process::exit(1);
    }

    let ctl = control::Control::new();
    control::install_signal_handlers(&ctl);

    service::run(&mut property, &ctl);

    pid::remove_pid_file(&pid_file);
    log::info!("Framekeeper stopped.");
}

/// Initializes the logger system using the log4rs crate: a file sink in
/// the log directory plus stderr, at the configured level.
///
/// # Arguments
/// * `dir` - A string slice that holds the directory where the log file will be stored
/// * `name` - A string slice that holds the name of the logger and the log file
/// * `level` - The configured log level name; unknown names fall back to INFO
///
fn init_log(dir: &str, name: &str, level: &str) {
    use crate::module::util::path::join;
    use log::LevelFilter;
    use log4rs::append::console::{ConsoleAppender, Target};
    use log4rs::append::file::FileAppender;
    use log4rs::config::{Appender, Config, Root};
    use log4rs::encode::pattern::PatternEncoder;

    let level = match level.to_ascii_uppercase().as_str() {
        "TRACE" => LevelFilter::Trace,
        "DEBUG" => LevelFilter::Debug,
        "INFO" => LevelFilter::Info,
        "WARN" => LevelFilter::Warn,
        "ERROR" => LevelFilter::Error,
        other => {
            eprintln!("Unknown log level '{}'; using INFO.", other);
            LevelFilter::Info
        }
    };

    let logfile = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{h({d} - {l}: {m}{n})}")))
        .build(join(&[dir, &format!("{}.log", name)]))
        .unwrap();

    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new("{h({d} - {l}: {m}{n})}")))
        .build();

    let config = Config::builder()
        .appender(Appender::builder().build("logfile", Box::new(logfile)))
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(
            Root::builder()
                .appender("logfile")
                .appender("stderr")
                .build(level),
        )
        .unwrap();
    log4rs::init_config(config).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::{debug, error, info, warn};
    use std::fs;
    use std::path::Path;

    // A simple test case for the init_log function
    #[test]
    fn test_log() {
        // Define a test directory and name
        let dir = "/tmp/framekeepertest/log/";
        fs::create_dir_all(dir).unwrap();
        let name = "test_log";
        let _ = fs::remove_file(Path::new(dir).join("test_log.log"));

        // Call the init_log function
        init_log(dir, name, "INFO");

        // Perform some logging
        debug!("Debug Message");
        info!("Info Message");
        warn!("Warning Message");
        error!("Error Message");

        // Read the contents of the log file
        let log_file_path = Path::new(dir).join("test_log.log");
        let log_contents = fs::read_to_string(log_file_path).expect("Failed to read log file");

        // Assert that log messages are present in the file
        assert!(!log_contents.contains("Debug Message"));
        assert!(log_contents.contains("Info Message"));
        assert!(log_contents.contains("Warning Message"));
        assert!(log_contents.contains("Error Message"));
    }
}
