//! This module provides miscellaneous utilities.

// Import the submodules for configuration, initialization, paths and PID handling
pub mod conf; // Configuration module
pub mod init; // Initialization module
pub mod path; // Path module
pub mod pid; // PID file module
