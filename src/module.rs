//! This module contains all the sub-modules of the service.

pub mod control; // Control module: Shutdown/reload flags and signal wiring.
pub mod define; // Definition module: Contains definitions and constants used throughout the service.
pub mod disk; // Disk module: Storage utilization checks and oldest-day eviction.
pub mod health; // Health module: Heartbeat logging and liveness snapshot.
pub mod schedule; // Schedule module: Time-of-day driven capture pacing.
pub mod service; // Service module: The resilient capture-and-persist loop.
pub mod store; // Store module: Frame persistence into the date-partitioned tree.
pub mod util; // Utility module: Provides configuration, paths and process helpers.
pub mod vision; // Vision module: Camera handling, frame rasters and similarity.
