//! Processing related to visual information.
//!

pub mod camera; // Device lifecycle and parameter negotiation.
pub mod frame; // In-memory frame rasters and conversions.
pub mod similarity; // Frame-change decision engine.
pub mod stamp; // Timestamp overlay drawing.
