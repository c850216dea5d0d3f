//! Utility modules and helper functions
//!
//! Shared helpers used across the application.

pub mod file_utils;
pub mod formatting;
pub mod logging;
pub mod process;

// Re-export commonly used utilities
pub use file_utils::*;
pub use formatting::*;
pub use logging::*;
pub use process::*;
