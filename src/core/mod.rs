//! Core business logic module
//!
//! This module contains the domain models, the format resolver, the download
//! task controller and the manager/runtime that coordinate them.

pub mod config;
pub mod context;
pub mod controller;
pub mod engine;
pub mod manager;
pub mod models;
pub mod player;
pub mod registry;
pub mod resolver;
pub mod runtime;
pub mod thumbnail;
pub mod ytdlp;

#[cfg(test)]
pub(crate) mod mock_engine;


#[cfg(test)]
mod controller_integration_tests;

// Re-export commonly used types
pub use config::AppConfig;
pub use manager::DownloadManager;
