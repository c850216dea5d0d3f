//! Media Downloader Pro - Core Library
//!
//! Analyses media URLs into selectable formats, previews them and runs
//! downloads with pause, resume and confirmed cancel on top of a blocking
//! extraction engine.

pub mod core;
pub mod utils;

// Re-export commonly used types
pub use crate::core::{
    config::{AppConfig, VariantProfile},
    context::AppContext,
    controller::{ConfirmPrompt, DownloadController, PendingCancel},
    engine::{ExtractionEngine, InlineTransfer, ProgressEvent, StopSignal, TransferSuspend},
    manager::{DownloadEvent, DownloadManager, EventReceiver, EventSender},
    models::{
        AnalysisResult, AppError, AppResult, DownloadTask, FormatDescriptor, NewDownload,
        TaskState,
    },
    runtime::{spawn_download_runtime, DownloadRuntimeHandle},
    ytdlp::YtDlpEngine,
};

use std::sync::Arc;
use tokio::task::JoinHandle;

/// Handles owned by a running presentation layer
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub download_runtime: DownloadRuntimeHandle,
}

impl AppState {
    /// Wire the production context and spawn the runtime; events go to `observer`
    pub fn start(config: AppConfig, observer: EventSender) -> AppResult<(Self, JoinHandle<()>)> {
        let context = AppContext::new(config)?;
        Ok(Self::start_with(context, observer))
    }

    pub fn start_with(context: AppContext, observer: EventSender) -> (Self, JoinHandle<()>) {
        let config = Arc::clone(&context.config);
        let (manager, events) = DownloadManager::new(context);
        let (download_runtime, router) = spawn_download_runtime(manager, events, observer);

        (
            Self {
                config,
                download_runtime,
            },
            router,
        )
    }

    /// Stored configuration, or defaults when it is missing or broken
    pub fn load_or_initialize_config() -> AppConfig {
        match AppConfig::load() {
            Ok(cfg) => cfg,
            Err(err) => {
                tracing::warn!(
                    "Failed to load configuration from disk: {:#}. Using defaults",
                    err
                );
                let default_cfg = AppConfig::default();
                if let Err(save_err) = default_cfg.save() {
                    tracing::warn!("Failed to persist default configuration: {}", save_err);
                }
                default_cfg
            }
        }
    }
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Initialize the library with default settings
pub fn init() -> anyhow::Result<()> {
    utils::logging::init_tracing();

    tracing::info!("📚 {} v{} initialized", NAME, VERSION);
    Ok(())
}
