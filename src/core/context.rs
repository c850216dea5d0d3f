//! Explicit application context shared by the resolver and the task controllers

use std::sync::Arc;
use std::time::Duration;

use crate::core::config::AppConfig;
use crate::core::engine::ExtractionEngine;
use crate::core::models::AppResult;
use crate::core::player::MediaPlayer;
use crate::core::thumbnail::{HttpThumbnailFetcher, NoThumbnails, ThumbnailFetcher};
use crate::core::ytdlp::YtDlpEngine;

/// Collaborators and settings handed to the download manager
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub engine: Arc<dyn ExtractionEngine>,
    pub thumbnails: Arc<dyn ThumbnailFetcher>,
    pub player: Option<Arc<dyn MediaPlayer>>,
}

impl AppContext {
    /// Production wiring: yt-dlp engine and HTTP thumbnails, no player
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let engine: Arc<dyn ExtractionEngine> =
            Arc::new(YtDlpEngine::new(config.download.engine_binary.clone()));

        let thumbnails: Arc<dyn ThumbnailFetcher> = if config.analysis.fetch_thumbnail {
            Arc::new(HttpThumbnailFetcher::new(
                &config.analysis.thumbnail_user_agent,
                Duration::from_secs(config.analysis.thumbnail_timeout_secs),
            )?)
        } else {
            Arc::new(NoThumbnails)
        };

        Ok(Self {
            config: Arc::new(config),
            engine,
            thumbnails,
            player: None,
        })
    }

    /// Context around a custom engine, thumbnails disabled
    pub fn with_engine(config: AppConfig, engine: Arc<dyn ExtractionEngine>) -> Self {
        Self {
            config: Arc::new(config),
            engine,
            thumbnails: Arc::new(NoThumbnails),
            player: None,
        }
    }

    pub fn with_thumbnails(mut self, thumbnails: Arc<dyn ThumbnailFetcher>) -> Self {
        self.thumbnails = thumbnails;
        self
    }

    pub fn with_player(mut self, player: Arc<dyn MediaPlayer>) -> Self {
        self.player = Some(player);
        self
    }
}
