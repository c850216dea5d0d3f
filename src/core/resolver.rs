//! Format descriptor resolver
//!
//! Turns a media URL into an [`AnalysisResult`]: display title, thumbnail,
//! preview stream and the list of video formats the user can pick from.
//! The engine call blocks, so it runs on the blocking pool.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::core::config::{AnalysisConfig, AppConfig};
use crate::core::context::AppContext;
use crate::core::engine::{ExtractionEngine, MediaInfo, RawFormat, RequestOptions};
use crate::core::models::{AnalysisError, AnalysisResult, FormatDescriptor};
use crate::core::thumbnail::ThumbnailFetcher;

/// Title used when the engine reports none
pub const DEFAULT_TITLE: &str = "video";

#[derive(Clone)]
pub struct FormatResolver {
    engine: Arc<dyn ExtractionEngine>,
    thumbnails: Arc<dyn ThumbnailFetcher>,
    config: Arc<AppConfig>,
}

impl FormatResolver {
    pub fn new(context: &AppContext) -> Self {
        Self {
            engine: Arc::clone(&context.engine),
            thumbnails: Arc::clone(&context.thumbnails),
            config: Arc::clone(&context.config),
        }
    }

    pub async fn analyze(&self, url: &str) -> Result<AnalysisResult, AnalysisError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(AnalysisError::EmptyUrl);
        }

        info!("🔍 Analyzing: {}", url);

        let request = RequestOptions::for_url(url, &self.config.download);
        let engine = Arc::clone(&self.engine);
        let owned_url = url.to_string();

        let media = tokio::task::spawn_blocking(move || engine.extract_info(&owned_url, &request))
            .await
            .map_err(|e| AnalysisError::Worker(e.to_string()))??;

        let thumbnail_url = media.thumbnail_url.clone();
        let mut result = build_analysis(url, media, &self.config.analysis);

        if self.config.analysis.fetch_thumbnail {
            if let Some(thumbnail_url) = thumbnail_url {
                match self.thumbnails.fetch(&thumbnail_url).await {
                    Ok(bytes) => result.thumbnail = Some(bytes),
                    Err(e) => warn!("Thumbnail unavailable for {}: {}", url, e),
                }
            }
        }

        info!(
            "✅ Analysis finished: {} ({} formats)",
            result.title,
            result.formats.len()
        );
        Ok(result)
    }
}

fn describe(format: &RawFormat) -> FormatDescriptor {
    let resolution = format
        .resolution
        .clone()
        .filter(|r| !r.trim().is_empty())
        .or_else(|| format.height.map(|h| format!("{}p", h)))
        .unwrap_or_else(|| "unknown".to_string());

    FormatDescriptor {
        resolution,
        size_estimate: format.effective_size(),
        format_id: format.format_id.clone(),
        height: format.height,
        ext: format.ext.clone(),
    }
}

/// Shape engine metadata into an analysis result without a thumbnail
pub fn build_analysis(url: &str, media: MediaInfo, config: &AnalysisConfig) -> AnalysisResult {
    let title = media
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_TITLE)
        .chars()
        .take(config.title_max_chars)
        .collect::<String>();

    let formats: Vec<FormatDescriptor> = media
        .formats
        .iter()
        .filter(|f| f.has_video())
        .map(describe)
        .collect();

    let skipped = media.formats.len() - formats.len();
    if skipped > 0 {
        debug!("Skipped {} audio-only formats", skipped);
    }

    let default_index = config.default_selection.pick(&formats);

    AnalysisResult {
        url: url.to_string(),
        title,
        thumbnail: None,
        preview_stream_url: media.preview_url,
        formats,
        default_index,
    }
}
