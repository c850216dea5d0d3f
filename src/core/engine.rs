//! Extraction engine contract
//!
//! The engine resolves media URLs into metadata and performs the actual
//! transfer. Both calls block the calling thread; callers run them on a
//! worker context (`tokio::task::spawn_blocking`). During a download the engine
//! invokes the supplied progress hook between chunks, and the hook may answer
//! with a [`StopSignal`] which the engine must surface as
//! [`EngineError::Stopped`]. A hook may also park for a while; it is handed a
//! [`TransferSuspend`] so engines whose transfer keeps running outside the
//! hook's thread can be frozen for that time.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core::models::{EngineError, EngineOptions};
use crate::utils::file_utils::output_template;

/// Marker returned by a progress hook to abort the running transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopSignal;

impl From<StopSignal> for EngineError {
    fn from(_: StopSignal) -> Self {
        EngineError::Stopped
    }
}

/// Freezes the transfer while the progress hook is parked
pub trait TransferSuspend {
    fn suspend(&self) -> Result<(), EngineError>;
    fn resume(&self) -> Result<(), EngineError>;
}

/// For engines that transfer on the hook's own thread and stall with it
pub struct InlineTransfer;

impl TransferSuspend for InlineTransfer {
    fn suspend(&self) -> Result<(), EngineError> {
        Ok(())
    }

    fn resume(&self) -> Result<(), EngineError> {
        Ok(())
    }
}

/// Progress hook handed to [`ExtractionEngine::download`]
pub type ProgressHook<'a> =
    dyn FnMut(&ProgressEvent, &dyn TransferSuspend) -> Result<(), StopSignal> + Send + 'a;

/// One progress tick as reported by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProgressEvent {
    Downloading {
        percent: String,
        speed: String,
        eta: String,
    },
    Finished,
}

impl ProgressEvent {
    pub fn downloading(percent: &str, speed: &str, eta: &str) -> Self {
        Self::Downloading {
            percent: percent.to_string(),
            speed: speed.to_string(),
            eta: eta.to_string(),
        }
    }
}

/// Raw format entry as returned by the engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFormat {
    pub format_id: String,
    pub resolution: Option<String>,
    pub height: Option<u32>,
    pub ext: Option<String>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub filesize: Option<u64>,
    pub filesize_approx: Option<u64>,
}

impl RawFormat {
    /// Engines report audio-only entries with vcodec `none`
    pub fn has_video(&self) -> bool {
        self.vcodec.as_deref() != Some("none")
    }

    pub fn effective_size(&self) -> Option<u64> {
        self.filesize.or(self.filesize_approx)
    }
}

/// Metadata for one media URL
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub title: Option<String>,
    pub thumbnail_url: Option<String>,
    pub preview_url: Option<String>,
    pub formats: Vec<RawFormat>,
}

/// Request headers and transport switches shared by both engine calls
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub skip_certificate_check: bool,
    pub headers: HashMap<String, String>,
}

impl RequestOptions {
    /// Metadata request: full header set, referer and certificate switch included
    pub fn for_url(url: &str, options: &EngineOptions) -> Self {
        Self {
            user_agent: options.user_agent.clone(),
            referer: options.send_referer.then(|| url.to_string()),
            skip_certificate_check: options.skip_certificate_check,
            headers: options.headers.clone(),
        }
    }

    /// Transfer request: only the user agent and extra headers
    pub fn for_transfer(options: &EngineOptions) -> Self {
        Self {
            user_agent: options.user_agent.clone(),
            referer: None,
            skip_certificate_check: false,
            headers: options.headers.clone(),
        }
    }
}

/// Fully resolved download call
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRequest {
    pub url: String,
    pub format_selector: String,
    pub output_template: String,
    pub concurrent_fragments: usize,
    pub buffer_size: Option<u64>,
    pub retries: Option<u32>,
    pub fragment_retries: Option<u32>,
    pub continue_partial: bool,
    pub request: RequestOptions,
}

impl DownloadRequest {
    pub fn build(
        url: &str,
        format_id: &str,
        target_dir: &std::path::Path,
        display_name: &str,
        options: &EngineOptions,
    ) -> Self {
        let format_selector = if options.audio_merge {
            format!("{}+bestaudio/best", format_id)
        } else {
            format_id.to_string()
        };

        Self {
            url: url.to_string(),
            format_selector,
            output_template: output_template(target_dir, display_name)
                .to_string_lossy()
                .to_string(),
            concurrent_fragments: options.concurrent_fragments,
            buffer_size: options.buffer_size,
            retries: options.retries,
            fragment_retries: options.fragment_retries,
            continue_partial: options.continue_partial,
            request: RequestOptions::for_transfer(options),
        }
    }
}

/// Blocking extraction/download service
pub trait ExtractionEngine: Send + Sync {
    /// Name of the engine (for logging)
    fn name(&self) -> &'static str;

    /// Fetch metadata without downloading
    fn extract_info(&self, url: &str, options: &RequestOptions) -> Result<MediaInfo, EngineError>;

    /// Run the transfer to completion, calling `hook` on every progress tick
    ///
    /// The [`TransferSuspend`] passed to the hook must stop the transfer from
    /// advancing when the transfer does not run on the calling thread.
    fn download(
        &self,
        request: &DownloadRequest,
        hook: &mut ProgressHook<'_>,
    ) -> Result<(), EngineError>;
}
