//! Core data models for the media downloader

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::utils::formatting::format_bytes;

/// Identifier of a download task inside the registry
pub type TaskId = String;

/// Life-cycle state of a download task

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TaskState {
    Running,

    Paused,

    Cancelling,

    Completed,

    Failed,
}

impl TaskState {
    /// Completed and Failed never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        use TaskState::*;

        match (self, next) {
            (Running, Paused) | (Paused, Running) => true,
            (Running, Cancelling) | (Paused, Cancelling) => true,
            (Running, Completed) | (Running, Failed) => true,
            // the engine may wrap up between two hook calls while paused
            (Paused, Completed) | (Paused, Failed) => true,
            _ => false,
        }
    }
}

/// One selectable quality option of an analysed URL

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormatDescriptor {
    pub resolution: String,

    pub size_estimate: Option<u64>,

    pub format_id: String,

    pub height: Option<u32>,

    pub ext: Option<String>,
}

impl FormatDescriptor {
    /// Label shown in the quality picker: `1080p (12.3MB) ID:137`
    pub fn label(&self) -> String {
        format!(
            "{} ({}) ID:{}",
            self.resolution,
            format_bytes(self.size_estimate),
            self.format_id
        )
    }

    /// Recover the format id from a picker label
    pub fn parse_label_id(label: &str) -> Option<&str> {
        let id = label.rsplit_once("ID:").map(|(_, id)| id.trim())?;
        if id.is_empty() {
            None
        } else {
            Some(id)
        }
    }
}

/// How the default entry of a format list is picked

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Last entry in engine order
    #[default]
    Last,

    First,

    /// Tallest video, ties resolved towards the later entry
    HighestResolution,
}

impl SelectionPolicy {
    pub fn pick(&self, formats: &[FormatDescriptor]) -> Option<usize> {
        if formats.is_empty() {
            return None;
        }

        match self {
            Self::Last => Some(formats.len() - 1),
            Self::First => Some(0),
            Self::HighestResolution => formats
                .iter()
                .enumerate()
                .max_by_key(|(_, f)| f.height.unwrap_or(0))
                .map(|(idx, _)| idx),
        }
    }
}

/// Outcome of a successful analysis call

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub url: String,

    pub title: String,

    #[serde(skip_serializing)]
    pub thumbnail: Option<Bytes>,

    pub preview_stream_url: Option<String>,

    pub formats: Vec<FormatDescriptor>,

    /// Index of the pre-selected entry in `formats`
    pub default_index: Option<usize>,
}

impl AnalysisResult {
    pub fn default_format(&self) -> Option<&FormatDescriptor> {
        self.default_index.and_then(|idx| self.formats.get(idx))
    }

    pub fn labels(&self) -> Vec<String> {
        self.formats.iter().map(FormatDescriptor::label).collect()
    }
}

/// Last progress numbers reported by the engine

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressSnapshot {
    /// 0 to 100
    pub percent: f64,

    pub percent_text: String,

    pub speed: String,

    pub eta: String,
}

impl ProgressSnapshot {
    pub fn fraction(&self) -> f64 {
        self.percent / 100.0
    }
}

impl Default for ProgressSnapshot {
    fn default() -> Self {
        Self {
            percent: 0.0,

            percent_text: "0%".to_string(),

            speed: "N/A".to_string(),

            eta: "N/A".to_string(),
        }
    }
}

/// A user-initiated download

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadTask {
    pub id: TaskId,

    pub url: String,

    pub display_name: String,

    pub target_dir: PathBuf,

    pub format_id: String,

    pub state: TaskState,

    pub last_progress: ProgressSnapshot,

    pub status_text: String,

    pub error_message: Option<String>,

    pub created_at: chrono::DateTime<chrono::Utc>,

    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Everything needed to submit a new download

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDownload {
    pub url: String,

    pub display_name: String,

    pub format_id: String,

    pub target_dir: PathBuf,
}

/// Options handed to the extraction engine

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineOptions {
    pub engine_binary: String,

    pub concurrent_fragments: usize,

    pub buffer_size: Option<u64>,

    pub retries: Option<u32>,

    pub fragment_retries: Option<u32>,

    /// Resume partially downloaded files
    pub continue_partial: bool,

    pub user_agent: Option<String>,

    /// Send the media URL as Referer when fetching metadata
    pub send_referer: bool,

    /// Metadata requests only, transfers keep certificate checks
    pub skip_certificate_check: bool,

    pub headers: HashMap<String, String>,

    /// Mux the chosen video format with the best audio stream
    pub audio_merge: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            engine_binary: "yt-dlp".to_string(),

            concurrent_fragments: 12,

            buffer_size: None,

            retries: None,

            fragment_retries: None,

            continue_partial: false,

            user_agent: None,

            send_referer: false,

            skip_certificate_check: false,

            headers: HashMap::new(),

            audio_merge: true,
        }
    }
}

/// Errors surfaced by an extraction engine call

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum EngineError {
    /// The progress hook asked the transfer to stop
    #[error("transfer stopped on request")]
    Stopped,

    #[error("engine binary not found: {0}")]
    ToolNotFound(String),

    #[error("unsupported URL: {0}")]
    Unsupported(String),

    #[error("network failure: {0}")]
    Network(String),

    #[error("engine output could not be parsed: {0}")]
    Parse(String),

    #[error("engine process failed: {0}")]
    Process(String),
}

impl EngineError {
    pub fn is_stop_signal(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

/// Metadata fetch failure

#[derive(Debug, Clone, thiserror::Error)]
pub enum AnalysisError {
    #[error("URL is empty")]
    EmptyUrl,

    #[error("analysis failed: {0}")]
    Engine(#[from] EngineError),

    #[error("analysis worker failed: {0}")]
    Worker(String),
}

/// Download failure that is not a cancellation

#[derive(Debug, Clone, thiserror::Error)]
pub enum TransferError {
    #[error("transfer failed: {0}")]
    Engine(EngineError),

    #[error("transfer worker failed: {0}")]
    Worker(String),
}

/// Application error types

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Invalid task state: {0}")]
    InvalidState(String),

    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Result type alias for application operations

pub type AppResult<T> = Result<T, AppError>;
