//! Download Manager - owns the task registry and routes user commands
//!
//! The manager lives on a single interactive context (see [`crate::core::runtime`]).
//! Analysis and transfers run on worker contexts and report back through
//! [`DownloadEvent`]s; the owner feeds those events to [`DownloadManager::handle_event`]
//! so the registry is only ever mutated from the interactive side.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::config::{AnalysisConfig, AppConfig};
use crate::core::context::AppContext;
use crate::core::controller::{ConfirmPrompt, DownloadController, PendingCancel};
use crate::core::engine::DownloadRequest;
use crate::core::models::{
    AnalysisError, AnalysisResult, AppError, AppResult, DownloadTask, NewDownload,
    ProgressSnapshot, TaskId, TaskState,
};
use crate::core::player::{refresh_preview, MediaPlayer};
use crate::core::registry::TaskRegistry;
use crate::core::resolver::FormatResolver;
use crate::utils::file_utils::ensure_dir_exists;

/// Notice shown when analysis failures are reported to the user
pub const ANALYSIS_FAILURE_NOTICE: &str = "Could not analyze link.";

/// What to tell the user about a failed analysis, `None` to stay silent
pub fn analysis_failure_notice(config: &AnalysisConfig) -> Option<&'static str> {
    config
        .report_analysis_failures
        .then_some(ANALYSIS_FAILURE_NOTICE)
}

/// Events that can be emitted by the download manager
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum DownloadEvent {
    /// `seq` orders analyses by the time they were requested
    AnalysisStarted {
        seq: u64,
        url: String,
    },
    AnalysisCompleted {
        seq: u64,
        result: AnalysisResult,
    },
    /// `notice` is only set when failures are reported to the user
    AnalysisFailed {
        seq: u64,
        url: String,
        error: String,
        notice: Option<String>,
    },
    TaskCreated {
        task_id: TaskId,
        task: DownloadTask,
    },
    TaskProgress {
        task_id: TaskId,
        progress: ProgressSnapshot,
    },
    TaskPaused {
        task_id: TaskId,
    },
    TaskResumed {
        task_id: TaskId,
    },
    TaskCancelling {
        task_id: TaskId,
    },
    /// The engine reported the end of one transfer stream
    TaskTransferFinished {
        task_id: TaskId,
    },
    TaskCompleted {
        task_id: TaskId,
        target_dir: PathBuf,
    },
    TaskFailed {
        task_id: TaskId,
        error: String,
    },
    TaskRemoved {
        task_id: TaskId,
    },
}

impl DownloadEvent {
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::TaskCreated { task_id, .. }
            | Self::TaskProgress { task_id, .. }
            | Self::TaskPaused { task_id }
            | Self::TaskResumed { task_id }
            | Self::TaskCancelling { task_id }
            | Self::TaskTransferFinished { task_id }
            | Self::TaskCompleted { task_id, .. }
            | Self::TaskFailed { task_id, .. }
            | Self::TaskRemoved { task_id } => Some(task_id),
            _ => None,
        }
    }
}

/// Channel for communication between download manager and UI
pub type EventSender = mpsc::UnboundedSender<DownloadEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<DownloadEvent>;

/// Resolve, refresh the preview and report; shared by the awaited and spawned paths
async fn run_analysis(
    resolver: FormatResolver,
    player: Option<Arc<dyn MediaPlayer>>,
    config: Arc<AppConfig>,
    events: EventSender,
    seq: u64,
    url: String,
) -> Result<AnalysisResult, AnalysisError> {
    let _ = events.send(DownloadEvent::AnalysisStarted {
        seq,
        url: url.clone(),
    });

    match resolver.analyze(&url).await {
        Ok(result) => {
            if let (Some(player), Some(stream_url)) = (player, result.preview_stream_url.as_deref())
            {
                refresh_preview(player.as_ref(), stream_url, config.player.refresh_settle()).await;
            }

            let _ = events.send(DownloadEvent::AnalysisCompleted {
                seq,
                result: result.clone(),
            });
            Ok(result)
        }
        Err(err) => {
            warn!("❌ Analysis failed for {}: {}", url, err);
            let notice = analysis_failure_notice(&config.analysis).map(str::to_string);

            let _ = events.send(DownloadEvent::AnalysisFailed {
                seq,
                url,
                error: err.to_string(),
                notice,
            });
            Err(err)
        }
    }
}

/// Main download manager that orchestrates analysis and download tasks
pub struct DownloadManager {
    /// Settings and collaborators
    context: AppContext,

    resolver: FormatResolver,

    /// Visible tasks, creation order
    registry: TaskRegistry,

    /// Worker handles of started transfers
    workers: HashMap<TaskId, JoinHandle<()>>,

    /// Result of the latest requested analysis, once it succeeded
    last_analysis: Option<AnalysisResult>,

    /// Sequence number of the most recently requested analysis
    analysis_seq: u64,

    /// Event channel for communicating with UI
    event_sender: EventSender,
}

impl DownloadManager {
    /// Create a manager and the receiving end of its event channel
    pub fn new(context: AppContext) -> (Self, EventReceiver) {
        let (event_sender, event_receiver) = mpsc::unbounded_channel();
        let resolver = FormatResolver::new(&context);

        let manager = Self {
            context,
            resolver,
            registry: TaskRegistry::new(),
            workers: HashMap::new(),
            last_analysis: None,
            analysis_seq: 0,
            event_sender,
        };

        (manager, event_receiver)
    }

    pub fn config(&self) -> &AppConfig {
        &self.context.config
    }

    pub fn event_sender(&self) -> EventSender {
        self.event_sender.clone()
    }

    /// Analyse a URL and wait for the result
    pub async fn analyze(&mut self, url: &str) -> AppResult<AnalysisResult> {
        self.analysis_seq += 1;
        let seq = self.analysis_seq;

        let result = run_analysis(
            self.resolver.clone(),
            self.context.player.clone(),
            Arc::clone(&self.context.config),
            self.event_sender.clone(),
            seq,
            url.to_string(),
        )
        .await?;

        self.store_analysis(seq, &result);
        Ok(result)
    }

    /// Analyse on a worker; the outcome also arrives as an event
    pub fn begin_analysis(
        &mut self,
        url: &str,
    ) -> JoinHandle<Result<AnalysisResult, AnalysisError>> {
        self.analysis_seq += 1;

        tokio::spawn(run_analysis(
            self.resolver.clone(),
            self.context.player.clone(),
            Arc::clone(&self.context.config),
            self.event_sender.clone(),
            self.analysis_seq,
            url.to_string(),
        ))
    }

    /// Only the most recently requested analysis replaces the stored result
    fn store_analysis(&mut self, seq: u64, result: &AnalysisResult) {
        if seq != self.analysis_seq {
            debug!(
                "Ignoring stale analysis #{} of {} (latest is #{})",
                seq, result.url, self.analysis_seq
            );
            return;
        }
        self.last_analysis = Some(result.clone());
    }

    pub fn last_analysis(&self) -> Option<&AnalysisResult> {
        self.last_analysis.as_ref()
    }

    /// Create a task and launch its transfer
    pub fn start_download(&mut self, request: NewDownload) -> AppResult<TaskId> {
        if request.url.trim().is_empty() {
            return Err(AppError::InvalidState("Download URL is empty".to_string()));
        }

        if request.format_id.trim().is_empty() {
            return Err(AppError::InvalidState("No format selected".to_string()));
        }

        ensure_dir_exists(&request.target_dir)
            .map_err(|e| AppError::Config(format!("{:#}", e)))?;

        let config = &self.context.config;
        let controller = Arc::new(DownloadController::create(
            &request,
            self.event_sender.clone(),
            config.controller.pause_poll_interval(),
        ));
        let task = controller.snapshot();
        let task_id = task.id.clone();

        let _ = self.event_sender.send(DownloadEvent::TaskCreated {
            task_id: task_id.clone(),
            task,
        });

        let engine_request = DownloadRequest::build(
            &request.url,
            &request.format_id,
            &request.target_dir,
            &request.display_name,
            &config.download,
        );
        let worker = controller.start(Arc::clone(&self.context.engine), engine_request)?;

        self.registry.insert(controller);
        self.workers.insert(task_id.clone(), worker);

        info!("📥 Queued download {} ({})", request.display_name, task_id);
        Ok(task_id)
    }

    /// Download from the latest analysis; defaults to its pre-selected format and title
    pub fn download_selected(
        &mut self,
        format_index: Option<usize>,
        target_dir: PathBuf,
        display_name: Option<String>,
    ) -> AppResult<TaskId> {
        let analysis = self
            .last_analysis
            .as_ref()
            .ok_or_else(|| AppError::InvalidState("No analysed URL to download".to_string()))?;

        let index = format_index
            .or(analysis.default_index)
            .ok_or_else(|| AppError::InvalidState("No format available".to_string()))?;
        let format = analysis
            .formats
            .get(index)
            .ok_or_else(|| AppError::InvalidState(format!("No format at index {}", index)))?;

        let request = NewDownload {
            url: analysis.url.clone(),
            display_name: display_name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| analysis.title.clone()),
            format_id: format.format_id.clone(),
            target_dir,
        };

        self.start_download(request)
    }

    fn controller(&self, task_id: &str) -> AppResult<Arc<DownloadController>> {
        self.registry
            .get(task_id)
            .ok_or_else(|| AppError::TaskNotFound(task_id.to_string()))
    }

    pub fn pause(&self, task_id: &str) -> AppResult<()> {
        self.controller(task_id)?.pause()
    }

    pub fn resume(&self, task_id: &str) -> AppResult<()> {
        self.controller(task_id)?.resume()
    }

    pub fn toggle_pause(&self, task_id: &str) -> AppResult<TaskState> {
        self.controller(task_id)?.toggle_pause()
    }

    /// Start a cancel that takes effect only once confirmed
    pub fn request_cancel(&self, task_id: &str) -> AppResult<PendingCancel> {
        self.controller(task_id)?.request_cancel()
    }

    /// Cancel with an answer the caller already collected
    pub fn cancel(&self, task_id: &str, confirmed: bool) -> AppResult<bool> {
        let pending = self.request_cancel(task_id)?;
        if confirmed {
            pending.confirm()?;
            Ok(true)
        } else {
            pending.dismiss();
            Ok(false)
        }
    }

    pub fn cancel_with(&self, task_id: &str, prompt: &dyn ConfirmPrompt) -> AppResult<bool> {
        self.controller(task_id)?.cancel_with(prompt)
    }

    /// Remove a completed or failed task
    pub fn dismiss(&mut self, task_id: &str) -> AppResult<()> {
        let state = self.controller(task_id)?.state();
        if !state.is_terminal() {
            return Err(AppError::InvalidState(format!(
                "Task {} is still {:?}",
                task_id, state
            )));
        }

        self.forget(task_id);
        let _ = self.event_sender.send(DownloadEvent::TaskRemoved {
            task_id: task_id.to_string(),
        });
        Ok(())
    }

    fn forget(&mut self, task_id: &str) {
        if self.registry.remove(task_id).is_some() {
            debug!("Removed task {} from registry", task_id);
        }
        self.workers.remove(task_id);
    }

    pub fn tasks(&self) -> Vec<DownloadTask> {
        self.registry.snapshot()
    }

    pub fn task(&self, task_id: &str) -> Option<DownloadTask> {
        self.registry.get(task_id).map(|c| c.snapshot())
    }

    pub fn has_task(&self, task_id: &str) -> bool {
        self.registry.contains(task_id)
    }

    /// Number of tasks whose worker has not settled yet
    pub fn active_count(&self) -> usize {
        self.tasks().iter().filter(|t| !t.state.is_terminal()).count()
    }

    /// Apply the registry side effects of a worker event
    pub fn handle_event(&mut self, event: &DownloadEvent) {
        match event {
            DownloadEvent::TaskRemoved { task_id } => self.forget(task_id),
            DownloadEvent::AnalysisCompleted { seq, result } => {
                self.store_analysis(*seq, result);
            }
            _ => {}
        }
    }
}
