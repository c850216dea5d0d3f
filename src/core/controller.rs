//! Per-task download controller
//!
//! A controller owns one [`DownloadTask`] and the worker running the blocking
//! engine transfer. Pause and cancel are cooperative: the engine only consults
//! the progress hook between chunks, so both take effect on the next tick.
//! While paused the hook parks the worker thread, asks the engine to suspend
//! its transfer, and wakes every poll interval to look for a resume or a
//! confirmed cancellation.

use chrono::Utc;
use parking_lot::RwLock;
use regex::Regex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::engine::{
    DownloadRequest, ExtractionEngine, InlineTransfer, ProgressEvent, StopSignal, TransferSuspend,
};
use crate::core::manager::{DownloadEvent, EventSender};
use crate::core::models::{
    AppError, AppResult, DownloadTask, EngineError, NewDownload, ProgressSnapshot, TaskId,
    TaskState, TransferError,
};

pub const STATUS_INITIALIZING: &str = "Initializing...";
pub const STATUS_CANCELLING: &str = "Cancelling...";
pub const STATUS_FINALIZING: &str = "Finalizing...";
pub const STATUS_COMPLETE: &str = "COMPLETE";
pub const STATUS_ERROR: &str = "ERROR";

/// Asks the user whether a running download should really be cancelled
pub trait ConfirmPrompt {
    fn confirm(&self, question: &str) -> bool;
}

impl<F> ConfirmPrompt for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, question: &str) -> bool {
        self(question)
    }
}

/// Parse an engine percent string such as `" 42.5%"` into a 0-1 fraction
///
/// Terminal colour codes are stripped first. Placeholders like `--%` or
/// `N/A` yield `None`.
pub fn parse_percent_fraction(text: &str) -> Option<f64> {
    static ANSI: OnceLock<Option<Regex>> = OnceLock::new();
    let cleaned = match ANSI.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").ok()) {
        Some(ansi) => ansi.replace_all(text, ""),
        None => text.into(),
    };
    let trimmed = cleaned.trim();
    let number = trimmed.strip_suffix('%').unwrap_or(trimmed).trim();

    let value: f64 = number.parse().ok()?;
    if !value.is_finite() {
        return None;
    }

    Some(value.clamp(0.0, 100.0) / 100.0)
}

fn running_status(progress: &ProgressSnapshot) -> String {
    format!(
        "{} | {} | ETA: {}",
        progress.percent_text, progress.speed, progress.eta
    )
}

fn paused_status(progress: &ProgressSnapshot) -> String {
    format!("PAUSED | {}", progress.percent_text)
}

/// How the worker left the engine call
enum TransferOutcome {
    Done,
    Stopped,
    Failed(TransferError),
}

/// State shared between the controller handle and its worker thread
struct TaskControl {
    task: RwLock<DownloadTask>,
    started: AtomicBool,
    seen_progress: AtomicBool,
    events: EventSender,
    poll_interval: Duration,
}

impl TaskControl {
    fn emit(&self, event: DownloadEvent) {
        if self.events.send(event).is_err() {
            debug!("Event receiver dropped, skipping event");
        }
    }

    /// Progress hook body, runs on the worker thread
    ///
    /// Without an event this is the gate in front of the engine call, so a
    /// task paused before its worker runs never reaches the engine.
    fn on_progress(
        &self,
        event: Option<&ProgressEvent>,
        transfer: &dyn TransferSuspend,
    ) -> Result<(), StopSignal> {
        let mut parked = false;
        let mut suspended = false;

        let verdict = loop {
            {
                let mut task = self.task.write();
                match task.state {
                    TaskState::Cancelling => break Err(StopSignal),
                    TaskState::Paused => {}
                    _ => {
                        if let Some(event) = event {
                            self.apply_event(&mut task, event);
                        }
                        break Ok(());
                    }
                }
            }

            if !parked {
                parked = true;
                match transfer.suspend() {
                    Ok(()) => suspended = true,
                    Err(err) => warn!("Could not suspend transfer while paused: {}", err),
                }
            }
            std::thread::sleep(self.poll_interval);
        };

        if suspended {
            if let Err(err) = transfer.resume() {
                warn!("Could not resume suspended transfer: {}", err);
            }
        }
        verdict
    }

    fn apply_event(&self, task: &mut DownloadTask, event: &ProgressEvent) {
        match event {
            ProgressEvent::Downloading {
                percent,
                speed,
                eta,
            } => {
                // unparsable percent keeps the last fraction, text still follows the engine
                if let Some(fraction) = parse_percent_fraction(percent) {
                    task.last_progress.percent = fraction * 100.0;
                }
                task.last_progress.percent_text = percent.trim().to_string();
                task.last_progress.speed = speed.trim().to_string();
                task.last_progress.eta = eta.trim().to_string();
                task.status_text = running_status(&task.last_progress);
                task.updated_at = Utc::now();
                self.seen_progress.store(true, Ordering::Release);

                self.emit(DownloadEvent::TaskProgress {
                    task_id: task.id.clone(),
                    progress: task.last_progress.clone(),
                });
            }
            ProgressEvent::Finished => {
                task.status_text = STATUS_FINALIZING.to_string();
                task.updated_at = Utc::now();
                debug!("Transfer stream finished for {}", task.id);

                self.emit(DownloadEvent::TaskTransferFinished {
                    task_id: task.id.clone(),
                });
            }
        }
    }

    fn finish(&self, outcome: TransferOutcome) {
        let mut task = self.task.write();

        if task.state == TaskState::Cancelling {
            info!("🚫 Cancelled download: {}", task.display_name);
            self.emit(DownloadEvent::TaskRemoved {
                task_id: task.id.clone(),
            });
            return;
        }

        match outcome {
            TransferOutcome::Stopped => {
                // the hook only stops a cancelling task, treat it the same way
                warn!(
                    "Transfer for {} stopped without a confirmed cancel, removing task",
                    task.id
                );
                self.emit(DownloadEvent::TaskRemoved {
                    task_id: task.id.clone(),
                });
            }
            TransferOutcome::Done => {
                if !task.state.can_transition_to(TaskState::Completed) {
                    warn!("Task {} already settled as {:?}", task.id, task.state);
                    return;
                }
                task.state = TaskState::Completed;
                task.last_progress.percent = 100.0;
                task.last_progress.percent_text = "100%".to_string();
                task.status_text = STATUS_COMPLETE.to_string();
                task.updated_at = Utc::now();

                info!("✅ Download completed: {}", task.display_name);
                self.emit(DownloadEvent::TaskCompleted {
                    task_id: task.id.clone(),
                    target_dir: task.target_dir.clone(),
                });
            }
            TransferOutcome::Failed(err) => {
                if !task.state.can_transition_to(TaskState::Failed) {
                    warn!("Task {} already settled as {:?}", task.id, task.state);
                    return;
                }
                task.state = TaskState::Failed;
                task.status_text = STATUS_ERROR.to_string();
                task.error_message = Some(err.to_string());
                task.updated_at = Utc::now();

                error!("❌ Download failed: {} - {}", task.display_name, err);
                self.emit(DownloadEvent::TaskFailed {
                    task_id: task.id.clone(),
                    error: err.to_string(),
                });
            }
        }
    }
}

/// Handle to one download task and its worker
#[derive(Clone)]
pub struct DownloadController {
    control: Arc<TaskControl>,
}

impl DownloadController {
    /// Create a controller for a new task in the Running state
    pub fn create(request: &NewDownload, events: EventSender, poll_interval: Duration) -> Self {
        let now = Utc::now();
        let task = DownloadTask {
            id: Uuid::new_v4().to_string(),
            url: request.url.clone(),
            display_name: request.display_name.clone(),
            target_dir: request.target_dir.clone(),
            format_id: request.format_id.clone(),
            state: TaskState::Running,
            last_progress: ProgressSnapshot::default(),
            status_text: STATUS_INITIALIZING.to_string(),
            error_message: None,
            created_at: now,
            updated_at: now,
        };

        Self {
            control: Arc::new(TaskControl {
                task: RwLock::new(task),
                started: AtomicBool::new(false),
                seen_progress: AtomicBool::new(false),
                events,
                poll_interval,
            }),
        }
    }

    pub fn id(&self) -> TaskId {
        self.control.task.read().id.clone()
    }

    pub fn snapshot(&self) -> DownloadTask {
        self.control.task.read().clone()
    }

    pub fn state(&self) -> TaskState {
        self.control.task.read().state
    }

    pub fn progress_fraction(&self) -> f64 {
        self.control.task.read().last_progress.fraction()
    }

    /// Launch the engine transfer on a blocking worker
    ///
    /// Must be called from inside a Tokio runtime. A controller starts once.
    pub fn start(
        &self,
        engine: Arc<dyn ExtractionEngine>,
        request: DownloadRequest,
    ) -> AppResult<JoinHandle<()>> {
        if self.control.started.swap(true, Ordering::AcqRel) {
            return Err(AppError::InvalidState(format!(
                "Task {} was already started",
                self.id()
            )));
        }

        let control = Arc::clone(&self.control);
        let worker = Arc::clone(&self.control);

        info!(
            "🔄 Started download: {} via {}",
            control.task.read().display_name,
            engine.name()
        );

        Ok(tokio::spawn(async move {
            let joined = tokio::task::spawn_blocking(move || -> Result<(), EngineError> {
                worker.on_progress(None, &InlineTransfer)?;

                let mut hook = |event: &ProgressEvent, transfer: &dyn TransferSuspend| {
                    worker.on_progress(Some(event), transfer)
                };
                engine.download(&request, &mut hook)
            })
            .await;

            let outcome = match joined {
                Ok(Ok(())) => TransferOutcome::Done,
                Ok(Err(EngineError::Stopped)) => TransferOutcome::Stopped,
                Ok(Err(err)) => TransferOutcome::Failed(TransferError::Engine(err)),
                Err(join_err) => {
                    TransferOutcome::Failed(TransferError::Worker(join_err.to_string()))
                }
            };

            control.finish(outcome);
        }))
    }

    /// Running -> Paused
    pub fn pause(&self) -> AppResult<()> {
        let mut task = self.control.task.write();
        if !task.state.can_transition_to(TaskState::Paused) {
            return Err(AppError::InvalidState(format!(
                "Task {} cannot be paused from {:?}",
                task.id, task.state
            )));
        }

        task.state = TaskState::Paused;
        task.status_text = paused_status(&task.last_progress);
        task.updated_at = Utc::now();

        info!("⏸️ Paused download: {}", task.display_name);
        self.control.emit(DownloadEvent::TaskPaused {
            task_id: task.id.clone(),
        });
        Ok(())
    }

    /// Paused -> Running
    pub fn resume(&self) -> AppResult<()> {
        let mut task = self.control.task.write();
        if task.state != TaskState::Paused {
            return Err(AppError::InvalidState(format!(
                "Task {} cannot be resumed from {:?}",
                task.id, task.state
            )));
        }

        task.state = TaskState::Running;
        task.status_text = if self.control.seen_progress.load(Ordering::Acquire) {
            running_status(&task.last_progress)
        } else {
            STATUS_INITIALIZING.to_string()
        };
        task.updated_at = Utc::now();

        info!("▶️ Resumed download: {}", task.display_name);
        self.control.emit(DownloadEvent::TaskResumed {
            task_id: task.id.clone(),
        });
        Ok(())
    }

    /// Flip between Running and Paused, returning the new state
    pub fn toggle_pause(&self) -> AppResult<TaskState> {
        match self.state() {
            TaskState::Paused => self.resume().map(|_| TaskState::Running),
            _ => self.pause().map(|_| TaskState::Paused),
        }
    }

    /// First half of a cancel: nothing changes until the token is confirmed
    pub fn request_cancel(&self) -> AppResult<PendingCancel> {
        let task = self.control.task.read();
        if !task.state.can_transition_to(TaskState::Cancelling) {
            return Err(AppError::InvalidState(format!(
                "Task {} cannot be cancelled from {:?}",
                task.id, task.state
            )));
        }

        Ok(PendingCancel {
            control: Arc::clone(&self.control),
            display_name: task.display_name.clone(),
        })
    }

    /// Ask `prompt` and cancel only on a positive answer
    pub fn cancel_with(&self, prompt: &dyn ConfirmPrompt) -> AppResult<bool> {
        let pending = self.request_cancel()?;
        if prompt.confirm(&pending.question()) {
            pending.confirm()?;
            Ok(true)
        } else {
            pending.dismiss();
            Ok(false)
        }
    }
}

/// Cancel request awaiting the user's confirmation
#[must_use = "a pending cancel does nothing until confirmed"]
pub struct PendingCancel {
    control: Arc<TaskControl>,
    display_name: String,
}

impl PendingCancel {
    pub fn question(&self) -> String {
        format!("Cancel download for {}?", self.display_name)
    }

    /// Move the task to Cancelling; the worker stops at its next progress tick
    pub fn confirm(self) -> AppResult<()> {
        let mut task = self.control.task.write();
        if !task.state.can_transition_to(TaskState::Cancelling) {
            return Err(AppError::InvalidState(format!(
                "Task {} finished before the cancel was confirmed",
                task.id
            )));
        }

        task.state = TaskState::Cancelling;
        task.status_text = STATUS_CANCELLING.to_string();
        task.updated_at = Utc::now();

        info!("🛑 Cancelling download: {}", task.display_name);
        self.control.emit(DownloadEvent::TaskCancelling {
            task_id: task.id.clone(),
        });
        Ok(())
    }

    /// Leave the task untouched
    pub fn dismiss(self) {
        debug!("Cancel of {} dismissed", self.display_name);
    }
}
