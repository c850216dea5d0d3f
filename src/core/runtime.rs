//! Download runtime command router.
//!
//! A single async task owns the [`DownloadManager`]. It serializes user
//! commands and applies worker events, so the task registry has exactly one
//! writer. Every event is forwarded to the observer after its side effects
//! have been applied.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, instrument};

use crate::core::manager::{DownloadEvent, DownloadManager, EventReceiver, EventSender};
use crate::core::models::{
    AnalysisResult, AppError, AppResult, DownloadTask, NewDownload, TaskId, TaskState,
};

/// Commands understood by the runtime router.
#[derive(Debug)]
pub enum RuntimeCommand {
    Analyze {
        url: String,
        respond_to: oneshot::Sender<AppResult<AnalysisResult>>,
    },
    Download {
        request: NewDownload,
        respond_to: oneshot::Sender<AppResult<TaskId>>,
    },
    Pause {
        task_id: TaskId,
        respond_to: oneshot::Sender<AppResult<()>>,
    },
    Resume {
        task_id: TaskId,
        respond_to: oneshot::Sender<AppResult<()>>,
    },
    TogglePause {
        task_id: TaskId,
        respond_to: oneshot::Sender<AppResult<TaskState>>,
    },
    /// `confirmed` carries the user's answer to the confirmation prompt
    Cancel {
        task_id: TaskId,
        confirmed: bool,
        respond_to: oneshot::Sender<AppResult<bool>>,
    },
    Dismiss {
        task_id: TaskId,
        respond_to: oneshot::Sender<AppResult<()>>,
    },
    Snapshot {
        respond_to: oneshot::Sender<Vec<DownloadTask>>,
    },
}

/// Handle exposed to the presentation layer.
#[derive(Clone)]
pub struct DownloadRuntimeHandle {
    sender: mpsc::Sender<RuntimeCommand>,
}

impl DownloadRuntimeHandle {
    pub fn new(sender: mpsc::Sender<RuntimeCommand>) -> Self {
        Self { sender }
    }

    async fn send_command<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RuntimeCommand,
    ) -> AppResult<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|e| AppError::Runtime(format!("Download runtime unavailable: {}", e)))?;
        rx.await
            .map_err(|_| AppError::Runtime("Download runtime dropped response".into()))
    }

    pub async fn analyze(&self, url: impl Into<String>) -> AppResult<AnalysisResult> {
        let url = url.into();
        self.send_command(|tx| RuntimeCommand::Analyze {
            url,
            respond_to: tx,
        })
        .await?
    }

    pub async fn download(&self, request: NewDownload) -> AppResult<TaskId> {
        self.send_command(|tx| RuntimeCommand::Download {
            request,
            respond_to: tx,
        })
        .await?
    }

    pub async fn pause(&self, task_id: TaskId) -> AppResult<()> {
        self.send_command(|tx| RuntimeCommand::Pause {
            task_id,
            respond_to: tx,
        })
        .await?
    }

    pub async fn resume(&self, task_id: TaskId) -> AppResult<()> {
        self.send_command(|tx| RuntimeCommand::Resume {
            task_id,
            respond_to: tx,
        })
        .await?
    }

    pub async fn toggle_pause(&self, task_id: TaskId) -> AppResult<TaskState> {
        self.send_command(|tx| RuntimeCommand::TogglePause {
            task_id,
            respond_to: tx,
        })
        .await?
    }

    pub async fn cancel(&self, task_id: TaskId, confirmed: bool) -> AppResult<bool> {
        self.send_command(|tx| RuntimeCommand::Cancel {
            task_id,
            confirmed,
            respond_to: tx,
        })
        .await?
    }

    pub async fn dismiss(&self, task_id: TaskId) -> AppResult<()> {
        self.send_command(|tx| RuntimeCommand::Dismiss {
            task_id,
            respond_to: tx,
        })
        .await?
    }

    pub async fn snapshot(&self) -> AppResult<Vec<DownloadTask>> {
        self.send_command(|tx| RuntimeCommand::Snapshot { respond_to: tx })
            .await
    }
}

/// Spawn the router loop on the current tokio runtime.
///
/// The loop exits once every [`DownloadRuntimeHandle`] is dropped.
pub fn spawn_download_runtime(
    manager: DownloadManager,
    events: EventReceiver,
    observer: EventSender,
) -> (DownloadRuntimeHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(256);

    tracing::info!("[RUNTIME] Spawning router loop in current tokio runtime");
    let router = tokio::spawn(router_loop(manager, rx, events, observer));

    (DownloadRuntimeHandle::new(tx), router)
}

async fn router_loop(
    mut manager: DownloadManager,
    mut commands: mpsc::Receiver<RuntimeCommand>,
    mut events: EventReceiver,
    observer: EventSender,
) {
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(cmd) => {
                    debug!("[RUNTIME] Processing user command: {:?}", cmd);
                    handle_command(&mut manager, cmd);
                }
                None => break,
            },
            Some(event) = events.recv() => {
                manager.handle_event(&event);
                if observer.send(event).is_err() {
                    debug!("[RUNTIME] Observer dropped, event discarded");
                }
            }
        }
    }

    // flush what the workers already reported
    while let Ok(event) = events.try_recv() {
        manager.handle_event(&event);
        let _ = observer.send(event);
    }

    debug!("Download runtime channel closed, exiting router loop");
}

fn forward_analysis(
    manager: &mut DownloadManager,
    url: &str,
    respond_to: oneshot::Sender<AppResult<AnalysisResult>>,
) {
    let worker = manager.begin_analysis(url);
    tokio::spawn(async move {
        let result = match worker.await {
            Ok(outcome) => outcome.map_err(AppError::from),
            Err(e) => Err(AppError::Runtime(format!("Analysis worker failed: {}", e))),
        };
        let _ = respond_to.send(result);
    });
}

#[instrument(skip(manager, command))]
fn handle_command(manager: &mut DownloadManager, command: RuntimeCommand) {
    match command {
        RuntimeCommand::Analyze { url, respond_to } => {
            forward_analysis(manager, &url, respond_to);
        }
        RuntimeCommand::Download {
            request,
            respond_to,
        } => {
            let result = manager.start_download(request);
            debug!("[RUNTIME_CMD] Download queued, success: {}", result.is_ok());
            let _ = respond_to.send(result);
        }
        RuntimeCommand::Pause {
            task_id,
            respond_to,
        } => {
            let _ = respond_to.send(manager.pause(&task_id));
        }
        RuntimeCommand::Resume {
            task_id,
            respond_to,
        } => {
            let _ = respond_to.send(manager.resume(&task_id));
        }
        RuntimeCommand::TogglePause {
            task_id,
            respond_to,
        } => {
            let _ = respond_to.send(manager.toggle_pause(&task_id));
        }
        RuntimeCommand::Cancel {
            task_id,
            confirmed,
            respond_to,
        } => {
            let _ = respond_to.send(manager.cancel(&task_id, confirmed));
        }
        RuntimeCommand::Dismiss {
            task_id,
            respond_to,
        } => {
            let _ = respond_to.send(manager.dismiss(&task_id));
        }
        RuntimeCommand::Snapshot { respond_to } => {
            let _ = respond_to.send(manager.tasks());
        }
    }
}
