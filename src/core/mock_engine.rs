//! Scriptable in-memory engine for tests
//!
//! [`MockEngine::script`] registers one transfer script per URL; the
//! `download` call for that URL plays the steps the test sends, blocking
//! between steps like a real transfer would. [`TestHarness`] bundles a
//! manager around the mock with helpers for waiting on events.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::core::config::AppConfig;
use crate::core::context::AppContext;
use crate::core::engine::{
    DownloadRequest, ExtractionEngine, MediaInfo, ProgressEvent, ProgressHook, RawFormat,
    RequestOptions, TransferSuspend,
};
use crate::core::manager::{DownloadEvent, DownloadManager, EventReceiver};
use crate::core::models::{EngineError, NewDownload};

const STEP_TIMEOUT: Duration = Duration::from_secs(10);
const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub enum MockStep {
    /// Hand one event to the progress hook
    Progress(ProgressEvent),
    /// Return success
    Finish,
    /// Return this error
    Fail(EngineError),
}

impl MockStep {
    pub fn progress(percent: &str) -> Self {
        Self::Progress(ProgressEvent::downloading(percent, "1.00MiB/s", "00:10"))
    }
}

/// What the controller asked of the running transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferCall {
    Suspend,
    Resume,
}

struct MockTransfer<'a> {
    calls: &'a Mutex<Vec<TransferCall>>,
}

impl TransferSuspend for MockTransfer<'_> {
    fn suspend(&self) -> Result<(), EngineError> {
        self.calls.lock().push(TransferCall::Suspend);
        Ok(())
    }

    fn resume(&self) -> Result<(), EngineError> {
        self.calls.lock().push(TransferCall::Resume);
        Ok(())
    }
}

pub struct MockEngine {
    media: Mutex<Result<MediaInfo, EngineError>>,
    scripts: Mutex<HashMap<String, Receiver<MockStep>>>,
    requests: Mutex<Vec<DownloadRequest>>,
    analysed: Mutex<Vec<(String, RequestOptions)>>,
    transfer_calls: Mutex<Vec<TransferCall>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            media: Mutex::new(Ok(MediaInfo::default())),
            scripts: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            analysed: Mutex::new(Vec::new()),
            transfer_calls: Mutex::new(Vec::new()),
        }
    }

    /// Metadata returned by `extract_info`
    pub fn with_media(self, media: MediaInfo) -> Self {
        *self.media.lock() = Ok(media);
        self
    }

    pub fn failing_analysis(self, error: EngineError) -> Self {
        *self.media.lock() = Err(error);
        self
    }

    /// Register the script for the download of `url` and return its step sender
    pub fn script(&self, url: &str) -> Sender<MockStep> {
        let (tx, rx) = channel();
        self.scripts.lock().insert(url.to_string(), rx);
        tx
    }

    pub fn requests(&self) -> Vec<DownloadRequest> {
        self.requests.lock().clone()
    }

    pub fn analysed(&self) -> Vec<(String, RequestOptions)> {
        self.analysed.lock().clone()
    }

    /// Suspend/resume requests across all transfers, in order
    pub fn transfer_calls(&self) -> Vec<TransferCall> {
        self.transfer_calls.lock().clone()
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionEngine for MockEngine {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn extract_info(&self, url: &str, options: &RequestOptions) -> Result<MediaInfo, EngineError> {
        self.analysed.lock().push((url.to_string(), options.clone()));
        self.media.lock().clone()
    }

    fn download(
        &self,
        request: &DownloadRequest,
        hook: &mut ProgressHook<'_>,
    ) -> Result<(), EngineError> {
        self.requests.lock().push(request.clone());

        let script = self
            .scripts
            .lock()
            .remove(&request.url)
            .ok_or_else(|| EngineError::Process(format!("no script for {}", request.url)))?;

        let transfer = MockTransfer {
            calls: &self.transfer_calls,
        };

        loop {
            match script.recv_timeout(STEP_TIMEOUT) {
                Ok(MockStep::Progress(event)) => hook(&event, &transfer)?,
                Ok(MockStep::Finish) => return Ok(()),
                Ok(MockStep::Fail(error)) => return Err(error),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(EngineError::Network("script timed out".to_string()))
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(EngineError::Process("script closed".to_string()))
                }
            }
        }
    }
}

/// Two video formats and one audio-only entry, in engine order
pub fn sample_media() -> MediaInfo {
    MediaInfo {
        title: Some("Sample Video".to_string()),
        thumbnail_url: Some("https://example.com/thumb.jpg".to_string()),
        preview_url: Some("https://cdn.example.com/preview.mp4".to_string()),
        formats: vec![
            RawFormat {
                format_id: "140".to_string(),
                resolution: Some("audio only".to_string()),
                vcodec: Some("none".to_string()),
                acodec: Some("mp4a".to_string()),
                filesize: Some(3 * 1024 * 1024),
                ..RawFormat::default()
            },
            RawFormat {
                format_id: "18".to_string(),
                resolution: Some("360p".to_string()),
                height: Some(360),
                vcodec: Some("avc1".to_string()),
                filesize: Some(10 * 1024 * 1024),
                ..RawFormat::default()
            },
            RawFormat {
                format_id: "137".to_string(),
                resolution: Some("1080p".to_string()),
                height: Some(1080),
                vcodec: Some("avc1".to_string()),
                filesize_approx: Some(50 * 1024 * 1024),
                ..RawFormat::default()
            },
        ],
    }
}

/// Defaults with short intervals so paused workers wake quickly
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.controller.pause_poll_interval_ms = 10;
    config.player.refresh_settle_ms = 1;
    config
}

pub struct TestHarness {
    pub manager: DownloadManager,
    pub events: EventReceiver,
    pub engine: Arc<MockEngine>,
    pub dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn new(engine: MockEngine) -> Self {
        let engine = Arc::new(engine);
        let context = AppContext::with_engine(test_config(), engine.clone());
        Self::from_context(engine, context)
    }

    pub fn from_context(engine: Arc<MockEngine>, context: AppContext) -> Self {
        let (manager, events) = DownloadManager::new(context);
        Self {
            manager,
            events,
            engine,
            dir: tempfile::tempdir().expect("temp dir"),
        }
    }

    pub fn url(name: &str) -> String {
        format!("https://example.com/{}", name)
    }

    pub fn new_download(&self, name: &str) -> NewDownload {
        NewDownload {
            url: Self::url(name),
            display_name: name.to_string(),
            format_id: "137".to_string(),
            target_dir: self.dir.path().to_path_buf(),
        }
    }

    /// Register a script for `name` and start its download
    pub fn start(&mut self, name: &str) -> (String, Sender<MockStep>) {
        let script = self.engine.script(&Self::url(name));
        let task_id = self
            .manager
            .start_download(self.new_download(name))
            .expect("download starts");
        (task_id, script)
    }

    /// Next event, with its registry side effects applied
    pub async fn next_event(&mut self) -> DownloadEvent {
        let event = timeout(EVENT_TIMEOUT, self.events.recv())
            .await
            .expect("event within timeout")
            .expect("event channel open");
        self.manager.handle_event(&event);
        event
    }

    /// Every event up to and including the first one matching `pred`
    pub async fn collect_until(
        &mut self,
        pred: impl Fn(&DownloadEvent) -> bool,
    ) -> Vec<DownloadEvent> {
        let mut seen = Vec::new();
        loop {
            let event = self.next_event().await;
            let done = pred(&event);
            seen.push(event);
            if done {
                return seen;
            }
        }
    }

    pub async fn wait_for(&mut self, pred: impl Fn(&DownloadEvent) -> bool) -> DownloadEvent {
        let mut seen = self.collect_until(pred).await;
        seen.pop().expect("matching event")
    }

    /// Events arriving within `window`
    pub async fn drain_for(&mut self, window: Duration) -> Vec<DownloadEvent> {
        let mut seen = Vec::new();
        let deadline = tokio::time::Instant::now() + window;
        while let Ok(Some(event)) = tokio::time::timeout_at(deadline, self.events.recv()).await {
            self.manager.handle_event(&event);
            seen.push(event);
        }
        seen
    }
}
