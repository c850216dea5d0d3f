//! yt-dlp backed extraction engine
//!
//! Drives the `yt-dlp` binary: `--dump-json` for metadata and a machine
//! readable `--progress-template` for downloads. Each progress line is fed to
//! the hook; a stop answer kills the child process and a parked hook keeps the
//! child suspended.

use serde::Deserialize;
use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

use crate::core::engine::{
    DownloadRequest, ExtractionEngine, MediaInfo, ProgressEvent, ProgressHook, RawFormat,
    RequestOptions, TransferSuspend,
};
use crate::core::models::EngineError;
use crate::utils::process::{resume_process, suspend_process};

/// Marker prepended to every progress line we ask yt-dlp to print
const PROGRESS_PREFIX: &str = "[mdp]";

/// Lines of stderr kept for the error message
const STDERR_TAIL_LINES: usize = 6;

pub struct YtDlpEngine {
    binary: String,
}

impl YtDlpEngine {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn request_args(options: &RequestOptions) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(agent) = &options.user_agent {
            args.push("--user-agent".to_string());
            args.push(agent.clone());
        }
        if let Some(referer) = &options.referer {
            args.push("--referer".to_string());
            args.push(referer.clone());
        }
        if options.skip_certificate_check {
            args.push("--no-check-certificates".to_string());
        }

        let mut headers: Vec<_> = options.headers.iter().collect();
        headers.sort();
        for (name, value) in headers {
            args.push("--add-header".to_string());
            args.push(format!("{}:{}", name, value));
        }

        args
    }

    pub fn metadata_args(url: &str, options: &RequestOptions) -> Vec<String> {
        let mut args = vec![
            "--dump-json".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--quiet".to_string(),
        ];
        args.extend(Self::request_args(options));
        args.push(url.to_string());
        args
    }

    pub fn download_args(request: &DownloadRequest) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            request.format_selector.clone(),
            "-o".to_string(),
            request.output_template.clone(),
            "--no-playlist".to_string(),
            "--newline".to_string(),
            "--progress-template".to_string(),
            format!(
                "download:{}%(progress.status)s|%(progress._percent_str)s|%(progress._speed_str)s|%(progress._eta_str)s",
                PROGRESS_PREFIX
            ),
            "--concurrent-fragments".to_string(),
            request.concurrent_fragments.max(1).to_string(),
        ];

        if let Some(size) = request.buffer_size {
            args.push("--buffer-size".to_string());
            args.push(size.to_string());
        }
        if let Some(retries) = request.retries {
            args.push("--retries".to_string());
            args.push(retries.to_string());
        }
        if let Some(retries) = request.fragment_retries {
            args.push("--fragment-retries".to_string());
            args.push(retries.to_string());
        }
        if request.continue_partial {
            args.push("--continue".to_string());
        }

        args.extend(Self::request_args(&request.request));
        args.push(request.url.clone());
        args
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.stdin(Stdio::null());
        cmd
    }

    fn spawn_error(&self, err: std::io::Error) -> EngineError {
        if err.kind() == std::io::ErrorKind::NotFound {
            EngineError::ToolNotFound(self.binary.clone())
        } else {
            EngineError::Process(format!("failed to start {}: {}", self.binary, err))
        }
    }
}

/// Running yt-dlp child, frozen while the progress hook is parked
struct ChildTransfer {
    pid: u32,
}

impl TransferSuspend for ChildTransfer {
    fn suspend(&self) -> Result<(), EngineError> {
        debug!("[yt-dlp] Suspending child {}", self.pid);
        suspend_process(self.pid).map_err(|e| EngineError::Process(format!("{:#}", e)))
    }

    fn resume(&self) -> Result<(), EngineError> {
        debug!("[yt-dlp] Resuming child {}", self.pid);
        resume_process(self.pid).map_err(|e| EngineError::Process(format!("{:#}", e)))
    }
}

impl Default for YtDlpEngine {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}

impl ExtractionEngine for YtDlpEngine {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    fn extract_info(&self, url: &str, options: &RequestOptions) -> Result<MediaInfo, EngineError> {
        let args = Self::metadata_args(url, options);
        debug!("[yt-dlp] Running: {} {}", self.binary, args.join(" "));

        let output = self
            .command()
            .args(&args)
            .output()
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(&tail(&stderr)));
        }

        parse_media_info(&output.stdout)
    }

    fn download(
        &self,
        request: &DownloadRequest,
        hook: &mut ProgressHook<'_>,
    ) -> Result<(), EngineError> {
        let args = Self::download_args(request);
        info!("[yt-dlp] Starting transfer: {}", request.url);
        debug!("[yt-dlp] Running: {} {}", self.binary, args.join(" "));

        let mut child = self
            .command()
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Process("no stdout pipe".to_string()))?;
        let mut stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::Process("no stderr pipe".to_string()))?;

        let transfer = ChildTransfer { pid: child.id() };

        let stderr_reader = std::thread::spawn(move || {
            let mut buf = String::new();
            let _ = stderr_pipe.read_to_string(&mut buf);
            buf
        });

        for line in BufReader::new(stdout).lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!("[yt-dlp] Failed to read progress line: {}", e);
                    break;
                }
            };

            let Some(event) = parse_progress_line(&line) else {
                continue;
            };

            if let Err(stop) = hook(&event, &transfer) {
                info!("[yt-dlp] Stop requested, killing transfer: {}", request.url);
                // grandchildren may still hold stderr, the reader thread is left to drain it
                let _ = child.kill();
                let _ = child.wait();
                return Err(stop.into());
            }
        }

        let status = child
            .wait()
            .map_err(|e| EngineError::Process(format!("yt-dlp wait failed: {}", e)))?;
        let stderr = stderr_reader.join().unwrap_or_default();

        if status.success() {
            Ok(())
        } else {
            Err(classify_failure(&tail(&stderr)))
        }
    }
}

#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    thumbnail: Option<String>,
    url: Option<String>,
    #[serde(default)]
    formats: Vec<YtDlpFormat>,
}

#[derive(Debug, Deserialize)]
struct YtDlpFormat {
    format_id: Option<String>,
    url: Option<String>,
    resolution: Option<String>,
    height: Option<u32>,
    ext: Option<String>,
    vcodec: Option<String>,
    acodec: Option<String>,
    filesize: Option<u64>,
    filesize_approx: Option<f64>,
}

/// Parse `--dump-json` output
pub fn parse_media_info(stdout: &[u8]) -> Result<MediaInfo, EngineError> {
    let info: YtDlpInfo = serde_json::from_slice(stdout)
        .map_err(|e| EngineError::Parse(format!("Invalid JSON: {}", e)))?;

    // Single-file entries carry `url`; otherwise preview the last muxed format
    let preview_url = info.url.clone().or_else(|| {
        info.formats
            .iter()
            .rev()
            .find(|f| {
                f.vcodec.as_deref().map_or(false, |v| v != "none")
                    && f.acodec.as_deref().map_or(false, |a| a != "none")
            })
            .and_then(|f| f.url.clone())
    });

    let formats = info
        .formats
        .into_iter()
        .filter_map(|f| {
            Some(RawFormat {
                format_id: f.format_id?,
                resolution: f.resolution,
                height: f.height,
                ext: f.ext,
                vcodec: f.vcodec,
                acodec: f.acodec,
                filesize: f.filesize,
                filesize_approx: f.filesize_approx.map(|s| s.max(0.0) as u64),
            })
        })
        .collect();

    Ok(MediaInfo {
        title: info.title,
        thumbnail_url: info.thumbnail,
        preview_url,
        formats,
    })
}

/// Parse one line printed through our progress template
pub fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    let payload = line.trim().strip_prefix(PROGRESS_PREFIX)?;
    let mut fields = payload.split('|').map(str::trim);

    let status = fields.next()?;
    let percent = fields.next().unwrap_or("0%");
    let speed = fields.next().unwrap_or("N/A");
    let eta = fields.next().unwrap_or("N/A");

    match status {
        "downloading" => Some(ProgressEvent::downloading(percent, speed, eta)),
        "finished" => Some(ProgressEvent::Finished),
        _ => None,
    }
}

fn tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Map yt-dlp's stderr onto an engine error kind
pub fn classify_failure(message: &str) -> EngineError {
    let lower = message.to_lowercase();

    if lower.contains("unsupported url") {
        EngineError::Unsupported(message.to_string())
    } else if lower.contains("timed out")
        || lower.contains("timeout")
        || lower.contains("connection")
        || lower.contains("name resolution")
        || lower.contains("network is unreachable")
    {
        EngineError::Network(message.to_string())
    } else {
        EngineError::Process(message.to_string())
    }
}
