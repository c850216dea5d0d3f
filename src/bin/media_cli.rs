use std::env;
use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use media_downloader_pro::core::manager::analysis_failure_notice;
use media_downloader_pro::utils::logging::init_tracing_with;
use media_downloader_pro::{
    AnalysisResult, AppConfig, AppState, DownloadEvent, NewDownload, VariantProfile,
};

const USAGE: &str = "Usage: media-cli [--profile baseline|pre-release|update] analyze <url>\n       media-cli [--profile ...] download <url> <dir> [format-id] [name]";

#[tokio::main]
async fn main() {
    let mut args: Vec<String> = env::args().skip(1).collect();

    let config = match take_profile(&mut args) {
        Ok(Some(profile)) => AppConfig::for_profile(profile),
        Ok(None) => AppState::load_or_initialize_config(),
        Err(message) => fail(&message),
    };
    init_tracing_with(Some(&config.log_level));

    let (observer, events) = mpsc::unbounded_channel();
    let (state, _router) = match AppState::start(config, observer) {
        Ok(started) => started,
        Err(error) => fail(&format!("Error: {error}")),
    };

    match args.first().map(String::as_str) {
        Some("analyze") if args.len() == 2 => {
            match state.download_runtime.analyze(&args[1]).await {
                Ok(result) => print_analysis(&result),
                Err(_) => analysis_failed(&state),
            }
        }
        Some("download") if (3..=5).contains(&args.len()) => {
            run_download(&state, &args[1..], events).await;
        }
        _ => fail(USAGE),
    }
}

fn fail(message: &str) -> ! {
    eprintln!("{message}");
    std::process::exit(1);
}

/// The cause is already logged; the user only sees the notice when enabled
fn analysis_failed(state: &AppState) -> ! {
    if let Some(notice) = analysis_failure_notice(&state.config.analysis) {
        eprintln!("{notice}");
    }
    std::process::exit(1);
}

fn take_profile(args: &mut Vec<String>) -> Result<Option<VariantProfile>, String> {
    let Some(pos) = args.iter().position(|a| a == "--profile") else {
        return Ok(None);
    };
    if pos + 1 >= args.len() {
        return Err(USAGE.to_string());
    }

    let value = args.remove(pos + 1);
    args.remove(pos);

    match value.as_str() {
        "baseline" => Ok(Some(VariantProfile::Baseline)),
        "pre-release" => Ok(Some(VariantProfile::PreRelease)),
        "update" => Ok(Some(VariantProfile::Update)),
        other => Err(format!("Unknown profile: {other}")),
    }
}

fn print_analysis(result: &AnalysisResult) {
    println!("Title: {}", result.title);
    if let Some(preview) = &result.preview_stream_url {
        println!("Preview: {}", preview);
    }
    if let Some(thumbnail) = &result.thumbnail {
        println!("Thumbnail: {} bytes", thumbnail.len());
    }
    println!("Formats:");

    for (idx, label) in result.labels().iter().enumerate() {
        let marker = if Some(idx) == result.default_index { "*" } else { " " };
        println!("  {} {}", marker, label);
    }
}

async fn run_download(
    state: &AppState,
    args: &[String],
    mut events: mpsc::UnboundedReceiver<DownloadEvent>,
) {
    let url = args[0].clone();
    let target_dir = PathBuf::from(&args[1]);

    let (format_id, display_name) = match args.get(2) {
        Some(format_id) => (
            format_id.clone(),
            args.get(3).cloned().unwrap_or_else(|| "video".to_string()),
        ),
        None => {
            let analysis = match state.download_runtime.analyze(url.clone()).await {
                Ok(result) => result,
                Err(_) => analysis_failed(state),
            };
            let Some(format) = analysis.default_format() else {
                fail("No video formats available");
            };
            (format.format_id.clone(), analysis.title.clone())
        }
    };

    let task_id = match state
        .download_runtime
        .download(NewDownload {
            url,
            display_name: display_name.clone(),
            format_id,
            target_dir,
        })
        .await
    {
        Ok(task_id) => task_id,
        Err(error) => fail(&format!("Error: {error}")),
    };

    let controls = state.config.controller.task_controls;
    if controls {
        println!("Commands: p = pause/resume, c = cancel");
    }

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut awaiting_confirm = false;

    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                if event.task_id() != Some(task_id.as_str()) {
                    continue;
                }
                match event {
                    DownloadEvent::TaskProgress { progress, .. } => {
                        println!(
                            "{} | {} | ETA: {}",
                            progress.percent_text, progress.speed, progress.eta
                        );
                    }
                    DownloadEvent::TaskPaused { .. } => println!("PAUSED"),
                    DownloadEvent::TaskResumed { .. } => println!("Resumed"),
                    DownloadEvent::TaskCancelling { .. } => println!("Cancelling..."),
                    DownloadEvent::TaskCompleted { target_dir, .. } => {
                        println!("COMPLETE: {}", target_dir.display());
                        break;
                    }
                    DownloadEvent::TaskFailed { error, .. } => fail(&format!("ERROR: {error}")),
                    DownloadEvent::TaskRemoved { .. } => {
                        println!("Download cancelled");
                        break;
                    }
                    _ => {}
                }
            }
            Ok(Some(line)) = stdin.next_line(), if controls => {
                let answer = line.trim().to_lowercase();
                if awaiting_confirm {
                    awaiting_confirm = false;
                    let confirmed = answer == "y" || answer == "yes";
                    let outcome = state.download_runtime.cancel(task_id.clone(), confirmed).await;
                    if let Err(error) = outcome {
                        eprintln!("{error}");
                    }
                    continue;
                }

                match answer.as_str() {
                    "p" => {
                        let outcome = state.download_runtime.toggle_pause(task_id.clone()).await;
                        if let Err(error) = outcome {
                            eprintln!("{error}");
                        }
                    }
                    "c" => {
                        println!("Cancel download for {}? [y/N]", display_name);
                        awaiting_confirm = true;
                    }
                    _ => {}
                }
            }
            else => break,
        }
    }
}
