/// Default filter when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str = "media_downloader_pro=info";

pub fn init_tracing() {
    init_tracing_with(None);
}

/// Install the fmt subscriber; an explicit level overrides the default filter
/// but `RUST_LOG` still wins. Safe to call more than once.
pub fn init_tracing_with(level: Option<&str>) {
    let fallback = match level {
        Some(level) => format!("media_downloader_pro={}", level),
        None => DEFAULT_LOG_FILTER.to_string(),
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| fallback.into());

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
