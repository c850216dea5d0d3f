//! Human-readable rendering of sizes and clock times

/// Render a byte count as `12.3MB`; unknown or zero sizes become `N/A`
pub fn format_bytes(size: Option<u64>) -> String {
    let mut value = match size {
        Some(bytes) if bytes > 0 => bytes as f64,
        _ => return "N/A".to_string(),
    };

    for unit in ["", "K", "M", "G", "T"] {
        if value < 1024.0 {
            return format!("{:.1}{}B", value, unit);
        }
        value /= 1024.0;
    }

    format!("{:.1}PB", value)
}

/// `MM:SS` clock, minutes wrap at the hour like a wall clock
pub fn format_clock(seconds: u64) -> String {
    format!("{:02}:{:02}", (seconds / 60) % 60, seconds % 60)
}
