use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::Local;
use tracing_subscriber::{EnvFilter, fmt};

pub fn setup_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .try_init();
}

/// Routes tracing output to an append-only log file. Falls back to stderr when
/// the file cannot be opened.
pub fn setup_file_tracing(log_path: &Path) {
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let file = match OpenOptions::new().create(true).append(true).open(log_path) {
        Ok(file) => file,
        Err(_) => {
            setup_tracing();
            return;
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init();
}

/// `1234567` -> `1,234,567`, sign preserved.
pub fn format_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if value < 0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

pub fn format_tokens(tokens: u64) -> String {
    format_thousands(i64::try_from(tokens).unwrap_or(i64::MAX))
}

pub fn percent_of(part: f64, whole: f64) -> f64 {
    if whole <= 0.0 || !whole.is_finite() {
        return 0.0;
    }
    part / whole * 100.0
}

/// Character-aware prefix; never splits a multi-byte character.
pub fn truncate_chars(input: &str, max_chars: usize) -> &str {
    match input.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &input[..byte_idx],
        None => input,
    }
}

pub fn human_interval(interval: Duration) -> String {
    let millis = interval.as_millis();
    if millis % 1000 == 0 {
        format!("{}s", millis / 1000)
    } else {
        format!("{:.1}s", interval.as_secs_f64())
    }
}

pub fn now_local() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Expands a leading `~` to the home directory.
pub fn resolve_user_path(raw_path: &str) -> PathBuf {
    let path = raw_path.trim();
    if path == "~"
        && let Some(home) = dirs::home_dir()
    {
        return home;
    }

    if let Some(stripped) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\"))
        && let Some(home) = dirs::home_dir()
    {
        return home.join(stripped);
    }

    Path::new(path).to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thousands_grouping() {
        assert_eq!(format_thousands(0), "0");
        assert_eq!(format_thousands(999), "999");
        assert_eq!(format_thousands(1_000), "1,000");
        assert_eq!(format_thousands(155_000), "155,000");
        assert_eq!(format_thousands(1_234_567), "1,234,567");
        assert_eq!(format_thousands(-5_000), "-5,000");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("abc", 36), "abc");
        assert_eq!(truncate_chars("ééé", 2), "éé");
    }

    #[test]
    fn interval_formatting() {
        assert_eq!(human_interval(Duration::from_millis(500)), "0.5s");
        assert_eq!(human_interval(Duration::from_secs(2)), "2s");
    }

    #[test]
    fn percent_of_zero_whole_is_zero() {
        assert_eq!(percent_of(10.0, 0.0), 0.0);
        assert_eq!(percent_of(50.0, 200.0), 25.0);
    }

    #[test]
    fn plain_paths_are_untouched() {
        assert_eq!(resolve_user_path(" /tmp/state.json "), PathBuf::from("/tmp/state.json"));
    }
}
