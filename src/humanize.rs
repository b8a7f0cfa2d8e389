//! Human-readable renderings of sizes, durations and file names.

const FILESIZE_UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
const FILENAME_FORBIDDEN: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
const MAX_FILENAME_CHARS: usize = 50;

pub const DEFAULT_FILENAME: &str = "twitter_space";

/// How a media duration is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationStyle {
    /// Always `MM:SS`; minutes keep counting past the hour.
    Minutes,
    /// `HH:MM:SS` once the duration reaches an hour, `MM:SS` below it.
    Clock,
}

pub fn format_filesize(size: Option<f64>) -> String {
    let Some(mut size) = size.filter(|value| *value != 0.0 && !value.is_nan()) else {
        return "Unknown size".to_string();
    };

    for unit in FILESIZE_UNITS {
        if size < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }

    format!("{size:.1} TB")
}

pub fn format_duration(duration: Option<f64>, style: DurationStyle) -> String {
    let Some(duration) = duration.filter(|value| *value > 0.0) else {
        return "Unknown".to_string();
    };

    let total = duration.floor() as u64;
    let seconds = total % 60;

    match style {
        DurationStyle::Minutes => format!("{:02}:{seconds:02}", total / 60),
        DurationStyle::Clock => {
            let hours = total / 3600;
            let minutes = (total % 3600) / 60;
            if hours > 0 {
                format!("{hours:02}:{minutes:02}:{seconds:02}")
            } else {
                format!("{minutes:02}:{seconds:02}")
            }
        }
    }
}

/// Strips path-hostile characters, swaps spaces for underscores and caps the
/// result at 50 characters. Empty input (or input that sanitizes to nothing)
/// yields [`DEFAULT_FILENAME`].
pub fn sanitize_filename(name: &str) -> String {
    let sanitized = strip_forbidden(name);
    if sanitized.is_empty() {
        return DEFAULT_FILENAME.to_string();
    }

    sanitized.chars().take(MAX_FILENAME_CHARS).collect()
}

pub(crate) fn strip_forbidden(name: &str) -> String {
    name.chars()
        .filter(|character| !FILENAME_FORBIDDEN.contains(character))
        .collect::<String>()
        .trim()
        .replace(' ', "_")
}
