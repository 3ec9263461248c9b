use chrono::{DateTime, Local};
use std::path::Path;
use std::time::Duration;

/// Timestamp format used for the run start/end log lines
pub const TIMESTAMP_FORMAT: &str = "%d-%m-%Y %H:%M:%S %p";

pub fn format_timestamp(time: &DateTime<Local>) -> String {
    time.format(TIMESTAMP_FORMAT).to_string()
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    let millis = duration.subsec_millis();

    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else if seconds > 0 {
        format!("{}.{}s", seconds, millis / 100)
    } else {
        format!("{millis}ms")
    }
}

/// Elapsed time in minutes, rounded to four decimals
pub fn elapsed_minutes(duration: Duration) -> f64 {
    (duration.as_secs_f64() / 60.0 * 10_000.0).round() / 10_000.0
}

/// Remove a file or directory tree. Missing paths are not an error.
pub fn remove_path(path: &Path) -> std::io::Result<()> {
    let result = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };

    match result {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
        assert_eq!(format_duration(Duration::from_secs(5)), "5.0s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 5s");
        assert_eq!(format_duration(Duration::from_secs(3665)), "1h 1m 5s");
    }

    #[test]
    fn test_elapsed_minutes() {
        assert_eq!(elapsed_minutes(Duration::from_secs(90)), 1.5);
        assert_eq!(elapsed_minutes(Duration::from_secs(1)), 0.0167);
        assert_eq!(elapsed_minutes(Duration::ZERO), 0.0);
    }

    #[test]
    fn test_format_timestamp() {
        let time = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(format_timestamp(&time), "09-03-2024 14:05:07 PM");
    }

    #[test]
    fn test_remove_path() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("data");
        std::fs::create_dir_all(nested.join("inner")).unwrap();
        let file = dir.path().join("pending.txt");
        std::fs::write(&file, "111").unwrap();

        remove_path(&nested).unwrap();
        remove_path(&file).unwrap();
        remove_path(&dir.path().join("missing")).unwrap();

        assert!(!nested.exists());
        assert!(!file.exists());
    }
}
