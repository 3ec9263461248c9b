//! Configuration management with serde serialization/deserialization
//!
//! Settings are read once at startup from a JSON file (`settings.json` by
//! default). Every key is optional; absent keys keep their defaults.

use crate::LookupError;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Runtime configuration for a lookup batch
///
/// # Examples
///
/// ```rust
/// use barcode_image_scraper::Config;
///
/// let config = Config {
///     workers: 4,
///     page_load_timeout: 15,
///     ..Default::default()
/// };
/// assert_eq!(config.page_load_timeout(), std::time::Duration::from_secs(15));
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Upper bound in seconds for page navigation and for the marker wait
    /// (default: 10)
    ///
    /// Each bound applies separately, so one lookup may spend up to twice this
    /// value before it resolves to a skipped outcome.
    #[serde(deserialize_with = "setting_value")]
    pub page_load_timeout: u64,

    /// Number of concurrent lookups (default: number of CPUs)
    ///
    /// Every worker owns one browser at a time, so memory use grows linearly
    /// with this value.
    #[serde(deserialize_with = "setting_value")]
    pub workers: usize,

    /// Path to the Chrome/Chromium executable (default: auto-detect)
    pub chrome_path: Option<String>,

    /// Run browsers without a window (default: true)
    #[serde(deserialize_with = "setting_value")]
    pub headless: bool,

    /// Custom User-Agent string (default: Chrome default)
    pub user_agent: Option<String>,

    /// Full barcode list, one per line (default: `barcodes.txt`)
    pub input_file: PathBuf,

    /// Pending ledger rewritten at every checkpoint (default: `barcodes_pending.txt`)
    pub pending_file: PathBuf,

    /// Directory receiving the per-site result table (default: `data`)
    pub data_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            page_load_timeout: 10,
            workers: num_cpus::get(),
            chrome_path: None,
            headless: true,
            user_agent: None,
            input_file: PathBuf::from("barcodes.txt"),
            pending_file: PathBuf::from("barcodes_pending.txt"),
            data_dir: PathBuf::from("data"),
        }
    }
}

impl Config {
    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.page_load_timeout)
    }

    /// Read settings from `path`, falling back to defaults when the file does
    /// not exist.
    pub fn load(path: &Path) -> Result<Self, LookupError> {
        if !path.exists() {
            warn!(
                "{} not found, continuing with default settings",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content).map_err(|e| {
            LookupError::Configuration(format!("invalid settings in {}: {e}", path.display()))
        })?;

        info!("Settings loaded from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), LookupError> {
        if self.workers == 0 {
            return Err(LookupError::Configuration(
                "workers must be greater than 0".to_string(),
            ));
        }

        if self.page_load_timeout == 0 {
            return Err(LookupError::Configuration(
                "page_load_timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Numeric settings may be written plainly (`"workers": 4`) or in the wrapped
/// form (`"workers": {"value": 4}`) used by older settings files.
#[derive(Deserialize)]
#[serde(untagged)]
enum SettingValue<T> {
    Wrapped { value: T },
    Plain(T),
}

fn setting_value<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(match SettingValue::deserialize(deserializer)? {
        SettingValue::Wrapped { value } => value,
        SettingValue::Plain(value) => value,
    })
}

/// Generate Chrome command-line arguments for one isolated lookup session
pub fn get_chrome_args(config: &Config, user_data_dir: &Path) -> Vec<String> {
    let mut args = vec![
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
        "--disable-extensions".to_string(),
        "--disable-default-apps".to_string(),
        "--disable-sync".to_string(),
        "--no-first-run".to_string(),
        "--disable-features=TranslateUI".to_string(),
        "--disable-background-timer-throttling".to_string(),
        format!("--user-data-dir={}", user_data_dir.display()),
    ];

    if config.headless {
        args.push("--headless".to_string());
    }

    if let Some(user_agent) = &config.user_agent {
        args.push(format!("--user-agent={user_agent}"));
    }

    args
}

pub fn create_browser_config(
    config: &Config,
    user_data_dir: &Path,
) -> Result<chromiumoxide::browser::BrowserConfig, LookupError> {
    use chromiumoxide::browser::BrowserConfig;

    let mut builder = BrowserConfig::builder()
        .user_data_dir(user_data_dir)
        .request_timeout(config.page_load_timeout())
        .args(get_chrome_args(config, user_data_dir));

    if !config.headless {
        builder = builder.with_head();
    }

    if let Some(chrome_path) = &config.chrome_path {
        builder = builder.chrome_executable(chrome_path);
    }

    builder.build().map_err(LookupError::Configuration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.page_load_timeout(), Duration::from_secs(10));
        assert!(config.workers > 0);
        assert!(config.headless);
        assert_eq!(config.input_file, PathBuf::from("barcodes.txt"));
        assert_eq!(config.pending_file, PathBuf::from("barcodes_pending.txt"));
        assert_eq!(config.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn test_wrapped_settings() {
        let json = r#"{"page_load_timeout": {"value": 7}, "workers": {"value": 3}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.page_load_timeout, 7);
        assert_eq!(config.workers, 3);
    }

    #[test]
    fn test_plain_settings() {
        let json = r#"{"page_load_timeout": 5, "workers": 2, "data_dir": "out"}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.page_load_timeout, 5);
        assert_eq!(config.workers, 2);
        assert_eq!(config.data_dir, PathBuf::from("out"));
        assert_eq!(config.input_file, PathBuf::from("barcodes.txt"));
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config = Config {
            workers: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(LookupError::Configuration(_))
        ));

        let config = Config {
            page_load_timeout: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_missing_settings_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("settings.json")).unwrap();
        assert_eq!(config.page_load_timeout, 10);
    }

    #[test]
    fn test_invalid_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Config::load(&path),
            Err(LookupError::Configuration(_))
        ));
    }

    #[test]
    fn test_chrome_args_generation() {
        let config = Config {
            user_agent: Some("lookup-bot".to_string()),
            ..Default::default()
        };
        let args = get_chrome_args(&config, Path::new("/tmp/profile-1"));

        assert!(args.contains(&"--headless".to_string()));
        assert!(args.contains(&"--no-sandbox".to_string()));
        assert!(args.contains(&"--user-data-dir=/tmp/profile-1".to_string()));
        assert!(args.contains(&"--user-agent=lookup-bot".to_string()));

        let headed = Config {
            headless: false,
            ..Default::default()
        };
        assert!(!get_chrome_args(&headed, Path::new("/tmp/p")).contains(&"--headless".to_string()));
    }
}
