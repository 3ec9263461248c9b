use crate::{
    ledger, remove_path, ChromeSessionFactory, Config, LookupError, PendingLedger, Pipeline,
    RunReport, StrategyRegistry,
};
use clap::{Parser, ValueEnum};
use std::future::Future;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "barcode-image-scraper")]
#[command(about = "Fetch a product image URL for every barcode from a lookup website")]
#[command(version)]
pub struct Cli {
    #[arg(
        short = 'w',
        long = "website",
        help = "Lookup website (barcodelookup, barcodespider, upcitemdb, upczilla)"
    )]
    pub website: String,

    #[arg(short = 'd', long = "driver_path", help = "Path to the Chrome/Chromium executable")]
    pub driver_path: String,

    #[arg(long, help = "Remove previous output and pending ledger before running")]
    pub cleanup: bool,

    #[arg(long = "log_level", value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    #[arg(long, default_value = "settings.json", help = "Settings file path")]
    pub config: PathBuf,

    #[arg(short = 'y', long, help = "Resume from an existing pending ledger without asking")]
    pub yes: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    #[value(name = "INFO")]
    Info,
    #[value(name = "DEBUG")]
    Debug,
}

pub struct CliRunner {
    pub config: Config,
    website: String,
    cleanup: bool,
    assume_yes: bool,
}

impl CliRunner {
    pub fn new(mut config: Config, args: &Cli) -> Result<Self, LookupError> {
        config.chrome_path = Some(args.driver_path.clone());
        config.validate()?;

        info!("Page load timeout: {:?}", config.page_load_timeout());
        info!("Workers: {}", config.workers);

        Ok(Self {
            config,
            website: args.website.clone(),
            cleanup: args.cleanup,
            assume_yes: args.yes,
        })
    }

    pub async fn run<F, T>(&self, shutdown: F) -> Result<RunReport, LookupError>
    where
        F: Future<Output = T>,
    {
        let strategy = StrategyRegistry::with_defaults()?.resolve(&self.website)?;

        if self.cleanup {
            self.cleanup()?;
        }

        let pending = self.prepare()?;

        let sessions = Arc::new(ChromeSessionFactory::new(self.config.clone()));
        let pipeline = Pipeline::new(self.config.clone(), strategy, sessions);
        pipeline.run(pending, shutdown).await
    }

    /// Remove the output directory and the pending ledger
    pub fn cleanup(&self) -> Result<(), LookupError> {
        info!(
            "Cleaning up {} and {}",
            self.config.data_dir.display(),
            self.config.pending_file.display()
        );
        remove_path(&self.config.data_dir)?;
        remove_path(&self.config.pending_file)?;
        Ok(())
    }

    /// Create the output directory and load the ledger, asking the operator
    /// on the terminal before a previous pending ledger is reused.
    pub fn prepare(&self) -> Result<PendingLedger, LookupError> {
        let stdin = std::io::stdin();
        self.prepare_with(stdin.lock(), std::io::stdout())
    }

    pub fn prepare_with<R: BufRead, W: Write>(
        &self,
        input: R,
        output: W,
    ) -> Result<PendingLedger, LookupError> {
        std::fs::create_dir_all(&self.config.data_dir)?;

        let (pending, resumed) = ledger::load(&self.config.input_file, &self.config.pending_file)?;

        if resumed {
            if self.assume_yes {
                warn!("Resuming without confirmation (--yes)");
            } else {
                let confirmed = ledger::confirm_resume(input, output)?;
                if !confirmed {
                    return Err(LookupError::ResumeDeclined);
                }
            }
        }

        info!("{} barcodes pending", pending.len());
        Ok(pending)
    }
}

pub fn setup_logging(level: LogLevel) -> anyhow::Result<()> {
    let level = match level {
        LogLevel::Info => tracing::Level::INFO,
        LogLevel::Debug => tracing::Level::DEBUG,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install logger: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Vec<String> {
        let mut argv = vec!["barcode-image-scraper", "-w", "upczilla", "-d", "/usr/bin/chromium"];
        argv.extend_from_slice(extra);
        argv.into_iter().map(str::to_string).collect()
    }

    fn runner_in(dir: &std::path::Path, extra: &[&str]) -> CliRunner {
        let cli = Cli::try_parse_from(args(extra)).unwrap();
        let config = Config {
            input_file: dir.join("barcodes.txt"),
            pending_file: dir.join("barcodes_pending.txt"),
            data_dir: dir.join("data"),
            workers: 2,
            ..Default::default()
        };
        CliRunner::new(config, &cli).unwrap()
    }

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(args(&["--cleanup", "--log_level", "DEBUG"])).unwrap();
        assert_eq!(cli.website, "upczilla");
        assert_eq!(cli.driver_path, "/usr/bin/chromium");
        assert!(cli.cleanup);
        assert_eq!(cli.log_level, LogLevel::Debug);
        assert_eq!(cli.config, PathBuf::from("settings.json"));
        assert!(!cli.yes);
    }

    #[test]
    fn test_cli_requires_website_and_driver() {
        assert!(Cli::try_parse_from(["barcode-image-scraper", "-d", "/bin/chrome"]).is_err());
        assert!(Cli::try_parse_from(["barcode-image-scraper", "-w", "upczilla"]).is_err());
        assert!(Cli::try_parse_from(args(&["--log_level", "TRACE"])).is_err());
    }

    #[test]
    fn test_driver_path_becomes_chrome_path() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner_in(dir.path(), &[]);
        assert_eq!(runner.config.chrome_path.as_deref(), Some("/usr/bin/chromium"));
    }

    #[test]
    fn test_cleanup_removes_state() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner_in(dir.path(), &["--cleanup"]);
        std::fs::create_dir_all(dir.path().join("data")).unwrap();
        std::fs::write(dir.path().join("data/upczilla.csv"), "barcode,image_url\n").unwrap();
        std::fs::write(dir.path().join("barcodes_pending.txt"), "111\n").unwrap();

        runner.cleanup().unwrap();

        assert!(!dir.path().join("data").exists());
        assert!(!dir.path().join("barcodes_pending.txt").exists());
    }

    #[test]
    fn test_prepare_fresh_run() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("barcodes.txt"), "111\n222\n").unwrap();
        let runner = runner_in(dir.path(), &[]);

        let pending = runner.prepare().unwrap();
        assert_eq!(pending.barcodes(), &["111", "222"]);
        assert!(dir.path().join("data").is_dir());
        assert!(dir.path().join("barcodes_pending.txt").exists());
    }

    #[test]
    fn test_prepare_resume_with_assume_yes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("barcodes.txt"), "111\n222\n333\n").unwrap();
        std::fs::write(dir.path().join("barcodes_pending.txt"), "333\n").unwrap();
        let runner = runner_in(dir.path(), &["--yes"]);

        let pending = runner.prepare().unwrap();
        assert_eq!(pending.barcodes(), &["333"]);
    }

    #[test]
    fn test_declined_resume_keeps_pending_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("barcodes.txt"), "111\n222\n333\n").unwrap();
        let pending = dir.path().join("barcodes_pending.txt");
        std::fs::write(&pending, "222\n333").unwrap();
        let runner = runner_in(dir.path(), &[]);

        let mut prompt = Vec::new();
        let err = runner.prepare_with(&b"no\n"[..], &mut prompt).unwrap_err();

        assert!(matches!(err, LookupError::ResumeDeclined));
        assert!(err.is_fatal());
        assert!(String::from_utf8(prompt).unwrap().contains("enter 'yes'"));
        assert_eq!(std::fs::read(&pending).unwrap(), b"222\n333");
    }

    #[test]
    fn test_confirmed_resume_uses_pending_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("barcodes.txt"), "111\n222\n333\n").unwrap();
        std::fs::write(dir.path().join("barcodes_pending.txt"), "333\n").unwrap();
        let runner = runner_in(dir.path(), &[]);

        let pending = runner.prepare_with(&b"yes\n"[..], Vec::new()).unwrap();
        assert_eq!(pending.barcodes(), &["333"]);
    }

    #[tokio::test]
    async fn test_unknown_website_fails_before_touching_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("barcodes.txt"), "111\n").unwrap();
        let cli = Cli::try_parse_from([
            "barcode-image-scraper",
            "-w",
            "amazon",
            "-d",
            "/usr/bin/chromium",
            "--cleanup",
        ])
        .unwrap();
        let config = Config {
            input_file: dir.path().join("barcodes.txt"),
            pending_file: dir.path().join("barcodes_pending.txt"),
            data_dir: dir.path().join("data"),
            ..Default::default()
        };
        let runner = CliRunner::new(config, &cli).unwrap();

        let err = runner.run(std::future::pending::<()>()).await.unwrap_err();
        assert!(matches!(err, LookupError::Configuration(_)));
        assert!(!dir.path().join("barcodes_pending.txt").exists());
        assert!(dir.path().join("barcodes.txt").exists());
    }

    #[tokio::test]
    async fn test_missing_input_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner_in(dir.path(), &[]);

        let err = runner.run(std::future::pending::<()>()).await.unwrap_err();
        assert!(matches!(err, LookupError::Configuration(_)));
        assert!(err.is_fatal());
    }
}
