use anyhow::Context;
use barcode_image_scraper::{
    elapsed_minutes, format_duration, format_timestamp, setup_logging, Cli, CliRunner, Config,
    LookupError, RunReport,
};
use chrono::Local;
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let args = match Cli::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // clap would exit with 2 on usage errors
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    if let Err(e) = setup_logging(args.log_level) {
        eprintln!("{e:#}");
        std::process::exit(1);
    }

    let start = Local::now();
    info!("Starting barcode-image-scraper v{}", env!("CARGO_PKG_VERSION"));
    info!("Script starts at: {}", format_timestamp(&start));

    let exit_code = match run(&args).await {
        Ok(report) => {
            info!(
                "Done: {} dispatched, {} images found, {} skipped, {} still pending",
                report.dispatched,
                report.found,
                report.skipped,
                report.remaining.len()
            );
            info!(
                "Fetched data has been stored in {} ({})",
                report.output_path.display(),
                format_duration(report.elapsed)
            );
            0
        }
        Err(e) => {
            let fatal = e
                .downcast_ref::<LookupError>()
                .map_or(true, LookupError::is_fatal);
            if fatal {
                error!("Error: {:#}", e);
            } else {
                error!(
                    "Error: {:#}. Unfinished barcodes were saved to the pending ledger",
                    e
                );
            }
            1
        }
    };

    let end = Local::now();
    info!("Script ends at: {}", format_timestamp(&end));
    let elapsed = (end - start).to_std().unwrap_or_default();
    info!("Time Elapsed: {} minutes", elapsed_minutes(elapsed));

    std::process::exit(exit_code);
}

async fn run(args: &Cli) -> anyhow::Result<RunReport> {
    let config = Config::load(&args.config).context("failed to load settings")?;
    let runner = CliRunner::new(config, args).context("invalid configuration")?;

    let report = runner
        .run(shutdown_signal())
        .await
        .with_context(|| format!("lookup batch for {} did not complete", args.website))?;

    Ok(report)
}

async fn shutdown_signal() {
    let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            if let Err(e) = signal::ctrl_c().await {
                warn!("Failed to listen for SIGINT: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Received SIGINT");
            return;
        }
    };

    tokio::select! {
        result = signal::ctrl_c() => {
            match result {
                Ok(()) => info!("Received SIGINT"),
                Err(e) => {
                    warn!("Failed to listen for SIGINT: {}", e);
                    sigterm.recv().await;
                    info!("Received SIGTERM");
                }
            }
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM");
        }
    }
}
