//! Batch orchestration
//!
//! The [`Pipeline`] turns the pending ledger into lookup tasks, runs them on
//! the worker pool, records every result as it arrives and checkpoints the
//! ledger on the way out, whether the batch finished, failed or was
//! interrupted.

use crate::{
    output_path, write_results, CheckpointGuard, Config, ExtractionStrategy, LookupError,
    LookupTask, PendingLedger, ProgressTracker, ResultAggregator, SessionFactory, Site,
    TaskRunner, WorkerPool,
};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Summary of a completed batch
#[derive(Debug, Clone)]
pub struct RunReport {
    pub site: Site,
    pub dispatched: usize,
    pub found: usize,
    pub skipped: usize,
    pub remaining: PendingLedger,
    pub output_path: PathBuf,
    pub elapsed: Duration,
}

/// Orchestrates one lookup batch against one site
///
/// # Examples
///
/// ```rust,no_run
/// use barcode_image_scraper::{
///     ledger, ChromeSessionFactory, Config, Pipeline, StrategyRegistry,
/// };
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let strategy = StrategyRegistry::with_defaults()?.resolve("upcitemdb")?;
///     let sessions = Arc::new(ChromeSessionFactory::new(config.clone()));
///     let (pending, _) = ledger::load(&config.input_file, &config.pending_file)?;
///
///     let pipeline = Pipeline::new(config, strategy, sessions);
///     let report = pipeline.run(pending, tokio::signal::ctrl_c()).await?;
///     println!("{} images found", report.found);
///     Ok(())
/// }
/// ```
pub struct Pipeline {
    config: Config,
    runner: Arc<TaskRunner>,
}

impl Pipeline {
    pub fn new(
        config: Config,
        strategy: Arc<dyn ExtractionStrategy>,
        sessions: Arc<dyn SessionFactory>,
    ) -> Self {
        let runner = Arc::new(TaskRunner::new(
            strategy,
            sessions,
            config.page_load_timeout(),
        ));

        Self { config, runner }
    }

    pub fn site(&self) -> Site {
        self.runner.site()
    }

    /// Resolve every barcode of `ledger`.
    ///
    /// Returns [`LookupError::Interrupted`] if `shutdown` completes first. The
    /// pending file is rewritten before this returns in every case; the result
    /// table is only written for a batch that ran to the end.
    pub async fn run<F, T>(&self, ledger: PendingLedger, shutdown: F) -> Result<RunReport, LookupError>
    where
        F: Future<Output = T>,
    {
        let started = Instant::now();
        let site = self.site();
        let aggregator = Arc::new(ResultAggregator::new());
        let guard = CheckpointGuard::new(
            ledger.clone(),
            &self.config.pending_file,
            aggregator.clone(),
        );

        let tasks: Vec<LookupTask> = ledger
            .barcodes()
            .iter()
            .map(|barcode| LookupTask::new(barcode.clone(), site))
            .collect();
        let dispatched = tasks.len();
        let progress = ProgressTracker::new(dispatched);

        info!(
            "Dispatching {} barcodes to {} workers for {}",
            dispatched, self.config.workers, site
        );

        let mut pool = WorkerPool::new(self.config.workers, self.runner.clone());
        pool.submit_all(tasks)?;

        tokio::pin!(shutdown);
        let interrupted = loop {
            tokio::select! {
                next = pool.next_result() => match next {
                    Some(result) => {
                        let found = result.outcome.is_found();
                        let barcode = result.barcode.clone();
                        let cell = result.outcome.as_cell().to_string();

                        if aggregator.record(result) {
                            progress.record_completion(found);
                            let snapshot = progress.get_progress();
                            info!(
                                "[{}/{}] {} -> {}",
                                snapshot.completed, snapshot.total, barcode, cell
                            );
                        }
                    }
                    None => break false,
                },
                _ = &mut shutdown => {
                    warn!(
                        "Interrupted with {} of {} barcodes done",
                        aggregator.len(),
                        dispatched
                    );
                    break true;
                }
            }
        };

        let snapshot = progress.get_progress();
        info!(
            "{} of {} barcodes done ({} found) at {:.2} barcodes/s",
            snapshot.completed, snapshot.total, snapshot.found, snapshot.rate
        );
        if !interrupted && !progress.is_complete() {
            warn!(
                "Worker pool finished with {} of {} results; missing barcodes stay pending",
                snapshot.completed, snapshot.total
            );
        }
        for stats in pool.get_worker_stats() {
            debug!(
                "Worker {}: {} processed, {} skipped, running: {}",
                stats.id, stats.processed_count, stats.skipped_count, stats.is_running
            );
        }
        pool.shutdown().await;

        let remaining = guard.commit()?;

        if interrupted {
            return Err(LookupError::Interrupted);
        }

        let table_path = output_path(&self.config.data_dir, site);
        write_results(&table_path, &aggregator.results())?;

        Ok(RunReport {
            site,
            dispatched,
            found: aggregator.found_count(),
            skipped: aggregator.skipped_count(),
            remaining,
            output_path: table_path,
            elapsed: started.elapsed(),
        })
    }
}
