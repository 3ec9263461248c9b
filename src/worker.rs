use crate::{
    BrowserSession, ExtractionResult, ExtractionStrategy, ImageOutcome, LookupError,
    SessionFactory, Site,
};
use futures::future::join_all;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// One barcode to resolve against one site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupTask {
    pub barcode: String,
    pub site: Site,
}

impl LookupTask {
    pub fn new(barcode: impl Into<String>, site: Site) -> Self {
        Self {
            barcode: barcode.into(),
            site,
        }
    }
}

/// Executes a single lookup end to end
pub struct TaskRunner {
    strategy: Arc<dyn ExtractionStrategy>,
    sessions: Arc<dyn SessionFactory>,
    page_load_timeout: Duration,
}

impl TaskRunner {
    pub fn new(
        strategy: Arc<dyn ExtractionStrategy>,
        sessions: Arc<dyn SessionFactory>,
        page_load_timeout: Duration,
    ) -> Self {
        Self {
            strategy,
            sessions,
            page_load_timeout,
        }
    }

    pub fn site(&self) -> Site {
        self.strategy.site()
    }

    /// Never fails: any error or panic while resolving the barcode becomes a
    /// skipped result.
    pub async fn execute(&self, task: LookupTask) -> ExtractionResult {
        info!("Getting image for barcode: {}", task.barcode);

        let outcome = match AssertUnwindSafe(self.resolve(&task)).catch_unwind().await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e @ LookupError::TaskPanicked(_))) => {
                error!("Lookup for barcode {} aborted: {}. Skipped", task.barcode, e);
                ImageOutcome::NotFound
            }
            Ok(Err(e)) if e.is_task_local() => {
                info!("Lookup for barcode {} failed: {}. Skipped", task.barcode, e);
                ImageOutcome::NotFound
            }
            Ok(Err(e)) => {
                warn!("Lookup for barcode {} failed: {}. Skipped", task.barcode, e);
                ImageOutcome::NotFound
            }
            Err(panic) => {
                let e = LookupError::TaskPanicked(panic_message(&panic));
                error!("Lookup for barcode {} aborted: {}. Skipped", task.barcode, e);
                ImageOutcome::NotFound
            }
        };

        ExtractionResult::new(task.barcode, outcome)
    }

    async fn resolve(&self, task: &LookupTask) -> Result<ImageOutcome, LookupError> {
        let url = self.strategy.build_url(&task.barcode)?;
        let mut session = self.sessions.open().await?;

        // A panic while driving the page must not skip `close`.
        let outcome = AssertUnwindSafe(self.navigate_and_extract(session.as_mut(), url.as_str()))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(LookupError::TaskPanicked(panic_message(&panic))));

        session.close().await;
        outcome
    }

    async fn navigate_and_extract(
        &self,
        session: &mut dyn BrowserSession,
        url: &str,
    ) -> Result<ImageOutcome, LookupError> {
        debug!("Navigating to {}", url);
        session.goto(url, self.page_load_timeout).await?;
        Ok(self.strategy.extract(session, self.page_load_timeout).await)
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub struct LookupWorker {
    id: usize,
    runner: Arc<TaskRunner>,
    is_running: Arc<AtomicBool>,
    processed_count: Arc<AtomicUsize>,
    skipped_count: Arc<AtomicUsize>,
}

impl LookupWorker {
    pub fn new(id: usize, runner: Arc<TaskRunner>) -> Self {
        Self {
            id,
            runner,
            is_running: Arc::new(AtomicBool::new(false)),
            processed_count: Arc::new(AtomicUsize::new(0)),
            skipped_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn run_with_shared_receiver(
        &self,
        tasks: Arc<Mutex<mpsc::Receiver<LookupTask>>>,
        results: mpsc::Sender<ExtractionResult>,
    ) {
        debug!("Starting lookup worker {}", self.id);
        self.is_running.store(true, Ordering::Relaxed);

        loop {
            // The lock is released before the lookup starts.
            let task = {
                let mut receiver = tasks.lock().await;
                receiver.recv().await
            };

            let Some(task) = task else { break };

            let result = self.runner.execute(task).await;

            self.processed_count.fetch_add(1, Ordering::Relaxed);
            if !result.outcome.is_found() {
                self.skipped_count.fetch_add(1, Ordering::Relaxed);
            }

            if let Err(e) = results.send(result).await {
                error!("Worker {} failed to send result: {}", self.id, e);
                break;
            }
        }

        self.is_running.store(false, Ordering::Relaxed);
        debug!("Lookup worker {} stopped", self.id);
    }

    pub fn get_stats(&self) -> WorkerStats {
        WorkerStats {
            id: self.id,
            is_running: self.is_running(),
            processed_count: self.processed_count(),
            skipped_count: self.skipped_count.load(Ordering::Relaxed),
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    pub fn processed_count(&self) -> usize {
        self.processed_count.load(Ordering::Relaxed)
    }
}

impl Clone for LookupWorker {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            runner: self.runner.clone(),
            is_running: self.is_running.clone(),
            processed_count: self.processed_count.clone(),
            skipped_count: self.skipped_count.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerStats {
    pub id: usize,
    pub is_running: bool,
    pub processed_count: usize,
    pub skipped_count: usize,
}

/// Fixed-size pool of lookup workers
///
/// Workers pull from one shared task queue, so at most `worker_count` lookups
/// (and browsers) are alive at any time. Results come back in completion
/// order.
pub struct WorkerPool {
    workers: Vec<LookupWorker>,
    handles: Vec<JoinHandle<()>>,
    task_sender: Option<mpsc::Sender<LookupTask>>,
    result_receiver: mpsc::Receiver<ExtractionResult>,
}

impl WorkerPool {
    pub fn new(worker_count: usize, runner: Arc<TaskRunner>) -> Self {
        let worker_count = worker_count.max(1);
        let (task_sender, task_receiver) = mpsc::channel(worker_count * 2);
        let (result_sender, result_receiver) = mpsc::channel(worker_count * 2);

        let shared_receiver = Arc::new(Mutex::new(task_receiver));
        let mut workers = Vec::with_capacity(worker_count);
        let mut handles = Vec::with_capacity(worker_count);

        for i in 0..worker_count {
            let worker = LookupWorker::new(i, runner.clone());
            let worker_clone = worker.clone();
            let rx = shared_receiver.clone();
            let tx = result_sender.clone();

            handles.push(tokio::spawn(async move {
                worker_clone.run_with_shared_receiver(rx, tx).await;
            }));
            workers.push(worker);
        }

        Self {
            workers,
            handles,
            task_sender: Some(task_sender),
            result_receiver,
        }
    }

    /// Queue every task. Submission runs on its own task so results can be
    /// drained while the queue is still being filled. No more tasks can be
    /// submitted afterwards.
    pub fn submit_all(&mut self, tasks: Vec<LookupTask>) -> Result<(), LookupError> {
        let sender = self.task_sender.take().ok_or_else(|| {
            LookupError::Configuration("tasks were already submitted to this pool".to_string())
        })?;

        tokio::spawn(async move {
            for task in tasks {
                if sender.send(task).await.is_err() {
                    debug!("Worker pool closed before all tasks were queued");
                    break;
                }
            }
        });

        Ok(())
    }

    /// Next finished result, or `None` once every submitted task is done
    pub async fn next_result(&mut self) -> Option<ExtractionResult> {
        self.result_receiver.recv().await
    }

    pub fn get_worker_stats(&self) -> Vec<WorkerStats> {
        self.workers.iter().map(|w| w.get_stats()).collect()
    }

    /// Stop all workers and wait until they are gone. In-flight lookups are
    /// dropped without a result, which releases their sessions.
    pub async fn shutdown(&mut self) {
        self.abort_all();
        for result in join_all(self.handles.drain(..)).await {
            if let Err(e) = result {
                if e.is_panic() {
                    error!("Lookup worker panicked: {}", e);
                }
            }
        }
    }

    fn abort_all(&mut self) {
        self.task_sender.take();
        for handle in &self.handles {
            handle.abort();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.abort_all();
    }
}

/// Run `tasks` on `concurrency` workers and collect the results in completion
/// order.
pub async fn run_tasks(
    tasks: Vec<LookupTask>,
    concurrency: usize,
    runner: Arc<TaskRunner>,
) -> Result<Vec<ExtractionResult>, LookupError> {
    let expected = tasks.len();
    let mut pool = WorkerPool::new(concurrency, runner);
    pool.submit_all(tasks)?;

    let mut results = Vec::with_capacity(expected);
    while let Some(result) = pool.next_result().await {
        results.push(result);
    }

    Ok(results)
}

pub struct ProgressTracker {
    total: usize,
    completed: AtomicUsize,
    skipped: AtomicUsize,
    start_time: std::time::Instant,
}

impl ProgressTracker {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn record_completion(&self, found: bool) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        if !found {
            self.skipped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn get_progress(&self) -> ProgressInfo {
        let completed = self.completed.load(Ordering::Relaxed);
        let skipped = self.skipped.load(Ordering::Relaxed);
        let elapsed = self.start_time.elapsed();
        let rate = if elapsed.as_secs_f64() > 0.0 {
            completed as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        ProgressInfo {
            total: self.total,
            completed,
            skipped,
            found: completed - skipped,
            elapsed,
            rate,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed.load(Ordering::Relaxed) >= self.total
    }
}

#[derive(Debug, Clone)]
pub struct ProgressInfo {
    pub total: usize,
    pub completed: usize,
    pub skipped: usize,
    pub found: usize,
    pub elapsed: Duration,
    pub rate: f64,
}
