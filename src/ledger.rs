//! Pending-work ledger
//!
//! The ledger is the persisted set of barcodes that still need a lookup. It is
//! loaded once at startup and rewritten on every way out of a run as
//! `ledger at start - confirmed barcodes`, so an interrupted batch resumes
//! where it stopped and never forgets unfinished work.

use crate::{LookupError, ResultAggregator};
use std::collections::HashSet;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

/// Barcodes not yet confirmed, in first-seen order without duplicates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingLedger {
    barcodes: Vec<String>,
}

impl PendingLedger {
    pub fn from_barcodes<I, S>(barcodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let barcodes = barcodes
            .into_iter()
            .map(|b| b.as_ref().trim().to_string())
            .filter(|b| !b.is_empty())
            .filter(|b| seen.insert(b.clone()))
            .collect();

        Self { barcodes }
    }

    pub fn parse(content: &str) -> Self {
        Self::from_barcodes(content.lines())
    }

    pub fn read(path: &Path) -> Result<Self, LookupError> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    pub fn barcodes(&self) -> &[String] {
        &self.barcodes
    }

    pub fn len(&self) -> usize {
        self.barcodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.barcodes.is_empty()
    }

    /// Barcodes of this ledger that are not in `confirmed`
    pub fn remaining(&self, confirmed: &HashSet<String>) -> PendingLedger {
        Self {
            barcodes: self
                .barcodes
                .iter()
                .filter(|b| !confirmed.contains(*b))
                .cloned()
                .collect(),
        }
    }

    /// Replace the file at `path` with this ledger, one barcode per line.
    ///
    /// The content goes to a sibling temp file first and is renamed over the
    /// target, so a crash mid-write leaves the previous ledger intact.
    pub fn write(&self, path: &Path) -> Result<(), LookupError> {
        let tmp_path = temp_path_for(path);
        {
            let mut file = std::fs::File::create(&tmp_path)?;
            for barcode in &self.barcodes {
                writeln!(file, "{barcode}")?;
            }
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Load the ledger for this run. Returns the ledger and whether it was resumed
/// from an existing pending file.
///
/// On a fresh start the input list is copied to `resume_path` right away, so
/// a run killed before its first checkpoint still leaves a full ledger behind.
pub fn load(source_path: &Path, resume_path: &Path) -> Result<(PendingLedger, bool), LookupError> {
    if resume_path.exists() {
        let ledger = PendingLedger::read(resume_path)?;
        info!(
            "{} found! Resuming with {} pending barcodes",
            resume_path.display(),
            ledger.len()
        );
        return Ok((ledger, true));
    }

    if !source_path.exists() {
        return Err(LookupError::Configuration(format!(
            "{} doesn't exist and there is no pending file to resume from",
            source_path.display()
        )));
    }

    info!(
        "{} not found. Reading all barcodes from {}",
        resume_path.display(),
        source_path.display()
    );
    let ledger = PendingLedger::read(source_path)?;
    ledger.write(resume_path)?;
    Ok((ledger, false))
}

/// Rewrite `resume_path` with `original - confirmed`.
pub fn checkpoint(
    original: &PendingLedger,
    confirmed: &HashSet<String>,
    resume_path: &Path,
) -> Result<PendingLedger, LookupError> {
    let remaining = original.remaining(confirmed);
    remaining.write(resume_path)?;
    info!(
        "Checkpoint written to {}: {} done, {} pending",
        resume_path.display(),
        original.len() - remaining.len(),
        remaining.len()
    );
    Ok(remaining)
}

/// Ask the operator to confirm reuse of an existing pending file.
pub fn confirm_resume<R: BufRead, W: Write>(mut input: R, mut output: W) -> std::io::Result<bool> {
    writeln!(
        output,
        "A pending ledger from a previous run was found. Please ensure you took a backup."
    )?;
    writeln!(output, "To continue, enter 'yes': ")?;
    output.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("yes"))
}

/// Scoped checkpoint for one run
///
/// `commit` writes the ledger once. If the guard goes out of scope without a
/// commit (early return, panic) the write happens in `Drop`.
pub struct CheckpointGuard {
    original: PendingLedger,
    resume_path: PathBuf,
    aggregator: Arc<ResultAggregator>,
    committed: bool,
}

impl CheckpointGuard {
    pub fn new(
        original: PendingLedger,
        resume_path: impl Into<PathBuf>,
        aggregator: Arc<ResultAggregator>,
    ) -> Self {
        Self {
            original,
            resume_path: resume_path.into(),
            aggregator,
            committed: false,
        }
    }

    pub fn commit(mut self) -> Result<PendingLedger, LookupError> {
        self.committed = true;
        self.write()
    }

    fn write(&self) -> Result<PendingLedger, LookupError> {
        info!("Backing up the pending barcodes to be done ...");
        checkpoint(&self.original, &self.aggregator.confirmed(), &self.resume_path)
    }
}

impl Drop for CheckpointGuard {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(e) = self.write() {
            error!("Failed to write pending ledger: {}", e);
        }
    }
}
