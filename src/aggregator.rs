//! Collects per-barcode outcomes into the result set and the set of
//! confirmed barcodes.

use crate::ImageOutcome;
use dashmap::DashSet;
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::warn;

/// Final outcome for one barcode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionResult {
    pub barcode: String,
    pub outcome: ImageOutcome,
}

impl ExtractionResult {
    pub fn new(barcode: impl Into<String>, outcome: ImageOutcome) -> Self {
        Self {
            barcode: barcode.into(),
            outcome,
        }
    }

    pub fn skipped(barcode: impl Into<String>) -> Self {
        Self::new(barcode, ImageOutcome::NotFound)
    }
}

/// Append-only store shared between the orchestrator and the checkpoint guard
///
/// A barcode is confirmed at most once; a second result for the same barcode
/// is dropped.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    results: Mutex<Vec<ExtractionResult>>,
    confirmed: DashSet<String>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the barcode had already been confirmed.
    pub fn record(&self, result: ExtractionResult) -> bool {
        if !self.confirmed.insert(result.barcode.clone()) {
            warn!("Duplicate result for barcode {} ignored", result.barcode);
            return false;
        }

        self.results
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(result);
        true
    }

    pub fn confirmed(&self) -> HashSet<String> {
        self.confirmed.iter().map(|b| b.key().clone()).collect()
    }

    /// Results in arrival order
    pub fn results(&self) -> Vec<ExtractionResult> {
        self.results
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.confirmed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.confirmed.is_empty()
    }

    pub fn found_count(&self) -> usize {
        self.results
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|r| r.outcome.is_found())
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.len() - self.found_count()
    }
}
