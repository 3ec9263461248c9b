//! # Barcode Image Scraper
//!
//! Resolves a product image URL for every barcode in a list by driving a
//! headless Chrome against a barcode lookup website. Lookups run on a fixed
//! pool of workers, each with its own short-lived browser, and the list of
//! barcodes still to do is checkpointed on every way out of a run, so a long
//! batch can be stopped and resumed at any time.
//!
//! ## Supported sites
//!
//! | Identifier | Lookup URL | Extraction |
//! |------------|------------|------------|
//! | `barcodespider` | `https://www.barcodespider.com/{barcode}` | `div.thumb-image img` |
//! | `upcitemdb` | `https://www.upcitemdb.com/upc/{barcode}` | `img.product` |
//! | `upczilla` | `https://www.upczilla.com/item/{barcode}` | `div.imgdiv img` |
//! | `barcodelookup` | `https://www.barcodelookup.com/{barcode}` | not implemented |
//!
//! ## Files
//!
//! - `barcodes.txt`: full input list, one barcode per line
//! - `barcodes_pending.txt`: barcodes not yet done; its presence means the
//!   next run resumes from it
//! - `data/<site>.csv`: `barcode,image_url` table written after a complete run
//! - `settings.json`: `page_load_timeout` (seconds) and `workers`
//!
//! ## CLI Usage
//!
//! ```bash
//! barcode-image-scraper --website upcitemdb --driver_path /usr/bin/chromium
//!
//! # start over, discarding previous output and pending ledger
//! barcode-image-scraper -w upczilla -d /usr/bin/chromium --cleanup --log_level DEBUG
//! ```

/// Configuration and settings
pub mod config;

/// Error types
pub mod error;

/// Browser sessions, one per lookup
pub mod browser_session;

/// Per-site extraction strategies
pub mod strategy;

/// Pending-work ledger and checkpointing
pub mod ledger;

/// Result collection
pub mod aggregator;

/// Worker pool executing lookups
pub mod worker;

/// Batch orchestration
pub mod pipeline;

/// Result table output
pub mod output;

/// Command-line interface implementation
pub mod cli;

/// Utility functions and helpers
pub mod utils;


pub use aggregator::*;
pub use browser_session::*;
pub use cli::*;
pub use config::*;
pub use error::*;
pub use ledger::{CheckpointGuard, PendingLedger};
pub use output::*;
pub use pipeline::*;
pub use strategy::*;
pub use utils::*;
pub use worker::*;
