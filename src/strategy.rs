//! Per-site extraction strategies
//!
//! A strategy knows how to turn a barcode into a lookup URL and how to pull
//! the product image out of the rendered page. "No image" is a regular
//! outcome, not an error: a strategy never fails past its boundary.

use crate::{BrowserSession, LookupError};
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Cell text written for barcodes that produced no image
pub const SKIP_MARKER: &str = "skipped";

/// Cell text written for sites whose extraction is not implemented
pub const NOT_IMPLEMENTED_MARKER: &str = "NotImplemented";

/// Supported lookup websites
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Site {
    BarcodeLookup,
    BarcodeSpider,
    UpcItemDb,
    UpcZilla,
}

impl Site {
    pub const ALL: [Site; 4] = [
        Site::BarcodeLookup,
        Site::BarcodeSpider,
        Site::UpcItemDb,
        Site::UpcZilla,
    ];

    /// Identifier accepted on the command line and used to name the output
    pub fn id(&self) -> &'static str {
        match self {
            Site::BarcodeLookup => "barcodelookup",
            Site::BarcodeSpider => "barcodespider",
            Site::UpcItemDb => "upcitemdb",
            Site::UpcZilla => "upczilla",
        }
    }

    pub fn url_template(&self) -> &'static str {
        match self {
            Site::BarcodeLookup => "https://www.barcodelookup.com/{}",
            Site::BarcodeSpider => "https://www.barcodespider.com/{}",
            Site::UpcItemDb => "https://www.upcitemdb.com/upc/{}",
            Site::UpcZilla => "https://www.upczilla.com/item/{}",
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// What a lookup produced for one barcode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOutcome {
    Found(String),
    NotFound,
    NotImplemented,
}

impl ImageOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, ImageOutcome::Found(_))
    }

    /// Text stored in the output table
    pub fn as_cell(&self) -> &str {
        match self {
            ImageOutcome::Found(url) => url,
            ImageOutcome::NotFound => SKIP_MARKER,
            ImageOutcome::NotImplemented => NOT_IMPLEMENTED_MARKER,
        }
    }
}

#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    fn site(&self) -> Site;

    /// Deterministic lookup URL for `barcode`
    fn build_url(&self, barcode: &str) -> Result<Url, LookupError> {
        let url = self.site().url_template().replace("{}", barcode.trim());
        Ok(Url::parse(&url)?)
    }

    /// Inspect the page loaded in `session`. Waits at most `wait` for the
    /// site's marker element before giving up with `NotFound`.
    async fn extract(&self, session: &mut dyn BrowserSession, wait: Duration) -> ImageOutcome;
}

/// Strategy driven by a marker selector and an image selector
#[derive(Debug)]
pub struct SelectorStrategy {
    site: Site,
    marker: Selector,
    marker_css: &'static str,
    image: Selector,
}

impl SelectorStrategy {
    pub fn new(site: Site, marker: &'static str, image: &'static str) -> Result<Self, LookupError> {
        let parse = |css: &str| {
            Selector::parse(css)
                .map_err(|e| LookupError::Configuration(format!("bad selector {css:?}: {e}")))
        };

        Ok(Self {
            site,
            marker: parse(marker)?,
            marker_css: marker,
            image: parse(image)?,
        })
    }

    /// Pull the image URL from rendered HTML
    pub fn parse_image_url(&self, html: &str) -> Result<String, LookupError> {
        let document = Html::parse_document(html);

        if document.select(&self.marker).next().is_none() {
            return Err(LookupError::Extraction(format!(
                "marker {} missing",
                self.marker_css
            )));
        }

        let image = document
            .select(&self.image)
            .next()
            .ok_or_else(|| LookupError::Extraction("image element missing".to_string()))?;

        image
            .value()
            .attr("src")
            .map(str::trim)
            .filter(|src| !src.is_empty())
            .map(str::to_string)
            .ok_or_else(|| LookupError::Extraction("image has no src".to_string()))
    }
}

#[async_trait]
impl ExtractionStrategy for SelectorStrategy {
    fn site(&self) -> Site {
        self.site
    }

    async fn extract(&self, session: &mut dyn BrowserSession, wait: Duration) -> ImageOutcome {
        if !session.wait_for_selector(self.marker_css, wait).await {
            info!("Marker {} not present on {} within {:?}. Skipped", self.marker_css, self.site, wait);
            return ImageOutcome::NotFound;
        }

        let html = match session.content().await {
            Ok(html) => html,
            Err(e) => {
                info!("Error reading page from {}: {}. Skipped", self.site, e);
                return ImageOutcome::NotFound;
            }
        };

        match self.parse_image_url(&html) {
            Ok(url) => {
                debug!("Image found on {}: {}", self.site, url);
                ImageOutcome::Found(url)
            }
            Err(e) => {
                info!("Error on getting the image url from {}: {}. Skipped", self.site, e);
                ImageOutcome::NotFound
            }
        }
    }
}

/// Registered site whose extraction rules are not written yet
#[derive(Debug)]
pub struct NotImplementedStrategy {
    site: Site,
}

impl NotImplementedStrategy {
    pub fn new(site: Site) -> Self {
        Self { site }
    }
}

#[async_trait]
impl ExtractionStrategy for NotImplementedStrategy {
    fn site(&self) -> Site {
        self.site
    }

    async fn extract(&self, _session: &mut dyn BrowserSession, _wait: Duration) -> ImageOutcome {
        ImageOutcome::NotImplemented
    }
}

/// Lookup table from site identifier to strategy
pub struct StrategyRegistry {
    strategies: BTreeMap<&'static str, Arc<dyn ExtractionStrategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self {
            strategies: BTreeMap::new(),
        }
    }

    /// Registry with every supported site
    pub fn with_defaults() -> Result<Self, LookupError> {
        let mut registry = Self::new();
        registry.register(Arc::new(NotImplementedStrategy::new(Site::BarcodeLookup)));
        registry.register(Arc::new(SelectorStrategy::new(
            Site::BarcodeSpider,
            ".thumb-image",
            "div.thumb-image img",
        )?));
        registry.register(Arc::new(SelectorStrategy::new(
            Site::UpcItemDb,
            ".main-img",
            "img.product",
        )?));
        registry.register(Arc::new(SelectorStrategy::new(
            Site::UpcZilla,
            ".imgdiv",
            "div.imgdiv img",
        )?));
        Ok(registry)
    }

    pub fn register(&mut self, strategy: Arc<dyn ExtractionStrategy>) {
        self.strategies.insert(strategy.site().id(), strategy);
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn ExtractionStrategy>, LookupError> {
        self.strategies.get(name.trim()).cloned().ok_or_else(|| {
            LookupError::Configuration(format!(
                "unknown website {:?}, expected one of: {}",
                name,
                self.site_ids().join(", ")
            ))
        })
    }

    pub fn site_ids(&self) -> Vec<&'static str> {
        self.strategies.keys().copied().collect()
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
