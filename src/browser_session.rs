//! Browser session handles for barcode lookups
//!
//! Every lookup gets its own freshly launched Chrome instance with a private
//! profile directory. Sessions are never shared between tasks and are released
//! as soon as the lookup finishes, whatever its outcome.

use crate::{create_browser_config, remove_path, Config, LookupError};
use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, warn};

/// Interval between two marker presence checks
pub const MARKER_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Upper bound for Chrome to exit after `close`
pub const BROWSER_EXIT_TIMEOUT: Duration = Duration::from_secs(5);

/// A driven browser that can open one URL and expose the rendered page
#[async_trait]
pub trait BrowserSession: Send {
    /// Navigate to `url`, giving up after `limit`
    async fn goto(&mut self, url: &str, limit: Duration) -> Result<(), LookupError>;

    /// Wait until an element matching `selector` is present. Returns `false`
    /// when `limit` elapses first.
    async fn wait_for_selector(&mut self, selector: &str, limit: Duration) -> bool;

    /// Rendered HTML of the current page
    async fn content(&mut self) -> Result<String, LookupError>;

    /// Release the browser. Called exactly once per session.
    async fn close(&mut self);
}

/// Opens isolated browser sessions
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn BrowserSession>, LookupError>;
}

/// Launches one headless Chrome per session through chromiumoxide
pub struct ChromeSessionFactory {
    config: Config,
    profile_root: PathBuf,
}

impl ChromeSessionFactory {
    pub fn new(config: Config) -> Self {
        let profile_root =
            std::env::temp_dir().join(format!("barcode-image-scraper-{}", std::process::id()));

        Self {
            config,
            profile_root,
        }
    }

    /// Directory holding the per-session profiles of this run
    pub fn profile_root(&self) -> &Path {
        &self.profile_root
    }
}

impl Drop for ChromeSessionFactory {
    fn drop(&mut self) {
        if let Err(e) = remove_path(&self.profile_root) {
            debug!(
                "Could not remove profile root {}: {}",
                self.profile_root.display(),
                e
            );
        }
    }
}

#[async_trait]
impl SessionFactory for ChromeSessionFactory {
    async fn open(&self) -> Result<Box<dyn BrowserSession>, LookupError> {
        let user_data_dir = self.profile_root.join(uuid::Uuid::new_v4().to_string());
        std::fs::create_dir_all(&user_data_dir).map_err(|e| {
            LookupError::BrowserLaunch(format!("Failed to create profile dir: {e}"))
        })?;

        let browser_config = create_browser_config(&self.config, &user_data_dir)?;

        let (browser, mut handler) = match Browser::launch(browser_config).await {
            Ok(launched) => launched,
            Err(e) => {
                let _ = std::fs::remove_dir_all(&user_data_dir);
                return Err(LookupError::BrowserLaunch(e.to_string()));
            }
        };

        // The handler drives the CDP connection and must be polled for the
        // browser to make progress.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {}", e);
                    break;
                }
            }
        });

        debug!("Browser session opened with profile {}", user_data_dir.display());

        Ok(Box::new(ChromeSession {
            browser: Some(browser),
            page: None,
            handler: handler_task,
            user_data_dir,
        }))
    }
}

pub struct ChromeSession {
    browser: Option<Browser>,
    page: Option<Page>,
    handler: tokio::task::JoinHandle<()>,
    user_data_dir: PathBuf,
}

impl ChromeSession {
    fn page(&self) -> Result<&Page, LookupError> {
        self.page
            .as_ref()
            .ok_or_else(|| LookupError::Navigation("no page has been opened".to_string()))
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn goto(&mut self, url: &str, limit: Duration) -> Result<(), LookupError> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| LookupError::Navigation("session already closed".to_string()))?;

        let page = timeout(limit, browser.new_page(url))
            .await
            .map_err(|_| LookupError::Timeout(limit))?
            .map_err(|e| LookupError::Navigation(e.to_string()))?;

        self.page = Some(page);
        Ok(())
    }

    async fn wait_for_selector(&mut self, selector: &str, limit: Duration) -> bool {
        let page = match self.page() {
            Ok(page) => page,
            Err(_) => return false,
        };

        let deadline = Instant::now() + limit;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }

            if let Ok(Ok(_)) = timeout(remaining, page.find_element(selector)).await {
                return true;
            }

            sleep(MARKER_POLL_INTERVAL.min(remaining)).await;
        }
    }

    async fn content(&mut self) -> Result<String, LookupError> {
        self.page()?
            .content()
            .await
            .map_err(|e| LookupError::Extraction(e.to_string()))
    }

    async fn close(&mut self) {
        if let Some(page) = self.page.take() {
            let _ = page.close().await;
        }

        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                warn!("Failed to close browser: {}", e);
            }
            match timeout(BROWSER_EXIT_TIMEOUT, browser.wait()).await {
                Ok(Err(e)) => debug!("Failed to wait for browser exit: {}", e),
                Err(_) => {
                    warn!(
                        "Browser did not exit within {:?}, killing it",
                        BROWSER_EXIT_TIMEOUT
                    );
                    if let Some(Err(e)) = browser.kill().await {
                        warn!("Failed to kill browser: {}", e);
                    }
                }
                Ok(Ok(_)) => {}
            }
        }

        self.handler.abort();

        if let Err(e) = std::fs::remove_dir_all(&self.user_data_dir) {
            debug!(
                "Could not remove profile dir {}: {}",
                self.user_data_dir.display(),
                e
            );
        }
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        // Reached without `close` when the lookup was cancelled. Dropping the
        // Browser kills the child process before its profile is removed.
        let unclosed = self.browser.is_some();
        self.page.take();
        self.browser.take();
        self.handler.abort();

        if unclosed {
            if let Err(e) = remove_path(&self.user_data_dir) {
                debug!(
                    "Could not remove profile dir {}: {}",
                    self.user_data_dir.display(),
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_removes_profile_root() {
        let factory = ChromeSessionFactory::new(Config::default());
        let root = factory.profile_root().to_path_buf();
        std::fs::create_dir_all(root.join("leftover-session")).unwrap();

        drop(factory);

        assert!(!root.exists());
    }
}
