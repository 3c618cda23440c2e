//! Headless browser sessions and pages.
//!
//! Adapters never touch the driver directly. They work against two
//! object-safe traits:
//!
//! - [`BrowserSession`]: one browser process, able to open pages
//! - [`BrowserPage`]: one tab that can navigate, scroll and report its
//!   rendered HTML
//!
//! The production implementation lives in [`chromium`]; the launcher that
//! finds an executable and starts it lives in [`launcher`].
//!
//! # Ownership
//!
//! A page belongs to the task that opened it and is closed by that task on
//! every exit path ([`with_page`]). The session belongs to the top-level
//! scrape call and is closed exactly once after its pages
//! ([`with_session`]).

pub mod chromium;
pub mod launcher;
#[cfg(test)]
pub mod testing;

use crate::error::{BrowserError, LaunchError, ScrapeError};
use async_trait::async_trait;
use scraper::Html;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, warn};

pub use launcher::{LaunchedBrowser, Launcher};

/// Shared handle to an open page.
pub type PageHandle = Arc<dyn BrowserPage>;

/// One browser tab.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Navigate and wait for the document to load.
    async fn goto(&self, url: &str) -> Result<(), BrowserError>;

    /// Serialized HTML of the current DOM.
    async fn content(&self) -> Result<String, BrowserError>;

    /// Scroll to the bottom of the document to trigger lazy loading.
    async fn scroll_to_bottom(&self) -> Result<(), BrowserError>;

    async fn close(&self) -> Result<(), BrowserError>;
}

/// One running browser process.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn new_page(&self) -> Result<PageHandle, BrowserError>;

    /// Terminate the browser process. Pages must already be closed.
    async fn close(&self) -> Result<(), BrowserError>;
}

/// Navigate with an upper bound on how long the load may take.
pub async fn navigate(page: &dyn BrowserPage, url: &str, limit: Duration) -> Result<(), BrowserError> {
    match timeout(limit, page.goto(url)).await {
        Ok(result) => result,
        Err(_) => Err(BrowserError::NavigationTimeout {
            url: url.to_string(),
            after: limit,
        }),
    }
}

/// Poll the page's rendered HTML until `ready` holds or `limit` elapses.
///
/// Returns [`BrowserError::WaitTimeout`] when the condition never held;
/// callers log it and carry on with whatever the page shows.
pub async fn wait_for<F>(
    page: &dyn BrowserPage,
    what: &'static str,
    limit: Duration,
    poll: Duration,
    ready: F,
) -> Result<(), BrowserError>
where
    F: Fn(&Html) -> bool + Send + Sync,
{
    let deadline = Instant::now() + limit;
    loop {
        let html = page.content().await?;
        if holds(&html, &ready) {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(BrowserError::WaitTimeout { what, after: limit });
        }
        sleep(poll).await;
    }
}

/// Like [`wait_for`], but a timeout is only logged.
pub async fn wait_or_proceed<F>(
    page: &dyn BrowserPage,
    what: &'static str,
    limit: Duration,
    poll: Duration,
    ready: F,
) -> Result<(), BrowserError>
where
    F: Fn(&Html) -> bool + Send + Sync,
{
    match wait_for(page, what, limit, poll, ready).await {
        Err(BrowserError::WaitTimeout { what, after }) => {
            warn!(what, ?after, "Wait timed out; continuing with current content");
            Ok(())
        }
        other => other,
    }
}

fn holds<F: Fn(&Html) -> bool>(html: &str, ready: &F) -> bool {
    let document = Html::parse_document(html);
    ready(&document)
}

/// Open a page, run `task` on it and close it whatever the outcome.
pub async fn with_page<T, F, Fut>(session: &dyn BrowserSession, task: F) -> Result<T, BrowserError>
where
    F: FnOnce(PageHandle) -> Fut,
    Fut: Future<Output = Result<T, BrowserError>>,
{
    let page = session.new_page().await?;
    let result = task(Arc::clone(&page)).await;
    if let Err(e) = page.close().await {
        debug!(error = %e, "Failed to close page");
    }
    result
}

/// Launch a browser, run `task` with its session and close the session
/// exactly once afterwards, on success and on error alike.
pub async fn with_session<T, F, Fut>(launcher: &dyn Launcher, task: F) -> Result<T, ScrapeError>
where
    F: FnOnce(Arc<dyn BrowserSession>) -> Fut,
    Fut: Future<Output = Result<T, ScrapeError>>,
{
    let launched: LaunchedBrowser = launcher.launch().await.map_err(|e: LaunchError| {
        warn!(error = %e, "Browser launch failed");
        e
    })?;
    let session = launched.session;
    let result = task(Arc::clone(&session)).await;
    if let Err(e) = session.close().await {
        warn!(error = %e, "Failed to close browser session");
    }
    result
}
