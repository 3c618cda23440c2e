//! In-memory browser used by the tests.
//!
//! A [`FakeSite`] maps URLs to canned HTML. Every page opened from its
//! session serves that HTML, optionally switching to a later version after
//! each scroll, and the site counts navigations, pages and session closes
//! so tests can check fetch and ownership behaviour.

use super::launcher::{ExecutableSource, LaunchedBrowser, Launcher, ResolvedExecutable};
use super::{BrowserPage, BrowserSession, PageHandle};
use crate::error::{BrowserError, LaunchError};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct SiteState {
    pages: HashMap<String, Vec<String>>,
    failing: HashSet<String>,
    scroll_failing: HashSet<String>,
    navigations: Mutex<HashMap<String, usize>>,
    pages_opened: AtomicUsize,
    pages_closed: AtomicUsize,
    sessions_closed: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct FakeSite {
    state: Arc<SiteState>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    fn state_mut(&mut self) -> &mut SiteState {
        Arc::get_mut(&mut self.state).expect("configure FakeSite before sharing it")
    }

    /// Serve `html` at `url`.
    pub fn page(mut self, url: &str, html: &str) -> Self {
        self.state_mut()
            .pages
            .insert(url.to_string(), vec![html.to_string()]);
        self
    }

    /// Serve `html` at `url` once the page has been scrolled as many times
    /// as there are earlier versions.
    pub fn page_after_scroll(mut self, url: &str, html: &str) -> Self {
        self.state_mut()
            .pages
            .entry(url.to_string())
            .or_default()
            .push(html.to_string());
        self
    }

    /// Make navigation to `url` fail.
    pub fn failing(mut self, url: &str) -> Self {
        self.state_mut().failing.insert(url.to_string());
        self
    }

    /// Make scrolling fail on `url` once it has loaded.
    pub fn failing_scroll(mut self, url: &str) -> Self {
        self.state_mut().scroll_failing.insert(url.to_string());
        self
    }

    pub fn session(&self) -> Arc<dyn BrowserSession> {
        Arc::new(FakeSession {
            state: Arc::clone(&self.state),
        })
    }

    pub fn navigations(&self, url: &str) -> usize {
        self.state
            .navigations
            .lock()
            .unwrap()
            .get(url)
            .copied()
            .unwrap_or(0)
    }

    pub fn pages_opened(&self) -> usize {
        self.state.pages_opened.load(Ordering::SeqCst)
    }

    pub fn pages_closed(&self) -> usize {
        self.state.pages_closed.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> usize {
        self.state.sessions_closed.load(Ordering::SeqCst)
    }
}

struct FakeSession {
    state: Arc<SiteState>,
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn new_page(&self) -> Result<PageHandle, BrowserError> {
        self.state.pages_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakePage {
            state: Arc::clone(&self.state),
            current: Mutex::new(None),
            scrolls: AtomicUsize::new(0),
        }))
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.state.sessions_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakePage {
    state: Arc<SiteState>,
    current: Mutex<Option<String>>,
    scrolls: AtomicUsize,
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        *self
            .state
            .navigations
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default() += 1;
        tokio::task::yield_now().await;
        if self.state.failing.contains(url) {
            return Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: "net::ERR_CONNECTION_RESET".to_string(),
            });
        }
        *self.current.lock().unwrap() = Some(url.to_string());
        self.scrolls.store(0, Ordering::SeqCst);
        Ok(())
    }

    async fn content(&self) -> Result<String, BrowserError> {
        let current = self.current.lock().unwrap().clone();
        let html = current
            .and_then(|url| self.state.pages.get(&url))
            .and_then(|versions| {
                let idx = self.scrolls.load(Ordering::SeqCst).min(versions.len() - 1);
                versions.get(idx).cloned()
            })
            .unwrap_or_else(|| "<html><body></body></html>".to_string());
        Ok(html)
    }

    async fn scroll_to_bottom(&self) -> Result<(), BrowserError> {
        let current = self.current.lock().unwrap().clone();
        if current.is_some_and(|url| self.state.scroll_failing.contains(&url)) {
            return Err(BrowserError::Protocol("Execution context was destroyed".to_string()));
        }
        self.scrolls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.state.pages_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Launcher handing out sessions of a [`FakeSite`].
pub struct FakeLauncher {
    site: Option<FakeSite>,
    launches: AtomicUsize,
}

impl FakeLauncher {
    pub fn new(site: FakeSite) -> Self {
        Self {
            site: Some(site),
            launches: AtomicUsize::new(0),
        }
    }

    /// A launcher that never finds a browser.
    pub fn unavailable() -> Self {
        Self {
            site: None,
            launches: AtomicUsize::new(0),
        }
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Launcher for FakeLauncher {
    async fn launch(&self) -> Result<LaunchedBrowser, LaunchError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let site = self.site.as_ref().ok_or_else(|| LaunchError::ExecutableNotFound {
            tried: vec!["fake".to_string()],
        })?;
        Ok(LaunchedBrowser {
            session: site.session(),
            executable: ResolvedExecutable {
                path: PathBuf::from("/fake/chromium"),
                source: ExecutableSource::Override,
            },
        })
    }
}
