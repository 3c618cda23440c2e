//! Chromium sessions driven over the DevTools protocol with `chromiumoxide`.

use super::launcher::{DeploymentMode, LaunchOptions, LaunchedBrowser, Launcher, resolve_executable};
use super::{BrowserPage, BrowserSession, PageHandle};
use crate::error::{BrowserError, LaunchError};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::Page;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, RwLockReadGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

const SCROLL_TO_BOTTOM: &str = "window.scrollTo(0, document.body.scrollHeight)";

/// Launches a local or packaged Chromium according to [`LaunchOptions`].
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    options: LaunchOptions,
}

impl ChromiumLauncher {
    pub fn new(options: LaunchOptions) -> Self {
        Self { options }
    }

    fn config(&self, executable: &std::path::Path) -> Result<BrowserConfig, LaunchError> {
        let mut builder = BrowserConfig::builder()
            .chrome_executable(executable)
            .no_sandbox()
            .request_timeout(Duration::from_secs(30))
            .args(self.options.mode.launch_args().iter().copied());
        if self.options.mode == DeploymentMode::Production {
            builder = builder.viewport(Some(Viewport {
                width: 1920,
                height: 1080,
                device_scale_factor: Some(1.0),
                ..Default::default()
            }));
        }
        builder.build().map_err(LaunchError::Config)
    }
}

#[async_trait]
impl Launcher for ChromiumLauncher {
    #[instrument(level = "info", skip_all, fields(mode = ?self.options.mode))]
    async fn launch(&self) -> Result<LaunchedBrowser, LaunchError> {
        let executable = resolve_executable(&self.options).await?;
        let config = self.config(&executable.path)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| LaunchError::Spawn(e.to_string()))?;
        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "Browser handler event error");
                }
            }
        });

        info!(
            executable = %executable.path.display(),
            source = %executable.source,
            "Browser launched"
        );
        Ok(LaunchedBrowser {
            session: Arc::new(ChromiumSession {
                browser: RwLock::new(Some(browser)),
                events,
            }),
            executable,
        })
    }
}

/// One Chromium process plus the task pumping its DevTools events.
///
/// Pages are opened under a shared read guard so concurrent `new_page`
/// calls overlap; `close` takes the write guard.
pub struct ChromiumSession {
    browser: RwLock<Option<Browser>>,
    events: JoinHandle<()>,
}

/// Shared access to a browser that has not been closed yet.
async fn live<T>(slot: &RwLock<Option<T>>) -> Result<RwLockReadGuard<'_, T>, BrowserError> {
    RwLockReadGuard::try_map(slot.read().await, Option::as_ref).map_err(|_| BrowserError::Closed)
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn new_page(&self) -> Result<PageHandle, BrowserError> {
        let browser = live(&self.browser).await?;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::Protocol(e.to_string()))?;
        Ok(Arc::new(ChromiumPage { page }))
    }

    async fn close(&self) -> Result<(), BrowserError> {
        let mut guard = self.browser.write().await;
        let Some(mut browser) = guard.take() else {
            return Err(BrowserError::Closed);
        };
        let closed = browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| BrowserError::Protocol(e.to_string()));
        if let Err(e) = browser.wait().await {
            warn!(error = %e, "Browser process did not exit cleanly");
        }
        self.events.abort();
        closed
    }
}

pub struct ChromiumPage {
    page: Page,
}

#[async_trait]
impl BrowserPage for ChromiumPage {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        self.page
            .goto(url)
            .await
            .map(|_| ())
            .map_err(|e| BrowserError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })
    }

    async fn content(&self) -> Result<String, BrowserError> {
        self.page
            .content()
            .await
            .map_err(|e| BrowserError::Protocol(e.to_string()))
    }

    async fn scroll_to_bottom(&self) -> Result<(), BrowserError> {
        self.page
            .evaluate(SCROLL_TO_BOTTOM)
            .await
            .map(|_| ())
            .map_err(|e| BrowserError::Protocol(e.to_string()))
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.page
            .clone()
            .close()
            .await
            .map_err(|e| BrowserError::Protocol(e.to_string()))
    }
}
