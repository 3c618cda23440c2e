//! Error types for browser acquisition, page driving, site scraping and
//! query validation.
//!
//! Only [`LaunchError`] is meant to end a request. [`BrowserError`]s are
//! recovered by the adapters (waits) or per item (detail fetches), and
//! [`QueryError`]s are raised before any browser is started.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// No usable browser could be started.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Every step of the executable fallback chain came up empty.
    #[error("no usable browser executable found (tried: {})", tried.join(", "))]
    ExecutableNotFound { tried: Vec<String> },

    /// The packaged browser could not be fetched on first use.
    #[error("failed to download packaged browser from {url}: {reason}")]
    Download { url: String, reason: String },

    /// The launch configuration was rejected by the driver.
    #[error("invalid browser configuration: {0}")]
    Config(String),

    /// The browser process did not come up.
    #[error("browser process failed to start: {0}")]
    Spawn(String),
}

/// Failures while driving an already running browser.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("navigation to {url} timed out after {after:?}")]
    NavigationTimeout { url: String, after: Duration },

    #[error("timed out after {after:?} waiting for {what}")]
    WaitTimeout { what: &'static str, after: Duration },

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("browser protocol error: {0}")]
    Protocol(String),

    #[error("browser session already closed")]
    Closed,
}

/// What a site operation may fail with.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error("{site} does not support {operation}")]
    Unsupported {
        site: &'static str,
        operation: &'static str,
    },
}

/// Client-facing request validation failures.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Sitio no soportado")]
    UnsupportedSite(String),

    #[error("Categoría no soportada para {site}")]
    UnsupportedCategory { site: &'static str, categoria: String },

    #[error("Debes proporcionar la categoría o URL de sección para {site}")]
    MissingParameter {
        site: &'static str,
        param: &'static str,
    },
}

/// Detail-cache write failures. Reads never fail.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}
