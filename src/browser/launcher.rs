//! Browser acquisition for development machines and serverless deployments.
//!
//! # Deployment mode
//!
//! Production is selected by `--production`, by `VERCEL_ENV=production` or
//! by any `AWS_LAMBDA_FUNCTION_VERSION`. Everything else is development.
//!
//! # Executable resolution
//!
//! | Mode        | Order tried                                              |
//! |-------------|----------------------------------------------------------|
//! | Production  | packaged binary (downloaded on first use), override, local lookup |
//! | Development | override, local lookup                                   |
//!
//! Production launches use a sandbox-less, GPU-less argument set suited to
//! single-process containers; development only disables the sandbox.
//! Both run headless.

use crate::browser::BrowserSession;
use crate::error::LaunchError;
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

/// File name of the packaged binary inside the pack directory.
pub const PACKAGED_BINARY: &str = "chromium";

/// Names and paths probed by the local lookup, in order.
pub const LOCAL_CANDIDATES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
];

/// Arguments for constrained single-process containers.
pub const SERVERLESS_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-gpu",
    "--disable-webgl",
    "--disable-dev-shm-usage",
    "--single-process",
    "--no-zygote",
    "--use-gl=swiftshader",
    "--disable-background-networking",
    "--disable-default-apps",
    "--disable-extensions",
    "--disable-sync",
    "--mute-audio",
    "--no-first-run",
    "--no-default-browser-check",
    "--ignore-certificate-errors",
    "--disk-cache-size=33554432",
];

pub const DEVELOPMENT_ARGS: &[&str] = &["--no-sandbox", "--disable-setuid-sandbox"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentMode {
    Development,
    Production,
}

impl DeploymentMode {
    /// Decide the mode from the explicit flag and the platform signals.
    pub fn detect(force_production: bool, vercel_env: Option<&str>, lambda_version: Option<&str>) -> Self {
        let on_vercel = vercel_env == Some("production");
        let on_lambda = lambda_version.is_some_and(|v| !v.trim().is_empty());
        if force_production || on_vercel || on_lambda {
            DeploymentMode::Production
        } else {
            DeploymentMode::Development
        }
    }

    pub fn launch_args(self) -> &'static [&'static str] {
        match self {
            DeploymentMode::Production => SERVERLESS_ARGS,
            DeploymentMode::Development => DEVELOPMENT_ARGS,
        }
    }
}

/// Which fallback step produced the executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutableSource {
    Packaged,
    Downloaded,
    Override,
    Local,
}

impl fmt::Display for ExecutableSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutableSource::Packaged => "packaged",
            ExecutableSource::Downloaded => "downloaded",
            ExecutableSource::Override => "override",
            ExecutableSource::Local => "local",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedExecutable {
    pub path: PathBuf,
    pub source: ExecutableSource,
}

/// Everything the launcher needs to find and start a browser.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub mode: DeploymentMode,
    pub executable_override: Option<PathBuf>,
    pub pack_dir: PathBuf,
    pub pack_url: Option<String>,
    pub local_candidates: Vec<String>,
}

impl LaunchOptions {
    pub fn new(mode: DeploymentMode) -> Self {
        Self {
            mode,
            executable_override: None,
            pack_dir: PathBuf::from("/tmp/chromium"),
            pack_url: None,
            local_candidates: LOCAL_CANDIDATES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// A running browser together with the executable it was started from.
pub struct LaunchedBrowser {
    pub session: Arc<dyn BrowserSession>,
    pub executable: ResolvedExecutable,
}

/// Starts browser sessions.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self) -> Result<LaunchedBrowser, LaunchError>;
}

/// Walk the fallback chain for `options.mode`.
#[instrument(level = "debug", skip_all, fields(mode = ?options.mode))]
pub async fn resolve_executable(options: &LaunchOptions) -> Result<ResolvedExecutable, LaunchError> {
    let mut tried = Vec::new();

    if options.mode == DeploymentMode::Production {
        if let Some(found) = packaged_executable(options, &mut tried).await {
            return Ok(found);
        }
    }

    if let Some(path) = &options.executable_override {
        if is_file(path).await {
            return Ok(ResolvedExecutable {
                path: path.clone(),
                source: ExecutableSource::Override,
            });
        }
        tried.push(format!("override:{}", path.display()));
    }

    for candidate in &options.local_candidates {
        match which::which(candidate) {
            Ok(path) => {
                return Ok(ResolvedExecutable {
                    path,
                    source: ExecutableSource::Local,
                });
            }
            Err(_) => tried.push(format!("local:{candidate}")),
        }
    }

    Err(LaunchError::ExecutableNotFound { tried })
}

async fn packaged_executable(options: &LaunchOptions, tried: &mut Vec<String>) -> Option<ResolvedExecutable> {
    let path = options.pack_dir.join(PACKAGED_BINARY);
    if is_file(&path).await {
        return Some(ResolvedExecutable {
            path,
            source: ExecutableSource::Packaged,
        });
    }
    tried.push(format!("packaged:{}", path.display()));

    let url = options.pack_url.as_deref()?;
    match download_packaged(url, &path).await {
        Ok(()) => Some(ResolvedExecutable {
            path,
            source: ExecutableSource::Downloaded,
        }),
        Err(e) => {
            warn!(error = %e, "Packaged browser download failed; trying next fallback");
            tried.push(format!("download:{url}"));
            None
        }
    }
}

/// Fetch the packaged binary from `url` into `dest` and mark it executable.
#[instrument(level = "info", skip_all, fields(%url, dest = %dest.display()))]
async fn download_packaged(url: &str, dest: &Path) -> Result<(), LaunchError> {
    let failed = |reason: String| LaunchError::Download {
        url: url.to_string(),
        reason,
    };
    let bytes = reqwest::get(url)
        .await
        .and_then(|resp| resp.error_for_status())
        .map_err(|e| failed(e.to_string()))?
        .bytes()
        .await
        .map_err(|e| failed(e.to_string()))?;

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| failed(e.to_string()))?;
    }
    fs::write(dest, &bytes).await.map_err(|e| failed(e.to_string()))?;
    make_executable(dest).await.map_err(|e| failed(e.to_string()))?;
    info!(bytes = bytes.len(), "Downloaded packaged browser");
    Ok(())
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

async fn is_file(path: &Path) -> bool {
    let found = fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false);
    debug!(path = %path.display(), found, "Probed executable");
    found
}
