//! Small string and file system helpers.
//!
//! - [`truncate_for_log`]: keep long bodies out of log lines
//! - [`excerpt`]: short summary derived from an article body
//! - [`ensure_writable_dir`]: validate an output directory before a run

use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, instrument};

const WRITE_MARKER: &str = ".noticias_write_check";

/// Characters kept by [`excerpt`] before the ellipsis.
pub const EXCERPT_CHARS: usize = 180;

/// Largest char boundary of `s` that is not past `max` bytes.
fn floor_boundary(s: &str, max: usize) -> usize {
    let mut end = max.min(s.len());
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    end
}

/// Truncate a string for logging purposes.
///
/// Strings longer than `max` bytes are cut at the nearest char boundary
/// and get a `"…(+N bytes)"` marker.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let end = floor_boundary(s, max);
        format!("{}…(+{} bytes)", &s[..end], s.len() - end)
    }
}

/// The first [`EXCERPT_CHARS`] characters of `body` followed by `"..."`,
/// or `body` itself when it is short enough. Empty bodies give `""`.
pub fn excerpt(body: &str) -> String {
    match body.char_indices().nth(EXCERPT_CHARS) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}

/// Create `path` if needed and check it accepts new files.
///
/// A marker file is written and removed again; a failed removal is only
/// logged.
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let marker = Path::new(path).join(WRITE_MARKER);
    fs::write(&marker, b"").await?;
    if let Err(e) = fs::remove_file(&marker).await {
        debug!(marker = %marker.display(), error = %e, "Could not remove write marker");
    }
    info!("Output directory is writable");
    Ok(())
}
